use {
	crate::net::SpaceName,
	core::time::Duration,
	derive_builder::Builder,
	serde::{Deserialize, Serialize},
};

/// Configuration options for the reconciliation worker.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq)]
#[builder(pattern = "owned", setter(prefix = "with"), derive(Debug, Clone))]
#[builder_struct_attr(doc(hidden))]
pub struct Config {
	/// The interval at which a reconciliation tick runs when no collaborator
	/// change notification arrives earlier.
	#[builder(default = "Duration::from_secs(60)")]
	pub tick_interval: Duration,
}

impl Config {
	/// Creates a new config builder with default values.
	pub fn builder() -> ConfigBuilder {
		ConfigBuilder::default()
	}
}

impl Default for Config {
	fn default() -> Self {
		Self::builder().build().expect("all options have defaults")
	}
}

/// The cluster-configuration collaborator, read once per reconciliation
/// tick.
pub trait ConfigSource: Send + Sync {
	/// The port replica-set members listen on; appended to every selected
	/// address.
	fn mongo_port(&self) -> u16;

	/// The HA network space all members must be reachable within, when
	/// configured.
	fn ha_space(&self) -> Option<SpaceName>;
}
