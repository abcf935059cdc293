use {
	core::fmt,
	derive_more::{AsRef, Display, From, Into},
	serde::{Deserialize, Serialize},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("no address found in space {0}")]
	NoSpaceAddress(SpaceName),

	#[error("found {count} addresses in space {space}")]
	MultipleSpaceAddresses { space: SpaceName, count: usize },

	#[error(
		"found {0} cloud-local addresses and no HA space is configured; \
		 configure an HA space to disambiguate"
	)]
	AmbiguousCloudLocal(usize),

	#[error("no usable address")]
	NoUsableAddress,
}

/// The name of a network space.
///
/// A space groups subnets that are mutually routable; when an HA space is
/// configured, all replica-set members must expose exactly one address
/// within it.
#[derive(
	Debug,
	Display,
	Clone,
	PartialEq,
	Eq,
	PartialOrd,
	Ord,
	Hash,
	AsRef,
	From,
	Into,
	Serialize,
	Deserialize,
)]
pub struct SpaceName(String);

impl From<&str> for SpaceName {
	fn from(name: &str) -> Self {
		Self(name.to_owned())
	}
}

/// The reachability scope of a network address.
#[derive(
	Debug,
	Clone,
	Copy,
	PartialEq,
	Eq,
	PartialOrd,
	Ord,
	Hash,
	Serialize,
	Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum AddressScope {
	/// Reachable from anywhere.
	Public,

	/// Reachable from within the same cloud substrate.
	CloudLocal,

	/// Reachable only from the machine itself (loopback).
	MachineLocal,

	/// Link-local, not routable.
	LinkLocal,
}

/// A single network address of a controller machine.
///
/// The address value is a bare host or IP literal without a port; ports are
/// appended at selection time. The space field records the network space the
/// address's subnet belongs to, when known.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
	value: String,
	scope: AddressScope,
	space: Option<SpaceName>,
}

impl Address {
	pub fn new(value: impl Into<String>, scope: AddressScope) -> Self {
		Self {
			value: value.into(),
			scope,
			space: None,
		}
	}

	/// Associates the address with the network space its subnet belongs to.
	#[must_use]
	pub fn in_space(mut self, space: impl Into<SpaceName>) -> Self {
		self.space = Some(space.into());
		self
	}

	pub fn value(&self) -> &str {
		&self.value
	}

	pub const fn scope(&self) -> AddressScope {
		self.scope
	}

	pub const fn space(&self) -> Option<&SpaceName> {
		self.space.as_ref()
	}

	/// True if the address can be used for communication between replica-set
	/// members. Machine-local and link-local addresses never qualify.
	pub const fn is_usable(&self) -> bool {
		!matches!(
			self.scope,
			AddressScope::MachineLocal | AddressScope::LinkLocal
		)
	}

	/// Formats the address as `host:port`, bracketing IPv6 literals.
	pub fn host_port(&self, port: u16) -> String {
		if self.value.contains(':') {
			format!("[{}]:{port}", self.value)
		} else {
			format!("{}:{port}", self.value)
		}
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.value)
	}
}

/// Picks the one address of `addrs` usable for replica-set communication,
/// applying the HA-space policy:
///
/// - With a configured space, exactly one address must belong to it.
/// - Without one, the unique cloud-local address is used; multiple
///   cloud-local addresses cannot be disambiguated and fail.
/// - A machine with no cloud-local address but exactly one usable address
///   falls back to that address.
pub fn select_peer_address<'a>(
	addrs: &'a [Address],
	ha_space: Option<&SpaceName>,
) -> Result<&'a Address, Error> {
	if let Some(space) = ha_space {
		let in_space: Vec<_> = addrs
			.iter()
			.filter(|addr| addr.space() == Some(space))
			.collect();

		return match in_space.as_slice() {
			[addr] => Ok(addr),
			[] => Err(Error::NoSpaceAddress(space.clone())),
			multiple => Err(Error::MultipleSpaceAddresses {
				space: space.clone(),
				count: multiple.len(),
			}),
		};
	}

	let cloud_local: Vec<_> = addrs
		.iter()
		.filter(|addr| addr.scope() == AddressScope::CloudLocal)
		.collect();

	match cloud_local.as_slice() {
		[addr] => Ok(addr),
		[] => {
			let usable: Vec<_> =
				addrs.iter().filter(|addr| addr.is_usable()).collect();
			match usable.as_slice() {
				[addr] => Ok(addr),
				_ => Err(Error::NoUsableAddress),
			}
		}
		multiple => Err(Error::AmbiguousCloudLocal(multiple.len())),
	}
}
