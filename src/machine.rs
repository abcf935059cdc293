use {
	crate::net::{self, Address, SpaceName, select_peer_address},
	derive_more::{AsRef, Display, From, Into},
	serde::{Deserialize, Serialize},
	std::collections::BTreeMap,
	tokio::sync::watch,
};

/// The stable identifier of a controller machine, assigned by the
/// orchestrator that provisions it. Sorts lexicographically, which fixes the
/// iteration order of every reconciliation stage.
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
pub struct MachineId(String);

impl From<&str> for MachineId {
	fn from(id: &str) -> Self {
		Self(id.to_owned())
	}
}

/// A snapshot of one controller machine as seen by the machine tracker.
///
/// Notes:
///
/// - `wants_vote` is intent, not state: the orchestrator sets it from the
///   machine's controller role and lifecycle, and the reconciler decides
///   when (and whether) the vote is actually granted.
///
/// - The series tag is opaque to reconciliation; the controller-changes
///   planner uses it as the template value for new controllers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
	id: MachineId,
	addresses: Vec<Address>,
	wants_vote: bool,
	series: String,
}

impl Machine {
	pub fn new(id: impl Into<MachineId>, series: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			addresses: Vec::new(),
			wants_vote: false,
			series: series.into(),
		}
	}

	/// Replaces the machine's known addresses.
	#[must_use]
	pub fn with_addresses(
		mut self,
		addresses: impl IntoIterator<Item = Address>,
	) -> Self {
		self.addresses = addresses.into_iter().collect();
		self
	}

	/// Sets the machine's voting intent.
	#[must_use]
	pub const fn with_vote(mut self, wants_vote: bool) -> Self {
		self.wants_vote = wants_vote;
		self
	}

	pub const fn id(&self) -> &MachineId {
		&self.id
	}

	pub fn addresses(&self) -> &[Address] {
		&self.addresses
	}

	pub const fn wants_vote(&self) -> bool {
		self.wants_vote
	}

	pub fn series(&self) -> &str {
		&self.series
	}

	/// Selects the one `host:port` address of this machine to be used for
	/// replica-set communication. See [`net::select_peer_address`] for the
	/// HA-space policy.
	pub fn select_mongo_address(
		&self,
		port: u16,
		ha_space: Option<&SpaceName>,
	) -> Result<String, net::Error> {
		let addr = select_peer_address(&self.addresses, ha_space)?;
		Ok(addr.host_port(port))
	}
}

/// The machine tracker collaborator: the sole writer of controller-machine
/// state, read by the reconciler once per tick.
///
/// `known_machines` returns an owned snapshot; the reconciler never holds
/// references into the tracker across suspension points. The watch channel
/// is signalled whenever a tracked machine's state changes and wakes the
/// reconciliation worker.
pub trait MachineTracker: Send + Sync {
	fn known_machines(&self) -> BTreeMap<MachineId, Machine>;

	fn watch(&self) -> watch::Receiver<()>;
}

#[cfg(test)]
mod tests {
	use {
		super::*,
		crate::net::{Address, AddressScope},
	};

	#[test]
	fn mongo_address_is_host_port() {
		let machine = Machine::new("0", "noble").with_addresses([
			Address::new("127.0.0.1", AddressScope::MachineLocal),
			Address::new("10.0.0.1", AddressScope::CloudLocal),
		]);

		let addr = machine.select_mongo_address(37017, None).unwrap();
		assert_eq!(addr, "10.0.0.1:37017");
	}

	#[test]
	fn mongo_address_honours_ha_space() {
		let space = SpaceName::from("ha");
		let machine = Machine::new("0", "noble").with_addresses([
			Address::new("10.0.0.1", AddressScope::CloudLocal).in_space("default"),
			Address::new("10.9.0.1", AddressScope::CloudLocal).in_space("ha"),
		]);

		let addr = machine.select_mongo_address(37017, Some(&space)).unwrap();
		assert_eq!(addr, "10.9.0.1:37017");
	}
}
