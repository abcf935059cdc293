//! In-memory collaborator fakes for test suites.
//!
//! These stand in for the machine tracker, the replica-set driver, and the
//! configuration source, so reconciliation can be exercised end-to-end
//! without a cluster.

use {
	crate::{
		machine::{Machine, MachineId, MachineTracker},
		net::{Address, AddressScope, SpaceName},
		peergroup::ConfigSource,
		replica::{
			Error,
			MemberState,
			MemberStatus,
			ReplicaMember,
			ReplicaSetDriver,
		},
	},
	parking_lot::RwLock,
	std::{collections::BTreeMap, sync::Arc},
	tokio::sync::watch,
};

/// The replica-set port used by all fixture addresses.
pub const MONGO_PORT: u16 = 37017;

/// A controller machine with one cloud-local address derived from its id.
pub fn controller(id: &str, wants_vote: bool) -> Machine {
	Machine::new(id, "noble")
		.with_vote(wants_vote)
		.with_addresses([Address::new(
			format!("10.0.0.{id}"),
			AddressScope::CloudLocal,
		)])
}

/// A voting member whose address matches the [`controller`] fixture for the
/// given machine.
pub fn voting_member(id: u32, machine: &str) -> ReplicaMember {
	ReplicaMember::existing(
		id,
		format!("10.0.0.{machine}:{MONGO_PORT}"),
		Some(&MachineId::from(machine)),
	)
}

/// A non-voting member whose address matches the [`controller`] fixture for
/// the given machine.
pub fn non_voting_member(id: u32, machine: &str) -> ReplicaMember {
	voting_member(id, machine).without_vote()
}

/// A healthy status report in the given state.
pub fn healthy(id: u32, state: MemberState) -> MemberStatus {
	MemberStatus::new(id, state, true)
}

/// A machine tracker over an in-memory machine map.
///
/// Cheap to clone; all clones share the same underlying state, so a test
/// can mutate machines while a worker holds its own handle.
#[derive(Clone)]
pub struct StaticTracker {
	inner: Arc<TrackerInner>,
}

struct TrackerInner {
	machines: RwLock<BTreeMap<MachineId, Machine>>,
	changes: watch::Sender<()>,
}

impl StaticTracker {
	pub fn new(machines: impl IntoIterator<Item = Machine>) -> Self {
		let machines = machines
			.into_iter()
			.map(|machine| (machine.id().clone(), machine))
			.collect();
		let (changes, _) = watch::channel(());

		Self {
			inner: Arc::new(TrackerInner {
				machines: RwLock::new(machines),
				changes,
			}),
		}
	}

	/// Inserts or replaces a machine and signals the change.
	pub fn upsert(&self, machine: Machine) {
		self
			.inner
			.machines
			.write()
			.insert(machine.id().clone(), machine);
		self.inner.changes.send(()).ok();
	}

	/// Removes a machine and signals the change.
	pub fn remove(&self, id: &MachineId) {
		self.inner.machines.write().remove(id);
		self.inner.changes.send(()).ok();
	}
}

impl MachineTracker for StaticTracker {
	fn known_machines(&self) -> BTreeMap<MachineId, Machine> {
		self.inner.machines.read().clone()
	}

	fn watch(&self) -> watch::Receiver<()> {
		self.inner.changes.subscribe()
	}
}

/// A replica-set driver over in-memory members and statuses.
///
/// Applied member maps replace the stored members and are fed back on the
/// next read, so a reconcile–apply–reconcile round trip behaves like a
/// real set that accepted the reconfiguration. Statuses never change on
/// their own; tests move members through states explicitly.
#[derive(Clone)]
pub struct RecordingReplicaSet {
	inner: Arc<ReplicaInner>,
}

struct ReplicaInner {
	members: RwLock<Vec<ReplicaMember>>,
	statuses: RwLock<Vec<MemberStatus>>,
	voting: RwLock<BTreeMap<MachineId, bool>>,
	reconfigurations: RwLock<usize>,
	changes: watch::Sender<()>,
}

impl RecordingReplicaSet {
	pub fn new(
		members: impl IntoIterator<Item = ReplicaMember>,
		statuses: impl IntoIterator<Item = MemberStatus>,
	) -> Self {
		let (changes, _) = watch::channel(());

		Self {
			inner: Arc::new(ReplicaInner {
				members: RwLock::new(members.into_iter().collect()),
				statuses: RwLock::new(statuses.into_iter().collect()),
				voting: RwLock::new(BTreeMap::new()),
				reconfigurations: RwLock::new(0),
				changes,
			}),
		}
	}

	/// The members as of the last applied reconfiguration.
	pub fn members(&self) -> Vec<ReplicaMember> {
		self.inner.members.read().clone()
	}

	/// The voting intent recorded by the last apply.
	pub fn voting(&self) -> BTreeMap<MachineId, bool> {
		self.inner.voting.read().clone()
	}

	/// How many applies actually reconfigured the set.
	pub fn reconfigurations(&self) -> usize {
		*self.inner.reconfigurations.read()
	}

	/// Replaces the status report for a member (or adds one) and signals
	/// the change.
	pub fn report_status(&self, status: MemberStatus) {
		let mut statuses = self.inner.statuses.write();
		if let Some(existing) =
			statuses.iter_mut().find(|existing| existing.id() == status.id())
		{
			*existing = status;
		} else {
			statuses.push(status);
		}
		drop(statuses);
		self.inner.changes.send(()).ok();
	}
}

impl ReplicaSetDriver for RecordingReplicaSet {
	fn current_members(
		&self,
	) -> impl Future<Output = Result<Vec<ReplicaMember>, Error>> + Send {
		let members = self.members();
		async move { Ok(members) }
	}

	fn current_statuses(
		&self,
	) -> impl Future<Output = Result<Vec<MemberStatus>, Error>> + Send {
		let statuses = self.inner.statuses.read().clone();
		async move { Ok(statuses) }
	}

	fn apply_members(
		&self,
		members: Option<BTreeMap<MachineId, ReplicaMember>>,
		voting: BTreeMap<MachineId, bool>,
	) -> impl Future<Output = Result<(), Error>> + Send {
		if let Some(members) = members {
			*self.inner.members.write() = members.into_values().collect();
			*self.inner.reconfigurations.write() += 1;
			// Only a reconfiguration counts as a membership change; waking
			// the worker for a recorded no-op would tick forever.
			self.inner.changes.send(()).ok();
		}
		*self.inner.voting.write() = voting;
		async move { Ok(()) }
	}

	fn watch(&self) -> watch::Receiver<()> {
		self.inner.changes.subscribe()
	}
}

/// A fixed configuration source.
#[derive(Debug, Clone)]
pub struct StaticConfig {
	pub mongo_port: u16,
	pub ha_space: Option<SpaceName>,
}

impl Default for StaticConfig {
	fn default() -> Self {
		Self {
			mongo_port: MONGO_PORT,
			ha_space: None,
		}
	}
}

impl ConfigSource for StaticConfig {
	fn mongo_port(&self) -> u16 {
		self.mongo_port
	}

	fn ha_space(&self) -> Option<SpaceName> {
		self.ha_space.clone()
	}
}
