use {
	super::{MemberStatus, ReplicaMember},
	crate::machine::MachineId,
	std::collections::BTreeMap,
	tokio::sync::watch,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("replica set is unreachable: {0}")]
	Unreachable(String),

	#[error("replica set rejected the reconfiguration: {0}")]
	Rejected(String),

	#[error("replica-set driver error: {0}")]
	Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// The replica-set driver collaborator: the sole writer of replica-set
/// membership.
///
/// The reconciler reads the current members and statuses at the start of a
/// tick and hands the computed diff back through [`apply_members`]. The
/// driver owns the reconfiguration RPC and must apply an emitted diff
/// atomically; the reconciler never retries within a tick.
///
/// [`apply_members`]: ReplicaSetDriver::apply_members
pub trait ReplicaSetDriver: Send + Sync {
	/// The members of the replica set as currently configured.
	fn current_members(
		&self,
	) -> impl Future<Output = Result<Vec<ReplicaMember>, Error>> + Send;

	/// The current status of each member. Issues one RPC to the replica set.
	fn current_statuses(
		&self,
	) -> impl Future<Output = Result<Vec<MemberStatus>, Error>> + Send;

	/// Applies a reconciliation outcome.
	///
	/// `members` of `None` means the membership is already as desired; the
	/// driver records the voting intent and performs no reconfiguration.
	/// `Some` carries the full desired member map, keyed by machine id.
	fn apply_members(
		&self,
		members: Option<BTreeMap<MachineId, ReplicaMember>>,
		voting: BTreeMap<MachineId, bool>,
	) -> impl Future<Output = Result<(), Error>> + Send;

	/// Signalled whenever the driver observes a membership or status change,
	/// waking the reconciliation worker.
	fn watch(&self) -> watch::Receiver<()>;
}
