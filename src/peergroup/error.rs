use crate::{machine::MachineId, net, replica, replica::ReplicaMember};

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// A cluster with no current membership is not reconcilable; bootstrap
	/// is a separate concern.
	#[error("current replica-set member set is empty")]
	EmptyMemberSet,

	/// A member with no machine association is still voting. Reconfiguring
	/// around a voter whose identity is unknown is never safe; operator
	/// intervention is required.
	#[error("voting non-machine {member} found in peer group")]
	ExtraVotingMember { member: ReplicaMember },

	/// Address selection could not decide on an address for the machine.
	#[error("selecting replica-set address for machine {machine}: {source}")]
	NoUsableAddress {
		machine: MachineId,
		#[source]
		source: net::Error,
	},

	#[error(transparent)]
	Driver(#[from] replica::Error),
}
