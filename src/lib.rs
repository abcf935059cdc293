mod error;

pub mod ha;
pub mod machine;
pub mod net;
pub mod peergroup;
pub mod replica;

pub use error::Error;

pub mod prelude {
	pub use super::{
		error::Error,
		ha::{
			ControllerChanges,
			ControllerInfo,
			ControllersSpec,
			plan_controller_changes,
		},
		machine::{Machine, MachineId, MachineTracker},
		net::{Address, AddressScope, SpaceName},
		peergroup::{
			Config,
			ConfigSource,
			Handle,
			PeerGroupInfo,
			WorkerLoop,
			desired_peer_group,
		},
		replica::{
			MemberId,
			MemberState,
			MemberStatus,
			ReplicaMember,
			ReplicaSetDriver,
		},
	};
}

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
