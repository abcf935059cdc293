use crate::{ha, net, peergroup, replica};

/// Any error produced by this crate, for callers that do not care which
/// subsystem failed. Reconciliation tick errors are all retriable on the
/// next tick; planner errors require operator attention.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	PeerGroup(#[from] peergroup::Error),

	#[error(transparent)]
	Plan(#[from] ha::Error),

	#[error(transparent)]
	Address(#[from] net::Error),

	#[error(transparent)]
	Replica(#[from] replica::Error),
}
