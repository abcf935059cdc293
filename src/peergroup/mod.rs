mod changes;
mod config;
mod error;
mod info;
mod worker;

pub use {
	changes::{DesiredPeerGroup, desired_peer_group},
	config::{Config, ConfigBuilder, ConfigSource},
	error::Error,
	info::PeerGroupInfo,
	worker::{Handle, WorkerLoop},
};
