use {
	crate::machine::MachineId,
	core::fmt,
	derive_more::{Display, From, Into},
	serde::{Deserialize, Serialize},
	std::collections::BTreeMap,
};

mod driver;

pub use driver::{Error, ReplicaSetDriver};

/// The tag key under which a replica-set member records the controller
/// machine it belongs to. A member without this tag is unassociated and
/// treated as "extra" by the reconciler.
pub const MACHINE_ID_TAG: &str = "juju-machine-id";

/// A replica-set member id. Unique within the set and never reused during a
/// reconfiguration; new ids are allocated above the highest id observed in
/// the live set.
#[derive(
	Debug,
	Display,
	Clone,
	Copy,
	PartialEq,
	Eq,
	PartialOrd,
	Ord,
	Hash,
	From,
	Into,
	Serialize,
	Deserialize,
)]
pub struct MemberId(u32);

impl MemberId {
	/// The id allocated when the current set has no members to derive a
	/// maximum from.
	pub const FIRST: Self = Self(0);

	/// The next id after this one.
	#[must_use]
	pub const fn next(self) -> Self {
		Self(self.0 + 1)
	}
}

/// The replication state reported by a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberState {
	Startup,
	Primary,
	Secondary,
	Recovering,
	Fatal,
	Startup2,
	Unknown,
	Arbiter,
	Down,
	Rollback,
}

/// A health snapshot for one replica-set member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberStatus {
	id: MemberId,
	healthy: bool,
	state: MemberState,
}

impl MemberStatus {
	pub fn new(id: impl Into<MemberId>, state: MemberState, healthy: bool) -> Self {
		Self {
			id: id.into(),
			healthy,
			state,
		}
	}

	pub const fn id(&self) -> MemberId {
		self.id
	}

	pub const fn healthy(&self) -> bool {
		self.healthy
	}

	pub const fn state(&self) -> MemberState {
		self.state
	}

	/// A member is ready when it is healthy and either primary or secondary.
	/// These are the only states from which promotion to voter is safe.
	pub const fn is_ready(&self) -> bool {
		self.healthy
			&& matches!(self.state, MemberState::Primary | MemberState::Secondary)
	}
}

/// One member of the replica set, as carried by the replica-set driver.
///
/// Notes:
///
/// - `votes` is nullable on the wire: absent means voting-by-default, a
///   positive count means explicitly voting, and zero means non-voting.
///   `priority` mirrors it; non-voting members must carry priority zero so
///   they can never be elected.
///
/// - The member's machine association travels in `tags` under
///   [`MACHINE_ID_TAG`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaMember {
	id: MemberId,
	address: String,
	tags: BTreeMap<String, String>,
	votes: Option<u32>,
	priority: Option<f64>,
}

impl ReplicaMember {
	/// Creates a fresh non-voting member for the given machine. The address
	/// is left empty and filled in by address reconciliation.
	pub fn non_voting(id: MemberId, machine: &MachineId) -> Self {
		let mut member = Self {
			id,
			address: String::new(),
			tags: BTreeMap::from([(
				MACHINE_ID_TAG.to_owned(),
				machine.to_string(),
			)]),
			votes: None,
			priority: None,
		};
		member.set_voting(false);
		member
	}

	pub const fn id(&self) -> MemberId {
		self.id
	}

	pub fn address(&self) -> &str {
		&self.address
	}

	pub fn set_address(&mut self, address: impl Into<String>) {
		self.address = address.into();
	}

	pub const fn tags(&self) -> &BTreeMap<String, String> {
		&self.tags
	}

	pub const fn votes(&self) -> Option<u32> {
		self.votes
	}

	pub const fn priority(&self) -> Option<f64> {
		self.priority
	}

	/// The machine this member is associated with, when tagged.
	pub fn machine_id(&self) -> Option<MachineId> {
		self.tags.get(MACHINE_ID_TAG).map(|id| MachineId::from(id.as_str()))
	}

	/// True when the member's vote counts toward elections. An absent vote
	/// count defaults to voting.
	pub fn is_voting(&self) -> bool {
		self.votes.is_none_or(|votes| votes > 0)
	}

	/// Grants or revokes the member's vote. Revoking also zeroes the
	/// election priority; granting restores both to their defaults.
	pub fn set_voting(&mut self, voting: bool) {
		if voting {
			self.votes = None;
			self.priority = None;
		} else {
			self.votes = Some(0);
			self.priority = Some(0.0);
		}
	}
}

impl fmt::Display for ReplicaMember {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "member {} ({})", self.id, self.address)
	}
}

/// Test-construction surface used by drivers and suites to describe an
/// existing replica set.
impl ReplicaMember {
	/// Creates a member with the given id, address, and machine tag, voting
	/// by default.
	pub fn existing(
		id: impl Into<MemberId>,
		address: impl Into<String>,
		machine: Option<&MachineId>,
	) -> Self {
		let mut tags = BTreeMap::new();
		if let Some(machine) = machine {
			tags.insert(MACHINE_ID_TAG.to_owned(), machine.to_string());
		}
		Self {
			id: id.into(),
			address: address.into(),
			tags,
			votes: None,
			priority: None,
		}
	}

	/// Sets an explicit vote count.
	#[must_use]
	pub const fn with_votes(mut self, votes: u32) -> Self {
		self.votes = Some(votes);
		self
	}

	/// Zeroes the vote count and priority.
	#[must_use]
	pub fn without_vote(mut self) -> Self {
		self.set_voting(false);
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn absent_votes_default_to_voting() {
		let machine = MachineId::from("0");
		let member = ReplicaMember::existing(1u32, "10.0.0.1:37017", Some(&machine));
		assert!(member.is_voting());

		assert!(member.clone().with_votes(2).is_voting());
		assert!(!member.without_vote().is_voting());
	}

	#[test]
	fn revoking_vote_zeroes_priority() {
		let machine = MachineId::from("0");
		let mut member =
			ReplicaMember::existing(1u32, "10.0.0.1:37017", Some(&machine));

		member.set_voting(false);
		assert_eq!(member.votes(), Some(0));
		assert_eq!(member.priority(), Some(0.0));

		member.set_voting(true);
		assert_eq!(member.votes(), None);
		assert_eq!(member.priority(), None);
	}

	#[test]
	fn fresh_members_carry_the_machine_tag() {
		let machine = MachineId::from("11");
		let member = ReplicaMember::non_voting(MemberId::FIRST.next(), &machine);

		assert_eq!(member.machine_id(), Some(machine));
		assert!(!member.is_voting());
		assert!(member.address().is_empty());
	}

	#[test]
	fn readiness_requires_health_and_state() {
		let ready = MemberStatus::new(1u32, MemberState::Secondary, true);
		assert!(ready.is_ready());

		let unhealthy = MemberStatus::new(1u32, MemberState::Primary, false);
		assert!(!unhealthy.is_ready());

		let recovering = MemberStatus::new(1u32, MemberState::Recovering, true);
		assert!(!recovering.is_ready());
	}
}
