use {
	super::{Error, PeerGroupInfo},
	crate::{
		machine::MachineId,
		replica::{MemberId, ReplicaMember},
	},
	itertools::Itertools,
	std::collections::BTreeMap,
};

/// The desired peer group: the full member map to apply (or `None` when the
/// current configuration already matches), plus the voting intent for every
/// tracked machine.
pub type DesiredPeerGroup =
	(Option<BTreeMap<MachineId, ReplicaMember>>, BTreeMap<MachineId, bool>);

/// Computes the desired peer group from the input snapshot.
///
/// Pure: the only inputs are the snapshot contents, and the computation is
/// deterministic (machines are visited in sorted id order).
///
/// Errors if an unassociated member is still voting, or if an address
/// cannot be selected for one of the known machines.
pub fn desired_peer_group(info: &PeerGroupInfo) -> Result<DesiredPeerGroup, Error> {
	tracing::debug!(snapshot = ?info, "calculating desired peer group");

	let mut changes = PeerGroupChanges::new(info);

	// Members that lost their machine association should have been demoted
	// before removal; one that still votes cannot be reconfigured around.
	changes.check_extra_members()?;
	changes.select_addresses()?;

	changes.members = info.seed_members();
	changes.classify();
	changes.review_vote_changes();
	changes.create_non_voting_members();

	// Record the vote of every proposed member before adjustment; any
	// difference from here on will trigger a peer-group election.
	changes.record_initial_voting();
	changes.adjust_votes();
	changes.update_addresses();
	changes.log_decision();

	if changes.is_changed {
		Ok((Some(changes.members), changes.machine_voting))
	} else {
		Ok((None, changes.machine_voting))
	}
}

/// Working state of one desired-peer-group computation: the five
/// classification buckets, the mutable member proposal, and the change
/// flag. Bucket surgery performed by the quorum review stays local to this
/// struct.
struct PeerGroupChanges<'a> {
	info: &'a PeerGroupInfo,
	is_changed: bool,
	to_remove_vote: Vec<MachineId>,
	to_add_vote: Vec<MachineId>,
	to_keep_voting: Vec<MachineId>,
	to_keep_non_voting: Vec<MachineId>,
	to_keep_create_non_voting: Vec<MachineId>,
	machine_voting: BTreeMap<MachineId, bool>,
	addrs: BTreeMap<MachineId, String>,
	members: BTreeMap<MachineId, ReplicaMember>,
	max_member_id: Option<MemberId>,
}

impl<'a> PeerGroupChanges<'a> {
	fn new(info: &'a PeerGroupInfo) -> Self {
		Self {
			info,
			is_changed: false,
			to_remove_vote: Vec::new(),
			to_add_vote: Vec::new(),
			to_keep_voting: Vec::new(),
			to_keep_non_voting: Vec::new(),
			to_keep_create_non_voting: Vec::new(),
			machine_voting: BTreeMap::new(),
			addrs: BTreeMap::new(),
			members: BTreeMap::new(),
			max_member_id: info.max_member_id(),
		}
	}

	/// Fails on any unassociated member that is still set as a voter.
	/// The presence of any extras at all marks the group as changed.
	fn check_extra_members(&mut self) -> Result<(), Error> {
		for member in self.info.extra() {
			if member.is_voting() {
				return Err(Error::ExtraVotingMember {
					member: member.clone(),
				});
			}
		}
		if !self.info.extra().is_empty() {
			self.is_changed = true;
		}
		Ok(())
	}

	/// Selects the replica-set communication address for every known
	/// machine. Any machine we cannot address fails the whole tick.
	fn select_addresses(&mut self) -> Result<(), Error> {
		let info = self.info;
		for (id, machine) in info.machines() {
			let addr = machine
				.select_mongo_address(info.mongo_port(), info.ha_space())
				.map_err(|source| Error::NoUsableAddress {
					machine: id.clone(),
					source,
				})?;
			self.addrs.insert(id.clone(), addr);
		}
		Ok(())
	}

	/// Partitions the known machines by how their vote might move.
	///
	/// A machine that wants a vote must first join as a non-voter and reach
	/// a healthy primary or secondary state before promotion; this keeps
	/// quorum intact while the new member catches up.
	fn classify(&mut self) {
		let info = self.info;
		for (id, machine) in info.machines() {
			let member = self.members.get(id);
			let is_voting = member.is_some_and(ReplicaMember::is_voting);
			match (machine.wants_vote(), is_voting) {
				(true, true) => {
					tracing::debug!(machine = %id, "machine is already voting");
					self.to_keep_voting.push(id.clone());
				}
				(true, false) => {
					let ready = info
						.statuses()
						.get(id)
						.is_some_and(crate::replica::MemberStatus::is_ready);
					if ready {
						tracing::debug!(machine = %id, "machine is a potential voter");
						self.to_add_vote.push(id.clone());
					} else if member.is_some() {
						tracing::debug!(machine = %id, "machine is not ready to vote");
						self.to_keep_non_voting.push(id.clone());
					} else {
						tracing::debug!(machine = %id, "machine has no member yet");
						self.to_keep_create_non_voting.push(id.clone());
					}
				}
				(false, true) => {
					tracing::debug!(machine = %id, "machine is a potential non-voter");
					self.to_remove_vote.push(id.clone());
				}
				(false, false) => {
					tracing::debug!(machine = %id, "machine does not want the vote");
					self.to_keep_non_voting.push(id.clone());
				}
			}
		}
	}

	/// Trims the proposed vote changes so the resulting voter count stays
	/// odd, without ever demoting the current primary.
	fn review_vote_changes(&mut self) {
		let curr_voters = self
			.members
			.values()
			.filter(|member| member.is_voting())
			.count();
		let kept = curr_voters - self.to_remove_vote.len();

		if (kept + self.to_add_vote.len()) % 2 == 1 {
			tracing::debug!("projected number of voters is odd");
			return;
		}

		if !self.to_add_vote.is_empty() {
			// Delay the last pending promotion to a later tick.
			let deferred = self.to_add_vote.pop();
			tracing::debug!(
				machine = ?deferred,
				"even number of voters projected, deferring one promotion",
			);
			return;
		}

		if kept == 0 {
			// Asked to remove every voter. The one clear odd count to
			// preserve is the current primary on its own.
			tracing::debug!("removing all voters, preserving the primary");
			let info = self.info;
			self.to_remove_vote.retain(|id| !info.is_primary(id));
		} else if let Some(pos) = self
			.to_keep_voting
			.iter()
			.position(|id| !self.info.is_primary(id))
		{
			let demoted = self.to_keep_voting.remove(pos);
			tracing::debug!(
				machine = %demoted,
				"even number of voters projected, demoting one non-primary",
			);
			self.to_remove_vote.push(demoted);
		}
	}

	/// Instantiates a fresh non-voting member for every machine that needs
	/// one, allocating member ids above the highest id observed in the
	/// current set.
	fn create_non_voting_members(&mut self) {
		for id in &self.to_keep_create_non_voting {
			let member_id = allocate(&mut self.max_member_id);
			tracing::debug!(machine = %id, member = %member_id, "creating member");
			self
				.members
				.insert(id.clone(), ReplicaMember::non_voting(member_id, id));
		}
		for id in &self.to_keep_non_voting {
			if self.members.contains_key(id) {
				continue;
			}
			let member_id = allocate(&mut self.max_member_id);
			tracing::debug!(machine = %id, member = %member_id, "creating member");
			self
				.members
				.insert(id.clone(), ReplicaMember::non_voting(member_id, id));
		}
	}

	fn record_initial_voting(&mut self) {
		for (id, member) in &self.members {
			self.machine_voting.insert(id.clone(), member.is_voting());
		}
	}

	/// Applies the reviewed vote changes to the proposed members and the
	/// voting record.
	fn adjust_votes(&mut self) {
		if !self.to_add_vote.is_empty()
			|| !self.to_remove_vote.is_empty()
			|| !self.to_keep_create_non_voting.is_empty()
		{
			self.is_changed = true;
		}

		set_voting(
			&mut self.members,
			&mut self.machine_voting,
			&self.to_add_vote,
			true,
		);
		set_voting(
			&mut self.members,
			&mut self.machine_voting,
			&self.to_remove_vote,
			false,
		);
		set_voting(
			&mut self.members,
			&mut self.machine_voting,
			&self.to_keep_create_non_voting,
			false,
		);
	}

	/// Brings every proposed member's address up to date with the selected
	/// one, marking the group changed where an address moved.
	fn update_addresses(&mut self) {
		for (id, addr) in &self.addrs {
			let Some(member) = self.members.get_mut(id) else {
				continue;
			};
			if member.address() != addr {
				member.set_address(addr.clone());
				self.is_changed = true;
			}
		}
	}

	fn log_decision(&self) {
		let voters =
			self.machine_voting.values().filter(|voting| **voting).count();
		tracing::debug!(
			keep_voting = %self.to_keep_voting.iter().join(","),
			add_vote = %self.to_add_vote.iter().join(","),
			remove_vote = %self.to_remove_vote.iter().join(","),
			keep_non_voting = %self.to_keep_non_voting.iter().join(","),
			create_non_voting = %self.to_keep_create_non_voting.iter().join(","),
			voters,
			changed = self.is_changed,
			"assessed peer group changes",
		);
	}
}

/// Allocates the next member id, bumping the running maximum.
fn allocate(max: &mut Option<MemberId>) -> MemberId {
	let id = max.map_or(MemberId::FIRST, MemberId::next);
	*max = Some(id);
	id
}

fn set_voting(
	members: &mut BTreeMap<MachineId, ReplicaMember>,
	voting: &mut BTreeMap<MachineId, bool>,
	ids: &[MachineId],
	grant: bool,
) {
	for id in ids {
		if let Some(member) = members.get_mut(id) {
			member.set_voting(grant);
		}
		voting.insert(id.clone(), grant);
	}
}
