use {
	super::Error,
	crate::{
		machine::{Machine, MachineId},
		net::SpaceName,
		replica::{MemberId, MemberStatus, ReplicaMember},
	},
	core::fmt,
	std::collections::BTreeMap,
};

/// A consistent input snapshot for one reconciliation tick.
///
/// Notes:
///
/// - Built once per tick from the collaborator reads and discarded after
///   the diff is emitted. Owns all of its data; no references into the
///   machine tracker or the replica-set driver survive construction.
///
/// - Every input member lands in exactly one of `recognised` (tagged with a
///   known machine id) or `extra` (unassociated); statuses are re-keyed by
///   machine id for the recognised subset.
pub struct PeerGroupInfo {
	machines: BTreeMap<MachineId, Machine>,
	recognised: BTreeMap<MachineId, ReplicaMember>,
	statuses: BTreeMap<MachineId, MemberStatus>,
	extra: Vec<ReplicaMember>,
	max_member_id: Option<MemberId>,
	mongo_port: u16,
	ha_space: Option<SpaceName>,
}

impl PeerGroupInfo {
	/// Assembles a snapshot from the collaborator reads.
	///
	/// Fails with [`Error::EmptyMemberSet`] when the replica set has no
	/// current members.
	pub fn new(
		machines: BTreeMap<MachineId, Machine>,
		members: Vec<ReplicaMember>,
		statuses: Vec<MemberStatus>,
		mongo_port: u16,
		ha_space: Option<SpaceName>,
	) -> Result<Self, Error> {
		if members.is_empty() {
			return Err(Error::EmptyMemberSet);
		}

		let mut info = Self {
			machines,
			recognised: BTreeMap::new(),
			statuses: BTreeMap::new(),
			extra: Vec::new(),
			max_member_id: None,
			mongo_port,
			ha_space,
		};

		// Associate each member with a machine where possible and link the
		// member statuses under the machine id. The status scan is O(M*S),
		// but M is bounded by the controller count; no index is worth it.
		for member in members {
			if info
				.max_member_id
				.is_none_or(|max| member.id() > max)
			{
				info.max_member_id = Some(member.id());
			}

			let machine_id = member
				.machine_id()
				.filter(|id| info.machines.contains_key(id));

			let Some(machine_id) = machine_id else {
				info.extra.push(member);
				continue;
			};

			if let Some(status) =
				statuses.iter().find(|status| status.id() == member.id())
			{
				info.statuses.insert(machine_id.clone(), status.clone());
			}
			info.recognised.insert(machine_id, member);
		}

		Ok(info)
	}

	pub const fn machines(&self) -> &BTreeMap<MachineId, Machine> {
		&self.machines
	}

	pub const fn recognised(&self) -> &BTreeMap<MachineId, ReplicaMember> {
		&self.recognised
	}

	pub const fn statuses(&self) -> &BTreeMap<MachineId, MemberStatus> {
		&self.statuses
	}

	pub fn extra(&self) -> &[ReplicaMember] {
		&self.extra
	}

	/// The highest member id observed across the entire input, including
	/// extras. `None` when construction saw no members (which construction
	/// rejects), so allocation always starts above the live set.
	pub const fn max_member_id(&self) -> Option<MemberId> {
		self.max_member_id
	}

	pub const fn mongo_port(&self) -> u16 {
		self.mongo_port
	}

	pub const fn ha_space(&self) -> Option<&SpaceName> {
		self.ha_space.as_ref()
	}

	/// True when the machine's member reports the primary state.
	pub(super) fn is_primary(&self, id: &MachineId) -> bool {
		self
			.statuses
			.get(id)
			.is_some_and(|status| status.state() == crate::replica::MemberState::Primary)
	}

	/// Seeds the mutable proposal map for a new desired peer group with a
	/// fresh owned copy of every recognised member.
	pub(super) fn seed_members(&self) -> BTreeMap<MachineId, ReplicaMember> {
		self
			.recognised
			.iter()
			.map(|(id, member)| (id.clone(), member.clone()))
			.collect()
	}
}

impl fmt::Debug for PeerGroupInfo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(
			f,
			"desired peer group (max member id: {:?})",
			self.max_member_id.map(u32::from),
		)?;
		for (id, member) in &self.recognised {
			writeln!(
				f,
				"   machine {id}: rs_id={}, rs_addr={}",
				member.id(),
				member.address(),
			)?;
		}
		if !self.extra.is_empty() {
			writeln!(f, "other members:")?;
			for member in &self.extra {
				writeln!(
					f,
					"   rs_id={}, rs_addr={}, tags={:?}, vote={}",
					member.id(),
					member.address(),
					member.tags(),
					member.is_voting(),
				)?;
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use {
		super::*,
		crate::{
			net::{Address, AddressScope},
			replica::MemberState,
		},
	};

	fn machine(id: &str) -> Machine {
		Machine::new(id, "noble")
			.with_vote(true)
			.with_addresses([Address::new(
				format!("10.0.0.{id}"),
				AddressScope::CloudLocal,
			)])
	}

	fn machines(ids: &[&str]) -> BTreeMap<MachineId, Machine> {
		ids
			.iter()
			.map(|id| (MachineId::from(*id), machine(id)))
			.collect()
	}

	#[test]
	fn empty_member_set_is_rejected() {
		let err = PeerGroupInfo::new(
			machines(&["0"]),
			Vec::new(),
			Vec::new(),
			37017,
			None,
		)
		.unwrap_err();
		assert!(matches!(err, Error::EmptyMemberSet));
	}

	#[test]
	fn members_split_into_recognised_and_extra() {
		let m0 = MachineId::from("0");
		let members = vec![
			ReplicaMember::existing(1u32, "10.0.0.0:37017", Some(&m0)),
			ReplicaMember::existing(9u32, "10.0.9.9:37017", None).without_vote(),
			// tagged, but the machine is not known to the tracker
			ReplicaMember::existing(
				4u32,
				"10.0.0.4:37017",
				Some(&MachineId::from("4")),
			)
			.without_vote(),
		];
		let statuses =
			vec![MemberStatus::new(1u32, MemberState::Primary, true)];

		let info =
			PeerGroupInfo::new(machines(&["0"]), members, statuses, 37017, None)
				.unwrap();

		assert_eq!(info.recognised().len(), 1);
		assert!(info.recognised().contains_key(&m0));
		assert_eq!(info.extra().len(), 2);
		assert_eq!(info.max_member_id(), Some(9u32.into()));
		assert!(info.statuses().contains_key(&m0));
		assert!(info.is_primary(&m0));
	}

	#[test]
	fn seeded_members_are_owned_copies() {
		let m0 = MachineId::from("0");
		let members =
			vec![ReplicaMember::existing(1u32, "10.0.0.0:37017", Some(&m0))];
		let info =
			PeerGroupInfo::new(machines(&["0"]), members, Vec::new(), 37017, None)
				.unwrap();

		let mut seeded = info.seed_members();
		seeded.get_mut(&m0).unwrap().set_address("10.9.9.9:37017");

		assert_eq!(info.recognised()[&m0].address(), "10.0.0.0:37017");
	}
}
