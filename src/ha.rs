use {
	crate::{
		machine::{Machine, MachineId},
		net::{AddressScope, SpaceName},
	},
	itertools::Itertools,
	serde::{Deserialize, Serialize},
	std::collections::BTreeMap,
};

const DEFAULT_CONTROLLER_COUNT: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// The controller metadata reports no voting machines at all. At least
	/// one voter always exists in a functioning cluster, so this indicates
	/// a bug upstream rather than an operator mistake.
	#[error("failed to find any voting machines")]
	NoVoters,

	#[error("machine {0} is not known to the tracker")]
	UnknownMachine(MachineId),

	#[error(
		"HA space is not set and a unique cloud-local address was not found \
		 for machines: {}",
		.machines.iter().join(", ")
	)]
	NoUniqueCloudLocal { machines: Vec<MachineId> },
}

/// A request to change the number of controllers in the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllersSpec {
	/// The desired number of controllers. Zero means the default of three.
	pub num_controllers: usize,

	/// The series new controller machines should run. When unset, the
	/// series of the first voting machine is used as the template; always
	/// copying from the same machine keeps the cluster in sync.
	pub series: Option<String>,
}

/// The controller metadata a plan is derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerInfo {
	/// All current controller machines.
	pub machine_ids: Vec<MachineId>,

	/// The subset of controller machines intended to vote.
	pub voting_machine_ids: Vec<MachineId>,
}

/// The plan produced by [`plan_controller_changes`]: which machines keep
/// their controller vote, which gain or lose it, and how many new machines
/// must be provisioned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerChanges {
	/// Voting machines that stay voting.
	pub maintained: Vec<MachineId>,

	/// Known non-voting controllers to be promoted.
	pub promoted: Vec<MachineId>,

	/// Voting machines to be demoted. Demoted controllers are kept around
	/// as non-voters rather than destroyed, so a later scale-up can promote
	/// them again without provisioning.
	pub demoted: Vec<MachineId>,

	/// The number of new controller machines to provision.
	pub added: usize,

	/// The series every newly provisioned controller will run.
	pub series: String,
}

/// Derives the controller changes needed to reach the requested controller
/// count.
///
/// Resolves the template series for new machines, and (when no HA space is
/// configured) checks that every current controller exposes exactly one
/// cloud-local address, since without a space there is no other way to pick
/// the replica-set address of a new peer. Whether the requested count is
/// sensible is the caller's concern; the peer-group reconciler keeps the
/// voter count odd regardless of how many controllers exist.
pub fn plan_controller_changes(
	spec: &ControllersSpec,
	info: &ControllerInfo,
	machines: &BTreeMap<MachineId, Machine>,
	ha_space: Option<&SpaceName>,
) -> Result<ControllerChanges, Error> {
	let desired = if spec.num_controllers == 0 {
		DEFAULT_CONTROLLER_COUNT
	} else {
		spec.num_controllers
	};

	let series = match &spec.series {
		Some(series) => series.clone(),
		None => template_series(info, machines)?,
	};

	validate_addresses(info, machines, ha_space)?;

	let voting = sorted(&info.voting_machine_ids);
	let non_voting = sorted(
		&info
			.machine_ids
			.iter()
			.filter(|id| !info.voting_machine_ids.contains(id))
			.cloned()
			.collect::<Vec<_>>(),
	);

	let maintained: Vec<_> = voting.iter().take(desired).cloned().collect();
	let demoted: Vec<_> = voting.iter().skip(desired).cloned().collect();
	let needed = desired - maintained.len();
	let promoted: Vec<_> = non_voting.iter().take(needed).cloned().collect();
	let added = needed - promoted.len();

	tracing::debug!(
		maintained = %maintained.iter().join(","),
		promoted = %promoted.iter().join(","),
		demoted = %demoted.iter().join(","),
		added,
		%series,
		"planned controller changes",
	);

	Ok(ControllerChanges {
		maintained,
		promoted,
		demoted,
		added,
		series,
	})
}

/// The series to stamp on new controllers: that of the first voting
/// machine, in sorted order.
fn template_series(
	info: &ControllerInfo,
	machines: &BTreeMap<MachineId, Machine>,
) -> Result<String, Error> {
	let voting = sorted(&info.voting_machine_ids);
	let template = voting.first().ok_or(Error::NoVoters)?;
	let machine = machines
		.get(template)
		.ok_or_else(|| Error::UnknownMachine(template.clone()))?;
	Ok(machine.series().to_owned())
}

/// With no HA space there is no other code path ensuring new peers can be
/// addressed; every current controller must expose exactly one cloud-local
/// address. With a space set, address selection enforces reachability
/// within it instead.
fn validate_addresses(
	info: &ControllerInfo,
	machines: &BTreeMap<MachineId, Machine>,
	ha_space: Option<&SpaceName>,
) -> Result<(), Error> {
	if ha_space.is_some() {
		return Ok(());
	}

	let mut bad = Vec::new();
	for id in &info.machine_ids {
		let machine = machines
			.get(id)
			.ok_or_else(|| Error::UnknownMachine(id.clone()))?;
		let cloud_local = machine
			.addresses()
			.iter()
			.filter(|addr| addr.scope() == AddressScope::CloudLocal)
			.count();
		if cloud_local != 1 {
			bad.push(id.clone());
		}
	}

	if bad.is_empty() {
		Ok(())
	} else {
		Err(Error::NoUniqueCloudLocal { machines: bad })
	}
}

fn sorted(ids: &[MachineId]) -> Vec<MachineId> {
	let mut ids = ids.to_vec();
	ids.sort();
	ids
}

#[cfg(test)]
mod tests {
	use {
		super::*,
		crate::net::Address,
	};

	fn machine(id: &str, series: &str) -> Machine {
		Machine::new(id, series).with_addresses([Address::new(
			format!("10.0.0.{id}"),
			AddressScope::CloudLocal,
		)])
	}

	fn cluster(ids: &[&str]) -> BTreeMap<MachineId, Machine> {
		ids
			.iter()
			.map(|id| (MachineId::from(*id), machine(id, "noble")))
			.collect()
	}

	fn controller_info(all: &[&str], voting: &[&str]) -> ControllerInfo {
		ControllerInfo {
			machine_ids: all.iter().map(|id| MachineId::from(*id)).collect(),
			voting_machine_ids:
				voting.iter().map(|id| MachineId::from(*id)).collect(),
		}
	}

	#[test]
	fn zero_requested_means_three_controllers() {
		let info = controller_info(&["0"], &["0"]);
		let machines = cluster(&["0"]);

		let plan = plan_controller_changes(
			&ControllersSpec::default(),
			&info,
			&machines,
			None,
		)
		.unwrap();

		assert_eq!(plan.maintained, [MachineId::from("0")]);
		assert_eq!(plan.added, 2);
		assert_eq!(plan.series, "noble");
	}

	#[test]
	fn template_series_comes_from_first_voter() {
		let info = controller_info(&["0", "1", "2"], &["2", "1"]);
		let mut machines = cluster(&["0", "1", "2"]);
		machines.insert(MachineId::from("1"), machine("1", "jammy"));

		let plan = plan_controller_changes(
			&ControllersSpec {
				num_controllers: 3,
				series: None,
			},
			&info,
			&machines,
			None,
		)
		.unwrap();

		// Voting ids sort to ["1", "2"]; machine "1" provides the template.
		assert_eq!(plan.series, "jammy");
	}

	#[test]
	fn no_voting_machines_is_an_internal_error() {
		let info = controller_info(&["0"], &[]);
		let machines = cluster(&["0"]);

		assert!(matches!(
			plan_controller_changes(
				&ControllersSpec::default(),
				&info,
				&machines,
				None,
			),
			Err(Error::NoVoters)
		));
	}

	#[test]
	fn explicit_series_skips_the_template() {
		let info = controller_info(&["0"], &[]);
		let machines = cluster(&["0"]);

		// No voters, but the request names a series, so no template is needed.
		let plan = plan_controller_changes(
			&ControllersSpec {
				num_controllers: 3,
				series: Some("jammy".to_owned()),
			},
			&info,
			&machines,
			None,
		)
		.unwrap();

		assert_eq!(plan.series, "jammy");
		assert_eq!(plan.added, 3);
	}

	#[test]
	fn ambiguous_addresses_fail_without_ha_space() {
		let info = controller_info(&["0", "1"], &["0"]);
		let mut machines = cluster(&["0", "1"]);
		machines.insert(
			MachineId::from("1"),
			Machine::new("1", "noble").with_addresses([
				Address::new("10.0.0.1", AddressScope::CloudLocal),
				Address::new("10.1.0.1", AddressScope::CloudLocal),
			]),
		);

		let err = plan_controller_changes(
			&ControllersSpec::default(),
			&info,
			&machines,
			None,
		)
		.unwrap_err();
		assert!(matches!(
			err,
			Error::NoUniqueCloudLocal { machines } if machines == [MachineId::from("1")]
		));

		// The same cluster passes once an HA space takes over selection.
		let space = SpaceName::from("ha");
		let machines = {
			let mut machines = cluster(&["0", "1"]);
			machines.insert(
				MachineId::from("1"),
				Machine::new("1", "noble").with_addresses([
					Address::new("10.0.0.1", AddressScope::CloudLocal)
						.in_space("ha"),
					Address::new("10.1.0.1", AddressScope::CloudLocal),
				]),
			);
			machines
		};
		plan_controller_changes(
			&ControllersSpec::default(),
			&info,
			&machines,
			Some(&space),
		)
		.unwrap();
	}

	#[test]
	fn known_controllers_are_promoted_before_adding() {
		let info = controller_info(&["0", "1", "2"], &["0"]);
		let machines = cluster(&["0", "1", "2"]);

		let plan = plan_controller_changes(
			&ControllersSpec {
				num_controllers: 5,
				series: None,
			},
			&info,
			&machines,
			None,
		)
		.unwrap();

		assert_eq!(plan.maintained, [MachineId::from("0")]);
		assert_eq!(
			plan.promoted,
			[MachineId::from("1"), MachineId::from("2")]
		);
		assert_eq!(plan.added, 2);
		assert!(plan.demoted.is_empty());
	}

	#[test]
	fn excess_voters_are_demoted_not_removed() {
		let info = controller_info(
			&["0", "1", "2", "3", "4"],
			&["0", "1", "2", "3", "4"],
		);
		let machines = cluster(&["0", "1", "2", "3", "4"]);

		let plan = plan_controller_changes(
			&ControllersSpec {
				num_controllers: 3,
				series: None,
			},
			&info,
			&machines,
			None,
		)
		.unwrap();

		assert_eq!(
			plan.maintained,
			[MachineId::from("0"), MachineId::from("1"), MachineId::from("2")]
		);
		assert_eq!(plan.demoted, [MachineId::from("3"), MachineId::from("4")]);
		assert_eq!(plan.added, 0);
		assert!(plan.promoted.is_empty());
	}
}
