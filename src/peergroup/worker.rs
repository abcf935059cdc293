use {
	super::{Config, ConfigSource, Error, PeerGroupInfo, desired_peer_group},
	crate::{machine::MachineTracker, replica::ReplicaSetDriver},
	tokio::{
		sync::{
			mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
			oneshot,
		},
		task::JoinHandle,
		time::{MissedTickBehavior, interval},
	},
	tokio_util::sync::CancellationToken,
};

/// Handle to a running reconciliation worker.
///
/// This struct is instantiated by [`WorkerLoop::spawn`] and provides the
/// interface to interact with the worker loop.
pub struct Handle {
	commands: UnboundedSender<Command>,
	cancel: CancellationToken,
	task: JoinHandle<()>,
}

impl Handle {
	/// Requests an immediate reconciliation tick and waits for it to
	/// complete. The outcome (including any error) is observable only
	/// through the replica-set driver and the logs, exactly as for timed
	/// ticks.
	pub async fn trigger(&self) {
		let (tx, rx) = oneshot::channel();
		self.commands.send(Command::Reconcile(tx)).ok();
		let _ = rx.await;
	}

	/// Stops the worker loop. An in-flight tick is abandoned before any
	/// diff is handed to the driver.
	pub async fn shutdown(self) {
		self.cancel.cancel();
		let _ = self.task.await;
	}
}

/// The long-lived worker hosting the peer-group reconciler.
///
/// The loop is woken by a periodic timer, by machine-tracker change
/// notifications, by replica-set change notifications, and by explicit
/// [`Handle::trigger`] requests. Each wake runs exactly one reconciliation
/// tick; ticks are serialised by construction.
///
/// Tick errors are logged and retried on the next wake. The worker owns no
/// mutable shared state: all durable state lives with the collaborators and
/// is re-read every tick.
pub struct WorkerLoop<T, D, C> {
	tracker: T,
	driver: D,
	config_source: C,
	config: Config,
	cancel: CancellationToken,
	commands: UnboundedReceiver<Command>,
}

impl<T, D, C> WorkerLoop<T, D, C>
where
	T: MachineTracker + 'static,
	D: ReplicaSetDriver + 'static,
	C: ConfigSource + 'static,
{
	/// Constructs a reconciliation worker and spawns it as a background
	/// task, returning the handle to interact with it.
	pub fn spawn(tracker: T, driver: D, config_source: C, config: Config) -> Handle {
		let cancel = CancellationToken::new();
		let (commands_tx, commands_rx) = unbounded_channel();

		let worker = Self {
			tracker,
			driver,
			config_source,
			config,
			cancel: cancel.clone(),
			commands: commands_rx,
		};

		let task = tokio::spawn(worker.run());

		Handle {
			commands: commands_tx,
			cancel,
			task,
		}
	}

	async fn run(mut self) {
		let mut machines = self.tracker.watch();
		let mut replica = self.driver.watch();

		// Force an immediate first tick so a freshly started worker
		// converges without waiting out the timer.
		machines.mark_changed();

		let mut tick = interval(self.config.tick_interval);
		tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

		loop {
			let ack: Option<oneshot::Sender<()>> = tokio::select! {
				() = self.cancel.cancelled() => {
					tracing::info!("peer-group worker terminating");
					return;
				}

				_ = tick.tick() => None,

				Ok(()) = machines.changed() => {
					tracing::debug!("woken by machine tracker");
					None
				}

				Ok(()) = replica.changed() => {
					tracing::debug!("woken by replica-set driver");
					None
				}

				Some(Command::Reconcile(ack)) = self.commands.recv() => Some(ack),
			};

			// One tick per wake. Cancellation abandons the tick before any
			// diff reaches the driver; the driver applies atomically.
			tokio::select! {
				() = self.cancel.cancelled() => {
					tracing::info!("peer-group worker terminating mid-tick");
					return;
				}

				result = self.reconcile() => match result {
					Ok(applied) => {
						tracing::debug!(applied, "reconciliation tick complete");
					}
					Err(error) => {
						tracing::warn!(%error, "reconciliation tick failed");
					}
				}
			}

			if let Some(ack) = ack {
				ack.send(()).ok();
			}
		}
	}

	/// Runs a single reconciliation tick: snapshot the collaborators,
	/// compute the desired peer group, and hand the outcome to the driver.
	/// Returns whether a membership change was proposed.
	async fn reconcile(&self) -> Result<bool, Error> {
		let machines = self.tracker.known_machines();
		let members = self.driver.current_members().await?;
		let statuses = self.driver.current_statuses().await?;

		let info = PeerGroupInfo::new(
			machines,
			members,
			statuses,
			self.config_source.mongo_port(),
			self.config_source.ha_space(),
		)?;

		let (members, voting) = desired_peer_group(&info)?;
		let applied = members.is_some();

		self.driver.apply_members(members, voting).await?;

		Ok(applied)
	}
}

/// Commands sent to the worker loop.
enum Command {
	/// Runs a reconciliation tick now and acknowledges its completion.
	Reconcile(oneshot::Sender<()>),
}
