//! The reconciler: a single task that owns the snapshot.
//!
//! Every merge, query and command goes through one bounded inbox, so updates
//! are applied strictly in arrival order and no lock guards the tree.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ensemble_eval_core::command::Command;
use ensemble_eval_core::event::Event;
use ensemble_eval_core::snapshot::{Job, PartialSnapshot, Snapshot, SnapshotDelta, SnapshotExport};
use ensemble_eval_core::status::EnsembleStatus;
use ensemble_eval_net::ordering::SequenceGuard;
use ensemble_eval_net::protocol::{Message, MessageEnvelope, MessageType};

use crate::{ControlState, ReconcilerConfig, Result, RuntimeError};

type Reply = oneshot::Sender<Result<()>>;
type ReadFn = Box<dyn FnOnce(&Snapshot) + Send>;

enum Request {
    Partial(PartialSnapshot, Reply),
    Delta(SnapshotDelta, Reply),
    Event(Event, Reply),
    Envelope(MessageEnvelope, Reply),
    Command(Command, Reply),
    Read(ReadFn),
    Shutdown,
}

/// Spawns the reconciler task.
pub struct Reconciler;

impl Reconciler {
    /// Start a reconciler that owns `snapshot`.
    ///
    /// The join handle resolves to the final snapshot once the actor stops,
    /// either on `Terminate`, on [`ReconcilerHandle::shutdown`], or when every
    /// handle has been dropped. Must be called from within a Tokio runtime.
    pub fn spawn(
        snapshot: Snapshot,
        config: ReconcilerConfig,
    ) -> Result<(ReconcilerHandle, JoinHandle<Snapshot>)> {
        let guard = if config.enforce_sequencing {
            Some(SequenceGuard::try_with_config(
                config.max_tracked_sources,
                config.sequence_window,
            )?)
        } else {
            None
        };

        let (requests, inbox) = mpsc::channel(config.inbox_capacity.max(1));
        let (updates, _) = broadcast::channel(config.subscriber_capacity.max(1));
        let (control_tx, control_rx) = watch::channel(ControlState::Running);

        let actor = Actor {
            snapshot,
            inbox,
            updates: updates.clone(),
            control: control_tx,
            guard,
        };
        let task = tokio::spawn(actor.run());

        let handle = ReconcilerHandle {
            requests,
            updates,
            control: control_rx,
        };
        Ok((handle, task))
    }
}

/// Cloneable front door to a running reconciler.
#[derive(Clone)]
pub struct ReconcilerHandle {
    requests: mpsc::Sender<Request>,
    updates: broadcast::Sender<Arc<SnapshotDelta>>,
    control: watch::Receiver<ControlState>,
}

impl ReconcilerHandle {
    /// Merge a partial snapshot. Resolves once the merge has been applied or rejected.
    pub async fn submit(&self, partial: PartialSnapshot) -> Result<()> {
        self.call(|reply| Request::Partial(partial, reply)).await
    }

    /// Merge a delta received from elsewhere; paths are validated first.
    pub async fn submit_delta(&self, delta: SnapshotDelta) -> Result<()> {
        self.call(|reply| Request::Delta(delta, reply)).await
    }

    /// Record and merge a single worker event.
    pub async fn submit_event(&self, event: Event) -> Result<()> {
        self.call(|reply| Request::Event(event, reply)).await
    }

    /// Decode an envelope and route its payload.
    pub async fn submit_envelope(&self, envelope: MessageEnvelope) -> Result<()> {
        self.call(|reply| Request::Envelope(envelope, reply)).await
    }

    /// Apply a control command.
    pub async fn send_command(&self, command: Command) -> Result<()> {
        self.call(|reply| Request::Command(command, reply)).await
    }

    /// Run `f` against the current snapshot inside the actor.
    pub async fn read<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&Snapshot) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let read: ReadFn = Box::new(move |snapshot| {
            let _ = tx.send(f(snapshot));
        });
        self.requests
            .send(Request::Read(read))
            .await
            .map_err(|_| RuntimeError::Stopped)?;
        rx.await.map_err(|_| RuntimeError::Stopped)
    }

    /// Full export of the current snapshot.
    pub async fn snapshot(&self) -> Result<SnapshotExport> {
        self.read(Snapshot::export).await
    }

    /// Current ensemble status.
    pub async fn status(&self) -> Result<EnsembleStatus> {
        self.read(Snapshot::get_status).await
    }

    /// Current record of one job.
    pub async fn job(&self, real: &str, stage: &str, step: &str, job: &str) -> Result<Job> {
        let path = [real, stage, step, job].map(str::to_string);
        self.read(move |snapshot| {
            let [real, stage, step, job] = &path;
            snapshot.get_job(real, stage, step, job).cloned()
        })
        .await?
        .map_err(RuntimeError::from)
    }

    /// Receive every delta merged after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<SnapshotDelta>> {
        self.updates.subscribe()
    }

    /// Watch the control state.
    pub fn control(&self) -> watch::Receiver<ControlState> {
        self.control.clone()
    }

    /// Stop the actor after the requests already queued.
    pub async fn shutdown(&self) -> Result<()> {
        self.requests
            .send(Request::Shutdown)
            .await
            .map_err(|_| RuntimeError::Stopped)
    }

    async fn call(&self, request: impl FnOnce(Reply) -> Request) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(request(tx))
            .await
            .map_err(|_| RuntimeError::Stopped)?;
        rx.await.map_err(|_| RuntimeError::Stopped)?
    }
}

struct Actor {
    snapshot: Snapshot,
    inbox: mpsc::Receiver<Request>,
    updates: broadcast::Sender<Arc<SnapshotDelta>>,
    control: watch::Sender<ControlState>,
    guard: Option<SequenceGuard>,
}

impl Actor {
    async fn run(mut self) -> Snapshot {
        info!(
            realizations = self.snapshot.realization_ids().count(),
            sequencing = self.guard.is_some(),
            "reconciler started"
        );

        while let Some(request) = self.inbox.recv().await {
            let (result, reply) = match request {
                Request::Partial(partial, reply) => (self.merge_partial(partial), reply),
                Request::Delta(delta, reply) => (self.merge_delta(delta), reply),
                Request::Event(event, reply) => (self.merge_event(&event), reply),
                Request::Envelope(envelope, reply) => (self.route(envelope), reply),
                Request::Command(command, reply) => {
                    self.command(command);
                    (Ok(()), reply)
                }
                Request::Read(read) => {
                    read(&self.snapshot);
                    continue;
                }
                Request::Shutdown => break,
            };

            if let Err(err) = &result {
                warn!(error = %err, "update rejected");
            }
            let _ = reply.send(result);

            if *self.control.borrow() == ControlState::Terminated {
                break;
            }
        }

        info!(status = %self.snapshot.get_status(), "reconciler stopped");
        self.snapshot
    }

    fn merge_partial(&mut self, partial: PartialSnapshot) -> Result<()> {
        let delta = self.wants_updates().then(|| partial.delta().clone());
        let jobs = partial.delta().job_count();
        self.snapshot.merge_event(partial)?;
        debug!(jobs, "merged partial snapshot");
        self.publish(delta);
        Ok(())
    }

    fn merge_delta(&mut self, delta: SnapshotDelta) -> Result<()> {
        let published = self.wants_updates().then(|| delta.clone());
        let jobs = delta.job_count();
        self.snapshot.merge_delta(delta)?;
        debug!(jobs, "merged delta");
        self.publish(published);
        Ok(())
    }

    fn merge_event(&mut self, event: &Event) -> Result<()> {
        let mut partial = PartialSnapshot::new(&self.snapshot);
        partial.record_event(event)?;
        self.merge_partial(partial)
    }

    fn route(&mut self, envelope: MessageEnvelope) -> Result<()> {
        // Commands carry no per-sender sequence.
        let sequenced = envelope.message_type != MessageType::Command;
        if let Some(guard) = self.guard.as_ref().filter(|_| sequenced) {
            guard
                .verify(&envelope.sender, envelope.sequence)
                .map_err(ensemble_eval_net::Error::from)?;
        }

        match envelope.decode()? {
            Message::Event(event) => self.merge_event(&event)?,
            Message::SnapshotUpdate(delta) => self.merge_delta(delta)?,
            Message::Command(command) => self.command(command),
            Message::FullSnapshot(_) => {
                return Err(RuntimeError::UnexpectedMessage(envelope.message_type))
            }
        }

        if let Some(guard) = self.guard.as_mut().filter(|_| sequenced) {
            guard.record(&envelope.sender, envelope.sequence);
        }
        Ok(())
    }

    fn command(&mut self, command: Command) {
        let next = match command {
            Command::Pause => ControlState::Paused,
            Command::Terminate => ControlState::Terminated,
        };
        info!(command = command.kind(), "command received");
        let previous = self.control.send_replace(next);
        if previous != next {
            info!(from = ?previous, to = ?next, "control state changed");
        }
    }

    fn wants_updates(&self) -> bool {
        self.updates.receiver_count() > 0
    }

    fn publish(&self, delta: Option<SnapshotDelta>) {
        if let Some(delta) = delta.filter(|d| !d.is_empty()) {
            // No receivers left is not an error for the actor.
            let _ = self.updates.send(Arc::new(delta));
        }
    }
}
