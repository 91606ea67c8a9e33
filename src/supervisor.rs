//! # Supervisor
//!
//! Wires channels to worker pools, runs a bounded session and shuts it down.
//!
//! ## Data flow
//!
//! ```text
//! heartbeat_sender ──► link
//! heartbeat_receiver ──► [liveness] ─────────────────────────────► supervisor
//! telemetry ──► [snapshots] ──► command ──► [directives] ───────► supervisor
//! ```
//!
//! ## Shutdown
//!
//! 1. Request exit on the shared controller
//! 2. Fill and drain every channel sink-to-source: directives, snapshots, liveness.
//!    Directives and liveness states still queued are taken first and
//!    accounted like any other output; queued snapshots are discarded.
//! 3. Join each pool with a bounded wait, aborting stragglers
//!
//! Draining the downstream channel first frees any producer parked on a full
//! output before its own input is torn down.
//!
//! Recorded outputs are batched per observation tick and written on the
//! blocking pool.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::command::decision::command_worker;
use crate::command::{Command, Directive};
use crate::config::Config;
use crate::error::{Result, SupervisorError};
use crate::heartbeat::receiver::heartbeat_receiver_worker;
use crate::heartbeat::sender::heartbeat_sender_worker;
use crate::heartbeat::{HeartbeatReceiver, HeartbeatSender, LivenessState};
use crate::telemetry::fuser::{telemetry_worker, Telemetry};
use crate::telemetry::recorder::{RecordBatch, RecordKind, SessionRecorder};
use crate::telemetry::TelemetrySnapshot;
use crate::transport::VehicleLink;
use crate::worker::{BoundedChannel, JoinReport, WorkerController, WorkerPool};

/// Stand-in deadline for session durations past what `Instant` can represent
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Why the observation phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    DurationElapsed,
    PeerLost,
    Interrupted,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::DurationElapsed => f.write_str("session duration elapsed"),
            EndReason::PeerLost => f.write_str("vehicle no longer present"),
            EndReason::Interrupted => f.write_str("interrupted"),
        }
    }
}

/// Summary of one supervised session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub reason: EndReason,
    /// Liveness states consumed from the heartbeat output
    pub liveness_updates: usize,
    /// Directives consumed from the command output
    pub directives: usize,
    pub last_liveness: Option<LivenessState>,
    pub last_directive: Option<Directive>,
    /// Items discarded by the shutdown drain per channel, in drain order,
    /// fillers included
    pub drained: Vec<(&'static str, usize)>,
    pub workers: JoinReport,
}

impl SessionReport {
    fn new() -> Self {
        Self {
            reason: EndReason::DurationElapsed,
            liveness_updates: 0,
            directives: 0,
            last_liveness: None,
            last_directive: None,
            drained: Vec::new(),
            workers: JoinReport::default(),
        }
    }

    fn take_liveness(&mut self, state: LivenessState, batch: Option<&mut RecordBatch>) {
        if self.last_liveness != Some(state) {
            info!("Vehicle liveness: {}", state);
        }
        self.liveness_updates += 1;
        self.last_liveness = Some(state);
        if let Some(batch) = batch {
            batch.push(RecordKind::Heartbeat, &state);
        }
    }

    fn take_directive(&mut self, directive: Directive, batch: Option<&mut RecordBatch>) {
        info!("{}", directive);
        self.directives += 1;
        self.last_directive = Some(directive);
        if let Some(batch) = batch {
            batch.push(RecordKind::Directive, &directive);
        }
    }
}

/// Hands `batch` to the recorder, if recording is still on.
async fn persist(recorder: &mut Option<SessionRecorder>, batch: Option<RecordBatch>) {
    if let (Some(current), Some(batch)) = (recorder.take(), batch) {
        *recorder = current.persist(batch).await;
    }
}

/// Channels connecting the worker roles.
#[derive(Debug, Clone)]
struct Channels {
    liveness: BoundedChannel<LivenessState>,
    snapshots: BoundedChannel<TelemetrySnapshot>,
    directives: BoundedChannel<Directive>,
}

/// Owns the session configuration, the shared link and the lifecycle flags.
pub struct Supervisor {
    config: Config,
    link: Arc<dyn VehicleLink>,
    controller: WorkerController,
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("config", &self.config)
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    pub fn new(config: Config, link: Arc<dyn VehicleLink>) -> Self {
        Self {
            config,
            link,
            controller: WorkerController::new(),
        }
    }

    /// Lifecycle flags shared with every worker. Pausing here pauses them all.
    pub fn controller(&self) -> WorkerController {
        self.controller.clone()
    }

    /// Waits for the vehicle to announce itself.
    ///
    /// # Errors
    ///
    /// [`SupervisorError::Config`] for an invalid configuration,
    /// [`SupervisorError::PeerNotFound`] if the vehicle stays silent past the
    /// peer timeout and a peer is required.
    pub async fn connect(&self) -> Result<()> {
        self.config.validate()?;
        let timeout = self.config.connection.peer_timeout();
        info!("Waiting up to {:?} for the vehicle", timeout);

        if self.link.wait_for_peer(timeout).await {
            info!("Vehicle found");
            Ok(())
        } else if self.config.connection.require_peer {
            Err(SupervisorError::PeerNotFound(timeout))
        } else {
            warn!("No vehicle heartbeat within {:?}, continuing anyway", timeout);
            Ok(())
        }
    }

    /// Runs one session, ending early on Ctrl+C.
    pub async fn run(&self) -> Result<SessionReport> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Cannot listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Runs one session, ending early when `interrupt` completes.
    ///
    /// # Errors
    ///
    /// Setup failures only: an invalid configuration or an unusable recorder
    /// directory. Nothing has been started when an error is returned.
    pub async fn run_until<F>(&self, interrupt: F) -> Result<SessionReport>
    where
        F: Future<Output = ()>,
    {
        self.config.validate()?;
        let channels = Channels {
            liveness: BoundedChannel::new(self.config.heartbeat.queue_size),
            snapshots: BoundedChannel::new(self.config.telemetry.queue_size),
            directives: BoundedChannel::new(self.config.command.queue_size),
        };
        let mut recorder = if self.config.recorder.enabled {
            Some(SessionRecorder::new(self.config.recorder.settings())?)
        } else {
            None
        };
        let mut pools = self.create_pools(&channels)?;

        for pool in pools.iter_mut() {
            pool.start();
        }
        info!("Session started for {:?}", self.config.session.duration());

        let mut report = SessionReport::new();
        let reason = self
            .observe(&channels, &mut report, &mut recorder, interrupt)
            .await;
        report.reason = reason;
        info!("Stopping session: {}", report.reason);

        self.shutdown(&channels, &mut pools, &mut report, &mut recorder)
            .await;

        info!(
            "Session finished: {} liveness updates, {} directives, {} workers finished, {} faulted, {} forced",
            report.liveness_updates,
            report.directives,
            report.workers.finished,
            report.workers.faulted,
            report.workers.forced
        );
        Ok(report)
    }

    /// Stops every worker: request exit, drain sink-to-source, join in reverse.
    async fn shutdown(
        &self,
        channels: &Channels,
        pools: &mut [WorkerPool],
        report: &mut SessionReport,
        recorder: &mut Option<SessionRecorder>,
    ) {
        self.controller.request_exit();

        let mut batch = recorder.is_some().then(RecordBatch::new);
        for directive in channels.directives.drain() {
            report.take_directive(directive, batch.as_mut());
        }
        let discarded = channels.directives.fill_and_drain(|| Directive::NoAction).await;
        report.drained.push(("directives", discarded));

        let discarded = channels.snapshots.fill_and_drain(TelemetrySnapshot::default).await;
        report.drained.push(("snapshots", discarded));

        for state in channels.liveness.drain() {
            report.take_liveness(state, batch.as_mut());
        }
        let discarded = channels
            .liveness
            .fill_and_drain(|| LivenessState::Disconnected)
            .await;
        report.drained.push(("liveness", discarded));
        debug!("Shutdown drain discarded {:?}", report.drained);

        let join_timeout = self.config.session.join_timeout();
        for pool in pools.iter_mut().rev() {
            report.workers = report.workers + pool.join(join_timeout).await;
        }

        persist(recorder, batch).await;
    }

    /// Builds one pool per role, in data-flow order.
    fn create_pools(&self, channels: &Channels) -> Result<Vec<WorkerPool>> {
        let poll = self.config.workers.poll_interval();
        let heartbeat = &self.config.heartbeat;
        let period = heartbeat.period();

        let sender = HeartbeatSender::new(Arc::clone(&self.link));
        let heartbeat_sender = WorkerPool::create(
            "heartbeat_sender",
            heartbeat.sender_count,
            self.controller.clone(),
            move |ctx| heartbeat_sender_worker(ctx, sender.clone(), period, poll),
        )?;

        let link = Arc::clone(&self.link);
        let threshold = heartbeat.disconnect_threshold;
        let output = channels.liveness.clone();
        let heartbeat_receiver = WorkerPool::create(
            "heartbeat_receiver",
            heartbeat.receiver_count,
            self.controller.clone(),
            move |ctx| {
                let receiver = HeartbeatReceiver::new(Arc::clone(&link), threshold);
                let output = output.clone();
                async move { heartbeat_receiver_worker(ctx, receiver?, output, period, poll).await }
            },
        )?;

        let telemetry = Telemetry::new(Arc::clone(&self.link), self.config.telemetry.budget())?;
        let output = channels.snapshots.clone();
        let telemetry_pool = WorkerPool::create(
            "telemetry",
            self.config.telemetry.count,
            self.controller.clone(),
            move |ctx| telemetry_worker(ctx, telemetry.clone(), output.clone(), poll),
        )?;

        let link = Arc::clone(&self.link);
        let target = self.config.command.target;
        let thresholds = self.config.command.thresholds();
        let (input, output) = (channels.snapshots.clone(), channels.directives.clone());
        let command_pool = WorkerPool::create(
            "command",
            self.config.command.count,
            self.controller.clone(),
            move |ctx| {
                let command = Command::new(Arc::clone(&link), target, thresholds);
                let (input, output) = (input.clone(), output.clone());
                async move { command_worker(ctx, command?, input, output, poll).await }
            },
        )?;

        Ok(vec![heartbeat_sender, heartbeat_receiver, telemetry_pool, command_pool])
    }

    /// Consumes terminal outputs until the session ends.
    async fn observe<F>(
        &self,
        channels: &Channels,
        report: &mut SessionReport,
        recorder: &mut Option<SessionRecorder>,
        interrupt: F,
    ) -> EndReason
    where
        F: Future<Output = ()>,
    {
        let duration = self.config.session.duration();
        let deadline = Instant::now()
            .checked_add(duration)
            .unwrap_or_else(|| Instant::now() + FAR_FUTURE);
        let session_end = sleep_until(deadline);
        tokio::pin!(session_end);
        tokio::pin!(interrupt);

        let mut ticker = interval(self.config.session.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = &mut interrupt => return EndReason::Interrupted,
                _ = &mut session_end => return EndReason::DurationElapsed,
                _ = ticker.tick() => {
                    let mut batch = recorder.is_some().then(RecordBatch::new);
                    while let Some(state) = channels.liveness.try_get() {
                        report.take_liveness(state, batch.as_mut());
                    }
                    while let Some(directive) = channels.directives.try_get() {
                        report.take_directive(directive, batch.as_mut());
                    }
                    if batch.as_ref().is_some_and(|b| !b.is_empty()) {
                        persist(recorder, batch).await;
                    }

                    if !self.link.is_peer_present() {
                        return EndReason::PeerLost;
                    }
                }
            }
        }
    }
}
