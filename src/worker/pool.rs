//! # Worker Pool
//!
//! Owns `count` homogeneous workers of one role, launches them as independent
//! tokio tasks and joins them on shutdown.
//!
//! Each unit gets its own [`WorkerContext`] (role, instance index and a clone
//! of the shared [`WorkerController`]) and runs inside a `worker` tracing span,
//! which is the per-instance named logger. Channels and the vehicle link are
//! captured by the work closure and cloned per instance.
//!
//! Units that fail or panic are logged and stay terminated; there is no
//! restart policy.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

use crate::error::{Result, SupervisorError};
use crate::worker::channel::BoundedChannel;
use crate::worker::controller::WorkerController;

type WorkFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type WorkFn = Arc<dyn Fn(WorkerContext) -> WorkFuture + Send + Sync>;

/// Per-instance handles passed to a work function.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    /// Role name shared by every instance of the pool
    pub role: Arc<str>,
    /// Zero-based instance index within the pool
    pub instance: usize,
    /// Shared lifecycle flags
    pub controller: WorkerController,
}

impl WorkerContext {
    /// Puts `item` on `channel`, retrying every `poll` while it is full.
    ///
    /// Gives up once exit is requested and returns false, so a worker never
    /// stays parked on an output nobody drains.
    pub async fn publish<T>(&self, channel: &BoundedChannel<T>, item: T, poll: Duration) -> bool {
        let mut item = item;
        loop {
            match channel.put_timeout(item, poll).await {
                Ok(()) => return true,
                Err(rejected) => {
                    if self.controller.is_exit_requested() {
                        return false;
                    }
                    item = rejected.into_inner();
                }
            }
        }
    }
}

/// Outcome of [`WorkerPool::join`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JoinReport {
    /// Units that returned `Ok(())`
    pub finished: usize,
    /// Units that returned an error or panicked
    pub faulted: usize,
    /// Units that missed the join deadline and were aborted
    pub forced: usize,
}

impl JoinReport {
    /// True when every unit stopped on its own without a fault.
    pub fn is_clean(&self) -> bool {
        self.faulted == 0 && self.forced == 0
    }

    fn merge(&mut self, other: JoinReport) {
        self.finished += other.finished;
        self.faulted += other.faulted;
        self.forced += other.forced;
    }
}

impl std::ops::Add for JoinReport {
    type Output = JoinReport;

    fn add(mut self, rhs: JoinReport) -> JoinReport {
        self.merge(rhs);
        self
    }
}

/// Builder that reports missing arguments as configuration errors.
///
/// # Examples
///
/// ```
/// use vehicle_supervisor::worker::controller::WorkerController;
/// use vehicle_supervisor::worker::pool::WorkerPool;
///
/// let missing_work = WorkerPool::builder("idle")
///     .count(1)
///     .controller(WorkerController::new())
///     .build();
/// assert!(missing_work.is_err());
/// ```
#[derive(Default)]
pub struct WorkerPoolBuilder {
    role: String,
    count: Option<i64>,
    controller: Option<WorkerController>,
    work: Option<WorkFn>,
}

impl WorkerPoolBuilder {
    pub fn count(mut self, count: i64) -> Self {
        self.count = Some(count);
        self
    }

    pub fn controller(mut self, controller: WorkerController) -> Self {
        self.controller = Some(controller);
        self
    }

    /// Sets the function each unit runs.
    pub fn work<F, Fut>(mut self, work: F) -> Self
    where
        F: Fn(WorkerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.work = Some(Arc::new(move |ctx: WorkerContext| {
            Box::pin(work(ctx)) as WorkFuture
        }));
        self
    }

    /// Validates and creates the pool.
    ///
    /// # Errors
    ///
    /// [`SupervisorError::Config`] if the role is empty, the count is missing or
    /// not positive, or the controller or work function is missing.
    pub fn build(self) -> Result<WorkerPool> {
        let count = self
            .count
            .ok_or_else(|| missing(&self.role, "worker count"))?;
        let controller = self
            .controller
            .ok_or_else(|| missing(&self.role, "controller"))?;
        let work = self.work.ok_or_else(|| missing(&self.role, "work function"))?;
        WorkerPool::with_work_fn(self.role, count, controller, work)
    }
}

fn missing(role: &str, what: &str) -> SupervisorError {
    SupervisorError::Config(format!("worker pool '{}' is missing its {}", role, what))
}

/// A set of identical workers sharing one role.
pub struct WorkerPool {
    role: Arc<str>,
    count: usize,
    controller: WorkerController,
    work: WorkFn,
    handles: Vec<(usize, JoinHandle<Result<()>>)>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("role", &self.role)
            .field("count", &self.count)
            .field("started", &!self.handles.is_empty())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    pub fn builder(role: impl Into<String>) -> WorkerPoolBuilder {
        WorkerPoolBuilder {
            role: role.into(),
            ..WorkerPoolBuilder::default()
        }
    }

    /// Creates a pool of `count` units running `work`.
    ///
    /// # Errors
    ///
    /// [`SupervisorError::Config`] if `count <= 0` or `role` is empty.
    pub fn create<F, Fut>(
        role: impl Into<String>,
        count: i64,
        controller: WorkerController,
        work: F,
    ) -> Result<Self>
    where
        F: Fn(WorkerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::builder(role)
            .count(count)
            .controller(controller)
            .work(work)
            .build()
    }

    fn with_work_fn(
        role: String,
        count: i64,
        controller: WorkerController,
        work: WorkFn,
    ) -> Result<Self> {
        if role.is_empty() {
            return Err(SupervisorError::Config(
                "worker pool role cannot be empty".to_string(),
            ));
        }
        let count = usize::try_from(count)
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| {
                SupervisorError::Config(format!(
                    "worker pool '{}' count must be greater than 0, got {}",
                    role, count
                ))
            })?;

        Ok(Self {
            role: role.into(),
            count,
            controller,
            work,
            handles: Vec::with_capacity(count),
        })
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Number of launched units that have not terminated yet.
    pub fn running(&self) -> usize {
        self.handles.iter().filter(|(_, h)| !h.is_finished()).count()
    }

    /// Launches every unit. Calling it again while units exist is a no-op.
    pub fn start(&mut self) {
        if !self.handles.is_empty() {
            warn!(role = %self.role, "Worker pool already started");
            return;
        }

        for instance in 0..self.count {
            let ctx = WorkerContext {
                role: Arc::clone(&self.role),
                instance,
                controller: self.controller.clone(),
            };
            let span = info_span!("worker", role = %self.role, instance);
            let future = (self.work)(ctx);
            let handle = tokio::spawn(
                async move {
                    info!("Worker started");
                    future.await
                }
                .instrument(span),
            );
            self.handles.push((instance, handle));
        }
        info!(role = %self.role, count = self.count, "Worker pool started");
    }

    /// Waits for every unit to stop, aborting those still running at `timeout`.
    ///
    /// The deadline is shared across the pool, so the call returns within
    /// roughly `timeout` no matter how many units hang.
    pub async fn join(&mut self, timeout: Duration) -> JoinReport {
        let deadline = Instant::now() + timeout;
        let mut report = JoinReport::default();

        for (instance, mut handle) in self.handles.drain(..) {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(Ok(()))) => {
                    report.finished += 1;
                }
                Ok(Ok(Err(e))) => {
                    error!(role = %self.role, instance, "Worker exited with error: {}", e);
                    report.faulted += 1;
                }
                Ok(Err(join_err)) if join_err.is_panic() => {
                    error!(role = %self.role, instance, "Worker panicked: {}", join_err);
                    report.faulted += 1;
                }
                Ok(Err(join_err)) => {
                    warn!(role = %self.role, instance, "Worker was cancelled: {}", join_err);
                    report.forced += 1;
                }
                Err(_elapsed) => {
                    warn!(
                        role = %self.role,
                        instance,
                        "Worker did not exit within {:?}, aborting",
                        timeout
                    );
                    handle.abort();
                    report.forced += 1;
                }
            }
        }

        info!(
            role = %self.role,
            finished = report.finished,
            faulted = report.faulted,
            forced = report.forced,
            "Worker pool joined"
        );
        report
    }
}
