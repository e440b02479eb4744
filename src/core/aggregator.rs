//! # Exit aggregator.
//!
//! Collects [`WorkerExit`]s as worker actors finish, records each code into the
//! process registry (which is what lets the shutdown coordinator observe
//! exits) and builds the final [`LaunchReport`].
//!
//! The aggregate exit code is the maximum over all workers. A launch whose
//! spawning was cut short by a shutdown request never reports success: its
//! code is at least `128 + signal`.

use tokio::task::JoinError;

use crate::core::actor::WorkerExit;
use crate::core::coordinator::ShutdownReport;
use crate::core::registry::ProcessRegistry;
use crate::error::FAILURE_EXIT_CODE;
use crate::events::{Bus, Event, EventKind};

/// Outcome of one launch.
#[derive(Debug, Clone)]
pub struct LaunchReport {
    /// Per-worker outcomes, sorted by local rank.
    pub workers: Vec<WorkerExit>,
    /// Number of workers the launch was configured for.
    pub requested: usize,
    /// Number of workers actually spawned.
    pub spawned: usize,
    /// Present if the shutdown sequence ran.
    pub shutdown: Option<ShutdownReport>,
}

impl LaunchReport {
    /// Aggregate exit code.
    ///
    /// The maximum across all workers. If shutdown stopped the launch before
    /// every worker was spawned, it is at least `128 + signal` (or
    /// [`FAILURE_EXIT_CODE`] without a shutdown report), even with no workers.
    pub fn exit_code(&self) -> i32 {
        let worst = self.workers.iter().map(|w| w.code).max().unwrap_or(0);
        if self.is_complete() {
            return worst;
        }
        let interrupted = self
            .shutdown
            .as_ref()
            .map_or(i32::from(FAILURE_EXIT_CODE), |s| 128 + s.signal as i32);
        worst.max(interrupted)
    }

    /// True if every configured worker was spawned.
    pub fn is_complete(&self) -> bool {
        self.spawned >= self.requested
    }

    /// [`exit_code`](Self::exit_code) clamped to what a process can return.
    pub fn process_exit_code(&self) -> u8 {
        self.exit_code().clamp(0, 255) as u8
    }

    /// Workers that did not exit with `0`.
    pub fn failures(&self) -> impl Iterator<Item = &WorkerExit> {
        self.workers.iter().filter(|w| !w.success())
    }
}

pub(crate) struct ExitAggregator<'a> {
    registry: &'a ProcessRegistry,
    bus: Bus,
    outcomes: Vec<WorkerExit>,
}

impl<'a> ExitAggregator<'a> {
    pub(crate) fn new(registry: &'a ProcessRegistry, bus: Bus) -> Self {
        Self {
            registry,
            bus,
            outcomes: Vec::new(),
        }
    }

    /// Handles one `JoinSet::join_next` result.
    pub(crate) async fn on_joined(&mut self, joined: Result<WorkerExit, JoinError>) {
        match joined {
            Ok(exit) => self.record(exit).await,
            // Actors catch their own panics; this only happens if the task was aborted.
            Err(e) => tracing::error!(error = %e, "worker actor task failed"),
        }
    }

    async fn record(&mut self, exit: WorkerExit) {
        if !self.registry.record_exit(exit.local_rank, exit.code).await {
            return;
        }
        let mut ev = Event::now(EventKind::WorkerExited)
            .with_ranks(exit.local_rank, exit.global_rank)
            .with_exit_code(exit.code);
        if let Some(name) = exit.signal_name() {
            ev = ev.with_signal(name);
        }
        self.bus.publish(ev);
        self.outcomes.push(exit);
    }

    /// Builds the report. Workers whose outcome never arrived count as lost.
    pub(crate) async fn finish(
        mut self,
        requested: usize,
        shutdown: Option<ShutdownReport>,
    ) -> LaunchReport {
        let registered = self.registry.exit_codes().await;
        let spawned = registered.len();
        for (local_rank, global_rank, code) in registered {
            if code.is_none() {
                self.record(WorkerExit::lost(local_rank, global_rank)).await;
            }
        }
        self.outcomes.sort_by_key(|w| w.local_rank);
        LaunchReport {
            workers: self.outcomes,
            requested,
            spawned,
            shutdown,
        }
    }
}
