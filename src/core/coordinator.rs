//! # Shutdown coordinator.
//!
//! Drives the launch's termination sequence, at most once:
//!
//! ```text
//! RUNNING ──request──► SHUTDOWN_REQUESTED ──relay(signal) to alive workers──┐
//!                                                                            ▼
//!            TERMINATED ◄──all exited── GRACE_PERIOD (timeout = grace) ◄─────┘
//!                ▲                              │
//!                └──── kill_alive() ◄── FORCE_KILL ◄── deadline elapsed
//! ```
//!
//! ## Rules
//! - The coordinator only talks to workers through the process registry;
//!   it runs concurrently with the exit aggregator on the same registry.
//! - Exits during the grace period are observed through the registry's alive
//!   count, which the aggregator updates.
//! - Total time is bounded by the grace period: relaying and killing only
//!   enqueue requests for the worker actors, they never wait on a process.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time;

use crate::core::registry::ProcessRegistry;
use crate::core::shutdown::{ShutdownTrigger, Signal};
use crate::events::{Bus, Event, EventKind};

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownPhase {
    /// Armed, no request yet.
    Running,
    /// Request received; relaying the signal.
    ShutdownRequested,
    /// Waiting for workers to exit voluntarily.
    GracePeriod,
    /// Grace period elapsed; killing the remaining workers.
    ForceKill,
    /// Sequence finished.
    Terminated,
}

/// What a completed shutdown sequence did.
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    /// Signal relayed to workers.
    pub signal: Signal,
    /// Global ranks the signal was relayed to.
    pub relayed: Vec<usize>,
    /// True if the grace period elapsed with workers alive.
    pub grace_exceeded: bool,
    /// Global ranks that were force-killed.
    pub force_killed: Vec<usize>,
    /// Phase the sequence ended in.
    pub phase: ShutdownPhase,
    /// Time from the request to `Terminated`.
    pub elapsed: Duration,
}

/// Runs the shutdown state machine against the launch's process registry.
pub(crate) struct ShutdownCoordinator {
    grace: Duration,
    bus: Bus,
    phase: watch::Sender<ShutdownPhase>,
}

impl ShutdownCoordinator {
    /// Creates an armed coordinator.
    pub fn new(grace: Duration, bus: Bus) -> Self {
        let (phase, _rx) = watch::channel(ShutdownPhase::Running);
        Self { grace, bus, phase }
    }

    /// Current phase.
    pub fn phase(&self) -> ShutdownPhase {
        *self.phase.borrow()
    }

    /// Waits for a request on `trigger`, then runs the sequence.
    pub async fn drive(
        &self,
        registry: &ProcessRegistry,
        trigger: &ShutdownTrigger,
    ) -> Option<ShutdownReport> {
        let signal = trigger.wait().await;
        self.shutdown(registry, signal).await
    }

    /// Runs the sequence now. Returns `None` if it already ran or is running.
    pub async fn shutdown(
        &self,
        registry: &ProcessRegistry,
        signal: Signal,
    ) -> Option<ShutdownReport> {
        let first = self.phase.send_if_modified(|p| {
            if *p != ShutdownPhase::Running {
                return false;
            }
            *p = ShutdownPhase::ShutdownRequested;
            true
        });
        if !first {
            return None;
        }

        let started = Instant::now();
        self.bus
            .publish(Event::now(EventKind::ShutdownRequested).with_signal(signal.as_str()));
        let relayed = registry.relay(signal).await;

        self.enter(ShutdownPhase::GracePeriod);
        tracing::debug!(alive = registry.alive_count(), grace = ?self.grace, "waiting for workers to exit");
        let grace_exceeded = time::timeout(self.grace, registry.wait_all_exited())
            .await
            .is_err();

        let mut force_killed = Vec::new();
        if grace_exceeded {
            let alive = registry.alive_ranks().await;
            self.bus.publish(
                Event::now(EventKind::GraceExceeded)
                    .with_grace(self.grace)
                    .with_reason(join_ranks(&alive)),
            );
            self.enter(ShutdownPhase::ForceKill);
            force_killed = registry.kill_alive().await;
        } else {
            self.bus
                .publish(Event::now(EventKind::AllStoppedWithin).with_grace(self.grace));
        }

        self.enter(ShutdownPhase::Terminated);
        self.bus.publish(Event::now(EventKind::ShutdownCompleted));

        Some(ShutdownReport {
            signal,
            relayed,
            grace_exceeded,
            force_killed,
            phase: self.phase(),
            elapsed: started.elapsed(),
        })
    }

    fn enter(&self, phase: ShutdownPhase) {
        self.phase.send_replace(phase);
    }
}

fn join_ranks(ranks: &[usize]) -> String {
    ranks
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
