//! # Runtime events emitted by the launcher.
//!
//! The [`EventKind`] enum classifies events across three groups:
//! - **Launch events**: preflight and spawn outcomes
//! - **Worker events**: a worker exited, was signalled, was force-killed
//! - **Shutdown events**: coordinator phase changes
//!
//! The [`Event`] struct carries optional metadata (ranks, pid, exit code,
//! signal name, grace period, reason) depending on the kind.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore order when events are delivered out of
//! order.
//!
//! ## Example
//! ```rust
//! use rankvisor::{Event, EventKind};
//!
//! let ev = Event::now(EventKind::WorkerExited)
//!     .with_ranks(1, 9)
//!     .with_exit_code(2);
//!
//! assert_eq!(ev.kind, EventKind::WorkerExited);
//! assert_eq!(ev.global_rank, Some(9));
//! assert_eq!(ev.exit_code, Some(2));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Launch events ===
    /// Rendezvous endpoint passed the preflight check.
    ///
    /// Sets:
    /// - `reason`: `"listening"` or `"bindable"`
    PreflightPassed,

    /// A worker process was created.
    ///
    /// Sets:
    /// - `local_rank`, `global_rank`
    /// - `pid`: OS process id
    WorkerSpawned,

    /// Creating a worker process failed; no further workers are spawned.
    ///
    /// Sets:
    /// - `local_rank`
    /// - `reason`: OS error
    SpawnFailed,

    // === Worker events ===
    /// A worker exited and its code was recorded.
    ///
    /// Sets:
    /// - `local_rank`, `global_rank`
    /// - `exit_code`: exit code (`128 + signal` if killed by a signal)
    /// - `signal`: terminating signal, if any
    WorkerExited,

    /// The coordinator relayed a termination signal to a worker.
    ///
    /// Sets:
    /// - `local_rank`, `global_rank`, `pid`
    /// - `signal`: relayed signal
    SignalRelayed,

    /// A worker was force-killed after the grace period.
    ///
    /// Sets:
    /// - `local_rank`, `global_rank`, `pid`
    ForceKilled,

    // === Shutdown events ===
    /// Termination requested (OS signal observed or spawn failure).
    ///
    /// Sets:
    /// - `signal`: the signal that will be relayed
    ShutdownRequested,

    /// All workers exited within the grace period.
    ///
    /// Sets:
    /// - `grace_ms`: configured grace period
    AllStoppedWithin,

    /// Grace period elapsed with workers still alive.
    ///
    /// Sets:
    /// - `grace_ms`: configured grace period
    /// - `reason`: global ranks still alive
    GraceExceeded,

    /// Shutdown sequence finished.
    ShutdownCompleted,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Worker's local rank.
    pub local_rank: Option<u32>,
    /// Worker's global rank.
    pub global_rank: Option<u32>,
    /// Worker's OS process id.
    pub pid: Option<u32>,
    /// Recorded exit code.
    pub exit_code: Option<i32>,
    /// Signal name (`"SIGTERM"`, ...).
    pub signal: Option<&'static str>,
    /// Grace period in milliseconds (compact).
    pub grace_ms: Option<u32>,
    /// Human-readable reason (errors, details).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            local_rank: None,
            global_rank: None,
            pid: None,
            exit_code: None,
            signal: None,
            grace_ms: None,
            reason: None,
        }
    }

    /// Attaches local and global rank.
    #[inline]
    pub fn with_ranks(mut self, local: usize, global: usize) -> Self {
        self.local_rank = Some(clamp_u32(local));
        self.global_rank = Some(clamp_u32(global));
        self
    }

    /// Attaches a local rank only.
    #[inline]
    pub fn with_local_rank(mut self, local: usize) -> Self {
        self.local_rank = Some(clamp_u32(local));
        self
    }

    /// Attaches an OS process id.
    #[inline]
    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    /// Attaches an exit code.
    #[inline]
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Attaches a signal name.
    #[inline]
    pub fn with_signal(mut self, signal: &'static str) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Attaches a grace period (stored as milliseconds).
    #[inline]
    pub fn with_grace(mut self, d: Duration) -> Self {
        self.grace_ms = Some(d.as_millis().min(u128::from(u32::MAX)) as u32);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

fn clamp_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
