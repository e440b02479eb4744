//! # Process registry: the launch's worker table.
//!
//! [`ProcessRegistry`] holds one [`WorkerProcess`] per spawned worker, in
//! local-rank order. It is shared by reference between the main wait path
//! (the exit aggregator) and the shutdown coordinator; all access goes through
//! an async `RwLock`, and the alive count is published on a `watch` channel so
//! the coordinator can wait for "everyone exited" without polling.
//!
//! ```text
//! Spawner ──register()──►┌──────────────────────────┐◄──record_exit()── Aggregator
//!                        │ RwLock<Vec<WorkerProcess>>│
//! Coordinator ─relay()──►│ watch<alive count>        │──wait_all_exited()──► Coordinator
//!             ─kill_alive()                          │
//!                        └──────────────────────────┘
//! ```
//!
//! ## Rules
//! - The OS child handle itself is owned by the worker's actor task; the
//!   registry holds the actor's control channel. Requests are **delivered by
//!   the owner of the child**, which never signals a pid it has already reaped.
//! - `record_exit` releases the control channel; later relay/kill requests skip
//!   that worker silently.
//! - `record_exit` is idempotent.

use tokio::sync::{RwLock, mpsc, watch};

use crate::core::shutdown::Signal;

/// Request delivered to a worker's actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    /// Forward a termination signal to the process.
    Relay(Signal),
    /// Kill the process unconditionally (SIGKILL).
    Kill,
}

/// One spawned worker.
#[derive(Debug)]
pub(crate) struct WorkerProcess {
    /// Index among the workers of this launch.
    pub local_rank: usize,
    /// `base_rank + local_rank`.
    pub global_rank: usize,
    /// Recorded exit code; `None` while the worker is alive.
    pub exit_code: Option<i32>,
    control: Option<mpsc::UnboundedSender<Control>>,
}

impl WorkerProcess {
    /// True until the aggregator records an exit code.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.exit_code.is_none()
    }

    fn send(&self, ctl: Control) -> bool {
        self.control.as_ref().is_some_and(|tx| tx.send(ctl).is_ok())
    }
}

/// Synchronized, ordered table of the launch's workers.
pub(crate) struct ProcessRegistry {
    workers: RwLock<Vec<WorkerProcess>>,
    alive: watch::Sender<usize>,
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        let (alive, _rx) = watch::channel(0);
        Self {
            workers: RwLock::new(Vec::new()),
            alive,
        }
    }

    /// Records a freshly spawned worker.
    pub(crate) async fn register(
        &self,
        local_rank: usize,
        global_rank: usize,
        control: mpsc::UnboundedSender<Control>,
    ) {
        let mut workers = self.workers.write().await;
        workers.push(WorkerProcess {
            local_rank,
            global_rank,
            exit_code: None,
            control: Some(control),
        });
        self.alive.send_modify(|n| *n += 1);
    }

    /// Records the exit code of `local_rank` and releases its handle.
    ///
    /// Returns false if the rank is unknown or its exit was already recorded.
    pub async fn record_exit(&self, local_rank: usize, code: i32) -> bool {
        let mut workers = self.workers.write().await;
        let Some(w) = workers.iter_mut().find(|w| w.local_rank == local_rank) else {
            return false;
        };
        if !w.is_alive() {
            return false;
        }
        w.exit_code = Some(code);
        w.control = None;
        self.alive.send_modify(|n| *n = n.saturating_sub(1));
        true
    }

    /// Asks every alive worker's actor to forward `signal`.
    ///
    /// Returns the global ranks the request reached. Exited workers are skipped.
    pub(crate) async fn relay(&self, signal: Signal) -> Vec<usize> {
        self.broadcast(Control::Relay(signal)).await
    }

    /// Asks every alive worker's actor to kill its process.
    ///
    /// Returns the global ranks the request reached.
    pub(crate) async fn kill_alive(&self) -> Vec<usize> {
        self.broadcast(Control::Kill).await
    }

    async fn broadcast(&self, ctl: Control) -> Vec<usize> {
        let workers = self.workers.read().await;
        workers
            .iter()
            .filter(|w| w.is_alive() && w.send(ctl))
            .map(|w| w.global_rank)
            .collect()
    }

    /// Global ranks of workers without a recorded exit.
    pub async fn alive_ranks(&self) -> Vec<usize> {
        let workers = self.workers.read().await;
        workers
            .iter()
            .filter(|w| w.is_alive())
            .map(|w| w.global_rank)
            .collect()
    }

    /// Number of workers without a recorded exit.
    pub fn alive_count(&self) -> usize {
        *self.alive.borrow()
    }

    /// Completes once every registered worker has a recorded exit.
    pub async fn wait_all_exited(&self) {
        let mut rx = self.alive.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// `(local_rank, global_rank, exit_code)` for every worker, in local-rank order.
    pub async fn exit_codes(&self) -> Vec<(usize, usize, Option<i32>)> {
        let workers = self.workers.read().await;
        workers
            .iter()
            .map(|w| (w.local_rank, w.global_rank, w.exit_code))
            .collect()
    }
}
