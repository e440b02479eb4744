//! # LogWriter: renders events through `tracing`.
//!
//! ## Example output
//! ```text
//! INFO rankvisor: worker spawned local_rank=0 global_rank=8 pid=41822
//! WARN rankvisor: shutdown requested signal="SIGTERM"
//! INFO rankvisor: signal relayed local_rank=0 global_rank=8 signal="SIGTERM"
//! WARN rankvisor: grace period exceeded grace_ms=10000 alive="8"
//! WARN rankvisor: worker force-killed local_rank=0 global_rank=8 pid=41822
//! INFO rankvisor: worker exited local_rank=0 global_rank=8 exit_code=137
//! ```

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::PreflightPassed => {
                info!(target: "rankvisor", status = ?e.reason, "rendezvous preflight passed");
            }
            EventKind::WorkerSpawned => {
                info!(target: "rankvisor", local_rank = ?e.local_rank, global_rank = ?e.global_rank, pid = ?e.pid, "worker spawned");
            }
            EventKind::SpawnFailed => {
                error!(target: "rankvisor", local_rank = ?e.local_rank, err = ?e.reason, "worker spawn failed");
            }
            EventKind::WorkerExited => match e.exit_code {
                Some(0) => {
                    info!(target: "rankvisor", local_rank = ?e.local_rank, global_rank = ?e.global_rank, "worker exited cleanly");
                }
                code => {
                    warn!(target: "rankvisor", local_rank = ?e.local_rank, global_rank = ?e.global_rank, exit_code = ?code, signal = ?e.signal, "worker exited");
                }
            },
            EventKind::SignalRelayed => {
                info!(target: "rankvisor", local_rank = ?e.local_rank, global_rank = ?e.global_rank, signal = ?e.signal, "signal relayed");
            }
            EventKind::ForceKilled => {
                warn!(target: "rankvisor", local_rank = ?e.local_rank, global_rank = ?e.global_rank, pid = ?e.pid, "worker force-killed");
            }
            EventKind::ShutdownRequested => {
                warn!(target: "rankvisor", signal = ?e.signal, "shutdown requested");
            }
            EventKind::AllStoppedWithin => {
                info!(target: "rankvisor", grace_ms = ?e.grace_ms, "all workers stopped within grace period");
            }
            EventKind::GraceExceeded => {
                warn!(target: "rankvisor", grace_ms = ?e.grace_ms, alive = ?e.reason, "grace period exceeded");
            }
            EventKind::ShutdownCompleted => {
                info!(target: "rankvisor", "shutdown completed");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
