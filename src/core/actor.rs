//! # WorkerActor: owner of one worker process.
//!
//! Each spawned child is moved into its own actor task. The actor is the only
//! code that touches the `Child`: it waits for the exit and serves control
//! requests coming from the registry.
//!
//! ```text
//! loop {
//!   select! {
//!     status = child.wait()  ──► return WorkerExit
//!     Relay(sig)             ──► kill(pid, sig)   (only while not yet reaped)
//!     Kill                   ──► child.start_kill() (SIGKILL)
//!     channel closed         ──► keep waiting for the exit
//!   }
//! }
//! ```
//!
//! ## Rules
//! - A pid is signalled only while the child is unreaped, so a recycled pid
//!   can never receive a relayed signal.
//! - The child is spawned with `kill_on_drop`, so an actor that is dropped or
//!   panics still takes its process down with it.

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use nix::sys::signal;
use nix::unistd::Pid;
use tokio::process::Child;
use tokio::sync::mpsc;

use crate::core::registry::Control;
use crate::core::shutdown::Signal;
use crate::events::{Bus, Event, EventKind};

/// Final outcome of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    /// Index among the workers of this launch.
    pub local_rank: usize,
    /// `base_rank + local_rank`.
    pub global_rank: usize,
    /// Exit code; `128 + signal` when the process was killed by a signal.
    pub code: i32,
    /// Terminating signal number, if any.
    pub signal: Option<i32>,
}

impl WorkerExit {
    /// Builds an outcome from an OS exit status.
    pub fn from_status(local_rank: usize, global_rank: usize, status: ExitStatus) -> Self {
        let signal = status.signal();
        let code = match (status.code(), signal) {
            (Some(code), _) => code,
            (None, Some(sig)) => 128 + sig,
            (None, None) => 1,
        };
        Self {
            local_rank,
            global_rank,
            code,
            signal,
        }
    }

    /// Outcome for a worker whose exit status could not be observed.
    pub fn lost(local_rank: usize, global_rank: usize) -> Self {
        Self {
            local_rank,
            global_rank,
            code: 1,
            signal: None,
        }
    }

    /// True if the worker exited with code 0.
    #[inline]
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Name of the terminating signal, if any.
    pub fn signal_name(&self) -> Option<&'static str> {
        self.signal
            .and_then(|s| Signal::try_from(s).ok())
            .map(Signal::as_str)
    }
}

/// Supervises a single worker process.
pub(crate) struct WorkerActor {
    local_rank: usize,
    global_rank: usize,
    child: Child,
    control: mpsc::UnboundedReceiver<Control>,
    bus: Bus,
}

impl WorkerActor {
    pub(crate) fn new(
        local_rank: usize,
        global_rank: usize,
        child: Child,
        control: mpsc::UnboundedReceiver<Control>,
        bus: Bus,
    ) -> Self {
        Self {
            local_rank,
            global_rank,
            child,
            control,
            bus,
        }
    }

    /// Runs until the child exits.
    pub(crate) async fn run(mut self) -> WorkerExit {
        let mut control_open = true;
        loop {
            tokio::select! {
                status = self.child.wait() => {
                    return match status {
                        Ok(status) => WorkerExit::from_status(self.local_rank, self.global_rank, status),
                        Err(e) => {
                            tracing::error!(local_rank = self.local_rank, error = %e, "waiting for worker failed");
                            WorkerExit::lost(self.local_rank, self.global_rank)
                        }
                    };
                }
                ctl = self.control.recv(), if control_open => match ctl {
                    Some(Control::Relay(sig)) => self.relay(sig),
                    Some(Control::Kill) => self.force_kill(),
                    None => control_open = false,
                },
            }
        }
    }

    fn relay(&mut self, sig: Signal) {
        // `id()` is None once the child has been reaped.
        let Some(pid) = self.child.id() else {
            return;
        };
        match signal::kill(Pid::from_raw(pid as i32), sig) {
            Ok(()) => self.bus.publish(
                Event::now(EventKind::SignalRelayed)
                    .with_ranks(self.local_rank, self.global_rank)
                    .with_pid(Some(pid))
                    .with_signal(sig.as_str()),
            ),
            Err(errno) => {
                tracing::debug!(local_rank = self.local_rank, pid, %errno, "relaying signal failed");
            }
        }
    }

    fn force_kill(&mut self) {
        let pid = self.child.id();
        match self.child.start_kill() {
            Ok(()) => self.bus.publish(
                Event::now(EventKind::ForceKilled)
                    .with_ranks(self.local_rank, self.global_rank)
                    .with_pid(pid),
            ),
            Err(e) => {
                tracing::debug!(local_rank = self.local_rank, error = %e, "force kill skipped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_is_kept() {
        let exit = WorkerExit::from_status(0, 4, ExitStatus::from_raw(2 << 8));
        assert_eq!(exit.code, 2);
        assert_eq!(exit.signal, None);
        assert!(!exit.success());
    }

    #[test]
    fn signal_death_maps_to_shell_convention() {
        let exit = WorkerExit::from_status(1, 1, ExitStatus::from_raw(Signal::SIGKILL as i32));
        assert_eq!(exit.code, 137);
        assert_eq!(exit.signal_name(), Some("SIGKILL"));
    }
}
