//! # Shutdown trigger.
//!
//! [`ShutdownTrigger`] is the explicit channel through which a termination
//! request reaches the launcher. It latches the **first** request (and the
//! signal it carries); later requests are ignored.
//!
//! Requests come from two places:
//! - the OS: [`ShutdownTrigger::listen_os_signals`] installs SIGINT / SIGTERM /
//!   SIGQUIT handlers and forwards the first one that arrives;
//! - the launcher itself, when a spawn fails (always `SIGTERM`).
//!
//! ```text
//! SIGINT/SIGTERM/SIGQUIT ──► forwarder task ──┐
//!                                             ├──► watch<Option<Signal>> ──► coordinator
//! spawn failure ─────────── request(SIGTERM) ─┘
//! ```
//!
//! Signal handlers are registered eagerly, before any worker exists, so a
//! termination request can never hit the default disposition and kill the
//! launcher while it still has children.

use std::io;
use std::sync::Arc;

pub use nix::sys::signal::Signal;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Latching, cloneable shutdown request channel.
#[derive(Clone, Debug)]
pub struct ShutdownTrigger {
    tx: Arc<watch::Sender<Option<Signal>>>,
}

impl Default for ShutdownTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownTrigger {
    /// Creates a trigger with no pending request.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Requests shutdown with `signal`. Returns true if this was the first request.
    pub fn request(&self, signal: Signal) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(signal);
            true
        })
    }

    /// Returns the latched request, if any.
    pub fn requested(&self) -> Option<Signal> {
        *self.tx.borrow()
    }

    /// Waits until shutdown is requested and returns the signal to relay.
    pub async fn wait(&self) -> Signal {
        let mut rx = self.tx.subscribe();
        let requested = match rx.wait_for(Option::is_some).await {
            Ok(slot) => *slot,
            Err(_) => None,
        };
        match requested {
            Some(signal) => signal,
            // The sender lives in `self`, so the channel cannot close while we wait.
            None => std::future::pending().await,
        }
    }

    /// Installs OS signal handlers and forwards the first signal into this trigger.
    ///
    /// Handlers are registered before this returns. The forwarder task exits on
    /// the first signal or when `token` is cancelled.
    pub fn listen_os_signals(&self, token: CancellationToken) -> io::Result<JoinHandle<()>> {
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigquit = signal(SignalKind::quit())?;
        let trigger = self.clone();

        Ok(tokio::spawn(async move {
            let sig = tokio::select! {
                _ = token.cancelled() => return,
                _ = sigint.recv()  => Signal::SIGINT,
                _ = sigterm.recv() => Signal::SIGTERM,
                _ = sigquit.recv() => Signal::SIGQUIT,
            };
            trigger.request(sig);
        }))
    }
}
