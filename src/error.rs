//! Error types used by the launcher.
//!
//! [`LaunchError`] covers every way a launch can fail before or while workers
//! are spawned. A worker exiting with a non-zero code is **not** an error of the
//! launcher; it is recorded in [`WorkerExit`](crate::WorkerExit) and only
//! influences the aggregate exit code.
//!
//! Every variant exposes a stable snake_case label ([`LaunchError::as_label`]) for logs, and a short message
//! ([`LaunchError::as_message`]).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Process exit code used when the launcher itself fails.
///
/// Configuration and preflight failures happen before any worker exists, so
/// this value never collides with a worker's code.
pub const FAILURE_EXIT_CODE: u8 = 1;

/// # Errors produced by the launcher.
///
/// `Configuration`, `NotFound` and `EndpointUnavailable` are raised strictly
/// before any worker is spawned. `Spawn` is raised after the already-spawned
/// workers have been shut down and reaped.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LaunchError {
    /// Worker count, ranks or another setting could not be determined.
    #[error("configuration error: {reason}")]
    Configuration {
        /// What was wrong.
        reason: String,
    },

    /// The worker script does not exist (or is not a regular file).
    #[error("script not found: {path}")]
    NotFound {
        /// Path as given on the command line.
        path: PathBuf,
    },

    /// Rendezvous endpoint is neither reachable nor bindable.
    #[error("rendezvous endpoint {endpoint} unreachable or port unavailable: {source}")]
    EndpointUnavailable {
        /// `addr:port` that was checked.
        endpoint: String,
        /// The bind failure.
        #[source]
        source: io::Error,
    },

    /// Creating a worker process failed; siblings were shut down.
    #[error("failed to spawn worker local_rank={local_rank} ({spawned} already running were stopped): {source}")]
    Spawn {
        /// Local rank whose spawn failed.
        local_rank: usize,
        /// Number of workers that had been spawned before the failure.
        spawned: usize,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// OS signal listeners could not be installed.
    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] io::Error),
}

impl LaunchError {
    /// Shorthand for a [`LaunchError::Configuration`].
    pub fn config(reason: impl Into<String>) -> Self {
        LaunchError::Configuration {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use rankvisor::LaunchError;
    ///
    /// let err = LaunchError::config("no workers determinable");
    /// assert_eq!(err.as_label(), "launch_configuration");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            LaunchError::Configuration { .. } => "launch_configuration",
            LaunchError::NotFound { .. } => "launch_not_found",
            LaunchError::EndpointUnavailable { .. } => "launch_endpoint_unavailable",
            LaunchError::Spawn { .. } => "launch_spawn_failed",
            LaunchError::Signals(_) => "launch_signals",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            LaunchError::Configuration { reason } => format!("configuration: {reason}"),
            LaunchError::NotFound { path } => format!("not found: {}", path.display()),
            LaunchError::EndpointUnavailable { endpoint, source } => {
                format!("endpoint {endpoint} unavailable: {source}")
            }
            LaunchError::Spawn {
                local_rank, source, ..
            } => format!("spawn local_rank={local_rank}: {source}"),
            LaunchError::Signals(e) => format!("signals: {e}"),
        }
    }

    /// Process exit code the launcher should terminate with.
    pub fn exit_code(&self) -> u8 {
        FAILURE_EXIT_CODE
    }

    /// Whether the error happened before any worker could have been spawned.
    pub fn is_pre_spawn(&self) -> bool {
        !matches!(self, LaunchError::Spawn { .. })
    }
}
