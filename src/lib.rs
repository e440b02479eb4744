//! # rankvisor
//!
//! **Rankvisor** launches a distributed job's worker processes on one machine
//! and supervises them until they are all gone.
//!
//! It decides how many workers to start, hands each one a unique rank and a
//! shared rendezvous endpoint through its environment, spawns them as
//! independent OS processes, and coordinates an orderly shutdown when the
//! launcher itself is asked to terminate. What the workers do with their ranks
//! is their business: the launcher never talks to them beyond signals.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  CLI args ─┐
//!  env ──────┼──► Resolver ──► LaunchConfig
//!  devices ──┘                     │
//!                                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Launcher (one launch)                                            │
//! │  - Bus (broadcast events) ──► SubscriberSet ──► LogWriter, ...    │
//! │  - ShutdownTrigger (SIGINT/SIGTERM/SIGQUIT or programmatic)       │
//! │  - ProcessRegistry (worker table, alive count)                    │
//! └──────┬─────────────────────────┬─────────────────────────┬────────┘
//!        ▼                         ▼                         ▼
//!    preflight              Spawner ──► WorkerActor × N   ShutdownCoordinator
//!  (connect/bind)            (one child per rank)       (relay ─► grace ─► kill)
//!                                  │
//!                                  ▼
//!                          ExitAggregator ──► LaunchReport (max exit code)
//! ```
//!
//! ### Shutdown
//! ```text
//! RUNNING ─► SHUTDOWN_REQUESTED ─► GRACE_PERIOD ─┬─ all exited ─────────► TERMINATED
//!                                                └─ deadline ─► FORCE_KILL ─► TERMINATED
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                         |
//! |-------------------|---------------------------------------------------------------|--------------------------------------------|
//! | **Configuration** | Worker count, ranks, endpoint and grace from env and CLI.     | [`Resolver`], [`LaunchConfig`]             |
//! | **Launching**     | Spawn, supervise, shut down, aggregate.                       | [`Launcher`], [`LaunchReport`]             |
//! | **Shutdown**      | Latching trigger and the phase machine.                       | [`ShutdownTrigger`], [`ShutdownPhase`]     |
//! | **Subscriber API**| Observe runtime events.                                       | [`Subscribe`], [`Event`]                   |
//! | **Errors**        | Typed launch failures.                                        | [`LaunchError`]                            |
//!
//! ## Optional features
//! - `logging` (default): exports [`LogWriter`], which renders events through `tracing`,
//!   and enables the `launcher` binary.
//!
//! ## Platform
//! Unix only: workers are signalled with POSIX signals.
//!
//! ## Example
//! ```no_run
//! use rankvisor::{EnvSnapshot, LaunchArgs, Launcher, Resolver, ShutdownTrigger, Signal};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), rankvisor::LaunchError> {
//!     let cfg = Resolver::new(EnvSnapshot::from_pairs([("WORLD_SIZE", "2")]), 0)
//!         .resolve(LaunchArgs::new("./worker.sh"))?;
//!
//!     let trigger = ShutdownTrigger::new();
//!     let launcher = Launcher::builder(cfg)
//!         .with_trigger(trigger.clone())
//!         .with_os_signals(false)
//!         .build();
//!
//!     // Stop the workers after a minute, whatever they are doing.
//!     tokio::spawn(async move {
//!         tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!         trigger.request(Signal::SIGTERM);
//!     });
//!
//!     let report = launcher.run().await?;
//!     println!("aggregate exit code: {}", report.exit_code());
//!     Ok(())
//! }
//! ```

#[cfg(not(unix))]
compile_error!("rankvisor supports unix targets only");

mod config;
mod core;
mod error;
mod events;
mod preflight;
mod subscribers;

// ---- Public re-exports ----

pub use config::{
    AcceleratorCount, EnvSnapshot, FixedAccelerators, LaunchArgs, LaunchConfig, Resolver,
    SystemAccelerators,
};
pub use config::{
    DEFAULT_BUS_CAPACITY, DEFAULT_GRACE, DEFAULT_MASTER_ADDR, DEFAULT_MASTER_PORT,
    DEFAULT_PREFLIGHT_TIMEOUT, ENV_LOCAL_RANK, ENV_MASTER_ADDR, ENV_MASTER_PORT, ENV_RANK,
    ENV_SIGTERM_TIMEOUT, ENV_WORLD_SIZE,
};
pub use core::{
    CommandFactory, LaunchReport, Launcher, LauncherBuilder, ShutdownPhase, ShutdownReport,
    ShutdownTrigger, Signal, WorkerExit, worker_command, worker_env,
};
pub use error::{FAILURE_EXIT_CODE, LaunchError};
pub use events::{Bus, Event, EventKind};
pub use preflight::{EndpointStatus, check_endpoint};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: built-in subscriber that renders events through `tracing`.
// Enabled by default with the `logging` feature.
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
