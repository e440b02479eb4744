//! Launch core: spawning, supervision and shutdown.
//!
//! Internal modules:
//! - [`launcher`]: runs one launch and joins the pieces below;
//! - [`spawner`]: builds worker commands and starts one actor per rank;
//! - [`actor`]: owns one child process and serves relay/kill requests;
//! - [`registry`]: synchronized worker table shared by the wait and shutdown paths;
//! - [`coordinator`]: the shutdown state machine;
//! - [`aggregator`]: collects exits into a [`LaunchReport`];
//! - [`shutdown`]: the shutdown trigger and OS signal forwarding.

mod actor;
mod aggregator;
mod builder;
mod coordinator;
mod launcher;
mod registry;
mod shutdown;
mod spawner;

pub use actor::WorkerExit;
pub use aggregator::LaunchReport;
pub use builder::LauncherBuilder;
pub use coordinator::{ShutdownPhase, ShutdownReport};
pub use launcher::Launcher;
pub use shutdown::{ShutdownTrigger, Signal};
pub use spawner::{CommandFactory, worker_command, worker_env};
