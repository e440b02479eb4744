//! # Launch configuration.
//!
//! [`LaunchConfig`] is the immutable description of one launch, built once by
//! the [`Resolver`] from CLI arguments, the environment and the host's
//! accelerator count.
//!
//! ```text
//! LaunchArgs (CLI) ─┐
//! EnvSnapshot ──────┼──► Resolver::resolve() ──► LaunchConfig ──► Launcher
//! accelerators ─────┘
//! ```
//!
//! ## Environment contract
//! | Variable          | Read (launcher)             | Written (per worker)       |
//! |-------------------|-----------------------------|----------------------------|
//! | `RANK`            | base rank, default `0`      | `base_rank + local_rank`   |
//! | `WORLD_SIZE`      | explicit world size         | resolved world size        |
//! | `MASTER_ADDR`     | default `127.0.0.1`         | resolved address           |
//! | `MASTER_PORT`     | default `29500`             | resolved port              |
//! | `LOCAL_RANK`      | -                           | `local_rank`               |
//! | `SIGTERM_TIMEOUT` | grace seconds, default `10` | -                          |

mod accelerators;
mod env;
mod resolver;

use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;

pub use accelerators::{AcceleratorCount, FixedAccelerators, SystemAccelerators};
pub use env::EnvSnapshot;
pub use resolver::{LaunchArgs, Resolver};

/// Worker's index among the workers of this launch.
pub const ENV_LOCAL_RANK: &str = "LOCAL_RANK";
/// Base rank on input, worker's global rank on output.
pub const ENV_RANK: &str = "RANK";
/// Total number of workers in the distributed group.
pub const ENV_WORLD_SIZE: &str = "WORLD_SIZE";
/// Rendezvous address.
pub const ENV_MASTER_ADDR: &str = "MASTER_ADDR";
/// Rendezvous port.
pub const ENV_MASTER_PORT: &str = "MASTER_PORT";
/// Shutdown grace period override, in seconds.
pub const ENV_SIGTERM_TIMEOUT: &str = "SIGTERM_TIMEOUT";

pub const DEFAULT_MASTER_ADDR: &str = "127.0.0.1";
pub const DEFAULT_MASTER_PORT: u16 = 29500;
pub const DEFAULT_GRACE: Duration = Duration::from_secs(10);
pub const DEFAULT_PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Resolved configuration of a single launch.
///
/// All fields are public for flexibility, but a `LaunchConfig` is meant to be
/// produced by [`Resolver::resolve`] and then handed to the launcher
/// unchanged: the resolver is what enforces the invariants below.
///
/// ## Invariants
/// - `local_workers >= 1`
/// - `world_size >= base_rank + local_workers`
/// - `script` is absolute and pointed at an existing file when resolved
#[derive(Clone, Debug)]
pub struct LaunchConfig {
    /// Absolute path of the worker script.
    pub script: PathBuf,
    /// Arguments forwarded verbatim to every worker.
    pub script_args: Vec<String>,
    /// Optional program that runs the script (`interpreter script args...`).
    pub interpreter: Option<PathBuf>,

    /// Number of worker processes spawned by this launcher.
    pub local_workers: usize,
    /// Global rank of local rank 0.
    pub base_rank: usize,
    /// Total number of workers across all launchers.
    pub world_size: usize,

    /// Rendezvous address handed to workers.
    pub master_addr: String,
    /// Rendezvous port handed to workers.
    pub master_port: u16,

    /// How long workers get to exit after a relayed termination signal.
    ///
    /// `0s` skips straight to force-kill.
    pub grace: Duration,
    /// Whether to run the rendezvous preflight check.
    pub preflight: bool,
    /// Connect timeout used by the preflight check.
    pub preflight_timeout: Duration,
    /// Capacity of the event bus ring buffer (min 1; clamped).
    pub bus_capacity: usize,
}

impl LaunchConfig {
    /// Global rank of the given local rank.
    #[inline]
    pub fn global_rank(&self, local_rank: usize) -> usize {
        self.base_rank + local_rank
    }

    /// Local ranks spawned by this launch.
    #[inline]
    pub fn local_ranks(&self) -> Range<usize> {
        0..self.local_workers
    }

    /// Rendezvous endpoint as `addr:port`.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.master_addr, self.master_port)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}
