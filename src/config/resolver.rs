//! # Configuration resolver.
//!
//! Turns CLI arguments, an [`EnvSnapshot`] and an accelerator count into a
//! validated [`LaunchConfig`]. Resolution has no side effects: nothing is
//! spawned, bound or written.
//!
//! ## Rules
//! - `local_workers = accelerators` when positive, otherwise `WORLD_SIZE`
//! - neither available → [`LaunchError::Configuration`] ("no workers determinable")
//! - `world_size = WORLD_SIZE` when set, otherwise `local_workers`
//! - `base_rank + local_workers` must fit into `world_size` (and into `usize`)
//! - grace: `--sigterm-timeout` > `SIGTERM_TIMEOUT` > 10s
//! - the script must exist; it is canonicalized to an absolute path

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::{
    DEFAULT_BUS_CAPACITY, DEFAULT_GRACE, DEFAULT_MASTER_ADDR, DEFAULT_MASTER_PORT,
    DEFAULT_PREFLIGHT_TIMEOUT, ENV_MASTER_ADDR, ENV_MASTER_PORT, ENV_RANK, ENV_SIGTERM_TIMEOUT,
    ENV_WORLD_SIZE, EnvSnapshot, LaunchConfig,
};
use crate::error::LaunchError;

/// Launcher arguments taken from the command line.
#[derive(Clone, Debug)]
pub struct LaunchArgs {
    /// Worker script, as given.
    pub script: PathBuf,
    /// Arguments forwarded verbatim to the script.
    pub script_args: Vec<String>,
    /// `--sigterm-timeout` in seconds.
    pub sigterm_timeout: Option<f64>,
    /// `--interpreter`.
    pub interpreter: Option<PathBuf>,
    /// `--no-preflight` inverted.
    pub preflight: bool,
}

impl LaunchArgs {
    /// Arguments for `script` with no forwarded arguments and default options.
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            script_args: Vec::new(),
            sigterm_timeout: None,
            interpreter: None,
            preflight: true,
        }
    }

    /// Sets the forwarded script arguments.
    pub fn with_script_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the grace period in seconds.
    pub fn with_sigterm_timeout(mut self, secs: f64) -> Self {
        self.sigterm_timeout = Some(secs);
        self
    }
}

/// Resolves a [`LaunchConfig`] from an environment snapshot and accelerator count.
pub struct Resolver {
    env: EnvSnapshot,
    accelerators: usize,
}

impl Resolver {
    /// Creates a resolver over `env` for a host with `accelerators` devices.
    pub fn new(env: EnvSnapshot, accelerators: usize) -> Self {
        Self { env, accelerators }
    }

    /// Validates everything and builds the launch configuration.
    pub fn resolve(&self, args: LaunchArgs) -> Result<LaunchConfig, LaunchError> {
        let base_rank: usize = self.parse_var(ENV_RANK)?.unwrap_or(0);
        let world_override: Option<usize> = self.parse_var(ENV_WORLD_SIZE)?;
        if world_override == Some(0) {
            return Err(LaunchError::config(format!("{ENV_WORLD_SIZE} must be at least 1")));
        }

        let local_workers = match (self.accelerators, world_override) {
            (n, _) if n > 0 => n,
            (_, Some(world)) => world,
            (_, None) => {
                return Err(LaunchError::config(format!(
                    "no workers determinable: no accelerators found and {ENV_WORLD_SIZE} not specified"
                )));
            }
        };
        let world_size = world_override.unwrap_or(local_workers);
        let end_rank = base_rank.checked_add(local_workers).ok_or_else(|| {
            LaunchError::config(format!("{ENV_RANK}={base_rank} leaves no room for {local_workers} workers"))
        })?;
        if end_rank > world_size {
            return Err(LaunchError::config(format!(
                "ranks {base_rank}..{end_rank} do not fit into {ENV_WORLD_SIZE}={world_size}"
            )));
        }

        let master_addr = self
            .env
            .get(ENV_MASTER_ADDR)
            .unwrap_or(DEFAULT_MASTER_ADDR)
            .to_string();
        let master_port: u16 = self.parse_var(ENV_MASTER_PORT)?.unwrap_or(DEFAULT_MASTER_PORT);
        let grace = self.grace(args.sigterm_timeout)?;

        let script = match std::fs::canonicalize(&args.script) {
            Ok(p) if p.is_file() => p,
            _ => return Err(LaunchError::NotFound { path: args.script }),
        };

        Ok(LaunchConfig {
            script,
            script_args: args.script_args,
            interpreter: args.interpreter,
            local_workers,
            base_rank,
            world_size,
            master_addr,
            master_port,
            grace,
            preflight: args.preflight,
            preflight_timeout: DEFAULT_PREFLIGHT_TIMEOUT,
            bus_capacity: DEFAULT_BUS_CAPACITY,
        })
    }

    fn grace(&self, cli: Option<f64>) -> Result<Duration, LaunchError> {
        let secs = match cli {
            Some(secs) => secs,
            None => match self.parse_var::<f64>(ENV_SIGTERM_TIMEOUT)? {
                Some(secs) => secs,
                None => return Ok(DEFAULT_GRACE),
            },
        };
        Duration::try_from_secs_f64(secs)
            .map_err(|_| LaunchError::config(format!("invalid shutdown timeout {secs}s")))
    }

    fn parse_var<T: FromStr>(&self, key: &str) -> Result<Option<T>, LaunchError> {
        self.env
            .get(key)
            .map(|raw| {
                raw.parse()
                    .map_err(|_| LaunchError::config(format!("invalid {key}={raw:?}")))
            })
            .transpose()
    }
}
