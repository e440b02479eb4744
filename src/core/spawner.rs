//! # Process spawner.
//!
//! Creates one OS process per local rank, in increasing rank order:
//!
//! ```text
//! for local_rank in 0..local_workers {
//!   ├─► shutdown already requested? ──► stop spawning (coordinator takes over)
//!   ├─► env = inherited env + LOCAL_RANK/RANK/WORLD_SIZE/MASTER_ADDR/MASTER_PORT
//!   ├─► command(cfg, local_rank).kill_on_drop(true).spawn()    (no shell)
//!   │       └─ Err ──► SpawnFailed, return LaunchError::Spawn
//!   ├─► registry.register(local, global, control_tx)
//!   └─► set.spawn(WorkerActor::run())
//! }
//! ```
//!
//! The command comes from a [`CommandFactory`], [`worker_command`] unless the
//! launcher was built with another one. Whatever the factory returns, the
//! child is killed if its actor is dropped.
//!
//! Spawning never waits on a worker. On failure the caller is responsible for
//! shutting down what was already started.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::config::{
    ENV_LOCAL_RANK, ENV_MASTER_ADDR, ENV_MASTER_PORT, ENV_RANK, ENV_WORLD_SIZE, LaunchConfig,
};
use crate::core::actor::{WorkerActor, WorkerExit};
use crate::core::registry::ProcessRegistry;
use crate::core::shutdown::ShutdownTrigger;
use crate::error::LaunchError;
use crate::events::{Bus, Event, EventKind};

/// Environment overrides handed to the worker with `local_rank`.
///
/// Everything else is inherited from the launcher's own environment.
pub fn worker_env(cfg: &LaunchConfig, local_rank: usize) -> [(&'static str, String); 5] {
    [
        (ENV_LOCAL_RANK, local_rank.to_string()),
        (ENV_RANK, cfg.global_rank(local_rank).to_string()),
        (ENV_WORLD_SIZE, cfg.world_size.to_string()),
        (ENV_MASTER_ADDR, cfg.master_addr.clone()),
        (ENV_MASTER_PORT, cfg.master_port.to_string()),
    ]
}

/// Builds the OS command for one local rank.
pub type CommandFactory = Arc<dyn Fn(&LaunchConfig, usize) -> Command + Send + Sync>;

/// Default command for one worker: the script (or `interpreter script`) with
/// the forwarded arguments and [`worker_env`]. The program is executed directly.
pub fn worker_command(cfg: &LaunchConfig, local_rank: usize) -> Command {
    let mut cmd = match &cfg.interpreter {
        Some(interpreter) => {
            let mut cmd = Command::new(interpreter);
            cmd.arg(&cfg.script);
            cmd
        }
        None => Command::new(&cfg.script),
    };
    cmd.args(&cfg.script_args)
        .envs(worker_env(cfg, local_rank))
        .kill_on_drop(true);
    cmd
}

pub(crate) struct Spawner<'a> {
    cfg: &'a LaunchConfig,
    bus: &'a Bus,
    command: &'a CommandFactory,
}

impl<'a> Spawner<'a> {
    pub(crate) fn new(cfg: &'a LaunchConfig, bus: &'a Bus, command: &'a CommandFactory) -> Self {
        Self { cfg, bus, command }
    }

    /// Spawns every local rank, registering each worker and starting its actor.
    ///
    /// Returns the number of workers started, which is lower than
    /// `local_workers` only if shutdown was requested mid-way.
    pub(crate) async fn spawn_all(
        &self,
        registry: &ProcessRegistry,
        set: &mut JoinSet<WorkerExit>,
        trigger: &ShutdownTrigger,
    ) -> Result<usize, LaunchError> {
        let mut spawned = 0;
        for local_rank in self.cfg.local_ranks() {
            if let Some(sig) = trigger.requested() {
                tracing::warn!(
                    signal = sig.as_str(),
                    spawned,
                    requested = self.cfg.local_workers,
                    "shutdown requested while spawning; not starting remaining workers"
                );
                break;
            }

            let global_rank = self.cfg.global_rank(local_rank);
            let mut cmd = (self.command)(self.cfg, local_rank);
            let child = match cmd.kill_on_drop(true).spawn() {
                Ok(child) => child,
                Err(source) => {
                    self.bus.publish(
                        Event::now(EventKind::SpawnFailed)
                            .with_local_rank(local_rank)
                            .with_reason(source.to_string()),
                    );
                    return Err(LaunchError::Spawn {
                        local_rank,
                        spawned,
                        source,
                    });
                }
            };

            let pid = child.id();
            let (tx, rx) = mpsc::unbounded_channel();
            registry.register(local_rank, global_rank, tx).await;

            let actor = WorkerActor::new(local_rank, global_rank, child, rx, self.bus.clone());
            set.spawn(async move {
                AssertUnwindSafe(actor.run())
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| WorkerExit::lost(local_rank, global_rank))
            });

            self.bus.publish(
                Event::now(EventKind::WorkerSpawned)
                    .with_ranks(local_rank, global_rank)
                    .with_pid(pid),
            );
            spawned += 1;
        }
        Ok(spawned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::time::Duration;

    fn config(base_rank: usize, local_workers: usize, world_size: usize) -> LaunchConfig {
        LaunchConfig {
            script: PathBuf::from("/bin/true"),
            script_args: vec![],
            interpreter: None,
            local_workers,
            base_rank,
            world_size,
            master_addr: "10.0.0.7".into(),
            master_port: 29511,
            grace: Duration::from_secs(1),
            preflight: false,
            preflight_timeout: Duration::from_millis(100),
            bus_capacity: 16,
        }
    }

    fn var<'e>(env: &'e [(&'static str, String); 5], key: &str) -> &'e str {
        env.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str()).unwrap()
    }

    #[test]
    fn global_ranks_are_contiguous_and_unique() {
        for (base, n) in [(0, 1), (0, 4), (8, 8), (3, 5)] {
            let cfg = config(base, n, base + n);
            let ranks: Vec<usize> = cfg
                .local_ranks()
                .map(|l| var(&worker_env(&cfg, l), ENV_RANK).parse().unwrap())
                .collect();
            let unique: HashSet<_> = ranks.iter().copied().collect();

            assert_eq!(ranks, (base..base + n).collect::<Vec<_>>());
            assert_eq!(unique.len(), n);
        }
    }

    #[test]
    fn every_worker_sees_the_same_world() {
        let cfg = config(4, 4, 16);
        for local in cfg.local_ranks() {
            let env = worker_env(&cfg, local);
            assert_eq!(var(&env, ENV_LOCAL_RANK), local.to_string());
            assert_eq!(var(&env, ENV_WORLD_SIZE), "16");
            assert_eq!(var(&env, ENV_MASTER_ADDR), "10.0.0.7");
            assert_eq!(var(&env, ENV_MASTER_PORT), "29511");
        }
    }

    #[test]
    fn interpreter_runs_the_script_as_first_argument() {
        let mut c = config(0, 1, 1);
        c.interpreter = Some(PathBuf::from("/usr/bin/python3"));
        c.script = PathBuf::from("/opt/train.py");
        c.script_args = vec!["--epochs".into(), "2".into()];

        let cmd = worker_command(&c, 0);
        let std = cmd.as_std();
        assert_eq!(std.get_program(), "/usr/bin/python3");
        let args: Vec<_> = std.get_args().collect();
        assert_eq!(args, ["/opt/train.py", "--epochs", "2"]);
    }

    #[tokio::test]
    async fn failure_mid_way_keeps_the_spawned_workers_registered() {
        let mut cfg = config(0, 3, 3);
        cfg.script = PathBuf::from("/bin/sleep");
        cfg.script_args = vec!["30".into()];
        let factory: CommandFactory = Arc::new(|cfg: &LaunchConfig, local_rank: usize| {
            if local_rank == 1 {
                Command::new("/nonexistent/rankvisor-worker")
            } else {
                worker_command(cfg, local_rank)
            }
        });
        let bus = Bus::new(16);
        let registry = ProcessRegistry::new();
        let mut set = JoinSet::new();

        let err = Spawner::new(&cfg, &bus, &factory)
            .spawn_all(&registry, &mut set, &ShutdownTrigger::new())
            .await
            .unwrap_err();

        match err {
            LaunchError::Spawn {
                local_rank,
                spawned,
                ..
            } => assert_eq!((local_rank, spawned), (1, 1)),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(registry.alive_ranks().await, vec![0]);
        assert_eq!(set.len(), 1);

        // Force-kill the sleeper so its actor can finish.
        registry.kill_alive().await;
        let exit = set.join_next().await.unwrap().unwrap();
        assert_eq!(exit.code, 137);
    }

    #[tokio::test]
    async fn pending_request_spawns_nothing() {
        let cfg = config(0, 2, 2);
        let factory: CommandFactory = Arc::new(worker_command);
        let bus = Bus::new(16);
        let registry = ProcessRegistry::new();
        let mut set = JoinSet::new();
        let trigger = ShutdownTrigger::new();
        trigger.request(crate::core::shutdown::Signal::SIGTERM);

        let spawned = Spawner::new(&cfg, &bus, &factory)
            .spawn_all(&registry, &mut set, &trigger)
            .await
            .unwrap();
        assert_eq!(spawned, 0);
        assert!(set.is_empty());
    }
}
