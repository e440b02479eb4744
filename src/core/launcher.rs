//! # Launcher: runs one launch from resolved config to aggregated exit.
//!
//! The [`Launcher`] owns the event bus, the subscriber fan-out and the shutdown
//! trigger for a single launch. `run()` goes through the launch phases in
//! order and returns a [`LaunchReport`].
//!
//! ## High-level architecture
//! ```text
//! Launcher::run(self)
//!   ├─► subscriber_listener(): Bus.subscribe() ─► SubscriberSet::emit(Event)
//!   ├─► trigger.listen_os_signals(token)         (armed before any child exists)
//!   ├─► preflight::check_endpoint()              ─► PreflightPassed | EndpointUnavailable
//!   ├─► Spawner::spawn_all(registry, set)        ─► Err → trigger.request(SIGTERM)
//!   │
//!   ├─► loop select! {
//!   │     set.join_next()          ─► ExitAggregator::on_joined()  (record_exit → registry)
//!   │     coordinator.drive()      ─► relay ─► grace ─► force kill  (same registry)
//!   │   }                          until every actor has been joined
//!   │
//!   └─► drop the bus ─► listener drains subscriber queues ─► return report
//! ```
//!
//! ## Rules
//! - Workers are only ever waited on by their actors; the join loop is the
//!   single place their outcomes are collected.
//! - The coordinator and the aggregator share the registry concurrently, so
//!   exits during the grace period are seen by both.
//! - A spawn failure is returned only after every already-spawned worker has
//!   been shut down and reaped.
//! - Each call to `run()` builds a fresh bus, so all subscriber output for the
//!   launch is delivered before `run()` returns.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use rankvisor::{
//!     AcceleratorCount, EnvSnapshot, FixedAccelerators, LaunchArgs, Launcher, LogWriter, Resolver,
//!     Subscribe,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let env = EnvSnapshot::from_process();
//!     let cfg = Resolver::new(env, FixedAccelerators(2).count())
//!         .resolve(LaunchArgs::new("./train.sh").with_script_args(["--epochs", "1"]))?;
//!
//!     let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!     let report = Launcher::builder(cfg)
//!         .with_subscribers(subscribers)
//!         .build()
//!         .run()
//!         .await?;
//!
//!     for w in &report.workers {
//!         println!("Process {} exited with code {}", w.local_rank, w.code);
//!     }
//!     std::process::exit(report.process_exit_code().into());
//! }
//! ```

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::config::LaunchConfig;
use crate::core::aggregator::{ExitAggregator, LaunchReport};
use crate::core::builder::LauncherBuilder;
use crate::core::coordinator::ShutdownCoordinator;
use crate::core::registry::ProcessRegistry;
use crate::core::shutdown::{ShutdownTrigger, Signal};
use crate::core::spawner::{CommandFactory, Spawner};
use crate::error::LaunchError;
use crate::events::{Bus, Event, EventKind};
use crate::preflight;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Spawns and supervises the workers of one launch.
pub struct Launcher {
    cfg: LaunchConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    trigger: ShutdownTrigger,
    os_signals: bool,
    command: CommandFactory,
}

impl Launcher {
    /// Creates a builder for a launch of `cfg`.
    pub fn builder(cfg: LaunchConfig) -> LauncherBuilder {
        LauncherBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: LaunchConfig,
        subscribers: Vec<Arc<dyn Subscribe>>,
        trigger: ShutdownTrigger,
        os_signals: bool,
        command: CommandFactory,
    ) -> Self {
        Self {
            cfg,
            subscribers,
            trigger,
            os_signals,
            command,
        }
    }

    /// The configuration this launcher runs.
    pub fn config(&self) -> &LaunchConfig {
        &self.cfg
    }

    /// Handle for requesting shutdown from outside the launcher.
    pub fn trigger(&self) -> ShutdownTrigger {
        self.trigger.clone()
    }

    /// Runs the launch to completion.
    ///
    /// Returns the report once every spawned worker has exited. Configuration,
    /// preflight and signal-installation errors return before anything is
    /// spawned; a spawn error returns after the shutdown sequence has run.
    pub async fn run(self) -> Result<LaunchReport, LaunchError> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let listener = subscriber_listener(&bus, SubscriberSet::new(self.subscribers.clone()));

        let result = self.launch(&bus).await;

        // Last sender: the listener sees `Closed` once the backlog is delivered.
        drop(bus);
        if let Err(e) = listener.await {
            tracing::warn!(error = %e, "subscriber listener failed");
        }
        result
    }

    async fn launch(&self, bus: &Bus) -> Result<LaunchReport, LaunchError> {
        let token = CancellationToken::new();
        let _stop_listening = token.clone().drop_guard();
        if self.os_signals {
            self.trigger
                .listen_os_signals(token.clone())
                .map_err(LaunchError::Signals)?;
        }

        if self.cfg.preflight {
            let status = preflight::check_endpoint(
                &self.cfg.master_addr,
                self.cfg.master_port,
                self.cfg.preflight_timeout,
            )
            .await?;
            bus.publish(Event::now(EventKind::PreflightPassed).with_reason(status.as_str()));
        }

        let registry = ProcessRegistry::new();
        let coordinator = ShutdownCoordinator::new(self.cfg.grace, bus.clone());
        let mut set = JoinSet::new();

        let spawn_error = match Spawner::new(&self.cfg, bus, &self.command)
            .spawn_all(&registry, &mut set, &self.trigger)
            .await
        {
            Ok(_) => None,
            Err(e) => {
                self.trigger.request(Signal::SIGTERM);
                Some(e)
            }
        };

        let mut aggregator = ExitAggregator::new(&registry, bus.clone());
        let drive = coordinator.drive(&registry, &self.trigger);
        tokio::pin!(drive);

        let mut shutdown = None;
        let mut driven = false;
        loop {
            tokio::select! {
                joined = set.join_next() => match joined {
                    Some(joined) => aggregator.on_joined(joined).await,
                    None => break,
                },
                report = &mut drive, if !driven => {
                    shutdown = report;
                    driven = true;
                }
            }
        }
        // Every worker is gone, but a requested sequence still has to report.
        if !driven && self.trigger.requested().is_some() {
            shutdown = drive.await;
        }

        let report = aggregator.finish(self.cfg.local_workers, shutdown).await;
        match spawn_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

/// Forwards bus events to the subscriber set until the bus closes, then drains it.
fn subscriber_listener(bus: &Bus, set: SubscriberSet) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => set.emit(ev),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber listener lagged; events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        set.shutdown().await;
    })
}
