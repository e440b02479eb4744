use std::sync::Arc;

use tokio::process::Command;

use super::launcher::Launcher;
use super::shutdown::ShutdownTrigger;
use super::spawner::{CommandFactory, worker_command};
use crate::config::LaunchConfig;
use crate::subscribers::Subscribe;

/// Builder for a [`Launcher`].
pub struct LauncherBuilder {
    cfg: LaunchConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    trigger: Option<ShutdownTrigger>,
    os_signals: bool,
    command: Option<CommandFactory>,
}

impl LauncherBuilder {
    /// Creates a builder for `cfg` with OS signal handling enabled and no subscribers.
    pub fn new(cfg: LaunchConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            trigger: None,
            os_signals: true,
            command: None,
        }
    }

    /// Sets event subscribers.
    ///
    /// Each subscriber gets a dedicated worker with a bounded queue; a slow or
    /// panicking subscriber never delays the launch.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Uses an existing trigger, so shutdown can be requested before `build()`.
    pub fn with_trigger(mut self, trigger: ShutdownTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Enables or disables SIGINT/SIGTERM/SIGQUIT handling (enabled by default).
    ///
    /// With OS signals disabled, shutdown can only be requested through
    /// [`Launcher::trigger`].
    pub fn with_os_signals(mut self, enabled: bool) -> Self {
        self.os_signals = enabled;
        self
    }

    /// Replaces the per-rank command (default: [`worker_command`]).
    ///
    /// Useful for wrapping workers (`numactl`, `taskset`, ...); start from
    /// [`worker_command`] to keep the rank environment. The returned command
    /// is always spawned with `kill_on_drop`.
    pub fn with_command<F>(mut self, factory: F) -> Self
    where
        F: Fn(&LaunchConfig, usize) -> Command + Send + Sync + 'static,
    {
        let factory: CommandFactory = Arc::new(factory);
        self.command = Some(factory);
        self
    }

    /// Builds the launcher. Nothing is spawned until [`Launcher::run`].
    pub fn build(self) -> Launcher {
        Launcher::new_internal(
            self.cfg,
            self.subscribers,
            self.trigger.unwrap_or_default(),
            self.os_signals,
            self.command
                .unwrap_or_else(|| Arc::new(worker_command) as CommandFactory),
        )
    }
}
