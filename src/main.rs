//! `launcher`: starts one worker per local accelerator and supervises them.
//!
//! ```text
//! launcher [OPTIONS] <SCRIPT> [SCRIPT_ARGS]...
//! ```
//!
//! Options must come before the script; everything after it is passed to the
//! script unchanged. Logs go to stderr, worker output is left untouched, and
//! the per-worker summary is printed to stdout.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rankvisor::{
    AcceleratorCount, EnvSnapshot, FAILURE_EXIT_CODE, FixedAccelerators, LaunchArgs, LaunchError,
    Launcher, LogWriter, Resolver, Subscribe, SystemAccelerators,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Single-node launcher for ranked distributed workers.
#[derive(Parser, Debug)]
#[command(name = "launcher")]
#[command(version)]
struct Cli {
    /// Seconds workers get to exit after a relayed signal before they are killed
    /// [env: SIGTERM_TIMEOUT] [default: 10]
    #[arg(long, value_name = "SECONDS")]
    sigterm_timeout: Option<f64>,

    /// Program that runs the script (`PATH <script> [args...]`)
    #[arg(long, value_name = "PATH")]
    interpreter: Option<PathBuf>,

    /// Number of workers to start, instead of one per detected accelerator
    #[arg(long, value_name = "N")]
    nproc_per_node: Option<usize>,

    /// Skip the rendezvous endpoint check
    #[arg(long)]
    no_preflight: bool,

    /// Log filter (trace, debug, info, warn, error); overrides RUST_LOG
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,

    /// Worker script followed by the arguments forwarded to it
    #[arg(
        value_name = "SCRIPT [SCRIPT_ARGS]",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_logging(cli.log_level.as_deref()) {
        eprintln!("launcher: {e:#}");
        return ExitCode::from(FAILURE_EXIT_CODE);
    }

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::debug!(label = e.as_label(), "launch failed");
            eprintln!("launcher: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<u8, LaunchError> {
    let env = EnvSnapshot::from_process();
    let accelerators = match cli.nproc_per_node {
        Some(n) => FixedAccelerators(n).count(),
        None => SystemAccelerators::new(&env).count(),
    };

    let mut command = cli.command.into_iter();
    let script = command.next().unwrap_or_default();
    let mut args = LaunchArgs::new(script).with_script_args(command);
    args.sigterm_timeout = cli.sigterm_timeout;
    args.interpreter = cli.interpreter;
    args.preflight = !cli.no_preflight;

    let cfg = Resolver::new(env, accelerators).resolve(args)?;
    tracing::info!(
        script = %cfg.script.display(),
        workers = cfg.local_workers,
        base_rank = cfg.base_rank,
        world_size = cfg.world_size,
        endpoint = %cfg.endpoint(),
        grace = ?cfg.grace,
        "launching workers"
    );

    let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let report = Launcher::builder(cfg)
        .with_subscribers(subscribers)
        .build()
        .run()
        .await?;

    for w in &report.workers {
        println!("Process {} exited with code {}", w.local_rank, w.code);
    }
    if !report.is_complete() {
        tracing::warn!(
            spawned = report.spawned,
            requested = report.requested,
            "shutdown requested before every worker was started"
        );
    }
    if let Some(shutdown) = &report.shutdown {
        tracing::info!(
            signal = shutdown.signal.as_str(),
            force_killed = ?shutdown.force_killed,
            elapsed = ?shutdown.elapsed,
            "workers shut down"
        );
    }
    Ok(report.process_exit_code())
}

fn setup_logging(level: Option<&str>) -> anyhow::Result<()> {
    let filter = match level {
        Some(level) => {
            EnvFilter::try_new(level).with_context(|| format!("invalid log level {level:?}"))?
        }
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}
