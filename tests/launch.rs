//! End-to-end launches with real `/bin/sh` workers.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rankvisor::{
    EnvSnapshot, Event, EventKind, LaunchArgs, LaunchConfig, LaunchError, Launcher, Resolver,
    ShutdownPhase, ShutdownTrigger, Signal, Subscribe, worker_command,
};
use tempfile::TempDir;
use tokio::process::Command;

const SH: &str = "/bin/sh";

fn write_script(dir: &TempDir, name: &str, body: &str, mode: u32) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
    path
}

fn free_port() -> u16 {
    let l = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
    l.local_addr().unwrap().port()
}

/// Resolves a config for `workers` local workers without accelerators.
///
/// Scripts are run through `/bin/sh` so that no test execs a file it just wrote.
fn config(script: &Path, workers: usize, grace_secs: f64, args: &[&str]) -> LaunchConfig {
    let env = EnvSnapshot::from_pairs([
        ("WORLD_SIZE", workers.to_string()),
        ("MASTER_PORT", free_port().to_string()),
    ]);
    let mut args = LaunchArgs::new(script)
        .with_script_args(args.iter().copied())
        .with_sigterm_timeout(grace_secs);
    args.interpreter = Some(PathBuf::from(SH));
    args.preflight = false;
    Resolver::new(env, 0).resolve(args).unwrap()
}

fn launcher(cfg: LaunchConfig) -> Launcher {
    Launcher::builder(cfg).with_os_signals(false).build()
}

#[tokio::test]
async fn four_clean_workers_never_reach_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "ok.sh", "exit 0", 0o755);

    let report = launcher(config(&script, 4, 10.0, &[])).run().await.unwrap();

    assert_eq!(report.exit_code(), 0);
    assert!(report.shutdown.is_none());
    let ranks: Vec<_> = report.workers.iter().map(|w| w.local_rank).collect();
    assert_eq!(ranks, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn aggregate_is_the_worst_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        &dir,
        "mixed.sh",
        r#"if [ "$LOCAL_RANK" = 1 ]; then exit 2; fi
exit 0"#,
        0o755,
    );

    let report = launcher(config(&script, 3, 10.0, &[])).run().await.unwrap();

    let codes: Vec<_> = report.workers.iter().map(|w| w.code).collect();
    assert_eq!(codes, vec![0, 2, 0]);
    assert_eq!(report.exit_code(), 2);
    assert_eq!(report.process_exit_code(), 2);
}

#[tokio::test]
async fn workers_receive_ranks_endpoint_and_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        &dir,
        "env.sh",
        r#"out="$1"; shift
echo "$LOCAL_RANK $RANK $WORLD_SIZE $MASTER_ADDR $MASTER_PORT $# $*" > "$out/rank_$LOCAL_RANK""#,
        0o755,
    );
    let out = dir.path().to_str().unwrap();

    let env = EnvSnapshot::from_pairs([
        ("RANK", "4"),
        ("WORLD_SIZE", "8"),
        ("MASTER_ADDR", "10.9.8.7"),
        ("MASTER_PORT", "6123"),
    ]);
    let mut args = LaunchArgs::new(&script).with_script_args([out, "--epochs", "2 3"]);
    args.interpreter = Some(PathBuf::from(SH));
    args.preflight = false;
    let cfg = Resolver::new(env, 2).resolve(args).unwrap();

    let report = launcher(cfg).run().await.unwrap();
    assert_eq!(report.exit_code(), 0);

    for local in 0..2 {
        let line = fs::read_to_string(dir.path().join(format!("rank_{local}"))).unwrap();
        let expected = format!("{local} {} 8 10.9.8.7 6123 2 --epochs 2 3\n", 4 + local);
        assert_eq!(line, expected);
    }
}

#[tokio::test]
async fn stubborn_worker_is_force_killed_after_grace() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        &dir,
        "stubborn.sh",
        r#"if [ "$LOCAL_RANK" = 0 ]; then trap '' TERM; fi
exec sleep 30"#,
        0o755,
    );

    let launcher = launcher(config(&script, 2, 1.0, &[]));
    let trigger = launcher.trigger();
    let started = Instant::now();
    let run = tokio::spawn(launcher.run());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(trigger.request(Signal::SIGTERM));
    let report = run.await.unwrap().unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");

    let shutdown = report.shutdown.as_ref().unwrap();
    assert_eq!(shutdown.signal, Signal::SIGTERM);
    assert_eq!(shutdown.relayed, vec![0, 1]);
    assert!(shutdown.grace_exceeded);
    assert_eq!(shutdown.force_killed, vec![0]);
    assert_eq!(shutdown.phase, ShutdownPhase::Terminated);
    assert!(shutdown.elapsed >= Duration::from_secs(1));
    assert!(shutdown.elapsed < Duration::from_secs(3));

    assert_eq!(report.workers[0].code, 137);
    assert_eq!(report.workers[0].signal_name(), Some("SIGKILL"));
    assert_eq!(report.workers[1].code, 143);
    assert_eq!(report.exit_code(), 143);
}

#[tokio::test]
async fn cooperative_workers_stop_within_grace() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        &dir,
        "polite.sh",
        r#"trap 'kill $! 2>/dev/null; exit 0' TERM
sleep 30 &
wait"#,
        0o755,
    );

    let launcher = launcher(config(&script, 3, 5.0, &[]));
    let trigger = launcher.trigger();
    let run = tokio::spawn(launcher.run());

    tokio::time::sleep(Duration::from_millis(500)).await;
    trigger.request(Signal::SIGINT);
    let report = tokio::time::timeout(Duration::from_secs(4), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let shutdown = report.shutdown.unwrap();
    assert_eq!(shutdown.signal, Signal::SIGINT);
    assert!(!shutdown.grace_exceeded);
    assert!(shutdown.force_killed.is_empty());
}

#[tokio::test]
async fn shutdown_requested_before_spawn_starts_nobody() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("started");
    let script = write_script(&dir, "touch.sh", r#"touch "$1""#, 0o755);

    let trigger = ShutdownTrigger::new();
    trigger.request(Signal::SIGTERM);
    let report = Launcher::builder(config(&script, 2, 1.0, &[marker.to_str().unwrap()]))
        .with_trigger(trigger)
        .with_os_signals(false)
        .build()
        .run()
        .await
        .unwrap();

    assert!(report.workers.is_empty());
    assert_eq!((report.spawned, report.requested), (0, 2));
    assert!(!report.is_complete());
    assert_eq!(report.exit_code(), 143);
    assert_eq!(report.process_exit_code(), 143);
    assert!(report.shutdown.unwrap().relayed.is_empty());
    assert!(!marker.exists());
}

#[tokio::test]
async fn unusable_endpoint_fails_before_spawn() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("started");
    let script = write_script(&dir, "touch.sh", r#"touch "$1""#, 0o755);

    let mut cfg = config(&script, 2, 1.0, &[marker.to_str().unwrap()]);
    cfg.master_addr = "192.0.2.1".into();
    cfg.preflight = true;
    cfg.preflight_timeout = Duration::from_millis(300);

    let err = launcher(cfg).run().await.unwrap_err();
    assert!(matches!(err, LaunchError::EndpointUnavailable { .. }));
    assert_eq!(err.exit_code(), 1);
    assert!(!marker.exists());
}

#[tokio::test]
async fn non_executable_script_is_a_spawn_error() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "noexec.sh", "exit 0", 0o644);

    let mut cfg = config(&script, 2, 1.0, &[]);
    cfg.interpreter = None;

    let err = launcher(cfg).run().await.unwrap_err();
    match err {
        LaunchError::Spawn {
            local_rank,
            spawned,
            ..
        } => {
            assert_eq!(local_rank, 0);
            assert_eq!(spawned, 0);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[derive(Default)]
struct Recorder(Mutex<Vec<Event>>);

impl Recorder {
    fn of_kind(&self, kind: EventKind) -> Vec<Event> {
        let events = self.0.lock().unwrap();
        events.iter().filter(|e| e.kind == kind).cloned().collect()
    }
}

#[async_trait]
impl Subscribe for Recorder {
    async fn on_event(&self, event: &Event) {
        self.0.lock().unwrap().push(event.clone());
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

#[tokio::test]
async fn subscribers_are_drained_before_run_returns() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "ok.sh", "exit 0", 0o755);
    let recorder = Arc::new(Recorder::default());

    Launcher::builder(config(&script, 2, 1.0, &[]))
        .with_subscribers(vec![recorder.clone() as Arc<dyn Subscribe>])
        .with_os_signals(false)
        .build()
        .run()
        .await
        .unwrap();

    assert_eq!(recorder.of_kind(EventKind::WorkerSpawned).len(), 2);
    assert_eq!(recorder.of_kind(EventKind::WorkerExited).len(), 2);
    assert!(recorder.of_kind(EventKind::ShutdownRequested).is_empty());
}

#[tokio::test]
async fn failed_spawn_stops_and_reaps_running_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "sleep.sh", "exec sleep 30", 0o755);
    let recorder = Arc::new(Recorder::default());

    let launcher = Launcher::builder(config(&script, 3, 5.0, &[]))
        .with_subscribers(vec![recorder.clone() as Arc<dyn Subscribe>])
        .with_os_signals(false)
        .with_command(|cfg: &LaunchConfig, local_rank: usize| {
            if local_rank == 1 {
                Command::new("/nonexistent/rankvisor-worker")
            } else {
                worker_command(cfg, local_rank)
            }
        })
        .build();

    let started = Instant::now();
    let err = launcher.run().await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(4), "took {:?}", started.elapsed());

    match err {
        LaunchError::Spawn {
            local_rank,
            spawned,
            ..
        } => assert_eq!((local_rank, spawned), (1, 1)),
        other => panic!("unexpected: {other:?}"),
    }

    let requested = recorder.of_kind(EventKind::ShutdownRequested);
    assert_eq!(requested.len(), 1);
    assert_eq!(requested[0].signal, Some("SIGTERM"));

    let spawned = recorder.of_kind(EventKind::WorkerSpawned);
    assert_eq!(spawned.len(), 1);
    assert_eq!(spawned[0].local_rank, Some(0));

    let exited = recorder.of_kind(EventKind::WorkerExited);
    assert_eq!(exited.len(), 1);
    assert_eq!(exited[0].local_rank, Some(0));
    assert!(
        matches!(exited[0].exit_code, Some(143) | Some(137)),
        "{:?}",
        exited[0].exit_code
    );
    assert_eq!(recorder.of_kind(EventKind::ShutdownCompleted).len(), 1);
}
