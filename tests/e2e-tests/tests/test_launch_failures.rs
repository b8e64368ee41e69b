//! Launches that must fail without leaving anything behind.

use e2e_tests::{drain_events, event_channel, fast_options, modes, WorkerFixture};
use procsup_common::ProcessError;
use procsup_process::{process_exists, WorkerConfig};
use procsup_supervisor::{ProcessSupervisor, SupervisorEvent};
use std::time::Duration;

#[tokio::test]
async fn test_unreachable_endpoint_kills_worker() {
    let fixture = WorkerFixture::new("mute", modes::SILENT);
    let (events, mut rx) = event_channel();
    let mut options = fast_options().with_events(events);
    options.connect_timeout = Duration::from_millis(800);

    let err = ProcessSupervisor::launch(&fixture.config, options)
        .await
        .unwrap_err();
    assert!(err.is_management_channel(), "unexpected error: {}", err);
    assert!(err.to_string().contains("gave up"));

    let seen = drain_events(&mut rx);
    let pid = match seen.first() {
        Some(SupervisorEvent::Spawned { pid, .. }) => *pid,
        other => panic!("expected a spawn event first, got {:?}", other),
    };
    assert!(!seen
        .iter()
        .any(|e| matches!(e, SupervisorEvent::ManagementConnected { .. })));

    // The watcher reaped the worker before launch returned
    let exit = seen
        .iter()
        .find_map(|e| e.exit())
        .expect("exit event should precede the error");
    assert!(exit.expected);
    assert!(!process_exists(pid).unwrap());
}

#[tokio::test]
async fn test_missing_working_directory() {
    let fixture = WorkerFixture::new("homeless", modes::STEADY);
    let mut config = fixture.config.clone();
    config.working_directory = fixture.dir.path().join("does-not-exist");

    let err = ProcessSupervisor::launch(&config, fast_options())
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::Configuration { .. }), "unexpected error: {}", err);
    assert_eq!(err.process_id(), "homeless");
}

#[tokio::test]
async fn test_missing_executable() {
    let dir = tempfile::tempdir().unwrap();
    let config = WorkerConfig::new(
        "ghost",
        dir.path(),
        dir.path().join("no-such-binary"),
        modes::STEADY,
    );

    let err = ProcessSupervisor::launch(&config, fast_options())
        .await
        .unwrap_err();
    assert!(
        matches!(err, ProcessError::SpawnFailed { .. } | ProcessError::Configuration { .. }),
        "unexpected error: {}",
        err
    );
}
