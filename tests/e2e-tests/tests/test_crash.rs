//! Workers that die on their own.

use e2e_tests::{
    event_channel, fast_options, modes, wait_for_event, wait_until_ready, WorkerFixture,
    CRASH_AFTER_PROPERTY,
};
use procsup_log_collection::{MemoryLineSink, StreamType};
use procsup_supervisor::{ProcessState, ProcessSupervisor, SupervisorEvent};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_crash_after_ready_is_unexpected_exit() {
    let fixture = WorkerFixture::new("fragile", modes::CRASH_AFTER_READY)
        .with_property(CRASH_AFTER_PROPERTY, 800);
    let (events, mut rx) = event_channel();

    let mut supervisor = ProcessSupervisor::launch(&fixture.config, fast_options().with_events(events))
        .await
        .expect("launch should succeed");
    wait_until_ready(&supervisor, Duration::from_secs(10))
        .await
        .expect("worker should become ready");

    let event = wait_for_event(&mut rx, Duration::from_secs(10), |e| {
        matches!(
            e,
            SupervisorEvent::UnexpectedExit { .. } | SupervisorEvent::Exited { .. }
        )
    })
    .await
    .expect("exit event should arrive");

    let exit = match event {
        SupervisorEvent::UnexpectedExit { name, exit } => {
            assert_eq!(name, "fragile");
            exit
        }
        other => panic!("expected an unexpected exit, got {:?}", other),
    };
    assert_eq!(exit.code, Some(3));
    assert!(!exit.expected);
    assert_eq!(exit.to_string(), "exit code 3");

    // Output was fully drained before the event went out
    let reports = supervisor.gobbler_reports();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.completed));
    assert!(reports.iter().any(|r| r.tag == "fragile-ERROR"));
    assert!(supervisor.stream_errors().is_empty());
    assert_eq!(supervisor.state(), ProcessState::Stopped);

    // Stopping a dead worker still releases everything
    supervisor.stop().await.expect("stop after crash should succeed");
    assert!(!supervisor.is_ping_active());
    assert!(!supervisor.exit_info().unwrap().expected);
}

#[tokio::test]
async fn test_wait_for_exit_reports_crash() {
    let fixture = WorkerFixture::new("short-lived", modes::CRASH_AFTER_READY)
        .with_property(CRASH_AFTER_PROPERTY, 300);

    let supervisor = ProcessSupervisor::launch(&fixture.config, fast_options())
        .await
        .expect("launch should succeed");
    let exit = tokio::time::timeout(Duration::from_secs(10), supervisor.wait_for_exit())
        .await
        .expect("worker should exit")
        .expect("exit should be recorded");

    assert_eq!(exit.code, Some(3));
    assert!(!exit.expected);
    assert!(supervisor.has_exited());
}

#[tokio::test]
async fn test_crash_during_startup_fails_launch() {
    let fixture = WorkerFixture::new("doomed", modes::CRASH);
    let (events, mut rx) = event_channel();
    let sink = MemoryLineSink::new(100);
    let options = fast_options()
        .with_events(events)
        .with_sink(Arc::new(sink.clone()));

    let err = ProcessSupervisor::launch(&fixture.config, options)
        .await
        .unwrap_err();
    assert!(err.is_management_channel(), "unexpected error: {}", err);
    assert_eq!(err.process_id(), "doomed");
    assert!(err.to_string().contains("exited during startup"));

    let event = wait_for_event(&mut rx, Duration::from_secs(5), |e| e.exit().is_some())
        .await
        .expect("exit event should arrive");
    assert!(
        matches!(event, SupervisorEvent::UnexpectedExit { .. }),
        "expected an unexpected exit, got {:?}",
        event
    );
    let exit = event.exit().unwrap();
    assert_eq!(exit.code, Some(3));
    assert!(!exit.expected);

    // Both streams were drained before the event went out
    assert_eq!(
        sink.lines(StreamType::Stdout),
        vec!["doomed starting in mode crash"]
    );
    assert!(sink
        .lines(StreamType::Stderr)
        .contains(&"fatal: crashing on purpose".to_string()));
}
