//! Launch, readiness and orderly shutdown of a well-behaved worker.

use e2e_tests::{
    drain_events, event_channel, fast_options, modes, wait_until_ready, WorkerFixture,
    READY_DELAY_PROPERTY,
};
use procsup_supervisor::{ProcessState, ProcessSupervisor, SupervisorEvent};
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_launch_ready_stop() {
    let fixture = WorkerFixture::new("steady", modes::STEADY).with_property(READY_DELAY_PROPERTY, 500);
    let (events, mut rx) = event_channel();

    let mut supervisor = ProcessSupervisor::launch(&fixture.config, fast_options().with_events(events))
        .await
        .expect("launch should succeed");
    assert_eq!(supervisor.state(), ProcessState::Running);
    assert!(supervisor.is_ping_active());
    assert_ne!(supervisor.port(), 0);

    wait_until_ready(&supervisor, Duration::from_secs(10))
        .await
        .expect("worker should become ready");
    // Pings have been going through in the meantime
    assert!(supervisor.health().is_healthy);
    assert!(supervisor.health().consecutive_successes >= 1);

    let started = Instant::now();
    supervisor.stop().await.expect("stop should succeed");
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(supervisor.state(), ProcessState::Stopped);
    assert!(!supervisor.is_ping_active());
    let exit = supervisor.exit_info().expect("exit should be recorded");
    assert!(exit.expected);
    assert!(exit.success());

    let seen = drain_events(&mut rx);
    assert!(matches!(seen.first(), Some(SupervisorEvent::Spawned { .. })));
    assert!(seen
        .iter()
        .any(|e| matches!(e, SupervisorEvent::ManagementConnected { .. })));
    assert!(seen
        .iter()
        .any(|e| matches!(e, SupervisorEvent::StopRequested { .. })));
    assert!(seen.iter().any(|e| matches!(e, SupervisorEvent::Exited { .. })));
    assert!(!seen
        .iter()
        .any(|e| matches!(e, SupervisorEvent::UnexpectedExit { .. })));
}

#[tokio::test]
async fn test_immediate_stop() {
    // Ready only much later; stop must not wait for readiness
    let fixture = WorkerFixture::new("early-stop", modes::STEADY)
        .with_property(READY_DELAY_PROPERTY, 60_000);

    let mut supervisor = ProcessSupervisor::launch(&fixture.config, fast_options())
        .await
        .expect("launch should succeed");
    supervisor.stop().await.expect("stop should succeed");

    assert!(!supervisor.is_ping_active());
    let exit = supervisor.exit_info().expect("exit should be recorded");
    assert!(exit.expected);
    assert!(exit.success());
}

#[tokio::test]
async fn test_stop_twice() {
    let fixture = WorkerFixture::new("twice", modes::STEADY);
    let (events, mut rx) = event_channel();

    let mut supervisor = ProcessSupervisor::launch(&fixture.config, fast_options().with_events(events))
        .await
        .expect("launch should succeed");
    supervisor.stop().await.expect("first stop should succeed");
    supervisor.stop().await.expect("second stop should succeed");

    let stop_requests = drain_events(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, SupervisorEvent::StopRequested { .. }))
        .count();
    assert_eq!(stop_requests, 1);
}

#[tokio::test]
async fn test_is_ready_fails_after_stop() {
    let fixture = WorkerFixture::new("gone", modes::STEADY);
    let mut supervisor = ProcessSupervisor::launch(&fixture.config, fast_options())
        .await
        .expect("launch should succeed");
    supervisor.stop().await.unwrap();

    let err = supervisor.is_ready().await.unwrap_err();
    assert!(err.is_management_channel());
    assert!(err.to_string().contains("gone"));
}
