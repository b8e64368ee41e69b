//! Liveness failures of a worker that stays up.

use e2e_tests::{event_channel, fast_options, modes, wait_for_event, WorkerFixture, FAIL_PINGS_AFTER_PROPERTY};
use procsup_supervisor::{ProcessState, ProcessSupervisor, SupervisorEvent};
use std::time::Duration;

#[tokio::test]
async fn test_failed_ping_marks_unhealthy() {
    let fixture = WorkerFixture::new("sluggish", modes::UNRESPONSIVE)
        .with_property(FAIL_PINGS_AFTER_PROPERTY, 600);
    let (events, mut rx) = event_channel();

    let mut supervisor = ProcessSupervisor::launch(&fixture.config, fast_options().with_events(events))
        .await
        .expect("launch should succeed");
    assert_eq!(supervisor.state(), ProcessState::Running);

    let event = wait_for_event(&mut rx, Duration::from_secs(10), |e| {
        matches!(e, SupervisorEvent::Unhealthy { .. })
    })
    .await
    .expect("unhealthy event should arrive");
    match event {
        SupervisorEvent::Unhealthy {
            name,
            consecutive_failures,
            ..
        } => {
            assert_eq!(name, "sluggish");
            assert_eq!(consecutive_failures, 1);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(supervisor.state(), ProcessState::Unhealthy);
    assert!(!supervisor.health().is_healthy);

    // Pinging stops for good once unhealthy
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while supervisor.is_ping_active() {
        assert!(tokio::time::Instant::now() < deadline, "ping schedule still active");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!supervisor.has_exited());

    supervisor.stop().await.expect("stop should succeed");
    let exit = supervisor.exit_info().expect("exit should be recorded");
    assert!(exit.expected);
    assert_eq!(supervisor.state(), ProcessState::Stopped);
}
