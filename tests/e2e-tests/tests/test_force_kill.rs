//! Workers that will not leave when asked.

use e2e_tests::{event_channel, fast_options, modes, wait_for_event, WorkerFixture};
use procsup_supervisor::{ProcessState, ProcessSupervisor, SupervisorEvent};
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_stop_escalates_to_kill() {
    let fixture = WorkerFixture::new("stubborn", modes::IGNORE_STOP);
    let (events, mut rx) = event_channel();
    let mut options = fast_options().with_events(events);
    options.stop_timeout = Duration::from_millis(800);

    let mut supervisor = ProcessSupervisor::launch(&fixture.config, options)
        .await
        .expect("launch should succeed");

    let started = Instant::now();
    supervisor.stop().await.expect("stop should succeed");
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(800), "stopped too early: {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(5), "stopped too late: {:?}", elapsed);

    assert_eq!(supervisor.state(), ProcessState::Stopped);
    let exit = supervisor.exit_info().expect("exit should be recorded");
    // A kill we asked for is still a requested exit
    assert!(exit.expected);
    assert!(!exit.success());
    #[cfg(unix)]
    assert_eq!(exit.signal, Some(9));

    let event = wait_for_event(&mut rx, Duration::from_secs(2), |e| e.exit().is_some())
        .await
        .expect("exit event should arrive");
    assert!(matches!(event, SupervisorEvent::Exited { .. }));
}
