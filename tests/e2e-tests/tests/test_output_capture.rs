//! Console output of the worker reaches the sink, tagged per stream.

use e2e_tests::{fast_options, modes, wait_until_ready, WorkerFixture, LINES_PROPERTY};
use procsup_log_collection::{MemoryLineSink, StreamType};
use procsup_supervisor::ProcessSupervisor;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_stdout_and_stderr_are_captured_in_order() {
    let fixture = WorkerFixture::new("talker", modes::CHATTY).with_property(LINES_PROPERTY, 5);
    let sink = MemoryLineSink::new(1000);

    let mut supervisor = ProcessSupervisor::launch(
        &fixture.config,
        fast_options().with_sink(Arc::new(sink.clone())),
    )
    .await
    .expect("launch should succeed");
    wait_until_ready(&supervisor, Duration::from_secs(10))
        .await
        .expect("worker should become ready");
    supervisor.stop().await.expect("stop should succeed");

    let stdout = sink.lines(StreamType::Stdout);
    let numbered: Vec<&str> = stdout
        .iter()
        .map(String::as_str)
        .filter(|line| line.starts_with("line-"))
        .collect();
    assert_eq!(numbered, vec!["line-1", "line-2", "line-3", "line-4", "line-5"]);
    assert_eq!(
        stdout.first().map(String::as_str),
        Some("talker starting in mode chatty")
    );
    // Everything up to exit is drained, including the farewell
    assert_eq!(stdout.last().map(String::as_str), Some("talker stopped"));

    let stderr = sink.lines(StreamType::Stderr);
    for i in 1..=5 {
        assert!(stderr.contains(&format!("err-{}", i)), "missing err-{}", i);
    }

    let entries = sink.entries();
    assert!(entries
        .iter()
        .filter(|e| e.stream == StreamType::Stdout)
        .all(|e| e.tag == "talker"));
    assert!(entries
        .iter()
        .filter(|e| e.stream == StreamType::Stderr)
        .all(|e| e.tag == "talker-ERROR"));
    assert!(sink.tagged_lines().contains(&"talker-ERROR > err-1".to_string()));

    let reports = supervisor.gobbler_reports();
    assert!(reports.iter().all(|r| r.completed && r.error.is_none()));
    let stdout_report = reports
        .iter()
        .find(|r| r.stream == StreamType::Stdout)
        .unwrap();
    assert_eq!(stdout_report.lines_read, stdout.len() as u64);
}

#[tokio::test]
async fn test_output_file() {
    let fixture = WorkerFixture::new("scribe", modes::CHATTY).with_property(LINES_PROPERTY, 3);
    let log_path = fixture.dir.path().join("scribe.log");
    let mut options = fast_options();
    options.output_file = Some(log_path.clone());

    let mut supervisor = ProcessSupervisor::launch(&fixture.config, options)
        .await
        .expect("launch should succeed");
    wait_until_ready(&supervisor, Duration::from_secs(10))
        .await
        .expect("worker should become ready");
    supervisor.stop().await.expect("stop should succeed");

    let contents = std::fs::read_to_string(&log_path).unwrap();
    assert!(contents.contains("scribe > line-3"));
    assert!(contents.contains("scribe-ERROR > err-3"));
}
