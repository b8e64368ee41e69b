//! Stream gobbler: drains one worker output stream into a line sink.
//!
//! The reader task owns the stream. It ends on end-of-file, on a read error
//! (captured, never thrown across the task boundary) or when the gobbler is
//! closed, and the stream is dropped on every one of those paths.

use crate::output::LineSink;
use crate::types::{LogEntry, StreamType};
use chrono::Utc;
use parking_lot::Mutex;
use procsup_common::StreamReadError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Outcome of a gobbler once its task is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GobblerReport {
    pub tag: String,
    pub stream: StreamType,
    pub lines_read: u64,
    pub error: Option<StreamReadError>,
    /// False when the task had to be force-closed or did not finish cleanly.
    pub completed: bool,
}

#[derive(Debug, Default)]
struct GobblerState {
    lines_read: AtomicU64,
    finished: AtomicBool,
    error: Mutex<Option<StreamReadError>>,
}

/// Drains one stream of a worker process.
pub struct StreamGobbler {
    tag: String,
    stream_type: StreamType,
    state: Arc<GobblerState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    completed: bool,
}

impl std::fmt::Debug for StreamGobbler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamGobbler")
            .field("tag", &self.tag)
            .field("stream", &self.stream_type)
            .field("lines_read", &self.lines_read())
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl StreamGobbler {
    /// Starts draining `stream` immediately.
    ///
    /// `cancel` is the owner's token; the gobbler derives a child token so
    /// it can be closed on its own without affecting siblings.
    pub fn start<R>(
        stream: R,
        tag: impl Into<String>,
        stream_type: StreamType,
        sink: Arc<dyn LineSink>,
        cancel: &CancellationToken,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let tag = tag.into();
        let state = Arc::new(GobblerState::default());
        let cancel = cancel.child_token();

        let task = tokio::spawn(Self::drain(
            stream,
            tag.clone(),
            stream_type,
            sink,
            Arc::clone(&state),
            cancel.clone(),
        ));

        debug!("Gobbler started for {} ({})", tag, stream_type);

        Self {
            tag,
            stream_type,
            state,
            cancel,
            task: Some(task),
            completed: true,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    pub fn lines_read(&self) -> u64 {
        self.state.lines_read.load(Ordering::SeqCst)
    }

    /// Read error captured by the task, if any.
    pub fn error(&self) -> Option<StreamReadError> {
        self.state.error.lock().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.state.finished.load(Ordering::SeqCst)
    }

    /// Forcibly closes the stream. The task drops the stream and ends at its
    /// next suspension point.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Waits for the task to end.
    ///
    /// A panicked or aborted task is logged, not propagated.
    pub async fn join(&mut self) -> GobblerReport {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Error while waiting for gobbler {} to finish: {}", self.tag, e);
                self.completed = false;
            }
        }
        self.report()
    }

    /// Waits up to `timeout`; on expiry the stream is force-closed and the
    /// task awaited once more.
    pub async fn join_timeout(&mut self, timeout: Duration) -> GobblerReport {
        let Some(mut task) = self.task.take() else {
            return self.report();
        };

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Error while waiting for gobbler {} to finish: {}", self.tag, e);
                self.completed = false;
            }
            Err(_) => {
                warn!(
                    "Gobbler {} still draining after {:?}, closing stream",
                    self.tag, timeout
                );
                self.completed = false;
                self.close();
                if let Err(e) = task.await {
                    error!("Error while waiting for gobbler {} to close: {}", self.tag, e);
                }
            }
        }
        self.report()
    }

    fn report(&self) -> GobblerReport {
        GobblerReport {
            tag: self.tag.clone(),
            stream: self.stream_type,
            lines_read: self.lines_read(),
            error: self.error(),
            completed: self.completed,
        }
    }

    async fn drain<R>(
        stream: R,
        tag: String,
        stream_type: StreamType,
        sink: Arc<dyn LineSink>,
        state: Arc<GobblerState>,
        cancel: CancellationToken,
    ) where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::with_capacity(256);

        loop {
            buf.clear();
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Gobbler {} closed", tag);
                    break;
                }
                result = reader.read_until(b'\n', &mut buf) => {
                    match result {
                        Ok(0) => {
                            debug!("Gobbler {} reached end of stream", tag);
                            break;
                        }
                        Ok(_) => {
                            let line_num = state.lines_read.fetch_add(1, Ordering::SeqCst) + 1;
                            let entry = LogEntry {
                                timestamp: Utc::now(),
                                tag: tag.clone(),
                                stream: stream_type,
                                line_num,
                                line: decode_line(&buf),
                            };
                            if let Err(e) = sink.write(&entry) {
                                warn!("Gobbler {} failed to write line {}: {}", tag, line_num, e);
                            }
                        }
                        Err(e) => {
                            error!("Gobbler {} failed reading {}: {}", tag, stream_type, e);
                            *state.error.lock() = Some(StreamReadError::from_io(&e));
                            break;
                        }
                    }
                }
            }
        }

        if let Err(e) = sink.flush() {
            warn!("Gobbler {} failed to flush sink: {}", tag, e);
        }
        state.finished.store(true, Ordering::SeqCst);
        debug!(
            "Gobbler {} finished after {} lines",
            tag,
            state.lines_read.load(Ordering::SeqCst)
        );
        // `reader`, and with it the stream, is dropped here
    }
}

impl Drop for StreamGobbler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Strips the line terminator; invalid UTF-8 is replaced, not fatal.
fn decode_line(buf: &[u8]) -> String {
    let mut end = buf.len();
    if end > 0 && buf[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && buf[end - 1] == b'\r' {
            end -= 1;
        }
    }
    String::from_utf8_lossy(&buf[..end]).into_owned()
}
