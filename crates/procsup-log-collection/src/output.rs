//! Sinks for tagged worker output.
//!
//! A sink is shared by both gobblers of a worker, so implementations take
//! `&self` and keep their own locking.

use crate::types::{LogEntry, StreamType};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Destination for lines read from worker streams.
pub trait LineSink: Send + Sync {
    fn write(&self, entry: &LogEntry) -> std::io::Result<()>;

    fn flush(&self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Default sink: every line becomes an `info` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLineSink;

impl LineSink for TracingLineSink {
    fn write(&self, entry: &LogEntry) -> std::io::Result<()> {
        info!(target: "procsup::worker", "{}", entry.tagged());
        Ok(())
    }
}

/// Keeps the last `capacity` lines in memory.
#[derive(Debug, Clone)]
pub struct MemoryLineSink {
    buffer: Arc<Mutex<VecDeque<LogEntry>>>,
    capacity: usize,
}

impl MemoryLineSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.buffer.lock().iter().cloned().collect()
    }

    /// Raw lines of one stream, in the order they were read.
    pub fn lines(&self, stream: StreamType) -> Vec<String> {
        self.buffer
            .lock()
            .iter()
            .filter(|e| e.stream == stream)
            .map(|e| e.line.clone())
            .collect()
    }

    /// Lines in sink format (`<tag> > <line>`).
    pub fn tagged_lines(&self) -> Vec<String> {
        self.buffer.lock().iter().map(LogEntry::tagged).collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }
}

impl LineSink for MemoryLineSink {
    fn write(&self, entry: &LogEntry) -> std::io::Result<()> {
        let mut buffer = self.buffer.lock();
        buffer.push_back(entry.clone());
        while buffer.len() > self.capacity {
            buffer.pop_front();
        }
        Ok(())
    }
}

/// Appends `[timestamp] <tag> > <line>` records to a file.
pub struct FileLineSink {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl FileLineSink {
    /// Opens (creating parent directories) `path` for appending.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LineSink for FileLineSink {
    fn write(&self, entry: &LogEntry) -> std::io::Result<()> {
        let mut writer = self.writer.lock();
        writeln!(
            writer,
            "[{}] {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            entry.tagged()
        )
    }

    fn flush(&self) -> std::io::Result<()> {
        self.writer.lock().flush()
    }
}

/// Writes every line to all inner sinks; the first error is returned after
/// all sinks have been tried.
#[derive(Default)]
pub struct FanoutLineSink {
    sinks: Vec<Arc<dyn LineSink>>,
}

impl FanoutLineSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn LineSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl LineSink for FanoutLineSink {
    fn write(&self, entry: &LogEntry) -> std::io::Result<()> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.write(entry) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn flush(&self) -> std::io::Result<()> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.flush() {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
