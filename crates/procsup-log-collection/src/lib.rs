//! # procsup log collection
//!
//! Drains a worker's stdout and stderr so the worker never blocks on a full
//! pipe, and forwards every line, tagged with its stream, to a log sink.
//!
//! - [`StreamGobbler`]: one task per stream, owns the stream exclusively
//! - [`LineSink`]: where tagged lines go (tracing, memory ring, file)

pub mod gobbler;
pub mod output;
pub mod types;

// Re-export main types
pub use gobbler::{GobblerReport, StreamGobbler};
pub use output::{FanoutLineSink, FileLineSink, LineSink, MemoryLineSink, TracingLineSink};
pub use types::{LogEntry, StreamType};
