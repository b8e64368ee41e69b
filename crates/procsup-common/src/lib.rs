//! # procsup common
//!
//! Error taxonomy and identity types shared by every procsup crate.
//!
//! Every fatal condition raised by the supervisor carries the logical process
//! name and the operation that failed, so a failed launch can be root-caused
//! from the message alone.

pub mod errors;
pub mod types;

// Re-export commonly used items
pub use errors::{ProcessError, ProcessResult, StreamReadError};
pub use types::{ProcessName, NAME_PROPERTY, PORT_PROPERTY};
