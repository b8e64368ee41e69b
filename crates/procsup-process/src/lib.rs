//! # procsup process
//!
//! Low-level process plumbing for the supervisor:
//! - Worker launch parameters and command building
//! - Working directory and executable validation
//! - Free management port allocation
//! - Process existence checks
//! - Graceful and forced termination by PID

pub mod check;
pub mod launch;
pub mod port;
pub mod terminate;
pub mod validation;

// Re-export main types
pub use check::*;
pub use launch::{build_command, launch_args, ProcessSpec, WorkerConfig};
pub use port::{EphemeralPortProvider, FixedPortProvider, PortProvider};
pub use terminate::*;
pub use validation::*;
