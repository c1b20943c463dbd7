//! External command execution
//!
//! Runs storage tooling as subprocesses and classifies their failures into
//! exit statuses so callers can decide whether a failure is worth retrying.

pub mod error;
pub mod executor;

pub use error::{exit_status, CommandError, ExitOutcome};
pub use executor::{CommandExecutor, CommandOutput};
