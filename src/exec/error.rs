//! Command failure shapes and exit status classification

use std::process::ExitStatus;
use thiserror::Error;

/// Failure shapes produced by the command execution layer
#[derive(Error, Debug)]
pub enum CommandError {
    /// The process ran and exited unsuccessfully
    #[error("process exited with {status}: {stderr}")]
    Exited { status: ExitStatus, stderr: String },

    /// A failure that carries an explicit numeric exit code
    #[error("command exited with code {code}")]
    CodedExit { code: i32 },

    /// A storage tool failure wrapping the underlying cause
    #[error("{output}")]
    Tool {
        output: String,
        #[source]
        source: Box<CommandError>,
    },

    /// Raw OS error number, usually from a failed spawn
    #[error("os error {errno}")]
    Os { errno: i32 },

    /// Anything else (timeouts, I/O errors without an errno)
    #[error("{0}")]
    Other(String),
}

impl CommandError {
    /// Wrap this error as a tool failure with captured output
    pub fn wrap(self, output: impl Into<String>) -> Self {
        CommandError::Tool {
            output: output.into(),
            source: Box::new(self),
        }
    }
}

impl From<std::io::Error> for CommandError {
    fn from(err: std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(errno) => CommandError::Os { errno },
            None => CommandError::Other(err.to_string()),
        }
    }
}

// Linux errno values storage tools report for conditions that clear on retry
const EINTR: i32 = 4;
const EAGAIN: i32 = 11;
const EBUSY: i32 = 16;
const ENETUNREACH: i32 = 101;
const ECONNRESET: i32 = 104;
const ETIMEDOUT: i32 = 110;
const ECONNREFUSED: i32 = 111;
const EHOSTUNREACH: i32 = 113;

const TRANSIENT_CODES: [i32; 8] = [
    EINTR,
    EAGAIN,
    EBUSY,
    ENETUNREACH,
    ECONNRESET,
    ETIMEDOUT,
    ECONNREFUSED,
    EHOSTUNREACH,
];

/// Result of exit status classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// A status was recovered from the failure
    Known(i32),
    /// The failure carries no recognizable status
    Unknown,
}

impl ExitOutcome {
    pub fn code(&self) -> Option<i32> {
        match self {
            ExitOutcome::Known(code) => Some(*code),
            ExitOutcome::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, ExitOutcome::Known(_))
    }

    /// Whether the status names a condition that clears on its own
    /// (interrupted call, busy resource, timeout, unreachable peer).
    /// Unknown statuses are never transient.
    pub fn is_transient(&self) -> bool {
        match self {
            ExitOutcome::Known(code) => TRANSIENT_CODES.contains(code),
            ExitOutcome::Unknown => false,
        }
    }
}

/// Extract the exit status carried by a command failure.
///
/// Tool wrappers are unwrapped until a process exit, coded exit or OS error
/// is found. A process killed by a signal has no exit code and yields
/// [`ExitOutcome::Unknown`].
pub fn exit_status(err: &CommandError) -> ExitOutcome {
    let mut current = err;
    loop {
        match current {
            CommandError::Exited { status, .. } => {
                return status.code().map_or(ExitOutcome::Unknown, ExitOutcome::Known);
            }
            CommandError::CodedExit { code } => return ExitOutcome::Known(*code),
            CommandError::Tool { source, .. } => current = source,
            CommandError::Os { errno } => return ExitOutcome::Known(*errno),
            CommandError::Other(_) => return ExitOutcome::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coded_exit() {
        let err = CommandError::CodedExit { code: 13 };
        assert_eq!(exit_status(&err), ExitOutcome::Known(13));
    }

    #[test]
    fn test_coded_exit_wrapped_twice() {
        let err = CommandError::CodedExit { code: 13 }
            .wrap("osd pool stats failed")
            .wrap("failed to gather cluster state");
        let outcome = exit_status(&err);
        assert_eq!(outcome, ExitOutcome::Known(13));
        assert!(outcome.is_known());
    }

    #[test]
    fn test_transient_codes() {
        assert!(ExitOutcome::Known(EAGAIN).is_transient());
        assert!(ExitOutcome::Known(ETIMEDOUT).is_transient());
        assert!(!ExitOutcome::Known(1).is_transient());
        // ENOENT
        assert!(!ExitOutcome::Known(2).is_transient());
        assert!(!ExitOutcome::Unknown.is_transient());
    }

    #[test]
    fn test_os_errno() {
        let err = CommandError::from(std::io::Error::from_raw_os_error(2));
        assert_eq!(exit_status(&err), ExitOutcome::Known(2));
    }

    #[test]
    fn test_unknown() {
        let err = CommandError::Other("timed out".into()).wrap("status");
        let outcome = exit_status(&err);
        assert_eq!(outcome, ExitOutcome::Unknown);
        assert_eq!(outcome.code(), None);

        let err = CommandError::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(exit_status(&err), ExitOutcome::Unknown);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_exit_status() {
        use std::os::unix::process::ExitStatusExt;

        let err = CommandError::Exited {
            status: ExitStatus::from_raw(7 << 8),
            stderr: String::new(),
        };
        assert_eq!(exit_status(&err), ExitOutcome::Known(7));

        // SIGKILL
        let err = CommandError::Exited {
            status: ExitStatus::from_raw(9),
            stderr: String::new(),
        };
        assert_eq!(exit_status(&err), ExitOutcome::Unknown);
    }
}
