//! Error types for the Storage Disruption Operator
//!
//! Provides a single error type for the reconciliation core, the store
//! adapters and the command execution layer, together with the requeue
//! policy the controller applies to each failure.

use std::time::Duration;
use thiserror::Error;

use crate::exec::{exit_status, CommandError, ExitOutcome};

/// Retry delay for command failures whose exit status could not be recovered
pub const UNCLEAR_COMMAND_RETRY: Duration = Duration::from_secs(30);

/// Unified error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Kubernetes / Store Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Resource already exists: {kind}/{name}")]
    ResourceExists { kind: String, name: String },

    #[error("Store operation {operation} timed out after {timeout:?}")]
    StoreTimeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Invalid resource {kind}/{name}: {reason}")]
    InvalidResource {
        kind: String,
        name: String,
        reason: String,
    },

    // =========================================================================
    // External Command Errors
    // =========================================================================
    #[error("External command failed: {0}")]
    Command(#[from] CommandError),

    // =========================================================================
    // Metrics Errors
    // =========================================================================
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML encode error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action to take on error during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Store failures are the scheduler's to retry
            Error::Kube(_) | Error::StoreTimeout { .. } => ErrorAction::RequeueWithBackoff,

            Error::Command(err) => match exit_status(err) {
                outcome if outcome.is_transient() => ErrorAction::RequeueWithBackoff,
                // Timed out or killed; retry at a steady pace
                ExitOutcome::Unknown => ErrorAction::RequeueAfter(UNCLEAR_COMMAND_RETRY),
                // The tool rejected the request; wait for the cluster to change
                ExitOutcome::Known(_) => ErrorAction::NoRequeue,
            },

            // Lost a create race; the next pass re-reads and converges
            Error::ResourceExists { .. } => ErrorAction::RequeueAfter(Duration::from_secs(1)),

            // Nothing changes until the resource itself is edited
            Error::Configuration(_) | Error::InvalidResource { .. } => ErrorAction::NoRequeue,

            // All other errors - retry with backoff
            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is transient (timeout, conflict, connectivity)
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Kube(kube::Error::Api(response)) => {
                matches!(response.code, 409 | 429 | 500..=599)
            }
            Error::Kube(_) | Error::StoreTimeout { .. } => true,
            Error::Command(err) => exit_status(err).is_transient(),
            _ => false,
        }
    }

    /// Check whether this error reports a missing object
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(response)) if response.code == 404)
    }
}

/// Result type alias for the operator
pub type Result<T> = std::result::Result<T, Error>;
