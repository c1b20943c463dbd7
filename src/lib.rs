//! Storage Disruption Operator
//!
//! Keeps the monitor PodDisruptionBudget of every storage cluster consistent
//! with the cluster's declared monitor quorum, so voluntary disruptions can
//! never take the monitors below a majority.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         Watch Sources                                │
//! │  StorageCluster │ OSD Deployment │ Pool │ Filesystem │ ObjectStore   │
//! └────────────────────────────────┬─────────────────────────────────────┘
//!                                  │ WatchEvent
//!                      ┌───────────┴───────────┐
//!                      │      EventRouter      │──── ClusterMap
//!                      └───────────┬───────────┘    (namespace -> cluster)
//!                                  │ ReconcileRequest
//!                      ┌───────────┴───────────┐
//!                      │  Work queue / workers │
//!                      └───────────┬───────────┘
//!                                  │
//!                      ┌───────────┴───────────┐
//!                      │      Reconciler       │
//!                      │  PdbLifecycleManager  │──── QuorumValidator
//!                      └───────────┬───────────┘
//!                                  │ create / update
//!                      ┌───────────┴───────────┐
//!                      │     ResourceStore     │
//!                      └───────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`crd`]: Custom Resource Definitions
//! - [`disruption`]: Event routing, quorum validation and budget reconciliation
//! - [`domain`]: Core domain types and ports
//! - [`exec`]: External command execution and exit status classification
//! - [`store`]: Kubernetes and in-memory adapters for the ports
//! - [`metrics`]: Prometheus counters
//! - [`error`]: Error types and handling

pub mod crd;
pub mod disruption;
pub mod domain;
pub mod error;
pub mod exec;
pub mod metrics;
pub mod store;

// Re-export commonly used types
pub use crd::{
    MonSpec, StorageCluster, StorageClusterSpec, StorageClusterStatus, StorageFilesystem,
    StorageObjectStore, StoragePool,
};

pub use disruption::{
    BudgetOutcome, ClusterMap, Consistency, ControllerConfig, DisruptionController,
    EventRouter, PdbLifecycleManager, QuorumValidator, ReconcileOutcome, Reconciler,
};

pub use domain::ports::{
    ClusterReference, DisruptionBudget, ReconcileRequest, ResourceKind, ResourceStore,
    WatchEvent, WatchSource, WatchedObject,
};

pub use error::{Error, ErrorAction, Result};

pub use exec::{exit_status, CommandError, CommandExecutor, ExitOutcome};

pub use metrics::Metrics;

pub use store::{InMemoryStore, KubeResourceStore, KubeWatchSource};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
