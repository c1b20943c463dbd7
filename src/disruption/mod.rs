//! Disruption budget control loop
//!
//! Keeps the monitor PodDisruptionBudget of each storage cluster in line with
//! its declared quorum size:
//! - `router`: watch event filtering into namespace-scoped requests
//! - `cluster_map`: namespace -> cluster identity
//! - `quorum`: majority threshold and consistency checks
//! - `budget`: create/update of the monitor budget
//! - `reconciler`: one level-triggered pass per request
//! - `queue` / `controller`: dispatch, serialization and requeueing

pub mod budget;
pub mod cluster_map;
pub mod controller;
pub mod queue;
pub mod quorum;
pub mod reconciler;
pub mod router;

pub use budget::{BudgetOutcome, PdbLifecycleManager};
pub use cluster_map::ClusterMap;
pub use controller::{ControllerConfig, DisruptionController};
pub use queue::WorkQueue;
pub use quorum::{is_consistent, threshold, Consistency, QuorumValidator};
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use router::EventRouter;
