//! Domain Ports - Core types and trait definitions for the disruption controller
//!
//! These traits define the boundaries between the reconciliation core and the
//! external resource store. Adapters implement these traits to provide
//! concrete functionality (Kubernetes API, in-memory store for tests).

use crate::crd::{StorageCluster, StorageFilesystem, StorageObjectStore, StoragePool};
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Cluster / Budget Types
// =============================================================================

/// A storage cluster's identity and declared monitor count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterReference {
    pub namespace: String,
    pub name: String,
    /// Declared monitor replicas; 0 means not yet known
    pub quorum_size: u32,
}

/// A pod disruption budget as seen by the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisruptionBudget {
    pub namespace: String,
    pub name: String,
    /// Minimum available pods. Non-integer values read as 0.
    pub min_available: i32,
    /// Label selector matching the protected pods
    pub selector: BTreeMap<String, String>,
    /// Opaque store version used for optimistic concurrency
    pub resource_version: Option<String>,
}

// =============================================================================
// Reconcile Requests
// =============================================================================

/// A unit of work naming a namespace to re-evaluate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReconcileRequest {
    pub namespace: String,
    /// Cluster name; empty until resolved by the reconciler
    pub name: String,
}

impl ReconcileRequest {
    /// Request scoped to a namespace, name resolved later
    pub fn for_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: String::new(),
        }
    }
}

impl std::fmt::Display for ReconcileRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// =============================================================================
// Watch Events
// =============================================================================

/// Resource kinds the controller subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Cluster,
    Deployment,
    Pool,
    Filesystem,
    ObjectStore,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Cluster,
        ResourceKind::Deployment,
        ResourceKind::Pool,
        ResourceKind::Filesystem,
        ResourceKind::ObjectStore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Cluster => "StorageCluster",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Pool => "StoragePool",
            ResourceKind::Filesystem => "StorageFilesystem",
            ResourceKind::ObjectStore => "StorageObjectStore",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to the watched object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventVerb {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for EventVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventVerb::Create => write!(f, "create"),
            EventVerb::Update => write!(f, "update"),
            EventVerb::Delete => write!(f, "delete"),
        }
    }
}

/// Typed payload of a watch event
#[derive(Debug, Clone)]
pub enum WatchedObject {
    Cluster(StorageCluster),
    Deployment(Deployment),
    Pool(StoragePool),
    Filesystem(StorageFilesystem),
    ObjectStore(StorageObjectStore),
}

impl WatchedObject {
    pub fn kind(&self) -> ResourceKind {
        match self {
            WatchedObject::Cluster(_) => ResourceKind::Cluster,
            WatchedObject::Deployment(_) => ResourceKind::Deployment,
            WatchedObject::Pool(_) => ResourceKind::Pool,
            WatchedObject::Filesystem(_) => ResourceKind::Filesystem,
            WatchedObject::ObjectStore(_) => ResourceKind::ObjectStore,
        }
    }

    pub fn namespace(&self) -> Option<String> {
        match self {
            WatchedObject::Cluster(o) => o.namespace(),
            WatchedObject::Deployment(o) => o.namespace(),
            WatchedObject::Pool(o) => o.namespace(),
            WatchedObject::Filesystem(o) => o.namespace(),
            WatchedObject::ObjectStore(o) => o.namespace(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            WatchedObject::Cluster(o) => o.name_any(),
            WatchedObject::Deployment(o) => o.name_any(),
            WatchedObject::Pool(o) => o.name_any(),
            WatchedObject::Filesystem(o) => o.name_any(),
            WatchedObject::ObjectStore(o) => o.name_any(),
        }
    }
}

/// A change observed on one subscription
#[derive(Debug, Clone)]
pub struct WatchEvent {
    /// The stream this event arrived on
    pub kind: ResourceKind,
    pub verb: EventVerb,
    /// Previous state for updates (and deletes, when known)
    pub old: Option<WatchedObject>,
    /// Current state; the last known state for deletes
    pub new: WatchedObject,
}

impl WatchEvent {
    pub fn created(new: WatchedObject) -> Self {
        Self {
            kind: new.kind(),
            verb: EventVerb::Create,
            old: None,
            new,
        }
    }

    pub fn updated(old: WatchedObject, new: WatchedObject) -> Self {
        Self {
            kind: new.kind(),
            verb: EventVerb::Update,
            old: Some(old),
            new,
        }
    }

    pub fn deleted(last: WatchedObject) -> Self {
        Self {
            kind: last.kind(),
            verb: EventVerb::Delete,
            old: None,
            new: last,
        }
    }
}

/// Stream of events from one subscription
pub type EventStream = BoxStream<'static, WatchEvent>;

// =============================================================================
// Watch Source Port
// =============================================================================

/// Subscription capability over the watched resource kinds
pub trait WatchSource: Send + Sync {
    /// Subscribe to changes of one resource kind
    fn subscribe(&self, kind: ResourceKind) -> EventStream;
}

// =============================================================================
// Resource Store Port
// =============================================================================

/// Port for reading clusters and managing disruption budgets
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Get a cluster by namespace and name, `None` if absent
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<ClusterReference>>;

    /// List clusters in a namespace
    async fn list_clusters(&self, namespace: &str) -> Result<Vec<ClusterReference>>;

    /// Get a disruption budget by namespace and name, `None` if absent
    async fn get_budget(&self, namespace: &str, name: &str) -> Result<Option<DisruptionBudget>>;

    /// Create a disruption budget
    async fn create_budget(&self, budget: &DisruptionBudget) -> Result<DisruptionBudget>;

    /// Update an existing budget's minimum available count
    async fn update_budget(&self, budget: &DisruptionBudget) -> Result<DisruptionBudget>;
}
