//! Namespace to cluster identity map
//!
//! At most one StorageCluster lives in a namespace, so reconcile requests
//! that only know a namespace resolve the cluster name here.

use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Shared namespace -> cluster name registry
#[derive(Debug, Default)]
pub struct ClusterMap {
    clusters: RwLock<HashMap<String, String>>,
}

impl ClusterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the cluster for a namespace, replacing any previous mapping
    pub fn update(&self, namespace: &str, name: &str) {
        let previous = self
            .clusters
            .write()
            .insert(namespace.to_string(), name.to_string());

        if previous.as_deref() != Some(name) {
            debug!(namespace, cluster = name, ?previous, "cluster map updated");
        }
    }

    /// Forget the cluster for a namespace
    pub fn remove(&self, namespace: &str) {
        if let Some(name) = self.clusters.write().remove(namespace) {
            debug!(namespace, cluster = %name, "cluster map entry removed");
        }
    }

    /// Forget the mapping only if it still names `name`
    pub fn remove_if(&self, namespace: &str, name: &str) -> bool {
        let mut clusters = self.clusters.write();
        if clusters.get(namespace).map(String::as_str) == Some(name) {
            clusters.remove(namespace);
            debug!(namespace, cluster = name, "cluster map entry removed");
            true
        } else {
            false
        }
    }

    /// Cluster name for a namespace
    pub fn get(&self, namespace: &str) -> Option<String> {
        self.clusters.read().get(namespace).cloned()
    }

    pub fn len(&self) -> usize {
        self.clusters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.read().is_empty()
    }
}
