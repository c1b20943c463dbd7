//! StorageCluster CRD
//!
//! Declares a storage cluster and the size of its monitor quorum. One
//! StorageCluster is allowed per namespace.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::ports::ClusterReference;

// =============================================================================
// StorageCluster CRD
// =============================================================================

/// StorageCluster describes a storage cluster's monitors, daemons and placement.
#[derive(CustomResource, Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "storage.billyronks.io",
    version = "v1",
    kind = "StorageCluster",
    plural = "storageclusters",
    shortname = "stc",
    status = "StorageClusterStatus",
    printcolumn = r#"{"name": "Mons", "type": "integer", "jsonPath": ".spec.mon.count"}"#,
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct StorageClusterSpec {
    /// Monitor quorum settings
    #[serde(default)]
    pub mon: MonSpec,

    /// Which nodes and devices the storage daemons consume
    #[serde(default)]
    pub storage: StorageSelection,

    /// Host path for daemon configuration and state
    #[serde(default)]
    pub data_dir_host_path: String,

    /// Node selector applied to every daemon
    #[serde(default)]
    pub placement: BTreeMap<String, String>,
}

// =============================================================================
// Sub-Types
// =============================================================================

/// Monitor settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonSpec {
    /// Number of monitor replicas. Zero until the cluster is configured.
    #[serde(default)]
    pub count: u32,

    /// Allow more than one monitor on the same node
    #[serde(default)]
    pub allow_multiple_per_node: bool,
}

/// Storage daemon device selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageSelection {
    #[serde(default)]
    pub use_all_nodes: bool,

    #[serde(default)]
    pub use_all_devices: bool,

    /// Regex matched against device names
    #[serde(default)]
    pub device_filter: Option<String>,
}

/// StorageCluster phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ClusterPhase {
    #[default]
    Creating,
    Ready,
    Updating,
    Error,
}

impl std::fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterPhase::Creating => write!(f, "Creating"),
            ClusterPhase::Ready => write!(f, "Ready"),
            ClusterPhase::Updating => write!(f, "Updating"),
            ClusterPhase::Error => write!(f, "Error"),
        }
    }
}

/// Observed state, written by the cluster operator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageClusterStatus {
    #[serde(default)]
    pub phase: ClusterPhase,

    #[serde(default)]
    pub message: Option<String>,

    /// Monitors currently in quorum
    #[serde(default)]
    pub mons_in_quorum: u32,
}

impl StorageCluster {
    /// Declared monitor replica count (0 = not yet known)
    pub fn quorum_size(&self) -> u32 {
        self.spec.mon.count
    }

    /// Identity and quorum size as seen by the disruption core
    pub fn to_reference(&self) -> ClusterReference {
        ClusterReference {
            namespace: self.namespace().unwrap_or_default(),
            name: self.name_any(),
            quorum_size: self.quorum_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_defaults_from_empty_object() {
        let spec: StorageClusterSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(spec.mon.count, 0);
        assert!(!spec.storage.use_all_nodes);
    }

    #[test]
    fn test_spec_camel_case() {
        let spec: StorageClusterSpec =
            serde_json::from_str(r#"{"mon": {"count": 3, "allowMultiplePerNode": true}, "dataDirHostPath": "/var/lib/storage"}"#)
                .unwrap();
        assert_eq!(spec.mon.count, 3);
        assert!(spec.mon.allow_multiple_per_node);
        assert_eq!(spec.data_dir_host_path, "/var/lib/storage");
    }

    #[test]
    fn test_to_reference() {
        let mut cluster = StorageCluster::new(
            "storage",
            StorageClusterSpec {
                mon: MonSpec {
                    count: 5,
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        cluster.metadata.namespace = Some("storage-system".into());

        let reference = cluster.to_reference();
        assert_eq!(reference.namespace, "storage-system");
        assert_eq!(reference.name, "storage");
        assert_eq!(reference.quorum_size, 5);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(format!("{}", ClusterPhase::Ready), "Ready");
    }
}
