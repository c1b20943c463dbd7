//! Storage topology CRDs
//!
//! Pools, filesystems and object stores living alongside a StorageCluster.
//! The disruption controller only cares that they exist, not what they hold.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// StoragePool CRD
// =============================================================================

/// A replicated or erasure-coded pool
#[derive(CustomResource, Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "storage.billyronks.io",
    version = "v1",
    kind = "StoragePool",
    plural = "storagepools",
    shortname = "spool",
    printcolumn = r#"{"name": "FailureDomain", "type": "string", "jsonPath": ".spec.failureDomain"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct StoragePoolSpec {
    /// Failure domain replicas are spread across (host, rack, zone)
    #[serde(default = "default_failure_domain")]
    pub failure_domain: String,

    #[serde(default)]
    pub replicated: ReplicatedSpec,

    #[serde(default)]
    pub erasure_coded: Option<ErasureCodedSpec>,
}

/// Replication settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplicatedSpec {
    #[serde(default)]
    pub size: u32,
}

/// Erasure coding settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErasureCodedSpec {
    pub data_chunks: u32,
    pub coding_chunks: u32,
}

fn default_failure_domain() -> String {
    "host".to_string()
}

// =============================================================================
// StorageFilesystem CRD
// =============================================================================

/// A shared filesystem with its own metadata and data pools
#[derive(CustomResource, Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "storage.billyronks.io",
    version = "v1",
    kind = "StorageFilesystem",
    plural = "storagefilesystems",
    shortname = "sfs",
    printcolumn = r#"{"name": "ActiveMDS", "type": "integer", "jsonPath": ".spec.activeMetadataServers"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct StorageFilesystemSpec {
    #[serde(default)]
    pub metadata_pool: ReplicatedSpec,

    #[serde(default)]
    pub data_pools: Vec<ReplicatedSpec>,

    #[serde(default = "default_active_metadata_servers")]
    pub active_metadata_servers: u32,
}

fn default_active_metadata_servers() -> u32 {
    1
}

// =============================================================================
// StorageObjectStore CRD
// =============================================================================

/// An S3-compatible object store gateway
#[derive(CustomResource, Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "storage.billyronks.io",
    version = "v1",
    kind = "StorageObjectStore",
    plural = "storageobjectstores",
    shortname = "sos",
    printcolumn = r#"{"name": "Gateways", "type": "integer", "jsonPath": ".spec.gateway.instances"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct StorageObjectStoreSpec {
    #[serde(default)]
    pub gateway: GatewaySpec,

    #[serde(default)]
    pub data_pool: ReplicatedSpec,
}

/// Object gateway deployment settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    #[serde(default)]
    pub instances: u32,

    #[serde(default)]
    pub port: u16,
}
