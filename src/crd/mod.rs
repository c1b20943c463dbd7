//! Custom Resource Definitions watched by the disruption controller
//!
//! This module contains all CRD types:
//! - StorageCluster: cluster declaration carrying the monitor quorum size
//! - StoragePool, StorageFilesystem, StorageObjectStore: storage topology

pub mod storage_cluster;
pub mod topology;

pub use storage_cluster::*;
pub use topology::*;

use kube::CustomResourceExt;

/// Render every CRD as a multi-document YAML stream
pub fn crds_yaml() -> crate::error::Result<String> {
    let crds = [
        StorageCluster::crd(),
        StoragePool::crd(),
        StorageFilesystem::crd(),
        StorageObjectStore::crd(),
    ];

    let mut out = String::new();
    for crd in &crds {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(crd)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crds_yaml() {
        let yaml = crds_yaml().unwrap();
        assert_eq!(yaml.matches("---\n").count(), 4);
        assert!(yaml.contains("storageclusters.storage.billyronks.io"));
        assert!(yaml.contains("storageobjectstores.storage.billyronks.io"));
    }
}
