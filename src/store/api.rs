//! Kubernetes-backed resource store
//!
//! Reads StorageClusters and manages `policy/v1` PodDisruptionBudgets through
//! the API server. Every call is bounded by the configured timeout.

use async_trait::async_trait;
use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::crd::StorageCluster;
use crate::domain::ports::{ClusterReference, DisruptionBudget, ResourceStore};
use crate::error::{Error, Result};

/// Field manager / managed-by value for objects this operator writes
pub const MANAGER: &str = "storage-disruption-operator";

const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Resource store talking to the Kubernetes API
#[derive(Clone)]
pub struct KubeResourceStore {
    client: Client,
    timeout: Duration,
}

impl KubeResourceStore {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::StoreTimeout {
                operation,
                timeout: self.timeout,
            }),
        }
    }

    fn budgets(&self, namespace: &str) -> Api<PodDisruptionBudget> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn clusters(&self, namespace: &str) -> Api<StorageCluster> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ResourceStore for KubeResourceStore {
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<ClusterReference>> {
        let api = self.clusters(namespace);
        let cluster = self.bounded("get_cluster", api.get_opt(name)).await?;
        Ok(cluster.map(|c| c.to_reference()))
    }

    async fn list_clusters(&self, namespace: &str) -> Result<Vec<ClusterReference>> {
        let api = self.clusters(namespace);
        let list = self
            .bounded("list_clusters", api.list(&ListParams::default()))
            .await?;
        Ok(list.items.iter().map(StorageCluster::to_reference).collect())
    }

    async fn get_budget(&self, namespace: &str, name: &str) -> Result<Option<DisruptionBudget>> {
        let api = self.budgets(namespace);
        let pdb = self.bounded("get_budget", api.get_opt(name)).await?;
        Ok(pdb.map(budget_from_pdb))
    }

    async fn create_budget(&self, budget: &DisruptionBudget) -> Result<DisruptionBudget> {
        let api = self.budgets(&budget.namespace);
        let params = PostParams {
            field_manager: Some(MANAGER.to_string()),
            ..Default::default()
        };
        let pdb = pdb_from_budget(budget);

        match self.bounded("create_budget", api.create(&params, &pdb)).await {
            Ok(created) => {
                debug!(namespace = %budget.namespace, name = %budget.name, "created PodDisruptionBudget");
                Ok(budget_from_pdb(created))
            }
            Err(Error::Kube(kube::Error::Api(response))) if response.code == 409 => {
                Err(Error::ResourceExists {
                    kind: "PodDisruptionBudget".into(),
                    name: format!("{}/{}", budget.namespace, budget.name),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn update_budget(&self, budget: &DisruptionBudget) -> Result<DisruptionBudget> {
        let api = self.budgets(&budget.namespace);
        let params = PatchParams {
            field_manager: Some(MANAGER.to_string()),
            ..Default::default()
        };
        // resourceVersion in a merge patch makes the API server reject stale writes
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": budget.resource_version },
            "spec": { "minAvailable": budget.min_available },
        });

        let updated = self
            .bounded("update_budget", api.patch(&budget.name, &params, &Patch::Merge(&patch)))
            .await?;
        debug!(namespace = %budget.namespace, name = %budget.name, "patched PodDisruptionBudget");
        Ok(budget_from_pdb(updated))
    }
}

/// Read a PodDisruptionBudget into the domain type
pub fn budget_from_pdb(pdb: PodDisruptionBudget) -> DisruptionBudget {
    let PodDisruptionBudget { metadata, spec, .. } = pdb;
    let spec = spec.unwrap_or_default();

    let min_available = match spec.min_available {
        Some(IntOrString::Int(value)) => value,
        _ => 0,
    };

    DisruptionBudget {
        namespace: metadata.namespace.unwrap_or_default(),
        name: metadata.name.unwrap_or_default(),
        min_available,
        selector: spec
            .selector
            .and_then(|s| s.match_labels)
            .unwrap_or_default(),
        resource_version: metadata.resource_version,
    }
}

/// Build the PodDisruptionBudget to create for a domain budget
pub fn pdb_from_budget(budget: &DisruptionBudget) -> PodDisruptionBudget {
    PodDisruptionBudget {
        metadata: ObjectMeta {
            name: Some(budget.name.clone()),
            namespace: Some(budget.namespace.clone()),
            labels: Some(BTreeMap::from([(
                MANAGED_BY_LABEL.to_string(),
                MANAGER.to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(PodDisruptionBudgetSpec {
            min_available: Some(IntOrString::Int(budget.min_available)),
            selector: Some(LabelSelector {
                match_labels: Some(budget.selector.clone()),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget() -> DisruptionBudget {
        DisruptionBudget {
            namespace: "storage".into(),
            name: "mon-pdb".into(),
            min_available: 2,
            selector: BTreeMap::from([("app".to_string(), "storage-mon".to_string())]),
            resource_version: None,
        }
    }

    #[test]
    fn test_pdb_from_budget() {
        let pdb = pdb_from_budget(&budget());
        assert_eq!(pdb.metadata.name.as_deref(), Some("mon-pdb"));
        assert_eq!(
            pdb.metadata.labels.unwrap().get(MANAGED_BY_LABEL).map(String::as_str),
            Some(MANAGER)
        );

        let spec = pdb.spec.unwrap();
        assert_eq!(spec.min_available, Some(IntOrString::Int(2)));
        assert!(spec.max_unavailable.is_none());
        assert_eq!(
            spec.selector.unwrap().match_labels.unwrap().get("app").map(String::as_str),
            Some("storage-mon")
        );
    }

    #[test]
    fn test_budget_from_pdb_keeps_version() {
        let mut pdb = pdb_from_budget(&budget());
        pdb.metadata.resource_version = Some("42".into());

        let read = budget_from_pdb(pdb);
        assert_eq!(read.min_available, 2);
        assert_eq!(read.resource_version.as_deref(), Some("42"));
        assert_eq!(read.selector, budget().selector);
    }

    #[test]
    fn test_percentage_min_available_reads_as_zero() {
        let mut pdb = pdb_from_budget(&budget());
        if let Some(spec) = pdb.spec.as_mut() {
            spec.min_available = Some(IntOrString::String("50%".into()));
        }
        assert_eq!(budget_from_pdb(pdb).min_available, 0);

        let empty = PodDisruptionBudget::default();
        let read = budget_from_pdb(empty);
        assert_eq!(read.min_available, 0);
        assert!(read.selector.is_empty());
    }
}
