//! Reconciliation pass
//!
//! Resolves the cluster behind a namespace-scoped request, re-reads its
//! authoritative spec and converges the monitor budget. Nothing from the
//! triggering event is trusted beyond the namespace.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::budget::{BudgetOutcome, PdbLifecycleManager};
use super::cluster_map::ClusterMap;
use crate::domain::ports::{ClusterReference, ReconcileRequest, ResourceStore};
use crate::error::Result;

/// Result of one reconcile pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No cluster exists in the namespace
    NoCluster,
    Budget(BudgetOutcome),
}

/// Level-triggered reconciler for monitor disruption budgets
pub struct Reconciler {
    store: Arc<dyn ResourceStore>,
    cluster_map: Arc<ClusterMap>,
    budgets: PdbLifecycleManager,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        cluster_map: Arc<ClusterMap>,
        budgets: PdbLifecycleManager,
    ) -> Self {
        Self {
            store,
            cluster_map,
            budgets,
        }
    }

    #[instrument(skip(self), fields(namespace = %request.namespace))]
    pub async fn reconcile(&self, request: &ReconcileRequest) -> Result<ReconcileOutcome> {
        let Some(cluster) = self.resolve(request).await? else {
            info!("no storage cluster in namespace, nothing to reconcile");
            return Ok(ReconcileOutcome::NoCluster);
        };

        debug!(
            cluster = %cluster.name,
            quorum_size = cluster.quorum_size,
            "reconciling monitor disruption budget"
        );
        let outcome = self.budgets.ensure(&cluster).await?;
        Ok(ReconcileOutcome::Budget(outcome))
    }

    /// Find the namespace's cluster, keeping the cluster map current
    async fn resolve(&self, request: &ReconcileRequest) -> Result<Option<ClusterReference>> {
        let namespace = request.namespace.as_str();

        let known = if request.name.is_empty() {
            self.cluster_map.get(namespace)
        } else {
            Some(request.name.clone())
        };

        if let Some(name) = known {
            if let Some(cluster) = self.store.get_cluster(namespace, &name).await? {
                self.cluster_map.update(namespace, &cluster.name);
                return Ok(Some(cluster));
            }
            debug!(cluster = %name, "mapped cluster no longer exists");
            self.cluster_map.remove_if(namespace, &name);
        }

        let mut clusters = self.store.list_clusters(namespace).await?;
        if clusters.len() > 1 {
            clusters.sort_by(|a, b| a.name.cmp(&b.name));
            warn!(
                count = clusters.len(),
                "more than one storage cluster in namespace, using the first by name"
            );
        }

        match clusters.into_iter().next() {
            Some(cluster) => {
                self.cluster_map.update(namespace, &cluster.name);
                Ok(Some(cluster))
            }
            None => {
                self.cluster_map.remove(namespace);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruption::quorum::QuorumValidator;
    use crate::domain::ports::DisruptionBudget;
    use crate::store::InMemoryStore;
    use std::collections::BTreeMap;

    fn cluster(name: &str, quorum_size: u32) -> ClusterReference {
        ClusterReference {
            namespace: "storage".into(),
            name: name.into(),
            quorum_size,
        }
    }

    fn setup() -> (Reconciler, Arc<InMemoryStore>, Arc<ClusterMap>) {
        let store = Arc::new(InMemoryStore::new());
        let map = Arc::new(ClusterMap::new());
        let budgets = PdbLifecycleManager::new(
            store.clone(),
            QuorumValidator::new("mon-pdb"),
            BTreeMap::from([("app".to_string(), "storage-mon".to_string())]),
        );
        let reconciler = Reconciler::new(store.clone(), map.clone(), budgets);
        (reconciler, store, map)
    }

    fn budget(min_available: i32) -> DisruptionBudget {
        DisruptionBudget {
            namespace: "storage".into(),
            name: "mon-pdb".into(),
            min_available,
            selector: BTreeMap::new(),
            resource_version: None,
        }
    }

    #[tokio::test]
    async fn test_end_to_end_create() {
        let (reconciler, store, map) = setup();
        store.put_cluster(cluster("storage", 3));

        let outcome = reconciler
            .reconcile(&ReconcileRequest::for_namespace("storage"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Budget(BudgetOutcome::Created { min_available: 2 })
        );
        assert_eq!(store.create_calls(), 1);
        assert_eq!(store.update_calls(), 0);
        assert_eq!(map.get("storage").as_deref(), Some("storage"));
    }

    #[tokio::test]
    async fn test_end_to_end_update() {
        let (reconciler, store, _) = setup();
        store.put_cluster(cluster("storage", 3));
        store.put_budget(budget(1));

        reconciler
            .reconcile(&ReconcileRequest::for_namespace("storage"))
            .await
            .unwrap();

        assert_eq!(store.create_calls(), 0);
        assert_eq!(store.update_calls(), 1);
        assert_eq!(store.budget("storage", "mon-pdb").unwrap().min_available, 2);
    }

    #[tokio::test]
    async fn test_end_to_end_noop() {
        let (reconciler, store, _) = setup();
        store.put_cluster(cluster("storage", 3));
        store.put_budget(budget(2));

        let outcome = reconciler
            .reconcile(&ReconcileRequest::for_namespace("storage"))
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Budget(BudgetOutcome::Unchanged));
        assert_eq!(store.create_calls() + store.update_calls(), 0);
    }

    #[tokio::test]
    async fn test_no_cluster() {
        let (reconciler, store, map) = setup();
        map.update("storage", "gone");

        let outcome = reconciler
            .reconcile(&ReconcileRequest::for_namespace("storage"))
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::NoCluster);
        assert!(map.is_empty());
        assert_eq!(store.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_reads_authoritative_quorum() {
        let (reconciler, store, map) = setup();
        // The map knows the name, the store knows the current quorum size
        map.update("storage", "storage");
        store.put_cluster(cluster("storage", 5));

        reconciler
            .reconcile(&ReconcileRequest::for_namespace("storage"))
            .await
            .unwrap();
        assert_eq!(store.budget("storage", "mon-pdb").unwrap().min_available, 3);
    }

    #[tokio::test]
    async fn test_stale_mapping_falls_back_to_listing() {
        let (reconciler, store, map) = setup();
        map.update("storage", "old");
        store.put_cluster(cluster("new", 3));

        reconciler
            .reconcile(&ReconcileRequest::for_namespace("storage"))
            .await
            .unwrap();
        assert_eq!(map.get("storage").as_deref(), Some("new"));
        assert_eq!(store.create_calls(), 1);
    }
}
