//! Monitor disruption budget lifecycle
//!
//! Converges the well-known monitor budget toward the quorum threshold. Every
//! pass re-reads the budget, so create/update/no-op are all safe to repeat.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::quorum::{Consistency, QuorumValidator};
use crate::domain::ports::{ClusterReference, DisruptionBudget, ResourceStore};
use crate::error::Result;

/// What a lifecycle pass did to the monitor budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetOutcome {
    Created { min_available: i32 },
    Updated { from: i32, to: i32 },
    Unchanged,
    /// Quorum size unknown; the budget is left alone until it is
    Deferred { budget_exists: bool },
}

impl BudgetOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetOutcome::Created { .. } => "created",
            BudgetOutcome::Updated { .. } => "updated",
            BudgetOutcome::Unchanged => "unchanged",
            BudgetOutcome::Deferred { .. } => "deferred",
        }
    }

    /// Validation result implied by the outcome, `None` when no existing
    /// budget was checked
    pub fn consistency(&self) -> Option<Consistency> {
        match self {
            BudgetOutcome::Created { .. } => None,
            BudgetOutcome::Updated { .. } => Some(Consistency::Invalid),
            BudgetOutcome::Unchanged => Some(Consistency::Valid),
            BudgetOutcome::Deferred { budget_exists: true } => Some(Consistency::Unknown),
            BudgetOutcome::Deferred { budget_exists: false } => None,
        }
    }

    /// Whether this pass wrote to the store
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            BudgetOutcome::Created { .. } | BudgetOutcome::Updated { .. }
        )
    }
}

/// Keeps the monitor disruption budget in line with the quorum size
pub struct PdbLifecycleManager {
    store: Arc<dyn ResourceStore>,
    validator: QuorumValidator,
    selector: BTreeMap<String, String>,
}

impl PdbLifecycleManager {
    /// `selector` is written into budgets this manager creates
    pub fn new(
        store: Arc<dyn ResourceStore>,
        validator: QuorumValidator,
        selector: BTreeMap<String, String>,
    ) -> Self {
        Self {
            store,
            validator,
            selector,
        }
    }

    pub fn budget_name(&self) -> &str {
        self.validator.budget_name()
    }

    /// Bring the monitor budget for `cluster` to the quorum threshold
    pub async fn ensure(&self, cluster: &ClusterReference) -> Result<BudgetOutcome> {
        let namespace = cluster.namespace.as_str();
        let name = self.validator.budget_name();

        let existing = self.store.get_budget(namespace, name).await?;

        let Some(threshold) = self.validator.threshold(cluster)? else {
            if let Some(current) = &existing {
                self.validator.validate(cluster, current);
            }
            debug!(
                namespace,
                cluster = %cluster.name,
                exists = existing.is_some(),
                "quorum size not yet known, leaving monitor budget unmanaged"
            );
            return Ok(BudgetOutcome::Deferred {
                budget_exists: existing.is_some(),
            });
        };

        let Some(current) = existing else {
            let budget = DisruptionBudget {
                namespace: namespace.to_string(),
                name: name.to_string(),
                min_available: threshold,
                selector: self.selector.clone(),
                resource_version: None,
            };
            self.store.create_budget(&budget).await?;
            info!(
                namespace,
                budget = name,
                min_available = threshold,
                quorum_size = cluster.quorum_size,
                "created monitor disruption budget"
            );
            return Ok(BudgetOutcome::Created {
                min_available: threshold,
            });
        };

        self.validator.validate(cluster, &current);

        if current.min_available == threshold {
            return Ok(BudgetOutcome::Unchanged);
        }

        let from = current.min_available;
        let desired = DisruptionBudget {
            min_available: threshold,
            ..current
        };
        self.store.update_budget(&desired).await?;
        info!(
            namespace,
            budget = name,
            from,
            to = threshold,
            quorum_size = cluster.quorum_size,
            "updated monitor disruption budget"
        );

        Ok(BudgetOutcome::Updated {
            from,
            to: threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::InMemoryStore;
    use assert_matches::assert_matches;

    fn cluster(quorum_size: u32) -> ClusterReference {
        ClusterReference {
            namespace: "storage".into(),
            name: "storage".into(),
            quorum_size,
        }
    }

    fn selector() -> BTreeMap<String, String> {
        BTreeMap::from([("app".to_string(), "storage-mon".to_string())])
    }

    fn manager(store: Arc<InMemoryStore>) -> PdbLifecycleManager {
        PdbLifecycleManager::new(store, QuorumValidator::new("mon-pdb"), selector())
    }

    fn existing(min_available: i32) -> DisruptionBudget {
        DisruptionBudget {
            namespace: "storage".into(),
            name: "mon-pdb".into(),
            min_available,
            selector: selector(),
            resource_version: None,
        }
    }

    #[tokio::test]
    async fn test_creates_missing_budget() {
        let store = Arc::new(InMemoryStore::new());
        let manager = manager(store.clone());

        let outcome = manager.ensure(&cluster(3)).await.unwrap();
        assert_eq!(outcome, BudgetOutcome::Created { min_available: 2 });
        assert_eq!(store.create_calls(), 1);
        assert_eq!(store.update_calls(), 0);

        let budget = store.budget("storage", "mon-pdb").unwrap();
        assert_eq!(budget.min_available, 2);
        assert_eq!(budget.selector, selector());
    }

    #[tokio::test]
    async fn test_updates_stale_budget() {
        let store = Arc::new(InMemoryStore::new());
        store.put_budget(existing(1));
        let manager = manager(store.clone());

        let outcome = manager.ensure(&cluster(3)).await.unwrap();
        assert_eq!(outcome, BudgetOutcome::Updated { from: 1, to: 2 });
        assert_eq!(store.create_calls(), 0);
        assert_eq!(store.update_calls(), 1);
        assert_eq!(store.budget("storage", "mon-pdb").unwrap().min_available, 2);
    }

    #[tokio::test]
    async fn test_matching_budget_is_untouched() {
        let store = Arc::new(InMemoryStore::new());
        store.put_budget(existing(2));
        let manager = manager(store.clone());

        let outcome = manager.ensure(&cluster(3)).await.unwrap();
        assert_eq!(outcome, BudgetOutcome::Unchanged);
        assert_eq!(store.create_calls() + store.update_calls(), 0);
    }

    #[tokio::test]
    async fn test_second_pass_writes_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let manager = manager(store.clone());

        assert!(manager.ensure(&cluster(5)).await.unwrap().is_write());
        let writes = store.create_calls() + store.update_calls();

        assert_eq!(manager.ensure(&cluster(5)).await.unwrap(), BudgetOutcome::Unchanged);
        assert_eq!(store.create_calls() + store.update_calls(), writes);
    }

    #[tokio::test]
    async fn test_unknown_quorum_defers() {
        let store = Arc::new(InMemoryStore::new());
        let manager = manager(store.clone());

        assert_eq!(
            manager.ensure(&cluster(0)).await.unwrap(),
            BudgetOutcome::Deferred { budget_exists: false }
        );
        assert!(store.budget("storage", "mon-pdb").is_none());

        // Existing budgets are not touched either
        store.put_budget(existing(7));
        assert_eq!(
            manager.ensure(&cluster(0)).await.unwrap(),
            BudgetOutcome::Deferred { budget_exists: true }
        );
        assert_eq!(store.budget("storage", "mon-pdb").unwrap().min_available, 7);
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let store = Arc::new(InMemoryStore::new());
        store.set_failing(true);
        let manager = manager(store.clone());

        let err = manager.ensure(&cluster(3)).await.unwrap_err();
        assert_matches!(err, Error::StoreTimeout { .. });
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_quorum_growth_tracks_threshold() {
        let store = Arc::new(InMemoryStore::new());
        let manager = manager(store.clone());

        manager.ensure(&cluster(3)).await.unwrap();
        let outcome = manager.ensure(&cluster(7)).await.unwrap();
        assert_eq!(outcome, BudgetOutcome::Updated { from: 2, to: 4 });
    }

    #[test]
    fn test_outcome_consistency() {
        assert_eq!(BudgetOutcome::Created { min_available: 2 }.consistency(), None);
        assert_eq!(
            BudgetOutcome::Updated { from: 1, to: 2 }.consistency(),
            Some(Consistency::Invalid)
        );
        assert_eq!(BudgetOutcome::Unchanged.consistency(), Some(Consistency::Valid));
        assert_eq!(
            BudgetOutcome::Deferred { budget_exists: true }.consistency(),
            Some(Consistency::Unknown)
        );
        assert_eq!(BudgetOutcome::Deferred { budget_exists: false }.consistency(), None);
        assert!(!BudgetOutcome::Deferred { budget_exists: true }.is_write());
    }

    #[tokio::test]
    async fn test_unrepresentable_quorum_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let manager = manager(store.clone());

        let err = manager.ensure(&cluster(u32::MAX)).await.unwrap_err();
        assert_matches!(err, Error::InvalidResource { .. });
        assert_eq!(store.create_calls(), 0);
    }
}
