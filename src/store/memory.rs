//! In-memory resource store
//!
//! Holds clusters and budgets in process memory and counts writes, so the
//! reconciliation core can be exercised without an API server.

use async_trait::async_trait;
use kube::error::ErrorResponse;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::domain::ports::{ClusterReference, DisruptionBudget, ResourceStore};
use crate::error::{Error, Result};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

#[derive(Debug, Default)]
struct State {
    clusters: BTreeMap<Key, ClusterReference>,
    budgets: BTreeMap<Key, DisruptionBudget>,
    next_version: u64,
    creates: u64,
    updates: u64,
    failing: bool,
}

impl State {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn check_failing(&self, operation: &'static str) -> Result<()> {
        if self.failing {
            return Err(Error::StoreTimeout {
                operation,
                timeout: Duration::ZERO,
            });
        }
        Ok(())
    }
}

/// Resource store backed by process memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a cluster
    pub fn put_cluster(&self, cluster: ClusterReference) {
        let mut state = self.state.lock();
        state
            .clusters
            .insert(key(&cluster.namespace, &cluster.name), cluster);
    }

    pub fn remove_cluster(&self, namespace: &str, name: &str) {
        self.state.lock().clusters.remove(&key(namespace, name));
    }

    /// Insert or replace a budget without counting it as a write
    pub fn put_budget(&self, mut budget: DisruptionBudget) {
        let mut state = self.state.lock();
        budget.resource_version = Some(state.bump_version());
        state
            .budgets
            .insert(key(&budget.namespace, &budget.name), budget);
    }

    /// Current stored budget
    pub fn budget(&self, namespace: &str, name: &str) -> Option<DisruptionBudget> {
        self.state.lock().budgets.get(&key(namespace, name)).cloned()
    }

    /// Number of budget create calls that succeeded
    pub fn create_calls(&self) -> u64 {
        self.state.lock().creates
    }

    /// Number of budget update calls that succeeded
    pub fn update_calls(&self) -> u64 {
        self.state.lock().updates
    }

    /// Make every call fail with a store timeout until reset
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<ClusterReference>> {
        let state = self.state.lock();
        state.check_failing("get_cluster")?;
        Ok(state.clusters.get(&key(namespace, name)).cloned())
    }

    async fn list_clusters(&self, namespace: &str) -> Result<Vec<ClusterReference>> {
        let state = self.state.lock();
        state.check_failing("list_clusters")?;
        Ok(state
            .clusters
            .values()
            .filter(|c| c.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn get_budget(&self, namespace: &str, name: &str) -> Result<Option<DisruptionBudget>> {
        let state = self.state.lock();
        state.check_failing("get_budget")?;
        Ok(state.budgets.get(&key(namespace, name)).cloned())
    }

    async fn create_budget(&self, budget: &DisruptionBudget) -> Result<DisruptionBudget> {
        let mut state = self.state.lock();
        state.check_failing("create_budget")?;

        let k = key(&budget.namespace, &budget.name);
        if state.budgets.contains_key(&k) {
            return Err(Error::ResourceExists {
                kind: "PodDisruptionBudget".into(),
                name: format!("{}/{}", budget.namespace, budget.name),
            });
        }

        let mut created = budget.clone();
        created.resource_version = Some(state.bump_version());
        state.budgets.insert(k, created.clone());
        state.creates += 1;
        Ok(created)
    }

    async fn update_budget(&self, budget: &DisruptionBudget) -> Result<DisruptionBudget> {
        let mut state = self.state.lock();
        state.check_failing("update_budget")?;

        let k = key(&budget.namespace, &budget.name);
        let current_version = match state.budgets.get(&k) {
            Some(current) => current.resource_version.clone(),
            None => {
                return Err(Error::Kube(kube::Error::Api(ErrorResponse {
                    status: "Failure".into(),
                    message: format!("poddisruptionbudgets \"{}\" not found", budget.name),
                    reason: "NotFound".into(),
                    code: 404,
                })))
            }
        };

        if budget.resource_version.is_some() && budget.resource_version != current_version {
            return Err(Error::Kube(kube::Error::Api(ErrorResponse {
                status: "Failure".into(),
                message: "the object has been modified".into(),
                reason: "Conflict".into(),
                code: 409,
            })));
        }

        let mut updated = budget.clone();
        updated.resource_version = Some(state.bump_version());
        state.budgets.insert(k, updated.clone());
        state.updates += 1;
        Ok(updated)
    }
}
