//! Disruption Controller
//!
//! Wires the event router to the reconciler:
//! - Runs the router against the watch source
//! - Dispatches reconcile requests to a bounded set of workers
//! - Requeues failed passes according to the error's requeue policy

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::budget::PdbLifecycleManager;
use super::cluster_map::ClusterMap;
use super::queue::WorkQueue;
use super::quorum::QuorumValidator;
use super::reconciler::{ReconcileOutcome, Reconciler};
use super::router::{EventRouter, APP_LABEL};
use crate::domain::ports::{ReconcileRequest, ResourceStore, WatchSource};
use crate::error::Result;
use crate::metrics::Metrics;

// =============================================================================
// Controller Configuration
// =============================================================================

/// Configuration for the disruption controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace to watch (all namespaces if unset)
    pub watch_namespace: Option<String>,
    /// Well-known name of the monitor disruption budget
    pub budget_name: String,
    /// `app` label of monitor pods, used as the budget selector
    pub mon_app: String,
    /// `app` label of storage-daemon deployments
    pub osd_app: String,
    /// Maximum concurrent reconcile passes
    pub workers: usize,
    /// Reconcile request channel capacity
    pub queue_capacity: usize,
    /// Bound on every store call
    pub store_timeout: Duration,
    /// First retry delay after a transient failure
    pub initial_backoff: Duration,
    /// Upper bound on retry delays
    pub max_backoff: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            budget_name: "mon-pdb".to_string(),
            mon_app: "storage-mon".to_string(),
            osd_app: "storage-osd".to_string(),
            workers: 4,
            queue_capacity: 1024,
            store_timeout: Duration::from_secs(30),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(300),
        }
    }
}

impl ControllerConfig {
    /// Label selector written into the monitor budget
    pub fn mon_selector(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(APP_LABEL.to_string(), self.mon_app.clone())])
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Runs the watch -> route -> reconcile loop
pub struct DisruptionController {
    config: ControllerConfig,
    source: Arc<dyn WatchSource>,
    cluster_map: Arc<ClusterMap>,
    router: EventRouter,
    reconciler: Arc<Reconciler>,
    queue: Arc<WorkQueue>,
    metrics: Arc<Metrics>,
}

impl DisruptionController {
    pub fn new(
        config: ControllerConfig,
        store: Arc<dyn ResourceStore>,
        source: Arc<dyn WatchSource>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let cluster_map = Arc::new(ClusterMap::new());
        let router = EventRouter::new(cluster_map.clone(), config.osd_app.clone(), metrics.clone());
        let budgets = PdbLifecycleManager::new(
            store.clone(),
            QuorumValidator::new(config.budget_name.clone()),
            config.mon_selector(),
        );
        let reconciler = Arc::new(Reconciler::new(store, cluster_map.clone(), budgets));
        let queue = Arc::new(WorkQueue::new(
            config.workers,
            config.initial_backoff,
            config.max_backoff,
        ));

        Self {
            config,
            source,
            cluster_map,
            router,
            reconciler,
            queue,
            metrics,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn cluster_map(&self) -> Arc<ClusterMap> {
        self.cluster_map.clone()
    }

    /// Run until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            namespace = ?self.config.watch_namespace,
            budget = %self.config.budget_name,
            workers = self.config.workers,
            "starting disruption controller"
        );

        let (tx, rx) = mpsc::channel(self.config.queue_capacity);
        let routing = self
            .router
            .run(self.source.as_ref(), tx.clone(), cancel.clone());
        let dispatching = self.dispatch(rx, tx, cancel);

        tokio::join!(routing, dispatching);
        info!("disruption controller stopped");
    }

    async fn dispatch(
        &self,
        mut rx: mpsc::Receiver<ReconcileRequest>,
        tx: mpsc::Sender<ReconcileRequest>,
        cancel: CancellationToken,
    ) {
        let mut workers = JoinSet::new();

        loop {
            let request = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    log_join(joined);
                    continue;
                }
                next = rx.recv() => match next {
                    Some(request) => request,
                    None => break,
                },
            };

            if !self.queue.try_enqueue(&request.namespace) {
                debug!(namespace = %request.namespace, "reconcile already pending");
                continue;
            }

            let worker = Worker {
                queue: self.queue.clone(),
                reconciler: self.reconciler.clone(),
                metrics: self.metrics.clone(),
                tx: tx.clone(),
                cancel: cancel.clone(),
            };
            workers.spawn(worker.process(request));
        }

        if !workers.is_empty() {
            info!(in_flight = workers.len(), "waiting for reconcile passes to finish");
        }
        while let Some(joined) = workers.join_next().await {
            log_join(joined);
        }
    }
}

fn log_join(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "reconcile worker panicked or was aborted");
    }
}

/// Everything a spawned reconcile pass needs
struct Worker {
    queue: Arc<WorkQueue>,
    reconciler: Arc<Reconciler>,
    metrics: Arc<Metrics>,
    tx: mpsc::Sender<ReconcileRequest>,
    cancel: CancellationToken,
}

impl Worker {
    async fn process(self, request: ReconcileRequest) {
        let namespace = request.namespace.clone();

        let result = self.reconcile_serialized(&request).await;
        self.queue.release(&namespace);

        let err = match result {
            Ok(outcome) => {
                self.queue.forget(&namespace);
                let action = match outcome {
                    ReconcileOutcome::NoCluster => "no_cluster",
                    ReconcileOutcome::Budget(budget) => {
                        if let Some(consistency) = budget.consistency() {
                            self.metrics
                                .validations
                                .with_label_values(&[consistency.as_str()])
                                .inc();
                        }
                        budget.as_str()
                    }
                };
                self.metrics.budget_actions.with_label_values(&[action]).inc();
                return;
            }
            Err(err) => err,
        };

        self.metrics.reconcile_errors.inc();
        let Some(delay) = self.queue.retry_delay(&namespace, err.action()) else {
            error!(namespace = %namespace, error = %err, "reconcile failed, not requeueing");
            return;
        };

        warn!(
            namespace = %namespace,
            error = %err,
            transient = err.is_transient(),
            ?delay,
            "reconcile failed, requeueing"
        );
        let requeue = async {
            tokio::time::sleep(delay).await;
            self.tx.send(request).await
        };
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            sent = requeue => {
                if sent.is_err() {
                    debug!(namespace = %namespace, "queue closed, dropping requeue");
                }
            }
        }
    }

    async fn reconcile_serialized(&self, request: &ReconcileRequest) -> Result<ReconcileOutcome> {
        let lock = self.queue.lock_for(&request.namespace);
        let _guard = lock.lock().await;
        self.queue.started(&request.namespace);

        let _permit = self.queue.permit().await?;
        self.reconciler.reconcile(request).await
    }
}
