//! Event routing
//!
//! Turns watch events from the subscribed streams into namespace-scoped
//! reconcile requests. Each stream has its own filter:
//!
//! | Stream            | create | update                        | delete |
//! |-------------------|--------|-------------------------------|--------|
//! | StorageCluster    | yes    | spec changed                  | no     |
//! | OSD Deployment    | no     | unavailable replicas > 0      | no     |
//! | Pool / FS / Store | yes    | yes                           | yes    |

use futures::stream::{self, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::cluster_map::ClusterMap;
use crate::crd::StorageCluster;
use crate::domain::ports::{
    EventVerb, ReconcileRequest, ResourceKind, WatchEvent, WatchSource, WatchedObject,
};
use crate::metrics::Metrics;

/// Label key identifying a daemon's application
pub const APP_LABEL: &str = "app";

/// Filters watch events and emits reconcile requests
pub struct EventRouter {
    cluster_map: Arc<ClusterMap>,
    osd_app: String,
    metrics: Arc<Metrics>,
}

impl EventRouter {
    /// `osd_app` is the `app` label value of storage-daemon deployments
    pub fn new(cluster_map: Arc<ClusterMap>, osd_app: impl Into<String>, metrics: Arc<Metrics>) -> Self {
        Self {
            cluster_map,
            osd_app: osd_app.into(),
            metrics,
        }
    }

    /// Route one event, returning the request it produces, if any
    pub fn route(&self, event: WatchEvent) -> Option<ReconcileRequest> {
        let kind = event.kind;

        if event.new.kind() != kind || event.old.as_ref().is_some_and(|o| o.kind() != kind) {
            warn!(
                stream = %kind,
                payload = %event.new.kind(),
                "watch event payload does not match its stream, dropping"
            );
            self.skipped(kind, "type_mismatch");
            return None;
        }

        let request = match kind {
            ResourceKind::Cluster => self.route_cluster(event),
            ResourceKind::Deployment => self.route_deployment(event),
            ResourceKind::Pool | ResourceKind::Filesystem | ResourceKind::ObjectStore => {
                self.route_by_namespace(event)
            }
        };

        if request.is_some() {
            self.metrics
                .events_enqueued
                .with_label_values(&[kind.as_str()])
                .inc();
        }
        request
    }

    fn route_cluster(&self, event: WatchEvent) -> Option<ReconcileRequest> {
        let WatchedObject::Cluster(new) = event.new else {
            return None;
        };
        let namespace = self.require_namespace(ResourceKind::Cluster, new.namespace(), &new.name_any())?;
        let name = new.name_any();

        match event.verb {
            EventVerb::Create => {
                info!(namespace = %namespace, cluster = %name, "create event from storage cluster");
                self.cluster_map.update(&namespace, &name);
                Some(ReconcileRequest::for_namespace(namespace))
            }
            EventVerb::Update => {
                let Some(WatchedObject::Cluster(old)) = event.old else {
                    warn!(namespace = %namespace, cluster = %name, "cluster update without previous state, dropping");
                    self.skipped(ResourceKind::Cluster, "missing_old");
                    return None;
                };
                self.cluster_map.update(&namespace, &name);

                if spec_changed(&old, &new) {
                    debug!(namespace = %namespace, cluster = %name, "storage cluster spec changed");
                    Some(ReconcileRequest::for_namespace(namespace))
                } else {
                    debug!(namespace = %namespace, cluster = %name, "storage cluster status-only update ignored");
                    self.skipped(ResourceKind::Cluster, "status_only");
                    None
                }
            }
            EventVerb::Delete => {
                debug!(namespace = %namespace, cluster = %name, "storage cluster deleted");
                self.cluster_map.remove_if(&namespace, &name);
                self.skipped(ResourceKind::Cluster, "delete");
                None
            }
        }
    }

    fn route_deployment(&self, event: WatchEvent) -> Option<ReconcileRequest> {
        let WatchedObject::Deployment(deployment) = event.new else {
            return None;
        };

        if !self.is_osd(&deployment) {
            self.skipped(ResourceKind::Deployment, "not_osd");
            return None;
        }

        if event.verb != EventVerb::Update {
            self.skipped(ResourceKind::Deployment, "not_update");
            return None;
        }

        let unavailable = unavailable_replicas(&deployment);
        debug!(
            deployment = %deployment.name_any(),
            unavailable_replicas = unavailable,
            "osd deployment updated"
        );
        if unavailable <= 0 {
            self.skipped(ResourceKind::Deployment, "available");
            return None;
        }

        let namespace =
            self.require_namespace(ResourceKind::Deployment, deployment.namespace(), &deployment.name_any())?;
        info!(
            namespace = %namespace,
            deployment = %deployment.name_any(),
            unavailable_replicas = unavailable,
            "osd down, enqueueing cluster"
        );
        Some(ReconcileRequest::for_namespace(namespace))
    }

    fn route_by_namespace(&self, event: WatchEvent) -> Option<ReconcileRequest> {
        let namespace = self.require_namespace(event.kind, event.new.namespace(), &event.new.name())?;
        debug!(
            kind = %event.kind,
            verb = %event.verb,
            namespace = %namespace,
            name = %event.new.name(),
            "storage topology changed"
        );
        Some(ReconcileRequest::for_namespace(namespace))
    }

    fn is_osd(&self, deployment: &Deployment) -> bool {
        deployment
            .labels()
            .get(APP_LABEL)
            .is_some_and(|app| *app == self.osd_app)
    }

    fn require_namespace(&self, kind: ResourceKind, namespace: Option<String>, name: &str) -> Option<String> {
        match namespace.filter(|ns| !ns.is_empty()) {
            Some(ns) => Some(ns),
            None => {
                error!(kind = %kind, name, "received an object without a namespace");
                self.skipped(kind, "no_namespace");
                None
            }
        }
    }

    fn skipped(&self, kind: ResourceKind, reason: &str) {
        self.metrics
            .events_skipped
            .with_label_values(&[kind.as_str(), reason])
            .inc();
    }

    /// Subscribe to every resource kind and forward requests to `queue`
    /// until cancelled, the streams end or the queue closes.
    pub async fn run(
        &self,
        source: &dyn WatchSource,
        queue: mpsc::Sender<ReconcileRequest>,
        cancel: CancellationToken,
    ) {
        let mut events = stream::select_all(ResourceKind::ALL.iter().map(|kind| source.subscribe(*kind)));
        info!("event router started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("event router stopping");
                    break;
                }
                next = events.next() => {
                    let Some(event) = next else {
                        info!("all watch streams ended");
                        break;
                    };
                    if let Some(request) = self.route(event) {
                        if queue.send(request).await.is_err() {
                            warn!("reconcile queue closed, stopping event router");
                            break;
                        }
                    }
                }
            }
        }
    }
}

fn spec_changed(old: &StorageCluster, new: &StorageCluster) -> bool {
    old.spec != new.spec
}

fn unavailable_replicas(deployment: &Deployment) -> i32 {
    deployment
        .status
        .as_ref()
        .and_then(|s| s.unavailable_replicas)
        .unwrap_or(0)
}
