//! Kubernetes watch source
//!
//! Adapts kube-runtime watchers to the controller's typed watch events. The
//! watcher reports objects as applied/deleted/restarted, so each subscription
//! keeps the last seen copy of every object to tell creates from updates and
//! to hand the router the previous state.

use futures::stream::{self, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Debug;
use tracing::{debug, warn};

use crate::crd::{StorageCluster, StorageFilesystem, StorageObjectStore, StoragePool};
use crate::disruption::router::APP_LABEL;
use crate::domain::ports::{EventStream, ResourceKind, WatchEvent, WatchSource, WatchedObject};

/// Watch source backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeWatchSource {
    client: Client,
    namespace: Option<String>,
    osd_app: String,
}

impl KubeWatchSource {
    /// Watch `namespace`, or all namespaces when `None`
    pub fn new(client: Client, namespace: Option<String>, osd_app: impl Into<String>) -> Self {
        Self {
            client,
            namespace,
            osd_app: osd_app.into(),
        }
    }

    fn watch<K>(
        &self,
        kind: ResourceKind,
        config: watcher::Config,
        wrap: fn(K) -> WatchedObject,
    ) -> EventStream
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug
            + Send
            + Sync
            + 'static,
    {
        let api: Api<K> = match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let mut translator = EventTranslator::new(wrap);

        debug!(kind = %kind, namespace = ?self.namespace, "subscribing");
        watcher(api, config)
            .default_backoff()
            .map(move |result| {
                let events = match result {
                    Ok(event) => translator.translate(event),
                    Err(err) => {
                        warn!(kind = %kind, error = %err, "watch stream error");
                        Vec::new()
                    }
                };
                stream::iter(events)
            })
            .flatten()
            .boxed()
    }
}

impl WatchSource for KubeWatchSource {
    fn subscribe(&self, kind: ResourceKind) -> EventStream {
        let all = watcher::Config::default();
        match kind {
            ResourceKind::Cluster => self.watch::<StorageCluster>(kind, all, WatchedObject::Cluster),
            ResourceKind::Deployment => {
                let selector = format!("{}={}", APP_LABEL, self.osd_app);
                self.watch::<Deployment>(kind, all.labels(&selector), WatchedObject::Deployment)
            }
            ResourceKind::Pool => self.watch::<StoragePool>(kind, all, WatchedObject::Pool),
            ResourceKind::Filesystem => {
                self.watch::<StorageFilesystem>(kind, all, WatchedObject::Filesystem)
            }
            ResourceKind::ObjectStore => {
                self.watch::<StorageObjectStore>(kind, all, WatchedObject::ObjectStore)
            }
        }
    }
}

// =============================================================================
// Event Translation
// =============================================================================

/// Turns watcher events into create/update/delete events
pub struct EventTranslator<K> {
    wrap: fn(K) -> WatchedObject,
    known: HashMap<String, K>,
}

impl<K: Resource + Clone> EventTranslator<K> {
    pub fn new(wrap: fn(K) -> WatchedObject) -> Self {
        Self {
            wrap,
            known: HashMap::new(),
        }
    }

    pub fn translate(&mut self, event: watcher::Event<K>) -> Vec<WatchEvent> {
        let wrap = self.wrap;
        match event {
            watcher::Event::Applied(obj) => {
                let previous = self.known.insert(object_key(&obj), obj.clone());
                vec![match previous {
                    Some(old) => WatchEvent::updated(wrap(old), wrap(obj)),
                    None => WatchEvent::created(wrap(obj)),
                }]
            }
            watcher::Event::Deleted(obj) => {
                self.known.remove(&object_key(&obj));
                vec![WatchEvent::deleted(wrap(obj))]
            }
            watcher::Event::Restarted(objs) => {
                let mut previous = std::mem::take(&mut self.known);
                let mut events = Vec::with_capacity(objs.len());

                for obj in objs {
                    let key = object_key(&obj);
                    let old = previous.remove(&key);
                    self.known.insert(key, obj.clone());
                    events.push(match old {
                        Some(old) => WatchEvent::updated(wrap(old), wrap(obj)),
                        None => WatchEvent::created(wrap(obj)),
                    });
                }

                // Anything not relisted went away while disconnected
                events.extend(previous.into_values().map(|gone| WatchEvent::deleted(wrap(gone))));
                events
            }
        }
    }

    /// Number of objects currently tracked
    pub fn tracked(&self) -> usize {
        self.known.len()
    }
}

fn object_key<K: Resource>(obj: &K) -> String {
    format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::StoragePoolSpec;
    use crate::domain::ports::EventVerb;

    fn pool(name: &str, size: u32) -> StoragePool {
        let mut pool = StoragePool::new(name, StoragePoolSpec::default());
        pool.metadata.namespace = Some("storage".into());
        pool.spec.replicated.size = size;
        pool
    }

    fn translator() -> EventTranslator<StoragePool> {
        EventTranslator::new(WatchedObject::Pool)
    }

    fn old_size(event: &WatchEvent) -> Option<u32> {
        match &event.old {
            Some(WatchedObject::Pool(p)) => Some(p.spec.replicated.size),
            _ => None,
        }
    }

    #[test]
    fn test_first_apply_is_create() {
        let mut t = translator();
        let events = t.translate(watcher::Event::Applied(pool("a", 3)));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].verb, EventVerb::Create);
        assert_eq!(events[0].kind, ResourceKind::Pool);
        assert!(events[0].old.is_none());
    }

    #[test]
    fn test_second_apply_is_update_with_old() {
        let mut t = translator();
        t.translate(watcher::Event::Applied(pool("a", 3)));
        let events = t.translate(watcher::Event::Applied(pool("a", 5)));

        assert_eq!(events[0].verb, EventVerb::Update);
        assert_eq!(old_size(&events[0]), Some(3));
    }

    #[test]
    fn test_delete_forgets_object() {
        let mut t = translator();
        t.translate(watcher::Event::Applied(pool("a", 3)));
        let events = t.translate(watcher::Event::Deleted(pool("a", 3)));

        assert_eq!(events[0].verb, EventVerb::Delete);
        assert_eq!(t.tracked(), 0);

        // Recreated objects are creates again
        let events = t.translate(watcher::Event::Applied(pool("a", 3)));
        assert_eq!(events[0].verb, EventVerb::Create);
    }

    #[test]
    fn test_restart_diffs_against_known() {
        let mut t = translator();
        t.translate(watcher::Event::Applied(pool("a", 3)));
        t.translate(watcher::Event::Applied(pool("b", 3)));

        let mut events = t.translate(watcher::Event::Restarted(vec![pool("a", 3), pool("c", 2)]));
        events.sort_by_key(|e| e.new.name());

        let verbs: Vec<_> = events.iter().map(|e| (e.new.name(), e.verb)).collect();
        assert_eq!(
            verbs,
            vec![
                ("a".to_string(), EventVerb::Update),
                ("b".to_string(), EventVerb::Delete),
                ("c".to_string(), EventVerb::Create),
            ]
        );
        assert_eq!(t.tracked(), 2);
    }
}
