use futures::StreamExt as _;
use kube::{
    runtime::{
        reflector::{
            self,
            store::Writer,
            ObjectRef,
            Store,
        },
        watcher,
        WatchStreamExt as _,
    },
    Api,
    Resource,
};
use serde::de::DeserializeOwned;
use std::{
    fmt::Debug,
    hash::Hash,
    sync::Arc,
    time::Duration,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Full relist interval, repairs any event the watch may have missed.
pub const RESYNC_PERIOD: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("mirror stopped before its initial list completed")]
    NotSynced,
}

/// Read access to a locally mirrored resource kind.
///
/// Keys are `namespace/name` for namespaced objects and `name` for cluster scoped ones. Reads are point in time, an
/// object returned here is never observed half-updated.
pub trait ObjectMirror<K>: Send + Sync {
    /// Keys of all currently known objects. The order is unspecified.
    fn list_keys(&self) -> Vec<String>;

    fn get_by_key(&self, key: &str) -> Result<Option<Arc<K>>, MirrorError>;

    fn list(&self) -> Vec<Arc<K>>;
}

pub fn object_key<K: Resource>(obj: &K) -> Option<String> {
    let meta = obj.meta();
    let name = meta.name.as_deref()?;
    match meta.namespace.as_deref() {
        Some(ns) => Some(format!("{ns}/{name}")),
        None => Some(name.to_string()),
    }
}

/// Mirror backed by a kube-runtime reflector store. The store is written by a single background task that follows a
/// watch on the resource kind.
pub struct ReflectorMirror<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    store: Store<K>,
}

impl<K> ReflectorMirror<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone + Send + Sync,
{
    /// Lists all objects reachable through `api`, then follows their events until `cancel` fires. Watch failures are
    /// logged and never surfaced, the task keeps going until cancelled.
    pub fn start(api: Api<K>, cancel: CancellationToken) -> (Self, JoinHandle<()>) {
        let (store, writer) = reflector::store();
        let task = tokio::spawn(run_mirror(api, writer, cancel, RESYNC_PERIOD));
        (Self { store }, task)
    }

    pub fn from_store(store: Store<K>) -> Self {
        Self { store }
    }

    /// Resolves once the first complete list has been applied to the store.
    pub async fn wait_until_ready(&self) -> Result<(), MirrorError> {
        self.store.wait_until_ready().await.map_err(|_| MirrorError::NotSynced)
    }
}

impl<K> ObjectMirror<K> for ReflectorMirror<K>
where
    K: Resource + Clone + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone + Send + Sync,
{
    fn list_keys(&self) -> Vec<String> {
        self.store.state().iter().filter_map(|obj| object_key(obj.as_ref())).collect()
    }

    /// Keys no object can have (empty segments, more than one `/`) are simply absent.
    fn get_by_key(&self, key: &str) -> Result<Option<Arc<K>>, MirrorError> {
        let obj_ref = match key.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
                ObjectRef::new(name).within(ns)
            }
            None if !key.is_empty() => ObjectRef::new(key),
            _ => return Ok(None),
        };
        Ok(self.store.get(&obj_ref))
    }

    fn list(&self) -> Vec<Arc<K>> {
        self.store.state()
    }
}

async fn run_mirror<K>(api: Api<K>, mut writer: Writer<K>, cancel: CancellationToken, resync: Duration)
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone + Send + Sync,
{
    let kind = K::kind(&K::DynamicType::default()).to_string();
    info!(%kind, "starting mirror");

    loop {
        // a fresh watcher starts with a full list, the writer swaps the store content once it completes
        let events = watcher(api.clone(), watcher::Config::default()).default_backoff();
        tokio::pin!(events);
        let relist = tokio::time::sleep(resync);
        tokio::pin!(relist);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(%kind, "mirror stopped");
                    return;
                }
                _ = &mut relist => {
                    debug!(%kind, "periodic relist");
                    break;
                }
                event = events.next() => match event {
                    Some(Ok(event)) => {
                        if matches!(event, watcher::Event::InitDone) {
                            debug!(%kind, "list synced");
                        }
                        writer.apply_watcher_event(&event);
                    }
                    Some(Err(err)) => {
                        warn!(%kind, "watch failed: {err}");
                    }
                    None => {
                        warn!(%kind, "watch stream ended, restarting");
                        break;
                    }
                },
            }
        }
    }
}
