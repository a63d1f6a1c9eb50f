use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

use crate::logger::Logger;
use crate::push::PushBackend;
use crate::store::document::{documents_from_tree, Document};
use crate::store::path::ResourcePath;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@rentral/live"));

pub(crate) type SnapshotCallback = Arc<dyn Fn(&[Document]) + Send + Sync>;

/// Caller-held handle for one live listener. Cheap to clone; all clones
/// refer to the same listener. Once deactivated it never reactivates.
#[derive(Clone)]
pub struct SubscriptionHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: u64,
    resource: String,
    path: ResourcePath,
    active: AtomicBool,
}

impl SubscriptionHandle {
    fn new(id: u64, resource: String, path: ResourcePath) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                resource,
                path,
                active: AtomicBool::new(true),
            }),
        }
    }

    /// The logical resource this listener was opened for ("all messages",
    /// "one conversation's messages", ...). Deduplication happens on this,
    /// so two logical views over the same tree path stay independent.
    pub fn resource(&self) -> &str {
        &self.inner.resource
    }

    pub fn path(&self) -> &ResourcePath {
        &self.inner.path
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    fn deactivate(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
    }
}

struct Entry {
    handle: SubscriptionHandle,
    callback: SnapshotCallback,
}

/// Owns the resource-path → listener table. All table mutation happens under
/// one mutex, so two concurrent subscribes to the same path cannot race into
/// duplicate listeners. Snapshot deliveries are serialized by a separate
/// async lock so each subscriber observes a totally ordered stream.
#[derive(Clone)]
pub(crate) struct SubscriptionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    entries: Mutex<HashMap<String, Entry>>,
    next_id: AtomicU64,
    delivery: tokio::sync::Mutex<()>,
}

impl SubscriptionManager {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                entries: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                delivery: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Registers a listener for `path` under a logical resource name.
    /// Subscribing again while the resource's listener is active is a no-op
    /// that hands back the existing handle. No snapshot is delivered at
    /// registration; the first delivery follows the first write touching the
    /// path.
    pub(crate) fn subscribe(
        &self,
        resource: String,
        path: ResourcePath,
        callback: SnapshotCallback,
    ) -> SubscriptionHandle {
        let mut entries = self.inner.entries.lock().unwrap();
        if let Some(entry) = entries.get(&resource) {
            if entry.handle.is_active() {
                return entry.handle.clone();
            }
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = SubscriptionHandle::new(id, resource.clone(), path);
        entries.insert(
            resource,
            Entry {
                handle: handle.clone(),
                callback,
            },
        );
        handle
    }

    /// Deactivates the handle and releases the table entry before returning.
    /// A delivery already in flight may still observe the handle; it checks
    /// `is_active` immediately before invoking the callback and drops the
    /// snapshot instead.
    pub(crate) fn unsubscribe(&self, handle: &SubscriptionHandle) {
        handle.deactivate();
        let mut entries = self.inner.entries.lock().unwrap();
        if let Some(entry) = entries.get(handle.resource()) {
            if entry.handle.inner.id == handle.inner.id {
                entries.remove(handle.resource());
            }
        }
    }

    pub(crate) fn active_count(&self) -> usize {
        self.inner.entries.lock().unwrap().len()
    }

    /// Fans a write at `changed` out to every related listener, re-reading
    /// the full current snapshot of each watched path. One listener's
    /// failure (fetch error or panicking callback) is logged and never tears
    /// down the others.
    pub(crate) async fn deliver(&self, changed: &ResourcePath, backend: &dyn PushBackend) {
        let _ordered = self.inner.delivery.lock().await;

        let matching: Vec<(SubscriptionHandle, SnapshotCallback)> = {
            let entries = self.inner.entries.lock().unwrap();
            entries
                .values()
                .filter(|entry| entry.handle.path().is_related_to(changed))
                .map(|entry| (entry.handle.clone(), entry.callback.clone()))
                .collect()
        };

        for (handle, callback) in matching {
            let snapshot = match backend.get(handle.path(), &[]).await {
                Ok(value) => value,
                Err(err) => {
                    LOGGER.warn(format!(
                        "Snapshot fetch for '{}' failed: {err}",
                        handle.path()
                    ));
                    continue;
                }
            };
            let documents = documents_from_tree(&snapshot);
            if !handle.is_active() {
                continue;
            }
            let outcome = catch_unwind(AssertUnwindSafe(|| callback(&documents)));
            if outcome.is_err() {
                LOGGER.error(format!(
                    "Subscriber callback for '{}' panicked; listener kept alive",
                    handle.path()
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::{InMemoryPushBackend, PushBackend};
    use serde_json::json;
    use std::sync::Mutex;

    fn capture() -> (Arc<Mutex<Vec<Vec<String>>>>, SnapshotCallback) {
        let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let callback: SnapshotCallback = Arc::new(move |documents: &[Document]| {
            captured
                .lock()
                .unwrap()
                .push(documents.iter().map(|d| d.id().to_string()).collect());
        });
        (seen, callback)
    }

    #[tokio::test]
    async fn delivers_full_snapshots_to_related_paths() {
        let backend = InMemoryPushBackend::new();
        let manager = SubscriptionManager::new();
        let watched = ResourcePath::from_string("messages").unwrap();
        let (seen, callback) = capture();
        manager.subscribe("all-messages".to_string(), watched.clone(), callback);

        let m1 = ResourcePath::from_string("messages/m1").unwrap();
        backend.set(&m1, json!({"content": "hi"})).await.unwrap();
        manager.deliver(&m1, &backend).await;

        let m2 = ResourcePath::from_string("messages/m2").unwrap();
        backend.set(&m2, json!({"content": "again"})).await.unwrap();
        manager.deliver(&m2, &backend).await;

        let snapshots = seen.lock().unwrap();
        assert_eq!(snapshots.as_slice(), &[vec!["m1".to_string()], vec!["m1".to_string(), "m2".to_string()]]);
    }

    #[tokio::test]
    async fn resubscribing_an_active_path_returns_the_same_handle() {
        let manager = SubscriptionManager::new();
        let path = ResourcePath::from_string("messages").unwrap();
        let (_, callback) = capture();
        let first = manager.subscribe("all-messages".to_string(), path.clone(), callback);
        let (_, other) = capture();
        let second = manager.subscribe("all-messages".to_string(), path.clone(), other);
        assert_eq!(first.inner.id, second.inner.id);
        assert_eq!(manager.active_count(), 1);

        // A different logical resource over the same path is its own
        // listener.
        let (_, third) = capture();
        let list = manager.subscribe("conversation-list".to_string(), path, third);
        assert_ne!(list.inner.id, first.inner.id);
        assert_eq!(manager.active_count(), 2);
    }

    #[tokio::test]
    async fn unsubscribe_is_synchronous_and_stops_delivery() {
        let backend = InMemoryPushBackend::new();
        let manager = SubscriptionManager::new();
        let path = ResourcePath::from_string("messages").unwrap();
        let (seen, callback) = capture();
        let handle = manager.subscribe("all-messages".to_string(), path.clone(), callback);

        manager.unsubscribe(&handle);
        assert!(!handle.is_active());
        assert_eq!(manager.active_count(), 0);

        let m1 = ResourcePath::from_string("messages/m1").unwrap();
        backend.set(&m1, json!({"content": "hi"})).await.unwrap();
        manager.deliver(&m1, &backend).await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn panicking_callback_keeps_the_listener_alive() {
        let backend = InMemoryPushBackend::new();
        let manager = SubscriptionManager::new();
        let path = ResourcePath::from_string("messages").unwrap();

        let calls = Arc::new(AtomicU64::new(0));
        let counted = Arc::clone(&calls);
        let callback: SnapshotCallback = Arc::new(move |_documents: &[Document]| {
            if counted.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("subscriber bug");
            }
        });
        manager.subscribe("all-messages".to_string(), path, callback);

        let m1 = ResourcePath::from_string("messages/m1").unwrap();
        backend.set(&m1, json!({"content": "hi"})).await.unwrap();
        manager.deliver(&m1, &backend).await;
        manager.deliver(&m1, &backend).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(manager.active_count(), 1);
    }
}
