//! Subscription registry
//!
//! Each entry pairs a selector with a listener and remembers the last slice
//! the listener saw. After a commit the registry re-runs every selector and
//! calls the listener only when the slice is not `shallow_eq` to the previous
//! one, so a listener fires at most once per commit.
//!
//! Each entry also remembers the version of the last root it was checked
//! against. Notifications can arrive out of order (a listener that
//! dispatches runs a nested notification before the outer one finishes, and
//! commits on other threads notify without the commit lock), so a root older
//! than the one an entry has already seen is skipped. Deliveries are
//! serialized by a reentrant lock: a listener may dispatch (its nested
//! notification runs on the same thread), while notifications from other
//! threads wait their turn. A listener must not block on another thread that
//! is dispatching into the same store.

use crate::model::Selector;
use indexmap::IndexMap;
use parking_lot::{Mutex, ReentrantMutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use strata_core::Value;

/// Listener callback
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Identifier of a subscription within its store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

struct Seen {
    version: u64,
    slice: Value,
}

struct Entry {
    selector: Selector,
    listener: Listener,
    last: Mutex<Seen>,
}

pub(crate) struct SubscriptionRegistry {
    next_id: AtomicU64,
    entries: Mutex<IndexMap<SubscriptionId, Arc<Entry>>>,
    delivery: ReentrantMutex<()>,
}

impl SubscriptionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(0),
            entries: Mutex::new(IndexMap::new()),
            delivery: ReentrantMutex::new(()),
        })
    }

    /// Register a listener, seeding its last slice from the root at `version`
    pub fn subscribe(
        self: &Arc<Self>,
        selector: Selector,
        listener: Listener,
        version: u64,
        current: &Value,
    ) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = Arc::new(Entry {
            last: Mutex::new(Seen {
                version,
                slice: selector(current),
            }),
            selector,
            listener,
        });
        self.entries.lock().insert(id, entry);
        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    /// Fan the root committed at `version` out to every entry whose slice changed
    pub fn notify(&self, version: u64, root: &Value) {
        let _delivery = self.delivery.lock();

        // Snapshot so listeners may subscribe or unsubscribe while we iterate
        let entries: Vec<Arc<Entry>> = self.entries.lock().values().cloned().collect();

        for entry in entries {
            let slice = (entry.selector)(root);
            let changed = {
                let mut last = entry.last.lock();
                if version <= last.version {
                    false
                } else {
                    last.version = version;
                    if last.slice.shallow_eq(&slice) {
                        false
                    } else {
                        last.slice = slice.clone();
                        true
                    }
                }
            };
            if changed {
                (entry.listener)(&slice);
            }
        }
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        self.entries.lock().shift_remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Handle returned by `Store::subscribe`
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
/// The handle only holds a weak reference to the registry, so it never keeps
/// a store alive.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: SubscriptionId,
    registry: Weak<SubscriptionRegistry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the entry
    ///
    /// Returns false if it was already removed or the store is gone.
    pub fn unsubscribe(&self) -> bool {
        self.registry
            .upgrade()
            .map(|registry| registry.remove(self.id))
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn field(key: &'static str) -> Selector {
        Arc::new(move |root: &Value| root.get(key).cloned().unwrap_or_default())
    }

    fn counting() -> (Listener, Arc<AtomicUsize>, Arc<Mutex<Vec<Value>>>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (c, s) = (calls.clone(), seen.clone());
        let listener: Listener = Arc::new(move |slice: &Value| {
            c.fetch_add(1, Ordering::SeqCst);
            s.lock().push(slice.clone());
        });
        (listener, calls, seen)
    }

    #[test]
    fn test_fires_only_on_change() {
        let registry = SubscriptionRegistry::new();
        let root = Value::object([("count", 0), ("name", 0)]);
        let (listener, calls, seen) = counting();
        let _sub = registry.subscribe(field("count"), listener, 0, &root);

        // Unrelated slice changed
        let mut next = root.clone();
        next.insert("name", 1).unwrap();
        registry.notify(1, &next);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        next.insert("count", 1).unwrap();
        registry.notify(2, &next);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(seen.lock().as_slice(), &[Value::Int(1)]);

        // Same root again: nothing new
        registry.notify(3, &next);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shallow_comparison_of_selected_objects() {
        let registry = SubscriptionRegistry::new();
        let items = Value::list([1, 2]);
        let root = Value::object([("items", items.clone()), ("n", Value::Int(0))]);
        let (listener, calls, _) = counting();

        // Selector builds a fresh map on every call
        let selector: Selector = Arc::new(|root: &Value| {
            Value::object([("items", root.get("items").cloned().unwrap_or_default())])
        });
        let _sub = registry.subscribe(selector, listener, 0, &root);

        let mut next = root.clone();
        next.insert("n", 1).unwrap();
        registry.notify(1, &next);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        next.insert("items", Value::list([1, 2])).unwrap();
        registry.notify(2, &next);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let registry = SubscriptionRegistry::new();
        let (listener, calls, _) = counting();
        let sub = registry.subscribe(field("count"), listener, 0, &Value::empty_map());
        assert_eq!(registry.len(), 1);

        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
        assert_eq!(registry.len(), 0);

        registry.notify(1, &Value::object([("count", 5)]));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let registry = SubscriptionRegistry::new();
        let (listener, _, _) = counting();
        let sub = registry.subscribe(field("count"), listener, 0, &Value::empty_map());
        drop(registry);
        assert!(!sub.unsubscribe());
    }

    #[test]
    fn test_listener_may_unsubscribe_itself() {
        let registry = SubscriptionRegistry::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));

        let (s, c) = (slot.clone(), calls.clone());
        let listener: Listener = Arc::new(move |_: &Value| {
            c.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = s.lock().take() {
                sub.unsubscribe();
            }
        });
        let sub = registry.subscribe(field("count"), listener, 0, &Value::empty_map());
        *slot.lock() = Some(sub);

        registry.notify(1, &Value::object([("count", 1)]));
        registry.notify(2, &Value::object([("count", 2)]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_older_root_is_ignored() {
        let registry = SubscriptionRegistry::new();
        let (listener, calls, seen) = counting();
        let _sub = registry.subscribe(field("count"), listener, 0, &Value::object([("count", 0)]));

        registry.notify(2, &Value::object([("count", 2)]));
        // A notification for version 1 arriving late must not roll the entry back
        registry.notify(1, &Value::object([("count", 1)]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(seen.lock().as_slice(), &[Value::Int(2)]);

        registry.notify(3, &Value::object([("count", 3)]));
        assert_eq!(seen.lock().as_slice(), &[Value::Int(2), Value::Int(3)]);
    }
}
