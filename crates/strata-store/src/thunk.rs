//! Thunk runner
//!
//! A thunk is an async function that receives a [`ThunkHandle`] bound to its
//! store. The runner does not interpret what the thunk does: it starts the
//! body, records a best-effort status per invocation and hands the thunk's
//! own error back to the caller untouched.
//!
//! Invocations are never serialized; the same thunk may run many times at
//! once. There is no built-in cancellation, a thunk that wants to stop early
//! watches its own signal and stops dispatching.

use crate::compiler::ThunkDef;
use crate::error::{Error, Result};
use crate::store::Store;
use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use strata_core::{Path, Value};

/// Identity of one thunk invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InvocationId(pub u64);

/// Observable status of a thunk invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThunkStatus {
    Pending,
    Resolved,
    Rejected,
}

/// Where a running thunk sits in the model
#[derive(Debug, Clone, PartialEq)]
pub struct ThunkMeta {
    /// Qualified path of the thunk
    pub path: Path,
    /// Namespace that owns the thunk
    pub namespace: Path,
    pub invocation: InvocationId,
}

/// Store access given to a running thunk
#[derive(Clone)]
pub struct ThunkHandle {
    store: Store,
    meta: ThunkMeta,
}

impl ThunkHandle {
    /// Dispatch an action by qualified path
    pub fn dispatch(&self, path: impl Into<Path>, payload: impl Into<Value>) -> Result<Value> {
        self.store.dispatch(path, payload)
    }

    /// Dispatch an action relative to the thunk's namespace
    pub fn dispatch_local(&self, path: impl Into<Path>, payload: impl Into<Value>) -> Result<Value> {
        let path: Path = path.into();
        self.store.dispatch(self.meta.namespace.join(&path), payload)
    }

    /// The current root state
    pub fn get_state(&self) -> Value {
        self.store.get_state()
    }

    /// The current state of the thunk's namespace
    pub fn local_state(&self) -> Value {
        self.store
            .get_state()
            .get_path(&self.meta.namespace)
            .cloned()
            .unwrap_or_default()
    }

    /// Read a computed value
    pub fn get_computed(&self, path: impl Into<Path>) -> Result<Value> {
        self.store.get_computed(path)
    }

    /// Run another thunk (or this one again)
    pub fn run_thunk(&self, path: impl Into<Path>, payload: impl Into<Value>) -> ThunkCall {
        self.store.run_thunk(path, payload)
    }

    /// Injections from the store config
    pub fn injections(&self) -> &Value {
        self.store.config().injections()
    }

    pub fn meta(&self) -> &ThunkMeta {
        &self.meta
    }

    /// The store this handle is bound to
    pub fn store(&self) -> &Store {
        &self.store
    }
}

impl std::fmt::Debug for ThunkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThunkHandle").field("meta", &self.meta).finish()
    }
}

/// A running thunk invocation
///
/// Resolves to the thunk's return value, or to `Error::ThunkExecution`
/// carrying the thunk's own error.
#[must_use = "thunks do nothing unless awaited"]
pub struct ThunkCall {
    id: InvocationId,
    future: BoxFuture<'static, Result<Value>>,
}

impl ThunkCall {
    /// Identity used for status queries
    pub fn id(&self) -> InvocationId {
        self.id
    }
}

impl Future for ThunkCall {
    type Output = Result<Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().future.poll_unpin(cx)
    }
}

impl std::fmt::Debug for ThunkCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThunkCall").field("id", &self.id).finish()
    }
}

/// Per-invocation status bookkeeping
///
/// Pending invocations are always tracked. At most `capacity` settled ones
/// are kept; the oldest settlement is evicted first.
struct StatusTable {
    pending: HashSet<InvocationId>,
    settled: HashMap<InvocationId, ThunkStatus>,
    order: VecDeque<InvocationId>,
    capacity: usize,
}

impl StatusTable {
    fn new(capacity: usize) -> Self {
        Self {
            pending: HashSet::new(),
            settled: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn get(&self, id: InvocationId) -> Option<ThunkStatus> {
        if self.pending.contains(&id) {
            Some(ThunkStatus::Pending)
        } else {
            self.settled.get(&id).copied()
        }
    }

    fn settle(&mut self, id: InvocationId, status: ThunkStatus) {
        if !self.pending.remove(&id) {
            return;
        }
        self.settled.insert(id, status);
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.settled.remove(&oldest);
            }
        }
    }

    fn clear_settled(&mut self) {
        self.settled.clear();
        self.order.clear();
    }
}

pub(crate) struct ThunkRunner {
    thunks: IndexMap<Path, ThunkDef>,
    next_id: AtomicU64,
    statuses: Mutex<StatusTable>,
}

impl ThunkRunner {
    pub fn new(thunks: IndexMap<Path, ThunkDef>, status_capacity: usize) -> Self {
        Self {
            thunks,
            next_id: AtomicU64::new(0),
            statuses: Mutex::new(StatusTable::new(status_capacity)),
        }
    }

    /// Start an invocation of the thunk at `path`
    pub fn run(&self, store: Store, path: Path, payload: Value) -> ThunkCall {
        let id = InvocationId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let Some(def) = self.thunks.get(&path) else {
            return ThunkCall {
                id,
                future: futures::future::ready(Err(Error::UnknownThunk(path))).boxed(),
            };
        };

        self.statuses.lock().pending.insert(id);
        tracing::debug!(store = store.name(), thunk = %path, invocation = id.0, "thunk started");

        let handle = ThunkHandle {
            store: store.clone(),
            meta: ThunkMeta {
                path: def.path.clone(),
                namespace: def.namespace.clone(),
                invocation: id,
            },
        };
        let body = (def.body)(handle, payload);
        let guard = SettleGuard {
            store,
            id,
            settled: false,
        };

        let future = async move {
            let mut guard = guard;
            let outcome = body.await;
            match outcome {
                Ok(value) => {
                    guard.settle(ThunkStatus::Resolved);
                    tracing::debug!(thunk = %path, invocation = id.0, "thunk resolved");
                    Ok(value)
                }
                Err(source) => {
                    guard.settle(ThunkStatus::Rejected);
                    tracing::warn!(thunk = %path, invocation = id.0, error = %source, "thunk rejected");
                    Err(Error::ThunkExecution { path, source })
                }
            }
        }
        .boxed();

        ThunkCall { id, future }
    }

    pub fn status(&self, id: InvocationId) -> Option<ThunkStatus> {
        self.statuses.lock().get(id)
    }

    pub fn in_flight(&self) -> usize {
        self.statuses.lock().pending.len()
    }

    /// Forget every settled invocation
    pub fn prune(&self) {
        self.statuses.lock().clear_settled();
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.thunks.keys()
    }

    fn record(&self, id: InvocationId, status: ThunkStatus) {
        self.statuses.lock().settle(id, status);
    }

    fn forget(&self, id: InvocationId) {
        self.statuses.lock().pending.remove(&id);
    }
}

/// Drops the pending status of an invocation that was abandoned before it settled
struct SettleGuard {
    store: Store,
    id: InvocationId,
    settled: bool,
}

impl SettleGuard {
    fn settle(&mut self, status: ThunkStatus) {
        self.settled = true;
        self.store.thunks().record(self.id, status);
    }
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.store.thunks().forget(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::model::{action, object, state, thunk, Descriptor};
    use crate::StoreConfig;
    use std::sync::Arc;
    use tokio::sync::Notify;

    #[derive(Debug)]
    struct Boom;

    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "boom")
        }
    }

    impl std::error::Error for Boom {}

    fn counter(extra: Vec<(&'static str, Descriptor)>) -> Store {
        let mut fields: Vec<(&'static str, Descriptor)> = vec![
            ("count", state(0)),
            ("increment", action(|d, _| d.increment("count", 1).map(|_| ()))),
        ];
        fields.extend(extra);
        Store::new(object(fields)).unwrap()
    }

    #[tokio::test]
    async fn test_thunk_dispatches_and_returns() {
        let store = counter(vec![(
            "incrementTwice",
            thunk(|h, _| async move {
                h.dispatch("increment", ())?;
                h.dispatch("increment", ())?;
                Ok::<_, BoxError>(h.get_state().get("count").cloned().unwrap_or_default())
            }),
        )]);

        let result = store.run_thunk("incrementTwice", ()).await.unwrap();
        assert_eq!(result, Value::Int(2));
        assert_eq!(store.get_state().get("count"), Some(&Value::Int(2)));
    }

    #[tokio::test]
    async fn test_error_passes_through_and_commits_stand() {
        let store = counter(vec![(
            "incrementThenFail",
            thunk(|h, _| async move {
                h.dispatch("increment", ())?;
                Err::<Value, BoxError>(Box::new(Boom))
            }),
        )]);

        let call = store.run_thunk("incrementThenFail", ());
        let id = call.id();
        let err = call.await.unwrap_err();

        assert!(err.thunk_source().is_some_and(|e| e.is::<Boom>()));
        assert_eq!(err.to_string(), "thunk `incrementThenFail` failed: boom");
        assert_eq!(store.get_state().get("count"), Some(&Value::Int(1)));
        assert_eq!(store.thunk_status(id), Some(ThunkStatus::Rejected));
    }

    #[tokio::test]
    async fn test_unknown_thunk() {
        let store = counter(vec![]);
        let call = store.run_thunk("missing", ());
        let id = call.id();
        assert!(matches!(call.await, Err(Error::UnknownThunk(_))));
        assert_eq!(store.thunk_status(id), None);
    }

    #[tokio::test]
    async fn test_nested_thunks_and_local_dispatch() {
        let model = object([
            (
                "session",
                object([
                    ("user", state(Value::Null)),
                    ("login", action(|d, p| d.set("user", p.clone()))),
                    (
                        "fetchUser",
                        thunk(|h, id| async move {
                            assert_eq!(h.meta().namespace, Path::parse("session"));
                            h.dispatch_local("login", Value::object([("id", id)]))?;
                            Ok::<_, BoxError>(h.local_state())
                        }),
                    ),
                ]),
            ),
            (
                "boot",
                thunk(|h, _| async move {
                    let session = h.run_thunk("session.fetchUser", 7).await?;
                    Ok::<_, BoxError>(session)
                }),
            ),
        ]);
        let store = Store::new(model).unwrap();

        let session = store.run_thunk("boot", ()).await.unwrap();
        assert_eq!(
            session.get_path(&Path::parse("user.id")),
            Some(&Value::Int(7))
        );
        assert_eq!(
            store.get_state().get_path(&Path::parse("session.user.id")),
            Some(&Value::Int(7))
        );
    }

    #[tokio::test]
    async fn test_status_and_concurrency() {
        let gate = Arc::new(Notify::new());
        let g = gate.clone();
        let store = counter(vec![(
            "waitThenIncrement",
            thunk(move |h, _| {
                let gate = g.clone();
                async move {
                    gate.notified().await;
                    h.dispatch("increment", ())?;
                    Ok::<_, BoxError>(Value::Null)
                }
            }),
        )]);

        let first = tokio::spawn(store.run_thunk("waitThenIncrement", ()));
        let second_call = store.run_thunk("waitThenIncrement", ());
        let second_id = second_call.id();
        let second = tokio::spawn(second_call);

        assert_eq!(store.thunk_status(second_id), Some(ThunkStatus::Pending));
        assert_eq!(store.in_flight_thunks(), 2);

        // Let both spawned tasks reach the gate before releasing it
        tokio::task::yield_now().await;
        while store.in_flight_thunks() > 0 {
            gate.notify_waiters();
            tokio::task::yield_now().await;
        }

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert_eq!(store.get_state().get("count"), Some(&Value::Int(2)));
        assert_eq!(store.thunk_status(second_id), Some(ThunkStatus::Resolved));

        store.prune_thunk_statuses();
        assert_eq!(store.thunk_status(second_id), None);
    }

    #[tokio::test]
    async fn test_abandoned_call_is_forgotten() {
        let store = counter(vec![(
            "never",
            thunk(|_, _| async move {
                futures::future::pending::<()>().await;
                Ok::<_, BoxError>(Value::Null)
            }),
        )]);

        let call = store.run_thunk("never", ());
        let id = call.id();
        assert_eq!(store.thunk_status(id), Some(ThunkStatus::Pending));
        drop(call);
        assert_eq!(store.thunk_status(id), None);
    }

    #[tokio::test]
    async fn test_injections_and_mocked_dispatch() {
        let config = StoreConfig::default()
            .with_mock_actions(true)
            .with_injections(Value::object([("step", 5)]));
        let model = object([
            ("count", state(0)),
            ("add", action(|d, p| d.increment("count", p.as_int().unwrap_or(0)).map(|_| ()))),
            (
                "addStep",
                thunk(|h, _| async move {
                    let step = h.injections().get("step").cloned().unwrap_or_default();
                    h.dispatch("add", step)?;
                    Ok::<_, BoxError>(Value::Null)
                }),
            ),
        ]);
        let store = crate::create_store(model, config).unwrap();

        store.run_thunk("addStep", ()).await.unwrap();
        assert_eq!(store.get_state().get("count"), Some(&Value::Int(0)));
        let mocked = store.mocked_actions();
        assert_eq!(mocked.len(), 1);
        assert_eq!(mocked[0].path, Path::parse("add"));
        assert_eq!(mocked[0].payload, Value::Int(5));
    }

    #[tokio::test]
    async fn test_settled_statuses_are_capped() {
        let model = object([(
            "echo",
            thunk(|_, payload| async move { Ok::<_, BoxError>(payload) }),
        )]);
        let store =
            crate::create_store(model, StoreConfig::default().with_thunk_status_capacity(2))
                .unwrap();

        let mut ids = Vec::new();
        for n in 0..5 {
            let call = store.run_thunk("echo", n);
            ids.push(call.id());
            call.await.unwrap();
        }

        // Only the two most recent settlements are remembered
        assert_eq!(store.thunk_status(ids[0]), None);
        assert_eq!(store.thunk_status(ids[2]), None);
        assert_eq!(store.thunk_status(ids[3]), Some(ThunkStatus::Resolved));
        assert_eq!(store.thunk_status(ids[4]), Some(ThunkStatus::Resolved));

        // Pending invocations never count against the cap
        let pending: Vec<ThunkCall> = (0..3).map(|n| store.run_thunk("echo", n)).collect();
        assert_eq!(store.in_flight_thunks(), 3);
        for call in &pending {
            assert_eq!(store.thunk_status(call.id()), Some(ThunkStatus::Pending));
        }
        assert_eq!(store.thunk_status(ids[4]), Some(ThunkStatus::Resolved));
        drop(pending);
        assert_eq!(store.in_flight_thunks(), 0);
    }
}
