//! Store - the handle applications hold
//!
//! A store owns one state tree and everything compiled from its model:
//! the dispatcher, the computed engine, the thunk runner and the
//! subscription registry. `Store` is a cheap clone of a shared handle, so it
//! can be passed to threads and captured by thunks freely.

use crate::compiler::compile;
use crate::computed::ComputedEngine;
use crate::config::StoreConfig;
use crate::dispatch::{Dispatcher, MockedAction};
use crate::error::Result;
use crate::model::{walk, Descriptor, Selector};
use crate::subscription::{Listener, Subscription, SubscriptionRegistry};
use crate::thunk::{InvocationId, ThunkCall, ThunkRunner, ThunkStatus};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_core::{Path, Value};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

struct StoreInner {
    config: StoreConfig,
    dispatcher: Dispatcher,
    computed: ComputedEngine,
    thunks: ThunkRunner,
    subscriptions: Arc<SubscriptionRegistry>,
}

/// A running store
///
/// ```
/// use strata_store::model::{action, computed, object, state};
/// use strata_store::{Store, Value};
///
/// let store = Store::new(object([
///     ("count", state(0)),
///     ("increment", action(|draft, _| draft.increment("count", 1).map(|_| ()))),
///     ("double", computed(|parent, _| {
///         Ok((parent.get("count").and_then(Value::as_int).unwrap_or(0) * 2).into())
///     })),
/// ]))
/// .unwrap();
///
/// store.dispatch("increment", ()).unwrap();
/// assert_eq!(store.get_state().get("count"), Some(&Value::Int(1)));
/// assert_eq!(store.get_computed("double").unwrap(), Value::Int(2));
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

/// Create a store from a model and a config
pub fn create_store(model: Descriptor, config: StoreConfig) -> Result<Store> {
    Store::with_config(model, config)
}

impl Store {
    /// Create a store with the default config
    pub fn new(model: Descriptor) -> Result<Self> {
        Self::with_config(model, StoreConfig::default())
    }

    /// Create a store with a specific config
    ///
    /// Fails with `Error::Schema` if the model is malformed.
    pub fn with_config(model: Descriptor, config: StoreConfig) -> Result<Self> {
        let compiled = compile(walk(model)?, &config)?;
        let id = NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed);

        let dispatcher = Dispatcher::new(
            id,
            config.name().to_string(),
            config.devtools(),
            config.mock_actions(),
            compiled.initial_state,
            compiled.actions,
            compiled.listeners,
        );

        tracing::debug!(store = config.name(), id, "store created");

        Ok(Self {
            inner: Arc::new(StoreInner {
                computed: ComputedEngine::new(compiled.computed),
                thunks: ThunkRunner::new(compiled.thunks, config.thunk_status_capacity()),
                subscriptions: SubscriptionRegistry::new(),
                dispatcher,
                config,
            }),
        })
    }

    // ========================================================================
    // State and Actions
    // ========================================================================

    /// Dispatch an action synchronously
    ///
    /// Returns the root state after the commit (and any listeners it
    /// triggered). On error nothing is committed. A listener that fails is
    /// logged and skipped; the action it reacted to stays committed.
    ///
    /// # Example
    ///
    /// ```
    /// use strata_store::model::{action, object, state};
    /// use strata_store::{Error, Store, Value};
    ///
    /// let store = Store::new(object([
    ///     ("todos", object([
    ///         ("items", state(Value::list(Vec::<Value>::new()))),
    ///         ("add", action(|draft, title| draft.push("items", title.clone()))),
    ///     ])),
    /// ]))
    /// .unwrap();
    ///
    /// let root = store.dispatch("todos.add", "buy milk").unwrap();
    /// assert_eq!(root.get("todos").and_then(|t| t.get("items")), Some(&Value::list(["buy milk"])));
    ///
    /// assert!(matches!(store.dispatch("todos.remove", ()), Err(Error::UnknownAction(_))));
    /// ```
    pub fn dispatch(&self, path: impl Into<Path>, payload: impl Into<Value>) -> Result<Value> {
        self.inner
            .dispatcher
            .dispatch(path.into(), payload.into(), &self.inner.subscriptions)
    }

    /// The current root state
    ///
    /// The returned tree is never mutated by later commits.
    pub fn get_state(&self) -> Value {
        self.inner.dispatcher.state()
    }

    /// Number of commits so far
    pub fn version(&self) -> u64 {
        self.inner.dispatcher.version()
    }

    /// Get the qualified paths of every dispatchable action, in model order
    pub fn action_paths(&self) -> Vec<Path> {
        self.inner.dispatcher.action_paths().cloned().collect()
    }

    /// Actions recorded while `mock_actions` is enabled
    pub fn mocked_actions(&self) -> Vec<MockedAction> {
        self.inner.dispatcher.mocked_actions()
    }

    /// Forget the actions recorded so far
    pub fn clear_mocked_actions(&self) {
        self.inner.dispatcher.clear_mocked_actions();
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Listen for changes to a slice of the state
    ///
    /// The listener runs after a commit whose selected slice is not
    /// shallow-equal to the one it last saw. It is never handed a slice from
    /// a root older than one it has already been checked against.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::{Arc, Mutex};
    /// use strata_store::model::{action, object, state};
    /// use strata_store::{Store, Value};
    ///
    /// let store = Store::new(object([
    ///     ("count", state(0)),
    ///     ("increment", action(|draft, _| draft.increment("count", 1).map(|_| ()))),
    /// ]))
    /// .unwrap();
    ///
    /// let seen = Arc::new(Mutex::new(Vec::new()));
    /// let log = seen.clone();
    /// let subscription = store.subscribe(
    ///     |root| root.get("count").cloned().unwrap_or_default(),
    ///     move |count| log.lock().unwrap().push(count.clone()),
    /// );
    ///
    /// store.dispatch("increment", ()).unwrap();
    /// subscription.unsubscribe();
    /// store.dispatch("increment", ()).unwrap();
    /// assert_eq!(*seen.lock().unwrap(), vec![Value::Int(1)]);
    /// ```
    pub fn subscribe<S, L>(&self, selector: S, listener: L) -> Subscription
    where
        S: Fn(&Value) -> Value + Send + Sync + 'static,
        L: Fn(&Value) + Send + Sync + 'static,
    {
        let selector: Selector = Arc::new(selector);
        let listener: Listener = Arc::new(listener);
        let current = self.inner.dispatcher.snapshot();
        self.inner
            .subscriptions
            .subscribe(selector, listener, current.version, &current.root)
    }

    /// Get the number of active subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriptions.len()
    }

    // ========================================================================
    // Computed
    // ========================================================================

    /// Read a computed value against the current state
    pub fn get_computed(&self, path: impl Into<Path>) -> Result<Value> {
        self.inner.computed.get(&path.into(), &self.get_state())
    }

    /// How many times a computed value has been derived
    pub fn recomputations(&self, path: impl Into<Path>) -> Option<u64> {
        self.inner.computed.recomputations(&path.into())
    }

    /// Get the qualified paths of every computed value, in model order
    pub fn computed_paths(&self) -> Vec<Path> {
        self.inner.computed.paths().cloned().collect()
    }

    // ========================================================================
    // Thunks
    // ========================================================================

    /// Start a thunk
    ///
    /// The returned call must be awaited (or spawned) to make progress. Its
    /// status stays queryable while pending and, once settled, until it is
    /// pruned or evicted by newer settlements beyond
    /// [`StoreConfig::thunk_status_capacity`].
    ///
    /// # Example
    ///
    /// ```
    /// use strata_store::model::{action, object, state, thunk};
    /// use strata_store::{BoxError, Store, ThunkStatus, Value};
    ///
    /// let store = Store::new(object([
    ///     ("count", state(0)),
    ///     ("add", action(|draft, n| draft.increment("count", n.as_int().unwrap_or(0)).map(|_| ()))),
    ///     ("addTwice", thunk(|handle, n| async move {
    ///         handle.dispatch("add", n.clone())?;
    ///         handle.dispatch("add", n)?;
    ///         Ok::<_, BoxError>(handle.get_state())
    ///     })),
    /// ]))
    /// .unwrap();
    ///
    /// let call = store.run_thunk("addTwice", 3);
    /// let id = call.id();
    /// let root = futures::executor::block_on(call).unwrap();
    /// assert_eq!(root.get("count"), Some(&Value::Int(6)));
    /// assert_eq!(store.thunk_status(id), Some(ThunkStatus::Resolved));
    /// ```
    pub fn run_thunk(&self, path: impl Into<Path>, payload: impl Into<Value>) -> ThunkCall {
        self.inner
            .thunks
            .run(self.clone(), path.into(), payload.into())
    }

    /// Get the status of an invocation
    ///
    /// `None` for unknown thunks, abandoned calls, and statuses that were
    /// pruned or evicted.
    pub fn thunk_status(&self, id: InvocationId) -> Option<ThunkStatus> {
        self.inner.thunks.status(id)
    }

    /// Number of invocations that have not settled yet
    pub fn in_flight_thunks(&self) -> usize {
        self.inner.thunks.in_flight()
    }

    /// Forget the status of settled invocations
    pub fn prune_thunk_statuses(&self) {
        self.inner.thunks.prune();
    }

    /// Get the qualified paths of every thunk, in model order
    pub fn thunk_paths(&self) -> Vec<Path> {
        self.inner.thunks.paths().cloned().collect()
    }

    pub(crate) fn thunks(&self) -> &ThunkRunner {
        &self.inner.thunks
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Get the store name from its config
    pub fn name(&self) -> &str {
        self.inner.config.name()
    }

    /// Get the config the store was created with
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name())
            .field("version", &self.version())
            .field("subscribers", &self.subscriber_count())
            .field("in_flight_thunks", &self.in_flight_thunks())
            .finish()
    }
}
