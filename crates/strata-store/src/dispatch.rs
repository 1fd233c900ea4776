//! Dispatcher - the synchronous commit pipeline
//!
//! `dispatch(path, payload)`:
//! 1. Refuse re-entry from a reducer running on this thread (`Reentrancy`)
//! 2. Look up the action (unknown path → `UnknownAction`, nothing happens)
//! 3. Under the commit lock, run the reducer against a draft of its
//!    namespace state and splice the result into a new root
//! 4. Publish the new root, release the lock, notify subscribers
//! 5. Run listener actions that target the path, each as its own commit
//!
//! A failing reducer aborts step 3; the previous root stays current.
//! Every commit bumps the version, and subscribers are notified with it so
//! a late notification for an older root is ignored.

use crate::compiler::ActionDef;
use crate::error::{Error, Result};
use crate::subscription::SubscriptionRegistry;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::sync::Arc;
use strata_core::{Path, Value};

// Stores with a reducer currently running on this thread
thread_local! {
    static REDUCING: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// Marks a store as reducing on the current thread for the guard's lifetime
struct ReducingGuard;

impl ReducingGuard {
    fn enter(store_id: u64) -> Self {
        REDUCING.with(|stack| stack.borrow_mut().push(store_id));
        ReducingGuard
    }

    fn is_active(store_id: u64) -> bool {
        REDUCING.with(|stack| stack.borrow().contains(&store_id))
    }
}

impl Drop for ReducingGuard {
    fn drop(&mut self) {
        REDUCING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// An action recorded while `mock_actions` is enabled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockedAction {
    pub path: Path,
    pub payload: Value,
}

/// A published root and the commit that produced it
#[derive(Clone)]
pub(crate) struct Snapshot {
    pub version: u64,
    pub root: Value,
}

pub(crate) struct Dispatcher {
    store_id: u64,
    name: String,
    devtools: bool,
    mock_actions: bool,
    actions: IndexMap<Path, Arc<ActionDef>>,
    listeners: IndexMap<Path, Vec<Arc<ActionDef>>>,
    /// The current root; replaced wholesale on every commit
    current: RwLock<Snapshot>,
    /// Serializes commits (single writer)
    commit: Mutex<()>,
    mocked: Mutex<Vec<MockedAction>>,
}

impl Dispatcher {
    pub fn new(
        store_id: u64,
        name: String,
        devtools: bool,
        mock_actions: bool,
        initial_state: Value,
        actions: IndexMap<Path, Arc<ActionDef>>,
        listeners: IndexMap<Path, Vec<Arc<ActionDef>>>,
    ) -> Self {
        Self {
            store_id,
            name,
            devtools,
            mock_actions,
            actions,
            listeners,
            current: RwLock::new(Snapshot {
                version: 0,
                root: initial_state,
            }),
            commit: Mutex::new(()),
            mocked: Mutex::new(Vec::new()),
        }
    }

    /// The current root state
    pub fn state(&self) -> Value {
        self.current.read().root.clone()
    }

    /// The current root together with its version
    pub fn snapshot(&self) -> Snapshot {
        self.current.read().clone()
    }

    /// Number of commits so far
    pub fn version(&self) -> u64 {
        self.current.read().version
    }

    pub fn action_paths(&self) -> impl Iterator<Item = &Path> {
        self.actions.keys()
    }

    pub fn mocked_actions(&self) -> Vec<MockedAction> {
        self.mocked.lock().clone()
    }

    pub fn clear_mocked_actions(&self) {
        self.mocked.lock().clear();
    }

    /// Dispatch an action and return the root state it produced
    ///
    /// A failing listener does not undo the commit of its target; it is
    /// logged and skipped.
    pub fn dispatch(
        &self,
        path: Path,
        payload: Value,
        subscribers: &SubscriptionRegistry,
    ) -> Result<Value> {
        if ReducingGuard::is_active(self.store_id) {
            tracing::warn!(store = %self.name, action = %path, "dispatch from inside a reducer rejected");
            return Err(Error::Reentrancy(path));
        }

        let action = self
            .actions
            .get(&path)
            .cloned()
            .ok_or_else(|| Error::UnknownAction(path.clone()))?;

        if self.mock_actions {
            tracing::debug!(store = %self.name, action = %path, "action mocked");
            self.mocked.lock().push(MockedAction { path, payload });
            return Ok(self.state());
        }

        let mut root = match self.commit(&action, &payload)? {
            Some(next) => {
                subscribers.notify(next.version, &next.root);
                next.root
            }
            None => return Ok(self.state()),
        };

        if let Some(listeners) = self.listeners.get(&path) {
            let target = Value::object([("type", Value::from(path.to_string())), ("payload", payload)]);
            for listener in listeners {
                match self.commit(listener, &target) {
                    Ok(Some(next)) => {
                        subscribers.notify(next.version, &next.root);
                        root = next.root;
                    }
                    Ok(None) => {}
                    Err(error) => tracing::warn!(
                        store = %self.name,
                        action = %path,
                        listener = %listener.path,
                        %error,
                        "listener failed; target commit stands"
                    ),
                }
            }
        }

        Ok(root)
    }

    /// Run one reducer and publish its result
    ///
    /// Returns `None` when the reducer changed nothing.
    fn commit(&self, action: &ActionDef, payload: &Value) -> Result<Option<Snapshot>> {
        let _commit = self.commit.lock();
        let current = self.state();
        let substate = current
            .get_path(&action.namespace)
            .cloned()
            .unwrap_or_else(Value::empty_map);

        let reduced = {
            let _reducing = ReducingGuard::enter(self.store_id);
            action.reducer.apply(substate, payload)
        };
        let next_substate = match reduced {
            Ok(Some(next)) => next,
            Ok(None) => {
                tracing::debug!(store = %self.name, action = %action.path, "action left state unchanged");
                return Ok(None);
            }
            Err(source) => {
                tracing::warn!(store = %self.name, action = %action.path, error = %source, "reducer failed");
                return Err(Error::Reducer {
                    path: action.path.clone(),
                    source,
                });
            }
        };

        if next_substate.as_map().is_none() {
            return Err(Error::Reducer {
                path: action.path.clone(),
                source: strata_core::Error::TypeMismatch {
                    path: action.namespace.to_string(),
                    expected: "map",
                    got: next_substate.type_name(),
                },
            });
        }

        let next = if action.namespace.is_root() {
            next_substate
        } else {
            let mut next = current;
            next.set_path(&action.namespace, next_substate)?;
            next
        };

        let snapshot = {
            let mut published = self.current.write();
            published.version += 1;
            published.root = next;
            published.clone()
        };
        let version = snapshot.version;

        tracing::debug!(store = %self.name, action = %action.path, version, "action committed");
        if self.devtools {
            tracing::trace!(
                target: "strata::devtools",
                store = %self.name,
                action = %action.path,
                version,
                state = %snapshot.root,
                "commit"
            );
        }

        Ok(Some(snapshot))
    }
}
