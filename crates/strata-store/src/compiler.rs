//! Store compiler
//!
//! Turns a classified model into the pieces a store runs on: the initial
//! state tree and flat path indexes for actions, listeners, computed values
//! and thunks. Runs once per store; dispatch never walks the model again.

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::model::{ComputedDef, ModelNode, Reducer, ThunkFn};
use indexmap::IndexMap;
use std::sync::Arc;
use strata_core::{Path, Value, ValueMap};

/// A registered action (or listener)
pub(crate) struct ActionDef {
    /// Qualified path of the action itself
    pub path: Path,
    /// Namespace whose state the reducer receives
    pub namespace: Path,
    pub reducer: Reducer,
}

/// A registered computed value
pub(crate) struct ComputedEntry {
    pub namespace: Path,
    pub def: ComputedDef,
}

/// A registered thunk
pub(crate) struct ThunkDef {
    pub path: Path,
    pub namespace: Path,
    pub body: ThunkFn,
}

/// Output of [`compile`]
pub(crate) struct CompiledModel {
    pub initial_state: Value,
    pub actions: IndexMap<Path, Arc<ActionDef>>,
    /// Listeners keyed by the action path they react to
    pub listeners: IndexMap<Path, Vec<Arc<ActionDef>>>,
    pub computed: IndexMap<Path, ComputedEntry>,
    pub thunks: IndexMap<Path, ThunkDef>,
}

struct PendingListener {
    targets: Vec<Path>,
    def: Arc<ActionDef>,
}

#[derive(Default)]
struct Collector {
    actions: IndexMap<Path, Arc<ActionDef>>,
    listeners: Vec<PendingListener>,
    computed: IndexMap<Path, ComputedEntry>,
    thunks: IndexMap<Path, ThunkDef>,
}

/// Compile a classified model
pub(crate) fn compile(root: ModelNode, config: &StoreConfig) -> Result<CompiledModel> {
    let children = match root {
        ModelNode::Namespace(children) => children,
        other => {
            return Err(Error::schema(
                Path::root(),
                format!("model root must be a namespace, found {}", other.kind()),
            ))
        }
    };

    let mut collector = Collector::default();
    let initial_state = collector.namespace(
        children,
        &Path::root(),
        config.initial_state(),
        config.draft_mode(),
    )?;

    let mut listeners: IndexMap<Path, Vec<Arc<ActionDef>>> = IndexMap::new();
    for pending in collector.listeners {
        for target in pending.targets {
            if !collector.actions.contains_key(&target) {
                return Err(Error::schema(
                    pending.def.path.clone(),
                    format!("listener targets unknown action `{}`", target),
                ));
            }
            listeners
                .entry(target)
                .or_default()
                .push(Arc::clone(&pending.def));
        }
    }

    tracing::debug!(
        store = config.name(),
        actions = collector.actions.len(),
        listeners = listeners.values().map(Vec::len).sum::<usize>(),
        computed = collector.computed.len(),
        thunks = collector.thunks.len(),
        "model compiled"
    );

    Ok(CompiledModel {
        initial_state,
        actions: collector.actions,
        listeners,
        computed: collector.computed,
        thunks: collector.thunks,
    })
}

impl Collector {
    /// Index the behavior of a namespace and build its initial state
    fn namespace(
        &mut self,
        children: IndexMap<String, ModelNode>,
        path: &Path,
        overrides: Option<&Value>,
        draft_mode: bool,
    ) -> Result<Value> {
        let overrides = match overrides {
            Some(Value::Map(map)) => Some(map.as_ref()),
            Some(other) => {
                tracing::warn!(
                    path = %path,
                    found = other.type_name(),
                    "initial state override for a namespace must be a map; ignored"
                );
                None
            }
            None => None,
        };
        if let Some(overrides) = overrides {
            for key in overrides.keys() {
                match children.get(key) {
                    Some(ModelNode::State(_)) | Some(ModelNode::Namespace(_)) => {}
                    Some(node) => tracing::warn!(
                        path = %path.child(key.clone()),
                        kind = node.kind(),
                        "initial state override targets a non-state node; ignored"
                    ),
                    None => tracing::warn!(
                        path = %path.child(key.clone()),
                        "initial state override has no matching state path; ignored"
                    ),
                }
            }
        }

        let mut state = ValueMap::new();
        for (key, node) in children {
            let child_path = path.child(key.clone());
            let child_override = overrides.and_then(|o| o.get(&key));
            match node {
                ModelNode::State(declared) => {
                    let value = child_override.cloned().unwrap_or(declared);
                    state.insert(key, value);
                }
                ModelNode::Namespace(grandchildren) => {
                    let value =
                        self.namespace(grandchildren, &child_path, child_override, draft_mode)?;
                    state.insert(key, value);
                }
                ModelNode::Action(reducer) => {
                    check_draft_mode(&reducer, &child_path, draft_mode)?;
                    self.actions.insert(
                        child_path.clone(),
                        Arc::new(ActionDef {
                            path: child_path,
                            namespace: path.clone(),
                            reducer,
                        }),
                    );
                }
                ModelNode::Listener { targets, reducer } => {
                    check_draft_mode(&reducer, &child_path, draft_mode)?;
                    self.listeners.push(PendingListener {
                        targets,
                        def: Arc::new(ActionDef {
                            path: child_path,
                            namespace: path.clone(),
                            reducer,
                        }),
                    });
                }
                ModelNode::Computed(def) => {
                    self.computed.insert(
                        child_path,
                        ComputedEntry {
                            namespace: path.clone(),
                            def,
                        },
                    );
                }
                ModelNode::Thunk(body) => {
                    self.thunks.insert(
                        child_path.clone(),
                        ThunkDef {
                            path: child_path,
                            namespace: path.clone(),
                            body,
                        },
                    );
                }
            }
        }
        Ok(state.into())
    }
}

fn check_draft_mode(reducer: &Reducer, path: &Path, draft_mode: bool) -> Result<()> {
    if reducer.is_mutation_style() && !draft_mode {
        return Err(Error::schema(
            path.clone(),
            "mutation-style reducer requires draft mode",
        ));
    }
    Ok(())
}
