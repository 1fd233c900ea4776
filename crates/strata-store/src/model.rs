//! Model descriptors and the walker that classifies them
//!
//! A model is authored as a tree of [`Descriptor`]s. Plain values and objects
//! describe state; the builder functions ([`action`], [`computed`], [`thunk`],
//! ...) tag a leaf with the kind of behavior it carries. [`walk`] turns the
//! authored tree into a [`ModelNode`] tree once, so nothing is classified at
//! dispatch time.
//!
//! ```
//! use strata_store::model::{action, computed, object, state};
//!
//! let model = object([
//!     ("count", state(0)),
//!     ("increment", action(|draft, _payload| {
//!         draft.increment("count", 1)?;
//!         Ok(())
//!     })),
//!     ("double", computed(|counter, _root| {
//!         Ok((counter.get("count").and_then(|v| v.as_int()).unwrap_or(0) * 2).into())
//!     })),
//! ]);
//! # let _ = model;
//! ```

use crate::error::{BoxError, Error, Result};
use crate::thunk::ThunkHandle;
use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use strata_core::{Draft, Path, Value};

/// Mutation-style reducer body
pub type MutateFn = Arc<dyn Fn(&mut Draft, &Value) -> strata_core::Result<()> + Send + Sync>;

/// Return-style reducer body
pub type ReplaceFn = Arc<dyn Fn(&Value, &Value) -> strata_core::Result<Value> + Send + Sync>;

/// Derive function of a computed value: `(parent state, root state)`
pub type DeriveFn = Arc<dyn Fn(&Value, &Value) -> strata_core::Result<Value> + Send + Sync>;

/// Extracts a slice of the root state
pub type Selector = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Future returned by a thunk body
pub type ThunkFuture = BoxFuture<'static, std::result::Result<Value, BoxError>>;

/// Thunk body
pub type ThunkFn = Arc<dyn Fn(ThunkHandle, Value) -> ThunkFuture + Send + Sync>;

/// Update logic attached to an action
#[derive(Clone)]
pub enum Reducer {
    /// Edits a draft of the owning namespace's state
    Mutate(MutateFn),
    /// Returns the new state of the owning namespace
    Replace(ReplaceFn),
}

impl Reducer {
    /// Run the reducer against `substate`
    ///
    /// Returns `None` when the reducer left the substate as it was.
    pub(crate) fn apply(&self, substate: Value, payload: &Value) -> strata_core::Result<Option<Value>> {
        match self {
            Reducer::Mutate(f) => {
                let mut draft = Draft::new(substate);
                f(&mut draft, payload)?;
                Ok(draft.is_dirty().then(|| draft.into_value()))
            }
            Reducer::Replace(f) => {
                let next = f(&substate, payload)?;
                Ok((!next.ptr_eq(&substate)).then_some(next))
            }
        }
    }

    /// Whether this reducer needs draft mode
    pub fn is_mutation_style(&self) -> bool {
        matches!(self, Reducer::Mutate(_))
    }
}

/// A derived value and its optional explicit dependencies
#[derive(Clone)]
pub struct ComputedDef {
    pub(crate) derive: DeriveFn,
    pub(crate) selectors: Option<Vec<Selector>>,
}

impl ComputedDef {
    /// Whether the value only depends on the root reference
    pub fn is_coarse(&self) -> bool {
        self.selectors.is_none()
    }
}

/// An authored model node
pub enum Descriptor {
    /// Plain state
    Value(Value),
    /// Nested namespace
    Object(IndexMap<String, Descriptor>),
    /// List of descriptors; only plain elements are allowed
    List(Vec<Descriptor>),
    /// Action leaf
    Action(Reducer),
    /// Action that runs after any of `targets` commits
    Listener { targets: Vec<Path>, reducer: Reducer },
    /// Computed leaf
    Computed(ComputedDef),
    /// Thunk leaf
    Thunk(ThunkFn),
}

impl Descriptor {
    fn kind(&self) -> &'static str {
        match self {
            Descriptor::Value(_) => "state",
            Descriptor::Object(_) => "object",
            Descriptor::List(_) => "list",
            Descriptor::Action(_) => "action",
            Descriptor::Listener { .. } => "listener",
            Descriptor::Computed(_) => "computed",
            Descriptor::Thunk(_) => "thunk",
        }
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Descriptor::Value(v) => write!(f, "Value({})", v),
            Descriptor::Object(children) => f.debug_map().entries(children.iter()).finish(),
            Descriptor::List(items) => f.debug_list().entries(items.iter()).finish(),
            other => write!(f, "<{}>", other.kind()),
        }
    }
}

macro_rules! descriptor_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Descriptor {
                fn from(value: $ty) -> Self {
                    Descriptor::Value(value.into())
                }
            }
        )*
    };
}

descriptor_from_value!(Value, (), bool, i32, i64, u32, f32, f64, String, &str);

/// A classified model node
#[derive(Clone)]
pub enum ModelNode {
    State(Value),
    Action(Reducer),
    Listener { targets: Vec<Path>, reducer: Reducer },
    Computed(ComputedDef),
    Thunk(ThunkFn),
    Namespace(IndexMap<String, ModelNode>),
}

impl ModelNode {
    /// Name of the node kind
    pub fn kind(&self) -> &'static str {
        match self {
            ModelNode::State(_) => "state",
            ModelNode::Action(_) => "action",
            ModelNode::Listener { .. } => "listener",
            ModelNode::Computed(_) => "computed",
            ModelNode::Thunk(_) => "thunk",
            ModelNode::Namespace(_) => "namespace",
        }
    }

    /// Look up a node by path
    pub fn get(&self, path: &Path) -> Option<&ModelNode> {
        let mut current = self;
        for segment in path.segments() {
            match current {
                ModelNode::Namespace(children) => current = children.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }
}

impl fmt::Debug for ModelNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelNode::State(v) => write!(f, "State({})", v),
            ModelNode::Namespace(children) => f.debug_map().entries(children.iter()).finish(),
            other => write!(f, "<{}>", other.kind()),
        }
    }
}

// ============================================================================
// Builders
// ============================================================================

/// A namespace from named children
pub fn object<K, D>(fields: impl IntoIterator<Item = (K, D)>) -> Descriptor
where
    K: Into<String>,
    D: Into<Descriptor>,
{
    Descriptor::Object(
        fields
            .into_iter()
            .map(|(k, d)| (k.into(), d.into()))
            .collect(),
    )
}

/// A plain state leaf
pub fn state(value: impl Into<Value>) -> Descriptor {
    Descriptor::Value(value.into())
}

/// A list of descriptors
pub fn list<D: Into<Descriptor>>(items: impl IntoIterator<Item = D>) -> Descriptor {
    Descriptor::List(items.into_iter().map(Into::into).collect())
}

/// An action whose reducer edits a draft of its namespace state
pub fn action<F>(reducer: F) -> Descriptor
where
    F: Fn(&mut Draft, &Value) -> strata_core::Result<()> + Send + Sync + 'static,
{
    Descriptor::Action(Reducer::Mutate(Arc::new(reducer)))
}

/// An action whose reducer returns the new namespace state
pub fn action_returning<F>(reducer: F) -> Descriptor
where
    F: Fn(&Value, &Value) -> strata_core::Result<Value> + Send + Sync + 'static,
{
    Descriptor::Action(Reducer::Replace(Arc::new(reducer)))
}

/// An action that runs after any of `targets` commits
///
/// The reducer's payload is `{"type": <target path>, "payload": <target payload>}`.
pub fn action_on<P, F>(targets: impl IntoIterator<Item = P>, reducer: F) -> Descriptor
where
    P: Into<Path>,
    F: Fn(&mut Draft, &Value) -> strata_core::Result<()> + Send + Sync + 'static,
{
    Descriptor::Listener {
        targets: targets.into_iter().map(Into::into).collect(),
        reducer: Reducer::Mutate(Arc::new(reducer)),
    }
}

/// A computed value that depends on the whole root state
///
/// Without explicit selectors the cache is keyed on the root reference, so
/// the value is recomputed after every commit. Prefer [`computed_with`] for
/// anything expensive.
pub fn computed<F>(derive: F) -> Descriptor
where
    F: Fn(&Value, &Value) -> strata_core::Result<Value> + Send + Sync + 'static,
{
    Descriptor::Computed(ComputedDef {
        derive: Arc::new(derive),
        selectors: None,
    })
}

/// A computed value recomputed only when one of `selectors` changes reference
pub fn computed_with<S, F>(selectors: impl IntoIterator<Item = S>, derive: F) -> Descriptor
where
    S: Fn(&Value) -> Value + Send + Sync + 'static,
    F: Fn(&Value, &Value) -> strata_core::Result<Value> + Send + Sync + 'static,
{
    Descriptor::Computed(ComputedDef {
        derive: Arc::new(derive),
        selectors: Some(
            selectors
                .into_iter()
                .map(|s| Arc::new(s) as Selector)
                .collect(),
        ),
    })
}

/// A thunk leaf
pub fn thunk<F, Fut>(body: F) -> Descriptor
where
    F: Fn(ThunkHandle, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Value, BoxError>> + Send + 'static,
{
    let func: ThunkFn =
        Arc::new(move |handle: ThunkHandle, payload: Value| body(handle, payload).boxed());
    Descriptor::Thunk(func)
}

// ============================================================================
// Walker
// ============================================================================

/// Classify an authored model
///
/// The root must be an object. Behavior leaves are only allowed where a
/// single path segment can address them, i.e. directly inside objects.
pub fn walk(descriptor: Descriptor) -> Result<ModelNode> {
    match descriptor {
        Descriptor::Object(_) => walk_at(descriptor, &Path::root()),
        other => Err(Error::schema(
            Path::root(),
            format!("model root must be an object, found {}", other.kind()),
        )),
    }
}

fn walk_at(descriptor: Descriptor, path: &Path) -> Result<ModelNode> {
    Ok(match descriptor {
        Descriptor::Value(v) => ModelNode::State(v),
        Descriptor::Object(fields) => {
            let mut children = IndexMap::with_capacity(fields.len());
            for (key, child) in fields {
                validate_key(&key, path)?;
                let child_path = path.child(key.clone());
                children.insert(key, walk_at(child, &child_path)?);
            }
            ModelNode::Namespace(children)
        }
        Descriptor::List(items) => {
            let mut values = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                values.push(plain_value(item, &path.child(index.to_string()))?);
            }
            ModelNode::State(values.into())
        }
        Descriptor::Action(reducer) => ModelNode::Action(reducer),
        Descriptor::Listener { targets, reducer } => ModelNode::Listener { targets, reducer },
        Descriptor::Computed(def) => ModelNode::Computed(def),
        Descriptor::Thunk(body) => ModelNode::Thunk(body),
    })
}

/// Convert a descriptor inside a list into plain state
fn plain_value(descriptor: Descriptor, path: &Path) -> Result<Value> {
    match descriptor {
        Descriptor::Value(v) => Ok(v),
        Descriptor::Object(fields) => {
            let mut map = strata_core::ValueMap::with_capacity(fields.len());
            for (key, child) in fields {
                let child_path = path.child(key.clone());
                map.insert(key, plain_value(child, &child_path)?);
            }
            Ok(map.into())
        }
        Descriptor::List(items) => {
            let mut values = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                values.push(plain_value(item, &path.child(index.to_string()))?);
            }
            Ok(values.into())
        }
        other => Err(Error::schema(
            path.clone(),
            format!("{} cannot be declared inside a list", other.kind()),
        )),
    }
}

fn validate_key(key: &str, parent: &Path) -> Result<()> {
    if key.is_empty() {
        return Err(Error::schema(parent.clone(), "empty field name"));
    }
    if key.contains('.') {
        return Err(Error::schema(
            parent.child(key),
            "field names cannot contain `.`",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut Draft, _: &Value) -> strata_core::Result<()> {
        Ok(())
    }

    #[test]
    fn test_classifies_leaves() {
        let node = walk(object([
            ("count", state(0)),
            ("increment", action(noop)),
            ("double", computed(|_, _| Ok(Value::Null))),
            ("load", thunk(|_, _| async { Ok::<_, BoxError>(Value::Null) })),
            ("logged", action_on(["increment"], noop)),
            ("todos", object([("items", list([state("a"), state("b")]))])),
        ]))
        .unwrap();

        let kind = |p: &str| node.get(&Path::parse(p)).map(ModelNode::kind);
        assert_eq!(kind("count"), Some("state"));
        assert_eq!(kind("increment"), Some("action"));
        assert_eq!(kind("double"), Some("computed"));
        assert_eq!(kind("load"), Some("thunk"));
        assert_eq!(kind("logged"), Some("listener"));
        assert_eq!(kind("todos"), Some("namespace"));
        assert_eq!(kind("todos.items"), Some("state"));
        assert_eq!(kind("todos.missing"), None);
    }

    #[test]
    fn test_plain_list_becomes_state() {
        let node = walk(object([(
            "rows",
            list([object([("id", state(1))]), object([("id", state(2))])]),
        )]))
        .unwrap();

        match node.get(&Path::parse("rows")) {
            Some(ModelNode::State(Value::List(rows))) => {
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[1].get("id"), Some(&Value::Int(2)));
            }
            other => panic!("expected list state, got {:?}", other),
        }
    }

    #[test]
    fn test_action_inside_list_is_schema_error() {
        let err = walk(object([("items", list([state(1), action(noop)]))])).unwrap_err();
        match err {
            Error::Schema { path, .. } => assert_eq!(path, Path::parse("items.1")),
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_thunk_nested_in_list_object_is_schema_error() {
        let err = walk(object([(
            "items",
            list([object([("load", thunk(|_, _| async { Ok::<_, BoxError>(Value::Null) }))])]),
        )]))
        .unwrap_err();
        assert!(matches!(err, Error::Schema { ref path, .. } if path.to_string() == "items.0.load"));
    }

    #[test]
    fn test_root_must_be_object() {
        assert!(matches!(walk(state(1)), Err(Error::Schema { .. })));
        assert!(matches!(walk(action(noop)), Err(Error::Schema { .. })));
    }

    #[test]
    fn test_invalid_keys() {
        assert!(matches!(
            walk(object([("", state(1))])),
            Err(Error::Schema { .. })
        ));
        let err = walk(object([("a", object([("b.c", state(1))]))])).unwrap_err();
        assert!(matches!(err, Error::Schema { ref path, .. } if path.segments() == ["a", "b.c"]));
    }

    #[test]
    fn test_reducer_apply() {
        let mutate = Reducer::Mutate(Arc::new(|draft: &mut Draft, payload: &Value| {
            draft.set("n", payload.clone())
        }));
        let before = Value::object([("n", 1)]);
        let after = mutate.apply(before.clone(), &Value::Int(2)).unwrap();
        assert_eq!(after.and_then(|v| v.get("n").cloned()), Some(Value::Int(2)));

        let untouched = Reducer::Mutate(Arc::new(noop));
        assert_eq!(untouched.apply(before.clone(), &Value::Null).unwrap(), None);

        let identity = Reducer::Replace(Arc::new(|s: &Value, _: &Value| Ok(s.clone())));
        assert_eq!(identity.apply(before, &Value::Null).unwrap(), None);
    }
}
