//! Dynamic values that make up a state tree
//!
//! Containers are reference counted, so cloning a `Value` is O(1) and two
//! successive state trees share every subtree a commit did not touch.
//! Mutation goes through `Arc::make_mut`: a node is copied only when it is
//! still shared with a published tree.

use crate::error::{Error, Result};
use crate::path::Path;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A dynamic state value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Value {
    /// No value / null
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// List of values (shared)
    List(Arc<Vec<Value>>),
    /// Map of string keys to values (shared)
    Map(Arc<ValueMap>),
}

/// A map of string keys to dynamic values
///
/// Uses IndexMap to preserve insertion order (field order of the model)
pub type ValueMap = IndexMap<String, Value>;

impl Value {
    /// An empty map
    pub fn empty_map() -> Self {
        Value::Map(Arc::new(ValueMap::new()))
    }

    /// Build a map from key/value pairs
    pub fn object<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Map(Arc::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    /// Build a list from values
    pub fn list<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Value::List(Arc::new(items.into_iter().map(Into::into).collect()))
    }

    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get this value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get this value as an integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get this value as a float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get this value as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a list
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    /// Try to get this value as a map
    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Check if this value is truthy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(list) => !list.is_empty(),
            Value::Map(map) => !map.is_empty(),
        }
    }

    /// Look up a field of a map value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Walk a path through nested maps
    pub fn get_path(&self, path: &Path) -> Option<&Value> {
        let mut current = self;
        for segment in path.segments() {
            current = current.get(segment)?;
        }
        Some(current)
    }

    /// Reference identity for containers, value equality for scalars
    ///
    /// Two containers are `ptr_eq` only when they are the same allocation,
    /// i.e. no commit has replaced them in between.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        }
    }

    /// One level of structural comparison
    ///
    /// Containers are equal when they have the same length (and keys, in the
    /// same order) and each child is `ptr_eq` to its counterpart.
    pub fn shallow_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => {
                Arc::ptr_eq(a, b)
                    || (a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.ptr_eq(y)))
            }
            (Value::Map(a), Value::Map(b)) => {
                Arc::ptr_eq(a, b)
                    || (a.len() == b.len()
                        && a
                            .iter()
                            .zip(b.iter())
                            .all(|((ka, va), (kb, vb))| ka == kb && va.ptr_eq(vb)))
            }
            (a, b) => a.ptr_eq(b),
        }
    }

    /// Mutable access to the map payload, copying it if it is shared
    pub fn map_mut(&mut self) -> Option<&mut ValueMap> {
        match self {
            Value::Map(map) => Some(Arc::make_mut(map)),
            _ => None,
        }
    }

    /// Mutable access to the list payload, copying it if it is shared
    pub fn list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::List(list) => Some(Arc::make_mut(list)),
            _ => None,
        }
    }

    /// Mutable access to a field of a map value
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.map_mut().and_then(|map| map.get_mut(key))
    }

    /// Mutable access along a path through nested maps
    pub fn get_path_mut(&mut self, path: &Path) -> Option<&mut Value> {
        let mut current = self;
        for segment in path.segments() {
            current = current.get_mut(segment)?;
        }
        Some(current)
    }

    /// Insert a field into a map value, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<Option<Value>> {
        let found = self.type_name();
        let map = self.map_mut().ok_or_else(|| Error::NotAContainer {
            path: String::new(),
            found,
        })?;
        Ok(map.insert(key.into(), value.into()))
    }

    /// Remove a field from a map value, keeping the order of the others
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.map_mut().and_then(|map| map.shift_remove(key))
    }

    /// Append to a list value
    pub fn push(&mut self, value: impl Into<Value>) -> Result<()> {
        let found = self.type_name();
        let list = self.list_mut().ok_or_else(|| Error::NotAContainer {
            path: String::new(),
            found,
        })?;
        list.push(value.into());
        Ok(())
    }

    /// Replace the value at `path`, creating missing intermediate maps
    ///
    /// Only the maps along `path` are copied; every sibling subtree keeps
    /// its allocation.
    pub fn set_path(&mut self, path: &Path, value: Value) -> Result<()> {
        let mut current = self;
        for (depth, segment) in path.segments().iter().enumerate() {
            let found = current.type_name();
            let map = current.map_mut().ok_or_else(|| Error::NotAContainer {
                path: Path::from(path.segments()[..depth].to_vec()).to_string(),
                found,
            })?;
            current = map.entry(segment.clone()).or_insert_with(Value::empty_map);
        }
        *current = value;
        Ok(())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::List(list) => {
                write!(f, "[")?;
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

// Convenient From implementations
impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f as f64)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Self {
        Value::Map(Arc::new(map))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(vec: Vec<T>) -> Self {
        Value::List(Arc::new(vec.into_iter().map(Into::into).collect()))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}
