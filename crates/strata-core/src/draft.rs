//! Copy-on-write drafts for mutation-style reducers
//!
//! A reducer receives a `Draft` over the substate it owns. The draft starts as
//! an O(1) clone of the published value; the first write to a node copies that
//! node (and only the nodes above it), so the published tree is never touched.
//! When the reducer returns, the dispatcher commits the draft if it was
//! written to and discards it otherwise.

use crate::error::{Error, Result};
use crate::path::Path;
use crate::value::{Value, ValueMap};

/// Mutable scratch copy of a substate
#[derive(Debug, Clone)]
pub struct Draft {
    value: Value,
    dirty: bool,
}

impl Draft {
    /// Create a draft over a published value
    pub fn new(value: Value) -> Self {
        Self {
            value,
            dirty: false,
        }
    }

    /// Read the current draft value
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Mutable access to the whole draft
    ///
    /// Marks the draft as written even if the caller ends up not changing
    /// anything.
    pub fn value_mut(&mut self) -> &mut Value {
        self.dirty = true;
        &mut self.value
    }

    /// Whether anything was written to the draft
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Consume the draft
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Read a field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.value.get(key)
    }

    /// Read a nested field
    pub fn get_path(&self, path: impl Into<Path>) -> Option<&Value> {
        self.value.get_path(&path.into())
    }

    /// Read a field that must be an integer
    pub fn int(&self, key: &str) -> Result<i64> {
        let value = self.require(key)?;
        value.as_int().ok_or_else(|| Error::TypeMismatch {
            path: key.to_string(),
            expected: "int",
            got: value.type_name(),
        })
    }

    /// Read a field that must be a number
    pub fn float(&self, key: &str) -> Result<f64> {
        let value = self.require(key)?;
        value.as_float().ok_or_else(|| Error::TypeMismatch {
            path: key.to_string(),
            expected: "float",
            got: value.type_name(),
        })
    }

    /// Read a field that must be a boolean
    pub fn bool(&self, key: &str) -> Result<bool> {
        let value = self.require(key)?;
        value.as_bool().ok_or_else(|| Error::TypeMismatch {
            path: key.to_string(),
            expected: "bool",
            got: value.type_name(),
        })
    }

    /// Read a field that must be a string
    pub fn str(&self, key: &str) -> Result<&str> {
        let value = self.require(key)?;
        value.as_str().ok_or_else(|| Error::TypeMismatch {
            path: key.to_string(),
            expected: "string",
            got: value.type_name(),
        })
    }

    /// Set a field
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        self.fields_mut()?.insert(key.into(), value.into());
        Ok(())
    }

    /// Set a nested field, creating intermediate maps
    pub fn set_path(&mut self, path: impl Into<Path>, value: impl Into<Value>) -> Result<()> {
        let path = path.into();
        self.dirty = true;
        self.value.set_path(&path, value.into())
    }

    /// Edit a field in place
    pub fn update<R>(&mut self, key: &str, f: impl FnOnce(&mut Value) -> R) -> Result<R> {
        let field = self
            .fields_mut()?
            .get_mut(key)
            .ok_or_else(|| Error::MissingField(key.to_string()))?;
        Ok(f(field))
    }

    /// Add `delta` to an integer field
    ///
    /// Fails without writing if the sum does not fit in an `i64`.
    pub fn increment(&mut self, key: &str, delta: i64) -> Result<i64> {
        let current = self.int(key)?;
        let next = current.checked_add(delta).ok_or_else(|| {
            Error::custom(format!("`{}` overflowed: {} + {}", key, current, delta))
        })?;
        self.set(key, next)?;
        Ok(next)
    }

    /// Append to a list field
    pub fn push(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.update(key, |field| field.push(value))?
            .map_err(|_| Error::NotAContainer {
                path: key.to_string(),
                found: self.value.get(key).map(Value::type_name).unwrap_or("null"),
            })
    }

    /// Remove a field
    pub fn remove(&mut self, key: &str) -> Result<Option<Value>> {
        Ok(self.fields_mut()?.shift_remove(key))
    }

    /// Replace the whole draft
    pub fn replace(&mut self, value: impl Into<Value>) {
        self.dirty = true;
        self.value = value.into();
    }

    fn require(&self, key: &str) -> Result<&Value> {
        self.value
            .get(key)
            .ok_or_else(|| Error::MissingField(key.to_string()))
    }

    fn fields_mut(&mut self) -> Result<&mut ValueMap> {
        let found = self.value.type_name();
        self.dirty = true;
        self.value.map_mut().ok_or(Error::NotAContainer {
            path: String::new(),
            found,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> Value {
        Value::object([
            ("count", Value::Int(0)),
            ("todos", Value::list(["a"])),
            ("meta", Value::object([("owner", "me")])),
        ])
    }

    #[test]
    fn test_untouched_draft_is_clean() {
        let published = counter();
        let draft = Draft::new(published.clone());
        assert!(!draft.is_dirty());
        assert_eq!(draft.int("count").unwrap(), 0);
        assert!(draft.into_value().ptr_eq(&published));
    }

    #[test]
    fn test_writes_do_not_leak_into_published_value() {
        let published = counter();
        let mut draft = Draft::new(published.clone());

        draft.increment("count", 1).unwrap();
        draft.push("todos", "b").unwrap();

        assert!(draft.is_dirty());
        assert_eq!(published.get("count"), Some(&Value::Int(0)));
        assert_eq!(published.get("todos").and_then(Value::as_list).map(<[Value]>::len), Some(1));

        let next = draft.into_value();
        assert_eq!(next.get("count"), Some(&Value::Int(1)));
        assert_eq!(next.get("todos").and_then(Value::as_list).map(<[Value]>::len), Some(2));
        // Untouched subtree keeps its allocation
        assert!(next.get("meta").unwrap().ptr_eq(published.get("meta").unwrap()));
    }

    #[test]
    fn test_type_errors() {
        let draft = Draft::new(counter());
        assert!(matches!(
            draft.int("todos"),
            Err(Error::TypeMismatch { expected: "int", got: "list", .. })
        ));
        assert!(matches!(draft.int("missing"), Err(Error::MissingField(_))));
    }

    #[test]
    fn test_increment_overflow_is_an_error() {
        let mut draft = Draft::new(Value::object([("count", 1)]));
        let err = draft.increment("count", i64::MAX).unwrap_err();
        assert!(matches!(err, Error::Custom(ref msg) if msg.contains("overflowed")));
        assert!(!draft.is_dirty());
        assert_eq!(draft.int("count").unwrap(), 1);

        assert_eq!(draft.increment("count", -1).unwrap(), 0);
    }

    #[test]
    fn test_push_onto_scalar_fails() {
        let mut draft = Draft::new(counter());
        let err = draft.push("count", 1).unwrap_err();
        assert!(matches!(err, Error::NotAContainer { found: "int", .. }));
    }

    #[test]
    fn test_set_path_and_replace() {
        let mut draft = Draft::new(counter());
        draft.set_path("meta.owner", "you").unwrap();
        assert_eq!(draft.get_path("meta.owner"), Some(&Value::from("you")));

        draft.replace(Value::object([("count", 9)]));
        assert_eq!(draft.int("count").unwrap(), 9);
        assert!(draft.get("todos").is_none());
    }
}
