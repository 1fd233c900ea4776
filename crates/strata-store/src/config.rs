//! Store configuration
//!
//! Options recognized when a store is created. Every field has a default, so a
//! config can be built in code with the `with_*` methods or loaded from a
//! partial RON document.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use strata_core::Value;

/// Configuration for a store
///
/// # Example
///
/// ```
/// use strata_store::StoreConfig;
///
/// let config = StoreConfig::from_ron(r#"(name: "todos", mock_actions: true)"#).unwrap();
/// assert_eq!(config.name(), "todos");
/// assert!(config.mock_actions());
/// assert!(config.draft_mode());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Name used in log events
    name: String,

    /// Overrides the model's declared initial state at matching paths
    initial_state: Option<Value>,

    /// Whether reducers may edit a draft in place
    ///
    /// When disabled, only return-style reducers are accepted.
    draft_mode: bool,

    /// Emit every committed state tree as a TRACE event
    devtools: bool,

    /// Record dispatched actions instead of running their reducers
    mock_actions: bool,

    /// Value handed to every thunk through its handle
    injections: Value,

    /// How many settled thunk invocations keep a queryable status
    ///
    /// Pending invocations are always tracked; beyond this many settled
    /// ones, the oldest is forgotten.
    thunk_status_capacity: usize,
}

/// Default number of settled thunk statuses kept per store
pub const DEFAULT_THUNK_STATUS_CAPACITY: usize = 1024;

impl StoreConfig {
    /// Parse a config from RON text
    pub fn from_ron(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }

    /// Set the store name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Override initial state
    pub fn with_initial_state(mut self, state: impl Into<Value>) -> Self {
        self.initial_state = Some(state.into());
        self
    }

    /// Enable or disable draft-based reducers
    pub fn with_draft_mode(mut self, enabled: bool) -> Self {
        self.draft_mode = enabled;
        self
    }

    /// Enable the devtools inspection hook
    pub fn with_devtools(mut self, enabled: bool) -> Self {
        self.devtools = enabled;
        self
    }

    /// Enable action mocking
    pub fn with_mock_actions(mut self, enabled: bool) -> Self {
        self.mock_actions = enabled;
        self
    }

    /// Set the thunk injections
    pub fn with_injections(mut self, injections: impl Into<Value>) -> Self {
        self.injections = injections.into();
        self
    }

    /// Set how many settled thunk statuses are kept
    pub fn with_thunk_status_capacity(mut self, capacity: usize) -> Self {
        self.thunk_status_capacity = capacity;
        self
    }

    /// Get the store name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the initial state override, if any
    pub fn initial_state(&self) -> Option<&Value> {
        self.initial_state.as_ref()
    }

    /// Check whether mutation-style reducers are accepted
    pub fn draft_mode(&self) -> bool {
        self.draft_mode
    }

    /// Check whether commits are emitted for inspection
    pub fn devtools(&self) -> bool {
        self.devtools
    }

    /// Check whether actions are recorded instead of run
    pub fn mock_actions(&self) -> bool {
        self.mock_actions
    }

    /// Get the value handed to thunks
    pub fn injections(&self) -> &Value {
        &self.injections
    }

    /// Get the number of settled thunk statuses kept
    pub fn thunk_status_capacity(&self) -> usize {
        self.thunk_status_capacity
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "strata".to_string(),
            initial_state: None,
            draft_mode: true,
            devtools: false,
            mock_actions: false,
            injections: Value::Null,
            thunk_status_capacity: DEFAULT_THUNK_STATUS_CAPACITY,
        }
    }
}
