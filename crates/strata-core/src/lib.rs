//! Strata Core - state values for a hierarchical store
//!
//! This crate provides the data layer shared by the strata runtime:
//! - Dynamic value types (`Value`, `ValueMap`) with reference-counted containers
//! - Dot-separated `Path` addressing into the model and state trees
//! - Copy-on-write `Draft`s that let reducers write mutation-style code
//!
//! ## Structural sharing
//!
//! A state tree is a `Value::Map`. Cloning it is O(1). Editing a clone copies
//! only the nodes on the edited spine, so consecutive trees share every
//! subtree the edit did not reach, and `Value::ptr_eq` tells whether a slice
//! was replaced.

mod draft;
mod error;
mod path;
mod value;

pub use draft::Draft;
pub use error::{Error, Result};
pub use indexmap::IndexMap;
pub use path::Path;
pub use value::{Value, ValueMap};
