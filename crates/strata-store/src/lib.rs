//! Strata Store - Model-driven state container
//!
//! A store is built from a declarative model: a nested object whose leaves
//! are plain state, actions, listeners, computed values and thunks. The
//! model is compiled once into flat path indexes; after that every dispatch
//! is a lookup plus one copy-on-write commit.
//!
//! ## Architecture
//!
//! ```text
//! Descriptor ──walk──▶ ModelNode ──compile──▶ CompiledModel
//!                                                  │
//!                    Store (cheap Clone handle) ◀──┘
//!                     │
//!                     ├── Dispatcher      ← single writer, commit + notify
//!                     ├── ComputedEngine  ← memoized derived values
//!                     ├── ThunkRunner     ← async side effects
//!                     └── SubscriptionRegistry
//! ```
//!
//! ## Key Components
//!
//! - [`Store`]: handle to one state tree; see [`create_store`]
//! - [`model`]: descriptor builders ([`model::object`], [`model::action`], ...)
//! - [`StoreConfig`]: creation options, loadable from RON
//! - [`ThunkHandle`]: what a running thunk can do to its store
//!
//! ## Design Principles
//!
//! 1. **States are values** - a committed tree is never mutated; unchanged
//!    subtrees are shared between versions
//! 2. **Reducers are synchronous** - side effects belong in thunks
//! 3. **No global store** - every store is an explicit instance

mod compiler;
mod computed;
mod config;
mod dispatch;
mod error;
pub mod model;
mod store;
mod subscription;
mod thunk;

pub use config::{StoreConfig, DEFAULT_THUNK_STATUS_CAPACITY};
pub use dispatch::MockedAction;
pub use error::{BoxError, Error, Result};
pub use model::{Descriptor, ModelNode};
pub use store::{create_store, Store};
pub use subscription::{Subscription, SubscriptionId};
pub use thunk::{InvocationId, ThunkCall, ThunkHandle, ThunkMeta, ThunkStatus};

// Re-export the data layer so users need a single dependency
pub use strata_core::{Draft, Path, Value, ValueMap};
