//! Computed engine
//!
//! Lazily evaluates derived values and memoizes them against their
//! dependencies:
//! - with explicit selectors, each selector result is compared by reference
//!   (`Value::ptr_eq`) to the one seen at the last evaluation;
//! - without selectors the root state reference is the dependency, so the
//!   value is recomputed after every commit. This is a known performance
//!   cliff for large trees; declare selectors for expensive derivations.

use crate::compiler::ComputedEntry;
use crate::error::{Error, Result};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use strata_core::{Path, Value};

enum Dependencies {
    Root(Value),
    Selected(Vec<Value>),
}

impl Dependencies {
    fn unchanged(&self, other: &Dependencies) -> bool {
        match (self, other) {
            (Dependencies::Root(a), Dependencies::Root(b)) => a.ptr_eq(b),
            (Dependencies::Selected(a), Dependencies::Selected(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.ptr_eq(y))
            }
            _ => false,
        }
    }
}

struct CacheEntry {
    dependencies: Dependencies,
    result: Value,
}

struct ComputedSlot {
    entry: ComputedEntry,
    cache: Mutex<Option<CacheEntry>>,
    recomputations: AtomicU64,
}

pub(crate) struct ComputedEngine {
    slots: IndexMap<Path, ComputedSlot>,
}

impl ComputedEngine {
    pub fn new(entries: IndexMap<Path, ComputedEntry>) -> Self {
        Self {
            slots: entries
                .into_iter()
                .map(|(path, entry)| {
                    (
                        path,
                        ComputedSlot {
                            entry,
                            cache: Mutex::new(None),
                            recomputations: AtomicU64::new(0),
                        },
                    )
                })
                .collect(),
        }
    }

    /// Get the value at `path` for the given root state
    pub fn get(&self, path: &Path, root: &Value) -> Result<Value> {
        let slot = self
            .slots
            .get(path)
            .ok_or_else(|| Error::UnknownComputed(path.clone()))?;

        let dependencies = match &slot.entry.def.selectors {
            Some(selectors) => Dependencies::Selected(selectors.iter().map(|s| s(root)).collect()),
            None => Dependencies::Root(root.clone()),
        };

        if let Some(cached) = slot.cache.lock().as_ref() {
            if cached.dependencies.unchanged(&dependencies) {
                return Ok(cached.result.clone());
            }
        }

        // The lock is not held while deriving so a derive function may read
        // other computed values.
        let parent = root
            .get_path(&slot.entry.namespace)
            .cloned()
            .unwrap_or_default();
        let result = (slot.entry.def.derive)(&parent, root).map_err(|source| Error::Computed {
            path: path.clone(),
            source,
        })?;

        let count = slot.recomputations.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::trace!(computed = %path, recomputations = count, "computed value refreshed");

        *slot.cache.lock() = Some(CacheEntry {
            dependencies,
            result: result.clone(),
        });
        Ok(result)
    }

    /// How many times the derive function at `path` has run
    pub fn recomputations(&self, path: &Path) -> Option<u64> {
        self.slots
            .get(path)
            .map(|slot| slot.recomputations.load(Ordering::Relaxed))
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.slots.keys()
    }
}
