//! Prototype cache invalidation registry
//!
//! Caching a prototype-chain hit caches information that actions on an
//! *unrelated* object can invalidate. This registry is the context
//! group's index from property key to the shapes whose cache holds a
//! prototype-derived entry for that key. Every code path that adds,
//! deletes, or reconfigures a property — on any object — consults it
//! before returning.
//!
//! Shape references are weak and never deregistered at destruction time;
//! lookups tolerate dangling entries by skipping them.

use std::cell::RefCell;

use rustc_hash::FxHashMap;

use crate::gc::{GcRef, WeakRef};
use crate::key::KeyId;
use crate::shape::Shape;

/// Index from property key to shapes with prototype-derived cache
/// entries for that key.
pub struct ProtoCacheRegistry {
    shapes_by_key: RefCell<FxHashMap<KeyId, Vec<WeakRef<Shape>>>>,
}

impl ProtoCacheRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            shapes_by_key: RefCell::new(FxHashMap::default()),
        }
    }

    /// Register `shape` as holding a prototype-derived cache entry for
    /// `key`. Idempotent per (key, shape) pair.
    pub(crate) fn register(&self, key: KeyId, shape: &GcRef<Shape>) {
        let mut map = self.shapes_by_key.borrow_mut();
        let shapes = map.entry(key).or_default();
        if shapes
            .iter()
            .filter_map(WeakRef::upgrade)
            .any(|existing| GcRef::ptr_eq(&existing, shape))
        {
            return;
        }
        shapes.push(GcRef::downgrade(shape));
    }

    /// A property with `key` was added, deleted, or reconfigured
    /// somewhere: clear every registered shape's prototype-derived cache
    /// entry for it.
    ///
    /// The key's set is drained; shapes re-register on their next
    /// prototype-derived cache population.
    pub fn invalidate(&self, key: KeyId) {
        let Some(shapes) = self.shapes_by_key.borrow_mut().remove(&key) else {
            return;
        };
        tracing::debug!(
            key = key.as_u32(),
            registered = shapes.len(),
            "invalidating prototype-derived cache entries"
        );
        for shape in shapes.iter().filter_map(WeakRef::upgrade) {
            shape.clear_cached_prototype_entry(key);
        }
    }

    /// Clear every prototype-derived cache entry in the group. Used on
    /// context teardown and bulk mutations such as prototype swaps.
    pub fn invalidate_all(&self) {
        let map = std::mem::take(&mut *self.shapes_by_key.borrow_mut());
        for (key, shapes) in map {
            for shape in shapes.iter().filter_map(WeakRef::upgrade) {
                shape.clear_cached_prototype_entry(key);
            }
        }
    }

    /// Number of keys with registered shapes. Diagnostics only.
    pub fn registered_key_count(&self) -> usize {
        self.shapes_by_key.borrow().len()
    }
}

impl Default for ProtoCacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}
