//! Per-shape property cache and call-site caches
//!
//! Every shape can lazily grow one [`PropertyCache`]: a small, fixed,
//! power-of-two table indexed by the low bits of the property key id. An
//! element remembers where the property lives (on the receiver, or on a
//! prototype via a non-owning back-reference) so repeated lookups skip the
//! descriptor search and the prototype-chain walk.
//!
//! A cache miss is never an error; callers fall through to the full
//! lookup. Elements recording a prototype-chain hit are cleared through
//! the invalidation registry when the key is mutated anywhere; elements
//! recording the receiver itself die with the shape on the next shape
//! transition and need no global invalidation.

use std::cell::{Cell, RefCell};

use crate::gc::{GcRef, WeakRef};
use crate::key::KeyId;
use crate::object::DynObject;
use crate::shape::Shape;
use crate::slots::SlotLocation;

/// Number of elements in a per-shape property cache. Must be a power of
/// two: elements are selected by `key & (NUM_ELEMENTS - 1)`.
pub(crate) const NUM_ELEMENTS: usize = 8;

#[derive(Clone, Default)]
struct CacheElement {
    /// Interned key this element caches, or `None` when empty.
    key: Option<KeyId>,
    slot: SlotLocation,
    is_settable: bool,
    is_missing: bool,
    /// Back-reference to the prototype that owns the property. `None`
    /// means the property lives on the receiver itself. Non-owning:
    /// a dead reference is treated as a miss.
    prototype: Option<WeakRef<DynObject>>,
}

/// Successful load probe: where to read the property from.
pub(crate) struct CachedLoad {
    pub slot: SlotLocation,
    pub is_settable: bool,
    pub is_missing: bool,
    /// Resolved owner when the entry is a prototype-chain hit.
    pub prototype: Option<GcRef<DynObject>>,
}

/// Successful store probe: where to write on the receiver.
pub(crate) struct CachedStore {
    pub slot: SlotLocation,
}

/// Fixed-size property cache attached to one shape.
pub(crate) struct PropertyCache {
    elements: [CacheElement; NUM_ELEMENTS],
}

#[inline]
fn element_index(key: KeyId) -> usize {
    key.as_u32() as usize & (NUM_ELEMENTS - 1)
}

impl PropertyCache {
    pub(crate) fn new() -> Self {
        Self {
            elements: Default::default(),
        }
    }

    /// Probe for a load. `check_missing` selects whether an element
    /// recording the missing sentinel counts as a hit (`has`) or as a
    /// miss (`get`).
    pub(crate) fn try_get_index_for_load(
        &self,
        check_missing: bool,
        key: KeyId,
    ) -> Option<CachedLoad> {
        let element = &self.elements[element_index(key)];
        if element.key != Some(key) || (!check_missing && element.is_missing) {
            return None;
        }
        let prototype = match &element.prototype {
            None => None,
            // The owner died; the entry is stale. Treat as a miss and let
            // the slow path overwrite it.
            Some(weak) => Some(weak.upgrade()?),
        };
        Some(CachedLoad {
            slot: element.slot,
            is_settable: element.is_settable,
            is_missing: check_missing && element.is_missing,
            prototype,
        })
    }

    /// Probe for a store. Constant fields and prototype-derived entries
    /// are never served: writes always target the receiver and never
    /// shadow through the cache.
    pub(crate) fn try_get_index_for_store(&self, key: KeyId) -> Option<CachedStore> {
        let element = &self.elements[element_index(key)];
        if element.key != Some(key) || !element.is_settable || element.prototype.is_some() {
            return None;
        }
        debug_assert!(!element.is_missing);
        Some(CachedStore { slot: element.slot })
    }

    /// Cache a receiver-owned hit.
    pub(crate) fn cache_own(&mut self, key: KeyId, slot: SlotLocation, is_settable: bool) {
        self.elements[element_index(key)] = CacheElement {
            key: Some(key),
            slot,
            is_settable,
            is_missing: false,
            prototype: None,
        };
    }

    /// Cache a prototype-owned hit (including the missing sentinel, whose
    /// owner is the context's missing-property holder).
    ///
    /// Returns `true` when the owning shape must be registered with the
    /// invalidation registry: the element had no prototype owner recorded
    /// for this key yet.
    #[must_use]
    pub(crate) fn cache_proto(
        &mut self,
        key: KeyId,
        slot: SlotLocation,
        is_settable: bool,
        is_missing: bool,
        prototype: &GcRef<DynObject>,
    ) -> bool {
        let element = &mut self.elements[element_index(key)];
        let needs_registration = element.key != Some(key) || element.prototype.is_none();
        *element = CacheElement {
            key: Some(key),
            slot,
            is_settable,
            is_missing,
            prototype: Some(GcRef::downgrade(prototype)),
        };
        needs_registration
    }

    /// Clear the element for `key` if it records a prototype-chain entry.
    /// Receiver-owned entries survive: they die with the shape.
    pub(crate) fn clear_if_property_on_prototype(&mut self, key: KeyId) {
        let element = &mut self.elements[element_index(key)];
        if element.key == Some(key) && element.prototype.is_some() {
            tracing::trace!(key = key.as_u32(), "property cache proto entry cleared");
            *element = CacheElement::default();
        }
    }

}

/// Monomorphic per-call-site cache.
///
/// The interpreter owns one of these per property-access site and passes
/// it into [`DynObject`](crate::object::DynObject) operations. A genuine
/// receiver-owned hit re-primes it with the same slot metadata so that
/// subsequent accesses at the site skip even the per-shape cache. Purely
/// an optimization: observable behavior is identical without it.
///
/// Prototype-derived and cross-context hits never prime a site cache;
/// only the shape-level cache stays valid for those.
pub struct SiteCache {
    shape: Cell<Option<usize>>,
    shape_guard: RefCell<Option<WeakRef<Shape>>>,
    slot: Cell<SlotLocation>,
    is_settable: Cell<bool>,
}

impl SiteCache {
    /// Create an empty call-site cache.
    pub fn new() -> Self {
        Self {
            shape: Cell::new(None),
            shape_guard: RefCell::new(None),
            slot: Cell::new(SlotLocation::default()),
            is_settable: Cell::new(false),
        }
    }

    /// Look up the cached slot for a receiver with the given shape.
    pub(crate) fn lookup(&self, shape: &GcRef<Shape>) -> Option<(SlotLocation, bool)> {
        if self.shape.get() != Some(GcRef::as_ptr(shape) as usize) {
            return None;
        }
        // Guard against a dead shape whose address was reused.
        let guard = self.shape_guard.borrow();
        let alive = guard.as_ref()?.upgrade()?;
        if !GcRef::ptr_eq(&alive, shape) {
            return None;
        }
        Some((self.slot.get(), self.is_settable.get()))
    }

    /// Prime the site with a receiver-owned hit.
    pub(crate) fn prime(&self, shape: &GcRef<Shape>, slot: SlotLocation, is_settable: bool) {
        self.shape.set(Some(GcRef::as_ptr(shape) as usize));
        *self.shape_guard.borrow_mut() = Some(GcRef::downgrade(shape));
        self.slot.set(slot);
        self.is_settable.set(is_settable);
    }

    /// Forget the cached entry.
    pub fn clear(&self) {
        self.shape.set(None);
        *self.shape_guard.borrow_mut() = None;
    }
}

impl Default for SiteCache {
    fn default() -> Self {
        Self::new()
    }
}
