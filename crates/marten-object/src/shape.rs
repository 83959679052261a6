//! Object shapes (hidden classes)
//!
//! A `Shape` describes the property layout shared by every object
//! currently pointing at it: which keys exist and which slot each one
//! occupies. Objects own a shape pointer plus slot storage, never a
//! private property table. From the objects' point of view a shape is
//! immutable; any change to the key set branches to a new shape
//! (copy-on-write at shape granularity), silently abandoning the old
//! shape's property cache.
//!
//! Shapes reached by adding a property are remembered in a weak
//! transition table so objects built the same way converge on the same
//! shape. Weak references break the parent/child cycle: a transition
//! target is kept alive by the objects using it, not by its parent.

use std::cell::{Cell, RefCell};

use rustc_hash::FxHashMap;

use crate::cache::{CachedLoad, CachedStore, PropertyCache};
use crate::deferred::DeferredTemplate;
use crate::descriptor::{
    PropertyAttributes, PropertyKind, PropertyLocation, ShapeDescriptor,
};
use crate::gc::{GcRef, WeakRef};
use crate::key::KeyId;
use crate::slots::SlotLocation;

/// Key of the transition table: adding this property with these
/// attributes leads to the recorded child shape.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct TransitionKey {
    key: KeyId,
    attr_bits: u8,
    is_accessor: bool,
}

impl TransitionKey {
    fn new(key: KeyId, attributes: PropertyAttributes, kind: PropertyKind) -> Self {
        Self {
            key,
            attr_bits: attributes.bits(),
            is_accessor: kind == PropertyKind::Accessor,
        }
    }
}

pub(crate) enum ShapeKind {
    /// Shared template that materializes a concrete descriptor on first
    /// use.
    Deferred(DeferredTemplate),
    /// Live descriptor. The `RefCell` is only mutated while the shape is
    /// unlocked (materialization populate); locked shapes treat it as
    /// read-only.
    Concrete(RefCell<Box<dyn ShapeDescriptor>>),
}

/// Shared property layout of a family of objects.
pub struct Shape {
    kind: ShapeKind,
    is_prototype: bool,
    /// A locked shape's layout can no longer grow in place; only locked
    /// shapes may populate the property cache, because an unlocked
    /// descriptor has not finished deciding its layout.
    locked: Cell<bool>,
    cache: RefCell<Option<Box<PropertyCache>>>,
    transitions: RefCell<FxHashMap<TransitionKey, WeakRef<Shape>>>,
}

impl Shape {
    /// Create a concrete shape. `locked` is false only for shapes still
    /// being populated by a deferred initializer.
    pub(crate) fn concrete(
        descriptor: Box<dyn ShapeDescriptor>,
        is_prototype: bool,
        locked: bool,
    ) -> GcRef<Shape> {
        GcRef::new(Shape {
            kind: ShapeKind::Concrete(RefCell::new(descriptor)),
            is_prototype,
            locked: Cell::new(locked),
            cache: RefCell::new(None),
            transitions: RefCell::new(FxHashMap::default()),
        })
    }

    /// Create a deferred shape template. Done once per builtin family at
    /// library setup; every instance of the family starts with this
    /// shape and materializes its own layout on first touch.
    pub fn deferred(template: DeferredTemplate) -> GcRef<Shape> {
        GcRef::new(Shape {
            kind: ShapeKind::Deferred(template),
            is_prototype: false,
            locked: Cell::new(true),
            cache: RefCell::new(None),
            transitions: RefCell::new(FxHashMap::default()),
        })
    }

    pub(crate) fn deferred_prototype_flavor(template: DeferredTemplate) -> GcRef<Shape> {
        GcRef::new(Shape {
            kind: ShapeKind::Deferred(template),
            is_prototype: true,
            locked: Cell::new(true),
            cache: RefCell::new(None),
            transitions: RefCell::new(FxHashMap::default()),
        })
    }

    /// Whether this shape still defers to an initializer.
    pub fn is_deferred(&self) -> bool {
        matches!(self.kind, ShapeKind::Deferred(_))
    }

    /// Whether this shape belongs to objects installed as prototypes.
    pub fn is_prototype(&self) -> bool {
        self.is_prototype
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.locked.get()
    }

    /// Lock the layout; called once a deferred initializer finishes
    /// populating.
    pub(crate) fn lock(&self) {
        self.locked.set(true);
    }

    pub(crate) fn deferred_template(&self) -> Option<&DeferredTemplate> {
        match &self.kind {
            ShapeKind::Deferred(template) => Some(template),
            ShapeKind::Concrete(_) => None,
        }
    }

    /// Run `f` against the concrete descriptor.
    ///
    /// Panics if the shape is still deferred; callers materialize first.
    pub(crate) fn with_descriptor<R>(&self, f: impl FnOnce(&dyn ShapeDescriptor) -> R) -> R {
        match &self.kind {
            ShapeKind::Concrete(descriptor) => f(descriptor.borrow().as_ref()),
            ShapeKind::Deferred(_) => unreachable!("descriptor access on a deferred shape"),
        }
    }

    /// Mutable descriptor access for materialization populate. Only legal
    /// while the shape is unlocked.
    pub(crate) fn with_descriptor_mut<R>(
        &self,
        f: impl FnOnce(&mut dyn ShapeDescriptor) -> R,
    ) -> R {
        debug_assert!(!self.is_locked(), "in-place layout change on a locked shape");
        match &self.kind {
            ShapeKind::Concrete(descriptor) => f(descriptor.borrow_mut().as_mut()),
            ShapeKind::Deferred(_) => unreachable!("descriptor access on a deferred shape"),
        }
    }

    /// Exact lookup in this shape's descriptor. No prototype walk.
    pub(crate) fn find(&self, key: KeyId) -> Option<PropertyLocation> {
        self.with_descriptor(|d| d.find(key))
    }

    /// Number of properties in the layout.
    pub fn property_count(&self) -> usize {
        match &self.kind {
            ShapeKind::Concrete(descriptor) => descriptor.borrow().property_count(),
            ShapeKind::Deferred(_) => 0,
        }
    }

    /// Keys in insertion order.
    pub fn enumerate(&self) -> Vec<KeyId> {
        match &self.kind {
            ShapeKind::Concrete(descriptor) => descriptor.borrow().enumerate(),
            ShapeKind::Deferred(_) => Vec::new(),
        }
    }

    /// Shape reached from this one by adding `key`. Reuses a previous
    /// transition when one is still alive, so objects built in the same
    /// order share the result.
    pub(crate) fn transition_add(
        &self,
        key: KeyId,
        attributes: PropertyAttributes,
        kind: PropertyKind,
    ) -> (GcRef<Shape>, PropertyLocation) {
        let transition_key = TransitionKey::new(key, attributes, kind);
        if let Some(existing) = self.transitions.borrow().get(&transition_key)
            && let Some(shape) = existing.upgrade()
        {
            let location = shape.find(key).expect("transition target lost its key");
            return (shape, location);
        }

        let mut descriptor = self.with_descriptor(|d| d.clone_box());
        let location = descriptor.add_property(key, attributes, kind);
        let shape = Shape::concrete(descriptor, self.is_prototype, true);
        self.transitions
            .borrow_mut()
            .insert(transition_key, GcRef::downgrade(&shape));
        (shape, location)
    }

    /// Shape reached by deleting `key`. Deletions are rare and
    /// order-destroying, so they always branch to a fresh shape.
    pub(crate) fn transition_remove(&self, key: KeyId) -> Option<(GcRef<Shape>, PropertyLocation)> {
        let mut descriptor = self.with_descriptor(|d| d.clone_box());
        let location = descriptor.delete_property(key)?;
        let shape = Shape::concrete(descriptor, self.is_prototype, true);
        Some((shape, location))
    }

    /// Shape reached by reconfiguring `key`'s attributes.
    pub(crate) fn transition_reconfigure(
        &self,
        key: KeyId,
        attributes: PropertyAttributes,
        kind: PropertyKind,
    ) -> Option<(GcRef<Shape>, PropertyLocation)> {
        let mut descriptor = self.with_descriptor(|d| d.clone_box());
        if !descriptor.set_attributes(key, attributes, kind) {
            return None;
        }
        let shape = Shape::concrete(descriptor, self.is_prototype, true);
        let location = shape.find(key).expect("reconfigured key vanished");
        Some((shape, location))
    }

    /// Identical layout under a fresh identity. Used when an object's
    /// prototype link changes: the layout is unchanged but every cache
    /// entry guarded by the old identity must die.
    pub(crate) fn transition_clone(&self) -> GcRef<Shape> {
        let descriptor = self.with_descriptor(|d| d.clone_box());
        Shape::concrete(descriptor, self.is_prototype, true)
    }

    // ---- property cache ----

    pub(crate) fn probe_load(&self, check_missing: bool, key: KeyId) -> Option<CachedLoad> {
        self.cache
            .borrow()
            .as_ref()?
            .try_get_index_for_load(check_missing, key)
    }

    pub(crate) fn probe_store(&self, key: KeyId) -> Option<CachedStore> {
        self.cache.borrow().as_ref()?.try_get_index_for_store(key)
    }

    /// Record a receiver-owned hit. Creates the cache on first use.
    pub(crate) fn cache_own(&self, key: KeyId, slot: SlotLocation, is_settable: bool) {
        debug_assert!(self.is_locked());
        self.cache
            .borrow_mut()
            .get_or_insert_with(|| Box::new(PropertyCache::new()))
            .cache_own(key, slot, is_settable);
    }

    /// Record a prototype-owned hit. Returns `true` when the caller must
    /// register `(key, this shape)` with the invalidation registry.
    #[must_use]
    pub(crate) fn cache_proto(
        &self,
        key: KeyId,
        slot: SlotLocation,
        is_settable: bool,
        is_missing: bool,
        prototype: &GcRef<crate::object::DynObject>,
    ) -> bool {
        debug_assert!(self.is_locked());
        self.cache
            .borrow_mut()
            .get_or_insert_with(|| Box::new(PropertyCache::new()))
            .cache_proto(key, slot, is_settable, is_missing, prototype)
    }

    /// Clear the cached element for `key` if it records a prototype-chain
    /// entry. Called through the invalidation registry.
    pub(crate) fn clear_cached_prototype_entry(&self, key: KeyId) {
        if let Some(cache) = self.cache.borrow_mut().as_mut() {
            cache.clear_if_property_on_prototype(key);
        }
    }

    /// Debug consistency check: the cached slot for `key` must agree with
    /// the descriptor's own bookkeeping.
    #[cfg(debug_assertions)]
    pub(crate) fn cached_slot_is_consistent(&self, key: KeyId, slot: SlotLocation) -> bool {
        self.with_descriptor(|d| {
            let logical = d.slot_index_for(slot.index, slot.is_inline);
            let expected = d.enumerate().iter().position(|k| *k == key);
            logical.is_some() && logical == expected
        })
    }
}

impl std::fmt::Debug for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shape")
            .field("deferred", &self.is_deferred())
            .field("is_prototype", &self.is_prototype)
            .field("locked", &self.locked.get())
            .field("property_count", &self.property_count())
            .finish()
    }
}
