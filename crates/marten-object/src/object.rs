//! Dynamic objects
//!
//! A `DynObject` owns a shape pointer and slot storage, never a private
//! property table. Operations consult the deferred machinery first (a
//! deferred shape materializes on first touch), then the shape's property
//! cache, and only on a miss fall through to the full descriptor search
//! and prototype-chain walk. Caching is transparent: a property access
//! returns exactly what it would return with caching disabled.

use std::cell::{Cell, RefCell};

use smallvec::SmallVec;

use crate::cache::SiteCache;
use crate::context::Context;
use crate::deferred::{InitMode, MaterializeState, ensure_materialized};
use crate::descriptor::{
    DictionaryDescriptor, PropertyAttributes, PropertyKind, PropertyLocation, ShapeDescriptor,
};
use crate::error::{PropertyError, PropertyResult};
use crate::gc::{GcRef, WeakRef};
use crate::key::KeyId;
use crate::shape::Shape;
use crate::slots::{SlotLocation, SlotStorage};
use crate::value::Value;

/// A dynamic object: shape pointer, slot storage, prototype link.
pub struct DynObject {
    context: WeakRef<Context>,
    weak_self: WeakRef<DynObject>,
    shape: RefCell<GcRef<Shape>>,
    slots: RefCell<SlotStorage>,
    prototype: RefCell<Option<GcRef<DynObject>>>,
    extensible: Cell<bool>,
    sealed: Cell<bool>,
    frozen: Cell<bool>,
    init_state: Cell<MaterializeState>,
    is_prototype_object: Cell<bool>,
}

impl DynObject {
    /// Create a plain object with the context's shared root shape for the
    /// given prototype.
    pub fn new(context: &GcRef<Context>, prototype: Option<GcRef<DynObject>>) -> GcRef<DynObject> {
        if let Some(proto) = &prototype {
            proto.mark_as_prototype();
        }
        let shape = context.root_shape_for(prototype.as_ref());
        let inline_capacity = context.config().inline_slot_capacity;
        Self::allocate(
            context,
            shape,
            inline_capacity,
            prototype,
            MaterializeState::Materialized,
        )
    }

    /// Create an object wearing a deferred shape template. Its properties
    /// materialize on first touch.
    pub fn with_deferred_shape(
        context: &GcRef<Context>,
        template: &GcRef<Shape>,
        prototype: Option<GcRef<DynObject>>,
    ) -> GcRef<DynObject> {
        assert!(template.is_deferred(), "template shape is not deferred");
        if let Some(proto) = &prototype {
            proto.mark_as_prototype();
        }
        let capacity = template
            .deferred_template()
            .map(|t| t.slot_capacity())
            .unwrap_or(0);
        let inline_capacity = capacity.min(context.config().inline_slot_capacity);
        Self::allocate(
            context,
            template.clone(),
            inline_capacity,
            prototype,
            MaterializeState::Deferred,
        )
    }

    /// The context's "declared but absent" sentinel: a private shape, one
    /// inline slot holding `undefined`, not extensible.
    pub(crate) fn missing_holder_object(context: &GcRef<Context>) -> GcRef<DynObject> {
        let shape = Shape::concrete(
            Box::new(DictionaryDescriptor::with_capacity(1, 1)),
            true,
            true,
        );
        let holder = Self::allocate(context, shape, 1, None, MaterializeState::Materialized);
        holder.extensible.set(false);
        holder
    }

    fn allocate(
        context: &GcRef<Context>,
        shape: GcRef<Shape>,
        inline_capacity: u16,
        prototype: Option<GcRef<DynObject>>,
        init_state: MaterializeState,
    ) -> GcRef<DynObject> {
        GcRef::new_cyclic(|weak_self| DynObject {
            context: GcRef::downgrade(context),
            weak_self: weak_self.clone(),
            shape: RefCell::new(shape),
            slots: RefCell::new(SlotStorage::with_inline_capacity(inline_capacity)),
            prototype: RefCell::new(prototype),
            extensible: Cell::new(true),
            sealed: Cell::new(false),
            frozen: Cell::new(false),
            init_state: Cell::new(init_state),
            is_prototype_object: Cell::new(false),
        })
    }

    // ---- plumbing ----

    /// The owning execution context. The context outlives its objects in
    /// any well-formed engine; losing it mid-operation is fatal.
    pub fn context(&self) -> GcRef<Context> {
        self.context
            .upgrade()
            .expect("execution context destroyed under a live object")
    }

    fn gc_ref(&self) -> GcRef<DynObject> {
        self.weak_self
            .upgrade()
            .expect("operation on an object being destroyed")
    }

    /// The object's current shape.
    pub fn shape(&self) -> GcRef<Shape> {
        self.shape.borrow().clone()
    }

    pub(crate) fn install_shape(&self, shape: GcRef<Shape>) {
        *self.shape.borrow_mut() = shape;
    }

    /// The object's prototype link.
    pub fn prototype(&self) -> Option<GcRef<DynObject>> {
        self.prototype.borrow().clone()
    }

    /// Inline slot capacity negotiated at construction.
    pub fn inline_capacity(&self) -> u16 {
        self.slots.borrow().inline_capacity()
    }

    pub(crate) fn reserve_aux_slots(&self, capacity: usize) {
        self.slots.borrow_mut().reserve_aux(capacity);
    }

    pub(crate) fn init_state(&self) -> MaterializeState {
        self.init_state.get()
    }

    pub(crate) fn set_init_state(&self, state: MaterializeState) {
        self.init_state.set(state);
    }

    /// Whether the object has left the deferred state.
    pub fn is_materialized(&self) -> bool {
        self.init_state.get() == MaterializeState::Materialized
    }

    /// Whether new properties may be added.
    pub fn is_extensible(&self) -> bool {
        self.extensible.get()
    }

    /// Whether the object has been sealed.
    pub fn is_sealed(&self) -> bool {
        self.sealed.get()
    }

    /// Whether the object has been frozen.
    pub fn is_frozen(&self) -> bool {
        self.frozen.get()
    }

    pub(crate) fn read_slot(&self, slot: SlotLocation) -> Value {
        self.slots.borrow().get(slot)
    }

    pub(crate) fn write_slot(&self, slot: SlotLocation, value: Value) {
        self.slots.borrow_mut().set(slot, value);
    }

    // ---- cache fast paths ----

    /// Probe this object's shape cache for a load.
    ///
    /// `check_missing` selects whether a cached missing-sentinel entry is
    /// honored (`has`) or skipped (`get`); `output_existence` selects
    /// between the property's existence and its value. `Ok(None)` is a
    /// cache miss, never a failure.
    pub fn try_get_property(
        &self,
        request: &GcRef<Context>,
        check_missing: bool,
        output_existence: bool,
        key: KeyId,
        site: Option<&SiteCache>,
    ) -> PropertyResult<Option<Value>> {
        let shape = self.shape();
        let Some(hit) = shape.probe_load(check_missing, key) else {
            tracing::trace!(key = key.as_u32(), "property cache get miss");
            return Ok(None);
        };
        match hit.prototype {
            None => {
                // The property lives on the receiver itself.
                #[cfg(debug_assertions)]
                debug_assert!(
                    shape.cached_slot_is_consistent(key, hit.slot),
                    "cached slot disagrees with the shape descriptor"
                );
                tracing::trace!(key = key.as_u32(), "property cache get hit");
                let value = if output_existence {
                    Value::boolean(!hit.is_missing)
                } else {
                    self.read_slot(hit.slot)
                };
                let owner = self.context();
                if GcRef::ptr_eq(&owner, request) {
                    if let Some(site) = site {
                        site.prime(&shape, hit.slot, hit.is_settable);
                    }
                    Ok(Some(value))
                } else if output_existence {
                    Ok(Some(value))
                } else {
                    // Cross-context hit: marshal, and leave the call-site
                    // cache cold — only this shape-level cache stays valid.
                    Ok(Some(request.marshal(value)?))
                }
            }
            Some(owner) => {
                // Prototype-chain hit (or the missing sentinel).
                #[cfg(debug_assertions)]
                debug_assert!(
                    hit.is_missing || owner.shape().cached_slot_is_consistent(key, hit.slot),
                    "cached prototype slot disagrees with the owner's descriptor"
                );
                tracing::trace!(key = key.as_u32(), "property cache get hit prototype");
                let value = if output_existence {
                    Value::boolean(!hit.is_missing)
                } else {
                    owner.read_slot(hit.slot)
                };
                let owner_context = owner.context();
                if !GcRef::ptr_eq(&owner_context, request) && !output_existence {
                    return Ok(Some(request.marshal(value)?));
                }
                Ok(Some(value))
            }
        }
    }

    /// Probe this object's shape cache for a store and perform it.
    ///
    /// Never succeeds for constant fields or prototype-derived entries:
    /// writes always target the receiver and never shadow through the
    /// cache. `Ok(false)` is a cache miss.
    pub fn try_set_property(
        &self,
        request: &GcRef<Context>,
        key: KeyId,
        value: Value,
        site: Option<&SiteCache>,
    ) -> PropertyResult<bool> {
        let shape = self.shape();
        let Some(hit) = shape.probe_store(key) else {
            tracing::trace!(key = key.as_u32(), "property cache set miss");
            return Ok(false);
        };
        #[cfg(debug_assertions)]
        debug_assert!(
            shape.cached_slot_is_consistent(key, hit.slot),
            "cached slot disagrees with the shape descriptor"
        );
        tracing::trace!(key = key.as_u32(), "property cache set hit");
        let owner = self.context();
        let value = owner.marshal(value)?;
        self.write_slot(hit.slot, value);
        if GcRef::ptr_eq(&owner, request)
            && let Some(site) = site
        {
            site.prime(&shape, hit.slot, true);
        }
        Ok(true)
    }

    // ---- operations ----

    /// Read a property, walking the prototype chain. Returns `undefined`
    /// for absent properties; accessor properties return their stored
    /// accessor pair (invocation is the caller's business).
    pub fn get(
        &self,
        request: &GcRef<Context>,
        key: KeyId,
        site: Option<&SiteCache>,
    ) -> PropertyResult<Value> {
        ensure_materialized(&self.gc_ref(), InitMode::Default)?;
        if let Some(site) = site
            && let Some((slot, _)) = site.lookup(&self.shape())
        {
            return Ok(self.read_slot(slot));
        }
        if request.cache_enabled()
            && let Some(value) = self.try_get_property(request, false, false, key, site)?
        {
            return Ok(value);
        }
        self.lookup_slow(request, key, site, false)
    }

    /// Existence check, walking the prototype chain.
    pub fn has(&self, request: &GcRef<Context>, key: KeyId) -> PropertyResult<bool> {
        ensure_materialized(&self.gc_ref(), InitMode::Default)?;
        if request.cache_enabled()
            && let Some(value) = self.try_get_property(request, true, true, key, None)?
        {
            return Ok(value == Value::boolean(true));
        }
        Ok(self.lookup_slow(request, key, None, true)? == Value::boolean(true))
    }

    /// Write a property on the receiver. Returns `false` when the write
    /// is rejected (non-writable property, non-extensible object, or an
    /// accessor the caller must invoke instead).
    pub fn set(
        &self,
        request: &GcRef<Context>,
        key: KeyId,
        value: Value,
        site: Option<&SiteCache>,
    ) -> PropertyResult<bool> {
        ensure_materialized(&self.gc_ref(), InitMode::Set)?;
        if let Some(site) = site
            && let Some((slot, is_settable)) = site.lookup(&self.shape())
            && is_settable
        {
            let value = self.context().marshal(value)?;
            self.write_slot(slot, value);
            return Ok(true);
        }
        if request.cache_enabled() && self.try_set_property(request, key, value.clone(), site)? {
            return Ok(true);
        }
        self.set_slow(request, key, value, site)
    }

    /// Delete a property. Deleting an absent property succeeds; deleting
    /// a non-configurable one does not.
    pub fn delete(&self, request: &GcRef<Context>, key: KeyId) -> PropertyResult<bool> {
        ensure_materialized(&self.gc_ref(), InitMode::Default)?;
        let shape = self.shape();
        let Some(location) = shape.find(key) else {
            return Ok(true);
        };
        if !location.attributes.configurable {
            return Ok(false);
        }
        let (new_shape, old_location) = shape
            .transition_remove(key)
            .expect("found property vanished during delete");
        self.install_shape(new_shape);
        // The slot is unmapped, not reused; drop the value it held.
        self.write_slot(old_location.slot, Value::undefined());
        request.registry().invalidate(key);
        Ok(true)
    }

    /// Define or overwrite a property with explicit attributes.
    ///
    /// Redefining a non-configurable property is a type error.
    pub fn define_property(
        &self,
        request: &GcRef<Context>,
        key: KeyId,
        value: Value,
        attributes: PropertyAttributes,
    ) -> PropertyResult<bool> {
        ensure_materialized(&self.gc_ref(), InitMode::Set)?;
        let shape = self.shape();
        let value = self.context().marshal(value)?;
        if let Some(location) = shape.find(key) {
            if !location.attributes.configurable {
                return Err(PropertyError::type_error(
                    "cannot redefine non-configurable property",
                ));
            }
            let (new_shape, location) = shape
                .transition_reconfigure(key, attributes, PropertyKind::Data)
                .expect("found property vanished during define");
            self.install_shape(new_shape);
            self.write_slot(location.slot, value);
        } else {
            if !self.extensible.get() {
                return Ok(false);
            }
            let (new_shape, location) = shape.transition_add(key, attributes, PropertyKind::Data);
            self.install_shape(new_shape);
            self.write_slot(location.slot, value);
        }
        request.registry().invalidate(key);
        Ok(true)
    }

    /// Define an accessor property.
    ///
    /// Redefining a non-configurable property is a type error.
    pub fn define_accessor(
        &self,
        request: &GcRef<Context>,
        key: KeyId,
        getter: Option<Value>,
        setter: Option<Value>,
    ) -> PropertyResult<bool> {
        ensure_materialized(&self.gc_ref(), InitMode::SetAccessors)?;
        let attributes = PropertyAttributes {
            writable: false,
            enumerable: true,
            configurable: true,
        };
        let shape = self.shape();
        let pair = Value::accessor(getter, setter);
        if let Some(location) = shape.find(key) {
            if !location.attributes.configurable {
                return Err(PropertyError::type_error(
                    "cannot redefine non-configurable property",
                ));
            }
            let (new_shape, location) = shape
                .transition_reconfigure(key, attributes, PropertyKind::Accessor)
                .expect("found property vanished during accessor define");
            self.install_shape(new_shape);
            self.write_slot(location.slot, pair);
        } else {
            if !self.extensible.get() {
                return Ok(false);
            }
            let (new_shape, location) =
                shape.transition_add(key, attributes, PropertyKind::Accessor);
            self.install_shape(new_shape);
            self.write_slot(location.slot, pair);
        }
        request.registry().invalidate(key);
        Ok(true)
    }

    /// Reconfigure a property's attributes.
    pub fn set_attributes(
        &self,
        request: &GcRef<Context>,
        key: KeyId,
        attributes: PropertyAttributes,
    ) -> PropertyResult<bool> {
        ensure_materialized(&self.gc_ref(), InitMode::Set)?;
        let shape = self.shape();
        let Some(location) = shape.find(key) else {
            return Ok(false);
        };
        if !location.attributes.configurable {
            return Ok(false);
        }
        let (new_shape, _) = shape
            .transition_reconfigure(key, attributes, location.kind)
            .expect("found property vanished during reconfigure");
        self.install_shape(new_shape);
        request.registry().invalidate(key);
        Ok(true)
    }

    /// Own property location and value, if present.
    pub fn get_own_property(
        &self,
        key: KeyId,
    ) -> PropertyResult<Option<(Value, PropertyLocation)>> {
        ensure_materialized(&self.gc_ref(), InitMode::Default)?;
        let shape = self.shape();
        Ok(shape
            .find(key)
            .map(|location| (self.read_slot(location.slot), location)))
    }

    /// Whether the object itself (no prototype walk) has the property.
    pub fn has_own(&self, key: KeyId) -> PropertyResult<bool> {
        ensure_materialized(&self.gc_ref(), InitMode::Default)?;
        Ok(self.shape().find(key).is_some())
    }

    /// Enumerable own keys, in insertion order.
    pub fn enumerate(&self) -> PropertyResult<Vec<KeyId>> {
        ensure_materialized(&self.gc_ref(), InitMode::Default)?;
        let shape = self.shape();
        Ok(shape.with_descriptor(|d| {
            d.enumerate()
                .into_iter()
                .filter(|key| d.find(*key).is_some_and(|l| l.attributes.enumerable))
                .collect()
        }))
    }

    /// All own keys, in insertion order.
    pub fn own_keys(&self) -> PropertyResult<Vec<KeyId>> {
        ensure_materialized(&self.gc_ref(), InitMode::Default)?;
        Ok(self.shape().enumerate())
    }

    /// Forbid adding new properties.
    pub fn prevent_extensions(&self) -> PropertyResult<()> {
        ensure_materialized(&self.gc_ref(), InitMode::Extensions)?;
        self.extensible.set(false);
        Ok(())
    }

    /// Seal: no additions, no deletions.
    pub fn seal(&self, request: &GcRef<Context>) -> PropertyResult<()> {
        ensure_materialized(&self.gc_ref(), InitMode::Extensions)?;
        self.rewrite_all_attributes(request, false);
        self.extensible.set(false);
        self.sealed.set(true);
        Ok(())
    }

    /// Freeze: sealed, and every data property read-only.
    pub fn freeze(&self, request: &GcRef<Context>) -> PropertyResult<()> {
        ensure_materialized(&self.gc_ref(), InitMode::Extensions)?;
        self.rewrite_all_attributes(request, true);
        self.extensible.set(false);
        self.sealed.set(true);
        self.frozen.set(true);
        Ok(())
    }

    /// Clear `configurable` (and `writable`, when freezing) on every
    /// property in one shape change, then invalidate each key.
    fn rewrite_all_attributes(&self, request: &GcRef<Context>, clear_writable: bool) {
        let shape = self.shape();
        let keys: SmallVec<[KeyId; 8]> = SmallVec::from_vec(shape.enumerate());
        if keys.is_empty() {
            return;
        }
        let mut descriptor: Box<dyn ShapeDescriptor> = shape.with_descriptor(|d| d.clone_box());
        for key in &keys {
            let location = descriptor.find(*key).expect("enumerated key vanished");
            let attributes = PropertyAttributes {
                writable: location.attributes.writable && !clear_writable,
                enumerable: location.attributes.enumerable,
                configurable: false,
            };
            descriptor.set_attributes(*key, attributes, location.kind);
        }
        self.install_shape(Shape::concrete(descriptor, shape.is_prototype(), true));
        for key in keys {
            request.registry().invalidate(key);
        }
    }

    /// Change the object's prototype link.
    ///
    /// Cache entries anywhere may resolve through the old chain, so the
    /// group's prototype-derived entries are dropped wholesale and the
    /// receiver moves to a fresh shape identity.
    pub fn set_prototype(
        &self,
        request: &GcRef<Context>,
        prototype: Option<GcRef<DynObject>>,
    ) -> PropertyResult<()> {
        if let Some(proto) = &prototype {
            proto.mark_as_prototype();
        }
        *self.prototype.borrow_mut() = prototype;
        let shape = self.shape();
        if !shape.is_deferred() {
            self.install_shape(shape.transition_clone());
        }
        request.registry().invalidate_all();
        Ok(())
    }

    /// Note that this object is being installed as another object's
    /// prototype. An object still wearing a non-prototype deferred
    /// template swaps to the template's prototype flavor; a materialized
    /// object keeps its descriptor.
    pub fn mark_as_prototype(&self) {
        if self.is_prototype_object.replace(true) {
            return;
        }
        let shape = self.shape();
        if let Some(template) = shape.deferred_template()
            && self.init_state.get() == MaterializeState::Deferred
            && !shape.is_prototype()
        {
            self.install_shape(template.prototype_flavor());
        }
    }

    // ---- materialization populate ----

    /// Add a data property through the live descriptor of a shape still
    /// being materialized. Initializer use only.
    pub fn populate_data_property(
        &self,
        key: KeyId,
        value: Value,
        attributes: PropertyAttributes,
    ) -> PropertyResult<()> {
        let shape = self.shape();
        if shape.find(key).is_some() {
            return Err(PropertyError::initializer(
                "initializer defined a property twice",
            ));
        }
        let location =
            shape.with_descriptor_mut(|d| d.add_property(key, attributes, PropertyKind::Data));
        self.write_slot(location.slot, value);
        Ok(())
    }

    /// Add an accessor property through the live descriptor of a shape
    /// still being materialized. Initializer use only.
    pub fn populate_accessor_property(
        &self,
        key: KeyId,
        getter: Option<Value>,
        setter: Option<Value>,
        attributes: PropertyAttributes,
    ) -> PropertyResult<()> {
        let shape = self.shape();
        if shape.find(key).is_some() {
            return Err(PropertyError::initializer(
                "initializer defined a property twice",
            ));
        }
        let location =
            shape.with_descriptor_mut(|d| d.add_property(key, attributes, PropertyKind::Accessor));
        self.write_slot(location.slot, Value::accessor(getter, setter));
        Ok(())
    }

    // ---- slow paths ----

    /// Full lookup: own descriptor, then the prototype chain, then the
    /// missing sentinel. Populates the shape cache (and registry) on the
    /// way out. `want_existence` selects boolean-existence output.
    fn lookup_slow(
        &self,
        request: &GcRef<Context>,
        key: KeyId,
        site: Option<&SiteCache>,
        want_existence: bool,
    ) -> PropertyResult<Value> {
        let shape = self.shape();
        let owner_context = self.context();
        let cacheable = request.cache_enabled()
            && shape.is_locked()
            && GcRef::ptr_eq(&owner_context, request);

        // Receiver's own descriptor first.
        if let Some(location) = shape.find(key) {
            if location.is_data() && cacheable {
                shape.cache_own(key, location.slot, location.attributes.writable);
                if let Some(site) = site {
                    site.prime(&shape, location.slot, location.attributes.writable);
                }
            }
            return Ok(if want_existence {
                Value::boolean(true)
            } else {
                request.marshal(self.read_slot(location.slot))?
            });
        }

        // Walk the prototype chain; deferred prototypes materialize as
        // they are crossed.
        let mut cursor = self.prototype();
        while let Some(proto) = cursor {
            ensure_materialized(&proto, InitMode::Default)?;
            let proto_shape = proto.shape();
            if let Some(location) = proto_shape.find(key) {
                if !location.is_data() {
                    // Accessors are never served or cached here.
                    return Ok(if want_existence {
                        Value::boolean(true)
                    } else {
                        proto.read_slot(location.slot)
                    });
                }
                if cacheable && shape.cache_proto(key, location.slot, false, false, &proto) {
                    request.registry().register(key, &shape);
                }
                return Ok(if want_existence {
                    Value::boolean(true)
                } else {
                    request.marshal(proto.read_slot(location.slot))?
                });
            }
            cursor = proto.prototype();
        }

        // Not found anywhere: remember the absence via the context's
        // missing-property holder so repeated negative lookups stay fast.
        if cacheable {
            let holder = owner_context.missing_holder();
            let slot = SlotLocation {
                index: 0,
                is_inline: true,
            };
            if shape.cache_proto(key, slot, false, true, &holder) {
                request.registry().register(key, &shape);
            }
        }
        Ok(if want_existence {
            Value::boolean(false)
        } else {
            Value::undefined()
        })
    }

    /// Full store: write through an existing own slot, or add the
    /// property with a shape transition.
    fn set_slow(
        &self,
        request: &GcRef<Context>,
        key: KeyId,
        value: Value,
        site: Option<&SiteCache>,
    ) -> PropertyResult<bool> {
        let shape = self.shape();
        let owner_context = self.context();
        let cacheable = request.cache_enabled()
            && shape.is_locked()
            && GcRef::ptr_eq(&owner_context, request);

        if let Some(location) = shape.find(key) {
            if !location.is_data() || !location.attributes.writable {
                return Ok(false);
            }
            let value = owner_context.marshal(value)?;
            self.write_slot(location.slot, value);
            if cacheable {
                shape.cache_own(key, location.slot, true);
                if let Some(site) = site {
                    site.prime(&shape, location.slot, true);
                }
            }
            return Ok(true);
        }

        if !self.extensible.get() {
            return Ok(false);
        }
        let value = owner_context.marshal(value)?;
        let (new_shape, location) =
            shape.transition_add(key, PropertyAttributes::data(), PropertyKind::Data);
        self.install_shape(new_shape.clone());
        self.write_slot(location.slot, value);
        // A property with this key now exists where it did not before;
        // prototype-derived cache entries for it are stale everywhere.
        request.registry().invalidate(key);
        if request.cache_enabled() && GcRef::ptr_eq(&owner_context, request) {
            new_shape.cache_own(key, location.slot, true);
            if let Some(site) = site {
                site.prime(&new_shape, location.slot, true);
            }
        }
        Ok(true)
    }
}

impl std::fmt::Debug for DynObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynObject")
            .field("shape", &*self.shape.borrow())
            .field("extensible", &self.extensible.get())
            .field("materialized", &self.is_materialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, ContextConfig, ContextGroup};

    fn context() -> GcRef<Context> {
        Context::new(&ContextGroup::new(), ContextConfig::default())
    }

    #[test]
    fn test_get_set_roundtrip() {
        let ctx = context();
        let obj = DynObject::new(&ctx, None);
        let key = ctx.intern("foo");
        assert!(obj.set(&ctx, key, Value::int32(42), None).unwrap());
        assert_eq!(obj.get(&ctx, key, None).unwrap(), Value::int32(42));
    }

    #[test]
    fn test_missing_reads_undefined() {
        let ctx = context();
        let obj = DynObject::new(&ctx, None);
        let key = ctx.intern("nope");
        assert_eq!(obj.get(&ctx, key, None).unwrap(), Value::undefined());
        assert!(!obj.has(&ctx, key).unwrap());
    }

    #[test]
    fn test_prototype_lookup() {
        let ctx = context();
        let proto = DynObject::new(&ctx, None);
        let key = ctx.intern("x");
        proto.set(&ctx, key, Value::int32(1), None).unwrap();
        let obj = DynObject::new(&ctx, Some(proto));
        assert_eq!(obj.get(&ctx, key, None).unwrap(), Value::int32(1));
        assert!(obj.has(&ctx, key).unwrap());
        assert!(!obj.has_own(key).unwrap());
    }

    #[test]
    fn test_set_rejected_on_readonly() {
        let ctx = context();
        let obj = DynObject::new(&ctx, None);
        let key = ctx.intern("ro");
        obj.define_property(&ctx, key, Value::int32(1), PropertyAttributes::frozen())
            .unwrap();
        assert!(!obj.set(&ctx, key, Value::int32(2), None).unwrap());
        assert_eq!(obj.get(&ctx, key, None).unwrap(), Value::int32(1));
    }

    #[test]
    fn test_shape_changes_on_add_and_delete() {
        let ctx = context();
        let obj = DynObject::new(&ctx, None);
        let key = ctx.intern("k");
        let s0 = obj.shape();
        obj.set(&ctx, key, Value::int32(1), None).unwrap();
        let s1 = obj.shape();
        assert!(!GcRef::ptr_eq(&s0, &s1));
        assert!(obj.delete(&ctx, key).unwrap());
        let s2 = obj.shape();
        assert!(!GcRef::ptr_eq(&s1, &s2));
        assert_eq!(obj.get(&ctx, key, None).unwrap(), Value::undefined());
    }

    #[test]
    fn test_objects_built_alike_share_shapes() {
        let ctx = context();
        let a = DynObject::new(&ctx, None);
        let b = DynObject::new(&ctx, None);
        let x = ctx.intern("x");
        let y = ctx.intern("y");
        for obj in [&a, &b] {
            obj.set(&ctx, x, Value::int32(1), None).unwrap();
            obj.set(&ctx, y, Value::int32(2), None).unwrap();
        }
        assert!(GcRef::ptr_eq(&a.shape(), &b.shape()));
    }

    #[test]
    fn test_freeze_rejects_writes_and_deletes() {
        let ctx = context();
        let obj = DynObject::new(&ctx, None);
        let key = ctx.intern("v");
        obj.set(&ctx, key, Value::int32(7), None).unwrap();
        obj.freeze(&ctx).unwrap();
        assert!(obj.is_frozen());
        assert!(!obj.set(&ctx, key, Value::int32(8), None).unwrap());
        assert!(!obj.delete(&ctx, key).unwrap());
        assert!(!obj.set(&ctx, ctx.intern("new"), Value::int32(0), None).unwrap());
        assert_eq!(obj.get(&ctx, key, None).unwrap(), Value::int32(7));
    }

    #[test]
    fn test_enumerate_respects_enumerable() {
        let ctx = context();
        let obj = DynObject::new(&ctx, None);
        let a = ctx.intern("a");
        let b = ctx.intern("b");
        obj.set(&ctx, a, Value::int32(1), None).unwrap();
        obj.define_property(&ctx, b, Value::int32(2), PropertyAttributes::builtin())
            .unwrap();
        assert_eq!(obj.enumerate().unwrap(), vec![a]);
        assert_eq!(obj.own_keys().unwrap(), vec![a, b]);
    }

    #[test]
    fn test_redefine_nonconfigurable_is_type_error() {
        let ctx = context();
        let obj = DynObject::new(&ctx, None);
        let key = ctx.intern("fixed");
        obj.define_property(&ctx, key, Value::int32(1), PropertyAttributes::frozen())
            .unwrap();
        let err = obj
            .define_property(&ctx, key, Value::int32(2), PropertyAttributes::data())
            .unwrap_err();
        assert!(matches!(err, PropertyError::TypeError(_)));
    }

    #[test]
    fn test_accessor_definition() {
        let ctx = context();
        let obj = DynObject::new(&ctx, None);
        let key = ctx.intern("acc");
        let getter = Value::string("getter-stand-in");
        assert!(obj
            .define_accessor(&ctx, key, Some(getter.clone()), None)
            .unwrap());
        let pair = obj.get(&ctx, key, None).unwrap();
        let pair = pair.as_accessor().expect("accessor pair");
        assert_eq!(pair.getter.as_ref(), Some(&getter));
        assert_eq!(pair.setter, None);
    }
}
