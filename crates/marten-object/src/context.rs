//! Execution contexts and context groups
//!
//! A context group is the unit of single-threaded execution: it owns the
//! key interner and the invalidation registry shared by every context in
//! the group. A context owns the per-realm singletons (missing-property
//! holder, root shapes) and the configuration knobs. Values may cross
//! contexts inside one group via [`Context::marshal`]; shapes and caches
//! never leave their context.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::descriptor::DictionaryDescriptor;
use crate::error::{PropertyError, PropertyResult};
use crate::gc::{GcRef, WeakRef, gc_alloc};
use crate::key::{KeyId, KeyInterner};
use crate::object::DynObject;
use crate::registry::ProtoCacheRegistry;
use crate::shape::Shape;
use crate::value::Value;

/// Configuration for creating a context.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Inline slot capacity for plain objects. Deferred templates may
    /// negotiate a smaller capacity per family.
    pub inline_slot_capacity: u16,
    /// Whether per-shape property caches are populated and consulted.
    /// Disabling is observable only as a slowdown; results are identical.
    pub property_cache_enabled: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            inline_slot_capacity: 8,
            property_cache_enabled: true,
        }
    }
}

/// Identifier of a context within its group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(u32);

/// State shared by every context of one single-threaded group.
pub struct ContextGroup {
    interner: KeyInterner,
    registry: ProtoCacheRegistry,
    next_context_id: Cell<u32>,
}

impl ContextGroup {
    /// Create a new group.
    pub fn new() -> GcRef<ContextGroup> {
        gc_alloc(ContextGroup {
            interner: KeyInterner::new(),
            registry: ProtoCacheRegistry::new(),
            next_context_id: Cell::new(0),
        })
    }

    /// The group's key interner.
    pub fn interner(&self) -> &KeyInterner {
        &self.interner
    }

    /// The group's invalidation registry.
    pub fn registry(&self) -> &ProtoCacheRegistry {
        &self.registry
    }

    fn allocate_context_id(&self) -> ContextId {
        let id = self.next_context_id.get();
        self.next_context_id.set(id + 1);
        ContextId(id)
    }
}

/// One execution context (realm) inside a group.
pub struct Context {
    group: GcRef<ContextGroup>,
    id: ContextId,
    config: ContextConfig,
    missing_holder: RefCell<Option<GcRef<DynObject>>>,
    /// Root shapes per prototype identity, so empty objects with the same
    /// prototype converge on one shape. Values are weak; dead entries are
    /// rebuilt on demand.
    root_shapes: RefCell<FxHashMap<usize, (WeakRef<DynObject>, WeakRef<Shape>)>>,
    null_proto_root: RefCell<Option<WeakRef<Shape>>>,
    closing: Cell<bool>,
}

impl Context {
    /// Create a context in `group`.
    pub fn new(group: &GcRef<ContextGroup>, config: ContextConfig) -> GcRef<Context> {
        let context = gc_alloc(Context {
            group: group.clone(),
            id: group.allocate_context_id(),
            config,
            missing_holder: RefCell::new(None),
            root_shapes: RefCell::new(FxHashMap::default()),
            null_proto_root: RefCell::new(None),
            closing: Cell::new(false),
        });
        let holder = DynObject::missing_holder_object(&context);
        *context.missing_holder.borrow_mut() = Some(holder);
        context
    }

    /// The owning group.
    pub fn group(&self) -> &GcRef<ContextGroup> {
        &self.group
    }

    /// This context's id within its group.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// The context's configuration.
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Intern a property name.
    pub fn intern(&self, name: &str) -> KeyId {
        self.group.interner().intern(name)
    }

    /// Intern a fresh symbol key.
    pub fn intern_symbol(&self, description: &str) -> KeyId {
        self.group.interner().intern_symbol(description)
    }

    /// The name behind an interned key.
    pub fn key_name(&self, key: KeyId) -> Arc<str> {
        self.group.interner().name(key)
    }

    /// The group's invalidation registry.
    pub fn registry(&self) -> &ProtoCacheRegistry {
        self.group.registry()
    }

    /// Whether property caches are populated and consulted.
    pub fn cache_enabled(&self) -> bool {
        self.config.property_cache_enabled
    }

    /// The context-wide "declared but absent" sentinel object. Cached
    /// negative lookups record it as their owning prototype; it is
    /// distinguishable by identity and its inline slot 0 reads as
    /// `undefined`.
    pub fn missing_holder(&self) -> GcRef<DynObject> {
        self.missing_holder
            .borrow()
            .as_ref()
            .expect("context missing-property holder not initialized")
            .clone()
    }

    /// Whether `object` is this context's missing-property sentinel.
    pub fn is_missing_holder(&self, object: &GcRef<DynObject>) -> bool {
        GcRef::ptr_eq(&self.missing_holder(), object)
    }

    /// Begin teardown. Deferred materialization after this point is
    /// fatal; caches in the group are dropped wholesale.
    pub fn close(&self) {
        self.closing.set(true);
        self.group.registry().invalidate_all();
    }

    /// Whether teardown has begun.
    pub fn is_closing(&self) -> bool {
        self.closing.get()
    }

    /// Marshal `value` into this context. A no-op for primitives and for
    /// values already owned by this context's group; objects owned by a
    /// foreign group cannot be marshaled.
    pub fn marshal(&self, value: Value) -> PropertyResult<Value> {
        if let Value::Object(object) = &value {
            let owner = object.context();
            if !GcRef::ptr_eq(owner.group(), self.group()) {
                return Err(PropertyError::cross_context(
                    "object belongs to a foreign context group",
                ));
            }
        }
        Ok(value)
    }

    /// The shared root shape for objects created with `prototype`.
    pub(crate) fn root_shape_for(&self, prototype: Option<&GcRef<DynObject>>) -> GcRef<Shape> {
        let inline_capacity = self.config.inline_slot_capacity;
        let make_root = || {
            Shape::concrete(
                Box::new(DictionaryDescriptor::with_capacity(0, inline_capacity)),
                false,
                true,
            )
        };
        match prototype {
            None => {
                if let Some(root) = self.null_proto_root.borrow().as_ref()
                    && let Some(root) = root.upgrade()
                {
                    return root;
                }
                let root = make_root();
                *self.null_proto_root.borrow_mut() = Some(GcRef::downgrade(&root));
                root
            }
            Some(prototype) => {
                let address = GcRef::as_ptr(prototype) as usize;
                if let Some((weak_proto, weak_shape)) = self.root_shapes.borrow().get(&address)
                    && let Some(alive_proto) = weak_proto.upgrade()
                    && GcRef::ptr_eq(&alive_proto, prototype)
                    && let Some(shape) = weak_shape.upgrade()
                {
                    return shape;
                }
                let root = make_root();
                self.root_shapes.borrow_mut().insert(
                    address,
                    (GcRef::downgrade(prototype), GcRef::downgrade(&root)),
                );
                root
            }
        }
    }
}
