//! Deferred shapes
//!
//! Builtin object families are expensive to populate and mostly never
//! touched. A deferred shape is a shared template carrying an initializer
//! and a capacity estimate; the first operation on an object wearing the
//! template materializes a concrete descriptor for that one object and
//! forwards the operation to it. Templates are created once per builtin
//! family at library setup and never mutated afterwards.
//!
//! The initializer must install the concrete descriptor (via
//! [`DeferredTemplate::convert`]) *before* populating properties. An
//! initializer may call back into the engine, including into operations
//! on the object being materialized; once the descriptor is installed,
//! such re-entrant calls observe a valid, if incomplete, object instead
//! of looping back into materialization.

use std::cell::RefCell;

use crate::descriptor::DictionaryDescriptor;
use crate::error::{PropertyError, PropertyResult};
use crate::gc::GcRef;
use crate::object::DynObject;
use crate::shape::Shape;

/// What the triggering operation needs from materialization.
///
/// Lets an initializer skip work irrelevant to the caller: a pure
/// existence check on a builtin need not populate writer-only metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitMode {
    /// Reads and existence checks
    Default,
    /// Property writes
    Set,
    /// Accessor definition
    SetAccessors,
    /// Seal, freeze, prevent-extensions
    Extensions,
}

/// Per-object materialization progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MaterializeState {
    /// Still wearing a deferred template
    Deferred,
    /// Initializer running, concrete descriptor not yet installed
    Materializing,
    /// Bound to a concrete descriptor; terminal
    Materialized,
}

/// Initializer callback of a deferred shape template.
///
/// Responsible for calling [`DeferredTemplate::convert`] on the object
/// first, then populating properties and accessors through the now-live
/// descriptor.
pub type DeferredInitializer =
    fn(&GcRef<DynObject>, &DeferredTemplate, InitMode) -> PropertyResult<()>;

/// Shared template deferring a builtin family's property population.
pub struct DeferredTemplate {
    initializer: DeferredInitializer,
    slot_capacity: u16,
    has_accessors: bool,
    is_prototype: bool,
    /// Sibling template for objects installed as prototypes; created
    /// lazily, at most once, and only on the non-prototype flavor.
    proto_flavor: RefCell<Option<GcRef<Shape>>>,
}

impl DeferredTemplate {
    /// Create a non-prototype template.
    pub fn new(
        initializer: DeferredInitializer,
        slot_capacity: u16,
        has_accessors: bool,
    ) -> Self {
        Self {
            initializer,
            slot_capacity,
            has_accessors,
            is_prototype: false,
            proto_flavor: RefCell::new(None),
        }
    }

    /// Estimated number of slots the initializer will populate.
    pub fn slot_capacity(&self) -> u16 {
        self.slot_capacity
    }

    /// Whether the family defines accessor properties.
    pub fn has_accessors(&self) -> bool {
        self.has_accessors
    }

    /// The prototype-flavored sibling of this template: same initializer,
    /// same capacity, prototype flag set. Created on first request and
    /// shared afterwards.
    pub(crate) fn prototype_flavor(&self) -> GcRef<Shape> {
        debug_assert!(!self.is_prototype, "prototype flavor of a prototype flavor");
        if let Some(flavor) = self.proto_flavor.borrow().as_ref() {
            return flavor.clone();
        }
        let sibling = Shape::deferred_prototype_flavor(DeferredTemplate {
            initializer: self.initializer,
            slot_capacity: self.slot_capacity,
            has_accessors: self.has_accessors,
            is_prototype: true,
            proto_flavor: RefCell::new(None),
        });
        *self.proto_flavor.borrow_mut() = Some(sibling.clone());
        sibling
    }

    /// Install a concrete descriptor on `object`, sized to this
    /// template's capacity estimate. The swap happens before the caller
    /// populates a single property, which is what makes materialization
    /// re-entrancy safe.
    ///
    /// Returns the installed shape; it stays unlocked until
    /// materialization completes.
    pub fn convert(&self, object: &GcRef<DynObject>) -> GcRef<Shape> {
        let descriptor =
            DictionaryDescriptor::with_capacity(self.slot_capacity, object.inline_capacity());
        let shape = Shape::concrete(Box::new(descriptor), self.is_prototype, false);
        object.install_shape(shape.clone());
        if self.slot_capacity > object.inline_capacity() {
            object.reserve_aux_slots((self.slot_capacity - object.inline_capacity()) as usize);
        }
        shape
    }
}

/// Materialize `object` if it still wears a deferred template, then
/// return so the caller can forward its operation to the concrete
/// descriptor. Idempotent: later calls are no-ops.
pub(crate) fn ensure_materialized(object: &GcRef<DynObject>, mode: InitMode) -> PropertyResult<()> {
    let shape = object.shape();
    if !shape.is_deferred() {
        return Ok(());
    }
    let context = object.context();
    if context.is_closing() {
        // Other objects share this template; a half-run initializer must
        // never be observable. Tearing down mid-materialization is fatal.
        panic!("deferred shape materialization during context teardown");
    }
    match object.init_state() {
        MaterializeState::Materialized => {
            // A materialized object's shape pointer is concrete by
            // definition; getting here means the swap was lost.
            debug_assert!(false, "materialized object wearing a deferred template");
            Ok(())
        }
        MaterializeState::Materializing => {
            // The initializer queried the object before installing the
            // concrete descriptor, which would loop forever here.
            debug_assert!(false, "materialization re-entered before descriptor install");
            Err(PropertyError::initializer(
                "materialization re-entered before descriptor install",
            ))
        }
        MaterializeState::Deferred => {
            object.set_init_state(MaterializeState::Materializing);
            let template = shape
                .deferred_template()
                .expect("deferred shape without template");
            tracing::debug!(
                ?mode,
                capacity = template.slot_capacity(),
                is_prototype = shape.is_prototype(),
                "materializing deferred shape"
            );
            let result = (template.initializer)(object, template, mode);
            if object.shape().is_deferred() {
                // The initializer failed (or bailed) before installing a
                // descriptor. The object must still come out
                // materialized: re-entering Deferred would run the
                // initializer twice.
                template.convert(object);
            }
            object.shape().lock();
            object.set_init_state(MaterializeState::Materialized);
            result
        }
    }
}
