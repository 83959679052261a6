//! Deferred shape behavior: one-shot materialization, mode selection,
//! prototype flavor substitution, re-entrancy, and failure handling.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use marten_object::{
    Context, ContextConfig, ContextGroup, DeferredTemplate, DynObject, GcRef, InitMode,
    PropertyAttributes, PropertyError, PropertyResult, Shape, Value,
};

fn context() -> GcRef<Context> {
    Context::new(&ContextGroup::new(), ContextConfig::default())
}

fn populate_pair(obj: &GcRef<DynObject>) -> PropertyResult<()> {
    let ctx = obj.context();
    obj.populate_data_property(
        ctx.intern("length"),
        Value::int32(0),
        PropertyAttributes::builtin(),
    )?;
    obj.populate_data_property(
        ctx.intern("flags"),
        Value::string("g"),
        PropertyAttributes::builtin(),
    )
}

#[test]
fn first_touch_materializes_exactly_once() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);
    static MODES: Mutex<Vec<InitMode>> = Mutex::new(Vec::new());

    fn init(
        obj: &GcRef<DynObject>,
        template: &DeferredTemplate,
        mode: InitMode,
    ) -> PropertyResult<()> {
        CALLS.fetch_add(1, Ordering::Relaxed);
        MODES.lock().unwrap().push(mode);
        template.convert(obj);
        populate_pair(obj)
    }

    let ctx = context();
    let template = Shape::deferred(DeferredTemplate::new(init, 4, false));
    let obj = DynObject::with_deferred_shape(&ctx, &template, None);
    assert!(!obj.is_materialized());

    // An existence check is a read-only touch: mode Default.
    let length = ctx.intern("length");
    let results: Vec<bool> = (0..5).map(|_| obj.has_own(length).unwrap()).collect();
    assert!(results.iter().all(|r| *r));
    assert_eq!(CALLS.load(Ordering::Relaxed), 1);
    assert_eq!(&*MODES.lock().unwrap(), &[InitMode::Default]);
    assert!(obj.is_materialized());
    assert_eq!(obj.get(&ctx, length, None).unwrap(), Value::int32(0));
}

#[test]
fn modes_follow_the_triggering_operation() {
    static MODES: Mutex<Vec<InitMode>> = Mutex::new(Vec::new());

    fn init(
        obj: &GcRef<DynObject>,
        template: &DeferredTemplate,
        mode: InitMode,
    ) -> PropertyResult<()> {
        MODES.lock().unwrap().push(mode);
        template.convert(obj);
        Ok(())
    }

    let ctx = context();
    let template = Shape::deferred(DeferredTemplate::new(init, 2, true));

    let writer = DynObject::with_deferred_shape(&ctx, &template, None);
    writer.set(&ctx, ctx.intern("w"), Value::int32(1), None).unwrap();

    let accessor_host = DynObject::with_deferred_shape(&ctx, &template, None);
    accessor_host
        .define_accessor(&ctx, ctx.intern("a"), Some(Value::string("g")), None)
        .unwrap();

    let frozen = DynObject::with_deferred_shape(&ctx, &template, None);
    frozen.freeze(&ctx).unwrap();

    assert_eq!(
        &*MODES.lock().unwrap(),
        &[InitMode::Set, InitMode::SetAccessors, InitMode::Extensions]
    );
}

#[test]
fn prototype_flavor_substitution_is_per_object() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);

    fn init(
        obj: &GcRef<DynObject>,
        template: &DeferredTemplate,
        _mode: InitMode,
    ) -> PropertyResult<()> {
        CALLS.fetch_add(1, Ordering::Relaxed);
        template.convert(obj);
        populate_pair(obj)
    }

    let ctx = context();
    let template = Shape::deferred(DeferredTemplate::new(init, 4, false));
    let family: Vec<_> = (0..10)
        .map(|_| DynObject::with_deferred_shape(&ctx, &template, None))
        .collect();

    // Installing #5 as a prototype swaps only #5 to the prototype-flavored
    // template; the rest keep the original.
    let _child = DynObject::new(&ctx, Some(family[5].clone()));
    assert!(family[5].shape().is_prototype());
    assert!(family[5].shape().is_deferred());
    for (i, member) in family.iter().enumerate() {
        if i != 5 {
            assert!(GcRef::ptr_eq(&member.shape(), &template));
        }
    }

    // Both flavors still materialize through the same initializer.
    let length = ctx.intern("length");
    assert_eq!(family[5].get(&ctx, length, None).unwrap(), Value::int32(0));
    assert_eq!(family[0].get(&ctx, length, None).unwrap(), Value::int32(0));
    assert_eq!(CALLS.load(Ordering::Relaxed), 2);
    assert!(family[5].shape().is_prototype());
    assert!(!family[0].shape().is_prototype());

    // Untouched members remain deferred.
    assert!(!family[9].is_materialized());
}

#[test]
fn prototype_flavor_is_shared_between_objects() {
    fn init(
        obj: &GcRef<DynObject>,
        template: &DeferredTemplate,
        _mode: InitMode,
    ) -> PropertyResult<()> {
        template.convert(obj);
        Ok(())
    }

    let ctx = context();
    let template = Shape::deferred(DeferredTemplate::new(init, 2, false));
    let a = DynObject::with_deferred_shape(&ctx, &template, None);
    let b = DynObject::with_deferred_shape(&ctx, &template, None);
    a.mark_as_prototype();
    b.mark_as_prototype();
    assert!(GcRef::ptr_eq(&a.shape(), &b.shape()));
    assert!(!GcRef::ptr_eq(&a.shape(), &template));
}

#[test]
fn materialized_object_ignores_prototype_substitution() {
    fn init(
        obj: &GcRef<DynObject>,
        template: &DeferredTemplate,
        _mode: InitMode,
    ) -> PropertyResult<()> {
        template.convert(obj);
        populate_pair(obj)
    }

    let ctx = context();
    let template = Shape::deferred(DeferredTemplate::new(init, 4, false));
    let obj = DynObject::with_deferred_shape(&ctx, &template, None);
    // Materialize through the non-prototype path first.
    obj.get(&ctx, ctx.intern("length"), None).unwrap();
    let materialized = obj.shape();
    obj.mark_as_prototype();
    // The materialized descriptor is kept.
    assert!(GcRef::ptr_eq(&obj.shape(), &materialized));
}

#[test]
fn reentrant_queries_during_populate_observe_the_object() {
    fn init(
        obj: &GcRef<DynObject>,
        template: &DeferredTemplate,
        _mode: InitMode,
    ) -> PropertyResult<()> {
        // Install the descriptor first, then query mid-population: the
        // nested call must see a valid, partially populated object.
        template.convert(obj);
        let ctx = obj.context();
        obj.populate_data_property(
            ctx.intern("first"),
            Value::int32(1),
            PropertyAttributes::data(),
        )?;
        let nested = obj.get(&ctx, ctx.intern("first"), None)?;
        obj.populate_data_property(ctx.intern("second"), nested, PropertyAttributes::data())
    }

    let ctx = context();
    let template = Shape::deferred(DeferredTemplate::new(init, 2, false));
    let obj = DynObject::with_deferred_shape(&ctx, &template, None);
    assert_eq!(
        obj.get(&ctx, ctx.intern("second"), None).unwrap(),
        Value::int32(1)
    );
}

#[test]
fn failed_initializer_leaves_object_materialized() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);

    fn init(
        obj: &GcRef<DynObject>,
        template: &DeferredTemplate,
        _mode: InitMode,
    ) -> PropertyResult<()> {
        CALLS.fetch_add(1, Ordering::Relaxed);
        template.convert(obj);
        let ctx = obj.context();
        obj.populate_data_property(
            ctx.intern("partial"),
            Value::int32(1),
            PropertyAttributes::data(),
        )?;
        Err(PropertyError::initializer("allocation failed mid-populate"))
    }

    let ctx = context();
    let template = Shape::deferred(DeferredTemplate::new(init, 4, false));
    let obj = DynObject::with_deferred_shape(&ctx, &template, None);
    let err = obj.get(&ctx, ctx.intern("partial"), None).unwrap_err();
    assert!(matches!(err, PropertyError::Initializer(_)));

    // Failure must not re-enter the deferred state: the initializer ran
    // once, the object is materialized and partially populated.
    assert!(obj.is_materialized());
    assert_eq!(
        obj.get(&ctx, ctx.intern("partial"), None).unwrap(),
        Value::int32(1)
    );
    assert_eq!(CALLS.load(Ordering::Relaxed), 1);
}

#[test]
fn failure_before_convert_still_materializes() {
    fn init(
        _obj: &GcRef<DynObject>,
        _template: &DeferredTemplate,
        _mode: InitMode,
    ) -> PropertyResult<()> {
        Err(PropertyError::initializer("descriptor allocation failed"))
    }

    let ctx = context();
    let template = Shape::deferred(DeferredTemplate::new(init, 4, false));
    let obj = DynObject::with_deferred_shape(&ctx, &template, None);
    assert!(obj.get(&ctx, ctx.intern("x"), None).is_err());
    // An empty concrete layout was installed on the way out.
    assert!(obj.is_materialized());
    assert!(!obj.shape().is_deferred());
    assert_eq!(obj.get(&ctx, ctx.intern("x"), None).unwrap(), Value::undefined());
}

#[test]
#[should_panic(expected = "materialization during context teardown")]
fn materialization_during_teardown_is_fatal() {
    fn init(
        obj: &GcRef<DynObject>,
        template: &DeferredTemplate,
        _mode: InitMode,
    ) -> PropertyResult<()> {
        template.convert(obj);
        Ok(())
    }

    let ctx = context();
    let template = Shape::deferred(DeferredTemplate::new(init, 2, false));
    let obj = DynObject::with_deferred_shape(&ctx, &template, None);
    ctx.close();
    let _ = obj.get(&ctx, ctx.intern("x"), None);
}

#[test]
fn deferred_prototype_materializes_during_chain_walk() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);

    fn init(
        obj: &GcRef<DynObject>,
        template: &DeferredTemplate,
        _mode: InitMode,
    ) -> PropertyResult<()> {
        CALLS.fetch_add(1, Ordering::Relaxed);
        template.convert(obj);
        let ctx = obj.context();
        obj.populate_data_property(
            ctx.intern("inherited"),
            Value::int32(7),
            PropertyAttributes::data(),
        )
    }

    let ctx = context();
    let template = Shape::deferred(DeferredTemplate::new(init, 2, false));
    let proto = DynObject::with_deferred_shape(&ctx, &template, None);
    let child = DynObject::new(&ctx, Some(proto.clone()));

    // Reading through the child forces the prototype to materialize.
    let inherited = ctx.intern("inherited");
    assert_eq!(child.get(&ctx, inherited, None).unwrap(), Value::int32(7));
    assert_eq!(CALLS.load(Ordering::Relaxed), 1);
    // The second read is served by the child's prototype-derived cache
    // entry and must not re-run anything.
    assert_eq!(child.get(&ctx, inherited, None).unwrap(), Value::int32(7));
    assert_eq!(CALLS.load(Ordering::Relaxed), 1);
}
