//! # Marten Object Model
//!
//! Dynamic-object property model for the Marten JavaScript engine: how an
//! object's named properties are represented, evolved, and looked up fast
//! despite fully dynamic add/delete/reconfigure semantics.
//!
//! ## Design Principles
//!
//! - **Shapes (hidden classes)**: objects share a layout descriptor and
//!   own only a shape pointer plus slot storage
//! - **Deferred builtins**: builtin families postpone property population
//!   until the first touch
//! - **Per-shape property caches**: repeated lookups skip the descriptor
//!   search and the prototype-chain walk
//! - **Transparent caching**: with caches on or off, every operation
//!   returns the same result; a registry invalidates prototype-derived
//!   entries on any property mutation
//! - **Single-threaded**: one execution context group per thread, interior
//!   mutability without locks

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod cache;
pub mod context;
pub mod deferred;
pub mod descriptor;
pub mod error;
pub mod gc;
pub mod key;
pub mod object;
pub mod registry;
pub mod shape;
pub mod slots;
pub mod value;

pub use cache::SiteCache;
pub use context::{Context, ContextConfig, ContextGroup, ContextId};
pub use deferred::{DeferredInitializer, DeferredTemplate, InitMode};
pub use descriptor::{
    DictionaryDescriptor, PropertyAttributes, PropertyKind, PropertyLocation, ShapeDescriptor,
};
pub use error::{PropertyError, PropertyResult};
pub use gc::{GcRef, WeakRef};
pub use key::{KeyId, KeyInterner};
pub use object::DynObject;
pub use registry::ProtoCacheRegistry;
pub use shape::Shape;
pub use slots::{SlotLocation, SlotStorage};
pub use value::{AccessorPair, Value};
