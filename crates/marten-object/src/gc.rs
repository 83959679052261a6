//! Garbage collection handles
//!
//! The property model does not own a collector. Objects and shapes are
//! reference-counted handles; back-references that must not keep their
//! target alive (cache owners, registry entries, transition tables) are
//! weak handles that tolerate dangling by upgrade-and-skip.

use std::sync::{Arc, Weak};

/// Handle to a managed object.
///
/// This is a reference-counted handle that keeps objects alive.
pub type GcRef<T> = Arc<T>;

/// Non-owning observation handle.
///
/// Holders must treat a failed upgrade as "target destroyed" and skip the
/// entry rather than report an error.
pub type WeakRef<T> = Weak<T>;

/// Create a new managed handle.
pub fn gc_alloc<T>(value: T) -> GcRef<T> {
    Arc::new(value)
}
