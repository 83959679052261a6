//! Interned property keys
//!
//! Property names are interned once per context group into stable small
//! integers. Equality is integer equality, and the low bits of a key id
//! index the per-shape property cache directly.

use std::cell::RefCell;
use std::sync::Arc;

use rustc_hash::FxHashMap;

/// Stable identifier of an interned property key.
///
/// Valid for the lifetime of the context group that interned it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(u32);

impl KeyId {
    /// The raw id.
    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// The id as a table index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

struct KeyRecord {
    name: Arc<str>,
    is_symbol: bool,
}

/// Intern table mapping property names to stable [`KeyId`]s.
///
/// Single-threaded by design; one table per context group.
pub struct KeyInterner {
    by_name: RefCell<FxHashMap<Arc<str>, KeyId>>,
    records: RefCell<Vec<KeyRecord>>,
}

impl KeyInterner {
    /// Create an empty interner.
    pub fn new() -> Self {
        Self {
            by_name: RefCell::new(FxHashMap::default()),
            records: RefCell::new(Vec::new()),
        }
    }

    /// Intern a property name, returning its stable id.
    ///
    /// Interning the same name twice returns the same id.
    pub fn intern(&self, name: &str) -> KeyId {
        if let Some(id) = self.by_name.borrow().get(name) {
            return *id;
        }
        let name: Arc<str> = Arc::from(name);
        let id = self.push(KeyRecord {
            name: name.clone(),
            is_symbol: false,
        });
        self.by_name.borrow_mut().insert(name, id);
        id
    }

    /// Intern a symbol key. Every call mints a fresh id; the description
    /// is kept for diagnostics only and never matched by name.
    pub fn intern_symbol(&self, description: &str) -> KeyId {
        self.push(KeyRecord {
            name: Arc::from(description),
            is_symbol: true,
        })
    }

    /// The name (or symbol description) behind a key id.
    pub fn name(&self, key: KeyId) -> Arc<str> {
        self.records.borrow()[key.index()].name.clone()
    }

    /// Whether the key is a symbol.
    pub fn is_symbol(&self, key: KeyId) -> bool {
        self.records.borrow()[key.index()].is_symbol
    }

    /// Number of interned keys.
    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    /// Whether the interner is empty.
    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    fn push(&self, record: KeyRecord) -> KeyId {
        let mut records = self.records.borrow_mut();
        let id = KeyId(u32::try_from(records.len()).expect("key table overflow"));
        records.push(record);
        id
    }
}

impl Default for KeyInterner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_stable() {
        let interner = KeyInterner::new();
        let a = interner.intern("foo");
        let b = interner.intern("foo");
        assert_eq!(a, b);
        assert_eq!(&*interner.name(a), "foo");
    }

    #[test]
    fn test_symbols_are_unique() {
        let interner = KeyInterner::new();
        let a = interner.intern_symbol("iterator");
        let b = interner.intern_symbol("iterator");
        assert_ne!(a, b);
        assert!(interner.is_symbol(a));
        assert!(!interner.is_symbol(interner.intern("iterator")));
    }

    #[test]
    fn test_ids_are_dense() {
        let interner = KeyInterner::new();
        let a = interner.intern("a");
        let b = interner.intern("b");
        assert_eq!(a.as_u32() + 1, b.as_u32());
        assert_eq!(interner.len(), 2);
    }
}
