//! Shape descriptors
//!
//! A shape descriptor owns the key-to-slot mapping shared by every object
//! of one shape. The core consumes descriptors through the
//! [`ShapeDescriptor`] capability trait; [`DictionaryDescriptor`] is the
//! crate's insertion-ordered implementation, and the one deferred shapes
//! materialize into.

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;

use crate::key::KeyId;
use crate::slots::SlotLocation;

/// Property attributes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PropertyAttributes {
    /// Property is writable
    pub writable: bool,
    /// Property is enumerable
    pub enumerable: bool,
    /// Property is configurable
    pub configurable: bool,
}

impl PropertyAttributes {
    /// Default data property attributes
    pub const fn data() -> Self {
        Self {
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Non-writable, non-enumerable, non-configurable
    pub const fn frozen() -> Self {
        Self {
            writable: false,
            enumerable: false,
            configurable: false,
        }
    }

    /// Attributes for builtin methods: writable and configurable, but not
    /// enumerable.
    pub const fn builtin() -> Self {
        Self {
            writable: true,
            enumerable: false,
            configurable: true,
        }
    }

    /// Pack into a small integer for transition-table keys.
    pub(crate) fn bits(self) -> u8 {
        (self.writable as u8) | (self.enumerable as u8) << 1 | (self.configurable as u8) << 2
    }
}

/// Whether a property stores a plain value or an accessor pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyKind {
    /// Plain data property
    Data,
    /// Accessor (getter/setter) property
    Accessor,
}

/// Result of an exact descriptor lookup: where the property lives and what
/// it is. Never the product of a prototype walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PropertyLocation {
    /// Slot holding the property's value
    pub slot: SlotLocation,
    /// The property's attributes
    pub attributes: PropertyAttributes,
    /// Data or accessor
    pub kind: PropertyKind,
}

impl PropertyLocation {
    /// Whether the property is a plain data property.
    pub fn is_data(&self) -> bool {
        self.kind == PropertyKind::Data
    }
}

/// Capability interface between the core and a concrete descriptor.
///
/// Key-set changes never happen through a shared descriptor: the shape
/// layer clones the descriptor into a fresh shape first and mutates the
/// clone, so objects observe shapes as immutable.
pub trait ShapeDescriptor {
    /// Exact lookup, no prototype walk.
    fn find(&self, key: KeyId) -> Option<PropertyLocation>;

    /// Add a property, assigning it the next free slot. The key must not
    /// already be present.
    fn add_property(
        &mut self,
        key: KeyId,
        attributes: PropertyAttributes,
        kind: PropertyKind,
    ) -> PropertyLocation;

    /// Remove a property. Returns its former location, or `None` if the
    /// key was absent. Freed slots are not reused.
    fn delete_property(&mut self, key: KeyId) -> Option<PropertyLocation>;

    /// Reconfigure a property's attributes (and optionally its kind).
    /// Returns `false` if the key is absent.
    fn set_attributes(
        &mut self,
        key: KeyId,
        attributes: PropertyAttributes,
        kind: PropertyKind,
    ) -> bool;

    /// All keys in insertion order.
    fn enumerate(&self) -> Vec<KeyId>;

    /// Number of properties.
    fn property_count(&self) -> usize;

    /// Total number of slots ever assigned (inline plus auxiliary).
    fn slot_capacity(&self) -> usize;

    /// Whether any property is an accessor.
    fn has_accessors(&self) -> bool;

    /// Translate a physical slot back to the descriptor's logical property
    /// index. Used only by debug consistency assertions tying a cached
    /// slot back to this descriptor's own bookkeeping.
    fn slot_index_for(&self, index: u16, is_inline: bool) -> Option<usize>;

    /// Clone into a fresh boxed descriptor for a shape transition.
    fn clone_box(&self) -> Box<dyn ShapeDescriptor>;
}

#[derive(Clone, Copy, Debug)]
struct PropertyRecord {
    location: PropertyLocation,
}

/// Insertion-ordered dictionary descriptor.
///
/// Slot assignment is append-only: the first `inline_capacity` logical
/// slots live inline in the object header, the rest in the auxiliary
/// block.
#[derive(Clone)]
pub struct DictionaryDescriptor {
    map: IndexMap<KeyId, PropertyRecord, FxBuildHasher>,
    inline_capacity: u16,
    next_slot: u16,
    has_accessors: bool,
}

impl DictionaryDescriptor {
    /// Create an empty descriptor for objects with the given inline slot
    /// capacity, sized for roughly `capacity` properties.
    pub fn with_capacity(capacity: u16, inline_capacity: u16) -> Self {
        Self {
            map: IndexMap::with_capacity_and_hasher(capacity as usize, FxBuildHasher),
            inline_capacity,
            next_slot: 0,
            has_accessors: false,
        }
    }

    fn location_of(&self, logical: u16) -> SlotLocation {
        if logical < self.inline_capacity {
            SlotLocation {
                index: logical,
                is_inline: true,
            }
        } else {
            SlotLocation {
                index: logical - self.inline_capacity,
                is_inline: false,
            }
        }
    }
}

impl ShapeDescriptor for DictionaryDescriptor {
    fn find(&self, key: KeyId) -> Option<PropertyLocation> {
        self.map.get(&key).map(|record| record.location)
    }

    fn add_property(
        &mut self,
        key: KeyId,
        attributes: PropertyAttributes,
        kind: PropertyKind,
    ) -> PropertyLocation {
        debug_assert!(self.map.get(&key).is_none(), "property already present");
        let location = PropertyLocation {
            slot: self.location_of(self.next_slot),
            attributes,
            kind,
        };
        self.next_slot += 1;
        if kind == PropertyKind::Accessor {
            self.has_accessors = true;
        }
        self.map.insert(key, PropertyRecord { location });
        location
    }

    fn delete_property(&mut self, key: KeyId) -> Option<PropertyLocation> {
        // shift_remove keeps the enumeration order of the survivors.
        self.map
            .shift_remove(&key)
            .map(|record| record.location)
    }

    fn set_attributes(
        &mut self,
        key: KeyId,
        attributes: PropertyAttributes,
        kind: PropertyKind,
    ) -> bool {
        match self.map.get_mut(&key) {
            Some(record) => {
                record.location.attributes = attributes;
                record.location.kind = kind;
                if kind == PropertyKind::Accessor {
                    self.has_accessors = true;
                }
                true
            }
            None => false,
        }
    }

    fn enumerate(&self) -> Vec<KeyId> {
        self.map.keys().copied().collect()
    }

    fn property_count(&self) -> usize {
        self.map.len()
    }

    fn slot_capacity(&self) -> usize {
        self.next_slot as usize
    }

    fn has_accessors(&self) -> bool {
        self.has_accessors
    }

    fn slot_index_for(&self, index: u16, is_inline: bool) -> Option<usize> {
        let slot = SlotLocation { index, is_inline };
        self.map
            .values()
            .position(|record| record.location.slot == slot)
    }

    fn clone_box(&self) -> Box<dyn ShapeDescriptor> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyInterner;

    fn keys(names: &[&str]) -> (KeyInterner, Vec<KeyId>) {
        let interner = KeyInterner::new();
        let ids = names.iter().map(|n| interner.intern(n)).collect();
        (interner, ids)
    }

    #[test]
    fn test_slot_assignment_spills_to_aux() {
        let (_interner, ids) = keys(&["a", "b", "c"]);
        let mut desc = DictionaryDescriptor::with_capacity(4, 2);
        let a = desc.add_property(ids[0], PropertyAttributes::data(), PropertyKind::Data);
        let b = desc.add_property(ids[1], PropertyAttributes::data(), PropertyKind::Data);
        let c = desc.add_property(ids[2], PropertyAttributes::data(), PropertyKind::Data);
        assert!(a.slot.is_inline && a.slot.index == 0);
        assert!(b.slot.is_inline && b.slot.index == 1);
        assert!(!c.slot.is_inline && c.slot.index == 0);
        assert_eq!(desc.slot_capacity(), 3);
    }

    #[test]
    fn test_find_and_delete() {
        let (_interner, ids) = keys(&["x", "y", "z"]);
        let mut desc = DictionaryDescriptor::with_capacity(2, 2);
        desc.add_property(ids[0], PropertyAttributes::data(), PropertyKind::Data);
        desc.add_property(ids[1], PropertyAttributes::data(), PropertyKind::Data);
        assert!(desc.find(ids[0]).is_some());
        assert!(desc.delete_property(ids[0]).is_some());
        assert!(desc.find(ids[0]).is_none());
        // Deletion preserves order and does not reuse slots.
        assert_eq!(desc.enumerate(), vec![ids[1]]);
        let z = desc.add_property(ids[2], PropertyAttributes::data(), PropertyKind::Data);
        assert_eq!(z.slot.index, 0);
        assert!(!z.slot.is_inline);
    }

    #[test]
    fn test_slot_index_for_matches_enumeration() {
        let (_interner, ids) = keys(&["p", "q"]);
        let mut desc = DictionaryDescriptor::with_capacity(2, 1);
        desc.add_property(ids[0], PropertyAttributes::data(), PropertyKind::Data);
        let q = desc.add_property(ids[1], PropertyAttributes::data(), PropertyKind::Data);
        assert_eq!(desc.slot_index_for(q.slot.index, q.slot.is_inline), Some(1));
        assert_eq!(desc.slot_index_for(0, true), Some(0));
        assert_eq!(desc.slot_index_for(5, false), None);
    }
}
