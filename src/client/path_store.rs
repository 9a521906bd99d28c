//! Fixed-capacity stores of dirty trait paths.
//!
//! The update engine keeps two stores: *pending* paths the application has
//! marked as updated, and *dispatched* paths that are part of the update
//! request currently in flight. Slots are reused in order, so iteration
//! order is stable for the lifetime of an item; the update response
//! relies on that to match per-element versions and statuses.

use crate::schema::{TraitDataHandle, TraitPath, TraitSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathItem {
    pub path: TraitPath,
    /// Merge into an existing dictionary instead of replacing it
    pub force_merge: bool,
    /// Internal bookkeeping item; never reported to the application
    pub private: bool,
}

#[derive(Debug, Clone)]
pub struct PathStore {
    slots: Vec<Option<PathItem>>,
    len: usize,
}

impl PathStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.slots.len()
    }

    /// Put `path` in the first free slot. Returns `false` when full.
    pub fn add(&mut self, path: TraitPath, force_merge: bool, private: bool) -> bool {
        let Some(slot) = self.slots.iter_mut().find(|slot| slot.is_none()) else {
            return false;
        };
        *slot = Some(PathItem {
            path,
            force_merge,
            private,
        });
        self.len += 1;
        true
    }

    pub fn get(&self, index: usize) -> Option<&PathItem> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn remove_at(&mut self, index: usize) -> Option<PathItem> {
        let removed = self.slots.get_mut(index).and_then(Option::take);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// Remove every path of a trait instance
    pub fn remove_trait(&mut self, handle: TraitDataHandle) {
        for index in self.indices_for_trait(handle) {
            self.remove_at(index);
        }
    }

    /// Valid items with their slot index, in slot order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &PathItem)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|item| (index, item)))
    }

    pub fn indices_for_trait(&self, handle: TraitDataHandle) -> Vec<usize> {
        self.iter()
            .filter(|(_, item)| item.path.trait_handle == handle)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn first_index_for_trait(&self, handle: TraitDataHandle) -> Option<usize> {
        self.iter()
            .find(|(_, item)| item.path.trait_handle == handle)
            .map(|(index, _)| index)
    }

    pub fn is_trait_present(&self, handle: TraitDataHandle) -> bool {
        self.first_index_for_trait(handle).is_some()
    }

    pub fn is_present(&self, path: TraitPath) -> bool {
        self.iter().any(|(_, item)| item.path == path)
    }

    /// True if the store holds `path`, one of its ancestors or one of its
    /// descendants.
    pub fn intersects(&self, path: TraitPath, schema: &TraitSchema) -> bool {
        self.iter().any(|(_, item)| {
            item.path.trait_handle == path.trait_handle
                && (item.path.property == path.property
                    || schema.is_parent(path.property, item.path.property)
                    || schema.is_parent(item.path.property, path.property))
        })
    }

    /// True if the store holds `path` or one of its ancestors.
    pub fn includes(&self, path: TraitPath, schema: &TraitSchema) -> bool {
        self.iter().any(|(_, item)| {
            item.path.trait_handle == path.trait_handle
                && (item.path.property == path.property
                    || schema.is_parent(path.property, item.path.property))
        })
    }

    /// Remove and return all items in slot order
    pub fn drain(&mut self) -> Vec<PathItem> {
        self.len = 0;
        self.slots.iter_mut().filter_map(Option::take).collect()
    }

    pub fn clear(&mut self) {
        self.drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::logging_settings::*;
    use crate::schema::PropertyPathHandle;
    use proptest::prelude::*;

    const T1: TraitDataHandle = TraitDataHandle::new(1);
    const T2: TraitDataHandle = TraitDataHandle::new(2);

    fn path(handle: TraitDataHandle, property: PropertyPathHandle) -> TraitPath {
        TraitPath::new(handle, property)
    }

    #[test_log::test]
    fn add_fails_when_full_and_reuses_freed_slots() {
        let mut store = PathStore::new(2);
        assert!(store.add(path(T1, MIN_LOG_TIME), false, false));
        assert!(store.add(path(T1, MAX_LOG_TIME), false, false));
        assert!(store.is_full());
        assert!(!store.add(path(T1, CURRENT_IMPORTANCE), false, false));

        store.remove_at(0);
        assert!(store.add(path(T1, CURRENT_IMPORTANCE), false, false));
        assert_eq!(store.get(0).map(|i| i.path), Some(path(T1, CURRENT_IMPORTANCE)));
    }

    #[test_log::test]
    fn remove_trait_only_touches_that_trait() {
        let mut store = PathStore::new(4);
        store.add(path(T1, MIN_LOG_TIME), false, false);
        store.add(path(T2, MIN_LOG_TIME), false, false);
        store.add(path(T1, MAX_LOG_TIME), false, false);

        store.remove_trait(T1);
        assert_eq!(store.len(), 1);
        assert!(!store.is_trait_present(T1));
        assert!(store.is_present(path(T2, MIN_LOG_TIME)));
    }

    #[test_log::test]
    fn intersects_and_includes() {
        let mut store = PathStore::new(4);
        store.add(path(T1, TRAIT_LOGGING_IMPORTANCE), false, false);

        // descendant: intersects and included
        let value = path(T1, TRAIT_LOGGING_IMPORTANCE_VALUE);
        assert!(store.intersects(value, &SCHEMA));
        assert!(store.includes(value, &SCHEMA));

        // ancestor: intersects but not included
        let root = path(T1, ROOT);
        assert!(store.intersects(root, &SCHEMA));
        assert!(!store.includes(root, &SCHEMA));

        // sibling and other trait: neither
        assert!(!store.intersects(path(T1, MIN_LOG_TIME), &SCHEMA));
        assert!(!store.intersects(path(T2, TRAIT_LOGGING_IMPORTANCE), &SCHEMA));
    }

    #[test_log::test]
    fn drain_keeps_slot_order() {
        let mut store = PathStore::new(3);
        store.add(path(T1, MIN_LOG_TIME), false, false);
        store.add(path(T1, MAX_LOG_TIME), false, true);
        let drained: Vec<_> = store.drain().into_iter().map(|i| i.path.property).collect();
        assert_eq!(drained, vec![MIN_LOG_TIME, MAX_LOG_TIME]);
        assert!(store.is_empty());
    }

    proptest! {
        #[test]
        fn len_matches_valid_slots(ops in proptest::collection::vec((any::<bool>(), 0usize..8, 2u32..8), 0..64)) {
            let mut store = PathStore::new(8);
            for (add, index, property) in ops {
                if add {
                    store.add(path(T1, PropertyPathHandle::new(property)), false, false);
                } else {
                    store.remove_at(index);
                }
                prop_assert_eq!(store.len(), store.iter().count());
                prop_assert!(store.len() <= store.capacity());
            }
        }
    }
}
