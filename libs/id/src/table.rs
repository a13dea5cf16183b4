//! Slot table mapping handles to values.
//!
//! Slots are reused LIFO. Occupied slots form a doubly linked list in
//! creation order, which is what `head`/`next`/`prev` walk.

use crate::handle::GENERATION_CEILING;
use crate::{Handle, IdError};

/// Maximum number of values a table holds at once.
pub const MAX_LIVE_HANDLES: usize = 0xffff;

#[derive(Debug)]
struct Slot<T> {
    /// Handle issued for the current occupant (stale once vacated).
    handle: Handle,
    value: Option<T>,
    prev: Option<u16>,
    next: Option<u16>,
}

/// Vector-backed arena with generation-checked handles.
#[derive(Debug)]
pub struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u16>,
    head: Option<u16>,
    tail: Option<u16>,
    len: usize,
    generation: u16,
}

impl<T> HandleTable<T> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
            generation: 1,
        }
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true when no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores `value` and returns its handle.
    pub fn insert(&mut self, value: T) -> Result<Handle, IdError> {
        self.insert_with(|_| value)
    }

    /// Stores the value built by `make`, which receives the handle it will live under.
    fn insert_with(&mut self, make: impl FnOnce(Handle) -> T) -> Result<Handle, IdError> {
        if self.len >= MAX_LIVE_HANDLES {
            return Err(IdError::Exhausted {
                capacity: MAX_LIVE_HANDLES,
            });
        }

        let handle = Handle::new(self.vacant_slot(), self.next_generation());
        let index = handle.slot() as u16;
        let value = make(handle);

        let tail = self.tail;
        let slot = &mut self.slots[handle.slot()];
        slot.handle = handle;
        slot.value = Some(value);
        slot.prev = tail;
        slot.next = None;

        match tail {
            Some(t) => self.slots[t as usize].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;

        Ok(handle)
    }

    fn vacant_slot(&mut self) -> u16 {
        if let Some(index) = self.free.pop() {
            return index;
        }
        let index = self.slots.len() as u16;
        self.slots.push(Slot {
            handle: Handle::new(index, 1),
            value: None,
            prev: None,
            next: None,
        });
        index
    }

    fn next_generation(&mut self) -> u16 {
        let generation = self.generation;
        self.generation += 1;
        if self.generation >= GENERATION_CEILING {
            self.generation = 1;
        }
        generation
    }

    fn slot(&self, handle: Handle) -> Option<&Slot<T>> {
        self.slots
            .get(handle.slot())
            .filter(|slot| slot.value.is_some() && slot.handle == handle)
    }

    /// Returns true if `handle` names a live value.
    pub fn contains(&self, handle: Handle) -> bool {
        self.slot(handle).is_some()
    }

    /// Looks up a live value.
    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slot(handle).and_then(|slot| slot.value.as_ref())
    }

    /// Looks up a live value mutably.
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.slot())
            .filter(|slot| slot.handle == handle)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Removes and returns the value behind `handle`.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let index = handle.slot();
        let slot = self.slots.get_mut(index)?;
        if slot.handle != handle {
            return None;
        }
        let value = slot.value.take()?;
        let (prev, next) = (slot.prev.take(), slot.next.take());

        match prev {
            Some(p) => self.slots[p as usize].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n as usize].prev = prev,
            None => self.tail = prev,
        }

        self.free.push(index as u16);
        self.len -= 1;
        Some(value)
    }

    /// Oldest live handle.
    pub fn head(&self) -> Option<Handle> {
        self.head.map(|i| self.slots[i as usize].handle)
    }

    /// Live handle created right after `handle`.
    pub fn next(&self, handle: Handle) -> Option<Handle> {
        let next = self.slot(handle)?.next?;
        Some(self.slots[next as usize].handle)
    }

    /// Live handle created right before `handle`.
    pub fn prev(&self, handle: Handle) -> Option<Handle> {
        let prev = self.slot(handle)?.prev?;
        Some(self.slots[prev as usize].handle)
    }

    /// Iterates live values in creation order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            table: self,
            cursor: self.head,
        }
    }

    /// Iterates live values mutably, in unspecified order.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().filter_map(|slot| slot.value.as_mut())
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Creation-order iterator over a [`HandleTable`].
pub struct Iter<'a, T> {
    table: &'a HandleTable<T>,
    cursor: Option<u16>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (Handle, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let slot = &self.table.slots[self.cursor? as usize];
        self.cursor = slot.next;
        slot.value.as_ref().map(|value| (slot.handle, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_insert_and_get() {
        let mut table = HandleTable::new();
        let a = table.insert("a").unwrap();
        let b = table.insert("b").unwrap();
        assert_ne!(a, b);
        assert_eq!(table.get(a), Some(&"a"));
        assert_eq!(table.get(b), Some(&"b"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_stale_handle_rejected() {
        let mut table = HandleTable::new();
        let old = table.insert(1).unwrap();
        assert_eq!(table.remove(old), Some(1));
        let new = table.insert(2).unwrap();

        assert_eq!(old.slot(), new.slot());
        assert_ne!(old, new);
        assert!(table.get(old).is_none());
        assert!(table.get_mut(old).is_none());
        assert!(table.remove(old).is_none());
        assert_eq!(table.get(new), Some(&2));
    }

    #[test]
    fn test_exhaustion_is_deterministic() {
        let mut table = HandleTable::new();
        let mut handles = Vec::with_capacity(MAX_LIVE_HANDLES);
        for i in 0..MAX_LIVE_HANDLES {
            handles.push(table.insert(i).unwrap());
        }
        let err = table.insert(0).unwrap_err();
        assert!(err.is_exhausted());

        // Interleaved frees only open exactly as many slots as were freed.
        table.remove(handles[10]);
        table.remove(handles[20]);
        assert!(table.insert(1).is_ok());
        assert!(table.insert(2).is_ok());
        assert!(table.insert(3).is_err());
        assert_eq!(table.len(), MAX_LIVE_HANDLES);
    }

    #[test]
    fn test_creation_order_walk() {
        let mut table = HandleTable::new();
        let a = table.insert('a').unwrap();
        let b = table.insert('b').unwrap();
        let c = table.insert('c').unwrap();

        assert_eq!(table.head(), Some(a));
        assert_eq!(table.next(a), Some(b));
        assert_eq!(table.next(b), Some(c));
        assert_eq!(table.next(c), None);
        assert_eq!(table.prev(c), Some(b));

        table.remove(b);
        assert_eq!(table.next(a), Some(c));
        assert_eq!(table.prev(c), Some(a));

        // A reused slot goes to the back of the order.
        let d = table.insert('d').unwrap();
        assert_eq!(d.slot(), b.slot());
        let order: Vec<char> = table.iter().map(|(_, v)| *v).collect();
        assert_eq!(order, vec!['a', 'c', 'd']);
        assert_eq!(table.iter().last().map(|(h, _)| h), Some(d));
    }

    #[test]
    fn test_generation_wraps_skipping_zero() {
        let mut table = HandleTable::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..(GENERATION_CEILING as usize - 1) {
            let h = table.insert(()).unwrap();
            assert!(h.generation() >= 1);
            assert!(seen.insert(h), "handle {h} issued twice before wraparound");
            table.remove(h);
        }
        let wrapped = table.insert(()).unwrap();
        assert_eq!(wrapped.generation(), 1);
    }

    #[test]
    fn test_insert_with_sees_own_handle() {
        let mut table = HandleTable::new();
        let h = table.insert_with(|h| h.raw()).unwrap();
        assert_eq!(table.get(h), Some(&h.raw()));
    }

    proptest! {
        #[test]
        fn prop_len_tracks_occupied_slots(ops in proptest::collection::vec(any::<bool>(), 1..200)) {
            let mut table = HandleTable::new();
            let mut live = Vec::new();
            for insert in ops {
                if insert || live.is_empty() {
                    live.push(table.insert(()).unwrap());
                } else {
                    let h = live.remove(0);
                    prop_assert!(table.remove(h).is_some());
                }
                prop_assert_eq!(table.len(), live.len());
                prop_assert_eq!(table.iter().count(), live.len());
            }
        }
    }
}
