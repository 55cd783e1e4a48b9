//! Generation-counted handles
//!
//! A [`Handle`] packs the arena id (16 bits), the slot generation (16 bits)
//! and the slot index (32 bits). Removing an entry bumps the slot generation,
//! so a stale handle never resolves to whatever reuses its slot later. A slot
//! whose generation is exhausted is retired instead of wrapping around. Arena
//! ids come from a process-wide counter, so handles from two instances never
//! collide either.

use std::fmt;
use std::sync::atomic::{AtomicU16, Ordering};

static NEXT_ARENA: AtomicU16 = AtomicU16::new(1);

/// Opaque identifier of an open stream
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    fn new(arena: u16, generation: u16, index: u32) -> Self {
        Handle(((arena as u64) << 48) | ((generation as u64) << 32) | index as u64)
    }

    pub fn from_raw(raw: u64) -> Self {
        Handle(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    fn arena(self) -> u16 {
        (self.0 >> 48) as u16
    }

    fn generation(self) -> u16 {
        (self.0 >> 32) as u16
    }

    fn index(self) -> usize {
        (self.0 & 0xFFFF_FFFF) as usize
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}:{}:{})", self.arena(), self.generation(), self.index())
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Slot<T> {
    generation: u16,
    value: Option<T>,
}

/// Slot table addressed by [`Handle`]
pub struct HandleArena<T> {
    id: u16,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> HandleArena<T> {
    pub fn new() -> Self {
        let mut id = NEXT_ARENA.fetch_add(1, Ordering::Relaxed);
        if id == 0 {
            id = NEXT_ARENA.fetch_add(1, Ordering::Relaxed);
        }
        Self {
            id,
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn insert(&mut self, value: T) -> Handle {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return Handle::new(self.id, slot.generation, index);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        Handle::new(self.id, 0, index)
    }

    fn slot(&self, handle: Handle) -> Option<&Slot<T>> {
        if handle.arena() != self.id {
            return None;
        }
        self.slots
            .get(handle.index())
            .filter(|slot| slot.generation == handle.generation())
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slot(handle).and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        if handle.arena() != self.id {
            return None;
        }
        self.slots
            .get_mut(handle.index())
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        if self.get(handle).is_none() {
            return None;
        }
        let index = handle.index();
        let slot = &mut self.slots[index];
        let value = slot.value.take();
        self.len -= 1;
        // Every generation of this slot has been handed out
        let Some(next) = slot.generation.checked_add(1) else {
            return value;
        };
        slot.generation = next;
        self.free.push(index as u32);
        value
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        let id = self.id;
        self.slots.iter().enumerate().filter_map(move |(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (Handle::new(id, slot.generation, index as u32), value))
        })
    }

    pub fn handles(&self) -> Vec<Handle> {
        self.iter().map(|(handle, _)| handle).collect()
    }
}

impl<T> Default for HandleArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn removed_handle_is_stale_after_slot_reuse() {
        let mut arena = HandleArena::new();
        let first = arena.insert("a");
        assert_eq!(arena.remove(first), Some("a"));
        let second = arena.insert("b");
        assert_ne!(first, second);
        assert_eq!(arena.get(first), None);
        assert_eq!(arena.get(second), Some(&"b"));
        assert_eq!(arena.remove(first), None);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn handles_from_other_arenas_do_not_resolve() {
        let mut a = HandleArena::new();
        let mut b = HandleArena::new();
        let handle = a.insert(1);
        b.insert(2);
        assert_eq!(b.get(handle), None);
        assert_eq!(Handle::from_raw(handle.raw()), handle);
    }

    #[test]
    fn exhausted_slot_is_retired_not_reused() {
        let mut arena = HandleArena::new();
        let stale = arena.insert(0u32);
        arena.remove(stale);
        let mut current = stale;
        for cycle in 1..=u32::from(u16::MAX) + 1 {
            current = arena.insert(cycle);
            assert_eq!(arena.get(stale), None, "stale handle resolved after {cycle} cycles");
            arena.remove(current);
        }
        assert_ne!(current, stale);

        let fresh = arena.insert(7);
        assert_ne!(fresh, stale);
        assert_eq!(arena.get(stale), None);
        assert_eq!(arena.remove(stale), None);
        assert_eq!(arena.get(fresh), Some(&7));
        assert_eq!(arena.len(), 1);
    }

    proptest! {
        #[test]
        fn live_handles_always_resolve(ops in proptest::collection::vec(any::<bool>(), 1..200)) {
            let mut arena = HandleArena::new();
            let mut live: Vec<(Handle, usize)> = Vec::new();
            let mut dead: Vec<Handle> = Vec::new();
            for (n, insert) in ops.into_iter().enumerate() {
                if insert || live.is_empty() {
                    live.push((arena.insert(n), n));
                } else {
                    let (handle, _) = live.remove(n % live.len());
                    arena.remove(handle);
                    dead.push(handle);
                }
            }
            for (handle, value) in &live {
                prop_assert_eq!(arena.get(*handle), Some(value));
            }
            for handle in &dead {
                prop_assert!(arena.get(*handle).is_none());
            }
            prop_assert_eq!(arena.len(), live.len());
        }
    }
}
