//! Arena-based storage with typed handles.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// A typed handle into an [`Arena`].
///
/// Handles are lightweight identifiers (u32 index) that stay valid for the
/// lifetime of the arena. Handle order is creation order.
pub struct Handle<T> {
    index: u32,
    _phantom: PhantomData<T>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.index)
    }
}

impl<T> Handle<T> {
    pub(crate) fn new(index: u32) -> Self {
        Self {
            index,
            _phantom: PhantomData,
        }
    }

    /// Returns the zero-based index of this handle.
    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// An append-only arena with typed [`Handle`]-based access.
#[derive(Clone, Debug)]
pub struct Arena<T> {
    data: Vec<T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the handle that will be assigned to the next appended value.
    pub fn next_handle(&self) -> Handle<T> {
        Handle::new(self.checked_index())
    }

    /// Appends a value and returns its handle.
    pub fn append(&mut self, value: T) -> Handle<T> {
        let index = self.checked_index();
        self.data.push(value);
        Handle::new(index)
    }

    fn checked_index(&self) -> u32 {
        u32::try_from(self.data.len()).unwrap_or_else(|_| {
            panic!("arena overflow: {} items exceeds u32::MAX", self.data.len())
        })
    }

    pub fn try_get(&self, handle: Handle<T>) -> Option<&T> {
        self.data.get(handle.index())
    }

    pub fn try_get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.data.get_mut(handle.index())
    }

    /// Returns `true` if `handle` was issued by this arena.
    pub fn contains(&self, handle: Handle<T>) -> bool {
        handle.index() < self.data.len()
    }

    /// Iterates over every issued handle in creation order.
    pub fn handles(&self) -> impl Iterator<Item = Handle<T>> + use<T> {
        // Safety: arena size bounded by u32::MAX (enforced in append)
        (0..self.data.len() as u32).map(Handle::new)
    }

    /// Iterates over `(handle, &value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.data
            .iter()
            .enumerate()
            .map(|(i, v)| (Handle::new(i as u32), v))
    }

    /// Iterates over `(handle, &mut value)` pairs.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.data
            .iter_mut()
            .enumerate()
            .map(|(i, v)| (Handle::new(i as u32), v))
    }
}

impl<T> Index<Handle<T>> for Arena<T> {
    type Output = T;

    fn index(&self, handle: Handle<T>) -> &T {
        &self.data[handle.index()]
    }
}

impl<T> IndexMut<Handle<T>> for Arena<T> {
    fn index_mut(&mut self, handle: Handle<T>) -> &mut T {
        &mut self.data[handle.index()]
    }
}

/// A dense side table keyed by [`Handle`].
///
/// Used for per-node analysis state (reachability rows, claim marks) that
/// must not live on the node itself. Slots start empty; iteration is in
/// handle order, which keeps every consumer deterministic.
#[derive(Clone, Debug)]
pub struct HandleMap<T, V> {
    slots: Vec<Option<V>>,
    _phantom: PhantomData<T>,
}

impl<T, V> Default for HandleMap<T, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, V> HandleMap<T, V> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            _phantom: PhantomData,
        }
    }

    /// Creates a map with room for `len` handles.
    pub fn with_capacity(len: usize) -> Self {
        let mut slots = Vec::with_capacity(len);
        slots.resize_with(len, || None);
        Self {
            slots,
            _phantom: PhantomData,
        }
    }

    pub fn insert(&mut self, handle: Handle<T>, value: V) -> Option<V> {
        let i = handle.index();
        if i >= self.slots.len() {
            self.slots.resize_with(i + 1, || None);
        }
        self.slots[i].replace(value)
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&V> {
        self.slots.get(handle.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut V> {
        self.slots.get_mut(handle.index()).and_then(Option::as_mut)
    }

    pub fn remove(&mut self, handle: Handle<T>) -> Option<V> {
        self.slots.get_mut(handle.index()).and_then(Option::take)
    }

    pub fn contains_key(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Iterates over occupied `(handle, &value)` pairs in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &V)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (Handle::new(i as u32), v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_append_and_access() {
        let mut arena = Arena::new();
        let h0 = arena.append("hello");
        let h1 = arena.append("world");
        assert_eq!(arena[h0], "hello");
        assert_eq!(arena[h1], "world");
        assert_eq!(arena.len(), 2);
        assert!(arena.contains(h1));
    }

    #[test]
    fn arena_handles_in_creation_order() {
        let mut arena = Arena::new();
        arena.append(10);
        arena.append(20);
        arena.append(30);
        let items: Vec<_> = arena.handles().map(|h| (h.index(), arena[h])).collect();
        assert_eq!(items, vec![(0, 10), (1, 20), (2, 30)]);
    }

    #[test]
    fn arena_next_handle() {
        let mut arena = Arena::<i32>::new();
        assert_eq!(arena.next_handle().index(), 0);
        arena.append(42);
        assert_eq!(arena.next_handle().index(), 1);
    }

    #[test]
    fn arena_try_get() {
        let mut arena = Arena::new();
        let h0 = arena.append(42);
        assert_eq!(arena.try_get(h0), Some(&42));
        assert_eq!(arena.try_get(Handle::new(99)), None);
        assert!(!arena.contains(Handle::new(99)));
    }

    #[test]
    fn handle_ordering() {
        let h0: Handle<u32> = Handle::new(0);
        let h1: Handle<u32> = Handle::new(1);
        assert!(h0 < h1);
        assert_eq!(format!("{h1:?}"), "[1]");
    }

    #[test]
    fn handle_map_sparse_insert() {
        let mut map: HandleMap<u32, &str> = HandleMap::new();
        assert!(map.is_empty());
        map.insert(Handle::new(3), "three");
        map.insert(Handle::new(1), "one");
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(Handle::new(3)), Some(&"three"));
        assert_eq!(map.get(Handle::new(2)), None);
        assert_eq!(map.get(Handle::new(40)), None);

        let order: Vec<_> = map.iter().map(|(h, v)| (h.index(), *v)).collect();
        assert_eq!(order, vec![(1, "one"), (3, "three")]);

        assert_eq!(map.insert(Handle::new(1), "uno"), Some("one"));
        assert_eq!(map.remove(Handle::new(1)), Some("uno"));
        assert!(!map.contains_key(Handle::new(1)));
    }
}
