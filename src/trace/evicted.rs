//! Bounded span data collections that evict oldest entries once full.

use crate::common::{Key, KeyValue, Value};
use std::collections::{HashMap, VecDeque};

/// A queue with a fixed capacity that evicts the oldest element on overflow
/// and counts how many elements were dropped.
#[derive(Clone, Debug, PartialEq)]
pub struct EvictedQueue<T> {
    queue: Option<VecDeque<T>>,
    capacity: u32,
    dropped_count: u32,
}

impl<T> EvictedQueue<T> {
    /// Create a new `EvictedQueue` with the given capacity.
    ///
    /// A capacity of zero means every pushed element is dropped and counted.
    pub fn new(capacity: u32) -> Self {
        EvictedQueue {
            queue: None,
            capacity,
            dropped_count: 0,
        }
    }

    /// Push a new element to the back, evicting the front element if the
    /// queue is at capacity.
    pub fn push_back(&mut self, value: T) {
        if self.capacity == 0 {
            self.dropped_count += 1;
            return;
        }

        let queue = self.queue.get_or_insert_with(VecDeque::new);
        queue.push_back(value);
        if queue.len() as u32 > self.capacity {
            queue.pop_front();
            self.dropped_count += 1;
        }
    }

    /// Moves all the elements of `other` into `self`, leaving `other` empty.
    pub fn append_vec(&mut self, other: &mut Vec<T>) {
        for item in other.drain(..) {
            self.push_back(item);
        }
    }

    /// Returns `true` if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.as_ref().map_or(true, VecDeque::is_empty)
    }

    /// Returns the number of elements currently in the queue.
    pub fn len(&self) -> usize {
        self.queue.as_ref().map_or(0, VecDeque::len)
    }

    /// The number of elements that were evicted or rejected.
    pub fn dropped_count(&self) -> u32 {
        self.dropped_count
    }

    /// Returns an iterator over the retained elements, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.queue.iter().flat_map(|queue| queue.iter())
    }
}

impl<T> IntoIterator for EvictedQueue<T> {
    type Item = T;
    type IntoIter = std::collections::vec_deque::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.queue.unwrap_or_default().into_iter()
    }
}

/// A bounded attribute map that preserves insertion order.
///
/// Setting an existing key replaces its value in place. Once `capacity`
/// distinct keys are present, inserting a new key evicts the oldest key and
/// increments the dropped count.
#[derive(Clone, Debug, PartialEq)]
pub struct EvictedHashMap {
    map: HashMap<Key, Value>,
    insertion_order: VecDeque<Key>,
    capacity: u32,
    dropped_count: u32,
}

impl EvictedHashMap {
    /// Create a new `EvictedHashMap` with the given capacity.
    pub fn new(capacity: u32) -> Self {
        EvictedHashMap {
            map: HashMap::new(),
            insertion_order: VecDeque::new(),
            capacity,
            dropped_count: 0,
        }
    }

    /// Insert a new attribute, evicting the oldest entry on overflow.
    pub fn insert(&mut self, item: KeyValue) {
        let KeyValue { key, value } = item;
        if self.map.insert(key.clone(), value).is_some() {
            // Replaced in place, insertion order and size are unchanged.
            return;
        }

        if self.capacity == 0 {
            self.map.remove(&key);
            self.dropped_count += 1;
            return;
        }

        self.insertion_order.push_back(key);
        if self.insertion_order.len() as u32 > self.capacity {
            if let Some(oldest) = self.insertion_order.pop_front() {
                self.map.remove(&oldest);
            }
            self.dropped_count += 1;
        }
    }

    /// Returns a reference to the value for the given key, if present.
    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.map.get(key)
    }

    /// The number of attributes currently stored.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the map contains no attributes.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The number of attributes that were evicted.
    pub fn dropped_count(&self) -> u32 {
        self.dropped_count
    }

    /// Returns an iterator over the attributes in insertion order, oldest
    /// first.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.insertion_order
            .iter()
            .filter_map(|key| self.map.get_key_value(key))
    }

    /// Drains the map into a plain attribute list, preserving insertion
    /// order.
    pub fn into_key_values(mut self) -> Vec<KeyValue> {
        self.insertion_order
            .drain(..)
            .filter_map(|key| {
                self.map
                    .remove(&key)
                    .map(|value| KeyValue { key, value })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::KeyValue;

    #[test]
    fn queue_keeps_most_recent() {
        let mut queue = EvictedQueue::new(5);
        for i in 0..8 {
            queue.push_back(i);
        }
        assert_eq!(queue.len(), 5);
        assert_eq!(queue.dropped_count(), 3);
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn queue_under_capacity_drops_nothing() {
        let mut queue = EvictedQueue::new(10);
        queue.push_back("a");
        queue.push_back("b");
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped_count(), 0);
    }

    #[test]
    fn queue_zero_capacity_counts_all() {
        let mut queue = EvictedQueue::new(0);
        queue.push_back(1);
        queue.push_back(2);
        assert!(queue.is_empty());
        assert_eq!(queue.dropped_count(), 2);
    }

    #[test]
    fn map_evicts_oldest_key() {
        let mut map = EvictedHashMap::new(2);
        map.insert(KeyValue::new("a", 1i64));
        map.insert(KeyValue::new("b", 2i64));
        map.insert(KeyValue::new("c", 3i64));
        assert_eq!(map.len(), 2);
        assert_eq!(map.dropped_count(), 1);
        assert!(map.get(&"a".into()).is_none());
        let keys: Vec<_> = map.iter().map(|(k, _)| k.as_str().to_owned()).collect();
        assert_eq!(keys, vec!["b", "c"]);
    }

    #[test]
    fn map_replacement_does_not_evict() {
        let mut map = EvictedHashMap::new(2);
        map.insert(KeyValue::new("a", 1i64));
        map.insert(KeyValue::new("b", 2i64));
        map.insert(KeyValue::new("a", 10i64));
        assert_eq!(map.len(), 2);
        assert_eq!(map.dropped_count(), 0);
        assert_eq!(map.get(&"a".into()), Some(&crate::Value::I64(10)));
    }

    #[test]
    fn map_preserves_insertion_order() {
        let mut map = EvictedHashMap::new(16);
        for key in ["one", "two", "three"] {
            map.insert(KeyValue::new(key, true));
        }
        let kvs = map.into_key_values();
        let keys: Vec<_> = kvs.iter().map(|kv| kv.key.as_str().to_owned()).collect();
        assert_eq!(keys, vec!["one", "two", "three"]);
    }
}
