//! A small order-tracking LRU map used by both cache tiers. Eviction is not
//! a callback: `insert` hands the displaced entry back to the caller, which
//! lets the two tiers consult each other and the shared entry counter
//! without re-entrancy.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

#[derive(Debug)]
pub(crate) struct LruCache<K, V> {
    map: HashMap<K, V>,
    /// Keys from most to least recently used.
    order: VecDeque<K>,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> LruCache<K, V> {
        LruCache {
            map: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Inserts or replaces, marking the key most recent. Returns the least
    /// recently used entry when a new key pushes the cache over capacity.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if self.map.insert(key.clone(), value).is_some() {
            self.touch(&key);
            return None;
        }
        self.order.push_front(key);
        if self.map.len() > self.capacity {
            return self.pop_lru();
        }
        None
    }

    /// Looks a key up and refreshes its recency.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if self.map.contains_key(key) {
            self.touch(key);
        }
        self.map.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Removes and returns the least recently used entry.
    pub fn pop_lru(&mut self) -> Option<(K, V)> {
        let key = self.order.pop_back()?;
        let value = self.map.remove(&key)?;
        Some((key, value))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn touch(&mut self, key: &K) {
        if let Some(position) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(position).unwrap();
            self.order.push_front(k);
        }
    }
}
