//! Bounded least-recently-used cache for compiled plans.
//!
//! A hash map keyed on identity tokens plus a slab-backed doubly-linked
//! recency list: head is the least recently used entry, tail the most. Every
//! operation is O(1) amortized. The cache owns its values; callers get
//! references. Not internally synchronized; callers that share one cache
//! across threads must serialize get/put themselves (see `checker`).

use std::collections::HashMap;
use std::hash::Hash;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("LRU cache capacity {0} not positive")]
pub struct CapacityError(pub usize);

const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    prev: usize,
    next: usize,
}

#[derive(Debug)]
pub struct LruCache<K, V> {
    map: HashMap<K, usize>,
    nodes: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
    capacity: usize,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> Result<Self, CapacityError> {
        if capacity == 0 {
            return Err(CapacityError(capacity));
        }
        Ok(LruCache {
            map: HashMap::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Look up a key, refreshing its recency on hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.detach(idx);
        self.attach_tail(idx);
        self.nodes[idx].as_ref().map(|n| &n.value)
    }

    /// Insert or replace. A present key is refreshed before replacement; an
    /// insertion past capacity silently evicts exactly the least recently
    /// used entry, which is returned.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&idx) = self.map.get(&key) {
            if let Some(node) = self.nodes[idx].as_mut() {
                node.value = value;
            }
            self.detach(idx);
            self.attach_tail(idx);
            return None;
        }

        let evicted = if self.map.len() == self.capacity {
            let lru = self.head;
            self.detach(lru);
            self.free.push(lru);
            self.nodes[lru].take().map(|node| {
                self.map.remove(&node.key);
                (node.key, node.value)
            })
        } else {
            None
        };

        let node = Node { key: key.clone(), value, prev: NIL, next: NIL };
        let idx = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.map.insert(key, idx);
        self.attach_tail(idx);
        evicted
    }

    fn links(&self, idx: usize) -> (usize, usize) {
        match self.nodes[idx].as_ref() {
            Some(n) => (n.prev, n.next),
            None => (NIL, NIL),
        }
    }

    /// Unlink a node from the recency list, leaving its slot intact.
    fn detach(&mut self, idx: usize) {
        let (prev, next) = self.links(idx);
        match prev {
            NIL => self.head = next,
            p => {
                if let Some(n) = self.nodes[p].as_mut() {
                    n.next = next;
                }
            }
        }
        match next {
            NIL => self.tail = prev,
            q => {
                if let Some(n) = self.nodes[q].as_mut() {
                    n.prev = prev;
                }
            }
        }
        if let Some(n) = self.nodes[idx].as_mut() {
            n.prev = NIL;
            n.next = NIL;
        }
    }

    /// Append a detached node at the most-recently-used end.
    fn attach_tail(&mut self, idx: usize) {
        let old_tail = self.tail;
        if let Some(n) = self.nodes[idx].as_mut() {
            n.prev = old_tail;
            n.next = NIL;
        }
        match old_tail {
            NIL => self.head = idx,
            t => {
                if let Some(n) = self.nodes[t].as_mut() {
                    n.next = idx;
                }
            }
        }
        self.tail = idx;
    }

    /// Keys from least to most recently used. Test observability only.
    #[cfg(test)]
    fn lru_order(&self) -> Vec<K> {
        let mut out = Vec::with_capacity(self.map.len());
        let mut cur = self.head;
        while cur != NIL {
            let node = self.nodes[cur].as_ref().expect("linked slot occupied");
            out.push(node.key.clone());
            cur = node.next;
        }
        out
    }
}

// ------------------------------- Tests ------------------------------------ //
