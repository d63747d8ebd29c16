use std::{borrow::Borrow, collections::HashMap, hash::Hash, num::NonZeroUsize};

type Index = usize;

/// Node of the recency list. Every key lives in exactly one node.
#[derive(Debug, Clone)]
struct CacheEntry<K, V> {
    key: K,
    value: V,
    prev: Option<Index>,
    next: Option<Index>,
}

/// Fixed-capacity least-recently-used cache.
///
/// Entries live in an index-linked list stored in a `Vec` arena; `head` is the
/// most recently used entry and `tail` the least recently used one. `lookup`
/// maps every key to its node, so `get` and `set` are a hash lookup plus a
/// constant-time splice.
///
/// Invariants after every operation:
///
/// - `lookup.len() <= capacity`
/// - `lookup.len()` equals the number of nodes reachable from `head`
/// - every index in `lookup` points at a live node holding that key
///
/// A zero capacity cannot be expressed: construction takes a [`NonZeroUsize`].
#[derive(Debug, Clone)]
pub struct LruCache<K, V> {
    capacity: NonZeroUsize,
    lookup: HashMap<K, Index>,
    nodes: Vec<Option<CacheEntry<K, V>>>,
    free_list: Vec<Index>,
    head: Option<Index>,
    tail: Option<Index>,
    metrics: CacheMetrics,
}

impl<K, V> LruCache<K, V>
where
    K: Clone + Eq + Hash,
{
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            lookup: HashMap::new(),
            nodes: Vec::new(),
            free_list: Vec::new(),
            head: None,
            tail: None,
            metrics: CacheMetrics::default(),
        }
    }

    /// Returns the value for `key` and marks it as most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(&index) = self.lookup.get(key) else {
            self.metrics.misses += 1;
            return None;
        };

        self.metrics.hits += 1;
        self.detach(index);
        self.attach_front(index);

        self.node(index).map(|node| &node.value)
    }

    /// Returns the value for `key` without touching its recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lookup
            .get(key)
            .and_then(|&index| self.node(index))
            .map(|node| &node.value)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lookup.contains_key(key)
    }

    /// Inserts `value` under `key` as the most recently used entry.
    ///
    /// An existing node for `key` is released first, so no duplicate nodes
    /// survive. Returns the evicted least-recently-used entry when the insert
    /// pushed the cache over capacity.
    pub fn set(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(index) = self.lookup.remove(&key) {
            self.release(index);
        }

        let index = self.allocate(key.clone(), value);
        self.attach_front(index);
        self.lookup.insert(key, index);

        if self.lookup.len() > self.capacity.get() {
            return self.evict_tail();
        }

        None
    }

    /// Removes `key` from the cache. The underlying record is not affected.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.lookup.remove(key)?;
        self.release(index).map(|entry| entry.value)
    }

    pub fn clear(&mut self) {
        self.lookup.clear();
        self.nodes.clear();
        self.free_list.clear();
        self.head = None;
        self.tail = None;
    }

    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.metrics.clone()
    }

    /// Iterates from most to least recently used without touching recency.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            cache: self,
            cursor: self.head,
        }
    }

    fn node(&self, index: Index) -> Option<&CacheEntry<K, V>> {
        self.nodes.get(index).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, index: Index) -> Option<&mut CacheEntry<K, V>> {
        self.nodes.get_mut(index).and_then(Option::as_mut)
    }

    fn allocate(&mut self, key: K, value: V) -> Index {
        let entry = CacheEntry {
            key,
            value,
            prev: None,
            next: None,
        };

        match self.free_list.pop() {
            Some(index) => {
                self.nodes[index] = Some(entry);
                index
            }
            None => {
                self.nodes.push(Some(entry));
                self.nodes.len() - 1
            }
        }
    }

    /// Unlinks the node from the list, leaving it allocated.
    fn detach(&mut self, index: Index) {
        let Some((prev, next)) = self.node(index).map(|node| (node.prev, node.next)) else {
            return;
        };

        match prev {
            Some(prev_index) => {
                if let Some(prev_node) = self.node_mut(prev_index) {
                    prev_node.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(next_index) => {
                if let Some(next_node) = self.node_mut(next_index) {
                    next_node.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(node) = self.node_mut(index) {
            node.prev = None;
            node.next = None;
        }
    }

    fn attach_front(&mut self, index: Index) {
        let old_head = self.head;

        if let Some(node) = self.node_mut(index) {
            node.prev = None;
            node.next = old_head;
        }

        if let Some(head_index) = old_head {
            if let Some(head_node) = self.node_mut(head_index) {
                head_node.prev = Some(index);
            }
        }

        self.head = Some(index);

        if self.tail.is_none() {
            self.tail = Some(index);
        }
    }

    /// Unlinks and frees the node, returning its contents.
    fn release(&mut self, index: Index) -> Option<CacheEntry<K, V>> {
        self.detach(index);
        let entry = self.nodes.get_mut(index)?.take();
        if entry.is_some() {
            self.free_list.push(index);
        }
        entry
    }

    fn evict_tail(&mut self) -> Option<(K, V)> {
        let tail_index = self.tail?;
        let entry = self.release(tail_index)?;
        self.lookup.remove(&entry.key);
        self.metrics.evictions += 1;

        Some((entry.key, entry.value))
    }
}

/// Recency-ordered iterator over an [`LruCache`].
pub struct Iter<'a, K, V> {
    cache: &'a LruCache<K, V>,
    cursor: Option<Index>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V>
where
    K: Clone + Eq + Hash,
{
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.cache.node(self.cursor?)?;
        self.cursor = node.next;
        Some((&node.key, &node.value))
    }
}

/// Basic cache metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}
