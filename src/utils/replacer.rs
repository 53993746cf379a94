use std::collections::VecDeque;
use std::hash::Hash;

use hashlink::LinkedHashMap;

/// Chooses which cached entry to reclaim when the pool is full.
///
/// `is_excluded` marks entries that may not be evicted right now (dirty pages,
/// pages held exclusively). The replacer only tracks recency; the caller
/// decides exclusion.
pub trait Replacer<ID: Eq + Hash + Copy> {
    fn record_access(&mut self, entry_id: ID);
    fn select_victim(&self, is_excluded: &dyn Fn(&ID) -> bool) -> Option<ID>;
    fn remove(&mut self, entry_id: ID) -> bool;
    fn size(&self) -> usize;

    fn evict(&mut self, is_excluded: &dyn Fn(&ID) -> bool) -> Option<ID> {
        let victim = self.select_victim(is_excluded)?;
        self.remove(victim);
        Some(victim)
    }
}

// Entries are kept in access order, least recently used at the front
pub struct LRUReplacer<ID: Eq + Hash + Copy> {
    order: LinkedHashMap<ID, ()>,
}

impl<ID: Eq + Hash + Copy> LRUReplacer<ID> {
    pub fn new() -> Self {
        LRUReplacer {
            order: LinkedHashMap::new(),
        }
    }
}

impl<ID: Eq + Hash + Copy> Default for LRUReplacer<ID> {
    fn default() -> Self {
        Self::new()
    }
}

impl<ID: Eq + Hash + Copy> Replacer<ID> for LRUReplacer<ID> {
    fn record_access(&mut self, entry_id: ID) {
        self.order.remove(&entry_id);
        self.order.insert(entry_id, ());
    }

    fn select_victim(&self, is_excluded: &dyn Fn(&ID) -> bool) -> Option<ID> {
        self.order
            .keys()
            .find(|entry_id| !is_excluded(entry_id))
            .copied()
    }

    fn remove(&mut self, entry_id: ID) -> bool {
        self.order.remove(&entry_id).is_some()
    }

    fn size(&self) -> usize {
        self.order.len()
    }
}

#[derive(Debug)]
struct LRUKNode {
    // Oldest retained access at the front, at most k entries
    history: VecDeque<usize>,
    k: usize,
}

impl LRUKNode {
    fn new(k: usize) -> Self {
        LRUKNode {
            history: VecDeque::with_capacity(k),
            k,
        }
    }

    fn push_timestamp(&mut self, timestamp: usize) {
        self.history.push_back(timestamp);
        if self.history.len() > self.k {
            self.history.pop_front();
        }
    }

    // None stands for an infinite backward k-distance
    fn k_distance(&self, now: usize) -> Option<usize> {
        if self.history.len() < self.k {
            return None;
        }
        self.history.front().map(|kth| now - kth)
    }

    fn earliest(&self) -> usize {
        self.history.front().copied().unwrap_or(0)
    }
}

pub struct LRUKReplacer<ID: Eq + Hash + Copy> {
    node_store: LinkedHashMap<ID, LRUKNode>,
    current_timestamp: usize,
    k: usize,
}

impl<ID: Eq + Hash + Copy> LRUKReplacer<ID> {
    pub fn new(k: usize) -> Self {
        LRUKReplacer {
            node_store: LinkedHashMap::new(),
            current_timestamp: 0,
            k: k.max(1),
        }
    }
}

impl<ID: Eq + Hash + Copy> Replacer<ID> for LRUKReplacer<ID> {
    fn record_access(&mut self, entry_id: ID) {
        let timestamp = self.current_timestamp;
        self.current_timestamp += 1;

        let k = self.k;
        self.node_store
            .entry(entry_id)
            .or_insert_with(|| LRUKNode::new(k))
            .push_timestamp(timestamp);
    }

    fn select_victim(&self, is_excluded: &dyn Fn(&ID) -> bool) -> Option<ID> {
        let now = self.current_timestamp;

        // Entries with fewer than k accesses go first, least recently seen first.
        // Otherwise the largest backward k-distance wins.
        let mut oldest_infinite: Option<(ID, usize)> = None;
        let mut max_distance: Option<(ID, usize)> = None;

        for (id, node) in self.node_store.iter() {
            if is_excluded(id) {
                continue;
            }

            match node.k_distance(now) {
                None => {
                    let earliest = node.earliest();
                    if oldest_infinite.map_or(true, |(_, ts)| earliest < ts) {
                        oldest_infinite = Some((*id, earliest));
                    }
                }
                Some(distance) => {
                    if max_distance.map_or(true, |(_, d)| distance > d) {
                        max_distance = Some((*id, distance));
                    }
                }
            }
        }

        oldest_infinite.or(max_distance).map(|(id, _)| id)
    }

    fn remove(&mut self, entry_id: ID) -> bool {
        self.node_store.remove(&entry_id).is_some()
    }

    fn size(&self) -> usize {
        self.node_store.len()
    }
}
