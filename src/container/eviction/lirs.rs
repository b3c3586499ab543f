//! LIRS eviction policy.
//!
//! Low Inter-reference Recency Set: keys with a short reuse distance are
//! "hot" (LIR) and are protected; everything else is "cold" (HIR). Only
//! resident cold keys are eviction candidates, so a one-off scan over many
//! keys churns through the small cold set without touching the hot set.
//!
//! Two recency lists are kept:
//! - the stack `S` holds LIR keys plus recently seen HIR keys (resident or
//!   not); its bottom is always an LIR key after pruning
//! - the queue `Q` holds resident HIR keys; its front is the next victim
//!
//! Non-resident keys are also queued in the order they lost residency, so
//! the oldest one can be forgotten without scanning the stack.

use std::collections::HashMap;
use std::hash::Hash;

use super::lru::LruTracker;
use super::EvictionPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Lir,
    HirResident,
    HirNonResident,
}

// == LIRS Policy ==
#[derive(Debug)]
pub struct LirsPolicy<K> {
    stack: LruTracker<K>,
    queue: LruTracker<K>,
    /// Non-resident HIR keys, oldest first
    ghosts: LruTracker<K>,
    status: HashMap<K, Status>,
    lir_count: usize,
    lir_capacity: usize,
    /// Upper bound on remembered non-resident keys
    non_resident_limit: usize,
}

impl<K: Eq + Hash + Clone> LirsPolicy<K> {
    /// Creates a policy for a segment holding at most `capacity` entries.
    ///
    /// About one percent of the capacity (at least one slot) is reserved
    /// for resident cold keys.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let hir_capacity = capacity.div_ceil(100).max(1);
        Self {
            stack: LruTracker::new(),
            queue: LruTracker::new(),
            ghosts: LruTracker::new(),
            status: HashMap::new(),
            lir_count: 0,
            lir_capacity: capacity.saturating_sub(hir_capacity),
            non_resident_limit: capacity,
        }
    }

    /// True if the key is currently classified hot.
    pub fn is_hot(&self, key: &K) -> bool {
        self.status.get(key) == Some(&Status::Lir)
    }

    /// Number of resident cold keys.
    pub fn cold_len(&self) -> usize {
        self.queue.len()
    }

    /// Drops non-LIR keys from the bottom of the stack.
    fn prune(&mut self) {
        while let Some(bottom) = self.stack.peek_oldest().cloned() {
            match self.status.get(&bottom) {
                Some(Status::Lir) => break,
                Some(Status::HirNonResident) => {
                    self.stack.remove(&bottom);
                    self.status.remove(&bottom);
                    self.ghosts.remove(&bottom);
                }
                _ => {
                    self.stack.remove(&bottom);
                }
            }
        }
    }

    /// Turns the bottom LIR key into a resident HIR key.
    fn demote_bottom_lir(&mut self) {
        self.prune();
        if let Some(bottom) = self.stack.evict_oldest() {
            self.status.insert(bottom.clone(), Status::HirResident);
            self.lir_count -= 1;
            self.queue.touch(&bottom);
        }
        self.prune();
    }

    fn promote(&mut self, key: &K) {
        self.status.insert(key.clone(), Status::Lir);
        self.lir_count += 1;
        self.queue.remove(key);
        self.stack.touch(key);
        if self.lir_count > self.lir_capacity {
            self.demote_bottom_lir();
        }
    }

    fn trim_non_resident(&mut self) {
        while self.ghosts.len() > self.non_resident_limit {
            let Some(key) = self.ghosts.evict_oldest() else {
                break;
            };
            self.stack.remove(&key);
            self.status.remove(&key);
        }
    }
}

impl<K: Eq + Hash + Clone + Send> EvictionPolicy<K> for LirsPolicy<K> {
    fn record_insert(&mut self, key: &K) {
        match self.status.get(key).copied() {
            Some(Status::HirNonResident) => {
                // Reused while still remembered: short reuse distance, so hot.
                self.ghosts.remove(key);
                self.promote(key);
            }
            Some(_) => self.record_access(key),
            None if self.lir_count < self.lir_capacity => {
                self.status.insert(key.clone(), Status::Lir);
                self.lir_count += 1;
                self.stack.touch(key);
            }
            None => {
                self.status.insert(key.clone(), Status::HirResident);
                self.stack.touch(key);
                self.queue.touch(key);
            }
        }
    }

    fn record_access(&mut self, key: &K) {
        match self.status.get(key).copied() {
            Some(Status::Lir) => {
                let was_bottom = self.stack.peek_oldest() == Some(key);
                self.stack.touch(key);
                if was_bottom {
                    self.prune();
                }
            }
            Some(Status::HirResident) if self.stack.contains(key) => self.promote(key),
            Some(Status::HirResident) => {
                self.stack.touch(key);
                self.queue.touch(key);
            }
            Some(Status::HirNonResident) | None => {}
        }
    }

    fn record_removal(&mut self, key: &K) {
        match self.status.remove(key) {
            Some(Status::Lir) => {
                self.lir_count -= 1;
                self.stack.remove(key);
                self.prune();
            }
            Some(Status::HirResident) => {
                self.queue.remove(key);
                self.stack.remove(key);
            }
            Some(Status::HirNonResident) => {
                self.ghosts.remove(key);
                self.stack.remove(key);
            }
            None => {}
        }
    }

    fn select_victim(&mut self) -> Option<K> {
        if let Some(victim) = self.queue.evict_oldest() {
            if self.stack.contains(&victim) {
                self.status.insert(victim.clone(), Status::HirNonResident);
                self.ghosts.touch(&victim);
                self.trim_non_resident();
            } else {
                self.status.remove(&victim);
            }
            return Some(victim);
        }

        // No cold residents left: fall back to the coldest hot key.
        self.prune();
        let victim = self.stack.evict_oldest()?;
        if self.status.remove(&victim) == Some(Status::Lir) {
            self.lir_count -= 1;
        }
        self.prune();
        Some(victim)
    }

    fn clear(&mut self) {
        self.stack.clear();
        self.queue.clear();
        self.status.clear();
        self.ghosts.clear();
        self.lir_count = 0;
    }

    fn len(&self) -> usize {
        self.lir_count + self.queue.len()
    }
}
