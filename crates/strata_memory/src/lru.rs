// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Recency and expiry bookkeeping for the memory tier.
//!
//! Recency lives in an unbounded [`LruCache`]; the tier enforces its own entry
//! and byte limits by popping the least recently used slot. A second index
//! orders slots by expiry so sweeps only touch entries that are actually due.

use std::collections::BTreeMap;
use std::time::SystemTime;

use lru::LruCache;
use strata_tier::CacheEntry;

#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) entry: CacheEntry,
    pub(crate) size: u64,
    pub(crate) access_count: u64,
    pub(crate) created_at: SystemTime,
    pub(crate) last_accessed_at: SystemTime,
    stamp: u64,
}

pub(crate) enum Lookup {
    Hit(CacheEntry),
    Expired,
    Miss,
}

#[derive(Debug)]
pub(crate) struct LruState {
    slots: LruCache<String, Slot>,
    expiry: BTreeMap<(SystemTime, u64), String>,
    next_stamp: u64,
    total_bytes: u64,
    pub(crate) evictions: u64,
    pub(crate) expirations: u64,
}

impl Default for LruState {
    fn default() -> Self {
        Self {
            slots: LruCache::unbounded(),
            expiry: BTreeMap::new(),
            next_stamp: 0,
            total_bytes: 0,
            evictions: 0,
            expirations: 0,
        }
    }
}

impl LruState {
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Reads a slot without touching its recency.
    pub(crate) fn peek(&self, key: &str) -> Option<&Slot> {
        self.slots.peek(key)
    }

    /// Stores `entry`, evicting least recently used slots until both limits hold.
    ///
    /// Returns the number of evicted slots.
    pub(crate) fn insert(&mut self, key: String, entry: CacheEntry, size: u64, now: SystemTime, max_entries: usize, max_bytes: u64) -> u64 {
        let _ = self.remove(&key);

        let mut evicted = 0;
        while self.slots.len() >= max_entries || self.total_bytes + size > max_bytes {
            if !self.evict_lru() {
                break;
            }
            evicted += 1;
        }

        let stamp = self.next_stamp;
        self.next_stamp += 1;
        if let Some(expires_at) = entry.expires_at() {
            self.expiry.insert((expires_at, stamp), key.clone());
        }
        self.total_bytes += size;
        self.slots.put(
            key,
            Slot {
                entry,
                size,
                access_count: 0,
                created_at: now,
                last_accessed_at: now,
                stamp,
            },
        );

        evicted
    }

    /// Looks up `key`, dropping it if expired and promoting it otherwise.
    pub(crate) fn get(&mut self, key: &str, now: SystemTime) -> Lookup {
        let expired = match self.slots.peek(key) {
            None => return Lookup::Miss,
            Some(slot) => slot.entry.is_expired_at(now),
        };

        if expired {
            let _ = self.remove(key);
            self.expirations += 1;
            return Lookup::Expired;
        }

        let Some(slot) = self.slots.get_mut(key) else {
            return Lookup::Miss;
        };
        slot.access_count += 1;
        slot.last_accessed_at = now;

        Lookup::Hit(slot.entry.clone())
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<Slot> {
        let slot = self.slots.pop(key)?;
        self.forget(&slot);
        Some(slot)
    }

    fn forget(&mut self, slot: &Slot) {
        if let Some(expires_at) = slot.entry.expires_at() {
            self.expiry.remove(&(expires_at, slot.stamp));
        }
        self.total_bytes = self.total_bytes.saturating_sub(slot.size);
    }

    fn evict_lru(&mut self) -> bool {
        let Some((_, slot)) = self.slots.pop_lru() else {
            return false;
        };

        self.forget(&slot);
        self.evictions += 1;
        true
    }

    /// Removes up to `limit` entries whose expiry is strictly before `now`.
    ///
    /// Returns the number removed; fewer than `limit` means nothing else is due.
    pub(crate) fn purge_expired(&mut self, now: SystemTime, limit: usize) -> usize {
        let mut removed = 0;
        while removed < limit {
            let Some(((expires_at, _), key)) = self.expiry.first_key_value() else {
                break;
            };

            if now <= *expires_at {
                break;
            }

            let key = key.clone();
            let _ = self.remove(&key);
            self.expirations += 1;
            removed += 1;
        }

        removed
    }

    /// Keys and slots, most recently used first.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &Slot)> {
        self.slots.iter()
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.expiry.clear();
        self.total_bytes = 0;
    }
}
