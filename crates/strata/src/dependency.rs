// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Entity to cache-key index used for bulk invalidation.

use std::collections::{HashMap, HashSet};
use std::time::SystemTime;

use parking_lot::RwLock;

/// Maps logical entities to the cache keys that must go when the entity changes.
///
/// The graph is an index, never a source of truth: a key listed here may
/// already be gone from every tier. Each edge remembers the latest expiry of
/// the key it points at so [`prune`](Self::prune) can drop edges whose keys
/// can no longer be cached. Rewriting a key, for example by backfilling a
/// faster tier, must [`extend`](Self::extend) its edges.
///
/// # Examples
///
/// ```
/// use std::time::{Duration, SystemTime};
///
/// use strata::DependencyGraph;
///
/// let graph = DependencyGraph::new();
/// let expires = SystemTime::UNIX_EPOCH + Duration::from_secs(60);
/// graph.add("donor:42", "donor-list:region=NG", Some(expires));
///
/// assert_eq!(graph.take("donor:42"), vec!["donor-list:region=NG".to_owned()]);
/// assert!(graph.take("donor:42").is_empty());
/// ```
#[derive(Debug, Default)]
pub struct DependencyGraph {
    edges: RwLock<Edges>,
}

#[derive(Debug, Default)]
struct Edges {
    by_entity: HashMap<String, HashMap<String, Option<SystemTime>>>,
    // Reverse index so a rewritten key can find its edges.
    by_key: HashMap<String, HashSet<String>>,
}

impl Edges {
    fn unlink(&mut self, entity: &str, key: &str) {
        if let Some(entities) = self.by_key.get_mut(key) {
            entities.remove(entity);
            if entities.is_empty() {
                self.by_key.remove(key);
            }
        }
    }
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `key` depends on `entity`.
    ///
    /// `expires_at` of `None` means the key never expires. Re-adding an edge
    /// keeps the later of the two expiries.
    pub fn add(&self, entity: &str, key: &str, expires_at: Option<SystemTime>) {
        let mut edges = self.edges.write();
        let keys = edges.by_entity.entry(entity.to_owned()).or_default();
        match keys.get_mut(key) {
            Some(current) => *current = later(*current, expires_at),
            None => {
                keys.insert(key.to_owned(), expires_at);
            }
        }
        edges.by_key.entry(key.to_owned()).or_default().insert(entity.to_owned());
    }

    /// Pushes the expiry of every edge pointing at `key` to at least `expires_at`.
    ///
    /// Returns the number of edges touched.
    pub fn extend(&self, key: &str, expires_at: Option<SystemTime>) -> usize {
        let mut edges = self.edges.write();
        let Edges { by_entity, by_key } = &mut *edges;
        let Some(entities) = by_key.get(key) else {
            return 0;
        };

        let mut touched = 0;
        for entity in entities {
            if let Some(current) = by_entity.get_mut(entity).and_then(|keys| keys.get_mut(key)) {
                *current = later(*current, expires_at);
                touched += 1;
            }
        }
        touched
    }

    /// Removes the edge set for `entity` and returns its keys, sorted.
    ///
    /// Unknown entities yield an empty list.
    #[must_use]
    pub fn take(&self, entity: &str) -> Vec<String> {
        let mut edges = self.edges.write();
        let mut keys: Vec<String> = edges
            .by_entity
            .remove(entity)
            .map(|keys| keys.into_keys().collect())
            .unwrap_or_default();
        for key in &keys {
            edges.unlink(entity, key);
        }
        keys.sort_unstable();
        keys
    }

    /// Returns the keys currently registered under `entity`, sorted.
    #[must_use]
    pub fn keys(&self, entity: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .edges
            .read()
            .by_entity
            .get(entity)
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort_unstable();
        keys
    }

    /// Drops edges whose key expired strictly before `now` and any entity left empty.
    ///
    /// Returns the number of edges removed.
    pub fn prune(&self, now: SystemTime) -> usize {
        let mut edges = self.edges.write();
        let mut expired = Vec::new();
        edges.by_entity.retain(|entity, keys| {
            keys.retain(|key, expires_at| {
                let live = expires_at.is_none_or(|expires_at| expires_at >= now);
                if !live {
                    expired.push((entity.clone(), key.clone()));
                }
                live
            });
            !keys.is_empty()
        });

        for (entity, key) in &expired {
            edges.unlink(entity, key);
        }
        expired.len()
    }

    /// Drops every edge.
    pub fn clear(&self) {
        let mut edges = self.edges.write();
        edges.by_entity.clear();
        edges.by_key.clear();
    }

    /// Number of entities with at least one edge.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.edges.read().by_entity.len()
    }

    /// Total number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.read().by_entity.values().map(HashMap::len).sum()
    }

    /// Returns `true` if no edges are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.read().by_entity.is_empty()
    }
}

fn later(a: Option<SystemTime>, b: Option<SystemTime>) -> Option<SystemTime> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        _ => None,
    }
}
