// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-process [`KeyValueStore`] fake for testing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use strata_tier::Error;

use crate::store::{KeyValueStore, StoreCapabilities};

/// Recorded store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// `get` with the given key.
    Get(String),
    /// `set` with the given key and TTL.
    Set {
        /// The key written.
        key: String,
        /// The TTL passed to the store.
        ttl: Option<Duration>,
    },
    /// `delete` with the given key.
    Delete(String),
    /// `scan_keys` with the given glob.
    Scan(String),
    /// `ping`.
    Ping,
}

type OpPredicate = Box<dyn Fn(&StoreOp) -> bool + Send + Sync>;

/// A key/value store held in process memory.
///
/// The fake records every call, can fail or hang selected calls, and never
/// expires keys itself, which exercises the tier's envelope-based expiry.
/// By default it advertises scanning but not native TTL.
#[derive(Clone)]
pub struct InMemoryStore {
    data: Arc<Mutex<HashMap<String, (Bytes, Option<Duration>)>>>,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    fail_when: Arc<Mutex<Option<OpPredicate>>>,
    hang_when: Arc<Mutex<Option<OpPredicate>>>,
    capabilities: StoreCapabilities,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("entries", &self.data.lock().len())
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates an empty store that supports scanning.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capabilities(StoreCapabilities::new().with_scan())
    }

    /// Creates an empty store advertising `capabilities`.
    #[must_use]
    pub fn with_capabilities(capabilities: StoreCapabilities) -> Self {
        Self {
            data: Arc::default(),
            operations: Arc::default(),
            fail_when: Arc::default(),
            hang_when: Arc::default(),
            capabilities,
        }
    }

    /// Fails every call matching `predicate` with an unavailable error.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&StoreOp) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Makes every call matching `predicate` pend forever.
    pub fn hang_when<F>(&self, predicate: F)
    where
        F: Fn(&StoreOp) -> bool + Send + Sync + 'static,
    {
        *self.hang_when.lock() = Some(Box::new(predicate));
    }

    /// Removes failure and hang predicates.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
        *self.hang_when.lock() = None;
    }

    /// Returns all recorded calls.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations.lock().clone()
    }

    /// Counts recorded calls matching `predicate`.
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&StoreOp) -> bool) -> usize {
        self.operations.lock().iter().filter(|op| predicate(op)).count()
    }

    /// Forgets recorded calls.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    /// Returns `true` if `key` is stored.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.lock().contains_key(key)
    }

    /// Returns the TTL the key was written with, or `None` if the key is absent.
    #[must_use]
    pub fn ttl_of(&self, key: &str) -> Option<Option<Duration>> {
        self.data.lock().get(key).map(|(_, ttl)| *ttl)
    }

    /// Writes raw bytes without recording a call.
    pub fn put_raw(&self, key: &str, value: Bytes) {
        self.data.lock().insert(key.to_owned(), (value, None));
    }

    async fn enter(&self, op: StoreOp) -> Result<(), Error> {
        let fail = self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(&op));
        let hang = self.hang_when.lock().as_ref().is_some_and(|predicate| predicate(&op));
        self.operations.lock().push(op);

        if hang {
            futures::future::pending::<()>().await;
        }

        if fail {
            return Err(Error::unavailable("injected store failure"));
        }

        Ok(())
    }
}

/// Matches `key` against a Redis-style glob: `*`, `?`, `[...]` classes with
/// `^` negation and ranges, and `\` escapes.
fn glob_matches(glob: &str, key: &str) -> bool {
    let glob: Vec<char> = glob.chars().collect();
    let key: Vec<char> = key.chars().collect();
    match_chars(&glob, &key)
}

fn match_chars(glob: &[char], key: &[char]) -> bool {
    match glob {
        [] => key.is_empty(),
        ['*', rest @ ..] => (0..=key.len()).any(|skip| match_chars(rest, &key[skip..])),
        ['?', rest @ ..] => !key.is_empty() && match_chars(rest, &key[1..]),
        ['[', class @ ..] => {
            let Some((&c, key_rest)) = key.split_first() else {
                return false;
            };
            let (matched, rest) = match_class(class, c);
            matched && match_chars(rest, key_rest)
        }
        ['\\', literal, rest @ ..] | [literal, rest @ ..] => key.first() == Some(literal) && match_chars(rest, &key[1..]),
    }
}

/// Tests `c` against the class body following `[`; returns the verdict and the glob after `]`.
fn match_class(mut class: &[char], c: char) -> (bool, &[char]) {
    let negate = class.first() == Some(&'^');
    if negate {
        class = &class[1..];
    }

    let mut matched = false;
    loop {
        match class {
            [] => break,
            [']', rest @ ..] => {
                class = rest;
                break;
            }
            ['\\', escaped, rest @ ..] => {
                matched |= *escaped == c;
                class = rest;
            }
            [low, '-', high, rest @ ..] if *high != ']' => {
                let (low, high) = if low <= high { (*low, *high) } else { (*high, *low) };
                matched |= (low..=high).contains(&c);
                class = rest;
            }
            [single, rest @ ..] => {
                matched |= *single == c;
                class = rest;
            }
        }
    }

    (matched != negate, class)
}

impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
        self.enter(StoreOp::Get(key.to_owned())).await?;
        Ok(self.data.lock().get(key).map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), Error> {
        self.enter(StoreOp::Set { key: key.to_owned(), ttl }).await?;
        self.data.lock().insert(key.to_owned(), (value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        self.enter(StoreOp::Delete(key.to_owned())).await?;
        Ok(self.data.lock().remove(key).is_some())
    }

    async fn scan_keys(&self, glob: &str) -> Result<Vec<String>, Error> {
        self.enter(StoreOp::Scan(glob.to_owned())).await?;
        let mut keys: Vec<String> = self.data.lock().keys().filter(|key| glob_matches(glob, key)).cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn ping(&self) -> Result<(), Error> {
        self.enter(StoreOp::Ping).await
    }

    fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_follows_redis_rules() {
        assert!(glob_matches("donor:*", "donor:1"));
        assert!(glob_matches("donor:?", "donor:1"));
        assert!(!glob_matches("donor:?", "donor:12"));
        assert!(glob_matches("region=[NG]", "region=N"));
        assert!(!glob_matches("region=[NG]", "region=[NG]"));
        assert!(glob_matches(r"region=\[NG\]", "region=[NG]"));
        assert!(glob_matches("v[0-9]", "v7"));
        assert!(glob_matches("v[^0-9]", "vx"));
        assert!(!glob_matches("v[^0-9]", "v7"));
        assert!(glob_matches("exact", "exact"));
        assert!(!glob_matches("exact", "exactly"));
    }
}
