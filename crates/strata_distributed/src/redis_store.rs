// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Redis-backed [`KeyValueStore`].

use std::time::Duration;

use bytes::Bytes;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use strata_tier::Error;

use crate::store::{KeyValueStore, StoreCapabilities};

const PING_KEY: &str = "__strata:ping";

/// A [`KeyValueStore`] over a Redis connection manager.
///
/// The connection manager reconnects on its own; every call clones it, which
/// only bumps a reference count. TTLs are applied with `SET EX`, rounded up to
/// whole seconds.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connects to the Redis server at `url`.
    ///
    /// # Errors
    ///
    /// Returns an unavailable error if the URL is invalid or the server cannot be reached.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let client = redis::Client::open(url).map_err(Error::unavailable)?;
        let conn = ConnectionManager::new(client).await.map_err(Error::unavailable)?;
        Ok(Self { conn })
    }

    /// Wraps an existing connection manager.
    #[must_use]
    pub fn from_connection_manager(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 { secs + 1 } else { secs.max(1) }
}

impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
        let mut conn = self.conn.clone();
        let value = conn.get::<_, Option<Vec<u8>>>(key).await.map_err(Error::unavailable)?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => conn
                .set_ex::<_, _, ()>(key, value.as_ref(), ttl_secs(ttl))
                .await
                .map_err(Error::unavailable),
            None => conn.set::<_, _, ()>(key, value.as_ref()).await.map_err(Error::unavailable),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        let mut conn = self.conn.clone();
        let removed = conn.del::<_, u64>(key).await.map_err(Error::unavailable)?;
        Ok(removed > 0)
    }

    async fn scan_keys(&self, glob: &str) -> Result<Vec<String>, Error> {
        let mut conn = self.conn.clone();
        let mut iter = conn.scan_match::<_, String>(glob).await.map_err(Error::unavailable)?;
        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }

    async fn ping(&self) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        conn.exists::<_, bool>(PING_KEY).await.map(|_| ()).map_err(Error::unavailable)
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::new().with_native_ttl().with_scan()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_rounds_up_to_whole_seconds() {
        assert_eq!(ttl_secs(Duration::from_secs(300)), 300);
        assert_eq!(ttl_secs(Duration::from_millis(1_500)), 2);
        assert_eq!(ttl_secs(Duration::from_millis(10)), 1);
        assert_eq!(ttl_secs(Duration::ZERO), 1);
    }
}
