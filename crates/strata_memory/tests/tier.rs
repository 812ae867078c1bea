// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for the in-memory tier.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use futures::executor::block_on;
use strata_memory::InMemoryTier;
use strata_tier::{CacheEntry, CacheTier, KeyPattern};
use tick::ClockControl;

#[test]
fn lru_evicts_first_inserted_key() {
    let clock = ClockControl::new().to_clock();
    let tier = InMemoryTier::builder(&clock).max_entries(3).build();

    block_on(async {
        for key in ["k1", "k2", "k3", "k4"] {
            tier.insert(key, CacheEntry::new(key)).await.expect("insert");
        }

        assert!(tier.get("k1").await.expect("get").is_none());
        for key in ["k2", "k3", "k4"] {
            assert!(tier.get(key).await.expect("get").is_some(), "{key} should survive");
        }
    });

    assert_eq!(tier.stats().evictions, 1);
}

#[test]
fn reading_a_key_protects_it_from_eviction() {
    let clock = ClockControl::new().to_clock();
    let tier = InMemoryTier::builder(&clock).max_entries(3).build();

    block_on(async {
        for key in ["k1", "k2", "k3"] {
            tier.insert(key, CacheEntry::new(key)).await.expect("insert");
        }
        let _ = tier.get("k1").await.expect("get");
        tier.insert("k4", CacheEntry::new("k4")).await.expect("insert");

        assert!(tier.get("k1").await.expect("get").is_some());
        assert!(tier.get("k2").await.expect("get").is_none());
    });
}

#[test]
fn ttl_expires_lazily_on_read() {
    let control = ClockControl::new();
    let clock = control.to_clock();
    let tier = InMemoryTier::new(&clock);

    block_on(tier.insert("k", CacheEntry::with_ttl("v", Duration::from_secs(300)))).expect("insert");

    control.advance(Duration::from_secs(299));
    assert!(block_on(tier.get("k")).expect("get").is_some());

    control.advance(Duration::from_secs(2));
    assert!(block_on(tier.get("k")).expect("get").is_none());
    assert_eq!(tier.len(), Some(0));
    assert_eq!(tier.stats().expirations, 1);
}

#[test]
fn sweep_removes_only_expired_entries() {
    let control = ClockControl::new();
    let clock = control.to_clock();
    let tier = InMemoryTier::builder(&clock).sweep_batch_size(2).build();

    block_on(async {
        for i in 0..5 {
            let key = format!("short:{i}");
            tier.insert(&key, CacheEntry::with_ttl("v", Duration::from_secs(10)))
                .await
                .expect("insert");
        }
        tier.insert("long", CacheEntry::with_ttl("v", Duration::from_secs(600)))
            .await
            .expect("insert");
        tier.insert("forever", CacheEntry::new("v")).await.expect("insert");
    });

    control.advance(Duration::from_secs(11));
    assert_eq!(tier.sweep_expired(), 5);
    assert_eq!(tier.sweep_expired(), 0);
    assert!(tier.contains_key("long"));
    assert!(tier.contains_key("forever"));
}

#[test]
fn pattern_invalidation_supports_substring_and_glob() {
    let clock = ClockControl::new().to_clock();
    let tier = InMemoryTier::new(&clock);

    block_on(async {
        for key in ["api:donor-list:NG", "api:donor-list:GH", "api:inventory:NG", "other"] {
            tier.insert(key, CacheEntry::new("v")).await.expect("insert");
        }

        let glob = KeyPattern::parse("api:donor-*").expect("valid");
        assert_eq!(tier.invalidate_matching(&glob).await.expect("invalidate"), 2);

        let substring = KeyPattern::parse(":NG").expect("valid");
        assert_eq!(tier.invalidate_matching(&substring).await.expect("invalidate"), 1);
    });

    assert_eq!(tier.len(), Some(1));
    assert!(tier.contains_key("other"));
}

#[test]
fn pattern_invalidation_counts_only_live_entries() {
    let control = ClockControl::new();
    let clock = control.to_clock();
    let tier = InMemoryTier::new(&clock);

    block_on(async {
        tier.insert("donor-list:NG", CacheEntry::with_ttl("v", Duration::from_secs(10))).await.expect("insert");
        tier.insert("donor-list:GH", CacheEntry::with_ttl("v", Duration::from_secs(60))).await.expect("insert");
        control.advance(Duration::from_secs(30));

        let pattern = KeyPattern::parse("donor-list").expect("valid");
        assert_eq!(tier.invalidate_matching(&pattern).await.expect("invalidate"), 1);
    });

    let stats = tier.stats();
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.expirations, 1);
}

#[test]
fn byte_budget_is_respected() {
    let clock = ClockControl::new().to_clock();
    let tier = InMemoryTier::builder(&clock).max_bytes(100).build();

    block_on(async {
        for i in 0..10 {
            let key = format!("k{i}");
            tier.insert(&key, CacheEntry::new(vec![0_u8; 30])).await.expect("insert");
        }
    });

    let stats = tier.stats();
    assert!(stats.bytes <= 100, "bytes = {}", stats.bytes);
    assert_eq!(stats.entries, 3);
    assert!(tier.contains_key("k9"));
}

#[test]
fn concurrent_access_keeps_bookkeeping_consistent() {
    let clock = ClockControl::new().to_clock();
    let tier = Arc::new(InMemoryTier::builder(&clock).max_entries(50).build());

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let tier = Arc::clone(&tier);
            thread::spawn(move || {
                block_on(async {
                    for i in 0..200 {
                        let key = format!("t{t}:k{}", i % 40);
                        tier.insert(&key, CacheEntry::new("value")).await.expect("insert");
                        let _ = tier.get(&key).await.expect("get");
                        if i % 7 == 0 {
                            let _ = tier.invalidate(&key).await.expect("invalidate");
                        }
                    }
                });
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("thread completes");
    }

    let stats = tier.stats();
    assert!(stats.entries <= 50);
    assert_eq!(Some(stats.entries), tier.len());
}
