// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Router behavior across a memory tier and a distributed tier.

use std::time::Duration;

use futures::executor::block_on;
use strata::{CacheOptions, CacheRouter, CacheStrategy, CacheTier, ErrorKind, TierKind};
use strata_distributed::DistributedTier;
use strata_distributed::testing::{InMemoryStore, StoreOp};
use strata_memory::InMemoryTier;
use tick::{Clock, ClockControl};

const DONOR_LIST_TTL: Duration = Duration::from_secs(300);

fn donor_list() -> CacheStrategy {
    CacheStrategy::new("donor-list", "donor-list", DONOR_LIST_TTL).tiers([TierKind::Memory, TierKind::Distributed])
}

fn two_tier_router(clock: &Clock, memory: &InMemoryTier, store: &InMemoryStore) -> CacheRouter {
    CacheRouter::builder(clock)
        .memory(memory.clone())
        .distributed(DistributedTier::new(store.clone(), clock))
        .strategy(donor_list())
        .build()
        .expect("valid router")
}

fn store_gets(store: &InMemoryStore) -> usize {
    store.count(|op| matches!(op, StoreOp::Get(_)))
}

#[test]
fn donor_list_is_served_from_memory_until_it_expires() {
    let control = ClockControl::new();
    let clock = control.to_clock();
    let memory = InMemoryTier::new(&clock);
    let store = InMemoryStore::new();
    let router = two_tier_router(&clock, &memory, &store);
    let options = CacheOptions::new().strategy("donor-list");

    block_on(async {
        let report = router.set("donor-list:region=NG", "[1,2,3]", &options).await;
        assert!(report.all_succeeded());
        assert_eq!(report.tiers.len(), 2);
        store.clear_operations();

        let value = router.get("donor-list:region=NG", &options).await;
        assert_eq!(value.as_deref(), Some(&b"[1,2,3]"[..]));
        assert_eq!(store_gets(&store), 0);

        control.advance(Duration::from_secs(301));
        assert!(router.get("donor-list:region=NG", &options).await.is_none());
        assert_eq!(store_gets(&store), 1);
    });

    let memory_stats = &router.stats()[0];
    assert_eq!(memory_stats.tier, TierKind::Memory);
    assert_eq!((memory_stats.hits, memory_stats.misses), (1, 1));
}

#[test]
fn distributed_hits_backfill_memory_once() {
    let clock = ClockControl::new().to_clock();
    let memory = InMemoryTier::new(&clock);
    let store = InMemoryStore::new();
    let router = two_tier_router(&clock, &memory, &store);

    block_on(async {
        let distributed_only = CacheOptions::new().tiers([TierKind::Distributed]);
        router.set("donor-list:region=KE", "[7]", &distributed_only).await;
        assert!(!memory.contains_key("donor-list:region=KE"));
        store.clear_operations();

        let options = CacheOptions::new();
        assert_eq!(router.get("donor-list:region=KE", &options).await.as_deref(), Some(&b"[7]"[..]));
        assert_eq!(store_gets(&store), 1);
        assert!(memory.contains_key("donor-list:region=KE"));

        assert_eq!(router.get("donor-list:region=KE", &options).await.as_deref(), Some(&b"[7]"[..]));
        assert_eq!(store_gets(&store), 1);
    });

    let memory_stats = &router.stats()[0];
    assert_eq!((memory_stats.backfills, memory_stats.hits), (1, 1));
}

#[test]
fn writes_reach_every_tier_of_the_chain() {
    let clock = ClockControl::new().to_clock();
    let memory = InMemoryTier::new(&clock);
    let store = InMemoryStore::new();
    let router = two_tier_router(&clock, &memory, &store);

    let report = block_on(router.set("donor-list:region=GH", "[]", &CacheOptions::new()));

    assert_eq!(report.succeeded(TierKind::Memory), Some(true));
    assert_eq!(report.succeeded(TierKind::Distributed), Some(true));
    assert!(memory.contains_key("donor-list:region=GH"));
    assert!(store.contains_key("donor-list:region=GH"));
}

#[test]
fn dependency_invalidation_removes_every_registered_key() {
    let clock = ClockControl::new().to_clock();
    let memory = InMemoryTier::new(&clock);
    let store = InMemoryStore::new();
    let router = two_tier_router(&clock, &memory, &store);

    block_on(async {
        for region in ["NG", "KE", "GH"] {
            let options = CacheOptions::new().depends_on("donor:42");
            router.set(&format!("donor-list:region={region}"), "[42]", &options).await;
        }
        router.set("donor-list:region=ZA", "[7]", &CacheOptions::new().depends_on("donor:7")).await;

        let report = router.invalidate_by_dependency("donor:42").await;
        assert_eq!((report.invalidated, report.errors), (3, 0));

        for region in ["NG", "KE", "GH"] {
            let key = format!("donor-list:region={region}");
            assert!(router.get(&key, &CacheOptions::new()).await.is_none(), "{key} survived");
            assert!(!store.contains_key(&key));
        }
        assert!(router.get("donor-list:region=ZA", &CacheOptions::new()).await.is_some());

        let again = router.invalidate_by_dependency("donor:42").await;
        assert_eq!(again.invalidated, 0);
    });

    assert_eq!(router.dependencies().keys("donor:7"), vec!["donor-list:region=ZA".to_owned()]);
}

#[test]
fn pattern_invalidation_sums_over_tiers() {
    let clock = ClockControl::new().to_clock();
    let memory = InMemoryTier::new(&clock);
    let store = InMemoryStore::new();
    let router = two_tier_router(&clock, &memory, &store);

    block_on(async {
        router.set("donor-list:region=NG", "[]", &CacheOptions::new()).await;
        router.set("donor-list:region=KE", "[]", &CacheOptions::new()).await;
        router.set("session:1", "{}", &CacheOptions::new()).await;

        let report = router.invalidate("donor-list:*").await.expect("valid pattern");
        assert_eq!((report.invalidated, report.errors), (4, 0));
        assert!(memory.contains_key("session:1"));
    });
}

#[test]
fn pattern_invalidation_skips_stores_without_scan() {
    let clock = ClockControl::new().to_clock();
    let memory = InMemoryTier::new(&clock);
    let store = InMemoryStore::with_capabilities(strata_distributed::StoreCapabilities::new());
    let router = two_tier_router(&clock, &memory, &store);

    block_on(async {
        router.set("donor-list:region=NG", "[]", &CacheOptions::new()).await;

        let report = router.invalidate("donor-list").await.expect("valid pattern");
        assert_eq!((report.invalidated, report.errors), (1, 0));
        assert!(store.contains_key("donor-list:region=NG"));
    });
}

#[test]
fn invalid_patterns_are_rejected() {
    let clock = ClockControl::new().to_clock();
    let router = CacheRouter::builder(&clock).memory(InMemoryTier::new(&clock)).build().expect("valid router");

    let error = block_on(router.invalidate("   ")).expect_err("empty pattern");
    assert_eq!(error.kind(), ErrorKind::InvalidPattern);
}

#[test]
fn failing_distributed_tier_degrades_to_memory() {
    let clock = ClockControl::new().to_clock();
    let memory = InMemoryTier::new(&clock);
    let store = InMemoryStore::new();
    store.fail_when(|_| true);
    let router = two_tier_router(&clock, &memory, &store);

    block_on(async {
        let report = router.set("donor-list:region=NG", "[1]", &CacheOptions::new()).await;
        assert_eq!(report.succeeded(TierKind::Memory), Some(true));
        assert_eq!(report.succeeded(TierKind::Distributed), Some(false));

        assert_eq!(router.get("donor-list:region=NG", &CacheOptions::new()).await.as_deref(), Some(&b"[1]"[..]));
        assert!(router.get("donor-list:region=KE", &CacheOptions::new()).await.is_none());
    });

    assert_eq!(router.stats()[1].errors, 2);
}

#[tokio::test]
async fn slow_distributed_calls_time_out() {
    let control = ClockControl::new().auto_advance_timers(true);
    let clock = control.to_clock();
    let store = InMemoryStore::new();
    store.hang_when(|op| matches!(op, StoreOp::Get(_) | StoreOp::Set { .. }));
    let router = CacheRouter::builder(&clock)
        .memory(InMemoryTier::new(&clock))
        .distributed(DistributedTier::new(store.clone(), &clock))
        .timeout(TierKind::Distributed, Duration::from_millis(50))
        .strategy(donor_list())
        .build()
        .expect("valid router");

    let report = router.set("donor-list:region=NG", "[1]", &CacheOptions::new()).await;
    assert_eq!(report.succeeded(TierKind::Memory), Some(true));
    assert_eq!(report.succeeded(TierKind::Distributed), Some(false));

    assert!(router.get("donor-list:region=KE", &CacheOptions::new()).await.is_none());
    assert_eq!(router.stats()[1].timeouts, 2);
}

#[test]
fn get_or_insert_with_loads_once() {
    let clock = ClockControl::new().to_clock();
    let memory = InMemoryTier::new(&clock);
    let store = InMemoryStore::new();
    let router = two_tier_router(&clock, &memory, &store);
    let options = CacheOptions::new().depends_on("donor:1");

    block_on(async {
        let mut loads = 0;
        for _ in 0..3 {
            let value = router
                .get_or_insert_with("donor-list:region=NG", &options, || {
                    loads += 1;
                    async { Ok::<_, std::io::Error>(bytes::Bytes::from_static(b"[1]")) }
                })
                .await
                .expect("loader succeeds");
            assert_eq!(&value[..], b"[1]");
        }
        assert_eq!(loads, 1);

        let failed = router
            .get_or_insert_with("donor-list:region=KE", &options, || async { Err(std::io::Error::other("db down")) })
            .await;
        assert!(failed.is_err());
        assert!(router.get("donor-list:region=KE", &options).await.is_none());
    });

    assert_eq!(router.dependencies().keys("donor:1"), vec!["donor-list:region=NG".to_owned()]);
}

#[test]
fn clear_empties_tiers_and_dependencies() {
    let clock = ClockControl::new().to_clock();
    let memory = InMemoryTier::new(&clock);
    let store = InMemoryStore::new();
    let router = two_tier_router(&clock, &memory, &store);

    block_on(async {
        router.set("donor-list:region=NG", "[1]", &CacheOptions::new().depends_on("donor:1")).await;
        assert!(router.clear().await.all_succeeded());
        assert!(router.get("donor-list:region=NG", &CacheOptions::new()).await.is_none());
    });

    assert!(router.dependencies().is_empty());
    assert!(!store.contains_key("donor-list:region=NG"));
}

#[test]
fn expired_dependency_edges_are_pruned() {
    let control = ClockControl::new();
    let clock = control.to_clock();
    let memory = InMemoryTier::new(&clock);
    let store = InMemoryStore::new();
    let router = two_tier_router(&clock, &memory, &store);

    block_on(router.set("donor-list:region=NG", "[1]", &CacheOptions::new().depends_on("donor:1")));
    assert_eq!(router.prune_dependencies(), 0);

    control.advance(DONOR_LIST_TTL + Duration::from_secs(1));
    assert_eq!(router.prune_dependencies(), 1);
    assert!(router.dependencies().is_empty());
}

#[test]
fn backfilled_keys_keep_their_dependency_edges() {
    let control = ClockControl::new();
    let clock = control.to_clock();
    let memory = InMemoryTier::new(&clock);
    let store = InMemoryStore::new();
    let router = two_tier_router(&clock, &memory, &store);

    block_on(async {
        router.set("donor-list:region=NG", "[42]", &CacheOptions::new().depends_on("donor:42")).await;

        control.advance(Duration::from_secs(250));
        assert!(memory.invalidate("donor-list:region=NG").await.expect("evict"));
        assert!(router.get("donor-list:region=NG", &CacheOptions::new()).await.is_some());
        assert!(memory.contains_key("donor-list:region=NG"));

        // The original write has expired; the backfilled copy has not.
        control.advance(Duration::from_secs(110));
        assert_eq!(router.prune_dependencies(), 0);

        let report = router.invalidate_by_dependency("donor:42").await;
        assert_eq!(report.invalidated, 1);
        assert!(router.get("donor-list:region=NG", &CacheOptions::new()).await.is_none());
    });
}
