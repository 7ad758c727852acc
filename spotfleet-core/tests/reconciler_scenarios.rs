//! End-to-end reconciler scenarios, run entirely against in-memory
//! collaborators so they need neither a live Postgres nor a live Redis.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, Utc};
use uuid::Uuid;

use spotfleet_common::{
    Instance, Pool, PoolConfiguration, PoolStatusType, STATUS_REQUESTED,
};
use spotfleet_core::cache::{Cache, InMemoryCache};
use spotfleet_core::lock::PoolLock;
use spotfleet_core::memory_store::InMemoryStore;
use spotfleet_core::reconciler::reconcile;
use spotfleet_core::store::Store;
use spotfleet_providers::mock::MockProvider;
use spotfleet_providers::{Outcome, ProviderInstance, TerminalState};

fn config(max_price: f64) -> PoolConfiguration {
    PoolConfiguration {
        size: 8,
        cycle_interval: 3600,
        ec2_allowed_regions: ["us-east-1".to_string()].into_iter().collect(),
        ec2_instance_types: vec!["c4.large".to_string(), "c4.xlarge".to_string()],
        ec2_max_price: max_price,
        ec2_key_name: None,
        ec2_image_name: "ami-base".to_string(),
        ec2_security_groups: vec![],
        ec2_tags: HashMap::new(),
        ec2_userdata: vec![],
        ec2_userdata_macros: HashMap::new(),
        ec2_raw_config: serde_json::Map::new(),
    }
}

fn pool(id: Uuid, config: PoolConfiguration, enabled: bool, last_cycled: Option<chrono::DateTime<Utc>>) -> Pool {
    Pool {
        id,
        name: "test-pool".to_string(),
        enabled,
        last_cycled,
        config: sqlx::types::Json(config),
    }
}

fn lock() -> PoolLock {
    PoolLock::new(std::env::temp_dir())
}

#[tokio::test]
async fn scenario_empty_pool_scale_up() {
    let pool_id = Uuid::new_v4();
    let store = InMemoryStore::new();
    store.seed_pool(pool(pool_id, config(0.10), true, Some(Utc::now())));

    let cache = InMemoryCache::new();
    cache.seed_price_series(
        "c4.xlarge",
        HashMap::from([(
            "us-east-1".to_string(),
            HashMap::from([("us-east-1a".to_string(), vec![0.05, 0.06, 0.05])]),
        )]),
    );
    cache.seed_price_series(
        "c4.large",
        HashMap::from([(
            "us-east-1".to_string(),
            HashMap::from([("us-east-1a".to_string(), vec![0.03, 0.04])]),
        )]),
    );

    let provider = MockProvider::new();
    provider.set_image("us-east-1", "ami-base", "ami-resolved");
    provider.queue_request_ids(["sir-02".to_string(), "sir-01".to_string()]);

    let lock = lock();
    reconcile(pool_id, &store, &provider, &cache, &lock, "").await.unwrap();

    let instances = store.list_instances(pool_id).await.unwrap();
    assert_eq!(instances.len(), 2);
    for instance in &instances {
        assert_eq!(instance.status_code, STATUS_REQUESTED);
        assert_eq!(instance.ec2_instance_type, "c4.xlarge");
        assert_eq!(instance.size, 4);
    }
    let calls = provider.request_spot_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].instance_type, "c4.xlarge");
    assert_eq!(calls[0].zone, "us-east-1a");
}

#[tokio::test]
async fn scenario_price_too_high() {
    let pool_id = Uuid::new_v4();
    let store = InMemoryStore::new();
    store.seed_pool(pool(pool_id, config(0.10), true, Some(Utc::now())));

    let cache = InMemoryCache::new();
    cache.seed_price_series(
        "c4.xlarge",
        HashMap::from([(
            "us-east-1".to_string(),
            HashMap::from([("us-east-1a".to_string(), vec![0.50, 0.51])]),
        )]),
    );

    let provider = MockProvider::new();
    let lock = lock();
    reconcile(pool_id, &store, &provider, &cache, &lock, "").await.unwrap();

    assert!(store.list_instances(pool_id).await.unwrap().is_empty());
    assert!(provider.request_spot_calls().is_empty());
    let entries = store.status_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].1, PoolStatusType::PriceTooLow);
    assert!(entries[0].3.contains("us-east-1a at 0.125"));
}

#[tokio::test]
async fn scenario_spot_fulfillment_clears_prior_failures() {
    let pool_id = Uuid::new_v4();
    let store = InMemoryStore::new();
    store.seed_pool(pool(pool_id, config(0.10), true, Some(Utc::now())));
    store.seed_instance(Instance {
        id: Uuid::new_v4(),
        pool_id,
        ec2_instance_id: "sir-01".to_string(),
        ec2_region: "us-east-1".to_string(),
        ec2_zone: "us-east-1a".to_string(),
        ec2_instance_type: "c4.xlarge".to_string(),
        hostname: None,
        size: 4,
        status_code: STATUS_REQUESTED,
        created: Utc::now(),
    });
    store
        .report_status(pool_id, PoolStatusType::MaxSpotInstanceCountExceeded, "quota", false)
        .await
        .unwrap();
    store
        .report_status(pool_id, PoolStatusType::TemporaryFailure, "transient", false)
        .await
        .unwrap();

    let cache = InMemoryCache::new();
    let provider = MockProvider::new();
    provider.set_outcome(
        "sir-01",
        Outcome::Fulfilled {
            instance_id: "i-abc".to_string(),
            hostname: Some("x.example".to_string()),
            state_code: 16,
        },
    );
    // The request's Updatable tag is applied by `request_spot` in a real
    // provider; here it is scripted directly on the post-fulfillment record
    // so the reap pass recognizes the instance as still alive.
    provider.push_instance(ProviderInstance {
        instance_id: "i-abc".to_string(),
        zone: "us-east-1a".to_string(),
        state_code: 16,
        hostname: Some("x.example".to_string()),
        tags: HashMap::from([
            ("SpotManager-PoolId".to_string(), pool_id.to_string()),
            ("SpotManager-Updatable".to_string(), "1".to_string()),
        ]),
    });

    let lock = lock();
    reconcile(pool_id, &store, &provider, &cache, &lock, "").await.unwrap();

    let instances = store.list_instances(pool_id).await.unwrap();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].ec2_instance_id, "i-abc");
    assert_eq!(instances[0].status_code, 16);
    assert_eq!(instances[0].hostname.as_deref(), Some("x.example"));

    assert!(!store.has_status(pool_id, PoolStatusType::MaxSpotInstanceCountExceeded).await.unwrap());
    assert!(!store.has_status(pool_id, PoolStatusType::TemporaryFailure).await.unwrap());
}

#[tokio::test]
async fn scenario_spot_cancellation_blacklists_and_deletes() {
    let pool_id = Uuid::new_v4();
    let store = InMemoryStore::new();
    store.seed_pool(pool(pool_id, config(0.10), true, Some(Utc::now())));
    store.seed_instance(Instance {
        id: Uuid::new_v4(),
        pool_id,
        ec2_instance_id: "sir-02".to_string(),
        ec2_region: "us-east-1".to_string(),
        ec2_zone: "us-east-1b".to_string(),
        ec2_instance_type: "c4.xlarge".to_string(),
        hostname: None,
        size: 4,
        status_code: STATUS_REQUESTED,
        created: Utc::now(),
    });

    let cache = InMemoryCache::new();
    let provider = MockProvider::new();
    provider.set_outcome(
        "sir-02",
        Outcome::Terminal {
            state: TerminalState::Cancelled,
            status_code: 0,
        },
    );

    let lock = lock();
    reconcile(pool_id, &store, &provider, &cache, &lock, "").await.unwrap();

    assert!(store.list_instances(pool_id).await.unwrap().is_empty());
    assert!(cache.is_blacklisted("us-east-1b", "c4.xlarge").await.unwrap());
}

#[tokio::test]
async fn scenario_cycle_terminates_and_bumps_last_cycled() {
    let pool_id = Uuid::new_v4();
    let store = InMemoryStore::new();
    let stale_cycled = Utc::now() - Duration::seconds(3601);
    store.seed_pool(pool(pool_id, config(0.10), true, Some(stale_cycled)));

    let provider = MockProvider::new();
    let mut ids = HashSet::new();
    for i in 0..3 {
        let instance_id = format!("i-{i}");
        ids.insert(instance_id.clone());
        store.seed_instance(Instance {
            id: Uuid::new_v4(),
            pool_id,
            ec2_instance_id: instance_id.clone(),
            ec2_region: "us-east-1".to_string(),
            ec2_zone: "us-east-1a".to_string(),
            ec2_instance_type: "c4.xlarge".to_string(),
            hostname: Some("host".to_string()),
            size: 4,
            status_code: 16,
            created: Utc::now(),
        });
        provider.push_instance(ProviderInstance {
            instance_id,
            zone: "us-east-1a".to_string(),
            state_code: 16,
            hostname: Some("host".to_string()),
            tags: HashMap::from([
                ("SpotManager-PoolId".to_string(), pool_id.to_string()),
                ("SpotManager-Updatable".to_string(), "1".to_string()),
            ]),
        });
    }

    let cache = InMemoryCache::new();
    let lock = lock();
    reconcile(pool_id, &store, &provider, &cache, &lock, "").await.unwrap();

    let terminated: HashSet<String> = provider.terminated_ids().into_iter().collect();
    assert_eq!(terminated, ids);
    assert!(provider.request_spot_calls().is_empty());

    let reloaded = store.load_pool(pool_id).await.unwrap().unwrap();
    assert!(reloaded.last_cycled.unwrap() > stale_cycled);
}

#[tokio::test]
async fn scenario_disabled_pool_terminates_without_touching_last_cycled() {
    let pool_id = Uuid::new_v4();
    let store = InMemoryStore::new();
    store.seed_pool(pool(pool_id, config(0.10), false, None));

    let provider = MockProvider::new();
    for i in 0..2 {
        let instance_id = format!("i-{i}");
        store.seed_instance(Instance {
            id: Uuid::new_v4(),
            pool_id,
            ec2_instance_id: instance_id.clone(),
            ec2_region: "us-east-1".to_string(),
            ec2_zone: "us-east-1a".to_string(),
            ec2_instance_type: "c4.xlarge".to_string(),
            hostname: Some("host".to_string()),
            size: 4,
            status_code: 16,
            created: Utc::now(),
        });
        provider.push_instance(ProviderInstance {
            instance_id,
            zone: "us-east-1a".to_string(),
            state_code: 16,
            hostname: Some("host".to_string()),
            tags: HashMap::from([
                ("SpotManager-PoolId".to_string(), pool_id.to_string()),
                ("SpotManager-Updatable".to_string(), "1".to_string()),
            ]),
        });
    }

    let cache = InMemoryCache::new();
    let lock = lock();
    reconcile(pool_id, &store, &provider, &cache, &lock, "").await.unwrap();

    assert_eq!(provider.terminated_ids().len(), 2);
    assert!(provider.request_spot_calls().is_empty());
    let reloaded = store.load_pool(pool_id).await.unwrap().unwrap();
    assert!(reloaded.last_cycled.is_none());
}
