use std::collections::HashMap;

use async_trait::async_trait;
use redis::AsyncCommands;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("malformed price series for {0}: {1}")]
    MalformedPriceSeries(String, serde_json::Error),
}

/// `{region: {zone: [price, price, ...]}}`, most recent sample first.
pub type PriceSeries = HashMap<String, HashMap<String, Vec<f64>>>;

/// Read-mostly accessor over the external price/blacklist/AMI store. The
/// reconciler never writes price samples; it only reads them, and writes
/// blacklist/AMI cache entries as a side effect of its own decisions. A
/// trait rather than a concrete `redis::Client` wrapper so scenario tests
/// can exercise the full reconciler loop against [`InMemoryCache`] instead
/// of a live Redis instance.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn price_series(&self, instance_type: &str) -> Result<Option<PriceSeries>, CacheError>;
    async fn is_blacklisted(&self, zone: &str, instance_type: &str) -> Result<bool, CacheError>;
    /// 12-hour TTL.
    async fn blacklist(&self, zone: &str, instance_type: &str) -> Result<(), CacheError>;
    async fn cached_ami(&self, region: &str, image_name: &str) -> Result<Option<String>, CacheError>;
    /// 24-hour TTL.
    async fn cache_ami(&self, region: &str, image_name: &str, image_id: &str) -> Result<(), CacheError>;
}

const BLACKLIST_TTL_SECS: u64 = 12 * 3600;
const AMI_TTL_SECS: u64 = 24 * 3600;

/// Production [`Cache`] backed by Redis.
pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    pub fn new(redis_url: &str) -> Result<Self, CacheError> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
        })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl Cache for RedisCache {
    /// Reads `price:<instance_type>`. Absent keys and malformed JSON degrade
    /// gracefully to `None` rather than failing the tick; callers log and
    /// skip the instance type.
    async fn price_series(&self, instance_type: &str) -> Result<Option<PriceSeries>, CacheError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(format!("price:{instance_type}")).await?;
        let Some(raw) = raw else { return Ok(None) };
        match serde_json::from_str(&raw) {
            Ok(series) => Ok(Some(series)),
            Err(err) => Err(CacheError::MalformedPriceSeries(instance_type.to_string(), err)),
        }
    }

    async fn is_blacklisted(&self, zone: &str, instance_type: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn().await?;
        let exists: bool = conn.exists(format!("blacklist:{zone}:{instance_type}")).await?;
        Ok(exists)
    }

    async fn blacklist(&self, zone: &str, instance_type: &str) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .set_ex(format!("blacklist:{zone}:{instance_type}"), 1, BLACKLIST_TTL_SECS)
            .await?;
        Ok(())
    }

    async fn cached_ami(&self, region: &str, image_name: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn().await?;
        Ok(conn.get(format!("ami:{region}:{image_name}")).await?)
    }

    async fn cache_ami(&self, region: &str, image_name: &str, image_id: &str) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .set_ex(format!("ami:{region}:{image_name}"), image_id, AMI_TTL_SECS)
            .await?;
        Ok(())
    }
}

/// In-memory [`Cache`] used by scenario tests. TTLs are accepted and ignored
/// — tests are short-lived and never need entries to expire.
#[derive(Default)]
pub struct InMemoryCache {
    inner: std::sync::Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    prices: HashMap<String, PriceSeries>,
    blacklisted: std::collections::HashSet<(String, String)>,
    amis: HashMap<(String, String), String>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_price_series(&self, instance_type: &str, series: PriceSeries) {
        self.inner
            .lock()
            .unwrap()
            .prices
            .insert(instance_type.to_string(), series);
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn price_series(&self, instance_type: &str) -> Result<Option<PriceSeries>, CacheError> {
        Ok(self.inner.lock().unwrap().prices.get(instance_type).cloned())
    }

    async fn is_blacklisted(&self, zone: &str, instance_type: &str) -> Result<bool, CacheError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .blacklisted
            .contains(&(zone.to_string(), instance_type.to_string())))
    }

    async fn blacklist(&self, zone: &str, instance_type: &str) -> Result<(), CacheError> {
        self.inner
            .lock()
            .unwrap()
            .blacklisted
            .insert((zone.to_string(), instance_type.to_string()));
        Ok(())
    }

    async fn cached_ami(&self, region: &str, image_name: &str) -> Result<Option<String>, CacheError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .amis
            .get(&(region.to_string(), image_name.to_string()))
            .cloned())
    }

    async fn cache_ami(&self, region: &str, image_name: &str, image_id: &str) -> Result<(), CacheError> {
        self.inner
            .lock()
            .unwrap()
            .amis
            .insert((region.to_string(), image_name.to_string()), image_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_series_deserializes_region_zone_shape() {
        let raw = r#"{"us-east-1": {"us-east-1a": [0.05, 0.06]}}"#;
        let series: PriceSeries = serde_json::from_str(raw).unwrap();
        assert_eq!(series["us-east-1"]["us-east-1a"], vec![0.05, 0.06]);
    }

    #[tokio::test]
    async fn in_memory_cache_round_trips_blacklist_and_ami() {
        let cache = InMemoryCache::new();
        assert!(!cache.is_blacklisted("us-east-1a", "c4.xlarge").await.unwrap());
        cache.blacklist("us-east-1a", "c4.xlarge").await.unwrap();
        assert!(cache.is_blacklisted("us-east-1a", "c4.xlarge").await.unwrap());

        assert_eq!(cache.cached_ami("us-east-1", "base").await.unwrap(), None);
        cache.cache_ami("us-east-1", "base", "ami-123").await.unwrap();
        assert_eq!(
            cache.cached_ami("us-east-1", "base").await.unwrap(),
            Some("ami-123".to_string())
        );
    }
}
