use uuid::Uuid;

use spotfleet_common::PoolStatusType;

use crate::store::{Store, StoreError};

/// Creates, deduplicates, and clears pool status entries. A thin policy
/// layer over [`Store`]: the dedup rule itself is the only logic here,
/// everything else is delegated.
pub struct StatusReporter<'a> {
    store: &'a dyn Store,
}

impl<'a> StatusReporter<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// For `price-too-low`, `temporary-failure`, and
    /// `max-spot-instance-count-exceeded`, suppresses the write if an entry
    /// of the same type already exists on the pool. `config-error` and
    /// `unclassified` are recorded on every call.
    pub async fn report(
        &self,
        pool_id: Uuid,
        type_: PoolStatusType,
        msg: &str,
        critical: bool,
    ) -> Result<(), StoreError> {
        if type_.is_deduplicated() && self.store.has_status(pool_id, type_.clone()).await? {
            return Ok(());
        }
        self.store.report_status(pool_id, type_, msg, critical).await
    }

    pub async fn clear(&self, pool_id: Uuid, type_: PoolStatusType) -> Result<(), StoreError> {
        self.store.clear_status(pool_id, type_).await
    }

    pub async fn is_frozen(&self, pool_id: Uuid) -> Result<bool, StoreError> {
        self.store.is_frozen(pool_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::InMemoryStore;

    #[tokio::test]
    async fn dedup_kind_is_suppressed_on_second_report() {
        let store = InMemoryStore::new();
        let reporter = StatusReporter::new(&store);
        let pool_id = Uuid::new_v4();
        reporter
            .report(pool_id, PoolStatusType::PriceTooLow, "first", false)
            .await
            .unwrap();
        reporter
            .report(pool_id, PoolStatusType::PriceTooLow, "second", false)
            .await
            .unwrap();
        let entries = store.status_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].3, "first");
    }

    #[tokio::test]
    async fn unclassified_is_recorded_every_time() {
        let store = InMemoryStore::new();
        let reporter = StatusReporter::new(&store);
        let pool_id = Uuid::new_v4();
        reporter
            .report(pool_id, PoolStatusType::Unclassified, "first", true)
            .await
            .unwrap();
        reporter
            .report(pool_id, PoolStatusType::Unclassified, "second", true)
            .await
            .unwrap();
        assert_eq!(store.status_entries().len(), 2);
    }

    #[tokio::test]
    async fn frozen_iff_critical_entry_exists() {
        let store = InMemoryStore::new();
        let reporter = StatusReporter::new(&store);
        let pool_id = Uuid::new_v4();
        assert!(!reporter.is_frozen(pool_id).await.unwrap());
        reporter
            .report(pool_id, PoolStatusType::ConfigError, "bad config", true)
            .await
            .unwrap();
        assert!(reporter.is_frozen(pool_id).await.unwrap());
    }
}
