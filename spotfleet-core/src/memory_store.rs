use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use spotfleet_common::{Instance, Pool, PoolStatusType};

use crate::store::{Store, StoreError};

/// In-memory [`Store`] used by scenario tests (`spotfleet-core/tests/`) so
/// the full `reconcile()` loop can be exercised without a live Postgres
/// instance. Seeded directly by tests via [`InMemoryStore::seed_pool`].
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    pools: HashMap<Uuid, Pool>,
    instances: HashMap<Uuid, Instance>,
    statuses: Vec<(Uuid, PoolStatusType, bool, String)>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_pool(&self, pool: Pool) {
        self.inner.lock().unwrap().pools.insert(pool.id, pool);
    }

    pub fn seed_instance(&self, instance: Instance) {
        self.inner
            .lock()
            .unwrap()
            .instances
            .insert(instance.id, instance);
    }

    pub fn status_entries(&self) -> Vec<(Uuid, PoolStatusType, bool, String)> {
        self.inner.lock().unwrap().statuses.clone()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn list_pool_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        Ok(self.inner.lock().unwrap().pools.keys().copied().collect())
    }

    async fn load_pool(&self, pool_id: Uuid) -> Result<Option<Pool>, StoreError> {
        Ok(self.inner.lock().unwrap().pools.get(&pool_id).cloned())
    }

    async fn set_last_cycled(&self, pool_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(pool) = self.inner.lock().unwrap().pools.get_mut(&pool_id) {
            pool.last_cycled = Some(at);
        }
        Ok(())
    }

    async fn list_instances(&self, pool_id: Uuid) -> Result<Vec<Instance>, StoreError> {
        let mut instances: Vec<Instance> = self
            .inner
            .lock()
            .unwrap()
            .instances
            .values()
            .filter(|i| i.pool_id == pool_id)
            .cloned()
            .collect();
        instances.sort_by_key(|i| i.created);
        Ok(instances)
    }

    async fn insert_instance(&self, instance: &Instance) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .instances
            .insert(instance.id, instance.clone());
        Ok(())
    }

    async fn update_instance(&self, instance: &Instance) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .instances
            .insert(instance.id, instance.clone());
        Ok(())
    }

    async fn delete_instance(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.lock().unwrap().instances.remove(&id);
        Ok(())
    }

    async fn find_instance_by_ec2_id(
        &self,
        pool_id: Uuid,
        ec2_instance_id: &str,
    ) -> Result<Option<Instance>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .instances
            .values()
            .find(|i| i.pool_id == pool_id && i.ec2_instance_id == ec2_instance_id)
            .cloned())
    }

    async fn report_status(
        &self,
        pool_id: Uuid,
        type_: PoolStatusType,
        msg: &str,
        critical: bool,
    ) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .statuses
            .push((pool_id, type_, critical, msg.to_string()));
        Ok(())
    }

    async fn clear_status(&self, pool_id: Uuid, type_: PoolStatusType) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .statuses
            .retain(|(p, t, _, _)| !(*p == pool_id && *t == type_));
        Ok(())
    }

    async fn has_status(&self, pool_id: Uuid, type_: PoolStatusType) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .statuses
            .iter()
            .any(|(p, t, _, _)| *p == pool_id && *t == type_))
    }

    async fn is_frozen(&self, pool_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .statuses
            .iter()
            .any(|(p, _, critical, _)| *p == pool_id && *critical))
    }
}
