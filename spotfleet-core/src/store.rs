use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool as PgPool, Postgres};
use thiserror::Error;
use uuid::Uuid;

use spotfleet_common::{Instance, Pool, PoolStatusType};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence interface for pools, instances, and pool status entries. The
/// reconciler treats this as an ordered, queryable store with per-record
/// updates; errors from it are fatal to the current tick and re-raised
/// after the Pool Lock is released.
#[async_trait]
pub trait Store: Send + Sync {
    /// Every pool id, enabled or not — a disabled pool still needs a tick to
    /// drain its instances — for the scheduler to drive one tick each over.
    async fn list_pool_ids(&self) -> Result<Vec<Uuid>, StoreError>;
    async fn load_pool(&self, pool_id: Uuid) -> Result<Option<Pool>, StoreError>;
    async fn set_last_cycled(&self, pool_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn list_instances(&self, pool_id: Uuid) -> Result<Vec<Instance>, StoreError>;
    async fn insert_instance(&self, instance: &Instance) -> Result<(), StoreError>;
    async fn update_instance(&self, instance: &Instance) -> Result<(), StoreError>;
    async fn delete_instance(&self, id: Uuid) -> Result<(), StoreError>;
    async fn find_instance_by_ec2_id(
        &self,
        pool_id: Uuid,
        ec2_instance_id: &str,
    ) -> Result<Option<Instance>, StoreError>;

    async fn report_status(
        &self,
        pool_id: Uuid,
        type_: PoolStatusType,
        msg: &str,
        critical: bool,
    ) -> Result<(), StoreError>;
    async fn clear_status(&self, pool_id: Uuid, type_: PoolStatusType) -> Result<(), StoreError>;
    async fn has_status(&self, pool_id: Uuid, type_: PoolStatusType) -> Result<bool, StoreError>;
    async fn is_frozen(&self, pool_id: Uuid) -> Result<bool, StoreError>;
}

/// Postgres-backed implementation. Every query is built with `sqlx::query`/
/// `query_as`/`query_scalar` rather than the `sqlx::query!` compile-time
/// macro — the macro needs a live `DATABASE_URL` at build time to verify
/// against, which this workspace never has available.
pub struct PgStore {
    pool: PgPool<Postgres>,
}

impl PgStore {
    pub fn new(pool: PgPool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn list_pool_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM pools")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn load_pool(&self, pool_id: Uuid) -> Result<Option<Pool>, StoreError> {
        let pool = sqlx::query_as::<_, Pool>(
            "SELECT id, name, enabled, last_cycled, config FROM pools WHERE id = $1",
        )
        .bind(pool_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(pool)
    }

    async fn set_last_cycled(&self, pool_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE pools SET last_cycled = $1 WHERE id = $2")
            .bind(at)
            .bind(pool_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_instances(&self, pool_id: Uuid) -> Result<Vec<Instance>, StoreError> {
        let instances = sqlx::query_as::<_, Instance>(
            "SELECT id, pool_id, ec2_instance_id, ec2_region, ec2_zone, ec2_instance_type, \
             hostname, size, status_code, created FROM instances WHERE pool_id = $1 \
             ORDER BY created ASC",
        )
        .bind(pool_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(instances)
    }

    async fn insert_instance(&self, instance: &Instance) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO instances (id, pool_id, ec2_instance_id, ec2_region, ec2_zone, \
             ec2_instance_type, hostname, size, status_code, created) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(instance.id)
        .bind(instance.pool_id)
        .bind(&instance.ec2_instance_id)
        .bind(&instance.ec2_region)
        .bind(&instance.ec2_zone)
        .bind(&instance.ec2_instance_type)
        .bind(&instance.hostname)
        .bind(instance.size as i32)
        .bind(instance.status_code)
        .bind(instance.created)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_instance(&self, instance: &Instance) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE instances SET ec2_instance_id = $1, ec2_region = $2, ec2_zone = $3, \
             ec2_instance_type = $4, hostname = $5, size = $6, status_code = $7 WHERE id = $8",
        )
        .bind(&instance.ec2_instance_id)
        .bind(&instance.ec2_region)
        .bind(&instance.ec2_zone)
        .bind(&instance.ec2_instance_type)
        .bind(&instance.hostname)
        .bind(instance.size as i32)
        .bind(instance.status_code)
        .bind(instance.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_instance(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM instances WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_instance_by_ec2_id(
        &self,
        pool_id: Uuid,
        ec2_instance_id: &str,
    ) -> Result<Option<Instance>, StoreError> {
        let instance = sqlx::query_as::<_, Instance>(
            "SELECT id, pool_id, ec2_instance_id, ec2_region, ec2_zone, ec2_instance_type, \
             hostname, size, status_code, created FROM instances \
             WHERE pool_id = $1 AND ec2_instance_id = $2",
        )
        .bind(pool_id)
        .bind(ec2_instance_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(instance)
    }

    async fn report_status(
        &self,
        pool_id: Uuid,
        type_: PoolStatusType,
        msg: &str,
        critical: bool,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO pool_status_entries (id, pool_id, type, is_critical, msg, created) \
             VALUES ($1, $2, $3, $4, $5, NOW())",
        )
        .bind(Uuid::new_v4())
        .bind(pool_id)
        .bind(type_)
        .bind(critical)
        .bind(msg)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_status(&self, pool_id: Uuid, type_: PoolStatusType) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM pool_status_entries WHERE pool_id = $1 AND type = $2")
            .bind(pool_id)
            .bind(type_)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn has_status(&self, pool_id: Uuid, type_: PoolStatusType) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM pool_status_entries WHERE pool_id = $1 AND type = $2)",
        )
        .bind(pool_id)
        .bind(type_)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn is_frozen(&self, pool_id: Uuid) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM pool_status_entries WHERE pool_id = $1 AND is_critical)",
        )
        .bind(pool_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}
