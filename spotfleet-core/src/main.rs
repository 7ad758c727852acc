use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::time::{interval, Duration};
use tracing::{error, info, info_span, Instrument};

use spotfleet_core::cache::RedisCache;
use spotfleet_core::config::Settings;
use spotfleet_core::lock::PoolLock;
use spotfleet_core::store::{PgStore, Store};
use spotfleet_core::{logging, migrations, reconciler};
use spotfleet_providers::mock::MockProvider;
use spotfleet_providers::CloudProvider;

/// Drives `reconcile(pool_id)` on a fixed interval for every known pool.
/// The real scheduler (cron, a Kubernetes CronJob, whatever an operator
/// wires up) is outside this crate's scope; this binary is the minimum
/// needed to exercise the core loop end-to-end.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let settings = Settings::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&settings.database_url)
        .await?;
    migrations::run_inline_migrations(&pool).await;

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
    let cache = Arc::new(RedisCache::new(&settings.redis_url)?);
    let lock = Arc::new(PoolLock::new(settings.lock_dir.clone()));
    // No real cloud SDK binding ships in this workspace; the mock keeps the
    // binary runnable for local exercise of the scheduler loop.
    let provider: Arc<dyn CloudProvider> = Arc::new(MockProvider::new());

    info!(tick_interval_secs = settings.tick_interval_secs, "spotfleet reconciler starting");

    let mut ticker = interval(Duration::from_secs(settings.tick_interval_secs));
    loop {
        ticker.tick().await;
        let pool_ids = match store.list_pool_ids().await {
            Ok(ids) => ids,
            Err(err) => {
                error!(%err, "failed to list pools, skipping this round");
                continue;
            }
        };

        for pool_id in pool_ids {
            let store = store.clone();
            let cache = cache.clone();
            let lock = lock.clone();
            let provider = provider.clone();
            let credentials = settings.provider_credentials.clone();
            let span = info_span!("reconcile_tick", %pool_id);
            tokio::spawn(
                async move {
                    if let Err(err) = reconciler::reconcile(
                        pool_id,
                        store.as_ref(),
                        provider.as_ref(),
                        &cache,
                        &lock,
                        &credentials,
                    )
                    .await
                    {
                        error!(%err, "reconciliation tick failed");
                    }
                }
                .instrument(span),
            );
        }
    }
}
