use sqlx::{Pool, Postgres};
use tracing::info;

/// Applies the schema inline rather than through `sqlx migrate!`, so the
/// crate never needs `DATABASE_URL` set at build time (see `store.rs`'s
/// module doc for why every query in this crate is built at runtime).
pub async fn run_inline_migrations(pool: &Pool<Postgres>) {
    info!("running inline schema migrations");

    // CREATE TYPE has no IF NOT EXISTS in Postgres; issued separately and its
    // "already exists" error on a rerun is swallowed.
    let _ = sqlx::query(
        r#"CREATE TYPE pool_status_type AS ENUM (
            'price-too-low', 'config-error', 'unclassified',
            'max-spot-instance-count-exceeded', 'temporary-failure'
        )"#,
    )
    .execute(pool)
    .await;

    let schema_sql = r#"
        CREATE TABLE IF NOT EXISTS pools (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            last_cycled TIMESTAMPTZ,
            config JSONB NOT NULL
        );
        CREATE TABLE IF NOT EXISTS instances (
            id UUID PRIMARY KEY,
            pool_id UUID NOT NULL REFERENCES pools(id),
            ec2_instance_id VARCHAR(255) NOT NULL,
            ec2_region VARCHAR(64) NOT NULL,
            ec2_zone VARCHAR(64) NOT NULL,
            ec2_instance_type VARCHAR(64) NOT NULL,
            hostname VARCHAR(255),
            size INTEGER NOT NULL,
            status_code INTEGER NOT NULL,
            created TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        CREATE INDEX IF NOT EXISTS instances_pool_id_idx ON instances(pool_id);
        CREATE INDEX IF NOT EXISTS instances_pool_region_idx ON instances(pool_id, ec2_region);
        CREATE TABLE IF NOT EXISTS pool_status_entries (
            id UUID PRIMARY KEY,
            pool_id UUID NOT NULL REFERENCES pools(id),
            type pool_status_type NOT NULL,
            is_critical BOOLEAN NOT NULL DEFAULT FALSE,
            msg TEXT NOT NULL,
            created TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        CREATE INDEX IF NOT EXISTS pool_status_entries_pool_id_idx ON pool_status_entries(pool_id);
    "#;

    for statement in schema_sql.split(';') {
        let stmt = statement.trim();
        if stmt.is_empty() {
            continue;
        }
        let _ = sqlx::query(stmt).execute(pool).await;
    }

    info!("inline schema migrations applied");
}
