use std::env;

/// Process-wide settings, loaded once at binary startup from the
/// environment, with `.env` loaded first via `dotenv`.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub redis_url: String,
    /// Directory the Pool Lock's flock files live in.
    pub lock_dir: String,
    pub tick_interval_secs: u64,
    /// Opaque credential blob handed to `CloudProvider::connect` as-is; this
    /// crate never parses or validates it.
    pub provider_credentials: String,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
        let redis_url = env::var("REDIS_URL").map_err(|_| anyhow::anyhow!("REDIS_URL must be set"))?;
        let lock_dir = env::var("SPOTFLEET_LOCK_DIR").unwrap_or_else(|_| "/tmp".to_string());
        let tick_interval_secs = env::var("SPOTFLEET_TICK_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);
        let provider_credentials = env::var("SPOTFLEET_PROVIDER_CREDENTIALS").unwrap_or_default();

        Ok(Self {
            database_url,
            redis_url,
            lock_dir,
            tick_interval_secs,
            provider_credentials,
        })
    }
}
