use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

/// The three failure classes the core ever sees from a provider call (spec
/// §4.3, §7). Everything else is classified as `Unclassified`.
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    #[error("transient failure: {0}")]
    TransientFailure(String),
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("unclassified: {0}")]
    Unclassified(String),
}

impl ProviderError {
    /// Classifies a raw provider error message by substring:
    /// `MaxSpotInstanceCountExceeded` is a quota error, `Service Unavailable`
    /// is transient, anything else is unclassified.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains("MaxSpotInstanceCountExceeded") {
            Self::QuotaExceeded(message)
        } else if message.contains("Service Unavailable") {
            Self::TransientFailure(message)
        } else {
            Self::Unclassified(message)
        }
    }
}

/// A boot specification for a batch of spot requests.
#[derive(Debug, Clone)]
pub struct InstanceSpec {
    pub region: String,
    pub zone: String,
    pub instance_type: String,
    pub image_id: String,
    pub key_name: Option<String>,
    pub security_groups: Vec<String>,
    pub userdata: Vec<u8>,
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Cancelled,
    Closed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientState {
    Open,
    Active,
}

/// The result of polling one spot request.
#[derive(Debug, Clone)]
pub enum Outcome {
    Fulfilled {
        instance_id: String,
        hostname: Option<String>,
        state_code: i32,
    },
    Terminal {
        state: TerminalState,
        status_code: i32,
    },
    Transient {
        state: TransientState,
    },
    Pending,
}

/// A provider instance as returned by `find` — state codes are 16-bit raw,
/// the high byte is opaque.
#[derive(Debug, Clone)]
pub struct ProviderInstance {
    pub instance_id: String,
    pub zone: String,
    pub state_code: i32,
    pub hostname: Option<String>,
    pub tags: HashMap<String, String>,
}

/// The filter `find` accepts: either a tag match (used to enumerate a pool's
/// fleet) or an explicit id list (used when terminating a known set).
#[derive(Debug, Clone)]
pub enum FindFilter {
    Tag { key: String, value: String },
    InstanceIds(Vec<String>),
}

/// Thin façade over a cloud provider's SDK, exposing only the operations the
/// reconciler needs. Real adapters (EC2, GCP, …) are collaborators outside
/// this crate's scope; this crate ships the trait and a deterministic
/// in-memory [`mock::MockProvider`] for tests.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn connect(&self, region: &str, credentials: &str) -> Result<(), ProviderError>;

    /// Resolves a named boot image to a provider image id. Callers must
    /// cache the result under `ami:<region>:<name>` with a 24h TTL
    /// themselves — this trait does not cache.
    async fn resolve_image(&self, region: &str, name: &str) -> Result<String, ProviderError>;

    /// `bid_total` is `ec2_max_price * cores_per_instance`; `timeout_seconds`
    /// is the fulfillment window (600 in practice). Returns one request id
    /// per requested instance.
    async fn request_spot(
        &self,
        bid_total: f64,
        spec: &InstanceSpec,
        count: u32,
        timeout_seconds: u64,
    ) -> Result<Vec<String>, ProviderError>;

    /// Polls a batch of request ids in one region. `tags` are applied to any
    /// request observed as `Fulfilled` this call.
    async fn check_spot_requests(
        &self,
        request_ids: &[String],
        tags: &HashMap<String, String>,
    ) -> Result<Vec<Outcome>, ProviderError>;

    async fn find(&self, filter: FindFilter) -> Result<Vec<ProviderInstance>, ProviderError>;

    /// Best-effort termination; provider-side failures are reported by the
    /// caller as `unclassified` status entries, not propagated as a hard
    /// error beyond this call.
    async fn terminate(&self, instances: &[ProviderInstance]) -> Result<(), ProviderError>;
}

pub mod mock;
