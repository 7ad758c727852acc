use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Map as JsonMap;
use uuid::Uuid;

use crate::error::ConfigValidationError;
use crate::instance_types::{cores_for_instance_type, is_supported_region};

/// Raw provider status codes. `Requested` is synthetic: it never arrives
/// from the provider and is never compared against a provider code.
pub const STATUS_PENDING: i32 = 0;
pub const STATUS_RUNNING: i32 = 16;
pub const STATUS_SHUTTING_DOWN: i32 = 32;
pub const STATUS_TERMINATED: i32 = 48;
pub const STATUS_STOPPING: i32 = 64;
pub const STATUS_STOPPED: i32 = 80;
pub const STATUS_REQUESTED: i32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceStatus {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
    Requested,
}

impl InstanceStatus {
    pub fn code(self) -> i32 {
        match self {
            Self::Pending => STATUS_PENDING,
            Self::Running => STATUS_RUNNING,
            Self::ShuttingDown => STATUS_SHUTTING_DOWN,
            Self::Terminated => STATUS_TERMINATED,
            Self::Stopping => STATUS_STOPPING,
            Self::Stopped => STATUS_STOPPED,
            Self::Requested => STATUS_REQUESTED,
        }
    }

    /// Recognizes an already-stripped status code. Does not perform the
    /// high-byte masking or the 256-offset healing itself; callers observing
    /// a raw provider code should go through [`strip_provider_code`] first.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            STATUS_PENDING => Some(Self::Pending),
            STATUS_RUNNING => Some(Self::Running),
            STATUS_SHUTTING_DOWN => Some(Self::ShuttingDown),
            STATUS_TERMINATED => Some(Self::Terminated),
            STATUS_STOPPING => Some(Self::Stopping),
            STATUS_STOPPED => Some(Self::Stopped),
            STATUS_REQUESTED => Some(Self::Requested),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::ShuttingDown | Self::Terminated)
    }

    /// States that count toward the pool's current capacity.
    pub fn counts_toward_capacity(self) -> bool {
        matches!(self, Self::Requested | Self::Pending | Self::Running)
    }
}

/// Masks a provider-reported 16-bit state code's opaque high byte. The
/// synthetic `requested` marker (256) is local-only and must never be
/// passed through here.
pub fn strip_provider_code(code: i32) -> i32 {
    code & 0xFF
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "pool_status_type", rename_all = "kebab-case")]
pub enum PoolStatusType {
    PriceTooLow,
    ConfigError,
    Unclassified,
    MaxSpotInstanceCountExceeded,
    TemporaryFailure,
}

impl PoolStatusType {
    /// `price-too-low`, `temporary-failure`, and
    /// `max-spot-instance-count-exceeded` are suppressed if an entry of the
    /// same type already exists on the pool; `config-error` and
    /// `unclassified` are recorded on every occurrence.
    pub fn is_deduplicated(&self) -> bool {
        matches!(
            self,
            Self::PriceTooLow | Self::TemporaryFailure | Self::MaxSpotInstanceCountExceeded
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PoolStatusEntry {
    pub id: Uuid,
    pub pool_id: Uuid,
    #[sqlx(rename = "type")]
    pub type_: PoolStatusType,
    pub is_critical: bool,
    pub msg: String,
    pub created: DateTime<Utc>,
}

/// A flattened pool configuration. Flattening itself — resolving a pool's
/// configuration against any parent/template chain — happens upstream of
/// this crate; the reconciler only ever sees the result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolConfiguration {
    pub size: u32,
    pub cycle_interval: i64,
    pub ec2_allowed_regions: HashSet<String>,
    pub ec2_instance_types: Vec<String>,
    pub ec2_max_price: f64,
    pub ec2_key_name: Option<String>,
    pub ec2_image_name: String,
    pub ec2_security_groups: Vec<String>,
    pub ec2_tags: HashMap<String, String>,
    pub ec2_userdata: Vec<u8>,
    pub ec2_userdata_macros: HashMap<String, String>,
    pub ec2_raw_config: JsonMap<String, serde_json::Value>,
}

impl PoolConfiguration {
    /// Flattened configurations have no parent chain left to cycle through;
    /// this always returns `false` here. Kept as a named check (rather than
    /// inlined at the call site) since validation treats it as a distinct
    /// invariant alongside `missing_parameters`.
    pub fn is_cyclic(&self) -> bool {
        false
    }

    pub fn missing_parameters(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.size == 0 {
            missing.push("size".to_string());
        }
        if self.cycle_interval <= 0 {
            missing.push("cycle_interval".to_string());
        }
        if self.ec2_allowed_regions.is_empty() {
            missing.push("ec2_allowed_regions".to_string());
        }
        if self.ec2_instance_types.is_empty() {
            missing.push("ec2_instance_types".to_string());
        }
        if self.ec2_max_price <= 0.0 {
            missing.push("ec2_max_price".to_string());
        }
        if self.ec2_image_name.is_empty() {
            missing.push("ec2_image_name".to_string());
        }
        missing
    }

    /// Validates that the configuration is usable: not cyclic, no missing
    /// parameters, and every named instance type/region recognized. Must
    /// pass before reconciliation may proceed.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.is_cyclic() {
            return Err(ConfigValidationError::Cyclic(
                "flattened configuration reports a cycle".to_string(),
            ));
        }
        let missing = self.missing_parameters();
        if !missing.is_empty() {
            return Err(ConfigValidationError::MissingParameters(missing));
        }
        for instance_type in &self.ec2_instance_types {
            if cores_for_instance_type(instance_type).is_none() {
                return Err(ConfigValidationError::UnknownInstanceType(
                    instance_type.clone(),
                ));
            }
        }
        for region in &self.ec2_allowed_regions {
            if !is_supported_region(region) {
                return Err(ConfigValidationError::UnsupportedRegion(region.clone()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Pool {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub last_cycled: Option<DateTime<Utc>>,
    pub config: sqlx::types::Json<PoolConfiguration>,
}

impl Pool {
    /// True once `last_cycled` is unset or older than `cycle_interval`
    /// seconds.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.last_cycled {
            None => true,
            Some(last) => {
                let age = now.signed_duration_since(last);
                age.num_seconds() >= self.config.cycle_interval
            }
        }
    }
}

/// A provider instance or spot request tracked locally.
///
/// `ec2_instance_id` holds a provider request-id while `status_code ==
/// STATUS_REQUESTED`, and an instance-id for every other status.
///
/// `ec2_instance_type` is carried here because the blacklist key
/// `blacklist:<zone>:<type>` and the scale-down reselection both need the
/// instance type an instance was actually created as, which `size` alone
/// cannot recover (distinct instance types can share a core count).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Instance {
    pub id: Uuid,
    pub pool_id: Uuid,
    pub ec2_instance_id: String,
    pub ec2_region: String,
    pub ec2_zone: String,
    pub ec2_instance_type: String,
    pub hostname: Option<String>,
    pub size: u32,
    pub status_code: i32,
    pub created: DateTime<Utc>,
}

impl Instance {
    pub fn is_requested(&self) -> bool {
        self.status_code == STATUS_REQUESTED
    }
}
