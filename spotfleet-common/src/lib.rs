pub mod error;
pub mod instance_types;
pub mod model;

pub use error::ConfigValidationError;
pub use instance_types::{cores_for_instance_type, is_supported_region, CORES_PER_INSTANCE};
pub use model::{
    strip_provider_code, Instance, InstanceStatus, Pool, PoolConfiguration, PoolStatusEntry,
    PoolStatusType, STATUS_PENDING, STATUS_REQUESTED, STATUS_RUNNING, STATUS_SHUTTING_DOWN,
    STATUS_STOPPED, STATUS_STOPPING, STATUS_TERMINATED,
};
