use thiserror::Error;

/// Raised when a [`crate::PoolConfiguration`] fails the validity checks
/// `reconcile` must perform before touching a pool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("configuration is cyclic: {0}")]
    Cyclic(String),

    #[error("missing required parameters: {0:?}")]
    MissingParameters(Vec<String>),

    #[error("instance type '{0}' is not in the CORES_PER_INSTANCE table")]
    UnknownInstanceType(String),

    #[error("region '{0}' is not a supported region")]
    UnsupportedRegion(String),
}
