use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub struct ConfigError(pub String);

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConfigError: {}", self.0)
    }
}
impl std::error::Error for ConfigError {}

/// Rejected window, limit or run flags. Always raised before a run exists.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("validation error: {0}")]
pub struct ValidationError(pub String);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to allocate a unique run key after {attempts} attempts")]
    KeyAllocationExhausted { attempts: u32 },

    #[error("run {run_key} does not exist")]
    UnknownRun { run_key: String },

    #[error("run {run_key} is already finalized")]
    AlreadyFinalized { run_key: String },

    #[error("sqlite connection mutex poisoned")]
    Poisoned,
}

/// Exit-code class for a top-level failure.
pub fn is_validation_failure(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ValidationError>().is_some() || err.downcast_ref::<ConfigError>().is_some()
}
