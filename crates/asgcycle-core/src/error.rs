//! Error types for the cycler and its provider.

use std::time::Duration;

use thiserror::Error;

use crate::types::InstanceId;

/// Result type alias for cycling operations.
pub type CycleResult<T> = Result<T, CycleError>;

/// Result type alias for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors reported by a [`FleetApi`](crate::FleetApi) implementation.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("api error: {0}")]
    Api(String),
}

/// Errors that can stop (or, for `Retire`, mark) a cycling run.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid cycle size {spec:?}: {reason}")]
    InvalidSpec { spec: String, reason: String },

    #[error("launch configuration changed from {expected} to {actual} during the run")]
    Drift { expected: String, actual: String },

    #[error("capacity update rejected for group {group}: {source}")]
    Scale {
        group: String,
        #[source]
        source: ProviderError,
    },

    #[error("failed to terminate instance {instance}: {source}")]
    Retire {
        instance: InstanceId,
        #[source]
        source: ProviderError,
    },

    #[error("timed out after {waited:?} waiting for {phase}{}", pending_suffix(.pending))]
    Timeout {
        phase: &'static str,
        waited: Duration,
        pending: Vec<InstanceId>,
    },

    #[error("provider error: {0}")]
    Provider(ProviderError),
}

fn pending_suffix(pending: &[InstanceId]) -> String {
    if pending.is_empty() {
        String::new()
    } else {
        format!("; still pending: {}", pending.join(", "))
    }
}

impl From<ProviderError> for CycleError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(what) => CycleError::NotFound(what),
            other => CycleError::Provider(other),
        }
    }
}
