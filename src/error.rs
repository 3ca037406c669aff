/*!
 * Error types for az-failure
 */

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::backend::ProviderError;
use crate::services::ServiceKind;

pub type Result<T> = std::result::Result<T, AzError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Error, Debug)]
pub enum AzError {
    /// Bad target selection or configuration; raised before any mutation
    #[error("validation error: {0}")]
    Validation(String),

    /// Discovery/read failure; aborts the service run
    #[error("{service} discovery failed: {source}")]
    ProviderQuery {
        service: ServiceKind,
        #[source]
        source: ProviderError,
    },

    /// Apply or reverse call failed for one resource
    #[error("provider call failed for {resource_id}: {source}")]
    ProviderMutation {
        resource_id: String,
        #[source]
        source: ProviderError,
    },

    /// Resource-level constraint prevents applying the failure
    #[error("precondition violated for {resource_id}: {reason}")]
    PreconditionViolation { resource_id: String, reason: String },

    /// Discovery matched nothing
    #[error("no {service} resources matched in {az}")]
    NoTargets { service: ServiceKind, az: String },

    #[error("no recovery state found at {}", path.display())]
    StateNotFound { path: PathBuf },

    #[error("recovery state at {} is unreadable: {reason}", path.display())]
    StateCorrupt { path: PathBuf, reason: String },

    /// A live (non dry-run) state file would be overwritten
    #[error(
        "recovery state from a live run already exists at {}; recover first or set overwrite_state",
        path.display()
    )]
    StateConflict { path: PathBuf },

    #[error("state file I/O failed at {}: {source}", path.display())]
    StateIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A bounded wait gave up
    #[error("timed out waiting for {what} after {attempts} attempts")]
    WaitTimeout { what: String, attempts: u32 },

    /// A per-resource task panicked inside the executor
    #[error("task for {resource_id} panicked: {message}")]
    TaskPanicked {
        resource_id: String,
        message: String,
    },
}

impl AzError {
    pub fn query(service: ServiceKind, source: ProviderError) -> Self {
        AzError::ProviderQuery { service, source }
    }

    pub fn mutation(resource_id: impl Into<String>, source: ProviderError) -> Self {
        AzError::ProviderMutation {
            resource_id: resource_id.into(),
            source,
        }
    }

    pub fn precondition(resource_id: impl Into<String>, reason: impl Into<String>) -> Self {
        AzError::PreconditionViolation {
            resource_id: resource_id.into(),
            reason: reason.into(),
        }
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            AzError::ProviderMutation { .. }
            | AzError::PreconditionViolation { .. }
            | AzError::WaitTimeout { .. }
            | AzError::TaskPanicked { .. } => EXIT_PARTIAL,
            _ => EXIT_FATAL,
        }
    }

    /// Check if this error aborts the whole service action
    pub fn is_fatal(&self) -> bool {
        match self {
            AzError::Validation(_)
            | AzError::ProviderQuery { .. }
            | AzError::NoTargets { .. }
            | AzError::StateNotFound { .. }
            | AzError::StateCorrupt { .. }
            | AzError::StateConflict { .. }
            | AzError::StateIo { .. } => true,

            AzError::ProviderMutation { .. }
            | AzError::PreconditionViolation { .. }
            | AzError::WaitTimeout { .. }
            | AzError::TaskPanicked { .. } => false,
        }
    }

    /// Check if this error is transient (temporary, worth retrying)
    pub fn is_transient(&self) -> bool {
        match self {
            AzError::ProviderQuery { source, .. } | AzError::ProviderMutation { source, .. } => {
                source.is_retryable()
            }
            AzError::WaitTimeout { .. } => true,
            _ => false,
        }
    }

    /// A mutation that hit a resource which no longer exists
    pub fn is_not_found(&self) -> bool {
        matches!(self, AzError::ProviderMutation { source, .. } if source.is_not_found())
    }

    /// Errors that turn a resource into `skipped` rather than `failed`
    pub fn is_skip(&self) -> bool {
        matches!(self, AzError::PreconditionViolation { .. }) || self.is_not_found()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(AzError::Validation("no az".into()).exit_code(), EXIT_FATAL);
        assert_eq!(
            AzError::query(ServiceKind::Asg, ProviderError::Network("reset".into())).exit_code(),
            EXIT_FATAL
        );
        assert_eq!(
            AzError::mutation("asg-1", ProviderError::Timeout("x".into())).exit_code(),
            EXIT_PARTIAL
        );
    }

    #[test]
    fn test_skip_classification() {
        assert!(AzError::precondition("alb", "would drop below 2 zones").is_skip());
        assert!(AzError::mutation("subnet-1", ProviderError::not_found("subnet-1")).is_skip());
        assert!(!AzError::mutation(
            "subnet-1",
            ProviderError::from_code("InvalidParameterValue", "bad")
        )
        .is_skip());
    }

    #[test]
    fn test_transient() {
        let throttled = AzError::mutation("lb", ProviderError::throttled("SetSubnets"));
        assert!(throttled.is_transient());
        assert!(!throttled.is_fatal());
        assert!(!AzError::Validation("x".into()).is_transient());
    }

    #[test]
    fn test_display() {
        let err = AzError::StateCorrupt {
            path: PathBuf::from("fail_az.asg.json"),
            reason: "expected value at line 1".into(),
        };
        assert_eq!(
            err.to_string(),
            "recovery state at fail_az.asg.json is unreadable: expected value at line 1"
        );

        let err = AzError::NoTargets {
            service: ServiceKind::ElbV2,
            az: "us-east-1a".into(),
        };
        assert_eq!(err.to_string(), "no elbv2 resources matched in us-east-1a");
    }
}
