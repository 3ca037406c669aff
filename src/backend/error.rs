//! Error types for the cloud provider boundary
//!
//! Every provider call returns a [`ProviderError`] on failure. The variants
//! separate the signals the engine reacts to: throttling is retried,
//! "not found" turns a resource into a skip, everything else is surfaced.

use thiserror::Error;

/// Result type alias for provider operations
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Error codes the control plane uses to signal rate limiting
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
    "RequestThrottled",
    "RequestThrottledException",
    "SlowDown",
    "PriorRequestNotComplete",
];

/// Server-side codes that are worth another attempt
const TRANSIENT_CODES: &[&str] = &[
    "ServiceUnavailable",
    "InternalError",
    "InternalFailure",
    "RequestTimeout",
];

/// Not-found codes that do not follow the `*NotFound` naming scheme
const NOT_FOUND_CODES: &[&str] = &["LoadBalancerNotFound", "AccessPointNotFound"];

/// Unified error type for provider calls
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The control plane rejected the call because of rate limiting
    #[error("throttled by provider ({code}): {message}")]
    Throttled { code: String, message: String },

    /// The referenced resource does not exist
    #[error("resource not found ({code}): {message}")]
    NotFound { code: String, message: String },

    /// Credentials lack permission for the call
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Any other service-side error
    #[error("service error ({code}): {message}")]
    Service { code: String, message: String },

    /// Transport-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Call did not complete within its timeout
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// The provider cannot perform the requested operation
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl ProviderError {
    /// Classify a service error code into the matching variant
    pub fn from_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let message = message.into();

        if THROTTLING_CODES.contains(&code.as_str()) {
            ProviderError::Throttled { code, message }
        } else if is_not_found_code(&code) {
            ProviderError::NotFound { code, message }
        } else if code == "AccessDenied"
            || code == "AccessDeniedException"
            || code == "UnauthorizedOperation"
        {
            ProviderError::AccessDenied(message)
        } else {
            ProviderError::Service { code, message }
        }
    }

    /// Shorthand for a not-found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        let resource = resource.into();
        ProviderError::NotFound {
            code: "NotFound".to_string(),
            message: format!("{resource} does not exist"),
        }
    }

    /// Shorthand for a throttling error
    pub fn throttled(operation: impl Into<String>) -> Self {
        ProviderError::Throttled {
            code: "Throttling".to_string(),
            message: format!("rate exceeded for {}", operation.into()),
        }
    }

    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Throttled { .. }
            | ProviderError::Network(_)
            | ProviderError::Timeout(_) => true,
            ProviderError::Service { code, .. } => TRANSIENT_CODES.contains(&code.as_str()),
            _ => false,
        }
    }

    /// Check if this error is a rate-limit signal
    pub fn is_throttling(&self) -> bool {
        matches!(self, ProviderError::Throttled { .. })
    }

    /// Check if this error indicates the resource was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound { .. })
    }

    /// Service error code, when the provider returned one
    pub fn code(&self) -> Option<&str> {
        match self {
            ProviderError::Throttled { code, .. }
            | ProviderError::NotFound { code, .. }
            | ProviderError::Service { code, .. } => Some(code),
            _ => None,
        }
    }
}

fn is_not_found_code(code: &str) -> bool {
    code.ends_with("NotFound")
        || code.ends_with("NotFoundFault")
        || code.ends_with("NotFoundException")
        || code.contains(".NotFound")
        || NOT_FOUND_CODES.contains(&code)
}
