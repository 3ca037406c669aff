//! SDK error classification

use aws_sdk_ec2::error::{ProvideErrorMetadata, SdkError};

use crate::backend::ProviderError;

/// Map any SDK error onto [`ProviderError`] using the service error code
pub(crate) fn classify<E, R>(error: SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
    R: std::fmt::Debug,
{
    match error {
        SdkError::TimeoutError(_) => ProviderError::Timeout("request timed out".to_string()),
        SdkError::DispatchFailure(failure) => {
            if failure.is_timeout() {
                ProviderError::Timeout(format!("{:?}", failure))
            } else {
                ProviderError::Network(format!("Network dispatch failure: {:?}", failure))
            }
        }
        SdkError::ResponseError(e) => ProviderError::Network(format!("Response error: {:?}", e)),
        SdkError::ServiceError(context) => {
            let err = context.err();
            ProviderError::from_code(
                err.code().unwrap_or("Unknown"),
                err.message().unwrap_or_default(),
            )
        }
        other => ProviderError::Service {
            code: "Sdk".to_string(),
            message: format!("{:?}", other),
        },
    }
}
