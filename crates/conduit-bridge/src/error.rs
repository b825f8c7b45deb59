//! Bridge error types

use thiserror::Error;

/// Errors returned by [`crate::ProviderBridge`] operations
///
/// Callers branch on the class: a transport error means the provider could
/// not be reached (requeue with backoff), an application error means the
/// provider answered and refused (surface it on the calling resource).
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The RPC did not complete (dial failure, reset, deadline exceeded)
    #[error("unable to rpc: {0}")]
    Transport(#[from] tonic::Status),

    /// The provider completed the RPC and reported an error
    #[error("{0}")]
    Application(String),

    /// The request payload could not be built
    #[error("unable to build request: {0}")]
    Encode(#[source] conduit_common::Error),

    /// The endpoint could not be configured
    #[error("invalid endpoint: {0}")]
    Endpoint(String),
}

impl BridgeError {
    /// Whether the provider was unreachable
    pub fn is_transport(&self) -> bool {
        matches!(self, BridgeError::Transport(_))
    }

    /// Whether the provider answered with an error
    pub fn is_application(&self) -> bool {
        matches!(self, BridgeError::Application(_))
    }

    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        self.is_transport()
    }
}

/// Turn a response error field into a result
pub(crate) fn application(error: String) -> Result<(), BridgeError> {
    if error.is_empty() {
        Ok(())
    } else {
        Err(BridgeError::Application(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = BridgeError::from(tonic::Status::unavailable("connection refused"));
        assert!(err.is_transport());
        assert!(!err.is_application());
        assert!(err.to_string().starts_with("unable to rpc: "));
    }

    #[test]
    fn test_empty_error_field_is_success() {
        assert!(application(String::new()).is_ok());

        let err = application("secret \"db\" not found".to_string()).unwrap_err();
        assert!(err.is_application());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "secret \"db\" not found");
    }
}
