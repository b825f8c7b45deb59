//! Error types shared by the bridge, shell and providers
//!
//! Errors carry enough context (provider kind, object kind, operation) to be
//! useful in logs without a backtrace. Application failures that must cross
//! the process boundary are flattened to their `Display` string.

use thiserror::Error;

use crate::objects::StoreError;

/// Main error type for conduit operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Payload could not be decoded (store document or object list)
    #[error("unable to decode {what}: {message}")]
    Decode {
        /// What was being decoded (e.g., "store", "objects")
        what: String,
        /// Description of what failed
        message: String,
    },

    /// Payload could not be encoded
    #[error("unable to encode {what}: {message}")]
    Encode {
        /// What was being encoded
        what: String,
        /// Description of what failed
        message: String,
    },

    /// Lookup against the closed-world store failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Invalid configuration (store spec, socket directory, provider kind)
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.provider.kubernetes.auth")
        field: Option<String>,
    },

    /// Socket or filesystem error
    #[error("io error [{context}]: {source}")]
    Io {
        /// Context where the error occurred (e.g., "bind", "remove stale socket")
        context: String,
        /// The underlying io error
        #[source]
        source: std::io::Error,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred
        context: String,
    },
}

impl Error {
    /// Create a decode error
    pub fn decode(what: impl Into<String>, msg: impl std::fmt::Display) -> Self {
        Self::Decode {
            what: what.into(),
            message: msg.to_string(),
        }
    }

    /// Create an encode error
    pub fn encode(what: impl Into<String>, msg: impl std::fmt::Display) -> Self {
        Self::Encode {
            what: what.into(),
            message: msg.to_string(),
        }
    }

    /// Create a configuration error with the given message
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a configuration error pointing at a field path
    pub fn configuration_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create an io error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Decode, encode and configuration errors need a spec fix and are not
    /// retryable. Store misses are not retryable either: the caller shipped
    /// the object set it had.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::Decode { .. } => false,
            Error::Encode { .. } => false,
            Error::Store(_) => false,
            Error::Configuration { .. } => false,
            Error::Io { .. } => true,
            Error::Internal { .. } => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_names_payload() {
        let err = Error::decode("store", "expected value at line 1 column 1");
        assert_eq!(
            err.to_string(),
            "unable to decode store: expected value at line 1 column 1"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_configuration_error_with_field() {
        let err = Error::configuration_for_field("spec.provider", "no provider set");
        match &err {
            Error::Configuration { field, .. } => {
                assert_eq!(field.as_deref(), Some("spec.provider"))
            }
            _ => panic!("expected Configuration variant"),
        }
        assert!(err.to_string().contains("no provider set"));
    }

    #[test]
    fn test_store_error_is_transparent() {
        let err: Error =
            StoreError::not_found(crate::objects::ObjectKind::Secret, "default", "db-cred").into();
        assert_eq!(err.to_string(), "Secret default/db-cred not found");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_io_error_is_retryable() {
        let err = Error::io(
            "bind",
            std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        );
        assert!(err.is_retryable());
        assert!(err.to_string().contains("[bind]"));
    }
}
