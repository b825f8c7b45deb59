//! The fixed operation set a provider process serves
//!
//! A provider process serves exactly one [`Provider`]. For every request the
//! shell asks it for a fresh [`SecretsClient`] bound to the decoded store and
//! the request's closed-world object store, runs one operation and closes the
//! client again.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::objects::{ObjectReader, StoreError};
use crate::remote::{FindRef, PushRemoteRef, RemoteRef, ValidationResult};
use crate::store::GenericStore;

/// Application error reported by a provider
///
/// These cross the process boundary as their `Display` string.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The remote secret (or property) does not exist
    #[error("secret {key:?} not found")]
    NotFound {
        /// Remote key (with property, if any)
        key: String,
    },

    /// The operation is not implemented by this provider
    #[error("{operation} is not supported by the {provider} provider")]
    NotSupported {
        /// Provider kind
        provider: &'static str,
        /// Operation name
        operation: &'static str,
    },

    /// The store or request arguments are invalid for this provider
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The backend refused or failed the operation
    #[error("backend error: {0}")]
    Backend(String),

    /// A referenced object was not shipped with the request
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProviderError {
    /// Create a not-found error
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create an invalid-configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a backend error
    pub fn backend(msg: impl std::fmt::Display) -> Self {
        Self::Backend(msg.to_string())
    }
}

/// Factory for per-request provider clients
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    /// Provider kind this factory serves (the `spec.provider` block name)
    fn kind(&self) -> &'static str;

    /// Build a client bound to one store and its shipped objects
    ///
    /// `objects` is the only view of the cluster the client gets.
    async fn new_client(
        &self,
        store: &GenericStore,
        objects: Arc<dyn ObjectReader>,
        namespace: &str,
    ) -> Result<Box<dyn SecretsClient>, ProviderError>;
}

/// Client for one backend, valid for the duration of one request
#[async_trait]
pub trait SecretsClient: Send + Sync {
    /// Read one secret value
    async fn get_secret(&self, remote: &RemoteRef) -> Result<Vec<u8>, ProviderError>;

    /// Read a structured secret as a map of keys to values
    async fn get_secret_map(
        &self,
        remote: &RemoteRef,
    ) -> Result<BTreeMap<String, Vec<u8>>, ProviderError>;

    /// Read every secret matching a selector
    async fn get_all_secrets(
        &self,
        find: &FindRef,
    ) -> Result<BTreeMap<String, Vec<u8>>, ProviderError>;

    /// Write a value to the backend
    async fn push_secret(&self, value: &[u8], remote: &PushRemoteRef)
        -> Result<(), ProviderError>;

    /// Remove a pushed value from the backend
    async fn delete_secret(&self, remote: &PushRemoteRef) -> Result<(), ProviderError>;

    /// Check the store can reach its backend
    async fn validate(&self) -> Result<ValidationResult, ProviderError>;

    /// Release backend resources
    async fn close(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
