//! Local handle for one store's provider

use std::collections::BTreeMap;
use std::time::Duration;

use tonic::transport::Channel;
use tracing::{debug, instrument};

use conduit_common::wire::encode_context;
use conduit_common::{
    FindRef, GenericStore, PushRemoteRef, RemoteRef, ResolvedObjectSet, ValidationResult,
};
use conduit_proto as proto;
use conduit_proto::secrets_provider_client::SecretsProviderClient;

use crate::channel::ProviderChannel;
use crate::error::{application, BridgeError};

/// Forwards the fixed operation set to a provider process
///
/// Bound at construction to a store, the objects resolved for it, and the
/// namespace of the calling resource. Every call encodes a fresh payload;
/// nothing is cached between calls. Calls take `&self` and may run
/// concurrently; to cancel one, drop its future.
///
/// The bridge is not `Clone`: share it behind an `Arc` and close it once.
///
/// ```compile_fail
/// fn close_twice(bridge: conduit_bridge::ProviderBridge) {
///     let _first = bridge.close();
///     let _second = bridge.close();
/// }
/// ```
///
/// ```compile_fail
/// fn duplicate(bridge: &conduit_bridge::ProviderBridge) {
///     let _copy: conduit_bridge::ProviderBridge = bridge.clone();
/// }
/// ```
#[derive(Debug)]
pub struct ProviderBridge {
    client: SecretsProviderClient<Channel>,
    store: GenericStore,
    objects: ResolvedObjectSet,
    namespace: String,
    request_timeout: Duration,
}

impl ProviderBridge {
    /// Bind a store to a provider channel
    ///
    /// Calls use the deadline the channel was configured with.
    pub fn new(
        channel: ProviderChannel,
        store: GenericStore,
        objects: ResolvedObjectSet,
        namespace: impl Into<String>,
    ) -> Self {
        let (channel, request_timeout) = channel.into_parts();
        Self {
            client: SecretsProviderClient::new(channel),
            store,
            objects,
            namespace: namespace.into(),
            request_timeout,
        }
    }

    /// Override the per-call deadline
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Bound store
    pub fn store(&self) -> &GenericStore {
        &self.store
    }

    fn context(&self) -> Result<proto::StoreContext, BridgeError> {
        encode_context(&self.store, &self.objects, &self.namespace).map_err(BridgeError::Encode)
    }

    fn request<T>(&self, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        request.set_timeout(self.request_timeout);
        request
    }

    /// Read one secret value
    #[instrument(skip(self), fields(store = %self.store.name(), key = %remote.key))]
    pub async fn get_secret(&self, remote: &RemoteRef) -> Result<Vec<u8>, BridgeError> {
        let request = self.request(proto::GetSecretRequest {
            context: Some(self.context()?),
            r#ref: Some(remote.into()),
        });
        let response = self.client.clone().get_secret(request).await?.into_inner();
        application(response.error)?;
        debug!(bytes = response.value.len(), "secret fetched");
        Ok(response.value)
    }

    /// Read a structured secret as a map
    #[instrument(skip(self), fields(store = %self.store.name(), key = %remote.key))]
    pub async fn get_secret_map(
        &self,
        remote: &RemoteRef,
    ) -> Result<BTreeMap<String, Vec<u8>>, BridgeError> {
        let request = self.request(proto::GetSecretMapRequest {
            context: Some(self.context()?),
            r#ref: Some(remote.into()),
        });
        let response = self.client.clone().get_secret_map(request).await?.into_inner();
        application(response.error)?;
        debug!(keys = response.data.len(), "secret map fetched");
        Ok(response.data)
    }

    /// Read every secret matching a selector
    #[instrument(skip(self, find), fields(store = %self.store.name()))]
    pub async fn get_all_secrets(
        &self,
        find: &FindRef,
    ) -> Result<BTreeMap<String, Vec<u8>>, BridgeError> {
        let request = self.request(proto::GetAllSecretsRequest {
            context: Some(self.context()?),
            find: Some(find.into()),
        });
        let response = self.client.clone().get_all_secrets(request).await?.into_inner();
        application(response.error)?;
        debug!(keys = response.data.len(), "secrets found");
        Ok(response.data)
    }

    /// Write a value to the backend
    #[instrument(skip(self, value), fields(store = %self.store.name(), remote_key = %remote.remote_key))]
    pub async fn push_secret(&self, value: &[u8], remote: &PushRemoteRef) -> Result<(), BridgeError> {
        let request = self.request(proto::PushSecretRequest {
            context: Some(self.context()?),
            value: value.to_vec(),
            r#ref: Some(remote.into()),
        });
        let response = self.client.clone().push_secret(request).await?.into_inner();
        application(response.error)
    }

    /// Remove a pushed value from the backend
    #[instrument(skip(self), fields(store = %self.store.name(), remote_key = %remote.remote_key))]
    pub async fn delete_secret(&self, remote: &PushRemoteRef) -> Result<(), BridgeError> {
        let request = self.request(proto::DeleteSecretRequest {
            context: Some(self.context()?),
            r#ref: Some(remote.into()),
        });
        let response = self.client.clone().delete_secret(request).await?.into_inner();
        application(response.error)
    }

    /// Ask the provider to validate the store
    ///
    /// Validation runs in the provider process. The bridge reports
    /// [`ValidationResult::Unknown`] unless the provider returns an error.
    #[instrument(skip(self), fields(store = %self.store.name()))]
    pub async fn validate(&self) -> Result<ValidationResult, BridgeError> {
        let request = self.request(proto::ValidateRequest {
            context: Some(self.context()?),
        });
        let response = self.client.clone().validate(request).await?.into_inner();
        debug!(remote_result = ?response.result(), "validate answered");
        application(response.error)?;
        Ok(ValidationResult::Unknown)
    }

    /// Tell the provider the caller is done and release the channel
    ///
    /// Consumes the bridge, so it cannot be closed twice or used afterwards.
    #[instrument(skip(self), fields(store = %self.store.name()))]
    pub async fn close(self) -> Result<(), BridgeError> {
        let request = self.request(proto::CloseRequest {
            context: Some(self.context()?),
        });
        let mut client = self.client;
        let response = client.close(request).await?.into_inner();
        application(response.error)
    }
}
