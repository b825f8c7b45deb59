//! gRPC service running each request against a fresh provider client
//!
//! Every handler follows the same steps: decode the store context, rebuild
//! the closed-world object store from the shipped objects, check the store
//! names the provider this process serves, build a client, run one
//! operation, close the client. Failures at any step are reported in the
//! response `error` field; a `Status` is never returned for them.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tonic::{Request, Response, Status};
use tracing::{debug, warn};

use conduit_common::wire::{decode_context, required};
use conduit_common::{
    Error, FindRef, ObjectReader, Provider, ProviderError, PushRemoteRef, RemoteRef,
    SecretsClient,
};
use conduit_proto as proto;
use conduit_proto::secrets_provider_server::{SecretsProvider, SecretsProviderServer};

/// Why a request failed, as reported to the caller
#[derive(Debug, Error)]
enum RequestError {
    #[error(transparent)]
    Decode(#[from] Error),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Tonic service for one provider
pub struct ProviderService<P> {
    provider: Arc<P>,
}

impl<P> Clone for ProviderService<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
        }
    }
}

impl<P: Provider> ProviderService<P> {
    /// Wrap a provider
    pub fn new(provider: P) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }

    /// Convert to a tonic service
    pub fn into_service(self) -> SecretsProviderServer<Self> {
        SecretsProviderServer::new(self)
    }

    /// Decode the request context and build a client bound to it
    async fn open(
        &self,
        context: Option<proto::StoreContext>,
    ) -> Result<Box<dyn SecretsClient>, RequestError> {
        let decoded = decode_context(context)?;

        let requested = decoded.store.provider().kind()?;
        let served = self.provider.kind();
        if requested != served {
            return Err(Error::configuration_for_field(
                "spec.provider",
                format!(
                    "store {} uses provider {requested}, this process serves {served}",
                    decoded.store.name()
                ),
            )
            .into());
        }

        debug!(
            store = %decoded.store.name(),
            namespace = %decoded.namespace,
            objects = decoded.objects.len(),
            "store context decoded"
        );

        let objects: Arc<dyn ObjectReader> = Arc::new(decoded.objects);
        Ok(self
            .provider
            .new_client(&decoded.store, objects, &decoded.namespace)
            .await?)
    }
}

async fn close(client: Box<dyn SecretsClient>) {
    if let Err(e) = client.close().await {
        warn!(error = %e, "failed to close provider client");
    }
}

/// Split a handler result into its payload and the response error string
fn respond<T: Default>(
    op: &'static str,
    started: Instant,
    result: Result<T, RequestError>,
) -> (T, String) {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(value) => {
            debug!(op, elapsed_ms, "request completed");
            (value, String::new())
        }
        Err(e) => {
            debug!(op, elapsed_ms, error = %e, "request failed");
            (T::default(), e.to_string())
        }
    }
}

#[tonic::async_trait]
impl<P: Provider> SecretsProvider for ProviderService<P> {
    async fn get_secret(
        &self,
        request: Request<proto::GetSecretRequest>,
    ) -> Result<Response<proto::GetSecretResponse>, Status> {
        let started = Instant::now();
        let request = request.into_inner();
        let result = async move {
            let remote = RemoteRef::try_from(required(request.r#ref, "ref")?)?;
            let client = self.open(request.context).await?;
            let value = client.get_secret(&remote).await;
            close(client).await;
            Ok::<_, RequestError>(value?)
        }
        .await;

        let (value, error) = respond("GetSecret", started, result);
        Ok(Response::new(proto::GetSecretResponse { value, error }))
    }

    async fn get_secret_map(
        &self,
        request: Request<proto::GetSecretMapRequest>,
    ) -> Result<Response<proto::GetSecretMapResponse>, Status> {
        let started = Instant::now();
        let request = request.into_inner();
        let result = async move {
            let remote = RemoteRef::try_from(required(request.r#ref, "ref")?)?;
            let client = self.open(request.context).await?;
            let data = client.get_secret_map(&remote).await;
            close(client).await;
            Ok::<_, RequestError>(data?)
        }
        .await;

        let (data, error) = respond("GetSecretMap", started, result);
        Ok(Response::new(proto::GetSecretMapResponse { data, error }))
    }

    async fn get_all_secrets(
        &self,
        request: Request<proto::GetAllSecretsRequest>,
    ) -> Result<Response<proto::GetAllSecretsResponse>, Status> {
        let started = Instant::now();
        let request = request.into_inner();
        let result = async move {
            let find = FindRef::try_from(required(request.find, "find")?)?;
            let client = self.open(request.context).await?;
            let data = client.get_all_secrets(&find).await;
            close(client).await;
            Ok::<_, RequestError>(data?)
        }
        .await;

        let (data, error) = respond("GetAllSecrets", started, result);
        Ok(Response::new(proto::GetAllSecretsResponse { data, error }))
    }

    async fn push_secret(
        &self,
        request: Request<proto::PushSecretRequest>,
    ) -> Result<Response<proto::PushSecretResponse>, Status> {
        let started = Instant::now();
        let request = request.into_inner();
        let result = async move {
            let remote = PushRemoteRef::from(required(request.r#ref, "ref")?);
            let client = self.open(request.context).await?;
            let pushed = client.push_secret(&request.value, &remote).await;
            close(client).await;
            Ok::<_, RequestError>(pushed?)
        }
        .await;

        let ((), error) = respond("PushSecret", started, result);
        Ok(Response::new(proto::PushSecretResponse { error }))
    }

    async fn delete_secret(
        &self,
        request: Request<proto::DeleteSecretRequest>,
    ) -> Result<Response<proto::DeleteSecretResponse>, Status> {
        let started = Instant::now();
        let request = request.into_inner();
        let result = async move {
            let remote = PushRemoteRef::from(required(request.r#ref, "ref")?);
            let client = self.open(request.context).await?;
            let deleted = client.delete_secret(&remote).await;
            close(client).await;
            Ok::<_, RequestError>(deleted?)
        }
        .await;

        let ((), error) = respond("DeleteSecret", started, result);
        Ok(Response::new(proto::DeleteSecretResponse { error }))
    }

    async fn validate(
        &self,
        request: Request<proto::ValidateRequest>,
    ) -> Result<Response<proto::ValidateResponse>, Status> {
        let started = Instant::now();
        let request = request.into_inner();
        let result = async move {
            let client = self.open(request.context).await?;
            let validated = client.validate().await;
            close(client).await;
            Ok::<_, RequestError>(validated?)
        }
        .await;

        let failed = result.is_err();
        let (validated, error) = respond("Validate", started, result);
        let mut response = proto::ValidateResponse {
            error,
            ..Default::default()
        };
        response.set_result(if failed {
            proto::ValidationResult::Error
        } else {
            validated.into()
        });
        Ok(Response::new(response))
    }

    async fn close(
        &self,
        request: Request<proto::CloseRequest>,
    ) -> Result<Response<proto::CloseResponse>, Status> {
        let started = Instant::now();
        let request = request.into_inner();
        let result = async move {
            let client = self.open(request.context).await?;
            Ok::<_, RequestError>(client.close().await?)
        }
        .await;

        let ((), error) = respond("Close", started, result);
        Ok(Response::new(proto::CloseResponse { error }))
    }
}
