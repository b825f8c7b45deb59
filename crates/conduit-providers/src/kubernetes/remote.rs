//! Secret access in the remote cluster

use async_trait::async_trait;
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec,
};
use k8s_openapi::api::core::v1::Secret;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client};

use conduit_common::ProviderError;

/// Operations the kubernetes provider needs from the remote cluster
///
/// All calls are scoped to the remote namespace the store configures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteSecrets: Send + Sync {
    /// Get a secret, `None` if it does not exist
    async fn get(&self, name: &str) -> Result<Option<Secret>, ProviderError>;

    /// List secrets matching a label selector (empty for all)
    async fn list(&self, label_selector: &str) -> Result<Vec<Secret>, ProviderError>;

    /// Create a secret
    async fn create(&self, secret: Secret) -> Result<(), ProviderError>;

    /// Replace an existing secret
    async fn replace(&self, name: &str, secret: Secret) -> Result<(), ProviderError>;

    /// Delete a secret
    async fn delete(&self, name: &str) -> Result<(), ProviderError>;

    /// Whether the configured identity may read secrets in the namespace
    async fn can_read(&self) -> Result<bool, ProviderError>;
}

/// [`RemoteSecrets`] backed by a kube client
pub struct KubeRemoteSecrets {
    client: Client,
    namespace: String,
}

impl KubeRemoteSecrets {
    /// Scope a client to a namespace
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn api(&self) -> Api<Secret> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

fn backend(e: kube::Error) -> ProviderError {
    ProviderError::backend(e)
}

#[async_trait]
impl RemoteSecrets for KubeRemoteSecrets {
    async fn get(&self, name: &str) -> Result<Option<Secret>, ProviderError> {
        self.api().get_opt(name).await.map_err(backend)
    }

    async fn list(&self, label_selector: &str) -> Result<Vec<Secret>, ProviderError> {
        let params = if label_selector.is_empty() {
            ListParams::default()
        } else {
            ListParams::default().labels(label_selector)
        };
        Ok(self.api().list(&params).await.map_err(backend)?.items)
    }

    async fn create(&self, secret: Secret) -> Result<(), ProviderError> {
        self.api()
            .create(&PostParams::default(), &secret)
            .await
            .map(|_| ())
            .map_err(backend)
    }

    async fn replace(&self, name: &str, secret: Secret) -> Result<(), ProviderError> {
        self.api()
            .replace(name, &PostParams::default(), &secret)
            .await
            .map(|_| ())
            .map_err(backend)
    }

    async fn delete(&self, name: &str) -> Result<(), ProviderError> {
        match self.api().delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(backend(e)),
        }
    }

    async fn can_read(&self) -> Result<bool, ProviderError> {
        let api: Api<SelfSubjectAccessReview> = Api::all(self.client.clone());
        let review = SelfSubjectAccessReview {
            spec: SelfSubjectAccessReviewSpec {
                resource_attributes: Some(ResourceAttributes {
                    namespace: Some(self.namespace.clone()),
                    verb: Some("get".to_string()),
                    resource: Some("secrets".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };
        let created = api
            .create(&PostParams::default(), &review)
            .await
            .map_err(backend)?;
        Ok(created.status.map(|s| s.allowed).unwrap_or(false))
    }
}
