//! Provider reading and writing Secrets in a remote Kubernetes cluster
//!
//! The remote cluster is reached with credentials taken from the store's
//! shipped objects; the provider process has no other cluster access.

mod auth;
mod remote;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use regex::Regex;
use serde_json::json;
use tracing::debug;

use conduit_common::remote::MetadataPolicy;
use conduit_common::{
    FindRef, GenericStore, ObjectReader, Provider, ProviderError, PushRemoteRef, RemoteRef,
    SecretsClient, ValidationResult,
};

pub use auth::kubeconfig;
pub use remote::{KubeRemoteSecrets, RemoteSecrets};

/// Provider kind
pub const KIND: &str = "kubernetes";

/// Label marking secrets created by a push
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`]
pub const MANAGED_BY: &str = "conduit";

/// Factory for [`KubernetesClient`]s
#[derive(Clone, Copy, Debug, Default)]
pub struct KubernetesSecretsProvider;

#[async_trait]
impl Provider for KubernetesSecretsProvider {
    fn kind(&self) -> &'static str {
        KIND
    }

    async fn new_client(
        &self,
        store: &GenericStore,
        objects: Arc<dyn ObjectReader>,
        namespace: &str,
    ) -> Result<Box<dyn SecretsClient>, ProviderError> {
        let spec = store
            .provider()
            .kubernetes
            .as_ref()
            .ok_or_else(|| ProviderError::invalid_config("missing spec.provider.kubernetes"))?;

        let config = auth::kubeconfig(spec, objects.as_ref(), store, namespace)?;
        let client = auth::client(config).await?;
        debug!(server = %spec.server.url, remote_namespace = %spec.remote_namespace, "remote client ready");

        Ok(Box::new(KubernetesClient::new(KubeRemoteSecrets::new(
            client,
            &spec.remote_namespace,
        ))))
    }
}

/// Client for one remote namespace
pub struct KubernetesClient<R> {
    remote: R,
}

impl<R: RemoteSecrets> KubernetesClient<R> {
    /// Wrap remote access
    pub fn new(remote: R) -> Self {
        Self { remote }
    }

    async fn existing(&self, name: &str) -> Result<Secret, ProviderError> {
        self.remote
            .get(name)
            .await?
            .ok_or_else(|| ProviderError::not_found(name))
    }
}

fn data(secret: &Secret) -> BTreeMap<String, Vec<u8>> {
    let mut out: BTreeMap<String, Vec<u8>> = secret
        .string_data
        .iter()
        .flatten()
        .map(|(k, v)| (k.clone(), v.as_bytes().to_vec()))
        .collect();
    for (k, v) in secret.data.iter().flatten() {
        out.insert(k.clone(), v.0.clone());
    }
    out
}

/// Values as a JSON object of strings (lossy for non-UTF-8 values)
fn data_json(data: &BTreeMap<String, Vec<u8>>) -> Vec<u8> {
    let object: serde_json::Map<String, serde_json::Value> = data
        .iter()
        .map(|(k, v)| (k.clone(), json!(String::from_utf8_lossy(v))))
        .collect();
    serde_json::Value::Object(object).to_string().into_bytes()
}

fn metadata(secret: &Secret, remote: &RemoteRef) -> Result<Vec<u8>, ProviderError> {
    let value = json!({
        "labels": secret.metadata.labels.clone().unwrap_or_default(),
        "annotations": secret.metadata.annotations.clone().unwrap_or_default(),
    });
    if remote.property.is_empty() {
        return Ok(value.to_string().into_bytes());
    }
    let (section, key) = match remote.property.split_once('.') {
        Some((section, key)) => (section, Some(key)),
        None => (remote.property.as_str(), None),
    };
    let selected = match key {
        Some(key) => value.get(section).and_then(|s| s.get(key)),
        None => value.get(section),
    }
    .ok_or_else(|| ProviderError::not_found(format!("{}/{}", remote.key, remote.property)))?;
    Ok(match selected {
        serde_json::Value::String(s) => s.as_bytes().to_vec(),
        other => other.to_string().into_bytes(),
    })
}

fn decoded(
    strategy: conduit_common::remote::DecodingStrategy,
    value: Vec<u8>,
) -> Result<Vec<u8>, ProviderError> {
    strategy
        .decode(value)
        .map_err(|e| ProviderError::invalid_config(e.to_string()))
}

fn label_selector(tags: &BTreeMap<String, String>) -> String {
    tags.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl<R: RemoteSecrets> SecretsClient for KubernetesClient<R> {
    async fn get_secret(&self, remote: &RemoteRef) -> Result<Vec<u8>, ProviderError> {
        let secret = self.existing(&remote.key).await?;
        if remote.metadata_policy == MetadataPolicy::Fetch {
            return metadata(&secret, remote);
        }

        let data = data(&secret);
        if remote.property.is_empty() {
            return Ok(data_json(&data));
        }
        let value = data
            .get(&remote.property)
            .cloned()
            .ok_or_else(|| ProviderError::not_found(format!("{}/{}", remote.key, remote.property)))?;
        decoded(remote.decoding_strategy, value)
    }

    async fn get_secret_map(
        &self,
        remote: &RemoteRef,
    ) -> Result<BTreeMap<String, Vec<u8>>, ProviderError> {
        let secret = self.existing(&remote.key).await?;
        data(&secret)
            .into_iter()
            .map(|(k, v)| {
                Ok((
                    remote.conversion_strategy.convert_key(&k),
                    decoded(remote.decoding_strategy, v)?,
                ))
            })
            .collect()
    }

    async fn get_all_secrets(
        &self,
        find: &FindRef,
    ) -> Result<BTreeMap<String, Vec<u8>>, ProviderError> {
        if find.path.is_some() {
            return Err(ProviderError::NotSupported {
                provider: KIND,
                operation: "find by path",
            });
        }
        if find.tags.is_empty() && find.name.is_none() {
            return Err(ProviderError::invalid_config(
                "find requires tags or a name regexp",
            ));
        }
        let pattern = find
            .name
            .as_ref()
            .map(|n| Regex::new(&n.regexp))
            .transpose()
            .map_err(|e| ProviderError::invalid_config(format!("invalid name regexp: {e}")))?;

        let secrets = self.remote.list(&label_selector(&find.tags)).await?;
        let mut found = BTreeMap::new();
        for secret in secrets {
            let Some(name) = secret.metadata.name.clone() else {
                continue;
            };
            if pattern.as_ref().is_some_and(|p| !p.is_match(&name)) {
                continue;
            }
            let value = decoded(find.decoding_strategy, data_json(&data(&secret)))?;
            found.insert(find.conversion_strategy.convert_key(&name), value);
        }
        debug!(matched = found.len(), "remote secrets found");
        Ok(found)
    }

    async fn push_secret(&self, value: &[u8], remote: &PushRemoteRef) -> Result<(), ProviderError> {
        if remote.property.is_empty() {
            return Err(ProviderError::invalid_config(
                "pushing to a kubernetes secret requires a property",
            ));
        }
        let entry = (remote.property.clone(), ByteString(value.to_vec()));

        match self.remote.get(&remote.remote_key).await? {
            Some(mut secret) => {
                secret.data.get_or_insert_with(BTreeMap::new).insert(entry.0, entry.1);
                self.remote.replace(&remote.remote_key, secret).await
            }
            None => {
                let secret = Secret {
                    metadata: ObjectMeta {
                        name: Some(remote.remote_key.clone()),
                        labels: Some(BTreeMap::from([(
                            MANAGED_BY_LABEL.to_string(),
                            MANAGED_BY.to_string(),
                        )])),
                        ..Default::default()
                    },
                    data: Some(BTreeMap::from([entry])),
                    type_: Some("Opaque".to_string()),
                    ..Default::default()
                };
                self.remote.create(secret).await
            }
        }
    }

    async fn delete_secret(&self, remote: &PushRemoteRef) -> Result<(), ProviderError> {
        if remote.property.is_empty() {
            return self.remote.delete(&remote.remote_key).await;
        }
        let Some(mut secret) = self.remote.get(&remote.remote_key).await? else {
            return Ok(());
        };
        let removed = secret
            .data
            .as_mut()
            .and_then(|data| data.remove(&remote.property))
            .is_some();
        if !removed {
            return Ok(());
        }
        if secret.data.as_ref().map_or(true, BTreeMap::is_empty) {
            self.remote.delete(&remote.remote_key).await
        } else {
            self.remote.replace(&remote.remote_key, secret).await
        }
    }

    async fn validate(&self) -> Result<ValidationResult, ProviderError> {
        if self.remote.can_read().await? {
            Ok(ValidationResult::Ready)
        } else {
            Err(ProviderError::backend(
                "not allowed to get secrets in the remote namespace",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_common::remote::{ConversionStrategy, DecodingStrategy};
    use super::remote::MockRemoteSecrets;

    fn secret(name: &str, pairs: &[(&str, &str)]) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(BTreeMap::from([("env".to_string(), "prod".to_string())])),
                ..Default::default()
            },
            data: Some(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    fn with_db() -> MockRemoteSecrets {
        let mut remote = MockRemoteSecrets::new();
        remote.expect_get().returning(|name| {
            Ok((name == "db").then(|| secret("db", &[("username", "admin"), ("password", "czNjcjN0")])))
        });
        remote
    }

    #[tokio::test]
    async fn test_get_secret_property_and_whole() {
        let client = KubernetesClient::new(with_db());
        let remote = RemoteRef {
            decoding_strategy: DecodingStrategy::Base64,
            ..RemoteRef::new("db").with_property("password")
        };
        assert_eq!(client.get_secret(&remote).await.unwrap(), b"s3cr3t");

        let whole = client.get_secret(&RemoteRef::new("db")).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&whole).unwrap();
        assert_eq!(json["username"], "admin");

        let err = client.get_secret(&RemoteRef::new("nope")).await.unwrap_err();
        assert_eq!(err.to_string(), "secret \"nope\" not found");
    }

    #[tokio::test]
    async fn test_get_secret_metadata() {
        let client = KubernetesClient::new(with_db());
        let remote = RemoteRef {
            metadata_policy: MetadataPolicy::Fetch,
            ..RemoteRef::new("db").with_property("labels.env")
        };
        assert_eq!(client.get_secret(&remote).await.unwrap(), b"prod");
    }

    #[tokio::test]
    async fn test_get_secret_map_converts_keys() {
        let mut remote = MockRemoteSecrets::new();
        remote
            .expect_get()
            .returning(|_| Ok(Some(secret("cfg", &[("app config", "x")]))));
        let client = KubernetesClient::new(remote);

        let map = client
            .get_secret_map(&RemoteRef {
                conversion_strategy: ConversionStrategy::Unicode,
                ..RemoteRef::new("cfg")
            })
            .await
            .unwrap();
        assert_eq!(map["app_U0020_config"], b"x");
    }

    #[tokio::test]
    async fn test_get_all_secrets_by_tags_and_name() {
        let mut remote = MockRemoteSecrets::new();
        remote
            .expect_list()
            .withf(|selector| selector == "env=prod")
            .returning(|_| Ok(vec![secret("db-main", &[("k", "1")]), secret("cache", &[("k", "2")])]));
        let client = KubernetesClient::new(remote);

        let mut find = FindRef::by_name("^db-");
        find.tags.insert("env".to_string(), "prod".to_string());
        let found = client.get_all_secrets(&find).await.unwrap();
        assert_eq!(found.keys().collect::<Vec<_>>(), vec!["db-main"]);
    }

    #[tokio::test]
    async fn test_push_requires_property() {
        let client = KubernetesClient::new(MockRemoteSecrets::new());
        let err = client
            .push_secret(b"v", &PushRemoteRef::new("db", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_push_creates_missing_secret() {
        let mut remote = MockRemoteSecrets::new();
        remote.expect_get().returning(|_| Ok(None));
        remote
            .expect_create()
            .withf(|s| {
                s.metadata.name.as_deref() == Some("new")
                    && s.data.as_ref().is_some_and(|d| d["password"].0 == b"hunter2")
            })
            .times(1)
            .returning(|_| Ok(()));
        let client = KubernetesClient::new(remote);

        client
            .push_secret(b"hunter2", &PushRemoteRef::new("new", "password"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_push_updates_existing_secret() {
        let mut remote = with_db();
        remote
            .expect_replace()
            .withf(|name, s| name == "db" && s.data.as_ref().is_some_and(|d| d.len() == 3))
            .times(1)
            .returning(|_, _| Ok(()));
        let client = KubernetesClient::new(remote);

        client
            .push_secret(b"5432", &PushRemoteRef::new("db", "port"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_last_property_deletes_secret() {
        let mut remote = MockRemoteSecrets::new();
        remote
            .expect_get()
            .returning(|_| Ok(Some(secret("single", &[("only", "v")]))));
        remote
            .expect_delete()
            .withf(|name| name == "single")
            .times(1)
            .returning(|_| Ok(()));
        let client = KubernetesClient::new(remote);

        client
            .delete_secret(&PushRemoteRef::new("single", "only"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_validate_uses_access_review() {
        let mut allowed = MockRemoteSecrets::new();
        allowed.expect_can_read().returning(|| Ok(true));
        assert_eq!(
            KubernetesClient::new(allowed).validate().await.unwrap(),
            ValidationResult::Ready
        );

        let mut denied = MockRemoteSecrets::new();
        denied.expect_can_read().returning(|| Ok(false));
        assert!(KubernetesClient::new(denied).validate().await.is_err());
    }
}
