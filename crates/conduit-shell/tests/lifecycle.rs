//! Bridge and shell talking over a real socket

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use conduit_bridge::{connect, BridgeConfig, ProviderBridge};
use conduit_common::refs::SecretKeySelector;
use conduit_common::resolvers::secret_key_ref;
use conduit_common::store::{
    KubernetesAuth, KubernetesProvider, ProviderSpec, SecretStore, StoreSpec, TokenAuth,
};
use conduit_common::{
    FindRef, GenericStore, ObjectReader, Provider, ProviderError, PushRemoteRef, RemoteRef,
    ResolvedObject, ResolvedObjectSet, SecretsClient, ValidationResult,
};
use conduit_shell::{ProviderListener, ProviderServer};

/// Reads `<secret>/<key>` remote refs from the closed-world store.
/// The key `slow` parks until released.
#[derive(Clone, Default)]
struct ObjectsProvider {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

struct ObjectsClient {
    store: GenericStore,
    objects: Arc<dyn ObjectReader>,
    namespace: String,
    started: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl Provider for ObjectsProvider {
    fn kind(&self) -> &'static str {
        "kubernetes"
    }

    async fn new_client(
        &self,
        store: &GenericStore,
        objects: Arc<dyn ObjectReader>,
        namespace: &str,
    ) -> Result<Box<dyn SecretsClient>, ProviderError> {
        Ok(Box::new(ObjectsClient {
            store: store.clone(),
            objects,
            namespace: namespace.to_string(),
            started: self.started.clone(),
            release: self.release.clone(),
        }))
    }
}

#[async_trait]
impl SecretsClient for ObjectsClient {
    async fn get_secret(&self, remote: &RemoteRef) -> Result<Vec<u8>, ProviderError> {
        if remote.key == "slow" {
            self.started.notify_one();
            self.release.notified().await;
            return Ok(b"drained".to_vec());
        }
        let (name, key) = remote
            .key
            .split_once('/')
            .ok_or_else(|| ProviderError::invalid_config("key must be <secret>/<key>"))?;
        let selector = SecretKeySelector::new(name, key);
        Ok(secret_key_ref(
            self.objects.as_ref(),
            &self.store,
            &self.namespace,
            &selector,
        )?)
    }

    async fn get_secret_map(
        &self,
        _remote: &RemoteRef,
    ) -> Result<BTreeMap<String, Vec<u8>>, ProviderError> {
        Ok(BTreeMap::new())
    }

    async fn get_all_secrets(
        &self,
        _find: &FindRef,
    ) -> Result<BTreeMap<String, Vec<u8>>, ProviderError> {
        Ok(BTreeMap::new())
    }

    async fn push_secret(&self, _value: &[u8], _remote: &PushRemoteRef) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn delete_secret(&self, _remote: &PushRemoteRef) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn validate(&self) -> Result<ValidationResult, ProviderError> {
        Ok(ValidationResult::Ready)
    }
}

fn store() -> GenericStore {
    GenericStore::Namespaced(SecretStore::new(
        "x",
        "default",
        StoreSpec {
            provider: ProviderSpec {
                kubernetes: Some(KubernetesProvider {
                    auth: KubernetesAuth {
                        token: Some(TokenAuth {
                            bearer_token: SecretKeySelector::new("db-cred", "password"),
                        }),
                        ..Default::default()
                    },
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        },
    ))
}

fn db_cred() -> ResolvedObjectSet {
    ResolvedObjectSet(vec![ResolvedObject::Secret(Secret {
        metadata: ObjectMeta {
            name: Some("db-cred".to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            "password".to_string(),
            ByteString(b"s3cr3t".to_vec()),
        )])),
        ..Default::default()
    })])
}

fn bridge(dir: &Path) -> ProviderBridge {
    let channel = connect(&BridgeConfig::with_socket_dir(dir), "kubernetes").unwrap();
    ProviderBridge::new(channel, store(), db_cred(), "default")
}

fn start(
    dir: &Path,
    provider: ObjectsProvider,
) -> (CancellationToken, tokio::task::JoinHandle<Result<(), conduit_common::Error>>) {
    let listener = ProviderListener::bind(dir, "kubernetes").unwrap();
    let token = CancellationToken::new();
    let server = ProviderServer::new(provider);
    let handle = tokio::spawn(server.serve(listener, token.clone()));
    (token, handle)
}

#[tokio::test]
async fn test_shipped_objects_resolve_and_others_do_not() {
    let dir = tempfile::tempdir().unwrap();
    let (token, handle) = start(dir.path(), ObjectsProvider::default());

    let bridge = bridge(dir.path());
    let value = bridge
        .get_secret(&RemoteRef::new("db-cred/password"))
        .await
        .unwrap();
    assert_eq!(value, b"s3cr3t");

    let err = bridge
        .get_secret(&RemoteRef::new("other-secret/anything"))
        .await
        .unwrap_err();
    assert!(err.is_application(), "unexpected error: {err}");
    assert_eq!(err.to_string(), "Secret default/other-secret not found");

    assert_eq!(bridge.validate().await.unwrap(), ValidationResult::Unknown);
    bridge.close().await.unwrap();

    token.cancel();
    handle.await.unwrap().unwrap();
    assert!(!dir.path().join("kubernetes.sock").exists());
}

#[tokio::test]
async fn test_shutdown_drains_in_flight_and_refuses_new_dials() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ObjectsProvider::default();
    let (token, handle) = start(dir.path(), provider.clone());

    let in_flight = {
        let bridge = bridge(dir.path());
        tokio::spawn(async move { bridge.get_secret(&RemoteRef::new("slow")).await })
    };
    provider.started.notified().await;

    token.cancel();
    // Repeated cancellation, as from a second signal, is harmless.
    token.cancel();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let late = bridge(dir.path())
        .get_secret(&RemoteRef::new("db-cred/password"))
        .await
        .unwrap_err();
    assert!(late.is_transport(), "unexpected error: {late}");

    provider.release.notify_one();
    assert_eq!(in_flight.await.unwrap().unwrap(), b"drained");

    handle.await.unwrap().unwrap();
    assert!(!dir.path().join("kubernetes.sock").exists());
}

#[tokio::test]
async fn test_restart_after_unclean_exit() {
    let dir = tempfile::tempdir().unwrap();
    let listener = ProviderListener::bind(dir.path(), "kubernetes").unwrap();
    // Leak the guard so the socket file outlives the listener, as after a crash.
    let (raw, guard) = listener.into_parts();
    std::mem::forget(guard);
    drop(raw);

    let (token, handle) = start(dir.path(), ObjectsProvider::default());
    let value = bridge(dir.path())
        .get_secret(&RemoteRef::new("db-cred/password"))
        .await
        .unwrap();
    assert_eq!(value, b"s3cr3t");

    token.cancel();
    handle.await.unwrap().unwrap();
}
