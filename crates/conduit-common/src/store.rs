//! Store documents: the configuration a provider is instantiated from
//!
//! A store is either a namespaced `SecretStore` or a cluster-scoped
//! `ClusterSecretStore`. Both share the same spec; the scope only changes how
//! embedded references pick their namespace (see [`crate::resolvers`]).
//!
//! The provider blocks under `spec.provider` are opaque to the bridge and the
//! shell. They are scanned for references by [`crate::scan::aggregate`] and
//! interpreted only by the concrete provider they belong to.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::refs::{CaProvider, SecretKeySelector, ServiceAccountSelector};
use crate::as_node_record;
use crate::scan::{AsNode, Node};

/// API version shared by both store kinds
pub const STORE_API_VERSION: &str = "external-secrets.io/v1";

/// Kind of a namespaced store
pub const SECRET_STORE_KIND: &str = "SecretStore";

/// Kind of a cluster-scoped store
pub const CLUSTER_SECRET_STORE_KIND: &str = "ClusterSecretStore";

// =============================================================================
// Store documents
// =============================================================================

/// Either store shape
///
/// The set is closed: anything else is rejected at decode time.
#[derive(Clone, Debug, PartialEq)]
pub enum GenericStore {
    /// Namespaced `SecretStore`
    Namespaced(SecretStore),
    /// Cluster-scoped `ClusterSecretStore`
    Cluster(ClusterSecretStore),
}

impl GenericStore {
    /// Decode a store from its JSON representation, dispatching on `kind`
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| Error::decode("store", e))?;
        let kind = value
            .get("kind")
            .and_then(|k| k.as_str())
            .map(str::to_owned)
            .ok_or_else(|| Error::decode("store", "missing kind"))?;

        match kind.as_str() {
            SECRET_STORE_KIND => serde_json::from_value(value)
                .map(Self::Namespaced)
                .map_err(|e| Error::decode("store", e)),
            CLUSTER_SECRET_STORE_KIND => serde_json::from_value(value)
                .map(Self::Cluster)
                .map_err(|e| Error::decode("store", e)),
            other => Err(Error::decode(
                "store",
                format!("unsupported store kind {other:?}"),
            )),
        }
    }

    /// Encode the store as JSON
    pub fn to_vec(&self) -> Result<Vec<u8>, Error> {
        let encoded = match self {
            Self::Namespaced(store) => serde_json::to_vec(store),
            Self::Cluster(store) => serde_json::to_vec(store),
        };
        encoded.map_err(|e| Error::encode("store", e))
    }

    /// Store kind string
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Namespaced(_) => SECRET_STORE_KIND,
            Self::Cluster(_) => CLUSTER_SECRET_STORE_KIND,
        }
    }

    /// Whether references may name their own namespace
    pub fn is_cluster_scoped(&self) -> bool {
        matches!(self, Self::Cluster(_))
    }

    /// Store metadata
    pub fn metadata(&self) -> &StoreMetadata {
        match self {
            Self::Namespaced(store) => &store.metadata,
            Self::Cluster(store) => &store.metadata,
        }
    }

    /// Store name
    pub fn name(&self) -> &str {
        &self.metadata().name
    }

    /// Store spec
    pub fn spec(&self) -> &StoreSpec {
        match self {
            Self::Namespaced(store) => &store.spec,
            Self::Cluster(store) => &store.spec,
        }
    }

    /// Provider blocks of the store spec
    pub fn provider(&self) -> &ProviderSpec {
        &self.spec().provider
    }
}

impl AsNode for GenericStore {
    fn as_node(&self) -> Node<'_> {
        match self {
            Self::Namespaced(store) => store.as_node(),
            Self::Cluster(store) => store.as_node(),
        }
    }
}

/// Namespaced store
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretStore {
    /// API version
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Resource kind
    #[serde(default = "SecretStore::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: StoreMetadata,
    /// Store settings
    pub spec: StoreSpec,
}

impl SecretStore {
    fn default_kind() -> String {
        SECRET_STORE_KIND.to_string()
    }

    /// Create a new namespaced store
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, spec: StoreSpec) -> Self {
        Self {
            api_version: default_api_version(),
            kind: Self::default_kind(),
            metadata: StoreMetadata {
                name: name.into(),
                namespace: Some(namespace.into()),
                labels: BTreeMap::new(),
            },
            spec,
        }
    }
}

/// Cluster-scoped store
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSecretStore {
    /// API version
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Resource kind
    #[serde(default = "ClusterSecretStore::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: StoreMetadata,
    /// Store settings
    pub spec: StoreSpec,
}

impl ClusterSecretStore {
    fn default_kind() -> String {
        CLUSTER_SECRET_STORE_KIND.to_string()
    }

    /// Create a new cluster-scoped store
    pub fn new(name: impl Into<String>, spec: StoreSpec) -> Self {
        Self {
            api_version: default_api_version(),
            kind: Self::default_kind(),
            metadata: StoreMetadata {
                name: name.into(),
                namespace: None,
                labels: BTreeMap::new(),
            },
            spec,
        }
    }
}

fn default_api_version() -> String {
    STORE_API_VERSION.to_string()
}

/// Store metadata
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreMetadata {
    /// Resource name
    pub name: String,
    /// Resource namespace (unset for cluster-scoped stores)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Store spec shared by both store kinds
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreSpec {
    /// Controller class this store is handled by
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
    /// Provider configuration
    pub provider: ProviderSpec,
    /// Retry settings for provider calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_settings: Option<RetrySettings>,
    /// Refresh interval in seconds for store validation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<i64>,
}

/// Retry settings for provider calls
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetrySettings {
    /// Maximum number of retries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<i32>,
    /// Interval between retries (e.g., "10s")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_interval: Option<String>,
}

// =============================================================================
// Provider blocks
// =============================================================================

/// Provider block: exactly one block must be set
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ProviderSpec {
    /// Static in-memory provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fake: Option<FakeProvider>,
    /// Secrets in a (possibly remote) Kubernetes cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<KubernetesProvider>,
    /// HashiCorp Vault
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault: Option<VaultProvider>,
    /// Generic HTTP webhook
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookProvider>,
    /// AWS Secrets Manager / Parameter Store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsProvider>,
}

impl ProviderSpec {
    /// Name of the single configured provider block
    ///
    /// Returns an error when no block or more than one block is set.
    pub fn kind(&self) -> Result<&'static str, Error> {
        let configured: Vec<&'static str> = [
            ("fake", self.fake.is_some()),
            ("kubernetes", self.kubernetes.is_some()),
            ("vault", self.vault.is_some()),
            ("webhook", self.webhook.is_some()),
            ("aws", self.aws.is_some()),
        ]
        .into_iter()
        .filter_map(|(kind, set)| set.then_some(kind))
        .collect();

        match configured.as_slice() {
            [kind] => Ok(*kind),
            [] => Err(Error::configuration_for_field(
                "spec.provider",
                "no provider configured",
            )),
            many => Err(Error::configuration_for_field(
                "spec.provider",
                format!("exactly one provider must be configured, found {}", many.join(", ")),
            )),
        }
    }
}

/// Static provider serving data embedded in the store
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct FakeProvider {
    /// Entries served by the provider
    #[serde(default)]
    pub data: Vec<FakeProviderData>,
}

/// One entry of the fake provider
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct FakeProviderData {
    /// Remote key
    pub key: String,
    /// Value (may be a JSON document)
    #[serde(default)]
    pub value: String,
    /// Version of the entry
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

/// Kubernetes provider configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesProvider {
    /// API server connection
    #[serde(default)]
    pub server: KubernetesServer,
    /// Authentication
    pub auth: KubernetesAuth,
    /// Namespace in the remote cluster secrets are read from
    #[serde(default = "default_remote_namespace")]
    pub remote_namespace: String,
}

fn default_remote_namespace() -> String {
    "default".to_string()
}

/// API server connection for the Kubernetes provider
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesServer {
    /// API server URL
    #[serde(default = "default_kubernetes_url")]
    pub url: String,
    /// Base64-encoded PEM CA bundle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<String>,
    /// CA bundle stored in the cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_provider: Option<CaProvider>,
}

impl Default for KubernetesServer {
    fn default() -> Self {
        Self {
            url: default_kubernetes_url(),
            ca_bundle: None,
            ca_provider: None,
        }
    }
}

fn default_kubernetes_url() -> String {
    "https://kubernetes.default".to_string()
}

/// Authentication for the Kubernetes provider (one method)
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesAuth {
    /// Static bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenAuth>,
    /// Token minted for a service account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<ServiceAccountSelector>,
    /// Client certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert: Option<CertAuth>,
}

/// Bearer token authentication
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenAuth {
    /// Secret key holding the token
    pub bearer_token: SecretKeySelector,
}

/// Client certificate authentication
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertAuth {
    /// Secret key holding the PEM client certificate
    pub client_cert: SecretKeySelector,
    /// Secret key holding the PEM client key
    pub client_key: SecretKeySelector,
}

/// Vault provider configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VaultProvider {
    /// Vault server URL
    pub server: String,
    /// Path to secrets (e.g., "secret")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Vault KV version
    #[serde(default)]
    pub version: String,
    /// Vault namespace (enterprise)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Base64-encoded PEM CA bundle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<String>,
    /// CA bundle stored in the cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_provider: Option<CaProvider>,
    /// Authentication configuration
    #[serde(default)]
    pub auth: VaultAuth,
}

/// Vault authentication configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VaultAuth {
    /// Token authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_secret_ref: Option<SecretKeySelector>,
    /// Kubernetes authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<VaultKubernetesAuth>,
    /// AppRole authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_role: Option<VaultAppRole>,
}

/// Vault Kubernetes auth
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VaultKubernetesAuth {
    /// Mount path in Vault
    #[serde(default)]
    pub mount_path: String,
    /// Role name
    pub role: String,
    /// Service account whose token is presented
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_ref: Option<ServiceAccountSelector>,
    /// Secret holding a pre-issued token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretKeySelector>,
}

/// Vault AppRole auth
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VaultAppRole {
    /// Mount path in Vault
    #[serde(default)]
    pub path: String,
    /// Literal role id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
    /// Secret key holding the role id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_ref: Option<SecretKeySelector>,
    /// Secret key holding the secret id
    pub secret_ref: SecretKeySelector,
}

/// Webhook provider configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookProvider {
    /// Webhook URL with template placeholders (e.g., `{{ .remoteRef.key }}`)
    pub url: String,
    /// HTTP method (GET, POST, etc.)
    #[serde(default = "default_get")]
    pub method: String,
    /// Extra request headers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Result extraction configuration
    #[serde(default)]
    pub result: WebhookResult,
    /// Secrets made available to header/body templates
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<WebhookSecret>,
    /// Base64-encoded PEM CA bundle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<String>,
    /// CA bundle stored in the cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_provider: Option<CaProvider>,
}

fn default_get() -> String {
    "GET".to_string()
}

/// Result extraction for webhook provider
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResult {
    /// JSONPath expression to extract data from response
    #[serde(default)]
    pub json_path: String,
}

/// Named secret available to webhook templates
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSecret {
    /// Template variable name
    pub name: String,
    /// Secret key to read
    pub secret_ref: SecretKeySelector,
}

/// AWS provider configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AwsProvider {
    /// "SecretsManager" or "ParameterStore"
    pub service: String,
    /// AWS region
    pub region: String,
    /// Role to assume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Authentication
    #[serde(default)]
    pub auth: AwsAuth,
}

/// AWS authentication
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AwsAuth {
    /// Static access keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<AwsAuthSecretRef>,
    /// Web identity via a service account token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<AwsJwtAuth>,
}

/// AWS static access keys
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AwsAuthSecretRef {
    /// Secret key holding the access key id
    pub access_key_id_secret_ref: SecretKeySelector,
    /// Secret key holding the secret access key
    pub secret_access_key_secret_ref: SecretKeySelector,
    /// Secret key holding a session token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token_secret_ref: Option<SecretKeySelector>,
}

/// AWS web identity auth
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AwsJwtAuth {
    /// Service account whose projected token is exchanged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_ref: Option<ServiceAccountSelector>,
}

// =============================================================================
// Scanning
// =============================================================================

as_node_record!(SecretStore {
    api_version,
    kind,
    metadata,
    spec
});
as_node_record!(ClusterSecretStore {
    api_version,
    kind,
    metadata,
    spec
});
as_node_record!(StoreMetadata {
    name,
    namespace,
    labels
});
as_node_record!(StoreSpec {
    controller,
    provider,
    retry_settings,
    refresh_interval
});
as_node_record!(RetrySettings {
    max_retries,
    retry_interval
});
as_node_record!(ProviderSpec {
    fake,
    kubernetes,
    vault,
    webhook,
    aws
});
as_node_record!(FakeProvider { data });
as_node_record!(FakeProviderData {
    key,
    value,
    version
});
as_node_record!(KubernetesProvider {
    server,
    auth,
    remote_namespace
});
as_node_record!(KubernetesServer {
    url,
    ca_bundle,
    ca_provider
});
as_node_record!(KubernetesAuth {
    token,
    service_account,
    cert
});
as_node_record!(TokenAuth { bearer_token });
as_node_record!(CertAuth {
    client_cert,
    client_key
});
as_node_record!(VaultProvider {
    server,
    path,
    version,
    namespace,
    ca_bundle,
    ca_provider,
    auth
});
as_node_record!(VaultAuth {
    token_secret_ref,
    kubernetes,
    app_role
});
as_node_record!(VaultKubernetesAuth {
    mount_path,
    role,
    service_account_ref,
    secret_ref
});
as_node_record!(VaultAppRole {
    path,
    role_id,
    role_ref,
    secret_ref
});
as_node_record!(WebhookProvider {
    url,
    method,
    headers,
    result,
    secrets,
    ca_bundle,
    ca_provider
});
as_node_record!(WebhookResult { json_path });
as_node_record!(WebhookSecret { name, secret_ref });
as_node_record!(AwsProvider {
    service,
    region,
    role,
    auth
});
as_node_record!(AwsAuth { secret_ref, jwt });
as_node_record!(AwsAuthSecretRef {
    access_key_id_secret_ref,
    secret_access_key_secret_ref,
    session_token_secret_ref
});
as_node_record!(AwsJwtAuth {
    service_account_ref
});

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_spec() -> StoreSpec {
        StoreSpec {
            provider: ProviderSpec {
                fake: Some(FakeProvider::default()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_dispatches_on_kind() {
        let namespaced = GenericStore::Namespaced(SecretStore::new("s", "team-a", fake_spec()));
        let decoded = GenericStore::from_slice(&namespaced.to_vec().unwrap()).unwrap();
        assert_eq!(decoded, namespaced);
        assert!(!decoded.is_cluster_scoped());

        let cluster = GenericStore::Cluster(ClusterSecretStore::new("c", fake_spec()));
        let decoded = GenericStore::from_slice(&cluster.to_vec().unwrap()).unwrap();
        assert!(decoded.is_cluster_scoped());
        assert_eq!(decoded.kind(), CLUSTER_SECRET_STORE_KIND);
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        let err = GenericStore::from_slice(
            br#"{"kind":"ExternalSecret","metadata":{"name":"x"},"spec":{"provider":{}}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unsupported store kind"));
    }

    #[test]
    fn test_decode_rejects_missing_kind_and_garbage() {
        assert!(GenericStore::from_slice(br#"{"metadata":{"name":"x"}}"#)
            .unwrap_err()
            .to_string()
            .contains("missing kind"));
        assert!(GenericStore::from_slice(b"not json").is_err());
    }

    #[test]
    fn test_decode_kubernetes_provider_defaults() {
        let store = GenericStore::from_slice(
            br#"{
                "apiVersion": "external-secrets.io/v1",
                "kind": "SecretStore",
                "metadata": {"name": "remote", "namespace": "team-a"},
                "spec": {"provider": {"kubernetes": {
                    "auth": {"token": {"bearerToken": {"name": "tok", "key": "token"}}}
                }}}
            }"#,
        )
        .unwrap();
        let k8s = store.provider().kubernetes.as_ref().unwrap();
        assert_eq!(k8s.remote_namespace, "default");
        assert_eq!(k8s.server.url, "https://kubernetes.default");
        assert_eq!(store.provider().kind().unwrap(), "kubernetes");
    }

    #[test]
    fn test_provider_kind_requires_exactly_one_block() {
        assert!(ProviderSpec::default()
            .kind()
            .unwrap_err()
            .to_string()
            .contains("no provider configured"));

        let both = ProviderSpec {
            fake: Some(FakeProvider::default()),
            vault: Some(VaultProvider::default()),
            ..Default::default()
        };
        let err = both.kind().unwrap_err().to_string();
        assert!(err.contains("fake, vault"), "{err}");
    }
}
