//! Reference shapes embedded in store documents
//!
//! These three types are the only things the reference aggregator looks for.
//! Provider configuration blocks embed them wherever they need a credential,
//! an identity, or a trust bundle from the cluster.

use serde::{Deserialize, Serialize};

/// Reference to a key within a Kubernetes Secret
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretKeySelector {
    /// Secret name
    pub name: String,
    /// Secret namespace (honored for cluster-scoped stores only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Key within the secret data
    #[serde(default)]
    pub key: String,
}

impl SecretKeySelector {
    /// Create a selector for `name/key` without an explicit namespace
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            key: key.into(),
        }
    }

    /// Set the namespace
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// Reference to a Kubernetes ServiceAccount whose token a provider needs
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceAccountSelector {
    /// ServiceAccount name
    pub name: String,
    /// ServiceAccount namespace (honored for cluster-scoped stores only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Audiences the minted token is valid for
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audiences: Vec<String>,
}

impl ServiceAccountSelector {
    /// Create a selector for a service account without an explicit namespace
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Kind of object a CA bundle is read from
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum CaProviderType {
    /// Bundle stored in a Secret
    #[default]
    Secret,
    /// Bundle stored in a ConfigMap
    ConfigMap,
}

/// Reference to a CA bundle stored in a Secret or ConfigMap
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaProvider {
    /// Object kind holding the bundle
    #[serde(rename = "type")]
    pub type_: CaProviderType,
    /// Object name
    pub name: String,
    /// Object namespace (honored for cluster-scoped stores only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Key holding the PEM bundle
    #[serde(default)]
    pub key: String,
}
