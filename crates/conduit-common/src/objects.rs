//! Resolved objects and the closed-world store
//!
//! The caller ships the exact Kubernetes objects a store references. Inside
//! the provider process those objects are the whole world: the
//! [`ClosedWorldStore`] answers lookups from the shipped set only, and a miss
//! is a plain "not found". There is no fallback to a live cluster.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::authentication::v1::TokenRequest;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::error::Error;

/// Kind of a shipped object
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    /// `v1/Secret`
    Secret,
    /// `v1/ConfigMap`
    ConfigMap,
    /// Token minted for a ServiceAccount (`authentication.k8s.io/v1/TokenRequest`)
    ServiceAccountToken,
}

impl ObjectKind {
    /// Kubernetes kind string of the wire object
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Secret => "Secret",
            ObjectKind::ConfigMap => "ConfigMap",
            ObjectKind::ServiceAccountToken => "TokenRequest",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lookup key of the closed-world store
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    /// Object kind
    pub kind: ObjectKind,
    /// Object namespace
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    /// Create a key
    pub fn new(kind: ObjectKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// Errors returned by [`ObjectReader`] lookups
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The object was not shipped with the request
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Object kind
        kind: ObjectKind,
        /// Object namespace
        namespace: String,
        /// Object name
        name: String,
    },

    /// The object exists but lacks the requested key
    #[error("key {key:?} not found in {kind} {namespace}/{name}")]
    KeyNotFound {
        /// Object kind
        kind: ObjectKind,
        /// Object namespace
        namespace: String,
        /// Object name
        name: String,
        /// Missing key
        key: String,
    },
}

impl StoreError {
    /// Create a not-found error
    pub fn not_found(kind: ObjectKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a missing-key error
    pub fn key_not_found(
        kind: ObjectKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self::KeyNotFound {
            kind,
            namespace: namespace.into(),
            name: name.into(),
            key: key.into(),
        }
    }
}

// =============================================================================
// Resolved objects
// =============================================================================

/// One object shipped alongside a store
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedObject {
    /// Secret body
    Secret(Secret),
    /// ConfigMap body
    ConfigMap(ConfigMap),
    /// Token minted for a ServiceAccount; metadata names the ServiceAccount
    ServiceAccountToken(TokenRequest),
}

impl ResolvedObject {
    /// Kind of this object
    pub fn kind(&self) -> ObjectKind {
        match self {
            ResolvedObject::Secret(_) => ObjectKind::Secret,
            ResolvedObject::ConfigMap(_) => ObjectKind::ConfigMap,
            ResolvedObject::ServiceAccountToken(_) => ObjectKind::ServiceAccountToken,
        }
    }

    fn metadata(&self) -> &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
        match self {
            ResolvedObject::Secret(o) => &o.metadata,
            ResolvedObject::ConfigMap(o) => &o.metadata,
            ResolvedObject::ServiceAccountToken(o) => &o.metadata,
        }
    }

    /// Store key of this object; name and namespace must both be set
    pub fn key(&self) -> Result<ObjectKey, Error> {
        let meta = self.metadata();
        let name = meta
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::decode("objects", format!("{} without a name", self.kind())))?;
        let namespace = meta
            .namespace
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                Error::decode("objects", format!("{} {name} without a namespace", self.kind()))
            })?;
        Ok(ObjectKey::new(self.kind(), namespace, name))
    }
}

impl Serialize for ResolvedObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ResolvedObject::Secret(o) => o.serialize(serializer),
            ResolvedObject::ConfigMap(o) => o.serialize(serializer),
            ResolvedObject::ServiceAccountToken(o) => o.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ResolvedObject {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let kind = value
            .get("kind")
            .and_then(|k| k.as_str())
            .ok_or_else(|| D::Error::custom("object without kind"))?
            .to_string();

        match kind.as_str() {
            "Secret" => serde_json::from_value(value).map(ResolvedObject::Secret),
            "ConfigMap" => serde_json::from_value(value).map(ResolvedObject::ConfigMap),
            "TokenRequest" => {
                serde_json::from_value(value).map(ResolvedObject::ServiceAccountToken)
            }
            other => return Err(D::Error::custom(format!("unsupported object kind {other:?}"))),
        }
        .map_err(D::Error::custom)
    }
}

/// Objects shipped with one request
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedObjectSet(pub Vec<ResolvedObject>);

impl ResolvedObjectSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object
    pub fn push(&mut self, object: ResolvedObject) {
        self.0.push(object);
    }

    /// Number of objects
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no objects were resolved
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate the objects
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedObject> {
        self.0.iter()
    }

    /// Encode as a JSON array
    pub fn to_vec(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(|e| Error::encode("objects", e))
    }

    /// Decode from a JSON array; an empty payload is an empty set
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_slice(bytes).map_err(|e| Error::decode("objects", e))
    }
}

impl FromIterator<ResolvedObject> for ResolvedObjectSet {
    fn from_iter<I: IntoIterator<Item = ResolvedObject>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// =============================================================================
// Closed-world store
// =============================================================================

/// Read-only view of the cluster available to a provider
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait ObjectReader: Send + Sync {
    /// Get a Secret
    fn secret(&self, namespace: &str, name: &str) -> Result<Secret, StoreError>;

    /// Get a ConfigMap
    fn config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, StoreError>;

    /// Get the token minted for a ServiceAccount
    fn service_account_token(&self, namespace: &str, name: &str)
        -> Result<TokenRequest, StoreError>;
}

/// Object store populated only from a request payload
///
/// Built per request and dropped with it. Duplicate keys keep the last
/// object shipped.
#[derive(Clone, Debug, Default)]
pub struct ClosedWorldStore {
    objects: BTreeMap<ObjectKey, ResolvedObject>,
}

impl ClosedWorldStore {
    /// Build a store from resolved objects
    pub fn from_objects(objects: ResolvedObjectSet) -> Result<Self, Error> {
        let mut store = Self::default();
        for object in objects.0 {
            let key = object.key()?;
            store.objects.insert(key, object);
        }
        Ok(store)
    }

    /// Decode the wire payload straight into a store
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        Self::from_objects(ResolvedObjectSet::from_slice(bytes)?)
    }

    /// Number of objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True when nothing was shipped
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Whether an object with this key was shipped
    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.objects.contains_key(key)
    }

    /// Keys of all shipped objects, in key order
    pub fn keys(&self) -> impl Iterator<Item = &ObjectKey> {
        self.objects.keys()
    }

    fn get(&self, kind: ObjectKind, namespace: &str, name: &str) -> Result<&ResolvedObject, StoreError> {
        self.objects
            .get(&ObjectKey::new(kind, namespace, name))
            .ok_or_else(|| StoreError::not_found(kind, namespace, name))
    }
}

impl ObjectReader for ClosedWorldStore {
    fn secret(&self, namespace: &str, name: &str) -> Result<Secret, StoreError> {
        match self.get(ObjectKind::Secret, namespace, name)? {
            ResolvedObject::Secret(secret) => Ok(secret.clone()),
            _ => Err(StoreError::not_found(ObjectKind::Secret, namespace, name)),
        }
    }

    fn config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, StoreError> {
        match self.get(ObjectKind::ConfigMap, namespace, name)? {
            ResolvedObject::ConfigMap(cm) => Ok(cm.clone()),
            _ => Err(StoreError::not_found(ObjectKind::ConfigMap, namespace, name)),
        }
    }

    fn service_account_token(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<TokenRequest, StoreError> {
        match self.get(ObjectKind::ServiceAccountToken, namespace, name)? {
            ResolvedObject::ServiceAccountToken(token) => Ok(token.clone()),
            _ => Err(StoreError::not_found(
                ObjectKind::ServiceAccountToken,
                namespace,
                name,
            )),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::ByteString;

    pub(crate) fn secret(namespace: &str, name: &str, data: &[(&str, &str)]) -> ResolvedObject {
        ResolvedObject::Secret(Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect(),
            ),
            ..Default::default()
        })
    }

    #[test]
    fn test_shipped_secret_resolves_and_others_miss() {
        let objects: ResolvedObjectSet =
            vec![secret("default", "db-cred", &[("password", "s3cr3t")])]
                .into_iter()
                .collect();
        let store = ClosedWorldStore::from_slice(&objects.to_vec().unwrap()).unwrap();

        let found = store.secret("default", "db-cred").unwrap();
        let bytes = &found.data.unwrap()["password"];
        assert_eq!(bytes.0, b"s3cr3t");

        let err = store.secret("default", "other-secret").unwrap_err();
        assert_eq!(
            err,
            StoreError::not_found(ObjectKind::Secret, "default", "other-secret")
        );
    }

    #[test]
    fn test_lookup_is_keyed_by_kind_and_namespace() {
        let store = ClosedWorldStore::from_objects(
            vec![secret("team-a", "shared", &[("k", "v")])]
                .into_iter()
                .collect(),
        )
        .unwrap();

        assert!(store.secret("team-b", "shared").is_err());
        assert!(store.config_map("team-a", "shared").is_err());
        assert!(store.contains(&ObjectKey::new(ObjectKind::Secret, "team-a", "shared")));
    }

    #[test]
    fn test_identical_payload_rebuilds_identical_store() {
        let objects: ResolvedObjectSet = vec![
            secret("default", "a", &[("k", "1")]),
            secret("default", "b", &[("k", "2")]),
        ]
        .into_iter()
        .collect();
        let payload = objects.to_vec().unwrap();

        let first = ClosedWorldStore::from_slice(&payload).unwrap();
        let second = ClosedWorldStore::from_slice(&payload).unwrap();
        let first_keys: Vec<_> = first.keys().cloned().collect();
        let second_keys: Vec<_> = second.keys().cloned().collect();
        assert_eq!(first_keys, second_keys);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_object_without_namespace_is_rejected() {
        let object = ResolvedObject::ConfigMap(ConfigMap {
            metadata: ObjectMeta {
                name: Some("root-ca".to_string()),
                ..Default::default()
            },
            ..Default::default()
        });
        let err = ClosedWorldStore::from_objects(ResolvedObjectSet(vec![object])).unwrap_err();
        assert!(err.to_string().contains("without a namespace"));
    }

    #[test]
    fn test_unknown_object_kind_is_a_decode_error() {
        let err = ResolvedObjectSet::from_slice(
            br#"[{"apiVersion":"v1","kind":"Pod","metadata":{"name":"p","namespace":"d"}}]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unsupported object kind"));
    }

    #[test]
    fn test_empty_payload_is_empty_store() {
        let store = ClosedWorldStore::from_slice(b"").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_wire_objects_carry_kind() {
        let payload = ResolvedObjectSet(vec![secret("default", "x", &[])])
            .to_vec()
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value[0]["kind"], "Secret");
        assert_eq!(value[0]["apiVersion"], "v1");
    }
}
