//! Helpers providers use to read referenced objects
//!
//! Both the caller-side object resolver and the providers reading the
//! closed-world store go through [`reference_namespace`], so the namespace an
//! object is fetched from is the namespace it is looked up in.

use crate::objects::{ObjectKind, ObjectReader, StoreError};
use crate::refs::{CaProvider, CaProviderType, SecretKeySelector, ServiceAccountSelector};
use crate::store::GenericStore;

/// Namespace a reference resolves in
///
/// A `SecretStore` may only read from the namespace of the resource using
/// it, so an explicit reference namespace is ignored. A `ClusterSecretStore`
/// honors the reference namespace and falls back to the caller's.
pub fn reference_namespace<'a>(
    store: &GenericStore,
    reference_namespace: Option<&'a str>,
    caller_namespace: &'a str,
) -> &'a str {
    if !store.is_cluster_scoped() {
        return caller_namespace;
    }
    match reference_namespace {
        Some(ns) if !ns.is_empty() => ns,
        _ => caller_namespace,
    }
}

/// Read the bytes a credential reference points at
pub fn secret_key_ref(
    reader: &dyn ObjectReader,
    store: &GenericStore,
    namespace: &str,
    selector: &SecretKeySelector,
) -> Result<Vec<u8>, StoreError> {
    let ns = reference_namespace(store, selector.namespace.as_deref(), namespace);
    let secret = reader.secret(ns, &selector.name)?;
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(&selector.key))
        .map(|bytes| bytes.0.clone())
        .or_else(|| {
            secret
                .string_data
                .as_ref()
                .and_then(|data| data.get(&selector.key))
                .map(|s| s.as_bytes().to_vec())
        })
        .ok_or_else(|| {
            StoreError::key_not_found(ObjectKind::Secret, ns, &selector.name, &selector.key)
        })
}

/// Read a PEM bundle from the Secret or ConfigMap a trust-bundle reference names
pub fn ca_bundle(
    reader: &dyn ObjectReader,
    store: &GenericStore,
    namespace: &str,
    provider: &CaProvider,
) -> Result<Vec<u8>, StoreError> {
    let ns = reference_namespace(store, provider.namespace.as_deref(), namespace);
    match provider.type_ {
        CaProviderType::Secret => {
            let secret = reader.secret(ns, &provider.name)?;
            secret
                .data
                .and_then(|mut data| data.remove(&provider.key))
                .map(|bytes| bytes.0)
                .ok_or_else(|| {
                    StoreError::key_not_found(ObjectKind::Secret, ns, &provider.name, &provider.key)
                })
        }
        CaProviderType::ConfigMap => {
            let cm = reader.config_map(ns, &provider.name)?;
            cm.data
                .as_ref()
                .and_then(|data| data.get(&provider.key))
                .map(|s| s.as_bytes().to_vec())
                .or_else(|| {
                    cm.binary_data
                        .as_ref()
                        .and_then(|data| data.get(&provider.key))
                        .map(|bytes| bytes.0.clone())
                })
                .ok_or_else(|| {
                    StoreError::key_not_found(
                        ObjectKind::ConfigMap,
                        ns,
                        &provider.name,
                        &provider.key,
                    )
                })
        }
    }
}

/// Bearer token minted for an identity reference
pub fn service_account_token(
    reader: &dyn ObjectReader,
    store: &GenericStore,
    namespace: &str,
    selector: &ServiceAccountSelector,
) -> Result<String, StoreError> {
    let ns = reference_namespace(store, selector.namespace.as_deref(), namespace);
    let request = reader.service_account_token(ns, &selector.name)?;
    request
        .status
        .map(|status| status.token)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            StoreError::key_not_found(ObjectKind::ServiceAccountToken, ns, &selector.name, "token")
        })
}
