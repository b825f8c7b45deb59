//! Conversions between domain types and the gRPC messages

use conduit_proto as proto;

use crate::error::Error;
use crate::objects::{ClosedWorldStore, ResolvedObjectSet};
use crate::remote::{FindName, FindRef, PushRemoteRef, RemoteRef, ValidationResult};
use crate::store::GenericStore;

/// Build the per-call transport payload
pub fn encode_context(
    store: &GenericStore,
    objects: &ResolvedObjectSet,
    namespace: &str,
) -> Result<proto::StoreContext, Error> {
    Ok(proto::StoreContext {
        store: store.to_vec()?,
        objects: objects.to_vec()?,
        namespace: namespace.to_string(),
    })
}

/// Request context reconstructed inside the provider process
#[derive(Debug)]
pub struct DecodedContext {
    /// Decoded store document
    pub store: GenericStore,
    /// Objects shipped with the request
    pub objects: ClosedWorldStore,
    /// Namespace of the calling resource
    pub namespace: String,
}

/// Decode a transport payload
///
/// A missing context, a store document that is neither a `SecretStore` nor
/// a `ClusterSecretStore`, and a malformed object list are all decode errors.
pub fn decode_context(context: Option<proto::StoreContext>) -> Result<DecodedContext, Error> {
    let context = context.ok_or_else(|| Error::decode("request", "missing store context"))?;
    let store = GenericStore::from_slice(&context.store)?;
    let objects = ClosedWorldStore::from_slice(&context.objects)?;
    Ok(DecodedContext {
        store,
        objects,
        namespace: context.namespace,
    })
}

impl From<&RemoteRef> for proto::RemoteRef {
    fn from(r: &RemoteRef) -> Self {
        Self {
            key: r.key.clone(),
            property: r.property.clone(),
            version: r.version.clone(),
            metadata_policy: r.metadata_policy.as_str().to_string(),
            conversion_strategy: r.conversion_strategy.as_str().to_string(),
            decoding_strategy: r.decoding_strategy.as_str().to_string(),
        }
    }
}

impl TryFrom<proto::RemoteRef> for RemoteRef {
    type Error = Error;

    fn try_from(r: proto::RemoteRef) -> Result<Self, Self::Error> {
        Ok(Self {
            metadata_policy: r.metadata_policy.parse()?,
            conversion_strategy: r.conversion_strategy.parse()?,
            decoding_strategy: r.decoding_strategy.parse()?,
            key: r.key,
            property: r.property,
            version: r.version,
        })
    }
}

impl From<&FindRef> for proto::FindRef {
    fn from(f: &FindRef) -> Self {
        Self {
            tags: f.tags.clone(),
            path: f.path.clone(),
            name: f.name.as_ref().map(|n| proto::FindName {
                regexp: n.regexp.clone(),
            }),
            conversion_strategy: f.conversion_strategy.as_str().to_string(),
            decoding_strategy: f.decoding_strategy.as_str().to_string(),
        }
    }
}

impl TryFrom<proto::FindRef> for FindRef {
    type Error = Error;

    fn try_from(f: proto::FindRef) -> Result<Self, Self::Error> {
        Ok(Self {
            conversion_strategy: f.conversion_strategy.parse()?,
            decoding_strategy: f.decoding_strategy.parse()?,
            tags: f.tags,
            path: f.path,
            name: f.name.map(|n| FindName { regexp: n.regexp }),
        })
    }
}

impl From<&PushRemoteRef> for proto::PushRemoteRef {
    fn from(r: &PushRemoteRef) -> Self {
        Self {
            remote_key: r.remote_key.clone(),
            property: r.property.clone(),
        }
    }
}

impl From<proto::PushRemoteRef> for PushRemoteRef {
    fn from(r: proto::PushRemoteRef) -> Self {
        Self {
            remote_key: r.remote_key,
            property: r.property,
        }
    }
}

impl From<ValidationResult> for proto::ValidationResult {
    fn from(r: ValidationResult) -> Self {
        match r {
            ValidationResult::Ready => proto::ValidationResult::Ready,
            ValidationResult::Error => proto::ValidationResult::Error,
            ValidationResult::Unknown => proto::ValidationResult::Unknown,
        }
    }
}

impl From<proto::ValidationResult> for ValidationResult {
    fn from(r: proto::ValidationResult) -> Self {
        match r {
            proto::ValidationResult::Ready => ValidationResult::Ready,
            proto::ValidationResult::Error => ValidationResult::Error,
            proto::ValidationResult::Unknown => ValidationResult::Unknown,
        }
    }
}

/// Decode a required message field
pub fn required<T>(field: Option<T>, name: &str) -> Result<T, Error> {
    field.ok_or_else(|| Error::decode("request", format!("missing {name}")))
}
