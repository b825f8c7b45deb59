//! Fetch the objects a store references from the live cluster
//!
//! Runs in the caller process, which has cluster access. The result is the
//! only view of the cluster the provider process gets, so a reference that
//! cannot be fetched is left out and the provider reports it as not found.

use std::collections::BTreeSet;

use async_trait::async_trait;
use k8s_openapi::api::authentication::v1::{TokenRequest, TokenRequestSpec};
use k8s_openapi::api::core::v1::{ConfigMap, Secret, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::PostParams;
use kube::{Api, Client};
use tracing::{debug, warn};

use conduit_common::refs::CaProviderType;
use conduit_common::resolvers::reference_namespace;
use conduit_common::{
    Error, GenericStore, ObjectKind, ReferenceSet, ResolvedObject, ResolvedObjectSet,
};
use conduit_common::objects::ObjectKey;

/// Read access to the live cluster
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterReader: Send + Sync {
    /// Get a Secret, `None` if it does not exist
    async fn secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error>;

    /// Get a ConfigMap, `None` if it does not exist
    async fn config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>, Error>;

    /// Mint a token for a ServiceAccount, `None` if it does not exist
    async fn token(
        &self,
        namespace: &str,
        name: &str,
        audiences: Vec<String>,
    ) -> Result<Option<TokenRequest>, Error>;
}

/// [`ClusterReader`] backed by a kube client
#[derive(Clone)]
pub struct KubeClusterReader {
    client: Client,
}

impl KubeClusterReader {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

#[async_trait]
impl ClusterReader for KubeClusterReader {
    async fn secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>, Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn token(
        &self,
        namespace: &str,
        name: &str,
        audiences: Vec<String>,
    ) -> Result<Option<TokenRequest>, Error> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        let request = TokenRequest {
            metadata: Default::default(),
            spec: TokenRequestSpec {
                audiences,
                expiration_seconds: None,
                bound_object_ref: None,
            },
            status: None,
        };
        match api
            .create_token_request(name, &PostParams::default(), &request)
            .await
        {
            Ok(token) => Ok(Some(token)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn trimmed_meta(namespace: &str, name: &str, meta: ObjectMeta) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: meta.labels,
        annotations: meta.annotations,
        ..Default::default()
    }
}

/// Resolve every reference of a store into shipped objects
///
/// Objects are fetched once each even when referenced several times.
/// Namespaces follow [`reference_namespace`], the same rule providers use
/// to look them up.
pub async fn resolve_objects(
    cluster: &dyn ClusterReader,
    store: &GenericStore,
    refs: &ReferenceSet,
    namespace: &str,
) -> Result<ResolvedObjectSet, Error> {
    let mut seen = BTreeSet::new();
    let mut objects = ResolvedObjectSet::new();

    let secrets = refs
        .credentials
        .iter()
        .map(|r| (r.namespace.as_deref(), r.name.as_str()))
        .map(|(ns, name)| (ObjectKind::Secret, ns, name));
    let bundles = refs.trust_bundles.iter().map(|r| {
        let kind = match r.type_ {
            CaProviderType::Secret => ObjectKind::Secret,
            CaProviderType::ConfigMap => ObjectKind::ConfigMap,
        };
        (kind, r.namespace.as_deref(), r.name.as_str())
    });

    for (kind, ref_ns, name) in secrets.chain(bundles) {
        let ns = reference_namespace(store, ref_ns, namespace);
        if !seen.insert(ObjectKey::new(kind, ns, name)) {
            continue;
        }
        let object = match kind {
            ObjectKind::Secret => cluster.secret(ns, name).await?.map(|mut s| {
                s.metadata = trimmed_meta(ns, name, s.metadata);
                ResolvedObject::Secret(s)
            }),
            ObjectKind::ConfigMap => cluster.config_map(ns, name).await?.map(|mut cm| {
                cm.metadata = trimmed_meta(ns, name, cm.metadata);
                ResolvedObject::ConfigMap(cm)
            }),
            ObjectKind::ServiceAccountToken => None,
        };
        match object {
            Some(object) => objects.push(object),
            None => warn!(kind = %kind, namespace = %ns, name = %name, "referenced object not found"),
        }
    }

    for identity in &refs.identities {
        let ns = reference_namespace(store, identity.namespace.as_deref(), namespace);
        let key = ObjectKey::new(ObjectKind::ServiceAccountToken, ns, &identity.name);
        if !seen.insert(key) {
            continue;
        }
        match cluster
            .token(ns, &identity.name, identity.audiences.clone())
            .await?
        {
            Some(mut token) => {
                token.metadata = trimmed_meta(ns, &identity.name, ObjectMeta::default());
                objects.push(ResolvedObject::ServiceAccountToken(token));
            }
            None => warn!(
                namespace = %ns,
                service_account = %identity.name,
                "referenced service account not found"
            ),
        }
    }

    debug!(
        store = %store.name(),
        references = refs.len(),
        objects = objects.len(),
        "resolved store references"
    );
    Ok(objects)
}
