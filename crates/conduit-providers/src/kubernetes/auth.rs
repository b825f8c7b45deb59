//! Kubeconfig for the remote cluster, built from shipped objects only

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde_json::json;

use conduit_common::resolvers::{ca_bundle, secret_key_ref, service_account_token};
use conduit_common::store::KubernetesProvider;
use conduit_common::{GenericStore, ObjectReader, ProviderError};

const CLUSTER_NAME: &str = "remote";

/// Build a kubeconfig for the remote cluster
///
/// Exactly one auth method must be set. Every credential is read through
/// `objects`, so anything the caller did not ship is a not-found error.
pub fn kubeconfig(
    spec: &KubernetesProvider,
    objects: &dyn ObjectReader,
    store: &GenericStore,
    namespace: &str,
) -> Result<Kubeconfig, ProviderError> {
    let mut cluster = json!({ "server": spec.server.url });
    let ca = match (&spec.server.ca_bundle, &spec.server.ca_provider) {
        (Some(bundle), _) if !bundle.is_empty() => Some(bundle.clone()),
        (_, Some(provider)) => Some(STANDARD.encode(ca_bundle(objects, store, namespace, provider)?)),
        _ => None,
    };
    if let Some(ca) = ca {
        cluster["certificate-authority-data"] = json!(ca);
    }

    let auth = &spec.auth;
    let user = match (&auth.token, &auth.service_account, &auth.cert) {
        (Some(token), None, None) => {
            let bearer = secret_key_ref(objects, store, namespace, &token.bearer_token)?;
            let bearer = String::from_utf8(bearer)
                .map_err(|_| ProviderError::invalid_config("bearer token is not UTF-8"))?;
            json!({ "token": bearer.trim() })
        }
        (None, Some(sa), None) => {
            json!({ "token": service_account_token(objects, store, namespace, sa)? })
        }
        (None, None, Some(cert)) => {
            let client_cert = secret_key_ref(objects, store, namespace, &cert.client_cert)?;
            let client_key = secret_key_ref(objects, store, namespace, &cert.client_key)?;
            json!({
                "client-certificate-data": STANDARD.encode(client_cert),
                "client-key-data": STANDARD.encode(client_key),
            })
        }
        (None, None, None) => {
            return Err(ProviderError::invalid_config(
                "spec.provider.kubernetes.auth: no auth method configured",
            ))
        }
        _ => {
            return Err(ProviderError::invalid_config(
                "spec.provider.kubernetes.auth: exactly one auth method must be configured",
            ))
        }
    };

    let document = json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{ "name": CLUSTER_NAME, "cluster": cluster }],
        "users": [{ "name": CLUSTER_NAME, "user": user }],
        "contexts": [{
            "name": CLUSTER_NAME,
            "context": {
                "cluster": CLUSTER_NAME,
                "user": CLUSTER_NAME,
                "namespace": spec.remote_namespace,
            },
        }],
        "current-context": CLUSTER_NAME,
    });
    serde_json::from_value(document)
        .map_err(|e| ProviderError::invalid_config(format!("failed to build kubeconfig: {e}")))
}

/// Create a kube client for the remote cluster
pub async fn client(kubeconfig: Kubeconfig) -> Result<Client, ProviderError> {
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| ProviderError::invalid_config(format!("failed to load kubeconfig: {e}")))?;
    Client::try_from(config)
        .map_err(|e| ProviderError::backend(format!("failed to create client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_common::objects::MockObjectReader;
    use conduit_common::refs::{CaProvider, CaProviderType, SecretKeySelector};
    use conduit_common::store::{CertAuth, ClusterSecretStore, KubernetesAuth, StoreSpec, TokenAuth};
    use conduit_common::{ObjectKind, StoreError};
    use k8s_openapi::api::core::v1::{ConfigMap, Secret};
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    fn store() -> GenericStore {
        GenericStore::Cluster(ClusterSecretStore::new("remote", StoreSpec::default()))
    }

    fn secret(pairs: &[(&str, &str)]) -> Secret {
        Secret {
            data: Some(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    fn token_spec() -> KubernetesProvider {
        KubernetesProvider {
            auth: KubernetesAuth {
                token: Some(TokenAuth {
                    bearer_token: SecretKeySelector::new("remote-token", "token")
                        .in_namespace("infra"),
                }),
                ..Default::default()
            },
            remote_namespace: "apps".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_token_auth_kubeconfig() {
        let mut objects = MockObjectReader::new();
        objects
            .expect_secret()
            .withf(|ns, name| ns == "infra" && name == "remote-token")
            .returning(|_, _| Ok(secret(&[("token", "abc123\n")])));

        let config = kubeconfig(&token_spec(), &objects, &store(), "team-a").unwrap();
        assert_eq!(config.current_context.as_deref(), Some("remote"));
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["clusters"][0]["cluster"]["server"], "https://kubernetes.default");
        assert_eq!(value["contexts"][0]["context"]["namespace"], "apps");
        assert_eq!(config.auth_infos.len(), 1);
    }

    #[test]
    fn test_cert_auth_and_ca_provider() {
        let mut spec = token_spec();
        spec.auth = KubernetesAuth {
            cert: Some(CertAuth {
                client_cert: SecretKeySelector::new("client", "tls.crt"),
                client_key: SecretKeySelector::new("client", "tls.key"),
            }),
            ..Default::default()
        };
        spec.server.ca_provider = Some(CaProvider {
            type_: CaProviderType::ConfigMap,
            name: "remote-ca".to_string(),
            namespace: None,
            key: "ca.crt".to_string(),
        });

        let mut objects = MockObjectReader::new();
        objects
            .expect_secret()
            .returning(|_, _| Ok(secret(&[("tls.crt", "CERT"), ("tls.key", "KEY")])));
        objects.expect_config_map().returning(|_, _| {
            Ok(ConfigMap {
                data: Some(BTreeMap::from([("ca.crt".to_string(), "CA".to_string())])),
                ..Default::default()
            })
        });

        let config = kubeconfig(&spec, &objects, &store(), "team-a").unwrap();
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(
            value["clusters"][0]["cluster"]["certificate-authority-data"],
            STANDARD.encode("CA")
        );
    }

    #[test]
    fn test_unshipped_credential_is_not_found() {
        let mut objects = MockObjectReader::new();
        objects
            .expect_secret()
            .returning(|ns, name| Err(StoreError::not_found(ObjectKind::Secret, ns, name)));

        let err = kubeconfig(&token_spec(), &objects, &store(), "team-a").unwrap_err();
        assert_eq!(err.to_string(), "Secret infra/remote-token not found");
    }

    #[test]
    fn test_auth_method_is_required() {
        let mut spec = token_spec();
        spec.auth = KubernetesAuth::default();
        let err = kubeconfig(&spec, &MockObjectReader::new(), &store(), "team-a").unwrap_err();
        assert!(err.to_string().contains("no auth method"));
    }
}
