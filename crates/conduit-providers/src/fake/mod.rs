//! Static provider serving the data embedded in its store
//!
//! Used to exercise the protocol end to end without a backend. Pushes and
//! deletes only change the copy of the data held for one request.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use conduit_common::store::FakeProviderData;
use conduit_common::{
    FindRef, GenericStore, ObjectReader, Provider, ProviderError, PushRemoteRef, RemoteRef,
    SecretsClient, ValidationResult,
};

/// Provider kind
pub const KIND: &str = "fake";

/// Factory for [`FakeClient`]s
#[derive(Clone, Copy, Debug, Default)]
pub struct FakeSecretsProvider;

#[async_trait]
impl Provider for FakeSecretsProvider {
    fn kind(&self) -> &'static str {
        KIND
    }

    async fn new_client(
        &self,
        store: &GenericStore,
        _objects: Arc<dyn ObjectReader>,
        _namespace: &str,
    ) -> Result<Box<dyn SecretsClient>, ProviderError> {
        let spec = store
            .provider()
            .fake
            .as_ref()
            .ok_or_else(|| ProviderError::invalid_config("missing spec.provider.fake"))?;
        Ok(Box::new(FakeClient::new(&spec.data)))
    }
}

/// Entries keyed by `(key, version)`
type Entries = BTreeMap<(String, String), String>;

/// Client over one request's copy of the fake data
#[derive(Debug, Default)]
pub struct FakeClient {
    entries: RwLock<Entries>,
}

impl FakeClient {
    /// Build a client from store entries; a later duplicate wins
    pub fn new(data: &[FakeProviderData]) -> Self {
        let entries = data
            .iter()
            .map(|d| ((d.key.clone(), d.version.clone()), d.value.clone()))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Entries) -> T) -> Result<T, ProviderError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| ProviderError::backend("fake data lock poisoned"))?;
        Ok(f(&entries))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Entries) -> T) -> Result<T, ProviderError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ProviderError::backend("fake data lock poisoned"))?;
        Ok(f(&mut entries))
    }

    fn value(&self, remote: &RemoteRef) -> Result<String, ProviderError> {
        self.read(|entries| {
            entries
                .get(&(remote.key.clone(), remote.version.clone()))
                .cloned()
        })?
        .ok_or_else(|| ProviderError::not_found(&remote.key))
    }
}

fn parse_object(
    key: &str,
    value: &str,
) -> Result<serde_json::Map<String, serde_json::Value>, ProviderError> {
    serde_json::from_str(value).map_err(|e| {
        ProviderError::invalid_config(format!("value of {key:?} is not a JSON object: {e}"))
    })
}

/// Strings are returned as-is, anything else as its JSON encoding
fn json_bytes(value: &serde_json::Value) -> Vec<u8> {
    match value {
        serde_json::Value::String(s) => s.as_bytes().to_vec(),
        other => other.to_string().into_bytes(),
    }
}

fn decode(remote: &RemoteRef, value: Vec<u8>) -> Result<Vec<u8>, ProviderError> {
    remote
        .decoding_strategy
        .decode(value)
        .map_err(|e| ProviderError::invalid_config(e.to_string()))
}

#[async_trait]
impl SecretsClient for FakeClient {
    async fn get_secret(&self, remote: &RemoteRef) -> Result<Vec<u8>, ProviderError> {
        let value = self.value(remote)?;
        if remote.property.is_empty() {
            return decode(remote, value.into_bytes());
        }
        let object = parse_object(&remote.key, &value)?;
        let property = object
            .get(&remote.property)
            .ok_or_else(|| ProviderError::not_found(format!("{}/{}", remote.key, remote.property)))?;
        decode(remote, json_bytes(property))
    }

    async fn get_secret_map(
        &self,
        remote: &RemoteRef,
    ) -> Result<BTreeMap<String, Vec<u8>>, ProviderError> {
        let value = self.value(remote)?;
        parse_object(&remote.key, &value)?
            .iter()
            .map(|(k, v)| {
                Ok((
                    remote.conversion_strategy.convert_key(k),
                    decode(remote, json_bytes(v))?,
                ))
            })
            .collect()
    }

    async fn get_all_secrets(
        &self,
        find: &FindRef,
    ) -> Result<BTreeMap<String, Vec<u8>>, ProviderError> {
        if !find.tags.is_empty() {
            return Err(ProviderError::NotSupported {
                provider: KIND,
                operation: "find by tags",
            });
        }
        let name = find
            .name
            .as_ref()
            .ok_or_else(|| ProviderError::invalid_config("find.name is required"))?;
        let pattern = Regex::new(&name.regexp)
            .map_err(|e| ProviderError::invalid_config(format!("invalid name regexp: {e}")))?;

        let matched: Vec<(String, String)> = self.read(|entries| {
            entries
                .iter()
                .filter(|((key, version), _)| version.is_empty() && pattern.is_match(key))
                .filter(|((key, _), _)| {
                    find.path
                        .as_deref()
                        .map_or(true, |prefix| key.starts_with(prefix))
                })
                .map(|((key, _), value)| (key.clone(), value.clone()))
                .collect()
        })?;

        debug!(pattern = %name.regexp, matched = matched.len(), "fake find");
        matched
            .into_iter()
            .map(|(key, value)| {
                let value = find
                    .decoding_strategy
                    .decode(value.into_bytes())
                    .map_err(|e| ProviderError::invalid_config(e.to_string()))?;
                Ok((find.conversion_strategy.convert_key(&key), value))
            })
            .collect()
    }

    async fn push_secret(&self, value: &[u8], remote: &PushRemoteRef) -> Result<(), ProviderError> {
        let value = String::from_utf8(value.to_vec())
            .map_err(|_| ProviderError::invalid_config("fake values must be UTF-8"))?;
        let slot = (remote.remote_key.clone(), String::new());

        let existing = self.read(|entries| entries.get(&slot).cloned())?;
        let stored = if remote.property.is_empty() {
            value
        } else {
            let mut object = match existing {
                Some(current) => parse_object(&remote.remote_key, &current)?,
                None => serde_json::Map::new(),
            };
            object.insert(remote.property.clone(), serde_json::Value::String(value));
            serde_json::Value::Object(object).to_string()
        };
        self.write(|entries| {
            entries.insert(slot, stored);
        })
    }

    async fn delete_secret(&self, remote: &PushRemoteRef) -> Result<(), ProviderError> {
        let slot = (remote.remote_key.clone(), String::new());
        if remote.property.is_empty() {
            return self.write(|entries| {
                entries.remove(&slot);
            });
        }

        let Some(current) = self.read(|entries| entries.get(&slot).cloned())? else {
            return Ok(());
        };
        let mut object = parse_object(&remote.remote_key, &current)?;
        object.remove(&remote.property);
        self.write(|entries| {
            if object.is_empty() {
                entries.remove(&slot);
            } else {
                entries.insert(slot, serde_json::Value::Object(object).to_string());
            }
        })
    }

    async fn validate(&self) -> Result<ValidationResult, ProviderError> {
        Ok(ValidationResult::Ready)
    }
}
