//! Operation arguments: what to read from, or write to, the backend

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Implements `as_str`, `Display` and `FromStr` for a strategy enum.
/// An empty string parses to the default variant.
macro_rules! wire_enum {
    ($ty:ident, $what:literal, { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $ty {
            /// Wire string
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $s,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    "" => Ok($ty::default()),
                    $($s => Ok($ty::$variant),)+
                    other => Err(Error::decode($what, format!("unknown value {other:?}"))),
                }
            }
        }
    };
}

/// Whether secret metadata (labels, annotations) is returned instead of data
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataPolicy {
    /// Return the secret value
    #[default]
    None,
    /// Return the metadata
    Fetch,
}

wire_enum!(MetadataPolicy, "metadataPolicy", { None => "None", Fetch => "Fetch" });

/// How remote keys are mapped to Kubernetes-safe keys
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionStrategy {
    /// Keep keys as they are
    #[default]
    Default,
    /// Replace characters outside `[-._a-zA-Z0-9]` with `_UXXXX_`
    Unicode,
}

wire_enum!(ConversionStrategy, "conversionStrategy", {
    Default => "Default",
    Unicode => "Unicode",
});

impl ConversionStrategy {
    /// Convert a remote key
    pub fn convert_key(&self, key: &str) -> String {
        match self {
            ConversionStrategy::Default => key.to_string(),
            ConversionStrategy::Unicode => key
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_') {
                        c.to_string()
                    } else {
                        format!("_U{:04x}_", c as u32)
                    }
                })
                .collect(),
        }
    }
}

/// How fetched values are decoded before being returned
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodingStrategy {
    /// Return values as stored
    #[default]
    None,
    /// Standard base64
    Base64,
    /// URL-safe base64
    #[serde(rename = "Base64URL")]
    Base64Url,
    /// Base64 when the value decodes as either alphabet, else unchanged
    Auto,
}

wire_enum!(DecodingStrategy, "decodingStrategy", {
    None => "None",
    Base64 => "Base64",
    Base64Url => "Base64URL",
    Auto => "Auto",
});

impl DecodingStrategy {
    /// Decode a fetched value
    pub fn decode(&self, value: Vec<u8>) -> Result<Vec<u8>, Error> {
        match self {
            DecodingStrategy::None => Ok(value),
            DecodingStrategy::Base64 => STANDARD
                .decode(&value)
                .or_else(|_| STANDARD_NO_PAD.decode(&value))
                .map_err(|e| Error::decode("base64 value", e)),
            DecodingStrategy::Base64Url => URL_SAFE
                .decode(&value)
                .or_else(|_| URL_SAFE_NO_PAD.decode(&value))
                .map_err(|e| Error::decode("base64url value", e)),
            DecodingStrategy::Auto => Ok(DecodingStrategy::Base64
                .decode(value.clone())
                .or_else(|_| DecodingStrategy::Base64Url.decode(value.clone()))
                .unwrap_or(value)),
        }
    }
}

/// Reference to one remote secret
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRef {
    /// Remote key
    pub key: String,
    /// Property within a structured secret (empty for the whole value)
    #[serde(default)]
    pub property: String,
    /// Version (empty for the latest)
    #[serde(default)]
    pub version: String,
    /// Metadata policy
    #[serde(default)]
    pub metadata_policy: MetadataPolicy,
    /// Key conversion
    #[serde(default)]
    pub conversion_strategy: ConversionStrategy,
    /// Value decoding
    #[serde(default)]
    pub decoding_strategy: DecodingStrategy,
}

impl RemoteRef {
    /// Reference to the latest version of a whole remote secret
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    /// Select a property
    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = property.into();
        self
    }

    /// Select a version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

/// Name filter of a find request
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindName {
    /// Regular expression remote keys must match
    pub regexp: String,
}

/// Selector for many remote secrets
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindRef {
    /// Tags (labels) remote secrets must carry
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Path prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Name filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<FindName>,
    /// Key conversion
    #[serde(default)]
    pub conversion_strategy: ConversionStrategy,
    /// Value decoding
    #[serde(default)]
    pub decoding_strategy: DecodingStrategy,
}

impl FindRef {
    /// Find by name regular expression
    pub fn by_name(regexp: impl Into<String>) -> Self {
        Self {
            name: Some(FindName {
                regexp: regexp.into(),
            }),
            ..Default::default()
        }
    }
}

/// Target of a push or delete
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRemoteRef {
    /// Remote key
    pub remote_key: String,
    /// Property within the remote secret
    #[serde(default)]
    pub property: String,
}

impl PushRemoteRef {
    /// Create a push target
    pub fn new(remote_key: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            remote_key: remote_key.into(),
            property: property.into(),
        }
    }
}

/// Outcome of validating a store
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationResult {
    /// The store can reach its backend
    Ready,
    /// The store is misconfigured or the backend refused it
    Error,
    /// Validation was not performed
    #[default]
    Unknown,
}
