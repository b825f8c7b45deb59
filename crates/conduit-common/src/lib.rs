//! Common types for conduit: store documents, references, the closed-world
//! object store, provider traits and wire conversions

#![deny(missing_docs)]

pub mod error;
pub mod objects;
pub mod provider;
pub mod refs;
pub mod remote;
pub mod resolvers;
pub mod scan;
pub mod socket;
pub mod store;
pub mod telemetry;
pub mod wire;

pub use error::Error;
pub use objects::{
    ClosedWorldStore, ObjectKind, ObjectReader, ResolvedObject, ResolvedObjectSet, StoreError,
};
pub use provider::{Provider, ProviderError, SecretsClient};
pub use remote::{FindRef, PushRemoteRef, RemoteRef, ValidationResult};
pub use scan::{aggregate, ReferenceSet};
pub use store::GenericStore;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
