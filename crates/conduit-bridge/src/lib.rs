//! Caller-side bridge to out-of-process secret providers
//!
//! A reconciler that needs a secret from a store:
//!
//! 1. scans the store for references with [`conduit_common::aggregate`],
//! 2. fetches the referenced objects with [`resolve_objects`],
//! 3. dials the provider for the store's kind with [`connect`],
//! 4. binds everything in a [`ProviderBridge`] and calls operations on it.
//!
//! ```ignore
//! let refs = conduit_common::aggregate(&store);
//! let objects = resolve_objects(&KubeClusterReader::new(client), &store, &refs, "team-a").await?;
//! let channel = connect(&BridgeConfig::default(), store.provider().kind()?)?;
//! let bridge = ProviderBridge::new(channel, store, objects, "team-a");
//! let password = bridge.get_secret(&RemoteRef::new("db").with_property("password")).await?;
//! bridge.close().await?;
//! ```

#![deny(missing_docs)]

mod bridge;
mod channel;
mod error;
pub mod resolver;

pub use bridge::ProviderBridge;
pub use channel::{
    connect, BridgeConfig, ProviderChannel, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
};
pub use error::BridgeError;
pub use resolver::{resolve_objects, ClusterReader, KubeClusterReader};
