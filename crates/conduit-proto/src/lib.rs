//! Protocol buffer definitions for out-of-process secret providers.
//!
//! The controller side (bridge) and the provider side (shell) talk over a
//! Unix domain socket using the `SecretsProvider` service defined in
//! `proto/provider.proto`.
//!
//! # Communication Flow
//!
//! ```text
//! ┌──────────────────────────┐          ┌──────────────────────────┐
//! │   Controller process     │          │   Provider process       │
//! │                          │  unix    │                          │
//! │  ProviderBridge ─────────┼─ socket ─┼─► SecretsProvider server │
//! │   (StoreContext + ref)   │          │   closed-world store     │
//! └──────────────────────────┘          └──────────────────────────┘
//! ```
//!
//! Each request embeds a [`StoreContext`]: the JSON store document, the JSON
//! list of Kubernetes objects it references, and the caller namespace. The
//! provider process never reaches the real cluster for those objects.
//!
//! # Error Channel
//!
//! Every response carries an `error` string. A non-empty `error` is an
//! application failure reported by the backend; a gRPC `Status` means the
//! call itself failed in transit.

// Generated protobuf code doesn't have docs
#![allow(missing_docs)]

/// Generated protobuf types from provider.proto
pub mod provider {
    /// Version 1 of the provider protocol
    pub mod v1 {
        tonic::include_proto!("conduit.provider.v1");
    }
}

pub use provider::v1::*;
