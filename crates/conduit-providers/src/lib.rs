//! Secret providers served over the conduit provider socket
//!
//! Each provider implements [`conduit_common::Provider`] and is hosted by one
//! `conduit-provider` process through `conduit-shell`.

#![deny(missing_docs)]

pub mod fake;
pub mod kubernetes;

pub use fake::FakeSecretsProvider;
pub use kubernetes::KubernetesSecretsProvider;
