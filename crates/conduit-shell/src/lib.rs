//! Provider-side shell
//!
//! Serves one [`conduit_common::Provider`] on `<socket_dir>/<kind>.sock`.
//! Each request is decoded into a store document and a closed-world object
//! store built from the shipped objects only; nothing is kept between
//! requests.
//!
//! ```ignore
//! let token = CancellationToken::new();
//! tokio::spawn(shutdown_signal(token.clone())?);
//! let listener = ProviderListener::bind("/var/run/conduit", "fake")?;
//! ProviderServer::new(FakeSecretsProvider).serve(listener, token).await?;
//! ```

#![deny(missing_docs)]

mod listener;
mod server;
mod service;

pub use listener::{ProviderListener, SocketGuard, SOCKET_MODE};
pub use server::{shutdown_signal, ProviderServer};
pub use service::ProviderService;
