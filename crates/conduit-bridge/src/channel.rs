//! Channel configuration and dialing

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;
use tracing::debug;

use conduit_common::socket::{socket_dir_from_env, socket_path};

use crate::error::BridgeError;

/// Default timeout for establishing the Unix socket connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default per-call deadline
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// tonic needs an authority to build requests; the connector ignores it.
const PLACEHOLDER_URI: &str = "http://[::]:50051";

/// Bridge configuration
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Directory holding provider sockets
    pub socket_dir: PathBuf,
    /// Timeout for connecting to the socket
    pub connect_timeout: Duration,
    /// Deadline for each call
    pub request_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            socket_dir: socket_dir_from_env(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl BridgeConfig {
    /// Configuration for a socket directory with default timeouts
    pub fn with_socket_dir(socket_dir: impl Into<PathBuf>) -> Self {
        Self {
            socket_dir: socket_dir.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Channel to one provider, with the call deadline it was configured for
#[derive(Clone, Debug)]
pub struct ProviderChannel {
    channel: Channel,
    request_timeout: Duration,
}

impl ProviderChannel {
    /// Deadline sent with every call on this channel
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub(crate) fn into_parts(self) -> (Channel, Duration) {
        (self.channel, self.request_timeout)
    }
}

/// Open a channel to the provider serving `kind`
///
/// The channel dials lazily and reconnects on demand, so an absent provider
/// only shows up as a transport error on the first call. The channel is
/// cheap to clone and safe to share across concurrent calls.
pub fn connect(config: &BridgeConfig, kind: &str) -> Result<ProviderChannel, BridgeError> {
    let path = socket_path(&config.socket_dir, kind)
        .map_err(|e| BridgeError::Endpoint(e.to_string()))?;
    let connect_timeout = config.connect_timeout;

    debug!(provider = %kind, socket = %path.display(), "opening provider channel");

    let endpoint = Endpoint::try_from(PLACEHOLDER_URI)
        .map_err(|e| BridgeError::Endpoint(e.to_string()))?
        .timeout(config.request_timeout);

    let channel = endpoint.connect_with_connector_lazy(service_fn(move |_: Uri| {
        let path = path.clone();
        async move {
            let stream = tokio::time::timeout(connect_timeout, UnixStream::connect(&path))
                .await
                .map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connect to {} timed out", path.display()),
                    )
                })??;
            Ok::<_, io::Error>(TokioIo::new(stream))
        }
    }));

    Ok(ProviderChannel {
        channel,
        request_timeout: config.request_timeout,
    })
}
