//! Serving loop and shutdown
//!
//! Shutdown order: the token is cancelled, the accept loop drops the
//! listener so new dials are refused, tonic drains in-flight requests, then
//! the socket file is removed.

use std::future::Future;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{UnixListener, UnixStream};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::{debug, info, warn};

use conduit_common::{Error, Provider};

use crate::listener::ProviderListener;
use crate::service::ProviderService;

const ACCEPT_BACKLOG: usize = 64;

/// Pause after a failed accept; errors such as EMFILE repeat until fds free up
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Serves one provider until shut down
pub struct ProviderServer<P> {
    service: ProviderService<P>,
}

impl<P: Provider> ProviderServer<P> {
    /// Create a server for a provider
    pub fn new(provider: P) -> Self {
        Self {
            service: ProviderService::new(provider),
        }
    }

    /// Serve on `listener` until `shutdown` is cancelled
    ///
    /// Returns once in-flight requests have completed. The socket file is
    /// removed before returning, whatever the outcome.
    pub async fn serve(
        self,
        listener: ProviderListener,
        shutdown: CancellationToken,
    ) -> Result<(), Error> {
        let kind = listener.kind().to_string();
        let (listener, guard) = listener.into_parts();
        let (tx, rx) = mpsc::channel(ACCEPT_BACKLOG);

        let accept = tokio::spawn(accept_loop(listener, tx, shutdown.clone()));

        info!(provider = %kind, "serving provider");
        let signal = shutdown.clone();
        let served = Server::builder()
            .add_service(self.service.into_service())
            .serve_with_incoming_shutdown(ReceiverStream::new(rx), async move {
                signal.cancelled().await;
                info!("shutdown requested, draining in-flight requests");
            })
            .await;

        // Stops the accept loop if serving ended for another reason.
        shutdown.cancel();
        if let Err(e) = accept.await {
            warn!(error = %e, "accept loop panicked");
        }
        drop(guard);

        served.map_err(|e| Error::internal_with_context("serve", e.to_string()))?;
        info!(provider = %kind, "provider stopped");
        Ok(())
    }
}

/// Source of incoming connections
#[async_trait]
trait Accept: Send + 'static {
    async fn accept(&mut self) -> io::Result<UnixStream>;
}

#[async_trait]
impl Accept for UnixListener {
    async fn accept(&mut self) -> io::Result<UnixStream> {
        UnixListener::accept(self).await.map(|(stream, _)| stream)
    }
}

async fn accept_loop<A: Accept>(
    mut listener: A,
    connections: mpsc::Sender<Result<UnixStream, io::Error>>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(stream) => {
                    debug!("accepted connection");
                    if connections.send(Ok(stream)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => {}
                    }
                }
            },
        }
    }
    drop(listener);
    debug!("stopped accepting connections");
}

/// Install SIGINT and SIGTERM handlers that cancel `token`
///
/// Handlers are installed before this returns, so a failure surfaces at
/// startup. The returned future completes after the first signal, or when
/// the token is cancelled some other way. Later signals are absorbed:
/// cancelling again is a no-op.
pub fn shutdown_signal(
    token: CancellationToken,
) -> Result<impl Future<Output = ()> + Send + 'static, Error> {
    let mut terminate =
        signal(SignalKind::terminate()).map_err(|e| Error::io("install SIGTERM handler", e))?;
    let mut interrupt =
        signal(SignalKind::interrupt()).map_err(|e| Error::io("install SIGINT handler", e))?;

    Ok(async move {
        tokio::select! {
            _ = terminate.recv() => info!(signal = "SIGTERM", "received termination signal"),
            _ = interrupt.recv() => info!(signal = "SIGINT", "received termination signal"),
            _ = token.cancelled() => return,
        }
        token.cancel();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Fails every accept as if the process were out of file descriptors
    struct Exhausted {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Accept for Exhausted {
        async fn accept(&mut self) -> io::Result<UnixStream> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Err(io::Error::from_raw_os_error(24))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_accept_errors_back_off_until_shutdown() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let (tx, _rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        let accepting = tokio::spawn(accept_loop(
            Exhausted {
                attempts: attempts.clone(),
            },
            tx,
            shutdown.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(350)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), accepting)
            .await
            .expect("accept loop should stop on shutdown")
            .unwrap();

        let attempts = attempts.load(Ordering::SeqCst);
        assert!((1..=10).contains(&attempts), "{attempts} accept attempts");
    }

    #[tokio::test]
    async fn test_shutdown_signal_returns_when_token_is_cancelled() {
        let token = CancellationToken::new();
        let waiting = tokio::spawn(shutdown_signal(token.clone()).unwrap());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .expect("signal wait should end on cancellation")
            .unwrap();
    }
}
