//! conduit-provider - serve one secret provider over a Unix socket

use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use conduit_common::socket::{DEFAULT_SOCKET_DIR, SOCKET_DIR_ENV};
use conduit_common::telemetry::{init_telemetry, TelemetryConfig};
use conduit_common::Provider;
use conduit_providers::{FakeSecretsProvider, KubernetesSecretsProvider};
use conduit_shell::{shutdown_signal, ProviderListener, ProviderServer};

/// Serve a secret provider to the controller on the same node
#[derive(Parser, Debug)]
#[command(name = "conduit-provider", version, about, long_about = None)]
struct Cli {
    /// Provider kind to serve
    #[arg(long, value_enum)]
    provider: ProviderKind,

    /// Directory holding provider sockets
    #[arg(long, env = SOCKET_DIR_ENV, default_value = DEFAULT_SOCKET_DIR)]
    socket_dir: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProviderKind {
    Fake,
    Kubernetes,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // The kubernetes provider opens TLS connections to the remote cluster
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("failed to install crypto provider: {e:?}");
        std::process::exit(1);
    }

    let cli = Cli::parse();

    let service_name = match cli.provider {
        ProviderKind::Fake => "conduit-provider-fake",
        ProviderKind::Kubernetes => "conduit-provider-kubernetes",
    };
    init_telemetry(TelemetryConfig {
        service_name: service_name.to_string(),
        ..Default::default()
    })?;

    match cli.provider {
        ProviderKind::Fake => run(FakeSecretsProvider, &cli.socket_dir).await,
        ProviderKind::Kubernetes => run(KubernetesSecretsProvider, &cli.socket_dir).await,
    }
}

async fn run<P: Provider>(provider: P, socket_dir: &Path) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let signals = tokio::spawn(shutdown_signal(shutdown.clone())?);

    let listener = ProviderListener::bind(socket_dir, provider.kind())?;
    info!(socket = %listener.path().display(), "listening");

    let served = ProviderServer::new(provider).serve(listener, shutdown.clone()).await;
    // Stop waiting for signals if the server exited by itself
    shutdown.cancel();
    if let Err(e) = signals.await {
        error!(error = %e, "signal task panicked");
    }

    served?;
    info!("provider stopped");
    Ok(())
}
