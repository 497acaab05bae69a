//! Command-line plumbing shared by the binaries

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::metrics;

/// Flags accepted by every binary
#[derive(Parser, Debug)]
#[command(version)]
pub struct Cli {
    /// (optional) absolute path to the kubeconfig file [default: ~/.kube/config]
    #[arg(long, value_name = "PATH")]
    pub kubeconfig: Option<PathBuf>,
}

impl Cli {
    /// Client configuration from the environment plus these flags
    pub fn client_config(&self) -> Result<ClientConfig> {
        Ok(ClientConfig::from_env()?.with_kubeconfig(self.kubeconfig.clone()))
    }
}

/// Initialize tracing subscriber
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kube=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Serve metrics in the background when `RECONCILER_METRICS_ADDR` is set
pub fn spawn_metrics_server() {
    let Ok(addr) = std::env::var(metrics::METRICS_ADDR_ENV) else {
        return;
    };

    match addr.parse::<SocketAddr>() {
        Ok(sock) => {
            info!(addr = %sock, "Metrics server starting");
            tokio::spawn(async move {
                if let Err(e) = metrics::serve(sock).await {
                    error!(error = %e, "Metrics server exited");
                }
            });
        }
        Err(_) => {
            warn!(addr = %addr, "Invalid {}; expected host:port", metrics::METRICS_ADDR_ENV);
        }
    }
}

/// Log a failed operation with its kind and the object it concerns
pub fn report(err: &Error) {
    match err.object() {
        Some(object) => error!(kind = %err.kind(), %object, error = %err, "Operation failed"),
        None => error!(kind = %err.kind(), error = %err, "Operation failed"),
    }
}
