//! HTTP server lifecycle: bind, serve, graceful shutdown.

use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::Config;
use crate::files::{RootError, RootRegistry};
use crate::router::{build_router, AppState};

/// Register the configured roots, canonicalizing each one.
pub fn registry_from_config(config: &Config) -> Result<RootRegistry, RootError> {
    RootRegistry::new(&config.roots.allowed_roots)
}

/// A bound HTTP listener with its router.
pub struct HttpServer {
    listener: TcpListener,
    router: Router,
}

impl HttpServer {
    /// Bind `addr` and build the router over `state`.
    pub async fn bind(addr: SocketAddr, state: AppState) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            router: build_router(state),
        })
    }

    /// Bind according to the configuration.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let registry = Arc::new(registry_from_config(config)?);
        if registry.is_empty() {
            tracing::warn!("No allowed roots configured; every request will be rejected");
        }
        for root in registry.roots() {
            info!(root = %root.path().display(), "Serving allowed root");
        }

        let ip: IpAddr = config.server.bind.parse()?;
        let state = AppState::new(registry, &config.preview);
        Ok(Self::bind(SocketAddr::new(ip, config.server.port), state).await?)
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` completes, then drain in-flight requests.
    pub async fn run_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "HTTP server listening");
        }
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("HTTP server stopped");
        Ok(())
    }

    /// Serve until SIGTERM or SIGINT.
    pub async fn run(self) -> io::Result<()> {
        self.run_until(wait_for_shutdown_signal()).await
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, "Failed to register signal handlers; falling back to Ctrl-C");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "Failed to listen for Ctrl-C");
                }
                return;
            }
        };

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT");
        }
    }
}

/// Wait for a shutdown signal (Ctrl-C).
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
    }
}
