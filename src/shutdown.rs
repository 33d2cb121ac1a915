//! Graceful shutdown for the HTTP listener
//!
//! On SIGINT or SIGTERM the listener stops accepting connections, in-flight
//! requests get a bounded drain window, and anything still running after
//! that is dropped.
//!
//! # Example
//!
//! ```rust,no_run
//! use osgoode_events::shutdown::{ShutdownConfig, ShutdownCoordinator};
//! use std::sync::Arc;
//!
//! # async fn example(router: axum::Router) -> anyhow::Result<()> {
//! let coordinator = Arc::new(ShutdownCoordinator::new(ShutdownConfig::default()));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! coordinator.serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use axum::Router;
use parking_lot::RwLock;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// How long in-flight requests may run after the listener closes
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl ShutdownConfig {
    pub fn with_drain_timeout(mut self, timeout_secs: u64) -> Self {
        self.drain_timeout = Duration::from_secs(timeout_secs);
        self
    }
}

/// Shutdown phase tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// Server is running normally
    Running,
    /// Listener closed, waiting for in-flight requests
    Draining,
    /// Every request finished inside the drain window
    Complete,
    /// Drain window elapsed with requests still running
    Forced,
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownPhase::Running => write!(f, "running"),
            ShutdownPhase::Draining => write!(f, "draining"),
            ShutdownPhase::Complete => write!(f, "complete"),
            ShutdownPhase::Forced => write!(f, "forced"),
        }
    }
}

/// Coordinates signal handling and the drain of the HTTP server
pub struct ShutdownCoordinator {
    config: ShutdownConfig,
    phase: RwLock<ShutdownPhase>,
    shutdown_token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new(config: ShutdownConfig) -> Self {
        Self {
            config,
            phase: RwLock::new(ShutdownPhase::Running),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get a shutdown token that can be used to coordinate async task cancellation
    pub fn token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn phase(&self) -> ShutdownPhase {
        *self.phase.read()
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Start shutdown without waiting for a signal.
    pub fn trigger(&self) {
        if self.shutdown_token.is_cancelled() {
            return;
        }
        *self.phase.write() = ShutdownPhase::Draining;
        self.shutdown_token.cancel();
    }

    /// Wait for a shutdown signal (SIGTERM or SIGINT)
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                error!(%error, "failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(error) => {
                    error!(%error, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("received SIGINT (Ctrl+C), initiating graceful shutdown");
            },
            _ = terminate => {
                info!("received SIGTERM, initiating graceful shutdown");
            },
            _ = self.shutdown_token.cancelled() => {
                debug!("shutdown triggered programmatically");
            },
        }
    }

    /// Serve `router` until a signal or [`trigger`](Self::trigger), then
    /// drain in-flight requests for at most the configured window.
    pub async fn serve(self: &Arc<Self>, listener: TcpListener, router: Router) -> Result<()> {
        let signals = Arc::clone(self);
        let signal_task = tokio::spawn(async move {
            signals.wait_for_signal().await;
            signals.trigger();
        });

        let token = self.token();
        let server = axum::serve(listener, router)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .into_future();
        tokio::pin!(server);

        let early = tokio::select! {
            result = &mut server => Some(result),
            _ = self.shutdown_token.cancelled() => None,
        };

        let result = match early {
            Some(result) => {
                warn!("server stopped before shutdown was requested");
                result.context("HTTP server failed")
            }
            None => {
                info!(
                    drain_timeout_secs = self.config.drain_timeout.as_secs(),
                    "listener closed, draining in-flight requests"
                );
                match timeout(self.config.drain_timeout, &mut server).await {
                    Ok(result) => {
                        *self.phase.write() = ShutdownPhase::Complete;
                        info!("graceful shutdown completed");
                        result.context("HTTP server failed during drain")
                    }
                    Err(_) => {
                        *self.phase.write() = ShutdownPhase::Forced;
                        warn!(
                            timeout_secs = self.config.drain_timeout.as_secs(),
                            "drain window elapsed, dropping remaining requests"
                        );
                        Ok(())
                    }
                }
            }
        };

        signal_task.abort();
        result
    }
}
