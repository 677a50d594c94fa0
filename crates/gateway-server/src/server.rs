//! Axum HTTP server wrapper wiring the application router to graceful
//! shutdown coordination.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

use crate::health::HealthChecker;
use crate::routes::create_router;
use crate::shutdown::{GracefulServer, ShutdownPhase};
use crate::state::AppState;

/// Failure starting or running the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured host/port could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that failed to bind.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The host/port in configuration did not parse to a valid socket address.
    #[error("invalid listen address {host}:{port}: {source}")]
    InvalidAddress {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
        /// Underlying parse error.
        #[source]
        source: std::io::Error,
    },
    /// The axum server itself returned an error while serving.
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Listen address and shutdown timing for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind host, e.g. `"0.0.0.0"`.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// How long to wait for in-flight requests during shutdown.
    pub shutdown_grace_period: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_grace_period: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// A config pointed at the given host and port.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Override the shutdown grace period.
    #[must_use]
    pub fn with_shutdown_grace_period(mut self, period: Duration) -> Self {
        self.shutdown_grace_period = period;
        self
    }
}

/// The gateway's HTTP server.
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    /// Build a server from its listen configuration and application state.
    #[must_use]
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Bind and serve until a shutdown signal (Ctrl+C, SIGTERM/SIGINT/SIGQUIT
    /// on Unix) is received, then drain in-flight requests up to the
    /// configured grace period.
    ///
    /// # Errors
    /// Returns [`ServerError`] if the listen address is invalid, the socket
    /// cannot be bound, or the server exits with an I/O error.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr: SocketAddr =
            format!("{}:{}", self.config.host, self.config.port)
                .parse()
                .map_err(|_| ServerError::InvalidAddress {
                    host: self.config.host.clone(),
                    port: self.config.port,
                    source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "unparseable socket address"),
                })?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        info!(%addr, "listening");

        // Reuse the coordinator already on `AppState` rather than building a
        // second, disconnected one: `request_tracking_middleware` gates
        // admission against `state.shutdown`, and that only matters if this
        // is the same coordinator whose `trigger_shutdown` axum actually
        // waits on below.
        let graceful = GracefulServer::with_coordinator(self.state.shutdown.clone());
        spawn_health_checker_shutdown_watcher(&graceful, self.state.health_checker.clone());
        let app = create_router(self.state);

        graceful
            .run_until_shutdown(|coordinator| async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(coordinator.shutdown_signal())
                    .await
                    .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
            })
            .await;

        Ok(())
    }
}

/// Mark the health checker as shutting down as soon as the coordinator
/// enters its draining phase, so `/health` and `/health/live` reflect it
/// immediately rather than only once the process actually exits.
fn spawn_health_checker_shutdown_watcher(graceful: &GracefulServer, health_checker: Arc<HealthChecker>) {
    let mut phase_rx = graceful.coordinator().subscribe_phase();
    tokio::spawn(async move {
        while phase_rx.changed().await.is_ok() {
            if *phase_rx.borrow() == ShutdownPhase::Draining {
                health_checker.mark_shutting_down();
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_binds_all_interfaces_on_8080() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn new_overrides_host_and_port() {
        let config = ServerConfig::new("127.0.0.1", 9000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9000);
    }
}
