//! HTTP server bootstrap.

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::time::Duration;

use gateway_config::GatewayConfig;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::routes::create_router;
use crate::shutdown::shutdown_signal;
use crate::state::AppState;

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The server loop failed
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Listener and shutdown settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Upper bound on draining in-flight requests after a shutdown signal
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Create a new server configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the server section of the gateway configuration
    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            shutdown_timeout: config.server.shutdown_timeout,
        }
    }

    /// Set the host
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the drain deadline
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// `host:port` as given
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The gateway HTTP server
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    /// Create a server over built state
    #[must_use]
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Bind the configured address and serve until a shutdown signal
    ///
    /// # Errors
    /// Returns error if binding fails or the server loop fails
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;

        self.serve(listener, async {
            shutdown_signal().await;
        })
        .await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// In-flight requests get `shutdown_timeout` to finish; streams still
    /// open after that are dropped.
    ///
    /// # Errors
    /// Returns error if the server loop fails
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        let drain_timeout = self.config.shutdown_timeout;
        let app = create_router(self.state);

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let signal = async move {
            shutdown.await;
            let _ = stop_tx.send(true);
        };

        info!(addr = %local_addr, "Relay gateway listening");

        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .into_future();

        let deadline = async move {
            if stop_rx.wait_for(|stop| *stop).await.is_err() {
                std::future::pending::<()>().await;
            }
            info!(timeout_secs = drain_timeout.as_secs(), "Draining in-flight requests");
            tokio::time::sleep(drain_timeout).await;
        };

        tokio::select! {
            result = server => result?,
            () = deadline => {
                warn!("Drain deadline reached, dropping remaining connections");
            }
        }

        info!("Server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_builder() {
        let config = ServerConfig::new()
            .with_host("127.0.0.1")
            .with_port(9000)
            .with_shutdown_timeout(Duration::from_secs(5));
        assert_eq!(config.bind_address(), "127.0.0.1:9000");
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_server_config_from_gateway_config() {
        let mut gateway = GatewayConfig::default();
        gateway.server.port = 3100;
        let config = ServerConfig::from_config(&gateway);
        assert_eq!(config.port, 3100);
        assert_eq!(config.host, gateway.server.host);
    }

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = AppState::builder().build().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(Server::new(ServerConfig::new(), state).serve(
            listener,
            async move {
                let _ = rx.await;
            },
        ));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        stream
            .write_all(b"GET /health HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
