//! Connection Manager Implementation

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use tokio::net::TcpListener;
use tracing::{debug, error, info, Instrument};

use crate::config::ProxyConfig;
use crate::relay::{RelayEngine, SessionOutcome};
use crate::Result;

/// Accepts client connections and hands each one to its own relay session
pub struct ConnectionManager {
    listener: Option<TcpListener>,
    config: Arc<ProxyConfig>,
    engine: Arc<RelayEngine>,
    active_connections: Arc<AtomicUsize>,
    next_connection_id: AtomicUsize,
}

/// Decrements the active connection count when a session task ends,
/// including by panic.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl ConnectionManager {
    /// Create a new ConnectionManager
    pub fn new(config: Arc<ProxyConfig>) -> Self {
        let engine = Arc::new(RelayEngine::from_config(&config));

        Self {
            listener: None,
            config,
            engine,
            active_connections: Arc::new(AtomicUsize::new(0)),
            next_connection_id: AtomicUsize::new(1),
        }
    }

    /// Bind the listener and accept connections forever.
    ///
    /// Only returns on a bind failure.
    pub async fn start(&mut self) -> Result<()> {
        self.bind().await?;
        self.run().await
    }

    /// Bind the listening socket and return the bound address
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        let bind_addr = self.config.bind_addr();

        debug!("Binding TCP listener to {}", bind_addr);
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to start listener on {}", bind_addr))?;

        let local_addr = listener.local_addr()?;
        info!(listen_addr = %local_addr, "TCP relay listening on port {}", local_addr.port());
        self.listener = Some(listener);

        Ok(local_addr)
    }

    /// Main connection acceptance loop
    ///
    /// Accept errors are logged and the loop keeps going; there is no
    /// backoff between retries.
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref()
            .ok_or_else(|| anyhow!("Listener not initialized"))?;

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => self.dispatch(stream, addr),
                Err(e) => {
                    error!(error = %e, "Error accepting connection");
                }
            }
        }
    }

    fn dispatch(&self, stream: tokio::net::TcpStream, addr: SocketAddr) {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let engine = Arc::clone(&self.engine);

        self.active_connections.fetch_add(1, Ordering::Relaxed);
        let guard = ActiveGuard(Arc::clone(&self.active_connections));

        let span = tracing::info_span!("conn", id = connection_id, client = %addr);
        tokio::spawn(
            async move {
                let _guard = guard;
                match engine.run(stream).await {
                    SessionOutcome::Completed(stats) => {
                        debug!("Connection {} closed after {}ms", connection_id, stats.duration_ms);
                    }
                    outcome => {
                        debug!("Connection {} ended: {:?}", connection_id, outcome);
                    }
                }
            }
            .instrument(span),
        );
    }

    /// Get the current number of active sessions
    pub fn get_active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get the bound address, if the listener has been bound
    pub fn get_bind_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }
}
