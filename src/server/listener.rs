//! Caster listener
//!
//! Handles the TCP accept loop and spawns connection handlers.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::auth::{AuthRegistry, MountpointDefinition};
use crate::error::Result;
use crate::protocol::{response, NtripVersion, Status};
use crate::registry::{MountConfig, MountpointTable};
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::stats::{MountStats, ServerStats};

/// Running totals shared by every connection
#[derive(Debug, Default)]
pub struct ServerCounters {
    pub(crate) total_connections: AtomicU64,
    pub(crate) active_connections: AtomicU64,
    pub(crate) rejected_connections: AtomicU64,
    pub(crate) bytes_received: AtomicU64,
    pub(crate) bytes_sent: AtomicU64,
}

/// Decrements the active connection count when the connection task ends
struct ActiveConnection(Arc<ServerCounters>);

impl ActiveConnection {
    fn new(counters: Arc<ServerCounters>) -> Self {
        counters.total_connections.fetch_add(1, Ordering::Relaxed);
        counters.active_connections.fetch_add(1, Ordering::Relaxed);
        Self(counters)
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.0.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

/// NTRIP caster
pub struct CasterServer {
    config: Arc<ServerConfig>,
    auth: Arc<AuthRegistry>,
    mounts: Arc<MountpointTable>,
    counters: Arc<ServerCounters>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
    started_at: Instant,
}

impl CasterServer {
    /// Create a new caster serving the given mountpoints
    pub fn new(config: ServerConfig, auth: AuthRegistry) -> Self {
        Self::with_mount_config(config, auth, MountConfig::default())
    }

    /// Create a new caster with a custom default mount configuration
    ///
    /// The default applies to mountpoints whose definition disappears
    /// between authorization and creation (a concurrent reload); configured
    /// mountpoints use their own [`MountpointDefinition::config`].
    pub fn with_mount_config(
        config: ServerConfig,
        auth: AuthRegistry,
        mount_config: MountConfig,
    ) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config: Arc::new(config),
            auth: Arc::new(auth),
            mounts: Arc::new(MountpointTable::with_config(mount_config)),
            counters: Arc::new(ServerCounters::default()),
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
            started_at: Instant::now(),
        }
    }

    /// Get a reference to the mountpoint table
    pub fn mount_table(&self) -> &Arc<MountpointTable> {
        &self.mounts
    }

    /// Get a reference to the authorization registry
    pub fn auth(&self) -> &Arc<AuthRegistry> {
        &self.auth
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve an already bound listener until `shutdown` resolves
    ///
    /// On shutdown every mountpoint is torn down: sources are dropped and
    /// subscribers drained.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "NTRIP caster listening");

        // Spawn cleanup task for the mountpoint table
        let cleanup_handle = self.mounts.spawn_cleanup_task(self.config.cleanup_interval);

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        };

        // Stop cleanup task on shutdown
        cleanup_handle.abort();
        self.mounts.shutdown().await;

        result
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    self.counters
                        .rejected_connections
                        .fetch_add(1, Ordering::Relaxed);
                    self.reject(socket);
                    return;
                }
            }
        } else {
            None
        };

        // Generate session ID
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            session_id = session_id,
            peer = %peer_addr,
            "New connection"
        );

        // Configure socket
        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        // Spawn connection handler
        let config = Arc::clone(&self.config);
        let auth = Arc::clone(&self.auth);
        let mounts = Arc::clone(&self.mounts);
        let counters = Arc::clone(&self.counters);

        tokio::spawn(async move {
            let _permit = permit;
            let _active = ActiveConnection::new(Arc::clone(&counters));

            let mut connection =
                Connection::new(session_id, socket, peer_addr, config, auth, mounts, counters);

            if let Err(e) = connection.run().await {
                tracing::debug!(
                    session_id = session_id,
                    error = %e,
                    "Connection error"
                );
            }

            tracing::debug!(session_id = session_id, "Connection closed");
        });
    }

    /// Answer 503 and close, without holding up the accept loop
    fn reject(&self, mut socket: TcpStream) {
        let resp = response::error(
            Status::ServiceUnavailable,
            NtripVersion::V1,
            &self.config.server_name,
        );
        let timeout = self.config.response_timeout;

        tokio::spawn(async move {
            let _ = tokio::time::timeout(timeout, socket.write_all(&resp)).await;
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Server-wide statistics
    pub async fn stats(&self) -> ServerStats {
        let mounts = self.mounts.snapshot().await;

        ServerStats {
            total_connections: self.counters.total_connections.load(Ordering::Relaxed),
            active_connections: self.counters.active_connections.load(Ordering::Relaxed),
            rejected_connections: self.counters.rejected_connections.load(Ordering::Relaxed),
            total_bytes_received: self.counters.bytes_received.load(Ordering::Relaxed),
            total_bytes_sent: self.counters.bytes_sent.load(Ordering::Relaxed),
            active_sources: mounts.iter().filter(|m| m.is_live()).count() as u64,
            active_mounts: mounts.len() as u64,
            uptime: self.started_at.elapsed(),
        }
    }

    /// Live mountpoints with their counters, sorted by name
    pub async fn mounts(&self) -> Vec<MountStats> {
        self.mounts.snapshot().await
    }

    /// Disconnect the source of `mount`
    ///
    /// Subscribers stay attached and pick up the next source. Returns false
    /// if the mount has no source.
    pub async fn drop_source(&self, mount: &str) -> bool {
        match self.mounts.lookup(mount.trim_start_matches('/')).await {
            Some(state) => state.drop_producer(),
            None => false,
        }
    }

    /// Replace the mountpoint definitions
    ///
    /// Running sessions keep going; the new records apply to new connections.
    pub fn reload_auth(&self, definitions: impl IntoIterator<Item = MountpointDefinition>) {
        self.auth.reload(definitions);
    }
}
