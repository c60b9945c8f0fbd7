//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::auth::Credential;
use crate::protocol::constants::*;
use crate::protocol::FramerLimits;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Request header must arrive within this time
    pub header_timeout: Duration,

    /// Largest accepted request header in bytes
    pub max_header_size: usize,

    /// Bound on writing a response header (or a sourcetable)
    pub response_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Application-level read buffer size; bounds one published chunk
    pub read_buffer_size: usize,

    /// Interval of the mountpoint sweep (idle subscribers, empty mounts)
    pub cleanup_interval: Duration,

    /// Value of the `Server:` header
    pub server_name: String,

    /// Credential for the `/adm/api/v1/` calls; `None` disables them
    pub admin_credential: Option<Credential>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            header_timeout: Duration::from_secs(10),
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            response_timeout: Duration::from_secs(5),
            tcp_nodelay: true, // Corrections are latency sensitive
            read_buffer_size: 4 * 1024,
            cleanup_interval: Duration::from_secs(5),
            server_name: SERVER_NAME.to_owned(),
            admin_credential: None,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the request header timeout
    pub fn header_timeout(mut self, timeout: Duration) -> Self {
        self.header_timeout = timeout;
        self
    }

    /// Set the request header size limit
    pub fn max_header_size(mut self, size: usize) -> Self {
        self.max_header_size = size;
        self
    }

    /// Set the response write timeout
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the read buffer size (at least 1 byte)
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Set the cleanup interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Set the `Server:` header value
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Enable the administrative calls, authorized with HTTP Basic
    pub fn admin(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.admin_credential = Some(Credential::basic(user, password));
        self
    }

    /// Header budget for the request framer
    pub fn framer_limits(&self) -> FramerLimits {
        FramerLimits {
            max_header_size: self.max_header_size,
            header_timeout: self.header_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 2101);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.max_header_size, DEFAULT_MAX_HEADER_SIZE);
        assert!(config.tcp_nodelay);
        assert!(config.server_name.starts_with("NTRIP "));
        assert!(config.admin_credential.is_none());
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:2102".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 2102);
    }

    #[test]
    fn test_builder_read_buffer_size_floor() {
        let config = ServerConfig::default().read_buffer_size(0);

        assert_eq!(config.read_buffer_size, 1);
    }

    #[test]
    fn test_framer_limits() {
        let config = ServerConfig::default()
            .header_timeout(Duration::from_secs(3))
            .max_header_size(512);
        let limits = config.framer_limits();

        assert_eq!(limits.header_timeout, Duration::from_secs(3));
        assert_eq!(limits.max_header_size, 512);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:2101".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .max_connections(50)
            .header_timeout(Duration::from_secs(5))
            .response_timeout(Duration::from_secs(1))
            .cleanup_interval(Duration::from_secs(30))
            .server_name("NTRIP test")
            .admin("admin", "secret");

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.header_timeout, Duration::from_secs(5));
        assert_eq!(config.response_timeout, Duration::from_secs(1));
        assert_eq!(config.cleanup_interval, Duration::from_secs(30));
        assert_eq!(
            config.admin_credential,
            Some(Credential::basic("admin", "secret"))
        );
        assert_eq!(config.server_name, "NTRIP test");
    }
}
