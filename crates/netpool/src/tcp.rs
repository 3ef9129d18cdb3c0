//! TCP connection factory

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::{TcpStream, lookup_host};
use tracing::{debug, warn};

use crate::config::ConnectionConfig;
use crate::connection::ConnectionFactory;
use crate::error::BoxError;

/// Address family requested by a connection config's protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Any,
    V4,
    V6,
}

impl Family {
    fn from_protocol(protocol: &str) -> io::Result<Self> {
        match protocol {
            "" | "tcp" => Ok(Self::Any),
            "tcp4" => Ok(Self::V4),
            "tcp6" => Ok(Self::V6),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported protocol for TCP connector: {other}"),
            )),
        }
    }

    fn accepts(self, addr: &SocketAddr) -> bool {
        match self {
            Self::Any => true,
            Self::V4 => addr.is_ipv4(),
            Self::V6 => addr.is_ipv6(),
        }
    }
}

/// TCP connector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConnectorConfig {
    /// Connection timeout in milliseconds, 0 disables it
    pub connect_timeout_ms: u64,
    /// Set `TCP_NODELAY` on new sockets
    pub nodelay: bool,
}

impl Default for TcpConnectorConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            nodelay: true,
        }
    }
}

/// Dials `host:port` over TCP for the pool
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    config: TcpConnectorConfig,
}

impl TcpConnector {
    /// Create a connector with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a connector from explicit settings
    #[must_use]
    pub fn with_config(config: TcpConnectorConfig) -> Self {
        Self { config }
    }

    /// Set connection timeout
    #[must_use]
    pub const fn connect_timeout_ms(mut self, timeout: u64) -> Self {
        self.config.connect_timeout_ms = timeout;
        self
    }

    /// Enable or disable `TCP_NODELAY`
    #[must_use]
    pub const fn nodelay(mut self, enabled: bool) -> Self {
        self.config.nodelay = enabled;
        self
    }

    /// Current settings
    pub fn config(&self) -> &TcpConnectorConfig {
        &self.config
    }

    async fn dial(&self, config: &ConnectionConfig) -> io::Result<TcpStream> {
        let family = Family::from_protocol(config.protocol())?;
        let candidates: Vec<SocketAddr> = lookup_host(config.host_port())
            .await?
            .filter(|addr| family.accepts(addr))
            .collect();

        let mut last_err = io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no {} address for {}", config.protocol(), config.host_port()),
        );

        for addr in candidates {
            debug!(%addr, "connecting to TCP endpoint");
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    if self.config.nodelay
                        && let Err(e) = stream.set_nodelay(true)
                    {
                        warn!(%addr, error = %e, "failed to set TCP_NODELAY");
                    }
                    return Ok(stream);
                }
                Err(e) => {
                    debug!(%addr, error = %e, "TCP connect attempt failed");
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }
}

#[async_trait]
impl ConnectionFactory<TcpStream> for TcpConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<TcpStream, BoxError> {
        if self.config.connect_timeout_ms == 0 {
            return Ok(self.dial(config).await?);
        }

        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        match tokio::time::timeout(timeout, self.dial(config)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(Box::new(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect to {} timed out after {timeout:?}", config.host_port()),
            ))),
        }
    }
}
