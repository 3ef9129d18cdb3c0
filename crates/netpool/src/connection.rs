//! Connection and factory traits.

use std::future::Future;
use std::io;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::config::ConnectionConfig;
use crate::error::BoxError;

/// A raw connection the pool can hold and release.
///
/// This is the only capability the pool needs from the underlying transport. Everything
/// else the connection can do stays reachable through [`crate::PooledConnection`].
#[async_trait]
pub trait Connection: Send + 'static {
    /// Sever the underlying transport
    async fn close(&mut self) -> io::Result<()>;
}

#[async_trait]
impl Connection for tokio::net::TcpStream {
    async fn close(&mut self) -> io::Result<()> {
        match self.shutdown().await {
            // Peer already went away, the socket is as closed as it gets
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

#[cfg(unix)]
#[async_trait]
impl Connection for tokio::net::UnixStream {
    async fn close(&mut self) -> io::Result<()> {
        match self.shutdown().await {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

/// Creates one live connection from a connection config.
///
/// Factories may be called concurrently when several callers hit an empty pool at once.
/// Any `Fn(ConnectionConfig) -> impl Future<Output = Result<C, BoxError>>` closure is a
/// factory.
#[async_trait]
pub trait ConnectionFactory<C>: Send + Sync + 'static {
    /// Dial a new connection
    async fn connect(&self, config: &ConnectionConfig) -> Result<C, BoxError>;
}

#[async_trait]
impl<C, F, Fut> ConnectionFactory<C> for F
where
    C: Send + 'static,
    F: Fn(ConnectionConfig) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<C, BoxError>> + Send + 'static,
{
    async fn connect(&self, config: &ConnectionConfig) -> Result<C, BoxError> {
        (self)(config.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_closure_is_a_factory() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let factory = move |config: ConnectionConfig| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(config.host_port().to_string())
            }
        };

        let config = ConnectionConfig::tcp("127.0.0.1:9");
        let value = factory.connect(&config).await.unwrap();

        assert_eq!(value, "127.0.0.1:9");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closure_factory_error_passes_through() {
        let factory = |_config: ConnectionConfig| async {
            Err::<String, BoxError>(Box::new(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "nobody home",
            )))
        };

        let err = factory
            .connect(&ConnectionConfig::tcp("127.0.0.1:9"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "nobody home");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_stream_close_signals_eof() {
        let (mut left, mut right) = tokio::net::UnixStream::pair().unwrap();

        Connection::close(&mut left).await.unwrap();

        let mut buf = [0u8; 8];
        let read = right.read(&mut buf).await.unwrap();
        assert_eq!(read, 0);
    }

    #[tokio::test]
    async fn test_tcp_stream_close_signals_eof() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        Connection::close(&mut client).await.unwrap();

        let mut buf = [0u8; 8];
        let read = server.read(&mut buf).await.unwrap();
        assert_eq!(read, 0);
    }
}
