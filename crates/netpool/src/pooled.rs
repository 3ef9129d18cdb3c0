//! Checked-out connection wrapper.

use std::fmt;
use std::io;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, trace, warn};

use crate::connection::Connection;
use crate::error::{PoolError, PoolResult};
use crate::pool::PoolInner;

/// A connection checked out of a [`crate::Pool`]
///
/// Dereferences to the raw connection and forwards `AsyncRead`/`AsyncWrite`, so it can be
/// used wherever the raw connection could. [`PooledConnection::close`] returns it to the
/// pool instead of severing it, unless it was marked unusable first.
///
/// Dropping the wrapper without calling `close` releases it the same way, with any
/// required close running on the current tokio runtime.
pub struct PooledConnection<C: Connection> {
    conn: Option<C>,
    pool: Weak<PoolInner<C>>,
    unusable: RwLock<bool>,
}

impl<C: Connection> PooledConnection<C> {
    pub(crate) fn new(conn: C, pool: Weak<PoolInner<C>>) -> Self {
        Self {
            conn: Some(conn),
            pool,
            unusable: RwLock::new(false),
        }
    }

    /// Release the connection.
    ///
    /// Usable connections go back to the pool, or are closed if the pool is full or shut
    /// down. Unusable connections are closed and the close error, if any, is returned.
    pub async fn close(mut self) -> PoolResult<()> {
        let conn = self.conn.take();
        let pool = self.pool.upgrade();

        if self.is_unusable() {
            let Some(mut conn) = conn else {
                return Ok(());
            };
            debug!("closing connection marked unusable");
            let result = conn.close().await;
            if let Some(pool) = pool {
                pool.record_closed();
            }
            return result.map_err(PoolError::Close);
        }

        match pool {
            Some(pool) => pool.put(conn).await,
            None => {
                let mut conn = conn.ok_or(PoolError::NilConnection)?;
                trace!("owning pool is gone, closing connection");
                conn.close().await.map_err(PoolError::Close)
            }
        }
    }

    /// Mark the connection as broken so release closes it instead of recycling it
    pub fn mark_unusable(&self) {
        *self.unusable.write() = true;
    }

    /// Whether [`PooledConnection::mark_unusable`] was called
    pub fn is_unusable(&self) -> bool {
        *self.unusable.read()
    }

    /// Take the raw connection out of the pool's accounting for good
    pub fn into_inner(mut self) -> C {
        self.conn.take().expect("connection is present until released")
    }

    fn raw(&self) -> &C {
        self.conn.as_ref().expect("connection is present until released")
    }

    fn raw_mut(&mut self) -> &mut C {
        self.conn.as_mut().expect("connection is present until released")
    }
}

/// Close `conn` off the caller's path, since `Drop` cannot await
fn close_in_background<C: Connection>(pool: Option<Arc<PoolInner<C>>>, mut conn: C) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                let result = conn.close().await;
                if let Some(pool) = &pool {
                    pool.record_closed();
                }
                if let Err(e) = result {
                    warn!(error = %e, "failed to close released connection");
                }
            });
        }
        Err(_) => {
            trace!("no runtime available, dropping connection");
            if let Some(pool) = &pool {
                pool.record_closed();
            }
            drop(conn);
        }
    }
}

impl<C: Connection> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let pool = self.pool.upgrade();

        if *self.unusable.get_mut() {
            debug!("unusable connection dropped without close, discarding");
            close_in_background(pool, conn);
            return;
        }

        match pool {
            Some(pool) => {
                if let Err(rejected) = pool.try_store(conn) {
                    pool.record_rejected(rejected.pool_closed);
                    close_in_background(Some(pool), rejected.conn);
                } else {
                    trace!(pool_id = %pool.id(), "connection dropped, returned to pool");
                }
            }
            None => close_in_background(None, conn),
        }
    }
}

impl<C: Connection> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        self.raw()
    }
}

impl<C: Connection> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.raw_mut()
    }
}

impl<C: Connection + AsyncRead + Unpin> AsyncRead for PooledConnection<C> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(self.get_mut().raw_mut()).poll_read(cx, buf)
    }
}

impl<C: Connection + AsyncWrite + Unpin> AsyncWrite for PooledConnection<C> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(self.get_mut().raw_mut()).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(self.get_mut().raw_mut()).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(self.get_mut().raw_mut()).poll_shutdown(cx)
    }
}

impl<C: Connection + fmt::Debug> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn)
            .field("pool_alive", &(self.pool.strong_count() > 0))
            .field("unusable", &self.is_unusable())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, PoolConfig};
    use crate::error::BoxError;
    use crate::pool::Pool;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct FlakyConn {
        closes: Arc<AtomicUsize>,
        fail_close: bool,
    }

    #[async_trait]
    impl Connection for FlakyConn {
        async fn close(&mut self) -> io::Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "already broken"))
            } else {
                Ok(())
            }
        }
    }

    async fn flaky_pool(fail_close: bool, initial: usize) -> (Pool<FlakyConn>, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let shared = closes.clone();
        let factory = move |_config: ConnectionConfig| {
            let closes = shared.clone();
            async move { Ok::<_, BoxError>(FlakyConn { closes, fail_close }) }
        };
        let config = PoolConfig::builder(factory)
            .initial_capacity(initial)
            .max_capacity(2)
            .connection_configs((0..initial).map(|_| ConnectionConfig::tcp("127.0.0.1:7200")))
            .build()
            .unwrap();
        (Pool::new(config).await.unwrap(), closes)
    }

    #[tokio::test]
    async fn test_mark_unusable_flag() {
        let (pool, _) = flaky_pool(false, 1).await;
        let conn = pool.get(&ConnectionConfig::tcp("127.0.0.1:7200")).await.unwrap();

        assert!(!conn.is_unusable());
        conn.mark_unusable();
        assert!(conn.is_unusable());
        conn.mark_unusable();
        assert!(conn.is_unusable());
    }

    #[tokio::test]
    async fn test_unusable_close_returns_close_error() {
        let (pool, closes) = flaky_pool(true, 1).await;
        let conn = pool.get(&ConnectionConfig::tcp("127.0.0.1:7200")).await.unwrap();

        conn.mark_unusable();
        let err = conn.close().await.unwrap_err();

        assert!(matches!(err, PoolError::Close(_)));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(pool.size(), 0);
    }

    #[tokio::test]
    async fn test_deref_reaches_raw_connection() {
        let (pool, _) = flaky_pool(false, 1).await;
        let mut conn = pool.get(&ConnectionConfig::tcp("127.0.0.1:7200")).await.unwrap();

        assert!(!conn.fail_close);
        conn.fail_close = true;
        assert!(conn.fail_close);
    }

    #[tokio::test]
    async fn test_drop_returns_connection_to_pool() {
        let (pool, closes) = flaky_pool(false, 1).await;
        {
            let _conn = pool.get(&ConnectionConfig::tcp("127.0.0.1:7200")).await.unwrap();
            assert_eq!(pool.size(), 0);
        }

        assert_eq!(pool.size(), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_drop_unusable_closes_in_background() {
        let (pool, closes) = flaky_pool(false, 1).await;
        {
            let conn = pool.get(&ConnectionConfig::tcp("127.0.0.1:7200")).await.unwrap();
            conn.mark_unusable();
        }

        for _ in 0..10 {
            if closes.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(pool.size(), 0);
    }

    async fn wait_for_closes(closes: &AtomicUsize, expected: usize) {
        for _ in 0..10 {
            if closes.load(Ordering::SeqCst) >= expected {
                break;
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_drop_into_full_store_closes_in_background() {
        let (pool, closes) = flaky_pool(false, 2).await;
        let config = ConnectionConfig::tcp("127.0.0.1:7200");
        {
            let _first = pool.get(&config).await.unwrap();
            let _second = pool.get(&config).await.unwrap();
            let _third = pool.get(&config).await.unwrap();
            assert_eq!(pool.size(), 0);
        }

        wait_for_closes(&closes, 1).await;
        assert_eq!(pool.size(), 2);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().returns_rejected, 1);
    }

    #[tokio::test]
    async fn test_drop_after_shutdown_closes_connection() {
        let (pool, closes) = flaky_pool(false, 1).await;
        let conn = pool.get(&ConnectionConfig::tcp("127.0.0.1:7200")).await.unwrap();

        pool.close().await.unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 0);
        drop(conn);

        wait_for_closes(&closes, 1).await;
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(pool.size(), 0);
        assert!(pool.is_closed());
    }

    #[tokio::test]
    async fn test_close_after_pool_dropped() {
        let (pool, closes) = flaky_pool(false, 1).await;
        let conn = pool.get(&ConnectionConfig::tcp("127.0.0.1:7200")).await.unwrap();
        drop(pool);

        conn.close().await.unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_into_inner_detaches() {
        let (pool, closes) = flaky_pool(false, 1).await;
        let conn = pool.get(&ConnectionConfig::tcp("127.0.0.1:7200")).await.unwrap();

        let raw = conn.into_inner();

        assert!(!raw.fail_close);
        assert_eq!(pool.size(), 0);
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_debug_reports_state() {
        let (pool, _) = flaky_pool(false, 1).await;
        let conn = pool.get(&ConnectionConfig::tcp("127.0.0.1:7200")).await.unwrap();
        conn.mark_unusable();

        let debug_str = format!("{conn:?}");
        assert!(debug_str.contains("PooledConnection"));
        assert!(debug_str.contains("unusable: true"));
        assert!(debug_str.contains("pool_alive: true"));
    }
}
