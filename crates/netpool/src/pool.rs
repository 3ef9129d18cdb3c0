//! Connection pool lifecycle: bootstrap, acquire, release, shutdown.

use std::fmt;
use std::io;
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::{ConnectionConfig, PoolConfig};
use crate::connection::{Connection, ConnectionFactory};
use crate::error::{PoolError, PoolResult};
use crate::pooled::PooledConnection;
use crate::stats::{PoolCounters, PoolStats};

/// Bounded pool of reusable connections
///
/// Idle connections live in a fixed-capacity queue. [`Pool::get`] hands out an idle
/// connection when one is available and otherwise dials a fresh one, so callers may hold
/// more than `max_capacity` connections at once. Releasing a connection through
/// [`PooledConnection::close`] puts it back when there is room and closes it otherwise.
///
/// `Pool` is a cheap handle; clones share the same store.
/// Dropping the last handle without [`Pool::close`] drops idle connections without calling
/// [`Connection::close`] on them.
pub struct Pool<C: Connection> {
    inner: Arc<PoolInner<C>>,
}

/// Shared pool state, also reachable from outstanding [`PooledConnection`]s
pub(crate) struct PoolInner<C: Connection> {
    id: String,
    max_capacity: usize,
    state: Mutex<PoolState<C>>,
    counters: PoolCounters,
}

/// Store and factory references. `idle == None` marks a shut-down pool.
struct PoolState<C> {
    idle: Option<Arc<ArrayQueue<C>>>,
    factory: Option<Arc<dyn ConnectionFactory<C>>>,
}

/// A connection the idle store would not take back
pub(crate) struct Rejected<C> {
    pub(crate) conn: C,
    pub(crate) pool_closed: bool,
}

async fn dial<C: Connection>(
    factory: &dyn ConnectionFactory<C>,
    config: &ConnectionConfig,
) -> PoolResult<C> {
    let prepared = config.prepare()?;
    factory
        .connect(&prepared)
        .await
        .map_err(PoolError::Factory)
}

impl<C: Connection> Pool<C> {
    /// Bootstrap a pool, dialing `initial_capacity` seed connections.
    ///
    /// If any seed dial fails the connections created so far are closed and the factory
    /// error is returned.
    pub async fn new(config: PoolConfig<C>) -> PoolResult<Self> {
        config.validate()?;

        let id = Uuid::new_v4().to_string();
        let idle: ArrayQueue<C> = ArrayQueue::new(config.max_capacity);
        let counters = PoolCounters::default();

        let seeds = config
            .connection_configs
            .iter()
            .take(config.initial_capacity)
            .enumerate();

        for (index, conn_config) in seeds {
            if config.debug_mode {
                info!(pool_id = %id, index, host_port = conn_config.host_port(), "initializing connection");
            }

            let conn = match dial(config.factory.as_ref(), conn_config).await {
                Ok(conn) => conn,
                Err(err) => {
                    warn!(pool_id = %id, index, error = %err, "factory is not able to fill the pool");
                    while let Some(mut seeded) = idle.pop() {
                        if let Err(e) = seeded.close().await {
                            warn!(pool_id = %id, error = %e, "failed to close seed connection");
                        }
                    }
                    return Err(err);
                }
            };
            counters.record_created();

            if config.debug_mode {
                info!(pool_id = %id, index, host_port = conn_config.host_port(), "initialized connection");
            }

            // initial_capacity <= max_capacity, the store always has room here
            if let Err(mut extra) = idle.push(conn) {
                if let Err(e) = extra.close().await {
                    warn!(pool_id = %id, index, error = %e, "failed to close surplus seed connection");
                }
                counters.record_closed();
            }
        }

        info!(
            pool_id = %id,
            initial = config.initial_capacity,
            max = config.max_capacity,
            "connection pool created"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                id,
                max_capacity: config.max_capacity,
                state: Mutex::new(PoolState {
                    idle: Some(Arc::new(idle)),
                    factory: Some(config.factory),
                }),
                counters,
            }),
        })
    }

    /// Acquire a connection.
    ///
    /// Returns an idle connection when one is available. Otherwise dials a new one with
    /// `config`. Never waits for another caller to release.
    pub async fn get(&self, config: &ConnectionConfig) -> PoolResult<PooledConnection<C>> {
        let (idle, factory) = self.inner.handles()?;

        if let Some(conn) = idle.pop() {
            self.inner.counters.record_acquire(true);
            trace!(pool_id = %self.inner.id, idle = idle.len(), "acquired idle connection");
            return Ok(self.wrap(conn));
        }
        drop(idle);

        debug!(
            pool_id = %self.inner.id,
            host_port = config.host_port(),
            "idle store empty, dialing new connection"
        );
        let conn = dial(factory.as_ref(), config).await?;
        self.inner.counters.record_created();
        self.inner.counters.record_acquire(false);

        Ok(self.wrap(conn))
    }

    /// Shut the pool down and close every idle connection.
    ///
    /// Connections checked out at this point are closed when released. Calling this
    /// again is a no-op.
    pub async fn close(&self) -> PoolResult<()> {
        let idle = {
            let mut state = self.inner.state.lock();
            state.factory = None;
            state.idle.take()
        };

        let Some(idle) = idle else {
            debug!(pool_id = %self.inner.id, "pool already closed");
            return Ok(());
        };

        let mut drained = 0usize;
        let mut errors = Vec::new();
        while let Some(conn) = idle.pop() {
            drained += 1;
            if let Err(e) = self.inner.close_connection(conn).await {
                warn!(pool_id = %self.inner.id, error = %e, "failed to close idle connection");
                errors.push(e);
            }
        }

        info!(
            pool_id = %self.inner.id,
            drained,
            failed = errors.len(),
            "connection pool closed"
        );

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PoolError::Drain(errors))
        }
    }

    /// Number of idle connections in the store. Zero once closed.
    pub fn size(&self) -> usize {
        self.inner
            .state
            .lock()
            .idle
            .as_ref()
            .map_or(0, |idle| idle.len())
    }

    /// Whether the store holds no idle connections
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Whether [`Pool::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().idle.is_none()
    }

    /// Pool identifier
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Capacity of the idle store
    pub fn max_capacity(&self) -> usize {
        self.inner.max_capacity
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        let (idle, closed) = {
            let state = self.inner.state.lock();
            (
                state.idle.as_ref().map_or(0, |idle| idle.len()),
                state.idle.is_none(),
            )
        };
        self.inner
            .counters
            .snapshot(idle, self.inner.max_capacity, closed)
    }

    fn wrap(&self, conn: C) -> PooledConnection<C> {
        PooledConnection::new(conn, Arc::downgrade(&self.inner))
    }
}

impl<C: Connection> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Connection> fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.inner.id)
            .field("max_capacity", &self.inner.max_capacity)
            .field("size", &self.size())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<C: Connection> PoolInner<C> {
    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    fn handles(&self) -> PoolResult<(Arc<ArrayQueue<C>>, Arc<dyn ConnectionFactory<C>>)> {
        let state = self.state.lock();
        match (&state.idle, &state.factory) {
            (Some(idle), Some(factory)) => Ok((idle.clone(), factory.clone())),
            _ => Err(PoolError::PoolClosed),
        }
    }

    /// Push `conn` back into the idle store without blocking.
    ///
    /// The push happens under the pool lock so it cannot land in a store that
    /// [`Pool::close`] has already captured for draining.
    pub(crate) fn try_store(&self, conn: C) -> Result<(), Rejected<C>> {
        let state = self.state.lock();
        let Some(idle) = state.idle.as_ref() else {
            return Err(Rejected {
                conn,
                pool_closed: true,
            });
        };

        match idle.push(conn) {
            Ok(()) => {
                self.counters.record_return();
                trace!(pool_id = %self.id, idle = idle.len(), "connection returned to pool");
                Ok(())
            }
            Err(conn) => Err(Rejected {
                conn,
                pool_closed: false,
            }),
        }
    }

    /// Release a connection: recycle it, or close it when the store is full or closed
    pub(crate) async fn put(&self, conn: Option<C>) -> PoolResult<()> {
        let conn = conn.ok_or(PoolError::NilConnection)?;

        match self.try_store(conn) {
            Ok(()) => Ok(()),
            Err(rejected) => {
                self.record_rejected(rejected.pool_closed);
                self.close_connection(rejected.conn)
                    .await
                    .map_err(PoolError::Close)
            }
        }
    }

    pub(crate) fn record_rejected(&self, pool_closed: bool) {
        self.counters.record_rejected();
        if pool_closed {
            debug!(pool_id = %self.id, "pool is closed, closing released connection");
        } else {
            debug!(pool_id = %self.id, "pool is full, closing released connection");
        }
    }

    pub(crate) fn record_closed(&self) {
        self.counters.record_closed();
    }

    pub(crate) async fn close_connection(&self, mut conn: C) -> io::Result<()> {
        let result = conn.close().await;
        self.counters.record_closed();
        result
    }
}
