//! # netpool
//!
//! A bounded pool of reusable network connections.
//!
//! The pool keeps up to `max_capacity` idle connections, seeds `initial_capacity` of them
//! eagerly, and dials more on demand when the idle store is empty. Connections are handed
//! out as [`PooledConnection`] wrappers whose `close` returns the connection to the pool
//! instead of severing it.
//!
//! ## Module Organization
//!
//! ```text
//! netpool/
//! ├── config/         # Pool and connection configuration, builder, settings
//! ├── connection/     # Connection and factory traits
//! ├── error/          # Error types
//! ├── pool/           # Bootstrap, acquire, release, shutdown
//! ├── pooled/         # Checked-out connection wrapper
//! ├── stats/          # Pool statistics
//! └── tcp/            # TCP connection factory
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use netpool::{ConnectionConfig, Pool, PoolConfig, TcpConnector};
//!
//! # async fn run() -> netpool::PoolResult<()> {
//! let seeds = ["127.0.0.1:6379", "127.0.0.1:6379"].map(ConnectionConfig::tcp);
//! let config = PoolConfig::builder(TcpConnector::new())
//!     .initial_capacity(2)
//!     .max_capacity(8)
//!     .connection_configs(seeds)
//!     .build()?;
//!
//! let pool = Pool::new(config).await?;
//! let conn = pool.get(&ConnectionConfig::tcp("127.0.0.1:6379")).await?;
//! // use conn as a TcpStream...
//! conn.close().await?;
//!
//! pool.close().await?;
//! # Ok(())
//! # }
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,  // Error documentation in progress
    clippy::cast_precision_loss,  // Intentional for f64 ratios
    clippy::must_use_candidate,  // Too pedantic for library APIs
    clippy::return_self_not_must_use,  // Constructor methods don't need must_use
    clippy::missing_panics_doc  // Panic docs added where genuinely needed
)]

pub mod config;
pub mod connection;
pub mod error;
pub mod pool;
pub mod pooled;
pub mod stats;

#[cfg(feature = "tcp")]
pub mod tcp;

pub use config::{ConnectionConfig, PoolConfig, PoolConfigBuilder, PoolSettings, PreConnectHook};
pub use connection::{Connection, ConnectionFactory};
pub use error::{BoxError, PoolError, PoolResult};
pub use pool::Pool;
pub use pooled::PooledConnection;
pub use stats::PoolStats;

#[cfg(feature = "tcp")]
pub use tcp::{TcpConnector, TcpConnectorConfig};
