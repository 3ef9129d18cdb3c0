//! Pool error types.

use std::io;

use thiserror::Error;

/// Boxed error returned by caller-supplied factories and hooks
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for pool operations
pub type PoolResult<T> = std::result::Result<T, PoolError>;

/// Errors that can occur in pool operations
#[derive(Error, Debug)]
pub enum PoolError {
    /// Capacity bounds are inconsistent
    #[error("Invalid capacity: initial {initial} with max {max} (need 0 <= initial <= max and max > 0)")]
    InvalidCapacity {
        /// Requested number of seed connections
        initial: usize,
        /// Requested idle store capacity
        max: usize,
    },

    /// Fewer seed configurations than seed connections
    #[error("Bootstrap needs {required} connection configs but only {provided} were provided")]
    InsufficientConnectionConfigs {
        /// Number of configs bootstrap will index
        required: usize,
        /// Number of configs supplied
        provided: usize,
    },

    /// The connection factory failed
    #[error("Connection factory failed: {0}")]
    Factory(#[source] BoxError),

    /// A pre-connect hook rejected the connection config
    #[error("Pre-connect hook failed: {0}")]
    Hook(#[source] BoxError),

    /// The pool has been shut down
    #[error("Pool is closed")]
    PoolClosed,

    /// A release was attempted without a connection
    #[error("Connection is missing, rejecting release")]
    NilConnection,

    /// Closing a raw connection failed
    #[error("Failed to close connection: {0}")]
    Close(#[source] io::Error),

    /// One or more connections failed to close while draining the pool
    #[error("Failed to close {} connection(s) while draining the pool", .0.len())]
    Drain(Vec<io::Error>),
}

impl PoolError {
    /// Whether this error means the pool was shut down
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::PoolClosed)
    }

    /// Whether this error came from the connection factory
    pub fn is_factory(&self) -> bool {
        matches!(self, Self::Factory(_))
    }
}
