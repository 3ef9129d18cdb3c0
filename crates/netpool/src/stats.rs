//! Pool statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Snapshot of a pool's counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Total connections dialed by the factory
    pub connections_created: u64,

    /// Total connections closed by the pool
    pub connections_closed: u64,

    /// Total successful acquisitions
    pub total_acquires: u64,

    /// Acquisitions served from the idle store
    pub idle_hits: u64,

    /// Releases that went back into the idle store
    pub total_returns: u64,

    /// Releases closed because the store was full or the pool was shut down
    pub returns_rejected: u64,

    /// Idle connections at snapshot time
    pub idle_connections: usize,

    /// Capacity of the idle store
    pub max_capacity: usize,

    /// Whether the pool has been shut down
    pub closed: bool,
}

impl PoolStats {
    /// Share of acquisitions served without dialing, 0.0 to 1.0
    pub fn hit_ratio(&self) -> f64 {
        if self.total_acquires == 0 {
            0.0
        } else {
            self.idle_hits as f64 / self.total_acquires as f64
        }
    }
}

/// Live counters, updated lock-free
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    created: AtomicU64,
    closed: AtomicU64,
    acquires: AtomicU64,
    idle_hits: AtomicU64,
    returns: AtomicU64,
    rejected: AtomicU64,
}

impl PoolCounters {
    pub(crate) fn record_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_closed(&self) {
        self.closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_acquire(&self, from_idle: bool) {
        self.acquires.fetch_add(1, Ordering::Relaxed);
        if from_idle {
            self.idle_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_return(&self) {
        self.returns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, idle_connections: usize, max_capacity: usize, closed: bool) -> PoolStats {
        PoolStats {
            connections_created: self.created.load(Ordering::Relaxed),
            connections_closed: self.closed.load(Ordering::Relaxed),
            total_acquires: self.acquires.load(Ordering::Relaxed),
            idle_hits: self.idle_hits.load(Ordering::Relaxed),
            total_returns: self.returns.load(Ordering::Relaxed),
            returns_rejected: self.rejected.load(Ordering::Relaxed),
            idle_connections,
            max_capacity,
            closed,
        }
    }
}
