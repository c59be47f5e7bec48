// =============================================================================
// pool.rs - THE CONNECTION POOL
// =============================================================================
//
// A bounded set of reusable upstream handles.
//
//   * Capacity is a semaphore. `acquire()` waits for a slot; the caller puts
//     its own timeout around that wait.
//   * A checked-out handle is a `PooledConnection` guard. It ends in exactly
//     one of two ways: `release()` puts it back on the idle list, `discard()`
//     throws it away. Both consume the guard, so a handle cannot be returned
//     twice. Dropping the guard without either (the fetch was cancelled or
//     timed out mid-flight) discards it, because a half-read connection is
//     not something to hand to the next caller.
//   * Idle handles that are too old, or that the transport says are unusable,
//     are dropped at checkout and replaced by fresh ones. The caller never
//     hears about it.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use portable_atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::transport::{Transport, TransportFailure};

struct IdleConn<C> {
    id: u64,
    conn: C,
    idle_since: Instant,
    uses: u64,
}

type IdleList<C> = Arc<Mutex<Vec<IdleConn<C>>>>;

/// Counters for pool behaviour.
#[derive(Debug, Default)]
pub struct PoolStats {
    pub checkouts: AtomicU64,
    pub created: AtomicU64,
    pub reused: AtomicU64,
    pub released: AtomicU64,
    pub discarded: AtomicU64,
    /// Handles dropped at checkout for being stale or unusable.
    pub evicted: AtomicU64,
    pub in_use: AtomicUsize,
    pub peak_in_use: AtomicUsize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolSnapshot {
    pub capacity: usize,
    pub idle: usize,
    pub in_use: usize,
    pub peak_in_use: usize,
    pub checkouts: u64,
    pub created: u64,
    pub reused: u64,
    pub released: u64,
    pub discarded: u64,
    pub evicted: u64,
}

pub struct ConnectionPool<T: Transport> {
    transport: Arc<T>,
    slots: Arc<Semaphore>,
    idle: IdleList<T::Conn>,
    capacity: usize,
    idle_timeout: Duration,
    next_id: AtomicU64,
    stats: Arc<PoolStats>,
}

impl<T: Transport> ConnectionPool<T> {
    pub fn new(transport: Arc<T>, capacity: usize, idle_timeout: Duration) -> Self {
        let capacity = capacity.max(1);
        debug!(capacity = capacity, idle_timeout_secs = idle_timeout.as_secs(), "Connection pool created");
        Self {
            transport,
            slots: Arc::new(Semaphore::new(capacity)),
            idle: Arc::new(Mutex::new(Vec::with_capacity(capacity))),
            capacity,
            idle_timeout,
            next_id: AtomicU64::new(1),
            stats: Arc::new(PoolStats::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Check out a handle, waiting for a free slot if all are in use.
    ///
    /// Only fails if a brand new handle cannot be created.
    pub async fn acquire(&self) -> Result<PooledConnection<T::Conn>, TransportFailure> {
        self.checkout(true).await
    }

    /// Like `acquire`, but never hands out an idle handle.
    pub async fn acquire_fresh(&self) -> Result<PooledConnection<T::Conn>, TransportFailure> {
        self.checkout(false).await
    }

    async fn checkout(&self, allow_reuse: bool) -> Result<PooledConnection<T::Conn>, TransportFailure> {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| TransportFailure::Connection("connection pool closed".into()))?;

        let reusable = if allow_reuse { self.take_idle() } else { None };

        let (id, conn, uses, reused) = match reusable {
            Some(idle) => {
                self.stats.reused.fetch_add(1, Ordering::Relaxed);
                (idle.id, idle.conn, idle.uses, true)
            }
            None => {
                let conn = self.transport.connect()?;
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                self.stats.created.fetch_add(1, Ordering::Relaxed);
                trace!(conn_id = id, "Opened new upstream handle");
                (id, conn, 0, false)
            }
        };

        self.stats.checkouts.fetch_add(1, Ordering::Relaxed);
        let now_in_use = self.stats.in_use.fetch_add(1, Ordering::AcqRel) + 1;
        self.stats.peak_in_use.fetch_max(now_in_use, Ordering::AcqRel);

        Ok(PooledConnection {
            id,
            conn: Some(conn),
            uses: uses + 1,
            reused,
            home: Arc::clone(&self.idle),
            stats: Arc::clone(&self.stats),
            _slot: slot,
        })
    }

    /// Pop the most recently returned handle that is still fit for reuse,
    /// evicting any stale ones found on the way.
    fn take_idle(&self) -> Option<IdleConn<T::Conn>> {
        let mut idle = self.idle.lock();
        while let Some(candidate) = idle.pop() {
            let stale = candidate.idle_since.elapsed() >= self.idle_timeout;
            if stale || !self.transport.is_reusable(&candidate.conn) {
                self.stats.evicted.fetch_add(1, Ordering::Relaxed);
                debug!(conn_id = candidate.id, stale = stale, "Evicting idle upstream handle");
                continue;
            }
            return Some(candidate);
        }
        None
    }

    pub fn stats(&self) -> &Arc<PoolStats> {
        &self.stats
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            capacity: self.capacity,
            idle: self.idle.lock().len(),
            in_use: self.stats.in_use.load(Ordering::Relaxed),
            peak_in_use: self.stats.peak_in_use.load(Ordering::Relaxed),
            checkouts: self.stats.checkouts.load(Ordering::Relaxed),
            created: self.stats.created.load(Ordering::Relaxed),
            reused: self.stats.reused.load(Ordering::Relaxed),
            released: self.stats.released.load(Ordering::Relaxed),
            discarded: self.stats.discarded.load(Ordering::Relaxed),
            evicted: self.stats.evicted.load(Ordering::Relaxed),
        }
    }
}

/// A checked-out handle. Holds a pool slot until it is released, discarded
/// or dropped.
pub struct PooledConnection<C: Send + 'static> {
    id: u64,
    conn: Option<C>,
    uses: u64,
    reused: bool,
    home: IdleList<C>,
    stats: Arc<PoolStats>,
    _slot: OwnedSemaphorePermit,
}

impl<C: Send + 'static> PooledConnection<C> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True when this handle has served an earlier fetch.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    pub fn conn(&self) -> &C {
        // Only `release`/`discard` take the handle out, and both consume self.
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after release"),
        }
    }

    /// Return the handle for reuse.
    pub fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            trace!(conn_id = self.id, uses = self.uses, "Returning upstream handle to pool");
            self.home.lock().push(IdleConn {
                id: self.id,
                conn,
                idle_since: Instant::now(),
                uses: self.uses,
            });
            self.stats.released.fetch_add(1, Ordering::Relaxed);
            self.stats.in_use.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Throw the handle away. The slot frees up; the next checkout opens a
    /// fresh handle.
    pub fn discard(mut self) {
        self.drop_conn();
    }

    fn drop_conn(&mut self) {
        if self.conn.take().is_some() {
            trace!(conn_id = self.id, "Discarding upstream handle");
            self.stats.discarded.fetch_add(1, Ordering::Relaxed);
            self.stats.in_use.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl<C: Send + 'static> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        self.drop_conn();
    }
}
