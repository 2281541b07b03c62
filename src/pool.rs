//! Fixed-capacity pool of reusable byte buffers.
//!
//! Connections lease their receive and send buffers from here instead of
//! allocating per request, which keeps the heap flat on small devices.
//! The pool is shared between workers behind an `Arc`; lease bookkeeping
//! sits behind a single mutex.

use std::ops::{Deref, DerefMut};

use bytes::BytesMut;
use parking_lot::Mutex;

use crate::error::{Error, Result};

pub const DEFAULT_POOL_SIZE: usize = 50;
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// Utilisation (percent) above which the pool logs a warning.
const UTILIZATION_WARNING_PERCENT: usize = 80;

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub total: usize,
    pub in_use: usize,
    /// Successful `get` calls
    pub hits: u64,
    /// `get` calls that found the pool exhausted
    pub misses: u64,
    pub peak_in_use: usize,
    pub utilization_percent: usize,
}

/// A buffer checked out of a [`BufferPool`].
///
/// Hand it back with [`BufferPool::release`]. Dropping a lease without
/// releasing it keeps its slot marked as in use until the next `cleanup`.
#[derive(Debug)]
pub struct BufferLease {
    slot: usize,
    generation: u64,
    buf: BytesMut,
}

impl BufferLease {
    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl Deref for BufferLease {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        &self.buf
    }
}

impl DerefMut for BufferLease {
    fn deref_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }
}

#[derive(Debug)]
struct Slot {
    buf: Option<BytesMut>,
    in_use: bool,
}

#[derive(Debug, Default)]
struct PoolInner {
    slots: Vec<Slot>,
    initialized: bool,
    /// Bumped by every init so leases from before a cleanup are recognised
    generation: u64,
    hits: u64,
    misses: u64,
    peak_in_use: usize,
}

impl PoolInner {
    fn in_use(&self) -> usize {
        self.slots.iter().filter(|s| s.in_use).count()
    }
}

#[derive(Debug)]
pub struct BufferPool {
    capacity: usize,
    buffer_size: usize,
    inner: Mutex<PoolInner>,
}

impl BufferPool {
    /// Creates an uninitialised pool; call [`init`](Self::init) before use.
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        Self {
            capacity,
            buffer_size,
            inner: Mutex::new(PoolInner::default()),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().initialized
    }

    /// Allocates every buffer. A second call without `cleanup` is a no-op.
    pub fn init(&self) -> Result<()> {
        if self.capacity == 0 || self.buffer_size == 0 {
            return Err(Error::InvalidArgument(
                "buffer pool needs a non-zero size".to_string(),
            ));
        }

        let mut inner = self.inner.lock();
        if inner.initialized {
            tracing::debug!("Buffer pool already initialized");
            return Ok(());
        }

        inner.slots = (0..self.capacity)
            .map(|_| Slot {
                buf: Some(BytesMut::with_capacity(self.buffer_size)),
                in_use: false,
            })
            .collect();
        inner.initialized = true;
        inner.generation += 1;
        inner.hits = 0;
        inner.misses = 0;
        inner.peak_in_use = 0;

        tracing::info!(
            buffers = self.capacity,
            buffer_size = self.buffer_size,
            "Buffer pool initialized"
        );
        Ok(())
    }

    /// Leases a free buffer, or fails with `ResourceExhausted`.
    pub fn get(&self) -> Result<BufferLease> {
        let mut inner = self.inner.lock();
        if !inner.initialized {
            return Err(Error::Internal("buffer pool not initialized".to_string()));
        }

        let Some(slot) = inner.slots.iter().position(|s| !s.in_use) else {
            inner.misses += 1;
            tracing::warn!(total = self.capacity, "Buffer pool exhausted");
            return Err(Error::ResourceExhausted("buffer pool exhausted".to_string()));
        };

        let buffer_size = self.buffer_size;
        let entry = &mut inner.slots[slot];
        entry.in_use = true;
        let buf = entry
            .buf
            .take()
            .unwrap_or_else(|| BytesMut::with_capacity(buffer_size));

        inner.hits += 1;
        let in_use = inner.in_use();
        let before = (in_use - 1) * 100 / self.capacity;
        let after = in_use * 100 / self.capacity;
        if before < UTILIZATION_WARNING_PERCENT && after >= UTILIZATION_WARNING_PERCENT {
            tracing::warn!(in_use, total = self.capacity, "Buffer pool utilization high");
        }
        inner.peak_in_use = inner.peak_in_use.max(in_use);

        Ok(BufferLease {
            slot,
            generation: inner.generation,
            buf,
        })
    }

    /// Returns a leased buffer to the pool.
    ///
    /// Fails when the pool is not initialised or the lease does not belong to
    /// the current generation of the pool.
    pub fn release(&self, lease: BufferLease) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.initialized {
            return Err(Error::InvalidArgument(
                "release to an uninitialized buffer pool".to_string(),
            ));
        }
        if lease.generation != inner.generation {
            return Err(Error::InvalidArgument(
                "buffer was not leased from this pool".to_string(),
            ));
        }

        let Some(entry) = inner.slots.get_mut(lease.slot).filter(|s| s.in_use) else {
            return Err(Error::InvalidArgument(
                "buffer is not currently leased".to_string(),
            ));
        };

        let mut buf = lease.buf;
        buf.clear();
        // a buffer that grew for a large body is not kept around
        if buf.capacity() > self.buffer_size * 2 {
            buf = BytesMut::with_capacity(self.buffer_size);
        }
        entry.buf = Some(buf);
        entry.in_use = false;
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        let total = inner.slots.len();
        let in_use = inner.in_use();
        PoolStats {
            total,
            in_use,
            hits: inner.hits,
            misses: inner.misses,
            peak_in_use: inner.peak_in_use,
            utilization_percent: if total == 0 { 0 } else { in_use * 100 / total },
        }
    }

    /// Drops every buffer, leased or not. Outstanding leases become stale.
    pub fn cleanup(&self) {
        let mut inner = self.inner.lock();
        if !inner.initialized {
            return;
        }
        let leased = inner.in_use();
        inner.slots.clear();
        inner.initialized = false;
        tracing::info!(leased, "Buffer pool cleaned up");
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE, DEFAULT_BUFFER_SIZE)
    }
}
