//! Output Buffer Pools
//!
//! Every message written to a channel first takes a buffer from that channel's
//! pool and gives it back once the writer has pushed it to the socket. The pool
//! bounds how many encoded messages may be in flight:
//!
//! ```text
//!   capacity = min(max_num_buffers, guaranteed + free shared buffers)
//! ```
//!
//! Guaranteed buffers belong to the channel. Server channels may borrow above
//! their guarantee from a [`SharedBufferPool`] owned by the server. When the
//! pool is exhausted, [`Backpressure::Reject`] fails immediately and
//! [`Backpressure::Block`] waits for a release; neither drops the message.

use crate::{Result, TransportError};
use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Shared buffers may be freed by another channel; waiters re-check this often
const SHARED_RECHECK: Duration = Duration::from_millis(10);

/// What a writer does when no buffer is free
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backpressure {
    /// Wait for a release; `None` waits indefinitely
    Block(Option<Duration>),
    /// Fail with a resource-exhausted error
    Reject,
}

/// Pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub guaranteed: usize,
    pub max: usize,
    pub in_use: usize,
    pub shared_in_use: usize,
    pub peak_in_use: usize,
}

struct SharedState {
    capacity: usize,
    in_use: usize,
    peak: usize,
}

/// Server-wide pool that channels borrow from above their guarantee
#[derive(Clone)]
pub struct SharedBufferPool {
    state: Arc<Mutex<SharedState>>,
}

impl SharedBufferPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(SharedState {
                capacity,
                in_use: 0,
                peak: 0,
            })),
        }
    }

    /// Resize; buffers already borrowed stay borrowed
    pub fn set_capacity(&self, capacity: usize) {
        self.state.lock().capacity = capacity;
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    pub fn in_use(&self) -> usize {
        self.state.lock().in_use
    }

    pub fn peak(&self) -> usize {
        self.state.lock().peak
    }

    pub fn reset_peak(&self) {
        let mut state = self.state.lock();
        state.peak = state.in_use;
    }

    fn available(&self) -> usize {
        let state = self.state.lock();
        state.capacity.saturating_sub(state.in_use)
    }

    fn try_take(&self) -> bool {
        let mut state = self.state.lock();
        if state.in_use < state.capacity {
            state.in_use += 1;
            state.peak = state.peak.max(state.in_use);
            true
        } else {
            false
        }
    }

    fn give_back(&self) {
        let mut state = self.state.lock();
        state.in_use = state.in_use.saturating_sub(1);
    }
}

struct PoolState {
    guaranteed: usize,
    max: usize,
    guaranteed_in_use: usize,
    shared_in_use: usize,
    peak: usize,
}

impl PoolState {
    fn in_use(&self) -> usize {
        self.guaranteed_in_use + self.shared_in_use
    }
}

struct PoolInner {
    name: String,
    state: Mutex<PoolState>,
    released: Condvar,
    shared: Option<SharedBufferPool>,
}

/// Output buffers of one channel
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    pub fn new(name: impl Into<String>, guaranteed: usize, max: usize) -> Self {
        Self::build(name.into(), guaranteed, max, None)
    }

    /// Pool that borrows from `shared` once its guarantee is used up
    pub fn with_shared(
        name: impl Into<String>,
        guaranteed: usize,
        max: usize,
        shared: SharedBufferPool,
    ) -> Self {
        Self::build(name.into(), guaranteed, max, Some(shared))
    }

    fn build(name: String, guaranteed: usize, max: usize, shared: Option<SharedBufferPool>) -> Self {
        let guaranteed = guaranteed.max(1);
        Self {
            inner: Arc::new(PoolInner {
                name,
                state: Mutex::new(PoolState {
                    guaranteed,
                    max: max.max(guaranteed),
                    guaranteed_in_use: 0,
                    shared_in_use: 0,
                    peak: 0,
                }),
                released: Condvar::new(),
                shared,
            }),
        }
    }

    /// Take a buffer for `data`, applying `mode` when none is free
    pub fn acquire(&self, data: Bytes, mode: Backpressure) -> Result<PoolBuffer> {
        let deadline = match mode {
            Backpressure::Block(Some(timeout)) => Some(Instant::now() + timeout),
            _ => None,
        };
        let mut state = self.inner.state.lock();
        loop {
            if let Some(from_shared) = self.take_slot(&mut state) {
                trace!(pool = %self.inner.name, in_use = state.in_use(), "Buffer acquired");
                return Ok(PoolBuffer {
                    data,
                    pool: Arc::clone(&self.inner),
                    from_shared,
                });
            }
            match mode {
                Backpressure::Reject => {
                    return Err(self.exhausted(&state));
                }
                Backpressure::Block(_) => {
                    let wait = match deadline {
                        Some(deadline) => {
                            let now = Instant::now();
                            if now >= deadline {
                                return Err(self.exhausted(&state));
                            }
                            (deadline - now).min(SHARED_RECHECK)
                        }
                        None => SHARED_RECHECK,
                    };
                    debug!(pool = %self.inner.name, in_use = state.in_use(), "Waiting for an output buffer");
                    let _ = self.inner.released.wait_for(&mut state, wait);
                }
            }
        }
    }

    fn take_slot(&self, state: &mut PoolState) -> Option<bool> {
        if state.in_use() >= state.max {
            return None;
        }
        let taken = if state.guaranteed_in_use < state.guaranteed {
            state.guaranteed_in_use += 1;
            Some(false)
        } else if self.inner.shared.as_ref().is_some_and(SharedBufferPool::try_take) {
            state.shared_in_use += 1;
            Some(true)
        } else {
            None
        };
        state.peak = state.peak.max(state.in_use());
        taken
    }

    fn exhausted(&self, state: &PoolState) -> TransportError {
        TransportError::resource_exhausted(
            format!("output buffers of {}", self.inner.name),
            format!(
                "{} of {} buffers in use ({} guaranteed)",
                state.in_use(),
                self.capacity_locked(state),
                state.guaranteed
            ),
        )
    }

    fn capacity_locked(&self, state: &PoolState) -> usize {
        let shared = self
            .inner
            .shared
            .as_ref()
            .map_or(0, |shared| shared.available() + state.shared_in_use);
        state.max.min(state.guaranteed + shared)
    }

    /// Buffers this channel could hold right now
    pub fn capacity(&self) -> usize {
        let state = self.inner.state.lock();
        self.capacity_locked(&state)
    }

    /// Change the guarantee; raises the maximum when it would fall below
    pub fn set_guaranteed(&self, guaranteed: usize) -> Result<usize> {
        if guaranteed == 0 {
            return Err(TransportError::configuration(
                "guaranteed buffers must be at least 1",
                Some("num_guaranteed_buffers"),
            ));
        }
        let mut state = self.inner.state.lock();
        state.guaranteed = guaranteed;
        state.max = state.max.max(guaranteed);
        self.inner.released.notify_all();
        Ok(state.guaranteed)
    }

    /// Change the maximum; never below the guarantee
    pub fn set_max(&self, max: usize) -> Result<usize> {
        if max == 0 {
            return Err(TransportError::configuration(
                "max buffers must be at least 1",
                Some("max_num_buffers"),
            ));
        }
        let mut state = self.inner.state.lock();
        state.max = max.max(state.guaranteed);
        self.inner.released.notify_all();
        Ok(state.max)
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            guaranteed: state.guaranteed,
            max: state.max,
            in_use: state.in_use(),
            shared_in_use: state.shared_in_use,
            peak_in_use: state.peak,
        }
    }
}

/// An encoded message holding one pool buffer until dropped
pub struct PoolBuffer {
    data: Bytes,
    pool: Arc<PoolInner>,
    from_shared: bool,
}

impl PoolBuffer {
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for PoolBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolBuffer")
            .field("pool", &self.pool.name)
            .field("len", &self.data.len())
            .field("from_shared", &self.from_shared)
            .finish()
    }
}

impl Drop for PoolBuffer {
    fn drop(&mut self) {
        let mut state = self.pool.state.lock();
        if self.from_shared {
            state.shared_in_use = state.shared_in_use.saturating_sub(1);
            if let Some(shared) = &self.pool.shared {
                shared.give_back();
            }
        } else {
            state.guaranteed_in_use = state.guaranteed_in_use.saturating_sub(1);
        }
        self.pool.released.notify_one();
    }
}
