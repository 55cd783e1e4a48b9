//! Per-channel state shared by submitters and the connection task
//!
//! Submissions take an output buffer from the channel's pool before they are
//! written, so a full pool blocks or rejects the submitter. Queued
//! submissions land in a FIFO drained by the connection task; direct writes
//! drain that FIFO themselves under the writer lock before writing, which
//! keeps per-channel order across both modes.

use crate::error::{ReactorError, Result};
use crate::event::{ChannelInfo, ChannelRole, ChannelState};
use bytes::Bytes;
use network::{
    Backpressure, BufferPool, ChannelId, ChannelMetrics, ChannelSettings, ChannelWriter,
    Negotiated, PoolBuffer,
};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::runtime::Handle as RuntimeHandle;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

/// Requests from the reactor API to a channel's task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Close,
    /// Try the preferred host now, optionally selecting a new one
    FallbackToPreferred(Option<usize>),
}

pub(crate) struct ChannelShared {
    pub id: ChannelId,
    pub name: String,
    pub role: ChannelRole,
    pub pool: BufferPool,
    pub settings: ChannelSettings,
    pub metrics: ChannelMetrics,
    backpressure: Backpressure,
    state: RwLock<ChannelState>,
    remote: RwLock<Option<(String, Negotiated)>>,
    connected: AtomicBool,
    link: tokio::sync::Mutex<Option<ChannelWriter>>,
    queue: Mutex<VecDeque<PoolBuffer>>,
    pub(crate) wake: Notify,
    commands: mpsc::UnboundedSender<Command>,
}

impl ChannelShared {
    pub fn new(
        id: ChannelId,
        name: String,
        role: ChannelRole,
        pool: BufferPool,
        settings: ChannelSettings,
        backpressure: Backpressure,
    ) -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        let shared = Self {
            id,
            name,
            role,
            pool,
            settings,
            metrics: ChannelMetrics::new(),
            backpressure,
            state: RwLock::new(ChannelState::Initializing),
            remote: RwLock::new(None),
            connected: AtomicBool::new(false),
            link: tokio::sync::Mutex::new(None),
            queue: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            commands,
        };
        (shared, receiver)
    }

    pub fn state(&self) -> ChannelState {
        *self.state.read()
    }

    pub fn set_state(&self, state: ChannelState) {
        let mut current = self.state.write();
        if *current != state {
            debug!(channel = %self.name, from = %*current, to = %state, "Channel state");
            *current = state;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn command(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn info(&self) -> ChannelInfo {
        let remote = self.remote.read();
        ChannelInfo {
            channel: self.id,
            name: self.name.clone(),
            role: self.role,
            state: self.state(),
            host: remote.as_ref().map(|(host, _)| host.clone()),
            peer_component: remote.as_ref().map(|(_, n)| n.peer_component.clone()),
            ping_timeout: remote.as_ref().map(|(_, n)| n.ping_timeout),
            compression_threshold: self.settings.compression_threshold(),
            buffers: self.pool.stats(),
            metrics: self.metrics.snapshot(),
        }
    }

    /// Install the writer of a fresh connection
    pub async fn attach(&self, writer: ChannelWriter, remote: String, negotiated: Negotiated) {
        *self.link.lock().await = Some(writer);
        *self.remote.write() = Some((remote, negotiated));
        self.connected.store(true, Ordering::Release);
        self.set_state(ChannelState::Up);
    }

    /// Drop the writer and every queued submission of the lost connection
    pub async fn detach(&self, state: ChannelState) {
        if state == ChannelState::Closed {
            if let Err(error) = self.drain().await {
                debug!(channel = %self.name, %error, "Final flush failed");
            }
        }
        self.connected.store(false, Ordering::Release);
        let writer = self.link.lock().await.take();
        let dropped = {
            let mut queue = self.queue.lock();
            let dropped = queue.len();
            queue.clear();
            dropped
        };
        if dropped > 0 {
            warn!(channel = %self.name, dropped, "Discarded writes queued for a lost connection");
        }
        if let Some(mut writer) = writer {
            if state == ChannelState::Closed {
                let _ = writer.shutdown().await;
            }
        }
        *self.remote.write() = None;
        self.set_state(state);
    }

    /// Hand an encoded message to the channel
    ///
    /// Blocks the calling thread when the pool is exhausted in blocking mode.
    /// `direct` writes on the calling thread; inside the runtime it falls back
    /// to the queue because blocking a worker on the writer lock could stall it.
    pub fn submit(&self, bytes: Bytes, direct: bool, runtime: &RuntimeHandle) -> Result<()> {
        if !self.is_connected() {
            return Err(ReactorError::channel_down(&self.name));
        }
        let buffer = self.pool.acquire(bytes, self.backpressure)?;
        let direct = (direct || self.settings.direct_write()) && RuntimeHandle::try_current().is_err();
        if direct {
            return runtime.block_on(self.write_direct(buffer));
        }
        self.queue.lock().push_back(buffer);
        self.wake.notify_one();
        Ok(())
    }

    async fn write_direct(&self, buffer: PoolBuffer) -> Result<()> {
        let mut link = self.link.lock().await;
        let Some(writer) = link.as_mut() else {
            return Err(ReactorError::channel_down(&self.name));
        };
        let started = Instant::now();
        let mut written = self.take_queued();
        written.push(buffer);
        let bytes = written.iter().map(PoolBuffer::len).sum();
        for buffer in &written {
            writer.push(buffer.data())?;
        }
        writer.flush().await?;
        self.metrics
            .record_flush(written.len() as u64, bytes, started.elapsed().as_nanos() as u64);
        Ok(())
    }

    fn take_queued(&self) -> Vec<PoolBuffer> {
        self.queue.lock().drain(..).collect()
    }

    /// Write queued submissions, flushing whenever the high water mark is passed
    pub async fn drain(&self) -> Result<()> {
        let mut link = self.link.lock().await;
        let Some(writer) = link.as_mut() else {
            return Ok(());
        };
        loop {
            let batch = self.take_queued();
            if batch.is_empty() {
                return Ok(());
            }
            let started = Instant::now();
            let mut pending = Vec::with_capacity(batch.len());
            for buffer in batch {
                writer.push(buffer.data())?;
                pending.push(buffer);
                if writer.pending_len() >= self.settings.high_water_mark() {
                    self.flush(writer, &mut pending, started).await?;
                }
            }
            self.flush(writer, &mut pending, started).await?;
        }
    }

    async fn flush(
        &self,
        writer: &mut ChannelWriter,
        pending: &mut Vec<PoolBuffer>,
        started: Instant,
    ) -> Result<()> {
        if pending.is_empty() {
            return Ok(());
        }
        writer.flush().await?;
        let bytes = pending.iter().map(PoolBuffer::len).sum();
        self.metrics
            .record_flush(pending.len() as u64, bytes, started.elapsed().as_nanos() as u64);
        // Buffers go back to the pool once their bytes reached the stream
        pending.clear();
        Ok(())
    }

    /// Send a ping unless something was written within `idle`
    pub async fn ping_if_idle(&self, idle: Duration) -> Result<()> {
        if self
            .metrics
            .last_send()
            .is_some_and(|sent| sent.elapsed() < idle)
        {
            return Ok(());
        }
        let mut link = self.link.lock().await;
        if let Some(writer) = link.as_mut() {
            writer.push_ping();
            writer.flush().await?;
            self.metrics.record_ping_sent();
        }
        Ok(())
    }
}

impl std::fmt::Debug for ChannelShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelShared")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}
