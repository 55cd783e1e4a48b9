//! Channel traffic metrics
//!
//! Lock-free counters for frames and bytes in each direction plus a sampled
//! flush latency tracker. Reported through the channel information surface.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Traffic counters for one channel
#[derive(Clone)]
pub struct ChannelMetrics {
    messages_sent: Arc<AtomicU64>,
    messages_received: Arc<AtomicU64>,
    pings_sent: Arc<AtomicU64>,
    pings_received: Arc<AtomicU64>,
    bytes_sent: Arc<AtomicU64>,
    bytes_received: Arc<AtomicU64>,
    dropped_frames: Arc<AtomicU64>,
    latency_tracker: Arc<RwLock<LatencyTracker>>,
    last_send: Arc<RwLock<Option<Instant>>>,
    last_receive: Arc<RwLock<Option<Instant>>>,
}

/// Point-in-time copy of [`ChannelMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub pings_sent: u64,
    pub pings_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub dropped_frames: u64,
    pub avg_flush_latency_ns: u64,
    pub p99_flush_latency_ns: u64,
}

impl ChannelMetrics {
    pub fn new() -> Self {
        Self {
            messages_sent: Arc::new(AtomicU64::new(0)),
            messages_received: Arc::new(AtomicU64::new(0)),
            pings_sent: Arc::new(AtomicU64::new(0)),
            pings_received: Arc::new(AtomicU64::new(0)),
            bytes_sent: Arc::new(AtomicU64::new(0)),
            bytes_received: Arc::new(AtomicU64::new(0)),
            dropped_frames: Arc::new(AtomicU64::new(0)),
            latency_tracker: Arc::new(RwLock::new(LatencyTracker::new())),
            last_send: Arc::new(RwLock::new(None)),
            last_receive: Arc::new(RwLock::new(None)),
        }
    }

    /// Record a flushed batch of `messages` frames
    #[inline]
    pub fn record_flush(&self, messages: u64, bytes: usize, latency_ns: u64) {
        self.messages_sent.fetch_add(messages, Ordering::Release);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Release);
        if let Some(mut tracker) = self.latency_tracker.try_write() {
            tracker.record(latency_ns);
        }
        *self.last_send.write() = Some(Instant::now());
    }

    #[inline]
    pub fn record_ping_sent(&self) {
        self.pings_sent.fetch_add(1, Ordering::Release);
        *self.last_send.write() = Some(Instant::now());
    }

    #[inline]
    pub fn record_receive(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Release);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Release);
        *self.last_receive.write() = Some(Instant::now());
    }

    #[inline]
    pub fn record_ping_received(&self) {
        self.pings_received.fetch_add(1, Ordering::Release);
        *self.last_receive.write() = Some(Instant::now());
    }

    /// A frame that arrived but could not be decoded
    #[inline]
    pub fn record_dropped(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Release);
    }

    pub fn last_send(&self) -> Option<Instant> {
        *self.last_send.read()
    }

    pub fn last_receive(&self) -> Option<Instant> {
        *self.last_receive.read()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency = self.latency_tracker.read();
        MetricsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Acquire),
            messages_received: self.messages_received.load(Ordering::Acquire),
            pings_sent: self.pings_sent.load(Ordering::Acquire),
            pings_received: self.pings_received.load(Ordering::Acquire),
            bytes_sent: self.bytes_sent.load(Ordering::Acquire),
            bytes_received: self.bytes_received.load(Ordering::Acquire),
            dropped_frames: self.dropped_frames.load(Ordering::Acquire),
            avg_flush_latency_ns: latency.average(),
            p99_flush_latency_ns: latency.percentile(99),
        }
    }
}

impl Default for ChannelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Ring of recent latency samples
struct LatencyTracker {
    samples: Vec<u64>,
    position: usize,
    total_samples: u64,
    sum: u64,
}

impl LatencyTracker {
    const SAMPLE_SIZE: usize = 1000;

    fn new() -> Self {
        Self {
            samples: Vec::with_capacity(Self::SAMPLE_SIZE),
            position: 0,
            total_samples: 0,
            sum: 0,
        }
    }

    fn record(&mut self, latency_ns: u64) {
        self.sum = self.sum.saturating_add(latency_ns);
        self.total_samples += 1;
        if self.samples.len() < Self::SAMPLE_SIZE {
            self.samples.push(latency_ns);
        } else {
            self.samples[self.position] = latency_ns;
            self.position = (self.position + 1) % Self::SAMPLE_SIZE;
        }
    }

    fn average(&self) -> u64 {
        if self.total_samples > 0 {
            self.sum / self.total_samples
        } else {
            0
        }
    }

    fn percentile(&self, p: usize) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_unstable();
        let index = ((sorted.len() - 1) * p) / 100;
        sorted[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_across_clones() {
        let metrics = ChannelMetrics::new();
        let writer_view = metrics.clone();
        writer_view.record_flush(3, 300, 1_000);
        writer_view.record_ping_sent();
        metrics.record_receive(40);
        metrics.record_ping_received();
        metrics.record_dropped();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.messages_sent, 3);
        assert_eq!(snapshot.bytes_sent, 300);
        assert_eq!(snapshot.pings_sent, 1);
        assert_eq!(snapshot.messages_received, 1);
        assert_eq!(snapshot.pings_received, 1);
        assert_eq!(snapshot.dropped_frames, 1);
        assert_eq!(snapshot.avg_flush_latency_ns, 1_000);
        assert!(metrics.last_send().is_some());
        assert!(metrics.last_receive().is_some());
    }

    #[test]
    fn percentile_uses_recent_samples() {
        let mut tracker = LatencyTracker::new();
        for latency in 1..=100 {
            tracker.record(latency);
        }
        assert_eq!(tracker.percentile(99), 99);
        assert_eq!(tracker.average(), 50);
    }
}
