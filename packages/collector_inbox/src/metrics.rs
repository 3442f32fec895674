//! Sync metrics for observability
//!
//! Counters for push traffic, reconciliation, and request failures.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Session-wide metrics
#[derive(Debug, Default)]
pub struct SyncMetrics {
    // Push channel
    /// Push events received and decoded
    pub push_events: AtomicU64,
    /// Frames that failed to decode
    pub malformed_frames: AtomicU64,
    /// Successful reconnections after a drop
    pub reconnects: AtomicU64,
    /// Connection drops and failed connection attempts
    pub transport_errors: AtomicU64,

    // Reconciliation
    /// Inbound messages ignored because their id was already in the timeline
    pub duplicate_messages: AtomicU64,
    /// Conversations created from a push event rather than a snapshot
    pub conversations_materialized: AtomicU64,
    /// Snapshots merged into either registry
    pub snapshots_merged: AtomicU64,
    /// REST results dropped because their view was no longer current
    pub stale_continuations: AtomicU64,

    // Requests
    /// REST calls that failed (status or transport)
    pub failed_requests: AtomicU64,

    start_time: Option<Instant>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn push_event(&self) {
        self.push_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn malformed_frame(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconnected(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn duplicate_message(&self) {
        self.duplicate_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn conversation_materialized(&self) {
        self.conversations_materialized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot_merged(&self) {
        self.snapshots_merged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stale_continuation(&self) {
        self.stale_continuations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_failed(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Create a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            channel: ChannelMetrics {
                push_events: self.push_events.load(Ordering::Relaxed),
                malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
                reconnects: self.reconnects.load(Ordering::Relaxed),
                transport_errors: self.transport_errors.load(Ordering::Relaxed),
            },
            reconciliation: ReconciliationMetrics {
                duplicate_messages: self.duplicate_messages.load(Ordering::Relaxed),
                conversations_materialized: self.conversations_materialized.load(Ordering::Relaxed),
                snapshots_merged: self.snapshots_merged.load(Ordering::Relaxed),
                stale_continuations: self.stale_continuations.load(Ordering::Relaxed),
            },
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub channel: ChannelMetrics,
    pub reconciliation: ReconciliationMetrics,
    pub failed_requests: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMetrics {
    pub push_events: u64,
    pub malformed_frames: u64,
    pub reconnects: u64,
    pub transport_errors: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationMetrics {
    pub duplicate_messages: u64,
    pub conversations_materialized: u64,
    pub snapshots_merged: u64,
    pub stale_continuations: u64,
}
