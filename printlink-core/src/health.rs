use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::state::{shared, Shared};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
}

/// Point-in-time view of the MQTT link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkReport {
    pub status: LinkStatus,
    pub uptime_seconds: u64,
    pub reconnects: u32,
    pub reports_received: u64,
    pub publishes_sent: u64,
}

/// Connection bookkeeping shared by the event loop and its readers.
#[derive(Clone)]
pub struct LinkHealth {
    start_time: Instant,
    status: Shared<LinkStatus>,
    reconnects: Arc<AtomicU32>,
    reports_received: Arc<AtomicU64>,
    publishes_sent: Arc<AtomicU64>,
}

impl Default for LinkHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkHealth {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            status: shared(LinkStatus::Connecting),
            reconnects: Arc::new(AtomicU32::new(0)),
            reports_received: Arc::new(AtomicU64::new(0)),
            publishes_sent: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn mark_connected(&self) {
        *self.status.lock() = LinkStatus::Connected;
    }

    pub fn mark_disconnected(&self) {
        *self.status.lock() = LinkStatus::Disconnected;
    }

    /// Transport error seen; the next poll reconnects.
    pub fn increment_reconnects(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        *self.status.lock() = LinkStatus::Reconnecting;
    }

    pub fn record_report(&self) {
        self.reports_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish(&self) {
        self.publishes_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn status(&self) -> LinkStatus {
        *self.status.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == LinkStatus::Connected
    }

    pub fn report(&self) -> LinkReport {
        LinkReport {
            status: self.status(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            reports_received: self.reports_received.load(Ordering::Relaxed),
            publishes_sent: self.publishes_sent.load(Ordering::Relaxed),
        }
    }
}
