//! State synchronisation: the merged snapshot, readiness gate and throttled
//! full-refresh protocol.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::commands::PrinterCommand;
use crate::config::ClientConfig;
use crate::error::{PrinterError, Result};
use crate::models::{decode_report, ReportKey, Snapshot};
use crate::mqtt::{LinkHandler, Transport};
use crate::state::{shared, Shared};

/// Serialises documents onto the request topic and waits for them to leave
/// the client.
pub struct Publisher {
    transport: Arc<dyn Transport>,
    topic: String,
    timeout: Duration,
}

impl Publisher {
    pub fn new(transport: Arc<dyn Transport>, topic: impl Into<String>, timeout: Duration) -> Self {
        Self {
            transport,
            topic: topic.into(),
            timeout,
        }
    }

    pub fn from_config(transport: Arc<dyn Transport>, config: &ClientConfig) -> Self {
        Self::new(transport, config.request_topic(), config.publish_timeout())
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Publish `document`. Every failure is logged and reported as `false`.
    pub async fn publish(&self, document: &Value) -> bool {
        if !self.transport.is_connected() {
            error!("not connected to the printer, command dropped");
            return false;
        }

        let payload = match serde_json::to_vec(document) {
            Ok(payload) => payload,
            Err(e) => {
                error!("could not serialise command: {e}");
                return false;
            }
        };

        debug!(topic = %self.topic, %document, "publishing command");
        match tokio::time::timeout(self.timeout, self.transport.publish(&self.topic, payload)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("publish failed: {e}");
                false
            }
            Err(_) => {
                error!("{}", PrinterError::Timeout(self.timeout));
                false
            }
        }
    }
}

/// At most one full refresh per interval, shared by every reader.
pub struct RefreshThrottle {
    last_refresh: Mutex<i64>,
    interval: Duration,
}

impl RefreshThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_refresh: Mutex::new(0),
            interval,
        }
    }

    /// Claim the refresh slot if the interval has elapsed.
    pub fn try_claim(&self) -> bool {
        self.try_claim_at(OffsetDateTime::now_utc().unix_timestamp())
    }

    pub fn try_claim_at(&self, now: i64) -> bool {
        let interval = i64::try_from(self.interval.as_secs()).unwrap_or(i64::MAX);
        let mut last = self.last_refresh.lock();
        if last.saturating_add(interval) > now {
            return false;
        }
        *last = now;
        true
    }

    /// Unix seconds of the last claimed refresh, zero if none.
    pub fn last_refresh(&self) -> i64 {
        *self.last_refresh.lock()
    }
}

/// Sole owner of the merged report snapshot.
pub struct StateSynchronizer {
    snapshot: Shared<Snapshot>,
    publisher: Arc<Publisher>,
    throttle: RefreshThrottle,
    report_topic: String,
    refresh_on_connect: bool,
    strict: bool,
}

impl StateSynchronizer {
    pub fn new(config: &ClientConfig, publisher: Arc<Publisher>) -> Self {
        Self {
            snapshot: shared(Snapshot::new()),
            publisher,
            throttle: RefreshThrottle::new(Duration::from_secs(config.refresh_interval_secs)),
            report_topic: config.report_topic(),
            refresh_on_connect: config.refresh_on_connect,
            strict: config.strict,
        }
    }

    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }

    pub fn report_topic(&self) -> &str {
        &self.report_topic
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// True once at least one report field has been merged.
    pub fn ready(&self) -> bool {
        !self.snapshot.lock().is_empty()
    }

    pub fn is_connected(&self) -> bool {
        self.publisher.is_connected()
    }

    /// Merge the `print` section of a raw report. Returns the number of
    /// fields written; malformed payloads are logged and leave the snapshot
    /// untouched.
    pub fn apply_report(&self, payload: &[u8]) -> usize {
        match decode_report(payload) {
            Ok(Some(section)) => {
                let written = self.snapshot.lock().merge(section);
                debug!(fields = written, "merged report");
                written
            }
            Ok(None) => 0,
            Err(e) => {
                warn!("ignoring report: {e}");
                0
            }
        }
    }

    /// Merge an already decoded document, as if it had arrived as a report.
    pub fn apply_document(&self, document: &Value) -> usize {
        match document.get("print") {
            Some(Value::Object(section)) => self.snapshot.lock().merge(section.clone()),
            Some(other) => {
                warn!("ignoring report: print section is {other}");
                0
            }
            None => 0,
        }
    }

    /// Ask the printer for a complete report.
    pub async fn request_refresh(&self) -> bool {
        self.publisher.publish(&PrinterCommand::PushAll.to_json()).await
    }

    /// Read one snapshot field, falling back to `default`.
    ///
    /// A read while not connected-and-ready returns the default (or
    /// `NotReady` in strict mode) without touching the throttle. Otherwise a
    /// refresh is requested first when the throttle interval has elapsed.
    pub async fn read_field(&self, key: &str, default: Value) -> Result<Value> {
        if !(self.is_connected() && self.ready()) {
            if self.strict {
                return Err(PrinterError::NotReady);
            }
            warn!(key, "printer values not available yet, using default");
            return Ok(default);
        }

        if self.throttle.try_claim() && !self.request_refresh().await {
            warn!("full refresh request was not sent");
        }

        let value = self.snapshot.lock().get(key).cloned();
        Ok(value.filter(|v| !v.is_null()).unwrap_or(default))
    }

    pub async fn read(&self, key: ReportKey, default: Value) -> Result<Value> {
        self.read_field(key.as_str(), default).await
    }

    /// Copy of everything merged so far.
    pub fn dump(&self) -> Map<String, Value> {
        self.snapshot.lock().to_document()
    }

    pub fn unrecognized_keys(&self) -> Vec<String> {
        self.snapshot.lock().unrecognized_keys()
    }

    pub fn throttle(&self) -> &RefreshThrottle {
        &self.throttle
    }
}

#[async_trait]
impl LinkHandler for StateSynchronizer {
    async fn on_connect(&self) {
        let transport = self.publisher.transport();
        if let Err(e) = transport.subscribe(&self.report_topic).await {
            error!("subscribe to {} failed: {e}", self.report_topic);
            return;
        }
        info!("subscribed to {}", self.report_topic);

        if self.refresh_on_connect && !self.request_refresh().await {
            warn!("initial full refresh was not sent");
        }
        info!("connection handshake completed");
    }

    fn on_message(&self, topic: &str, payload: &[u8]) {
        if topic != self.report_topic {
            debug!(topic, "ignoring message on foreign topic");
            return;
        }
        self.apply_report(payload);
    }
}
