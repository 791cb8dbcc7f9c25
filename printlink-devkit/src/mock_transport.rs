/*!
In-memory transport for running the protocol layer without a broker.

Records every subscription and publish so tests can assert on what left the
client. Connection state, publish failures and publish latency can be
toggled at any point.
*/

use async_trait::async_trait;
use parking_lot::Mutex;
use printlink_core::{PrinterError, Transport};
use rumqttc::QoS;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

impl MockMessage {
    pub fn json(&self) -> anyhow::Result<Value> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// `command` discriminator under whichever domain key the document uses.
    pub fn command_name(&self) -> Option<String> {
        let doc = self.json().ok()?;
        doc.as_object()?
            .values()
            .find_map(|domain| domain.get("command")?.as_str().map(str::to_string))
    }
}

#[derive(Clone)]
pub struct MockTransport {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    connected: Arc<AtomicBool>,
    fail_publishes: Arc<AtomicBool>,
    publish_delay: Arc<Mutex<Option<Duration>>>,
}

impl MockTransport {
    /// A connected transport.
    pub fn new() -> Self {
        Self {
            published_messages: Arc::new(Mutex::new(Vec::new())),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(AtomicBool::new(true)),
            fail_publishes: Arc::new(AtomicBool::new(false)),
            publish_delay: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make every publish fail with a transport error.
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Hold every publish for `delay` before it counts as sent.
    pub fn delay_publishes(&self, delay: Option<Duration>) {
        *self.publish_delay.lock() = delay;
    }

    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().clone()
    }

    pub fn get_subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().clone()
    }

    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Published messages whose `command` discriminator is `name`.
    pub fn find_commands(&self, name: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .iter()
            .filter(|msg| msg.command_name().as_deref() == Some(name))
            .cloned()
            .collect()
    }

    pub fn get_last_json_message(&self, topic: &str) -> anyhow::Result<Option<Value>> {
        match self.find_messages_by_topic(topic).last() {
            Some(last) => Ok(Some(last.json()?)),
            None => Ok(None),
        }
    }

    pub fn clear(&self) {
        self.published_messages.lock().clear();
        self.subscriptions.lock().clear();
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn subscribe(&self, topic: &str) -> printlink_core::Result<()> {
        if !self.is_connected() {
            return Err(PrinterError::NotConnected);
        }
        self.subscriptions.lock().push(topic.to_string());
        info!("[mock] subscribed to {topic}");
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> printlink_core::Result<()> {
        let delay = *self.publish_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(PrinterError::Transport("simulated publish failure".into()));
        }

        info!("[mock] published to {topic}: {} bytes", payload.len());
        self.published_messages.lock().push(MockMessage {
            topic: topic.to_string(),
            payload,
            qos: QoS::AtMostOnce,
        });
        Ok(())
    }

    async fn disconnect(&self) -> printlink_core::Result<()> {
        self.set_connected(false);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn records_publishes_and_subscriptions() {
        let transport = MockTransport::new();
        transport.subscribe("device/X/report").await.unwrap();
        assert_eq!(transport.get_subscriptions(), vec!["device/X/report"]);

        let doc = json!({"pushing": {"command": "pushall"}});
        transport
            .publish("device/X/request", serde_json::to_vec(&doc).unwrap())
            .await
            .unwrap();

        let messages = transport.get_published_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].command_name().as_deref(), Some("pushall"));
        assert_eq!(transport.get_last_json_message("device/X/request").unwrap(), Some(doc));
        assert_eq!(transport.find_commands("pushall").len(), 1);
    }

    #[tokio::test]
    async fn failure_toggle_rejects_publishes() {
        let transport = MockTransport::new();
        transport.fail_publishes(true);
        assert!(transport.publish("t", b"{}".to_vec()).await.is_err());
        assert!(transport.get_published_messages().is_empty());

        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());
        assert!(transport.subscribe("t").await.is_err());
    }
}
