/*!
Test harness for the protocol layer.

Wires a `StateSynchronizer`, `CommandDispatcher` and `StatusReader` to a
`MockTransport`, feeds reports in and asserts on the commands that went out.
*/

use crate::mock_transport::MockTransport;
use anyhow::Result;
use printlink_core::{
    ClientConfig, CommandDispatcher, LinkHandler, Publisher, StateSynchronizer, StatusReader,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub const TEST_SERIAL: &str = "01S00TEST000001";

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once per process. `RUST_LOG` applies.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub struct TestHarness {
    pub transport: Arc<MockTransport>,
    pub config: ClientConfig,
    pub sync: Arc<StateSynchronizer>,
    pub commands: CommandDispatcher,
    pub status: StatusReader,
    expectations: Vec<Expectation>,
}

#[derive(Debug)]
struct Expectation {
    command: String,
    expected_count: usize,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(Self::test_config())
    }

    /// Config with a short publish timeout so timeout tests stay fast.
    pub fn test_config() -> ClientConfig {
        let mut config = ClientConfig::new("127.0.0.1", "12345678", TEST_SERIAL);
        config.publish_timeout_secs = 1;
        config
    }

    pub fn with_config(config: ClientConfig) -> Self {
        init_tracing();

        let transport = Arc::new(MockTransport::new());
        let publisher = Arc::new(Publisher::from_config(transport.clone(), &config));
        let sync = Arc::new(StateSynchronizer::new(&config, publisher));

        Self {
            commands: CommandDispatcher::new(sync.clone()),
            status: StatusReader::new(sync.clone()),
            transport,
            config,
            sync,
            expectations: Vec::new(),
        }
    }

    pub fn request_topic(&self) -> String {
        self.config.request_topic()
    }

    pub fn report_topic(&self) -> String {
        self.config.report_topic()
    }

    /// Run the on-connect handshake as the event loop would.
    pub async fn connect(&self) {
        self.sync.on_connect().await;
    }

    /// Deliver a report on the report topic.
    pub fn push_report(&self, report: &Value) {
        self.push_raw(report.to_string().as_bytes());
    }

    pub fn push_raw(&self, payload: &[u8]) {
        self.sync.on_message(&self.report_topic(), payload);
    }

    /// Expect exactly `count` published commands named `command`.
    pub fn expect_commands(&mut self, command: &str, count: usize) -> &mut Self {
        self.expectations.push(Expectation {
            command: command.to_string(),
            expected_count: count,
        });
        self
    }

    pub fn verify_expectations(&self) -> Result<()> {
        for expectation in &self.expectations {
            let actual = self.transport.find_commands(&expectation.command).len();
            if actual != expectation.expected_count {
                anyhow::bail!(
                    "expected {} '{}' commands, got {}",
                    expectation.expected_count,
                    expectation.command,
                    actual
                );
            }
        }
        info!("{} expectations verified", self.expectations.len());
        Ok(())
    }

    /// Documents of every published command named `name`, oldest first.
    pub fn commands_sent(&self, name: &str) -> Result<Vec<Value>> {
        self.transport
            .find_commands(name)
            .iter()
            .map(|msg| msg.json())
            .collect()
    }

    pub fn refresh_count(&self) -> usize {
        self.transport.find_commands("pushall").len()
    }

    pub fn last_command(&self) -> Result<Option<Value>> {
        self.transport.get_last_json_message(&self.request_topic())
    }

    pub fn assert_message_sent(&self, expected: &Value) -> Result<()> {
        for msg in self.transport.find_messages_by_topic(&self.request_topic()) {
            if msg.json()? == *expected {
                return Ok(());
            }
        }
        anyhow::bail!("expected command not published: {expected}");
    }

    /// Compare a dotted path in the last published command.
    pub fn assert_field_equals(&self, field_path: &str, expected: &Value) -> Result<()> {
        let Some(msg) = self.last_command()? else {
            anyhow::bail!("nothing published on {}", self.request_topic());
        };
        match get_nested_field(&msg, field_path) {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => anyhow::bail!(
                "field '{field_path}' mismatch: expected {expected}, got {actual}"
            ),
            None => anyhow::bail!("field '{field_path}' missing from {msg}"),
        }
    }

    /// Poll until `pred` holds or `timeout` elapses.
    pub async fn wait_for<F: Fn(&Self) -> bool>(&self, timeout: Duration, pred: F) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if pred(self) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        pred(self)
    }

    pub fn get_stats(&self) -> TestStats {
        let messages = self.transport.get_published_messages();
        let mut command_counts = HashMap::new();
        for msg in &messages {
            let name = msg.command_name().unwrap_or_else(|| "<none>".into());
            *command_counts.entry(name).or_insert(0) += 1;
        }

        TestStats {
            total_messages: messages.len(),
            command_counts,
            subscriptions: self.transport.get_subscriptions(),
        }
    }

    pub fn reset(&mut self) {
        self.transport.clear();
        self.expectations.clear();
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn get_nested_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, part| current.as_object()?.get(part))
}

#[derive(Debug)]
pub struct TestStats {
    pub total_messages: usize,
    pub command_counts: HashMap<String, usize>,
    pub subscriptions: Vec<String>,
}

impl TestStats {
    pub fn print(&self) {
        println!("published {} messages", self.total_messages);
        for (command, count) in &self.command_counts {
            println!("  {command}: {count}");
        }
        println!("subscriptions: {:?}", self.subscriptions);
    }
}

/// Declare a `tokio::test` that gets a fresh harness and may use `?`.
#[macro_export]
macro_rules! harness_test {
    ($name:ident, |$harness:ident| $body:block) => {
        #[tokio::test]
        async fn $name() {
            #[allow(unused_mut)]
            let mut $harness = $crate::TestHarness::new();
            let result: $crate::anyhow::Result<()> = async { $body }.await;
            if let Err(e) = result {
                $harness.get_stats().print();
                panic!("{} failed: {e:#}", stringify!($name));
            }
        }
    };
}
