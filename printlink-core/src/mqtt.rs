//! MQTT transport: the printer's broker speaks MQTT 3.1.1 over TLS with a
//! self-signed certificate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    TlsConfiguration, Transport as Wire,
};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{PrinterError, Result};
use crate::health::LinkHealth;

const MAX_PACKET_SIZE: usize = 1024 * 1024;
const REQUEST_CAPACITY: usize = 10;
const ERROR_BACKOFF: Duration = Duration::from_secs(2);

/// Minimal publish/subscribe surface the protocol layer needs.
#[async_trait]
pub trait Transport: Send + Sync {
    fn is_connected(&self) -> bool;

    async fn subscribe(&self, topic: &str) -> Result<()>;

    /// Resolves once the message has left the client. This says nothing
    /// about whether the printer acted on it.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;
}

/// Receives session events from the event loop, in arrival order.
#[async_trait]
pub trait LinkHandler: Send + Sync {
    async fn on_connect(&self);

    fn on_message(&self, topic: &str, payload: &[u8]);
}

pub struct MqttTransport {
    client: AsyncClient,
    eventloop: Mutex<Option<EventLoop>>,
    // Publishes accepted by the request channel. Held across the enqueue so
    // ticket order is channel order.
    queued: tokio::sync::Mutex<u64>,
    // Publishes the event loop has written out. Moved into the loop on start.
    sent_tx: Mutex<Option<watch::Sender<u64>>>,
    sent_rx: watch::Receiver<u64>,
    health: LinkHealth,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MqttTransport {
    /// Build the client. Nothing touches the network until [`start`].
    ///
    /// [`start`]: MqttTransport::start
    pub fn new(config: &ClientConfig) -> Self {
        let mut opts = MqttOptions::new(config.client_id(), &config.hostname, config.port);
        opts.set_keep_alive(config.keep_alive());
        opts.set_credentials(&config.username, &config.access_code);
        opts.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
        opts.set_transport(Wire::Tls(insecure_tls()));

        let (client, eventloop) = AsyncClient::new(opts, REQUEST_CAPACITY);
        let (sent_tx, sent_rx) = watch::channel(0);
        Self {
            client,
            eventloop: Mutex::new(Some(eventloop)),
            queued: tokio::sync::Mutex::new(0),
            sent_tx: Mutex::new(Some(sent_tx)),
            sent_rx,
            health: LinkHealth::new(),
            task: Mutex::new(None),
        }
    }

    pub fn health(&self) -> &LinkHealth {
        &self.health
    }

    /// Spawn the event loop. Connecting happens on its first poll.
    pub fn start(&self, handler: Arc<dyn LinkHandler>) -> Result<()> {
        let sent = self
            .sent_tx
            .lock()
            .take()
            .ok_or_else(|| PrinterError::Transport("transport already started or closed".into()))?;
        let eventloop = self
            .eventloop
            .lock()
            .take()
            .ok_or_else(|| PrinterError::Transport("event loop already started".into()))?;

        let handle = spawn_event_loop(eventloop, handler, sent, self.health.clone());
        *self.task.lock() = Some(handle);
        Ok(())
    }

    /// Number of publishes the request channel has accepted.
    pub async fn queued_publishes(&self) -> u64 {
        *self.queued.lock().await
    }

    /// Wait until the `ticket`-th accepted publish has been written out.
    async fn wait_sent(&self, ticket: u64) -> Result<()> {
        let mut sent = self.sent_rx.clone();
        let written = sent.wait_for(|count| *count >= ticket).await.map(|_| ());
        written.map_err(|_| PrinterError::Transport("connection dropped before publish left".into()))
    }
}

#[async_trait]
impl Transport for MqttTransport {
    fn is_connected(&self) -> bool {
        self.health.is_connected()
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.client
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|e| PrinterError::Transport(e.to_string()))
    }

    /// Cancel safe: dropped while the channel is full, nothing is queued and
    /// no ticket is taken.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let ticket = {
            let mut queued = self.queued.lock().await;
            self.client
                .publish(topic, QoS::AtMostOnce, false, payload)
                .await
                .map_err(|e| PrinterError::Transport(e.to_string()))?;
            *queued += 1;
            *queued
        };
        self.wait_sent(ticket).await
    }

    async fn disconnect(&self) -> Result<()> {
        if let Err(e) = self.client.try_disconnect() {
            debug!("disconnect request not queued: {e}");
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        // releases waiters when the loop never started
        self.sent_tx.lock().take();
        self.health.mark_disconnected();
        info!("MQTT link closed");
        Ok(())
    }
}

/// Drive the event loop until aborted. Errors back off and the next poll
/// reconnects; requests still in the channel go out after that and keep
/// counting toward `sent`.
pub fn spawn_event_loop(
    mut eventloop: EventLoop,
    handler: Arc<dyn LinkHandler>,
    sent: watch::Sender<u64>,
    health: LinkHealth,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        info!("connected to printer broker");
                        health.mark_connected();
                        // on_connect publishes and waits on this very loop
                        let handler = handler.clone();
                        tokio::spawn(async move { handler.on_connect().await });
                    } else {
                        warn!("connection refused: {:?}", ack.code);
                        health.mark_disconnected();
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    health.record_report();
                    handler.on_message(&publish.topic, &publish.payload);
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!("broker closed the session");
                    health.mark_disconnected();
                }
                Ok(Event::Outgoing(Outgoing::Publish(_))) => {
                    health.record_publish();
                    sent.send_modify(|count| *count += 1);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("MQTT error: {e:?}");
                    health.increment_reconnects();
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }
    })
}

fn insecure_tls() -> TlsConfiguration {
    let config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
        .with_no_client_auth();
    TlsConfiguration::Rustls(Arc::new(config))
}

/// The printer presents a self-signed certificate that cannot be pinned
/// ahead of time, so nothing about it is checked.
#[derive(Debug)]
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}
