//! One-stop handle on a single printer: transport, synchroniser, commands
//! and reads, plus the optional file and camera collaborators.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::io::AsyncRead;
use tracing::{info, warn};

use crate::accessors::StatusReader;
use crate::config::ClientConfig;
use crate::dispatch::CommandDispatcher;
use crate::error::{PrinterError, Result};
use crate::health::LinkReport;
use crate::mqtt::{MqttTransport, Transport};
use crate::sync::{Publisher, StateSynchronizer};

/// Bulk file storage on the printer.
#[async_trait]
pub trait FileTransfer: Send + Sync {
    /// Store `source` under `name`; returns the remote path.
    async fn upload(&self, source: &mut (dyn AsyncRead + Send + Unpin), name: &str) -> Result<String>;

    /// Remove a stored file; returns the removed path.
    async fn delete(&self, path: &str) -> Result<String>;
}

/// Still images from the printer camera.
pub trait FrameSource: Send + Sync {
    fn start(&self) -> Result<()>;

    fn stop(&self);

    /// Latest JPEG frame, if one has arrived.
    fn current_frame(&self) -> Option<Vec<u8>>;
}

pub struct Printer {
    config: ClientConfig,
    transport: Arc<MqttTransport>,
    sync: Arc<StateSynchronizer>,
    commands: CommandDispatcher,
    status: StatusReader,
    files: Option<Arc<dyn FileTransfer>>,
    camera: Option<Arc<dyn FrameSource>>,
}

impl Printer {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = Arc::new(MqttTransport::new(&config));
        let publisher = Arc::new(Publisher::from_config(transport.clone(), &config));
        let sync = Arc::new(StateSynchronizer::new(&config, publisher));

        Ok(Self {
            commands: CommandDispatcher::new(sync.clone()),
            status: StatusReader::new(sync.clone()),
            config,
            transport,
            sync,
            files: None,
            camera: None,
        })
    }

    pub fn with_file_transfer(mut self, files: Arc<dyn FileTransfer>) -> Self {
        self.files = Some(files);
        self
    }

    pub fn with_frame_source(mut self, camera: Arc<dyn FrameSource>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Start the background link. Returns immediately; use
    /// [`wait_until_ready`](Self::wait_until_ready) to block on the first report.
    pub fn connect(&self) -> Result<()> {
        info!(host = %self.config.hostname, serial = %self.config.serial, "connecting");
        self.transport.start(self.sync.clone())?;
        if let Some(camera) = &self.camera {
            if let Err(e) = camera.start() {
                warn!("camera did not start: {e}");
            }
        }
        Ok(())
    }

    /// Stop the link. Safe to call when never connected.
    pub async fn disconnect(&self) -> Result<()> {
        if let Some(camera) = &self.camera {
            camera.stop();
        }
        self.transport.disconnect().await
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn ready(&self) -> bool {
        self.sync.ready()
    }

    /// Poll readiness until `timeout` elapses.
    pub async fn wait_until_ready(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut tick = tokio::time::interval(Duration::from_millis(100));
        loop {
            tick.tick().await;
            if self.is_connected() && self.ready() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
        }
    }

    pub fn link(&self) -> LinkReport {
        self.transport.health().report()
    }

    pub fn commands(&self) -> &CommandDispatcher {
        &self.commands
    }

    pub fn status(&self) -> &StatusReader {
        &self.status
    }

    pub fn synchronizer(&self) -> &Arc<StateSynchronizer> {
        &self.sync
    }

    pub fn dump(&self) -> Map<String, Value> {
        self.sync.dump()
    }

    pub async fn upload_file(
        &self,
        source: &mut (dyn AsyncRead + Send + Unpin),
        name: &str,
    ) -> Result<String> {
        let files = self.file_transfer()?;
        files.upload(source, name).await
    }

    pub async fn delete_file(&self, path: &str) -> Result<String> {
        let files = self.file_transfer()?;
        files.delete(path).await
    }

    fn file_transfer(&self) -> Result<&Arc<dyn FileTransfer>> {
        self.files
            .as_ref()
            .ok_or_else(|| PrinterError::Transfer("no file transfer configured".into()))
    }

    /// Latest camera frame, empty when no source is attached or none arrived.
    pub fn camera_frame(&self) -> Vec<u8> {
        self.camera
            .as_ref()
            .and_then(|camera| camera.current_frame())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::io::AsyncReadExt;

    struct MemoryFiles {
        stored: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl FileTransfer for MemoryFiles {
        async fn upload(&self, source: &mut (dyn AsyncRead + Send + Unpin), name: &str) -> Result<String> {
            let mut data = Vec::new();
            source.read_to_end(&mut data).await?;
            self.stored.lock().push((name.to_string(), data));
            Ok(format!("/{name}"))
        }

        async fn delete(&self, path: &str) -> Result<String> {
            let name = path.trim_start_matches('/');
            let mut stored = self.stored.lock();
            let before = stored.len();
            stored.retain(|(n, _)| n != name);
            if stored.len() == before {
                return Err(PrinterError::Transfer(format!("{path} not found")));
            }
            Ok(path.to_string())
        }
    }

    struct StillCamera {
        running: AtomicBool,
    }

    impl FrameSource for StillCamera {
        fn start(&self) -> Result<()> {
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&self) {
            self.running.store(false, Ordering::SeqCst);
        }

        fn current_frame(&self) -> Option<Vec<u8>> {
            self.running.load(Ordering::SeqCst).then(|| vec![0xFF, 0xD8])
        }
    }

    fn config() -> ClientConfig {
        ClientConfig::new("127.0.0.1", "12345678", "01S00A000000000")
    }

    #[tokio::test]
    async fn rejects_incomplete_config() {
        assert!(matches!(
            Printer::new(ClientConfig::new("", "code", "serial")),
            Err(PrinterError::Config(_))
        ));
    }

    #[tokio::test]
    async fn file_calls_without_transfer_fail() {
        let printer = Printer::new(config()).unwrap();
        assert!(matches!(printer.delete_file("/a.3mf").await, Err(PrinterError::Transfer(_))));
        let mut empty: &[u8] = &[];
        assert!(printer.upload_file(&mut empty, "a.3mf").await.is_err());
    }

    #[tokio::test]
    async fn forwards_to_file_transfer() {
        let printer = Printer::new(config())
            .unwrap()
            .with_file_transfer(Arc::new(MemoryFiles { stored: Mutex::new(Vec::new()) }));

        let mut body: &[u8] = b"G28\n";
        assert_eq!(printer.upload_file(&mut body, "job.gcode").await.unwrap(), "/job.gcode");
        assert_eq!(printer.delete_file("/job.gcode").await.unwrap(), "/job.gcode");
        assert!(printer.delete_file("/job.gcode").await.is_err());
    }

    #[tokio::test]
    async fn camera_frame_is_empty_without_source() {
        let printer = Printer::new(config()).unwrap();
        assert!(printer.camera_frame().is_empty());

        let camera = Arc::new(StillCamera { running: AtomicBool::new(true) });
        let printer = Printer::new(config()).unwrap().with_frame_source(camera.clone());
        assert_eq!(printer.camera_frame(), vec![0xFF, 0xD8]);

        printer.disconnect().await.unwrap();
        assert!(printer.camera_frame().is_empty());
        assert!(!printer.is_connected());
    }
}
