//! Controller facade (spec §4.F): the glue between the inbound byte stream,
//! the request tracker, the event dispatcher, and the handful of
//! ping/device-info/system-command operations a caller actually uses.
//!
//! Holds its constituent pieces behind one `Arc`, matching `MonClient`'s
//! cloneable-handle-over-shared-state shape; the background read loop that
//! feeds the reassembler is spawned the way `MonClient::start_tick_loop`
//! spawns its periodic task, with the `JoinHandle` kept for teardown.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cbor;
use crate::coap::{Method, Payload};
use crate::config::VelocityConfig;
use crate::device_info::DeviceInfo;
use crate::dispatcher::{Dispatcher, Event, SubscriptionId};
use crate::error::{Error, Result};
use crate::mup1::{self, FrameType, Reassembler};
use crate::tracker::RequestTracker;
use crate::transport::{Status, Transport};

/// System command strings carried as the payload of `S`-type frames (spec §6).
mod system_command {
    pub const INFO: &str = "info";
    pub const SAVE_CONFIG: &str = "save-config";
    pub const FACTORY_RESET: &str = "factory-reset";
    pub const REBOOT: &str = "reboot";
}

/// The CORECONF handshake payload `[0x7278]` (spec §6).
fn handshake_payload() -> cbor::Value {
    cbor::Value::Array(vec![cbor::Value::Integer(0x7278.into())])
}

pub struct Controller {
    transport: Arc<dyn Transport>,
    tracker: Arc<RequestTracker>,
    dispatcher: Arc<Dispatcher>,
    config: VelocityConfig,
    device_info: Mutex<Option<DeviceInfo>>,
    read_task: StdMutex<Option<JoinHandle<()>>>,
}

impl Controller {
    /// Builds the controller and spawns the read loop that pulls bytes off
    /// `inbound`, reassembles frames, and hands them to the dispatcher.
    pub fn new(
        transport: Arc<dyn Transport>,
        inbound: mpsc::Receiver<Bytes>,
        config: VelocityConfig,
    ) -> Arc<Self> {
        let tracker = Arc::new(RequestTracker::new(transport.clone(), config.request_timeout));
        let dispatcher = Arc::new(Dispatcher::new(tracker.clone()));

        let controller = Arc::new(Self {
            transport,
            tracker,
            dispatcher: dispatcher.clone(),
            config,
            device_info: Mutex::new(None),
            read_task: StdMutex::new(None),
        });

        let handle = tokio::spawn(read_loop(inbound, dispatcher));
        *controller.read_task.lock().unwrap() = Some(handle);

        controller
    }

    /// Emits a `P` frame and waits up to `ping_timeout` for a `pong` event.
    pub async fn ping(&self) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(StdMutex::new(Some(tx)));
        let tx_clone = tx.clone();
        self.dispatcher
            .once(
                Event::Pong,
                Arc::new(move |_payload| {
                    if let Some(tx) = tx_clone.lock().unwrap().take() {
                        let _ = tx.send(());
                    }
                }),
            )
            .await;

        self.send_frame(FrameType::Ping, &[]).await?;

        Ok(tokio::time::timeout(self.config.ping_timeout, rx)
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false))
    }

    /// Emits `S:info` and waits for the next announcement, caching the
    /// parsed result.
    pub async fn device_info(&self) -> Result<DeviceInfo> {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(StdMutex::new(Some(tx)));
        let tx_clone = tx.clone();
        self.dispatcher
            .once(
                Event::Announcement,
                Arc::new(move |payload: &[u8]| {
                    if let Some(tx) = tx_clone.lock().unwrap().take() {
                        let info = DeviceInfo::parse(&String::from_utf8_lossy(payload));
                        let _ = tx.send(info);
                    }
                }),
            )
            .await;

        self.send_frame(FrameType::System, system_command::INFO.as_bytes())
            .await?;

        let info = rx.await.map_err(|_| Error::ConnectionClosed)?;
        *self.device_info.lock().await = Some(info.clone());
        Ok(info)
    }

    pub async fn save_config(&self) -> Result<bool> {
        self.system_command(system_command::SAVE_CONFIG, true).await
    }

    pub async fn factory_reset(&self) -> Result<bool> {
        self.system_command(system_command::FACTORY_RESET, true).await
    }

    pub async fn reboot(&self) -> Result<()> {
        self.system_command(system_command::REBOOT, false).await.map(|_| ())
    }

    async fn system_command(&self, cmd: &str, wait_for_response: bool) -> Result<bool> {
        if !wait_for_response {
            self.send_frame(FrameType::System, cmd.as_bytes()).await?;
            return Ok(true);
        }

        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(StdMutex::new(Some(tx)));
        let tx_clone = tx.clone();
        self.dispatcher
            .once(
                Event::System,
                Arc::new(move |payload: &[u8]| {
                    if let Some(tx) = tx_clone.lock().unwrap().take() {
                        let _ = tx.send(payload.to_vec());
                    }
                }),
            )
            .await;

        self.send_frame(FrameType::System, cmd.as_bytes()).await?;

        match tokio::time::timeout(self.config.system_command_timeout, rx).await {
            Ok(Ok(payload)) => Ok(String::from_utf8_lossy(&payload).contains("success")),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => Err(Error::Timeout),
        }
    }

    pub async fn coap_get(&self, uri: &str, payload: Option<&cbor::Value>) -> Result<Option<Payload>> {
        self.tracker.request(Method::Get, uri, payload).await
    }

    pub async fn coap_post(&self, uri: &str, payload: Option<&cbor::Value>) -> Result<Option<Payload>> {
        self.tracker.request(Method::Post, uri, payload).await
    }

    pub async fn coap_put(&self, uri: &str, payload: Option<&cbor::Value>) -> Result<Option<Payload>> {
        self.tracker.request(Method::Put, uri, payload).await
    }

    pub async fn coap_delete(&self, uri: &str, payload: Option<&cbor::Value>) -> Result<Option<Payload>> {
        self.tracker.request(Method::Delete, uri, payload).await
    }

    pub async fn coap_fetch(&self, uri: &str, payload: Option<&cbor::Value>) -> Result<Option<Payload>> {
        self.tracker.request(Method::Fetch, uri, payload).await
    }

    /// Registers a persistent subscriber for the open-ended `trace` stream
    /// (spec §9 design note).
    pub async fn trace_stream(&self, callback: crate::dispatcher::Callback) -> SubscriptionId {
        self.dispatcher.on(Event::Trace, callback).await
    }

    pub async fn subscribe_announcements(&self, callback: crate::dispatcher::Callback) -> SubscriptionId {
        self.dispatcher.on(Event::Announcement, callback).await
    }

    pub async fn subscribe_system(&self, callback: crate::dispatcher::Callback) -> SubscriptionId {
        self.dispatcher.on(Event::System, callback).await
    }

    /// Ping, then a best-effort CORECONF handshake (failure logged, not
    /// fatal), then a device-info exchange (spec §4.F).
    pub async fn initialize(&self) -> Result<DeviceInfo> {
        if !self.ping().await? {
            warn!("device did not respond to ping during initialize");
        }

        let handshake = handshake_payload();
        if let Err(err) = self.tracker.request(Method::Fetch, "c?d=a", Some(&handshake)).await {
            warn!(%err, "CORECONF handshake failed during initialize");
        }

        self.device_info().await
    }

    /// Watches caller-reported connection status notifications (spec §6:
    /// "advisory only"). The core never changes behavior based on these; it
    /// only logs transitions, so callers who don't need this can simply never
    /// call it.
    pub fn watch_status(&self, mut status: mpsc::Receiver<Status>) {
        tokio::spawn(async move {
            while let Some(update) = status.recv().await {
                match update {
                    Status::Connected => debug!("transport reported connected"),
                    Status::Disconnected => warn!("transport reported disconnected"),
                    Status::Error(msg) => warn!(%msg, "transport reported an error"),
                }
            }
        });
    }

    /// Rejects all pending requests and stops the inbound read loop.
    pub async fn shutdown(&self) {
        self.tracker.teardown().await;
        if let Some(handle) = self.read_task.lock().unwrap().take() {
            handle.abort();
        }
    }

    async fn send_frame(&self, frame_type: FrameType, payload: &[u8]) -> Result<()> {
        let frame = mup1::encode(frame_type, payload);
        self.transport.send_bytes(Bytes::from(frame)).await
    }
}

async fn read_loop(mut inbound: mpsc::Receiver<Bytes>, dispatcher: Arc<Dispatcher>) {
    let mut reassembler = Reassembler::new();
    while let Some(bytes) = inbound.recv().await {
        for frame in reassembler.push(&bytes) {
            dispatcher.dispatch(frame).await;
        }
    }
    debug!("inbound channel closed, controller read loop exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct EchoTransport {
        out: mpsc::Sender<Bytes>,
    }

    #[async_trait]
    impl Transport for EchoTransport {
        async fn send_bytes(&self, bytes: Bytes) -> Result<()> {
            let _ = self.out.send(bytes).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn ping_resolves_true_on_pong() {
        let (to_device, mut from_core) = mpsc::channel(8);
        let (to_core, from_device) = mpsc::channel(8);
        let transport = Arc::new(EchoTransport { out: to_device });
        let controller = Controller::new(transport, from_device, VelocityConfig::default());

        // Echo back whatever ping frame the controller sends, turning it
        // into a pong delivery from the device's point of view.
        let echo = tokio::spawn(async move {
            if let Some(frame) = from_core.recv().await {
                let _ = to_core.send(frame).await;
            }
        });

        let ok = controller.ping().await.unwrap();
        assert!(ok);
        echo.await.unwrap();
    }

    #[tokio::test]
    async fn ping_resolves_false_on_timeout() {
        let (to_device, _from_core) = mpsc::channel(8);
        let (_to_core, from_device) = mpsc::channel(8);
        let transport = Arc::new(EchoTransport { out: to_device });
        let mut config = VelocityConfig::default();
        config.ping_timeout = Duration::from_millis(20);
        let controller = Controller::new(transport, from_device, config);

        let ok = controller.ping().await.unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn device_info_parses_announcement_per_spec_s2() {
        let (to_device, mut from_core) = mpsc::channel(8);
        let (to_core, from_device) = mpsc::channel(8);
        let transport = Arc::new(EchoTransport { out: to_device });
        let controller = Controller::new(transport, from_device, VelocityConfig::default());

        tokio::spawn(async move {
            // Drain the S:info request, then push a fabricated announcement.
            let _ = from_core.recv().await;
            let announcement = mup1::encode(
                FrameType::Announcement,
                b"VelocitySP-v2025.06-LAN9662-ung8291 326 300 2",
            );
            let _ = to_core.send(Bytes::from(announcement)).await;
        });

        let info = controller.device_info().await.unwrap();
        assert_eq!(info.device_type, "LAN9662");
        assert_eq!(info.firmware_version, "2025.06");
        assert_eq!(info.port_count(), 2);
    }

    #[tokio::test]
    async fn save_config_detects_success_substring() {
        let (to_device, mut from_core) = mpsc::channel(8);
        let (to_core, from_device) = mpsc::channel(8);
        let transport = Arc::new(EchoTransport { out: to_device });
        let controller = Controller::new(transport, from_device, VelocityConfig::default());

        tokio::spawn(async move {
            let _ = from_core.recv().await;
            let response = mup1::encode(FrameType::System, b"success");
            let _ = to_core.send(Bytes::from(response)).await;
        });

        assert!(controller.save_config().await.unwrap());
    }

    #[tokio::test]
    async fn trace_subscriber_receives_trace_frames() {
        let (to_device, _from_core) = mpsc::channel(8);
        let (to_core, from_device) = mpsc::channel(8);
        let transport = Arc::new(EchoTransport { out: to_device });
        let controller = Controller::new(transport, from_device, VelocityConfig::default());

        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        controller
            .trace_stream(Arc::new(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            }))
            .await;

        let frame = mup1::encode(FrameType::Trace, b"hello");
        to_core.send(Bytes::from(frame)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
