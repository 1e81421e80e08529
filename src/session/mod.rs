// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broker session.
//!
//! A [`Session`] owns one MQTT connection shared by every registered device.
//! It subscribes to all device topics once the broker accepts the
//! connection, routes inbound messages to their device and publishes
//! commands.
//!
//! # Examples
//!
//! ```no_run
//! use ecoflow_mqtt::command::delta_pro3;
//! use ecoflow_mqtt::device::DeviceKind;
//! use ecoflow_mqtt::session::{Session, SessionConfig};
//!
//! # async fn example() -> ecoflow_mqtt::Result<()> {
//! let config = SessionConfig::builder()
//!     .host("mqtt-e.ecoflow.com")
//!     .credentials("app-user", "secret")
//!     .user_id("1234567890")
//!     .build()?;
//!
//! let session = Session::new(config);
//! let device = session.register_device("P351ZAHAPH2R1234", DeviceKind::DeltaPro3, "Garage")?;
//!
//! session.connect().await?;
//! session.request_latest_quotas(device.serial_number());
//! session.send(device.serial_number(), &delta_pro3::max_charge_soc(90)?);
//!
//! let mut updates = device.store().subscribe();
//! while let Ok(snapshot) = updates.recv().await {
//!     println!("{:?}", snapshot.get("cms_batt_soc"));
//! }
//!
//! session.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Reconnect policy
//!
//! Transient failures (network errors, broker unavailable) are retried by
//! the network loop after the disconnect backoff. A permanent rejection
//! (bad credentials, invalid client id) stops the session and marks it
//! unauthorized; see [`ConnectionState`] for how it recovers.

mod config;
mod connection_state;

pub use config::{
    DEFAULT_CLIENT_LABEL, DEFAULT_DISCONNECT_BACKOFF, DEFAULT_PORT, DEFAULT_UNAUTHORIZED_THRESHOLD,
    SessionConfig, SessionConfigBuilder, generate_client_id,
};
pub use connection_state::{
    ConnectCode, ConnectOutcome, ConnectionState, ERROR_COUNTER_WRAP, ReconnectAction,
};

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    SubscribeFilter, Transport,
};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::FieldMap;
use crate::command::{Command, LatestQuotas, MessageIds, envelope};
use crate::device::{Device, DeviceKind, DeviceRegistration};
use crate::error::{ProtocolError, Result};
use crate::topic::{Channel, TopicRouter};

/// Reason code passed to [`ConnectionState::on_disconnect`] for connection
/// losses the session did not request.
pub const UNEXPECTED_DISCONNECT: i32 = 1;

/// Upper bound on flushing the disconnect packet during shutdown.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// No network loop is running.
    Disconnected,
    /// First connection attempt in progress.
    Connecting,
    /// The broker accepted the session.
    Connected,
    /// The connection was lost and is being retried.
    Reconnecting,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopSignal {
    Run,
    Halt,
    Shutdown,
}

struct NetworkLoop {
    signal: watch::Sender<LoopSignal>,
    task: JoinHandle<()>,
}

/// A broker session shared by all registered devices.
///
/// `Session` is cheaply cloneable (via `Arc`).
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    router: TopicRouter,
    state: Mutex<ConnectionState>,
    ids: MessageIds,
    client: Mutex<Option<AsyncClient>>,
    network: tokio::sync::Mutex<Option<NetworkLoop>>,
    phase: watch::Sender<SessionPhase>,
    shut_down: AtomicBool,
}

impl Session {
    /// Creates a session. Nothing is connected until [`Session::connect`].
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        let state = ConnectionState::new(
            config.client_id(),
            config.unauthorized_threshold(),
            config.disconnect_backoff(),
        );
        let (phase, _) = watch::channel(SessionPhase::Disconnected);

        Self {
            inner: Arc::new(SessionInner {
                config,
                router: TopicRouter::new(),
                state: Mutex::new(state),
                ids: MessageIds::new(),
                client: Mutex::new(None),
                network: tokio::sync::Mutex::new(None),
                phase,
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Session configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// MQTT client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        self.inner.config.client_id()
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        *self.inner.phase.borrow()
    }

    /// Receiver that observes phase changes.
    #[must_use]
    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.inner.phase.subscribe()
    }

    /// Returns `true` while the broker accepts the session.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.phase() == SessionPhase::Connected
    }

    /// Copy of the authorization state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state.lock().clone()
    }

    /// Topic router of the session.
    #[must_use]
    pub fn router(&self) -> &TopicRouter {
        &self.inner.router
    }

    /// Registers a device.
    ///
    /// Devices registered while connected are subscribed immediately.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TopicConflict`] if the device shares a topic
    /// with a registered device.
    pub fn register(&self, registration: DeviceRegistration) -> Result<Arc<Device>> {
        let device = Arc::new(Device::with_options(
            registration,
            self.inner.config.store_options(),
        ));
        self.inner.router.register(Arc::clone(&device))?;

        tracing::info!(
            serial_number = %device.serial_number(),
            device_type = %device.device_type(),
            name = %device.registration().name(),
            "Device registered"
        );

        if self.is_connected() {
            let topics: Vec<String> = device.topics().iter().map(|(_, t)| t.to_string()).collect();
            self.subscribe(topics);
        }
        Ok(device)
    }

    /// Registers a device with the standard topics of the session account.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TopicConflict`] if the serial number is
    /// already registered.
    pub fn register_device(
        &self,
        serial_number: &str,
        device_type: DeviceKind,
        name: &str,
    ) -> Result<Arc<Device>> {
        self.register(DeviceRegistration::for_account(
            self.inner.config.user_id(),
            serial_number,
            device_type,
            name,
        ))
    }

    /// Unregisters a device. Returns `true` if it was registered.
    pub fn unregister(&self, serial_number: &str) -> bool {
        let Some(device) = self.inner.router.device(serial_number) else {
            return false;
        };
        if let Some(client) = self.client() {
            for (_, topic) in device.topics().iter() {
                if let Err(e) = client.try_unsubscribe(topic) {
                    tracing::debug!(topic, error = %e, "Failed to unsubscribe");
                }
            }
        }
        self.inner.router.unregister(serial_number)
    }

    /// Looks up a registered device.
    #[must_use]
    pub fn device(&self, serial_number: &str) -> Option<Arc<Device>> {
        self.inner.router.device(serial_number)
    }

    /// All registered devices.
    #[must_use]
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.inner.router.devices()
    }

    /// Connects to the broker and waits until the session is accepted.
    ///
    /// Resets the authorization state. Does nothing if the network loop is
    /// already running.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Rejected`] if the broker permanently refuses
    /// the session, or [`ProtocolError::Timeout`] if it does not accept it
    /// within the connection timeout. After a timeout the network loop keeps
    /// retrying in the background.
    pub async fn connect(&self) -> std::result::Result<(), ProtocolError> {
        let config = &self.inner.config;
        if config.host().is_empty() {
            return Err(ProtocolError::InvalidAddress(
                "broker host is required".to_string(),
            ));
        }

        {
            let mut network = self.inner.network.lock().await;
            if network.as_ref().is_some_and(|n| !n.task.is_finished()) {
                tracing::debug!("Network loop already running");
                return Ok(());
            }
            self.inner.state.lock().reset();
            self.inner.shut_down.store(false, Ordering::Release);
            self.set_phase(SessionPhase::Connecting);
            *network = Some(self.spawn_network());
        }

        tracing::info!(
            host = %config.host(),
            port = config.port(),
            client_id = %config.client_id(),
            "Connecting to MQTT broker"
        );

        let mut phase = self.watch_phase();
        let timeout = config.connection_timeout();
        let settled = tokio::time::timeout(
            timeout,
            phase.wait_for(|p| matches!(p, SessionPhase::Connected | SessionPhase::Disconnected)),
        )
        .await;

        match settled {
            Ok(Ok(p)) if *p == SessionPhase::Connected => Ok(()),
            Ok(_) => {
                let code = self.inner.state.lock().last_code();
                Err(ProtocolError::Rejected(code.map_or_else(
                    || "network loop stopped".to_string(),
                    |c| c.to_string(),
                )))
            }
            Err(_) => Err(ProtocolError::Timeout(timeout.as_secs())),
        }
    }

    /// Stops the session.
    ///
    /// Unsubscribes every topic, disconnects and waits for the network loop
    /// to exit. No message is delivered to a device after this returns.
    pub async fn stop(&self) {
        self.inner.shut_down.store(true, Ordering::Release);
        self.shutdown().await;
    }

    /// Asks for a reconnect.
    ///
    /// An authorized session restarts its network loop. An unauthorized
    /// session stays stopped and counts a failed cycle; see
    /// [`ConnectionState::on_reconnect`]. Returns `false` if restarting
    /// failed.
    pub async fn reconnect(&self) -> bool {
        let action = self.inner.state.lock().on_reconnect();

        match action {
            ReconnectAction::StayStopped => {
                self.shutdown().await;
                let state = self.connection_state();
                if state.authorized() {
                    tracing::info!("Unauthorized threshold reached, reconnecting is allowed again");
                } else {
                    tracing::warn!(
                        consecutive_errors = state.consecutive_errors(),
                        "Session unauthorized, skipping reconnect"
                    );
                }
                true
            }
            ReconnectAction::Restart => {
                let mut network = self.inner.network.lock().await;
                if let Some(previous) = network.take() {
                    previous.signal.send_replace(LoopSignal::Halt);
                    if let Err(e) = previous.task.await {
                        tracing::error!(error = %e, "Network loop failed, cannot reconnect");
                        self.set_phase(SessionPhase::Disconnected);
                        return false;
                    }
                }
                tracing::info!(client_id = %self.client_id(), "Reconnecting to MQTT broker");
                self.inner.shut_down.store(false, Ordering::Release);
                self.set_phase(SessionPhase::Reconnecting);
                *network = Some(self.spawn_network());
                true
            }
        }
    }

    /// Spawns a watchdog that calls [`Session::reconnect`] every `interval`
    /// while the session is disconnected. The task ends after
    /// [`Session::stop`].
    pub fn supervise(&self, interval: Duration) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if session.inner.shut_down.load(Ordering::Acquire) {
                    break;
                }
                if session.phase() == SessionPhase::Disconnected && !session.reconnect().await {
                    tracing::warn!("Supervised reconnect failed");
                }
            }
        })
    }

    /// Publishes a command on the topic of its channel.
    pub fn send<C: Command + ?Sized>(&self, serial_number: &str, command: &C) {
        match command.channel() {
            Channel::CommandGet => self.publish_get(serial_number, command.body()),
            _ => self.publish_set(serial_number, command.value_patch(), command.body()),
        }
    }

    /// Applies `value_patch` to the device store and publishes `body` on the
    /// device's set topic.
    ///
    /// Failures are logged, never returned.
    pub fn publish_set(&self, serial_number: &str, value_patch: FieldMap, body: Value) {
        let Some(device) = self.device(serial_number) else {
            tracing::warn!(serial_number, "Cannot publish to unregistered device");
            return;
        };
        if !value_patch.is_empty() {
            device.store().force_update(value_patch);
        }
        self.publish(&device, Channel::CommandSet, body);
    }

    /// Publishes `body` on the device's get topic.
    ///
    /// Failures are logged, never returned.
    pub fn publish_get(&self, serial_number: &str, body: Value) {
        let Some(device) = self.device(serial_number) else {
            tracing::warn!(serial_number, "Cannot publish to unregistered device");
            return;
        };
        self.publish(&device, Channel::CommandGet, body);
    }

    /// Asks a device for its complete state.
    pub fn request_latest_quotas(&self, serial_number: &str) {
        self.send(serial_number, &LatestQuotas);
    }

    /// Routes one inbound message to its device.
    pub fn on_message(&self, topic: &str, payload: &[u8]) {
        let Some(route) = self.inner.router.resolve(topic) else {
            tracing::warn!(topic, "No device registered for topic, dropping message");
            return;
        };
        route.device.ingest(route.channel, payload);
    }

    fn publish(&self, device: &Device, channel: Channel, body: Value) {
        let topic = device.topics().topic(channel);
        let id = self.inner.ids.next_id();
        let message = envelope(self.inner.config.client_label(), id, body);

        let payload = match serde_json::to_vec(&message) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(topic, error = %e, "Failed to serialize command");
                return;
            }
        };

        let Some(client) = self.client() else {
            tracing::warn!(topic, "Not connected, dropping command");
            return;
        };

        match client.try_publish(topic, QoS::AtLeastOnce, false, payload) {
            Ok(()) => tracing::debug!(topic, id, "Command published"),
            Err(e) => tracing::error!(topic, id, error = %e, "Failed to publish command"),
        }
    }

    fn client(&self) -> Option<AsyncClient> {
        self.inner.client.lock().clone()
    }

    fn subscribe(&self, topics: Vec<String>) {
        if topics.is_empty() {
            return;
        }
        let Some(client) = self.client() else {
            return;
        };
        tracing::info!(?topics, "Subscribing to device topics");
        let filters = topics
            .into_iter()
            .map(|topic| SubscribeFilter::new(topic, QoS::AtLeastOnce));
        if let Err(e) = client.try_subscribe_many(filters) {
            tracing::error!(error = %e, "Failed to subscribe to device topics");
        }
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.inner.phase.send_if_modified(|current| {
            if *current == phase {
                return false;
            }
            tracing::debug!(from = %current, to = %phase, "Session phase changed");
            *current = phase;
            true
        });
    }

    fn mqtt_options(&self) -> MqttOptions {
        let config = &self.inner.config;
        let mut options = MqttOptions::new(config.client_id(), config.host(), config.port());
        options.set_keep_alive(config.keep_alive());
        options.set_clean_session(true);
        options.set_credentials(config.username(), config.password());
        if config.tls() {
            options.set_transport(Transport::tls_with_default_config());
        }
        options
    }

    fn spawn_network(&self) -> NetworkLoop {
        let (client, event_loop) =
            AsyncClient::new(self.mqtt_options(), self.inner.config.request_capacity());
        *self.inner.client.lock() = Some(client);

        let (signal, signal_rx) = watch::channel(LoopSignal::Run);
        let task = tokio::spawn(run_network_loop(self.clone(), event_loop, signal_rx));
        NetworkLoop { signal, task }
    }

    async fn shutdown(&self) {
        let mut network = self.inner.network.lock().await;

        let client = self.inner.client.lock().take();
        if let Some(client) = client {
            for topic in self.inner.router.topics() {
                if let Err(e) = client.try_unsubscribe(&topic) {
                    tracing::debug!(topic, error = %e, "Failed to unsubscribe");
                }
            }
            if let Err(e) = client.try_disconnect() {
                tracing::debug!(error = %e, "Failed to queue disconnect");
            }
        }

        if let Some(running) = network.take() {
            running.signal.send_replace(LoopSignal::Shutdown);
            if let Err(e) = running.task.await {
                tracing::error!(error = %e, "Network loop terminated abnormally");
            }
            tracing::info!(client_id = %self.client_id(), "Session stopped");
        }
        self.set_phase(SessionPhase::Disconnected);
    }

    fn handle_connect(&self, code: ConnectCode) -> ConnectOutcome {
        let outcome = self.inner.state.lock().on_connect(code);
        match outcome {
            ConnectOutcome::Subscribe => {
                tracing::info!(client_id = %self.client_id(), "Connected to MQTT broker");
                self.set_phase(SessionPhase::Connected);
                self.subscribe(self.inner.router.topics());
            }
            ConnectOutcome::Stop => {
                tracing::error!(
                    code = code.code(),
                    reason = code.description(),
                    "Broker rejected the session, stopping"
                );
                self.inner.client.lock().take();
                self.set_phase(SessionPhase::Disconnected);
            }
            ConnectOutcome::Retry => {
                tracing::error!(
                    code = code.code(),
                    reason = code.description(),
                    "Connection attempt failed"
                );
                self.set_phase(SessionPhase::Reconnecting);
            }
        }
        outcome
    }

    fn handle_disconnect(&self, reason: i32, error: Option<&ConnectionError>) -> Option<Duration> {
        let (retry_after, consecutive_errors) = {
            let mut state = self.inner.state.lock();
            let retry_after = state.on_disconnect(reason);
            (retry_after, state.consecutive_errors())
        };

        if let Some(delay) = retry_after {
            match error {
                Some(e) => tracing::error!(
                    error = %e,
                    consecutive_errors,
                    retry_after_secs = delay.as_secs(),
                    "Unexpected disconnect"
                ),
                None => tracing::error!(
                    consecutive_errors,
                    retry_after_secs = delay.as_secs(),
                    "Broker closed the connection"
                ),
            }
            if self.phase() != SessionPhase::Connecting {
                self.set_phase(SessionPhase::Reconnecting);
            }
        }
        retry_after
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.inner.config.host())
            .field("port", &self.inner.config.port())
            .field("client_id", &self.client_id())
            .field("phase", &self.phase())
            .field("devices", &self.inner.router.device_count())
            .finish()
    }
}

/// Drives the MQTT event loop until halted, shut down or rejected.
async fn run_network_loop(
    session: Session,
    mut event_loop: EventLoop,
    mut signal: watch::Receiver<LoopSignal>,
) {
    loop {
        let event = tokio::select! {
            changed = signal.changed() => {
                let shutdown = changed.is_ok() && *signal.borrow() == LoopSignal::Shutdown;
                if shutdown && session.is_connected() {
                    flush_disconnect(&mut event_loop).await;
                }
                break;
            }
            event = event_loop.poll() => event,
        };

        let retry_after = match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if session.handle_connect(ConnectCode::from(ack.code)) == ConnectOutcome::Stop {
                    break;
                }
                None
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                tracing::debug!(
                    topic = %publish.topic,
                    bytes = publish.payload.len(),
                    "MQTT message received"
                );
                session.on_message(&publish.topic, &publish.payload);
                None
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::debug!(?suback, "MQTT subscription acknowledged");
                None
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                session.handle_disconnect(UNEXPECTED_DISCONNECT, None)
            }
            Ok(_) => None,
            Err(ConnectionError::ConnectionRefused(code)) => {
                let code = ConnectCode::from(code);
                if session.handle_connect(code) == ConnectOutcome::Stop {
                    break;
                }
                session.handle_disconnect(code.code(), None)
            }
            Err(e) => session.handle_disconnect(UNEXPECTED_DISCONNECT, Some(&e)),
        };

        if let Some(delay) = retry_after {
            tokio::select! {
                _ = signal.changed() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
    tracing::debug!("Network loop exited");
}

async fn flush_disconnect(event_loop: &mut EventLoop) {
    let drain = async {
        loop {
            match event_loop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    };
    if tokio::time::timeout(FLUSH_TIMEOUT, drain).await.is_err() {
        tracing::debug!("Disconnect not flushed before timeout");
    }
}
