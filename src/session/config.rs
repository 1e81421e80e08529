// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Session configuration.

use std::time::Duration;

use uuid::Uuid;

use crate::error::ConfigError;
use crate::store::{DEFAULT_HISTORY_CAPACITY, DEFAULT_NOTIFY_INTERVAL, StoreOptions};

/// Default TLS port of the vendor broker.
pub const DEFAULT_PORT: u16 = 8883;

/// Default `from` label of command envelopes.
pub const DEFAULT_CLIENT_LABEL: &str = "HomeAssistant";

/// Sleep applied after an unexpected disconnect.
pub const DEFAULT_DISCONNECT_BACKOFF: Duration = Duration::from_secs(15);

/// Failed reconnect cycles before an unauthorized session retries.
pub const DEFAULT_UNAUTHORIZED_THRESHOLD: u32 = 10;

const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Configuration for a broker session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    host: String,
    port: u16,
    username: String,
    password: String,
    user_id: String,
    client_id: String,
    client_label: String,
    keep_alive: Duration,
    connection_timeout: Duration,
    tls: bool,
    disconnect_backoff: Duration,
    unauthorized_threshold: u32,
    store: StoreOptions,
    request_capacity: usize,
}

impl SessionConfig {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Broker host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Broker port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// MQTT username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// MQTT password.
    #[must_use]
    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    /// Account id used in command topics.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// MQTT client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// `from` label of command envelopes.
    #[must_use]
    pub fn client_label(&self) -> &str {
        &self.client_label
    }

    /// Keep-alive interval.
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    /// Time `connect` waits for the broker to accept the session.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Whether the connection uses TLS.
    #[must_use]
    pub fn tls(&self) -> bool {
        self.tls
    }

    /// Sleep applied after an unexpected disconnect.
    #[must_use]
    pub fn disconnect_backoff(&self) -> Duration {
        self.disconnect_backoff
    }

    /// Failed reconnect cycles before an unauthorized session retries.
    #[must_use]
    pub fn unauthorized_threshold(&self) -> u32 {
        self.unauthorized_threshold
    }

    /// Options for every device store of the session.
    #[must_use]
    pub fn store_options(&self) -> StoreOptions {
        self.store
    }

    /// Capacity of the MQTT client request queue.
    #[must_use]
    pub fn request_capacity(&self) -> usize {
        self.request_capacity
    }
}

/// Generates a client id of the form `ANDROID_-{UUID}_{user_id}`.
#[must_use]
pub fn generate_client_id(user_id: &str) -> String {
    let uuid = Uuid::new_v4().to_string().to_uppercase();
    format!("ANDROID_-{uuid}_{user_id}")
}

/// Builder for [`SessionConfig`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use ecoflow_mqtt::session::SessionConfig;
///
/// let config = SessionConfig::builder()
///     .host("mqtt-e.ecoflow.com")
///     .credentials("app-user", "secret")
///     .user_id("1234567890")
///     .keep_alive(Duration::from_secs(60))
///     .build()
///     .unwrap();
///
/// assert_eq!(config.port(), 8883);
/// assert!(config.client_id().starts_with("ANDROID_-"));
/// assert!(config.client_id().ends_with("_1234567890"));
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    user_id: String,
    client_id: Option<String>,
    client_label: String,
    keep_alive: Duration,
    connection_timeout: Duration,
    tls: bool,
    disconnect_backoff: Duration,
    unauthorized_threshold: u32,
    store: StoreOptions,
    request_capacity: usize,
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            credentials: None,
            user_id: String::new(),
            client_id: None,
            client_label: DEFAULT_CLIENT_LABEL.to_string(),
            keep_alive: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            tls: true,
            disconnect_backoff: DEFAULT_DISCONNECT_BACKOFF,
            unauthorized_threshold: DEFAULT_UNAUTHORIZED_THRESHOLD,
            store: StoreOptions::default(),
            request_capacity: 64,
        }
    }
}

impl SessionConfigBuilder {
    /// Sets the broker host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the broker port (default: 8883).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the MQTT username and password.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets the account id.
    #[must_use]
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Uses a fixed client id instead of a generated one.
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the `from` label of command envelopes (default: `HomeAssistant`).
    #[must_use]
    pub fn client_label(mut self, label: impl Into<String>) -> Self {
        self.client_label = label.into();
        self
    }

    /// Sets the keep-alive interval (default: 30 seconds, minimum 5).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.keep_alive = duration.max(MIN_KEEP_ALIVE);
        self
    }

    /// Sets the connect timeout (default: 10 seconds).
    #[must_use]
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.connection_timeout = duration;
        self
    }

    /// Enables or disables TLS (default: enabled).
    #[must_use]
    pub fn tls(mut self, enabled: bool) -> Self {
        self.tls = enabled;
        self
    }

    /// Sets the sleep after an unexpected disconnect (default: 15 seconds).
    #[must_use]
    pub fn disconnect_backoff(mut self, duration: Duration) -> Self {
        self.disconnect_backoff = duration;
        self
    }

    /// Sets the self-healing threshold of unauthorized sessions (default: 10).
    #[must_use]
    pub fn unauthorized_threshold(mut self, threshold: u32) -> Self {
        self.unauthorized_threshold = threshold.max(1);
        self
    }

    /// Sets the notification interval of device stores (default: 5 seconds).
    #[must_use]
    pub fn notify_interval(mut self, interval: Duration) -> Self {
        self.store.notify_interval = interval;
        self
    }

    /// Sets the history capacity of device stores (default: 20).
    #[must_use]
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.store.history_capacity = capacity;
        self
    }

    /// Sets the MQTT client request queue capacity (default: 64).
    #[must_use]
    pub fn request_capacity(mut self, capacity: usize) -> Self {
        self.request_capacity = capacity.max(1);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if the host, credentials or user id
    /// are not set.
    pub fn build(self) -> Result<SessionConfig, ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Missing("host"));
        }
        let Some((username, password)) = self.credentials else {
            return Err(ConfigError::Missing("credentials"));
        };
        if self.user_id.is_empty() {
            return Err(ConfigError::Missing("user_id"));
        }

        let client_id = self
            .client_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| generate_client_id(&self.user_id));

        Ok(SessionConfig {
            host: self.host,
            port: self.port,
            username,
            password,
            user_id: self.user_id,
            client_id,
            client_label: self.client_label,
            keep_alive: self.keep_alive,
            connection_timeout: self.connection_timeout,
            tls: self.tls,
            disconnect_backoff: self.disconnect_backoff,
            unauthorized_threshold: self.unauthorized_threshold,
            store: self.store,
            request_capacity: self.request_capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> SessionConfigBuilder {
        SessionConfig::builder()
            .host("broker.local")
            .credentials("user", "pass")
            .user_id("42")
    }

    #[test]
    fn default_values() {
        let config = builder().build().unwrap();
        assert_eq!(config.port(), 8883);
        assert_eq!(config.client_label(), "HomeAssistant");
        assert_eq!(config.keep_alive(), Duration::from_secs(30));
        assert_eq!(config.disconnect_backoff(), Duration::from_secs(15));
        assert_eq!(config.unauthorized_threshold(), 10);
        assert!(config.tls());
        assert_eq!(config.store_options().notify_interval, DEFAULT_NOTIFY_INTERVAL);
        assert_eq!(config.store_options().history_capacity, DEFAULT_HISTORY_CAPACITY);
    }

    #[test]
    fn generated_client_id_shape() {
        let id = generate_client_id("42");
        let uuid = id
            .strip_prefix("ANDROID_-")
            .and_then(|rest| rest.strip_suffix("_42"))
            .unwrap();
        assert_eq!(uuid.len(), 36);
        assert_eq!(uuid, uuid.to_uppercase());
        assert_ne!(generate_client_id("42"), id);
    }

    #[test]
    fn explicit_client_id_kept() {
        let config = builder().client_id("fixed").build().unwrap();
        assert_eq!(config.client_id(), "fixed");

        let config = builder().client_id("").build().unwrap();
        assert!(config.client_id().starts_with("ANDROID_-"));
    }

    #[test]
    fn builder_chain() {
        let config = builder()
            .port(1883)
            .tls(false)
            .client_label("Desk")
            .disconnect_backoff(Duration::from_millis(10))
            .unauthorized_threshold(3)
            .notify_interval(Duration::from_secs(1))
            .history_capacity(5)
            .build()
            .unwrap();

        assert_eq!(config.port(), 1883);
        assert!(!config.tls());
        assert_eq!(config.client_label(), "Desk");
        assert_eq!(config.disconnect_backoff(), Duration::from_millis(10));
        assert_eq!(config.unauthorized_threshold(), 3);
        assert_eq!(config.store_options().history_capacity, 5);
    }

    #[test]
    fn missing_settings_fail() {
        assert!(matches!(
            SessionConfig::builder().build(),
            Err(ConfigError::Missing("host"))
        ));
        assert!(matches!(
            SessionConfig::builder().host("h").user_id("1").build(),
            Err(ConfigError::Missing("credentials"))
        ));
        assert!(matches!(
            SessionConfig::builder().host("h").credentials("u", "p").build(),
            Err(ConfigError::Missing("user_id"))
        ));
    }
}
