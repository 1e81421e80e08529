// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Account configuration files.
//!
//! Broker credentials come from the vendor's cloud API, which this crate
//! does not call. They are supplied as a JSON file instead:
//!
//! ```json
//! {
//!   "mqtt_broker": "mqtt-e.ecoflow.com",
//!   "mqtt_port": 8883,
//!   "mqtt_username": "app-user",
//!   "mqtt_password": "secret",
//!   "user_id": "1234567890",
//!   "devices": [
//!     {"serial_number": "P351ZAHAPH2R1234", "device_type": "DELTA_PRO_3", "name": "Garage"}
//!   ]
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::{DeviceKind, DeviceRegistration};
use crate::error::ConfigError;
use crate::session::{DEFAULT_PORT, SessionConfig};

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_tls() -> bool {
    true
}

/// One device entry of an account file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Device serial number.
    #[serde(alias = "device_sn")]
    pub serial_number: String,
    /// Type name such as `DELTA_PRO_3`. Unknown names use diagnostic mode.
    #[serde(default = "DeviceEntry::default_type")]
    pub device_type: String,
    /// Display name. Defaults to the serial number.
    #[serde(default)]
    pub name: Option<String>,
}

impl DeviceEntry {
    fn default_type() -> String {
        DeviceKind::Diagnostic.type_name().to_string()
    }
}

/// Broker credentials and devices of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Broker host.
    pub mqtt_broker: String,
    /// Broker port.
    #[serde(default = "default_port")]
    pub mqtt_port: u16,
    /// MQTT username.
    pub mqtt_username: String,
    /// MQTT password.
    pub mqtt_password: String,
    /// Account id.
    pub user_id: String,
    /// Fixed client id. Generated when absent.
    #[serde(default)]
    pub client_id: Option<String>,
    /// `from` label of command envelopes.
    #[serde(default)]
    pub client_label: Option<String>,
    /// Keep-alive in seconds.
    #[serde(default)]
    pub mqtt_keepalive: Option<u64>,
    /// Use TLS.
    #[serde(default = "default_tls")]
    pub tls: bool,
    /// Devices of the account.
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

impl AccountConfig {
    /// Loads an account file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or a parse
    /// error as in [`AccountConfig::from_json`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parses an account file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] for malformed JSON and
    /// [`ConfigError::Missing`] when a required value is empty.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("mqtt_broker", &self.mqtt_broker),
            ("mqtt_username", &self.mqtt_username),
            ("mqtt_password", &self.mqtt_password),
            ("user_id", &self.user_id),
        ];
        if let Some((name, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(ConfigError::Missing(*name));
        }
        if self.devices.iter().any(|d| d.serial_number.trim().is_empty()) {
            return Err(ConfigError::Missing("serial_number"));
        }
        Ok(())
    }

    /// Builds the session configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if a required value is empty.
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        let mut builder = SessionConfig::builder()
            .host(&self.mqtt_broker)
            .port(self.mqtt_port)
            .credentials(&self.mqtt_username, &self.mqtt_password)
            .user_id(&self.user_id)
            .tls(self.tls);

        if let Some(client_id) = &self.client_id {
            builder = builder.client_id(client_id);
        }
        if let Some(label) = &self.client_label {
            builder = builder.client_label(label);
        }
        if let Some(secs) = self.mqtt_keepalive {
            builder = builder.keep_alive(Duration::from_secs(secs));
        }
        builder.build()
    }

    /// Device registrations with the account's standard topics.
    #[must_use]
    pub fn registrations(&self) -> Vec<DeviceRegistration> {
        self.devices
            .iter()
            .map(|entry| {
                let kind = DeviceKind::from_type_name(&entry.device_type);
                let name = entry.name.as_deref().unwrap_or(&entry.serial_number);
                DeviceRegistration::for_account(&self.user_id, &entry.serial_number, kind, name)
            })
            .collect()
    }
}
