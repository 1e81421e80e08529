// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `EcoFlow` MQTT - A Rust library to monitor and control `EcoFlow` power
//! stations over the vendor's MQTT broker.
//!
//! The broker carries two kinds of device traffic: JSON messages for older
//! devices, and binary protobuf frames for newer ones such as the Delta Pro 3.
//! This library decodes both into flat key/value telemetry and publishes
//! settings commands back.
//!
//! # Supported Features
//!
//! - **Session management**: TLS broker connection, subscriptions on connect,
//!   authorization-aware reconnect
//! - **Frame decoding**: base64 armor, header collection and legacy header
//!   layouts, XOR deobfuscation, `(cmd_id, cmd_func)` message dispatch
//! - **Field transforms**: renaming, unit scaling and flattening into
//!   stable snake_case keys
//! - **Device state**: per-device store with bounded command histories and
//!   throttled snapshot notifications
//! - **Commands**: validated Delta Pro 3 settings and state queries
//!
//! # Supported Devices
//!
//! - Delta Pro 3 (protobuf frames)
//! - Delta Pro, Delta Max, Delta 2, Delta 2 Max, River 2 family (JSON)
//! - Any other device in diagnostic mode (JSON, raw history)
//!
//! # Quick Start
//!
//! ```no_run
//! use ecoflow_mqtt::{AccountConfig, Session};
//!
//! #[tokio::main]
//! async fn main() -> ecoflow_mqtt::Result<()> {
//!     let account = AccountConfig::from_file("account.json")?;
//!     let session = Session::new(account.session_config()?);
//!
//!     for registration in account.registrations() {
//!         session.register(registration)?;
//!     }
//!     session.connect().await?;
//!
//!     for device in session.devices() {
//!         session.request_latest_quotas(device.serial_number());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Decoding a Frame
//!
//! ```
//! use ecoflow_mqtt::catalog::delta_pro3;
//! use ecoflow_mqtt::frame::decode_frame_lossy;
//!
//! let catalog = delta_pro3::catalog();
//! let fields = decode_frame_lossy(b"not a frame", &catalog);
//! assert!(fields.is_empty());
//! ```

pub mod catalog;
pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod session;
pub mod store;
pub mod topic;
pub mod transform;

/// Flat field map produced by decoding and stored per device.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

pub use catalog::Catalog;
pub use command::{Command, DeviceCommand, LatestQuotas};
pub use config::AccountConfig;
pub use device::{Device, DeviceKind, DeviceRegistration, PayloadFormat};
pub use error::{ConfigError, DecodeError, Error, ProtocolError, Result, ValueError};
pub use frame::{DecodedFrame, Header, decode_frame, decode_frame_lossy};
pub use session::{Session, SessionConfig, SessionPhase};
pub use store::{DeviceDataStore, History, HistoryEntry};
pub use topic::{Channel, Route, TopicRouter, TopicSet};
