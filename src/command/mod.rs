// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outbound commands.
//!
//! Commands are JSON objects published to a device's set or get topic. The
//! session wraps every body in an envelope:
//!
//! ```text
//! {"from": "<client label>", "id": "<message id>", "version": "1.0", ...body}
//! ```
//!
//! Body fields override envelope fields with the same name.
//!
//! # Available Commands
//!
//! | Type | Topic | Purpose |
//! |------|-------|---------|
//! | [`DeviceCommand`] | set | Change one setting, with an optimistic local patch |
//! | [`LatestQuotas`] | get | Ask the device for its full state |
//!
//! Typed Delta Pro 3 builders live in [`delta_pro3`].
//!
//! # Examples
//!
//! ```
//! use ecoflow_mqtt::command::{Command, delta_pro3};
//!
//! let cmd = delta_pro3::max_charge_soc(90).unwrap();
//! assert_eq!(cmd.value_patch()["cms_max_chg_soc"], 90);
//! assert_eq!(cmd.body()["params"]["id"], 49);
//!
//! assert!(delta_pro3::max_charge_soc(40).is_err());
//! ```

pub mod delta_pro3;

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use serde_json::{Value, json};

use crate::FieldMap;
use crate::topic::Channel;

/// Base of the random message id seed.
pub const MESSAGE_ID_BASE: u64 = 999_900_000;

/// Envelope protocol version.
pub const ENVELOPE_VERSION: &str = "1.0";

/// A command that can be published to a device.
pub trait Command {
    /// JSON body merged into the envelope.
    fn body(&self) -> Value;

    /// Fields applied to the local store before publishing.
    fn value_patch(&self) -> FieldMap {
        FieldMap::new()
    }

    /// Topic channel the command is published on.
    fn channel(&self) -> Channel {
        Channel::CommandSet
    }
}

/// A settings change for one device field.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCommand {
    target_key: String,
    value: Value,
    body: Value,
}

impl DeviceCommand {
    /// Creates a command that sets `target_key` to `value` once `body` is
    /// accepted by the device.
    #[must_use]
    pub fn new(target_key: impl Into<String>, value: impl Into<Value>, body: Value) -> Self {
        Self {
            target_key: target_key.into(),
            value: value.into(),
            body,
        }
    }

    /// Store key updated optimistically.
    #[must_use]
    pub fn target_key(&self) -> &str {
        &self.target_key
    }

    /// Value written to the target key.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl Command for DeviceCommand {
    fn body(&self) -> Value {
        self.body.clone()
    }

    fn value_patch(&self) -> FieldMap {
        let mut patch = FieldMap::new();
        patch.insert(self.target_key.clone(), self.value.clone());
        patch
    }
}

/// Request for the complete current state of a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatestQuotas;

impl Command for LatestQuotas {
    fn body(&self) -> Value {
        json!({
            "version": "1.1",
            "moduleType": 0,
            "operateType": "latestQuotas",
            "params": {}
        })
    }

    fn channel(&self) -> Channel {
        Channel::CommandGet
    }
}

/// Per-session generator of envelope ids.
///
/// Seeded once from a random base; every call returns the next integer, so
/// ids are unique within a session.
#[derive(Debug)]
pub struct MessageIds {
    last: AtomicU64,
}

impl MessageIds {
    /// Creates a generator seeded at `999_900_000 + rand(10_000..=99_999)`.
    #[must_use]
    pub fn new() -> Self {
        let offset: u64 = rand::thread_rng().gen_range(10_000..=99_999);
        Self::with_seed(MESSAGE_ID_BASE + offset)
    }

    /// Creates a generator whose first id is `seed + 1`.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            last: AtomicU64::new(seed),
        }
    }

    /// Returns the next id.
    pub fn next_id(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Default for MessageIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps `body` in the message envelope.
///
/// Non-object bodies are placed under `params`.
#[must_use]
pub fn envelope(from: &str, id: u64, body: Value) -> Value {
    let mut message = FieldMap::new();
    message.insert("from".into(), Value::from(from));
    message.insert("id".into(), Value::from(id.to_string()));
    message.insert("version".into(), Value::from(ENVELOPE_VERSION));

    match body {
        Value::Object(fields) => message.extend(fields),
        Value::Null => {}
        other => {
            message.insert("params".into(), other);
        }
    }

    Value::Object(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_increase_from_seed() {
        let ids = MessageIds::with_seed(999_910_000);
        assert_eq!(ids.next_id(), 999_910_001);
        assert_eq!(ids.next_id(), 999_910_002);
    }

    #[test]
    fn random_seed_in_range() {
        for _ in 0..50 {
            let first = MessageIds::new().next_id();
            assert!((999_910_001..=1_000_000_000).contains(&first), "{first}");
        }
    }

    #[test]
    fn ids_unique_across_threads() {
        let ids = std::sync::Arc::new(MessageIds::with_seed(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = std::sync::Arc::clone(&ids);
                std::thread::spawn(move || (0..250).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 1000);
    }

    #[test]
    fn envelope_wraps_body() {
        let message = envelope(
            "HomeAssistant",
            999_912_345,
            json!({"moduleType": 0, "operateType": "TCP", "params": {"id": 38, "enBeep": true}}),
        );
        assert_eq!(
            message,
            json!({
                "from": "HomeAssistant",
                "id": "999912345",
                "version": "1.0",
                "moduleType": 0,
                "operateType": "TCP",
                "params": {"id": 38, "enBeep": true}
            })
        );
    }

    #[test]
    fn body_overrides_envelope_version() {
        let message = envelope("HomeAssistant", 1, LatestQuotas.body());
        assert_eq!(message["version"], json!("1.1"));
        assert_eq!(message["operateType"], json!("latestQuotas"));
        assert_eq!(message["id"], json!("1"));
    }

    #[test]
    fn non_object_body_goes_to_params() {
        let message = envelope("x", 1, json!([1, 2]));
        assert_eq!(message["params"], json!([1, 2]));
    }

    #[test]
    fn device_command_patch() {
        let cmd = DeviceCommand::new("en_beep", true, json!({"params": {"enBeep": true}}));
        assert_eq!(cmd.target_key(), "en_beep");
        assert_eq!(cmd.value(), &json!(true));
        assert_eq!(Value::Object(cmd.value_patch()), json!({"en_beep": true}));
        assert_eq!(cmd.channel(), Channel::CommandSet);
        assert!(LatestQuotas.value_patch().is_empty());
        assert_eq!(LatestQuotas.channel(), Channel::CommandGet);
    }
}
