// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Devices and payload ingestion.
//!
//! A [`Device`] pairs an immutable [`DeviceRegistration`] with the
//! [`DeviceDataStore`] that owns its state. The session hands every routed
//! message to [`Device::ingest`], which decodes it according to the
//! device's payload format and channel.
//!
//! | Channel           | Effect |
//! |-------------------|--------|
//! | telemetry         | decoded fields merged (throttled notify) |
//! | set / get         | echoed command recorded in its history |
//! | set reply         | reply recorded |
//! | get reply         | reply recorded, its fields merged (immediate notify) |
//! | status            | status fields merged (immediate notify) |

mod registration;

pub use registration::{DeviceKind, DeviceRegistration, PayloadFormat};

use serde_json::Value;

use crate::FieldMap;
use crate::error::DecodeError;
use crate::frame;
use crate::store::{DeviceDataStore, History, StoreOptions};
use crate::topic::{Channel, TopicSet};

/// A registered device and its state.
#[derive(Debug)]
pub struct Device {
    registration: DeviceRegistration,
    store: DeviceDataStore,
}

impl Device {
    /// Creates a device with default store options.
    #[must_use]
    pub fn new(registration: DeviceRegistration) -> Self {
        Self::with_options(registration, StoreOptions::default())
    }

    /// Creates a device. Raw collection follows the device type.
    #[must_use]
    pub fn with_options(registration: DeviceRegistration, options: StoreOptions) -> Self {
        let options = StoreOptions {
            collect_raw: options.collect_raw || registration.device_type().collects_raw(),
            ..options
        };
        Self {
            registration,
            store: DeviceDataStore::new(options),
        }
    }

    /// Registration data.
    #[must_use]
    pub fn registration(&self) -> &DeviceRegistration {
        &self.registration
    }

    /// Serial number.
    #[must_use]
    pub fn serial_number(&self) -> &str {
        self.registration.serial_number()
    }

    /// Device type.
    #[must_use]
    pub fn device_type(&self) -> DeviceKind {
        self.registration.device_type()
    }

    /// Topics.
    #[must_use]
    pub fn topics(&self) -> &TopicSet {
        self.registration.topics()
    }

    /// State store.
    #[must_use]
    pub fn store(&self) -> &DeviceDataStore {
        &self.store
    }

    /// Decodes a telemetry payload into flat fields.
    ///
    /// # Errors
    ///
    /// Returns the [`DecodeError`] of the frame pipeline, or
    /// [`DecodeError::Json`] for malformed JSON telemetry.
    pub fn decode_telemetry(&self, payload: &[u8]) -> Result<FieldMap, DecodeError> {
        match (self.registration.payload_format(), self.registration.catalog()) {
            (PayloadFormat::Protobuf, Some(catalog)) => {
                frame::decode_frame(payload, catalog).map(|frame| frame.fields)
            }
            _ => json_params(payload),
        }
    }

    /// Handles one routed message.
    ///
    /// Decode failures are logged and leave the store untouched.
    pub fn ingest(&self, channel: Channel, payload: &[u8]) {
        let serial_number = self.serial_number();
        tracing::debug!(serial_number, %channel, bytes = payload.len(), "Ingesting message");

        match channel {
            Channel::Telemetry => match self.decode_telemetry(payload) {
                Ok(fields) if fields.is_empty() => {
                    tracing::debug!(serial_number, "Telemetry carried no fields");
                }
                Ok(fields) => {
                    self.store.update(fields);
                }
                Err(err) => self.log_decode_error(channel, &err),
            },
            Channel::CommandSet => {
                self.record(History::SetCommands, payload);
            }
            Channel::CommandSetReply => {
                self.record(History::SetReplies, payload);
            }
            Channel::CommandGet => {
                self.record(History::GetCommands, payload);
            }
            Channel::CommandGetReply => {
                if let Some(message) = self.record(History::GetReplies, payload) {
                    let fields = reply_fields(&message);
                    if !fields.is_empty() {
                        self.store.force_update(fields);
                    }
                }
            }
            Channel::Status => match json_params(payload) {
                Ok(fields) if !fields.is_empty() => self.store.force_update(fields),
                Ok(_) => {}
                Err(err) => self.log_decode_error(channel, &err),
            },
        }
    }

    /// Decodes an echoed command or reply and appends it to `history`.
    fn record(&self, history: History, payload: &[u8]) -> Option<Value> {
        let message = match serde_json::from_slice::<Value>(payload) {
            Ok(value) => value,
            Err(json_err) => match self.registration.catalog() {
                Some(catalog) => match frame::decode_frame(payload, catalog) {
                    Ok(frame) => Value::Object(frame.fields),
                    Err(err) => {
                        self.log_decode_error_history(history, &err);
                        return None;
                    }
                },
                None => {
                    let err = DecodeError::Json(json_err.to_string());
                    self.log_decode_error_history(history, &err);
                    return None;
                }
            },
        };

        self.store.record(history, message.clone());
        Some(message)
    }

    fn log_decode_error(&self, channel: Channel, err: &DecodeError) {
        match err {
            DecodeError::UnknownMessage { .. } | DecodeError::Schema { .. } => {
                tracing::warn!(serial_number = %self.serial_number(), %channel, error = %err, "Could not decode message");
            }
            _ => {
                tracing::debug!(serial_number = %self.serial_number(), %channel, error = %err, "Dropping undecodable message");
            }
        }
    }

    fn log_decode_error_history(&self, history: History, err: &DecodeError) {
        tracing::debug!(
            serial_number = %self.serial_number(),
            ?history,
            error = %err,
            "Dropping undecodable command echo"
        );
    }
}

/// Extracts `params` from a JSON message.
fn json_params(payload: &[u8]) -> Result<FieldMap, DecodeError> {
    let value: Value =
        serde_json::from_slice(payload).map_err(|e| DecodeError::Json(e.to_string()))?;
    match value {
        Value::Object(mut object) => match object.remove("params") {
            Some(Value::Object(params)) => Ok(params),
            _ => Err(DecodeError::Json("message has no params object".to_string())),
        },
        _ => Err(DecodeError::Json("message is not an object".to_string())),
    }
}

/// Fields carried by a get reply.
///
/// Replies to `latestQuotas` nest the state under `data.quotaMap`; other
/// replies use `params` or, for decoded frames, the top level.
fn reply_fields(message: &Value) -> FieldMap {
    let nested = message
        .pointer("/data/quotaMap")
        .or_else(|| message.get("params"))
        .and_then(Value::as_object);

    match (nested, message) {
        (Some(fields), _) => fields.clone(),
        (None, Value::Object(object)) if !object.contains_key("data") && !object.contains_key("id") => {
            object.clone()
        }
        _ => FieldMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::wire::encode;
    use crate::frame::{KeyMode, xor_decode};
    use serde_json::json;

    fn device(kind: DeviceKind) -> Device {
        Device::new(DeviceRegistration::for_account("42", "SN1", kind, "Test"))
    }

    fn dp3_summary_frame() -> Vec<u8> {
        let mut record = Vec::new();
        encode::field_varint(4, 5312, &mut record);
        encode::field_varint(15, 87, &mut record);
        let mut pdata = Vec::new();
        encode::field_bytes(1, &record, &mut pdata);
        let pdata = xor_decode(&pdata, 7, KeyMode::Fixed);

        let mut header = Vec::new();
        encode::field_bytes(1, &pdata, &mut header);
        encode::field_varint(2, 1, &mut header);
        encode::field_varint(6, 1, &mut header);
        encode::field_varint(8, 32, &mut header);
        encode::field_varint(9, 2, &mut header);
        encode::field_varint(14, 7, &mut header);
        let mut frame = Vec::new();
        encode::field_bytes(1, &header, &mut frame);
        frame
    }

    #[test]
    fn json_telemetry_merges_params() {
        let device = device(DeviceKind::Delta2);
        device.ingest(
            Channel::Telemetry,
            br#"{"id":1,"version":"1.0","params":{"bms_bmsStatus.soc":81,"pd.wattsOutSum":120}}"#,
        );
        assert_eq!(device.store().get("bms_bmsStatus.soc"), Some(json!(81)));
        assert_eq!(device.store().get("pd.wattsOutSum"), Some(json!(120)));
    }

    #[test]
    fn json_telemetry_without_params_is_dropped() {
        let device = device(DeviceKind::Delta2);
        device.ingest(Channel::Telemetry, br#"{"soc":1}"#);
        device.ingest(Channel::Telemetry, b"not json");
        assert!(device.store().snapshot().is_empty());
        assert!(device.decode_telemetry(b"[1]").is_err());
    }

    #[test]
    fn protobuf_telemetry_decodes_frames() {
        let device = device(DeviceKind::DeltaPro3);
        device.ingest(Channel::Telemetry, &dp3_summary_frame());
        assert_eq!(device.store().get("cms_batt_soc"), Some(json!(87)));
        assert_eq!(device.store().get("cms_batt_vol"), Some(json!(5312)));
    }

    #[test]
    fn protobuf_garbage_leaves_store_untouched() {
        let device = device(DeviceKind::DeltaPro3);
        device.ingest(Channel::Telemetry, b"\xFF\xFF");
        assert!(device.store().snapshot().is_empty());
    }

    #[test]
    fn command_echoes_are_recorded() {
        let device = device(DeviceKind::DeltaPro3);
        device.ingest(Channel::CommandSet, br#"{"id":"1","params":{"id":38,"enBeep":true}}"#);
        device.ingest(Channel::CommandSetReply, br#"{"id":"1","data":{"ack":0}}"#);
        device.ingest(Channel::CommandGet, br#"{"id":"2","operateType":"latestQuotas"}"#);

        let store = device.store();
        assert_eq!(store.history(History::SetCommands).len(), 1);
        assert_eq!(store.history(History::SetReplies)[0].payload["data"]["ack"], json!(0));
        assert_eq!(store.history(History::GetCommands).len(), 1);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn binary_command_echo_is_decoded() {
        let device = device(DeviceKind::DeltaPro3);
        device.ingest(Channel::CommandSet, &dp3_summary_frame());
        let history = device.store().history(History::SetCommands);
        assert_eq!(history[0].payload["cms_batt_soc"], json!(87));
    }

    #[test]
    fn get_reply_merges_quota_map() {
        let device = device(DeviceKind::River2);
        let mut rx = device.store().subscribe();
        device.ingest(
            Channel::CommandGetReply,
            br#"{"id":"5","operateType":"latestQuotas","data":{"online":1,"quotaMap":{"pd.soc":64}}}"#,
        );

        assert_eq!(device.store().get("pd.soc"), Some(json!(64)));
        assert_eq!(device.store().history(History::GetReplies).len(), 1);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn status_merges_params() {
        let device = device(DeviceKind::DeltaPro3);
        device.ingest(Channel::Status, br#"{"id":"9","params":{"status":0}}"#);
        assert_eq!(device.store().get("status"), Some(json!(0)));
    }

    #[test]
    fn diagnostic_devices_collect_raw() {
        let device = device(DeviceKind::Diagnostic);
        device.ingest(Channel::Telemetry, br#"{"params":{"x":1}}"#);
        assert_eq!(device.store().history(History::Raw).len(), 1);

        let device = self::device(DeviceKind::Delta2);
        device.ingest(Channel::Telemetry, br#"{"params":{"x":1}}"#);
        assert!(device.store().history(History::Raw).is_empty());
    }

    #[test]
    fn reply_fields_shapes() {
        assert_eq!(
            Value::Object(reply_fields(&json!({"params": {"a": 1}}))),
            json!({"a": 1})
        );
        assert_eq!(
            Value::Object(reply_fields(&json!({"cms_batt_soc": 87}))),
            json!({"cms_batt_soc": 87})
        );
        assert!(reply_fields(&json!({"id": "1", "data": {"ack": 0}})).is_empty());
        assert!(reply_fields(&json!([1, 2])).is_empty());
    }
}
