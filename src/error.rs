// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `ecoflow_mqtt` library.
//!
//! The hierarchy mirrors the fault classes of the broker session: value
//! validation for outbound commands, protocol communication, frame decoding,
//! configuration loading, and device registration.
//!
//! Decode faults are values, not panics. The ingestion path reduces every
//! [`DecodeError`] to an empty field map at the frame boundary, so they never
//! reach the session loop.

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred during value validation.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// Error occurred during protocol communication.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error occurred while decoding a device frame.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Error occurred while loading configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Device was not registered with the session.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Two registered devices would share a topic.
    #[error("topic {topic} is already registered by device {owner}")]
    TopicConflict {
        /// The overlapping topic.
        topic: String,
        /// Serial number of the device that already owns it.
        owner: String,
    },
}

/// Errors related to value validation and constraints.
///
/// These errors occur when building a device command with a value the device
/// would reject.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A numeric value is outside the allowed range.
    #[error("value {actual} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Minimum allowed value.
        min: i64,
        /// Maximum allowed value.
        max: i64,
        /// The actual value that was provided.
        actual: i64,
    },

    /// A value is not one of the accepted options.
    #[error("invalid option for {field}: {value}")]
    InvalidOption {
        /// The command field.
        field: String,
        /// The rejected value.
        value: String,
    },
}

/// Errors related to broker communication.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// MQTT client request failed.
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Connection to the broker failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The broker permanently rejected the session.
    #[error("broker rejected the connection: {0}")]
    Rejected(String),

    /// Request timed out.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// Invalid broker address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A command could not be serialized.
    #[error("command serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors raised by the frame decode pipeline.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload was empty.
    #[error("empty payload")]
    Empty,

    /// Malformed protobuf wire data.
    #[error("malformed wire data at offset {offset}: {reason}")]
    Wire {
        /// Byte offset where decoding stopped.
        offset: usize,
        /// What went wrong.
        reason: String,
    },

    /// The header collection decoded but held no header.
    #[error("header collection is empty")]
    EmptyHeaderCollection,

    /// The legacy fixed header was shorter than its layout.
    #[error("legacy header needs {needed} bytes, got {actual}")]
    ShortLegacyHeader {
        /// Required length.
        needed: usize,
        /// Available length.
        actual: usize,
    },

    /// The header carried no payload bytes.
    #[error("header carries no payload")]
    MissingPayload,

    /// No catalog entry for the command pair.
    #[error("no catalog entry for cmd_id={cmd_id} cmd_func={cmd_func}")]
    UnknownMessage {
        /// Command identifier.
        cmd_id: u32,
        /// Command function.
        cmd_func: u32,
    },

    /// The payload did not match the schema selected for it.
    #[error("schema {schema} failed: {reason}")]
    Schema {
        /// Schema name.
        schema: String,
        /// What went wrong.
        reason: String,
    },

    /// JSON payload could not be parsed.
    #[error("invalid JSON payload: {0}")]
    Json(String),
}

/// Errors related to configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required setting is missing or empty.
    #[error("missing setting: {0}")]
    Missing(&'static str),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
