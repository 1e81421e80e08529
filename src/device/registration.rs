// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device kinds and registrations.

use std::fmt;
use std::sync::{Arc, LazyLock};

use crate::catalog::{Catalog, delta_pro3};
use crate::topic::TopicSet;

static DELTA_PRO3_CATALOG: LazyLock<Arc<Catalog>> = LazyLock::new(|| Arc::new(delta_pro3::catalog()));

/// Wire format of a device's telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    /// JSON `{"params": {...}}` objects.
    Json,
    /// Binary protobuf frames decoded through a catalog.
    Protobuf,
}

/// Supported device types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// Delta Pro 3 (protobuf frames).
    DeltaPro3,
    /// Delta Pro.
    DeltaPro,
    /// Delta Max.
    DeltaMax,
    /// Delta 2.
    Delta2,
    /// Delta 2 Max.
    Delta2Max,
    /// River 2.
    River2,
    /// River 2 Max.
    River2Max,
    /// River 2 Pro.
    River2Pro,
    /// Any other device. Keeps a raw history of every update.
    Diagnostic,
}

impl DeviceKind {
    /// Parses a configured type name such as `DELTA_PRO_3`.
    ///
    /// Unrecognized names map to [`DeviceKind::Diagnostic`].
    #[must_use]
    pub fn from_type_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "DELTA_PRO_3" => Self::DeltaPro3,
            "DELTA_PRO" => Self::DeltaPro,
            "DELTA_MAX" => Self::DeltaMax,
            "DELTA_2" => Self::Delta2,
            "DELTA_2_MAX" => Self::Delta2Max,
            "RIVER_2" => Self::River2,
            "RIVER_2_MAX" => Self::River2Max,
            "RIVER_2_PRO" => Self::River2Pro,
            "DIAGNOSTIC" => Self::Diagnostic,
            other => {
                tracing::warn!(device_type = %other, "Unknown device type, using diagnostic mode");
                Self::Diagnostic
            }
        }
    }

    /// Configured type name.
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::DeltaPro3 => "DELTA_PRO_3",
            Self::DeltaPro => "DELTA_PRO",
            Self::DeltaMax => "DELTA_MAX",
            Self::Delta2 => "DELTA_2",
            Self::Delta2Max => "DELTA_2_MAX",
            Self::River2 => "RIVER_2",
            Self::River2Max => "RIVER_2_MAX",
            Self::River2Pro => "RIVER_2_PRO",
            Self::Diagnostic => "DIAGNOSTIC",
        }
    }

    /// Telemetry wire format.
    #[must_use]
    pub const fn payload_format(self) -> PayloadFormat {
        match self {
            Self::DeltaPro3 => PayloadFormat::Protobuf,
            _ => PayloadFormat::Json,
        }
    }

    /// Whether the store keeps a raw history of updates.
    #[must_use]
    pub const fn collects_raw(self) -> bool {
        matches!(self, Self::Diagnostic)
    }

    /// Message catalog for protobuf devices, shared by every device of the
    /// same kind.
    #[must_use]
    pub fn catalog(self) -> Option<Arc<Catalog>> {
        match self {
            Self::DeltaPro3 => Some(Arc::clone(&*DELTA_PRO3_CATALOG)),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Immutable description of one provisioned device.
#[derive(Debug, Clone)]
pub struct DeviceRegistration {
    serial_number: String,
    device_type: DeviceKind,
    name: String,
    topics: TopicSet,
    catalog: Option<Arc<Catalog>>,
    payload_format: PayloadFormat,
}

impl DeviceRegistration {
    /// Creates a registration with the catalog and format of `device_type`.
    #[must_use]
    pub fn new(
        serial_number: impl Into<String>,
        device_type: DeviceKind,
        name: impl Into<String>,
        topics: TopicSet,
    ) -> Self {
        Self {
            serial_number: serial_number.into(),
            device_type,
            name: name.into(),
            topics,
            catalog: device_type.catalog(),
            payload_format: device_type.payload_format(),
        }
    }

    /// Creates a registration with the standard topics of account `user_id`.
    #[must_use]
    pub fn for_account(
        user_id: &str,
        serial_number: impl Into<String>,
        device_type: DeviceKind,
        name: impl Into<String>,
    ) -> Self {
        let serial_number = serial_number.into();
        let topics = TopicSet::new(user_id, &serial_number);
        Self::new(serial_number, device_type, name, topics)
    }

    /// Replaces the catalog, switching the device to protobuf frames.
    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = Some(catalog);
        self.payload_format = PayloadFormat::Protobuf;
        self
    }

    /// Device serial number.
    #[must_use]
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    /// Device type.
    #[must_use]
    pub fn device_type(&self) -> DeviceKind {
        self.device_type
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Device topics.
    #[must_use]
    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }

    /// Message catalog, if the device speaks protobuf.
    #[must_use]
    pub fn catalog(&self) -> Option<&Arc<Catalog>> {
        self.catalog.as_ref()
    }

    /// Telemetry wire format.
    #[must_use]
    pub fn payload_format(&self) -> PayloadFormat {
        self.payload_format
    }
}
