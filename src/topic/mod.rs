// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topic naming and routing.
//!
//! Every device owns six topics. The [`TopicRouter`] maps an inbound topic
//! back to its device and logical [`Channel`].
//!
//! # Architecture
//!
//! ```text
//! MQTT Message: /app/device/property/SN123 → <frame>
//!                     ↓
//!             TopicRouter.resolve()
//!                     ↓
//!     linear scan of registered topic sets
//!                     ↓
//!        Route { device: SN123, channel: Telemetry }
//!                     ↓
//!           device.ingest(channel, payload)
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::device::Device;
use crate::error::{Error, Result};

/// Logical channel a topic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Device telemetry pushed by the device.
    Telemetry,
    /// Commands written to the device.
    CommandSet,
    /// Replies to written commands.
    CommandSetReply,
    /// State queries sent to the device.
    CommandGet,
    /// Replies to state queries.
    CommandGetReply,
    /// Online/offline status.
    Status,
}

impl Channel {
    /// All channels, in subscription order.
    pub const ALL: [Self; 6] = [
        Self::Telemetry,
        Self::CommandSet,
        Self::CommandSetReply,
        Self::CommandGet,
        Self::CommandGetReply,
        Self::Status,
    ];

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Telemetry => "telemetry",
            Self::CommandSet => "set",
            Self::CommandSetReply => "set_reply",
            Self::CommandGet => "get",
            Self::CommandGetReply => "get_reply",
            Self::Status => "status",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The six topics of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    telemetry: String,
    set: String,
    set_reply: String,
    get: String,
    get_reply: String,
    status: String,
}

impl TopicSet {
    /// Builds the standard topic set for a device of account `user_id`.
    #[must_use]
    pub fn new(user_id: &str, serial_number: &str) -> Self {
        let thing = format!("/app/{user_id}/{serial_number}/thing/property");
        Self {
            telemetry: format!("/app/device/property/{serial_number}"),
            set: format!("{thing}/set"),
            set_reply: format!("{thing}/set_reply"),
            get: format!("{thing}/get"),
            get_reply: format!("{thing}/get_reply"),
            status: format!("/app/device/status/{serial_number}"),
        }
    }

    /// Returns the topic of `channel`.
    #[must_use]
    pub fn topic(&self, channel: Channel) -> &str {
        match channel {
            Channel::Telemetry => &self.telemetry,
            Channel::CommandSet => &self.set,
            Channel::CommandSetReply => &self.set_reply,
            Channel::CommandGet => &self.get,
            Channel::CommandGetReply => &self.get_reply,
            Channel::Status => &self.status,
        }
    }

    /// Iterates over `(channel, topic)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Channel, &str)> {
        Channel::ALL.into_iter().map(|channel| (channel, self.topic(channel)))
    }

    /// Returns the channel of `topic` if it belongs to this set.
    #[must_use]
    pub fn channel_of(&self, topic: &str) -> Option<Channel> {
        self.iter().find(|(_, t)| *t == topic).map(|(channel, _)| channel)
    }

    /// Returns the first topic shared with `other`.
    #[must_use]
    pub fn overlap<'a>(&'a self, other: &TopicSet) -> Option<&'a str> {
        self.iter()
            .map(|(_, topic)| topic)
            .find(|topic| other.channel_of(topic).is_some())
    }
}

/// Where an inbound message belongs.
#[derive(Debug, Clone)]
pub struct Route {
    /// Owning device.
    pub device: Arc<Device>,
    /// Logical channel.
    pub channel: Channel,
}

impl Route {
    /// Serial number of the owning device.
    #[must_use]
    pub fn serial_number(&self) -> &str {
        self.device.serial_number()
    }
}

/// Resolves `topic` against `devices`. First match wins.
#[must_use]
pub fn resolve(topic: &str, devices: &[Arc<Device>]) -> Option<Route> {
    devices.iter().find_map(|device| {
        device.topics().channel_of(topic).map(|channel| Route {
            device: Arc::clone(device),
            channel,
        })
    })
}

/// Routes broker messages to registered devices.
///
/// Registration enforces that no two devices share a topic, so a resolved
/// route is unambiguous.
#[derive(Debug, Default)]
pub struct TopicRouter {
    devices: RwLock<Vec<Arc<Device>>>,
}

impl TopicRouter {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a device.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TopicConflict`] if one of the device's topics is
    /// already owned by a registered device.
    pub fn register(&self, device: Arc<Device>) -> Result<()> {
        let mut devices = self.devices.write();

        for existing in devices.iter() {
            if let Some(topic) = device.topics().overlap(existing.topics()) {
                return Err(Error::TopicConflict {
                    topic: topic.to_string(),
                    owner: existing.serial_number().to_string(),
                });
            }
        }

        tracing::debug!(
            serial_number = %device.serial_number(),
            device_type = %device.device_type(),
            "Registering device for routing"
        );
        devices.push(device);
        Ok(())
    }

    /// Unregisters a device. Returns `true` if it was registered.
    pub fn unregister(&self, serial_number: &str) -> bool {
        let mut devices = self.devices.write();
        let before = devices.len();
        devices.retain(|d| d.serial_number() != serial_number);
        before != devices.len()
    }

    /// Resolves an inbound topic.
    #[must_use]
    pub fn resolve(&self, topic: &str) -> Option<Route> {
        resolve(topic, &self.devices.read())
    }

    /// Looks up a device by serial number.
    #[must_use]
    pub fn device(&self, serial_number: &str) -> Option<Arc<Device>> {
        self.devices
            .read()
            .iter()
            .find(|d| d.serial_number() == serial_number)
            .cloned()
    }

    /// Snapshot of the registered devices.
    #[must_use]
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.read().clone()
    }

    /// Every topic of every registered device.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        self.devices
            .read()
            .iter()
            .flat_map(|d| d.topics().iter().map(|(_, t)| t.to_string()).collect::<Vec<_>>())
            .collect()
    }

    /// Number of registered devices.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.devices.read().len()
    }
}
