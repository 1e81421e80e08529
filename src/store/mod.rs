// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-device data store.
//!
//! The store owns the latest flattened fields of one device, bounded
//! histories of commands and replies, and a throttled change stream.
//!
//! # Throttling
//!
//! Telemetry can arrive several times per second. [`DeviceDataStore::update`]
//! merges every frame but broadcasts at most once per notify interval
//! (5 seconds by default), always sending the full parameter map.
//! [`DeviceDataStore::force_update`] broadcasts immediately.
//!
//! # Examples
//!
//! ```
//! use ecoflow_mqtt::store::DeviceDataStore;
//! use serde_json::json;
//!
//! let store = DeviceDataStore::default();
//! let mut rx = store.subscribe();
//!
//! let mut patch = serde_json::Map::new();
//! patch.insert("cms_max_chg_soc".into(), json!(90));
//! store.force_update(patch);
//!
//! let snapshot = rx.try_recv().unwrap();
//! assert_eq!(snapshot["cms_max_chg_soc"], 90);
//! ```

mod ring_buffer;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::FieldMap;

pub use ring_buffer::RingBuffer;

/// Default interval between throttled notifications.
pub const DEFAULT_NOTIFY_INTERVAL: Duration = Duration::from_secs(5);

/// Default capacity of each history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// Default number of snapshots buffered per subscriber.
const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Store tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Minimum time between throttled notifications.
    pub notify_interval: Duration,
    /// Capacity of each history buffer.
    pub history_capacity: usize,
    /// Keep a raw history of every update.
    pub collect_raw: bool,
    /// Snapshots buffered per subscriber before the oldest is dropped.
    pub channel_capacity: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            notify_interval: DEFAULT_NOTIFY_INTERVAL,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            collect_raw: false,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// One timestamped history entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    /// When the entry was recorded.
    pub received_at: DateTime<Utc>,
    /// Recorded message.
    pub payload: Value,
}

impl HistoryEntry {
    fn now(payload: Value) -> Self {
        Self {
            received_at: Utc::now(),
            payload,
        }
    }
}

/// Which history to read or append to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum History {
    /// Commands written to the device.
    SetCommands,
    /// Replies to written commands.
    SetReplies,
    /// Queries sent to the device.
    GetCommands,
    /// Replies to queries.
    GetReplies,
    /// Every update, for diagnostic devices.
    Raw,
}

#[derive(Debug)]
struct Inner {
    params: FieldMap,
    set_commands: RingBuffer<HistoryEntry>,
    set_replies: RingBuffer<HistoryEntry>,
    get_commands: RingBuffer<HistoryEntry>,
    get_replies: RingBuffer<HistoryEntry>,
    raw_data: RingBuffer<HistoryEntry>,
    last_broadcast: Instant,
}

impl Inner {
    fn history_mut(&mut self, history: History) -> &mut RingBuffer<HistoryEntry> {
        match history {
            History::SetCommands => &mut self.set_commands,
            History::SetReplies => &mut self.set_replies,
            History::GetCommands => &mut self.get_commands,
            History::GetReplies => &mut self.get_replies,
            History::Raw => &mut self.raw_data,
        }
    }

    fn take_snapshot(&mut self, now: Instant) -> Arc<FieldMap> {
        self.last_broadcast = now;
        Arc::new(self.params.clone())
    }
}

/// Latest state and histories of one device.
///
/// All mutation goes through one mutex, so updates of a device are applied
/// in order. Snapshots are broadcast after the lock is released.
#[derive(Debug)]
pub struct DeviceDataStore {
    inner: Mutex<Inner>,
    sender: broadcast::Sender<Arc<FieldMap>>,
    options: StoreOptions,
}

impl DeviceDataStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(options: StoreOptions) -> Self {
        let capacity = options.history_capacity;
        let (sender, _) = broadcast::channel(options.channel_capacity.max(1));
        Self {
            inner: Mutex::new(Inner {
                params: FieldMap::new(),
                set_commands: RingBuffer::new(capacity),
                set_replies: RingBuffer::new(capacity),
                get_commands: RingBuffer::new(capacity),
                get_replies: RingBuffer::new(capacity),
                raw_data: RingBuffer::new(capacity),
                last_broadcast: Instant::now(),
            }),
            sender,
            options,
        }
    }

    /// Store options.
    #[must_use]
    pub fn options(&self) -> StoreOptions {
        self.options
    }

    /// Merges `fields` and broadcasts if the notify interval has elapsed.
    ///
    /// Returns `true` when a snapshot was broadcast.
    pub fn update(&self, fields: FieldMap) -> bool {
        let snapshot = {
            let mut inner = self.inner.lock();
            if self.options.collect_raw {
                inner
                    .raw_data
                    .push(HistoryEntry::now(Value::Object(fields.clone())));
            }
            inner.params.extend(fields);

            let now = Instant::now();
            if now.duration_since(inner.last_broadcast) > self.options.notify_interval {
                Some(inner.take_snapshot(now))
            } else {
                None
            }
        };

        snapshot.is_some_and(|snapshot| {
            self.broadcast(snapshot);
            true
        })
    }

    /// Merges `patch` and broadcasts immediately.
    pub fn force_update(&self, patch: FieldMap) {
        let snapshot = {
            let mut inner = self.inner.lock();
            inner.params.extend(patch);
            inner.take_snapshot(Instant::now())
        };
        self.broadcast(snapshot);
    }

    fn broadcast(&self, snapshot: Arc<FieldMap>) {
        tracing::trace!(fields = snapshot.len(), "Broadcasting device snapshot");
        // No subscribers is not an error
        let _ = self.sender.send(snapshot);
    }

    /// Subscribes to snapshots. Slow receivers lose the oldest ones.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<FieldMap>> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Copy of the current parameters.
    #[must_use]
    pub fn snapshot(&self) -> FieldMap {
        self.inner.lock().params.clone()
    }

    /// Current value of one parameter.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().params.get(key).cloned()
    }

    /// Appends to a history.
    pub fn record(&self, history: History, payload: Value) {
        self.inner
            .lock()
            .history_mut(history)
            .push(HistoryEntry::now(payload));
    }

    /// Records a command written to the device.
    pub fn add_set_command(&self, payload: Value) {
        self.record(History::SetCommands, payload);
    }

    /// Records a reply to a written command.
    pub fn add_set_reply(&self, payload: Value) {
        self.record(History::SetReplies, payload);
    }

    /// Records a query sent to the device.
    pub fn add_get_command(&self, payload: Value) {
        self.record(History::GetCommands, payload);
    }

    /// Records a reply to a query.
    pub fn add_get_reply(&self, payload: Value) {
        self.record(History::GetReplies, payload);
    }

    /// Copies a history, oldest first.
    #[must_use]
    pub fn history(&self, history: History) -> Vec<HistoryEntry> {
        self.inner.lock().history_mut(history).to_vec()
    }
}

impl Default for DeviceDataStore {
    fn default() -> Self {
        Self::new(StoreOptions::default())
    }
}
