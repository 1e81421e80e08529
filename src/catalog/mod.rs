// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Message catalogs.
//!
//! A [`Catalog`] maps `(cmd_id, cmd_func)` pairs to the schema of the inner
//! payload and, separately, to the transform that flattens the decoded map.
//! Both registries are open: device families add entries without touching
//! the dispatch code.
//!
//! # Example
//!
//! ```
//! use ecoflow_mqtt::catalog::{Catalog, SchemaDescriptor, FieldDescriptor, ScalarType};
//!
//! static PING: SchemaDescriptor = SchemaDescriptor {
//!     name: "Ping",
//!     version: 1,
//!     fields: &[FieldDescriptor::scalar(1, "count", ScalarType::Uint32)],
//! };
//!
//! let mut catalog = Catalog::new("custom");
//! catalog.register_schema(7, 254, &PING);
//!
//! let (schema, fields) = catalog.decode(7, 254, &[0x08, 0x05]).unwrap();
//! assert_eq!(schema, "Ping");
//! assert_eq!(fields["count"], 5);
//! ```

pub mod delta_pro3;
mod schema;

use std::collections::HashMap;

use crate::FieldMap;
use crate::error::DecodeError;
use crate::frame::KeyMode;

pub use schema::{FieldDescriptor, FieldKind, ScalarType, SchemaDescriptor};

/// Flattens a decoded map into external field names.
pub type TransformFn = fn(&FieldMap) -> FieldMap;

/// Catalog key: `(cmd_id, cmd_func)`.
pub type MessageKey = (u32, u32);

/// Registry of message shapes for one device family.
#[derive(Debug, Clone)]
pub struct Catalog {
    name: &'static str,
    key_mode: KeyMode,
    schemas: HashMap<MessageKey, &'static SchemaDescriptor>,
    transforms: HashMap<MessageKey, TransformFn>,
}

impl Catalog {
    /// Creates an empty catalog using the fixed obfuscation key.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            key_mode: KeyMode::Fixed,
            schemas: HashMap::new(),
            transforms: HashMap::new(),
        }
    }

    /// Sets the obfuscation key mode used by this device family.
    #[must_use]
    pub fn with_key_mode(mut self, key_mode: KeyMode) -> Self {
        self.key_mode = key_mode;
        self
    }

    /// Catalog name, used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Obfuscation key mode.
    #[must_use]
    pub fn key_mode(&self) -> KeyMode {
        self.key_mode
    }

    /// Registers the schema for a command pair, replacing any previous one.
    pub fn register_schema(
        &mut self,
        cmd_id: u32,
        cmd_func: u32,
        schema: &'static SchemaDescriptor,
    ) -> &mut Self {
        if let Some(previous) = self.schemas.insert((cmd_id, cmd_func), schema) {
            tracing::debug!(cmd_id, cmd_func, previous = previous.name, "Replacing catalog schema");
        }
        self
    }

    /// Registers the transform for a command pair.
    pub fn register_transform(&mut self, cmd_id: u32, cmd_func: u32, transform: TransformFn) -> &mut Self {
        self.transforms.insert((cmd_id, cmd_func), transform);
        self
    }

    /// Looks up the schema for a command pair.
    #[must_use]
    pub fn schema(&self, cmd_id: u32, cmd_func: u32) -> Option<&'static SchemaDescriptor> {
        self.schemas.get(&(cmd_id, cmd_func)).copied()
    }

    /// Looks up the transform for a command pair.
    #[must_use]
    pub fn transform(&self, cmd_id: u32, cmd_func: u32) -> Option<TransformFn> {
        self.transforms.get(&(cmd_id, cmd_func)).copied()
    }

    /// Number of registered schemas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Returns `true` if no schema is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Decodes and transforms a cleartext payload.
    ///
    /// Returns the schema name and the transformed fields. Shapes without a
    /// transform are returned as decoded.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownMessage`] on a catalog miss and
    /// [`DecodeError::Schema`] when the payload does not match.
    pub fn decode(
        &self,
        cmd_id: u32,
        cmd_func: u32,
        payload: &[u8],
    ) -> Result<(&'static str, FieldMap), DecodeError> {
        let schema = self
            .schema(cmd_id, cmd_func)
            .ok_or(DecodeError::UnknownMessage { cmd_id, cmd_func })?;

        let decoded = schema.decode(payload)?;
        let fields = match self.transform(cmd_id, cmd_func) {
            Some(transform) => transform(&decoded),
            None => decoded,
        };

        Ok((schema.name, fields))
    }

    /// Like [`decode`](Self::decode), reducing every failure to an empty map.
    #[must_use]
    pub fn dispatch(&self, cmd_id: u32, cmd_func: u32, payload: &[u8]) -> FieldMap {
        match self.decode(cmd_id, cmd_func, payload) {
            Ok((_, fields)) => fields,
            Err(err) => {
                tracing::warn!(catalog = self.name, error = %err, "Dropping frame payload");
                FieldMap::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static COUNTER: SchemaDescriptor = SchemaDescriptor {
        name: "Counter",
        version: 1,
        fields: &[FieldDescriptor::scalar(1, "count", ScalarType::Uint32)],
    };

    fn doubled(input: &FieldMap) -> FieldMap {
        let mut out = FieldMap::new();
        if let Some(count) = input.get("count").and_then(serde_json::Value::as_u64) {
            out.insert("count_x2".into(), json!(count * 2));
        }
        out
    }

    #[test]
    fn unregistered_pair_yields_empty() {
        let catalog = Catalog::new("test");
        assert!(catalog.dispatch(1, 1, &[0x08, 0x01]).is_empty());
        assert_eq!(
            catalog.decode(1, 1, &[]).unwrap_err(),
            DecodeError::UnknownMessage {
                cmd_id: 1,
                cmd_func: 1
            }
        );
    }

    #[test]
    fn missing_transform_is_identity() {
        let mut catalog = Catalog::new("test");
        catalog.register_schema(1, 2, &COUNTER);

        let (name, fields) = catalog.decode(1, 2, &[0x08, 0x03]).unwrap();
        assert_eq!(name, "Counter");
        assert_eq!(fields["count"], json!(3));
    }

    #[test]
    fn transform_is_applied() {
        let mut catalog = Catalog::new("test");
        catalog
            .register_schema(1, 2, &COUNTER)
            .register_transform(1, 2, doubled);

        let fields = catalog.dispatch(1, 2, &[0x08, 0x03]);
        assert_eq!(fields.get("count_x2"), Some(&json!(6)));
        assert!(!fields.contains_key("count"));
    }

    #[test]
    fn pairs_are_ordered() {
        let mut catalog = Catalog::new("test");
        catalog.register_schema(1, 2, &COUNTER);
        assert!(catalog.schema(2, 1).is_none());
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn schema_failure_yields_empty() {
        let mut catalog = Catalog::new("test");
        catalog.register_schema(1, 2, &COUNTER);
        assert!(catalog.dispatch(1, 2, &[0x08]).is_empty());
    }

    #[test]
    fn key_mode_defaults_to_fixed() {
        let catalog = Catalog::new("test");
        assert_eq!(catalog.key_mode(), KeyMode::Fixed);
        let catalog = catalog.with_key_mode(KeyMode::Rolling);
        assert_eq!(catalog.key_mode(), KeyMode::Rolling);
    }
}
