// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Schema descriptors for inner payloads.
//!
//! A [`SchemaDescriptor`] names the protobuf fields of one message shape.
//! Decoding produces a nested [`FieldMap`] keyed by field name. Field
//! numbers missing from the descriptor are kept as `unknown{number}` so
//! captures stay useful while the catalog is incomplete.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use prost::encoding::{self, DecodeContext};
use serde_json::Value;

use crate::FieldMap;
use crate::error::DecodeError;
use crate::frame::wire::{WireReader, WireType, WireValue};

/// Protobuf scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Bool,
    /// Enumerations decode to their numeric value.
    Enum,
    Float,
    Double,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    String,
    /// Raw bytes, rendered as standard base64.
    Bytes,
}

/// Shape of one field.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// Single scalar value.
    Scalar(ScalarType),
    /// Repeated scalar, packed or not.
    Repeated(ScalarType),
    /// Nested message.
    Message(&'static SchemaDescriptor),
    /// Repeated nested message.
    RepeatedMessage(&'static SchemaDescriptor),
}

/// One described field.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    /// Protobuf field number.
    pub number: u32,
    /// Name used as the map key.
    pub name: &'static str,
    /// Field shape.
    pub kind: FieldKind,
}

impl FieldDescriptor {
    /// Describes a scalar field.
    #[must_use]
    pub const fn scalar(number: u32, name: &'static str, ty: ScalarType) -> Self {
        Self {
            number,
            name,
            kind: FieldKind::Scalar(ty),
        }
    }

    /// Describes a repeated scalar field.
    #[must_use]
    pub const fn repeated(number: u32, name: &'static str, ty: ScalarType) -> Self {
        Self {
            number,
            name,
            kind: FieldKind::Repeated(ty),
        }
    }

    /// Describes a nested message field.
    #[must_use]
    pub const fn message(number: u32, name: &'static str, schema: &'static SchemaDescriptor) -> Self {
        Self {
            number,
            name,
            kind: FieldKind::Message(schema),
        }
    }

    /// Describes a repeated nested message field.
    #[must_use]
    pub const fn repeated_message(
        number: u32,
        name: &'static str,
        schema: &'static SchemaDescriptor,
    ) -> Self {
        Self {
            number,
            name,
            kind: FieldKind::RepeatedMessage(schema),
        }
    }
}

/// A named, versioned message shape.
#[derive(Debug)]
pub struct SchemaDescriptor {
    /// Message name.
    pub name: &'static str,
    /// Descriptor revision.
    pub version: u32,
    /// Described fields.
    pub fields: &'static [FieldDescriptor],
}

impl SchemaDescriptor {
    /// Looks up a field by number.
    #[must_use]
    pub fn field(&self, number: u32) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.number == number)
    }

    fn error(&self, reason: impl Into<String>) -> DecodeError {
        DecodeError::Schema {
            schema: self.name.to_string(),
            reason: reason.into(),
        }
    }

    /// Decodes `bytes` into a nested field map.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Schema`] on malformed wire data, wire types that
    /// contradict the descriptor, or invalid UTF-8 in string fields.
    pub fn decode(&self, bytes: &[u8]) -> Result<FieldMap, DecodeError> {
        let mut map = FieldMap::new();
        let mut reader = WireReader::new(bytes);

        while let Some((number, wire_type)) = reader.next_key().map_err(|e| self.error(e.to_string()))? {
            let Some(field) = self.field(number) else {
                let value = reader
                    .read_value(wire_type)
                    .map_err(|e| self.error(e.to_string()))?;
                tracing::trace!(schema = self.name, field = number, "Keeping undescribed field");
                map.insert(format!("unknown{number}"), undescribed(value));
                continue;
            };

            let field_error = |e: prost::DecodeError| self.error(format!("{}: {e}", field.name));
            match field.kind {
                FieldKind::Scalar(ty) => {
                    let decoded = merge_scalar(ty, wire_type, reader.buf_mut()).map_err(field_error)?;
                    map.insert(field.name.to_string(), decoded);
                }
                FieldKind::Repeated(ty) => {
                    let values = merge_repeated(ty, wire_type, reader.buf_mut()).map_err(field_error)?;
                    push_all(&mut map, field.name, values);
                }
                FieldKind::Message(schema) => {
                    let inner = self.nested(field, schema, wire_type, &mut reader)?;
                    map.insert(field.name.to_string(), Value::Object(inner));
                }
                FieldKind::RepeatedMessage(schema) => {
                    let inner = self.nested(field, schema, wire_type, &mut reader)?;
                    push_all(&mut map, field.name, vec![Value::Object(inner)]);
                }
            }
        }

        Ok(map)
    }

    fn nested(
        &self,
        field: &FieldDescriptor,
        schema: &SchemaDescriptor,
        wire_type: WireType,
        reader: &mut WireReader<'_>,
    ) -> Result<FieldMap, DecodeError> {
        if wire_type != WireType::LengthDelimited {
            return Err(self.error(format!("{} expects a nested message", field.name)));
        }
        let bytes = reader
            .read_length_delimited()
            .map_err(|e| self.error(e.to_string()))?;
        schema.decode(bytes)
    }
}

/// Decodes one value of `$ty` with prost's typed `merge`.
macro_rules! merge_one {
    ($module:ident, $ty:ty, $wire_type:expr, $buf:expr) => {{
        let mut value = <$ty>::default();
        encoding::$module::merge($wire_type, &mut value, $buf, DecodeContext::default())?;
        value
    }};
}

/// Decodes a packed or unpacked run of `$ty` with prost's `merge_repeated`.
macro_rules! merge_many {
    ($module:ident, $ty:ty, $wire_type:expr, $buf:expr) => {{
        let mut values: Vec<$ty> = Vec::new();
        encoding::$module::merge_repeated($wire_type, &mut values, $buf, DecodeContext::default())?;
        values.into_iter().map(Value::from).collect::<Vec<Value>>()
    }};
}

fn merge_scalar(ty: ScalarType, wire_type: WireType, buf: &mut &[u8]) -> Result<Value, prost::DecodeError> {
    let value = match ty {
        ScalarType::Int32 | ScalarType::Enum => Value::from(merge_one!(int32, i32, wire_type, buf)),
        ScalarType::Int64 => Value::from(merge_one!(int64, i64, wire_type, buf)),
        ScalarType::Uint32 => Value::from(merge_one!(uint32, u32, wire_type, buf)),
        ScalarType::Uint64 => Value::from(merge_one!(uint64, u64, wire_type, buf)),
        ScalarType::Sint32 => Value::from(merge_one!(sint32, i32, wire_type, buf)),
        ScalarType::Sint64 => Value::from(merge_one!(sint64, i64, wire_type, buf)),
        ScalarType::Bool => Value::from(merge_one!(bool, bool, wire_type, buf)),
        ScalarType::Float => Value::from(f64::from(merge_one!(float, f32, wire_type, buf))),
        ScalarType::Double => Value::from(merge_one!(double, f64, wire_type, buf)),
        ScalarType::Fixed32 => Value::from(merge_one!(fixed32, u32, wire_type, buf)),
        ScalarType::Fixed64 => Value::from(merge_one!(fixed64, u64, wire_type, buf)),
        ScalarType::Sfixed32 => Value::from(merge_one!(sfixed32, i32, wire_type, buf)),
        ScalarType::Sfixed64 => Value::from(merge_one!(sfixed64, i64, wire_type, buf)),
        ScalarType::String => Value::from(merge_one!(string, String, wire_type, buf)),
        ScalarType::Bytes => Value::from(STANDARD.encode(merge_one!(bytes, Vec<u8>, wire_type, buf))),
    };
    Ok(value)
}

fn merge_repeated(
    ty: ScalarType,
    wire_type: WireType,
    buf: &mut &[u8],
) -> Result<Vec<Value>, prost::DecodeError> {
    let values = match ty {
        ScalarType::Int32 | ScalarType::Enum => merge_many!(int32, i32, wire_type, buf),
        ScalarType::Int64 => merge_many!(int64, i64, wire_type, buf),
        ScalarType::Uint32 => merge_many!(uint32, u32, wire_type, buf),
        ScalarType::Uint64 => merge_many!(uint64, u64, wire_type, buf),
        ScalarType::Sint32 => merge_many!(sint32, i32, wire_type, buf),
        ScalarType::Sint64 => merge_many!(sint64, i64, wire_type, buf),
        ScalarType::Bool => merge_many!(bool, bool, wire_type, buf),
        ScalarType::Float => merge_many!(float, f32, wire_type, buf),
        ScalarType::Double => merge_many!(double, f64, wire_type, buf),
        ScalarType::Fixed32 => merge_many!(fixed32, u32, wire_type, buf),
        ScalarType::Fixed64 => merge_many!(fixed64, u64, wire_type, buf),
        ScalarType::Sfixed32 => merge_many!(sfixed32, i32, wire_type, buf),
        ScalarType::Sfixed64 => merge_many!(sfixed64, i64, wire_type, buf),
        // Strings and bytes are never packed, so each occurrence is one value.
        ScalarType::String | ScalarType::Bytes => vec![merge_scalar(ty, wire_type, buf)?],
    };
    Ok(values)
}

/// Renders an undescribed field without type information.
fn undescribed(value: WireValue<'_>) -> Value {
    match value {
        WireValue::Varint(raw) | WireValue::Fixed64(raw) => Value::from(raw),
        WireValue::Fixed32(raw) => Value::from(raw),
        WireValue::Bytes(bytes) => Value::from(STANDARD.encode(bytes)),
    }
}

/// Appends to the array stored under `name`, creating it on first use.
fn push_all(map: &mut FieldMap, name: &str, values: Vec<Value>) {
    let entry = map
        .entry(name.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(items) = entry {
        items.extend(values);
    }
}
