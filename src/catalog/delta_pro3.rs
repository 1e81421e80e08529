// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Delta Pro 3 message catalog.
//!
//! | cmd_id | cmd_func | Schema                      | Transform |
//! |--------|----------|-----------------------------|-----------|
//! | 2      | 32       | `cmdFunc32_cmdId2_Report`   | CMS summary |
//! | 50     | 32       | `cmdFunc50_cmdId30_Report`  | BMS detail |
//! | 17     | 254      | `set_dp3`                   | identity |
//! | 18     | 254      | `setReply_dp3`              | identity |
//! | 21     | 254      | `DisplayPropertyUpload`     | identity |
//! | 22     | 254      | `RuntimePropertyUpload`     | identity |
//! | 23     | 254      | `cmdFunc254_cmdId23_Report` | identity |
//!
//! Field names carry their field number where the meaning was inferred from
//! captures, and `unknown` where it is still open. Messages with no
//! identified field have empty descriptors, so the decoder names every field
//! `unknown{number}`.

use super::schema::{FieldDescriptor as F, ScalarType as T, SchemaDescriptor};
use super::Catalog;
use crate::frame::KeyMode;
use crate::transform::delta_pro3 as transform;

/// Command function of the CMS/BMS reports.
pub const CMD_FUNC_REPORT: u32 = 32;

/// Command function of property uploads and settings.
pub const CMD_FUNC_PROPERTY: u32 = 254;

/// Combined battery summary record.
pub static CMS_SUMMARY: SchemaDescriptor = SchemaDescriptor {
    name: "cmdFunc32_cmdId2_Report.msg32_2_1",
    version: 1,
    fields: &[
        F::scalar(4, "volt4", T::Uint32),
        F::scalar(7, "maxChargeSoc7", T::Uint32),
        F::scalar(8, "unknown8", T::Uint32),
        F::scalar(9, "unknown9", T::Uint32),
        F::scalar(12, "unknown12", T::Uint32),
        F::scalar(13, "unknown13", T::Uint32),
        F::scalar(14, "unknown14", T::Uint32),
        F::scalar(15, "soc15", T::Uint32),
        F::scalar(16, "bmsIsConnt16", T::Uint32),
        F::scalar(23, "unknown23", T::Uint32),
    ],
};

/// Second summary record. Nothing is identified yet.
pub static CMS_SUMMARY_EXTRA: SchemaDescriptor = SchemaDescriptor {
    name: "cmdFunc32_cmdId2_Report.msg32_2_2",
    version: 1,
    fields: &[],
};

/// `(2, 32)` report.
pub static CMS_REPORT: SchemaDescriptor = SchemaDescriptor {
    name: "cmdFunc32_cmdId2_Report",
    version: 1,
    fields: &[
        F::message(1, "msg32_2_1", &CMS_SUMMARY),
        F::message(2, "msg32_2_2", &CMS_SUMMARY_EXTRA),
    ],
};

/// `(50, 32)` detailed battery pack report.
pub static BMS_REPORT: SchemaDescriptor = SchemaDescriptor {
    name: "cmdFunc50_cmdId30_Report",
    version: 1,
    fields: &[
        F::scalar(1, "unknown1", T::Uint32),
        F::scalar(2, "unknown2", T::Uint32),
        F::scalar(3, "unknown3", T::Uint32),
        F::scalar(4, "unknown4", T::Uint32),
        F::scalar(7, "unknown7", T::Uint32),
        F::scalar(8, "unknown8", T::Int32),
        F::scalar(11, "unknown11", T::Uint32),
        F::scalar(12, "remainCap12", T::Uint32),
        F::scalar(13, "unknown13", T::Uint32),
        F::scalar(16, "maxCellVol16", T::Uint32),
        F::scalar(17, "minCellVol17", T::Uint32),
        F::scalar(18, "maxCellTemp18", T::Int32),
        F::scalar(19, "minCellTemp19", T::Int32),
        F::scalar(20, "maxMosTemp20", T::Int32),
        F::scalar(21, "minMosTemp21", T::Int32),
        F::scalar(25, "unknown25", T::Uint32),
        F::scalar(27, "unknown27", T::Uint32),
        F::scalar(28, "unknown28", T::Uint32),
        F::repeated(33, "cellVol33", T::Uint32),
        F::repeated(35, "cellTemp35", T::Int32),
        F::scalar(36, "version36", T::Uint32),
        F::scalar(39, "deveiceSn39", T::String),
        F::scalar(47, "unknown47", T::Uint32),
        F::scalar(54, "soh54", T::Uint32),
        F::repeated(56, "mosTemp56", T::Int32),
        F::repeated(70, "error70", T::Uint32),
        F::scalar(81, "packSn81", T::String),
    ],
};

/// `(21, 254)` display property upload.
///
/// No field number of this message has been matched against a capture yet,
/// so every field decodes as `unknown{number}` and passes through verbatim.
pub static DISPLAY_PROPERTY: SchemaDescriptor = SchemaDescriptor {
    name: "DisplayPropertyUpload",
    version: 1,
    fields: &[],
};

/// `(22, 254)` runtime property upload.
pub static RUNTIME_PROPERTY: SchemaDescriptor = SchemaDescriptor {
    name: "RuntimePropertyUpload",
    version: 1,
    fields: &[],
};

/// `(23, 254)` report.
pub static PROPERTY_REPORT_23: SchemaDescriptor = SchemaDescriptor {
    name: "cmdFunc254_cmdId23_Report",
    version: 1,
    fields: &[],
};

/// `(17, 254)` settings write, seen when the app issues a command.
/// Fields are not identified yet.
pub static SET: SchemaDescriptor = SchemaDescriptor {
    name: "set_dp3",
    version: 1,
    fields: &[],
};

/// `(18, 254)` settings write acknowledgement. Fields are not identified yet.
pub static SET_REPLY: SchemaDescriptor = SchemaDescriptor {
    name: "setReply_dp3",
    version: 1,
    fields: &[],
};

/// Builds the Delta Pro 3 catalog.
#[must_use]
pub fn catalog() -> Catalog {
    let mut catalog = Catalog::new("delta_pro3").with_key_mode(KeyMode::Fixed);
    catalog
        .register_schema(2, CMD_FUNC_REPORT, &CMS_REPORT)
        .register_transform(2, CMD_FUNC_REPORT, transform::cms_summary)
        .register_schema(50, CMD_FUNC_REPORT, &BMS_REPORT)
        .register_transform(50, CMD_FUNC_REPORT, transform::bms_detail)
        .register_schema(21, CMD_FUNC_PROPERTY, &DISPLAY_PROPERTY)
        .register_schema(22, CMD_FUNC_PROPERTY, &RUNTIME_PROPERTY)
        .register_schema(23, CMD_FUNC_PROPERTY, &PROPERTY_REPORT_23)
        .register_schema(17, CMD_FUNC_PROPERTY, &SET)
        .register_schema(18, CMD_FUNC_PROPERTY, &SET_REPLY);
    for cmd_id in [17, 18, 21, 22, 23] {
        catalog.register_transform(cmd_id, CMD_FUNC_PROPERTY, crate::transform::identity);
    }
    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::wire::encode;
    use serde_json::{Value, json};

    #[test]
    fn registers_known_shapes() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 7);
        assert_eq!(catalog.schema(2, 32).map(|s| s.name), Some("cmdFunc32_cmdId2_Report"));
        assert_eq!(catalog.schema(50, 32).map(|s| s.name), Some("cmdFunc50_cmdId30_Report"));
        for cmd_id in [17, 18, 21, 22, 23] {
            assert!(catalog.transform(cmd_id, 254).is_some(), "({cmd_id}, 254)");
        }
        assert_eq!(catalog.key_mode(), KeyMode::Fixed);
    }

    #[test]
    fn runtime_upload_passes_through() {
        let mut payload = Vec::new();
        encode::field_varint(3, 12, &mut payload);

        let fields = catalog().dispatch(22, 254, &payload);
        assert_eq!(Value::Object(fields), json!({"unknown3": 12}));
    }

    #[test]
    fn set_reply_fields_stay_numbered() {
        let mut payload = Vec::new();
        encode::field_varint(1, 4, &mut payload);
        encode::field_varint(2, 1, &mut payload);

        let fields = catalog().dispatch(18, 254, &payload);
        assert_eq!(Value::Object(fields), json!({"unknown1": 4, "unknown2": 1}));
    }

    #[test]
    fn display_upload_passes_through_unscaled() {
        let mut payload = Vec::new();
        encode::field_varint(40, 230_500, &mut payload);
        encode::field_varint(41, 1_500, &mut payload);
        encode::field_fixed32(3, 0x42F1_0000, &mut payload);
        encode::field_bytes(90, b"v1", &mut payload);

        let fields = catalog().dispatch(21, 254, &payload);
        assert_eq!(
            Value::Object(fields),
            json!({
                "unknown40": 230_500,
                "unknown41": 1_500,
                "unknown3": 0x42F1_0000_u32,
                "unknown90": "djE="
            })
        );
    }

    #[test]
    fn descriptors_have_unique_numbers() {
        for schema in [&CMS_SUMMARY, &CMS_REPORT, &BMS_REPORT, &DISPLAY_PROPERTY, &SET, &SET_REPLY] {
            let mut numbers: Vec<u32> = schema.fields.iter().map(|f| f.number).collect();
            numbers.sort_unstable();
            numbers.dedup();
            assert_eq!(numbers.len(), schema.fields.len(), "{}", schema.name);
        }
    }
}
