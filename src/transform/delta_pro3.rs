// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Delta Pro 3 transforms.

use crate::FieldMap;

use super::{Rule, apply_rules, flatten_record, pass_unknown};

const CMS_SUMMARY_RULES: &[Rule] = &[
    Rule::rename("volt4", "cms_batt_vol"),
    Rule::rename("soc15", "cms_batt_soc"),
    Rule::rename("maxChargeSoc7", "cms_max_chg_soc"),
    Rule::rename("unknown8", "cms_min_dsg_soc"),
    Rule::rename("unknown9", "ac_out_freq"),
    Rule::rename("unknown12", "cms_chg_rem_time"),
    Rule::rename("unknown13", "cms_dsg_rem_time"),
    Rule::rename("unknown14", "cms_chg_dsg_state"),
    Rule::rename("bmsIsConnt16", "bms_is_connt"),
    Rule::rename("unknown23", "cms_oil_off_soc"),
];

const BMS_DETAIL_RULES: &[Rule] = &[
    Rule::rename("unknown1", "bms_flt_state"),
    Rule::rename("unknown2", "bms_pro_state"),
    Rule::rename("unknown3", "bms_alm_state"),
    Rule::rename("unknown4", "bms_bal_state"),
    Rule::rename("unknown7", "bms_batt_vol"),
    Rule::rename("unknown8", "bms_batt_amp"),
    Rule::rename("unknown25", "bms_batt_soc"),
    Rule::rename("soh54", "bms_batt_soh"),
    Rule::rename("unknown11", "bms_design_cap"),
    Rule::rename("remainCap12", "bms_remain_cap"),
    Rule::rename("unknown13", "bms_full_cap"),
    Rule::rename("maxCellVol16", "bms_max_cell_vol"),
    Rule::rename("minCellVol17", "bms_min_cell_vol"),
    Rule::rename("maxCellTemp18", "bms_max_cell_temp"),
    Rule::rename("minCellTemp19", "bms_min_cell_temp"),
    Rule::rename("maxMosTemp20", "bms_max_mos_temp"),
    Rule::rename("minMosTemp21", "bms_min_mos_temp"),
    Rule::rename("cellVol33", "cell_vol"),
    Rule::rename("cellTemp35", "cell_temp"),
    Rule::rename("mosTemp56", "mos_temp"),
    Rule::rename("error70", "bms_error"),
    Rule::rename("unknown27", "bms_chg_rem_time"),
    Rule::rename("unknown28", "bms_dsg_rem_time"),
    Rule::rename("unknown47", "bms_chg_dsg_state"),
    Rule::rename("version36", "bms_firm_ver"),
    Rule::rename("deveiceSn39", "bms_device_sn"),
    Rule::rename("packSn81", "pack_sn"),
];

/// `(2, 32)`: flattens both summary records.
#[must_use]
pub fn cms_summary(input: &FieldMap) -> FieldMap {
    let mut out = FieldMap::new();
    flatten_record(input, "msg32_2_1", CMS_SUMMARY_RULES, &mut out);
    flatten_record(input, "msg32_2_2", &[], &mut out);
    pass_unknown(input, &mut out);
    out
}

/// `(50, 32)`: renames the pack report.
#[must_use]
pub fn bms_detail(input: &FieldMap) -> FieldMap {
    let mut out = FieldMap::new();
    apply_rules(input, BMS_DETAIL_RULES, &mut out);
    pass_unknown(input, &mut out);
    out
}
