// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Delta Pro 3 settings commands.
//!
//! Every command is a `TCP` operation carrying a numeric parameter id and
//! one camelCase field:
//!
//! ```text
//! {"moduleType": 0, "operateType": "TCP", "params": {"id": 49, "cmsMaxChgSoc": 90}}
//! ```
//!
//! Range and option checks happen before anything is sent, so an invalid
//! value never reaches the device.

use std::fmt;

use serde_json::{Value, json};

use super::DeviceCommand;
use crate::error::ValueError;

/// Allowed screen timeouts in seconds.
pub const SCREEN_TIMEOUT_OPTIONS: &[u32] = &[0, 10, 30, 60, 300, 1800];

/// Allowed AC standby times in minutes.
pub const AC_STANDBY_OPTIONS: &[u32] = &[0, 30, 60, 120, 240, 360, 720, 1440];

/// Allowed DC standby times in minutes.
pub const DC_STANDBY_OPTIONS: &[u32] = &[0, 30, 60, 120, 360, 720];

fn tcp_command(id: u32, field: &str, target_key: &str, value: impl Into<Value>) -> DeviceCommand {
    let value = value.into();
    let mut params = serde_json::Map::new();
    params.insert("id".into(), Value::from(id));
    params.insert(field.into(), value.clone());
    let body = json!({
        "moduleType": 0,
        "operateType": "TCP",
        "params": params,
    });
    DeviceCommand::new(target_key, value, body)
}

fn check_range(value: u32, min: u32, max: u32) -> Result<(), ValueError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValueError::OutOfRange {
            min: i64::from(min),
            max: i64::from(max),
            actual: i64::from(value),
        })
    }
}

fn check_option(field: &str, value: u32, options: &[u32]) -> Result<(), ValueError> {
    if options.contains(&value) {
        Ok(())
    } else {
        Err(ValueError::InvalidOption {
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}

/// Upper charge limit, 50 to 100 percent.
///
/// # Errors
///
/// Returns [`ValueError::OutOfRange`] outside 50..=100.
pub fn max_charge_soc(percent: u32) -> Result<DeviceCommand, ValueError> {
    check_range(percent, 50, 100)?;
    Ok(tcp_command(49, "cmsMaxChgSoc", "cms_max_chg_soc", percent))
}

/// Lower discharge limit, 0 to 30 percent.
///
/// # Errors
///
/// Returns [`ValueError::OutOfRange`] outside 0..=30.
pub fn min_discharge_soc(percent: u32) -> Result<DeviceCommand, ValueError> {
    check_range(percent, 0, 30)?;
    Ok(tcp_command(51, "cmsMinDsgSoc", "cms_min_dsg_soc", percent))
}

/// Maximum AC charging power, 200 to 3000 W.
///
/// # Errors
///
/// Returns [`ValueError::OutOfRange`] outside 200..=3000.
pub fn ac_charging_power(watts: u32) -> Result<DeviceCommand, ValueError> {
    check_range(watts, 200, 3000)?;
    Ok(tcp_command(
        69,
        "plugInInfoAcInChgPowMax",
        "plug_in_info_ac_in_chg_pow_max",
        watts,
    ))
}

/// Beeper on or off.
#[must_use]
pub fn beeper(enabled: bool) -> DeviceCommand {
    tcp_command(38, "enBeep", "en_beep", enabled)
}

/// High-voltage AC outlets.
#[must_use]
pub fn ac_hv_output(enabled: bool) -> DeviceCommand {
    tcp_command(66, "cfgHvAcOutOpen", "cfg_hv_ac_out_open", enabled)
}

/// Low-voltage AC outlets.
#[must_use]
pub fn ac_lv_output(enabled: bool) -> DeviceCommand {
    tcp_command(66, "cfgLvAcOutOpen", "cfg_lv_ac_out_open", enabled)
}

/// X-Boost.
#[must_use]
pub fn xboost(enabled: bool) -> DeviceCommand {
    tcp_command(66, "xboostEn", "xboost_en", enabled)
}

/// 12 V DC output.
#[must_use]
pub fn dc_12v_output(enabled: bool) -> DeviceCommand {
    tcp_command(81, "cfgDc12vOutOpen", "cfg_dc_12v_out_open", enabled)
}

/// 24 V DC output.
#[must_use]
pub fn dc_24v_output(enabled: bool) -> DeviceCommand {
    tcp_command(81, "cfgDc24vOutOpen", "cfg_dc_24v_out_open", enabled)
}

/// AC energy saving mode.
#[must_use]
pub fn ac_energy_saving(enabled: bool) -> DeviceCommand {
    tcp_command(95, "acEnergySavingOpen", "ac_energy_saving_open", enabled)
}

/// Ground-fault protection.
#[must_use]
pub fn gfci(enabled: bool) -> DeviceCommand {
    tcp_command(153, "llcGFCIFlag", "llc_gfci_flag", enabled)
}

/// Screen timeout in seconds, one of [`SCREEN_TIMEOUT_OPTIONS`].
///
/// # Errors
///
/// Returns [`ValueError::InvalidOption`] for any other value.
pub fn screen_timeout(seconds: u32) -> Result<DeviceCommand, ValueError> {
    check_option("screenOffTime", seconds, SCREEN_TIMEOUT_OPTIONS)?;
    Ok(tcp_command(39, "screenOffTime", "screen_off_time", seconds))
}

/// AC standby time in minutes, one of [`AC_STANDBY_OPTIONS`].
///
/// # Errors
///
/// Returns [`ValueError::InvalidOption`] for any other value.
pub fn ac_standby_time(minutes: u32) -> Result<DeviceCommand, ValueError> {
    check_option("acStandbyTime", minutes, AC_STANDBY_OPTIONS)?;
    Ok(tcp_command(153, "acStandbyTime", "ac_standby_time", minutes))
}

/// DC standby time in minutes, one of [`DC_STANDBY_OPTIONS`].
///
/// # Errors
///
/// Returns [`ValueError::InvalidOption`] for any other value.
pub fn dc_standby_time(minutes: u32) -> Result<DeviceCommand, ValueError> {
    check_option("dcStandbyTime", minutes, DC_STANDBY_OPTIONS)?;
    Ok(tcp_command(33, "dcStandbyTime", "dc_standby_time", minutes))
}

/// Which AC outlet groups are powered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcOutputType {
    /// Both high- and low-voltage outlets.
    HvAndLv,
    /// High-voltage outlets only.
    HvOnly,
    /// Low-voltage outlets only.
    LvOnly,
}

impl AcOutputType {
    /// Wire value.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::HvAndLv => 0,
            Self::HvOnly => 1,
            Self::LvOnly => 2,
        }
    }

    /// Parses a display label such as `HV+LV`.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::InvalidOption`] for unknown labels.
    pub fn from_label(label: &str) -> Result<Self, ValueError> {
        match label {
            "HV+LV" => Ok(Self::HvAndLv),
            "HV only" => Ok(Self::HvOnly),
            "LV only" => Ok(Self::LvOnly),
            other => Err(ValueError::InvalidOption {
                field: "plugInInfoAcOutType".to_string(),
                value: other.to_string(),
            }),
        }
    }

    /// Display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::HvAndLv => "HV+LV",
            Self::HvOnly => "HV only",
            Self::LvOnly => "LV only",
        }
    }
}

impl fmt::Display for AcOutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// AC outlet group selection.
#[must_use]
pub fn ac_output_type(output: AcOutputType) -> DeviceCommand {
    tcp_command(
        153,
        "plugInInfoAcOutType",
        "plug_in_info_ac_out_type",
        output.code(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;

    #[test]
    fn max_charge_soc_body() {
        let cmd = max_charge_soc(90).unwrap();
        assert_eq!(
            cmd.body(),
            json!({
                "moduleType": 0,
                "operateType": "TCP",
                "params": {"id": 49, "cmsMaxChgSoc": 90}
            })
        );
        assert_eq!(cmd.target_key(), "cms_max_chg_soc");
        assert_eq!(cmd.value(), &json!(90));
    }

    #[test]
    fn ranges_are_inclusive() {
        assert!(max_charge_soc(50).is_ok());
        assert!(max_charge_soc(100).is_ok());
        assert!(min_discharge_soc(0).is_ok());
        assert!(min_discharge_soc(30).is_ok());
        assert!(ac_charging_power(200).is_ok());
        assert!(ac_charging_power(3000).is_ok());
    }

    #[test]
    fn out_of_range_rejected() {
        assert_eq!(
            max_charge_soc(49).unwrap_err(),
            ValueError::OutOfRange {
                min: 50,
                max: 100,
                actual: 49
            }
        );
        assert!(min_discharge_soc(31).is_err());
        assert!(ac_charging_power(199).is_err());
        assert!(ac_charging_power(3001).is_err());
    }

    #[test]
    fn options_checked() {
        assert!(screen_timeout(300).is_ok());
        assert!(screen_timeout(45).is_err());
        assert!(ac_standby_time(1440).is_ok());
        assert!(ac_standby_time(240).is_ok());
        assert!(dc_standby_time(240).is_err());

        let err = dc_standby_time(15).unwrap_err();
        assert!(matches!(err, ValueError::InvalidOption { ref field, .. } if field == "dcStandbyTime"));
    }

    #[test]
    fn switch_commands() {
        let cmd = dc_12v_output(true);
        assert_eq!(cmd.body()["params"], json!({"id": 81, "cfgDc12vOutOpen": true}));
        assert_eq!(
            serde_json::Value::Object(cmd.value_patch()),
            json!({"cfg_dc_12v_out_open": true})
        );

        assert_eq!(gfci(false).body()["params"], json!({"id": 153, "llcGFCIFlag": false}));
        assert_eq!(xboost(true).target_key(), "xboost_en");
        assert_eq!(beeper(true).body()["params"]["id"], 38);
        assert_eq!(ac_lv_output(true).body()["params"]["id"], 66);
    }

    #[test]
    fn ac_output_type_labels() {
        assert_eq!(AcOutputType::from_label("LV only").unwrap(), AcOutputType::LvOnly);
        assert!(AcOutputType::from_label("both").is_err());

        let cmd = ac_output_type(AcOutputType::HvOnly);
        assert_eq!(
            cmd.body()["params"],
            json!({"id": 153, "plugInInfoAcOutType": 1})
        );
        assert_eq!(AcOutputType::HvAndLv.to_string(), "HV+LV");
    }
}
