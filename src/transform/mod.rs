// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Field transforms.
//!
//! Schema decoding yields catalog names and nested records. Transforms turn
//! that into the flat vocabulary the rest of the library stores:
//!
//! - [`Rule`]s rename a field and optionally rescale it
//! - [`copy_allowed`] copies fields that already carry their external name
//! - [`flatten_record`] lifts a sub-record as `{record}_{key}`
//! - [`pass_unknown`] keeps every `unknown` field verbatim
//!
//! Per-shape transforms for each device family live in submodules.

pub mod delta_pro3;

use serde_json::Value;

use crate::FieldMap;

/// Marker contained in the name of fields not yet identified.
pub const UNKNOWN_MARKER: &str = "unknown";

/// Unit conversion applied by a [`Rule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    /// Value is copied as is.
    Unit,
    /// Value is divided by 1000 (mV to V, mA to A).
    Milli,
}

impl Scale {
    fn apply(self, value: &Value) -> Value {
        match self {
            Self::Unit => value.clone(),
            Self::Milli => match value.as_f64() {
                Some(n) => Value::from(n / 1000.0),
                None => value.clone(),
            },
        }
    }
}

/// Maps one catalog field to its external name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    /// Catalog field name.
    pub source: &'static str,
    /// External field name.
    pub target: &'static str,
    /// Unit conversion.
    pub scale: Scale,
}

impl Rule {
    /// Plain rename.
    #[must_use]
    pub const fn rename(source: &'static str, target: &'static str) -> Self {
        Self {
            source,
            target,
            scale: Scale::Unit,
        }
    }

    /// Rename with a division by 1000.
    #[must_use]
    pub const fn milli(source: &'static str, target: &'static str) -> Self {
        Self {
            source,
            target,
            scale: Scale::Milli,
        }
    }
}

/// Returns `true` for fields whose catalog name marks them unidentified.
#[must_use]
pub fn is_unknown(name: &str) -> bool {
    name.contains(UNKNOWN_MARKER)
}

fn find_rule<'r>(rules: &'r [Rule], name: &str) -> Option<&'r Rule> {
    rules.iter().find(|rule| rule.source == name)
}

/// Applies `rules` to the top level of `input`.
pub fn apply_rules(input: &FieldMap, rules: &[Rule], out: &mut FieldMap) {
    for rule in rules {
        if let Some(value) = input.get(rule.source) {
            out.insert(rule.target.to_string(), rule.scale.apply(value));
        }
    }
}

/// Copies the listed fields unchanged.
pub fn copy_allowed(input: &FieldMap, allowed: &[&str], out: &mut FieldMap) {
    for name in allowed {
        if let Some(value) = input.get(*name) {
            out.insert((*name).to_string(), value.clone());
        }
    }
}

/// Copies every top-level `unknown` field verbatim.
pub fn pass_unknown(input: &FieldMap, out: &mut FieldMap) {
    for (name, value) in input {
        if is_unknown(name) {
            out.insert(name.clone(), value.clone());
        }
    }
}

/// Flattens the sub-record stored under `record`.
///
/// Keys with a rule are renamed by it. Every other key becomes
/// `{record}_{key}`; `unknown` keys are also kept under the prefix when a
/// rule renamed them. Missing or non-object records are ignored.
pub fn flatten_record(input: &FieldMap, record: &str, rules: &[Rule], out: &mut FieldMap) {
    let Some(Value::Object(inner)) = input.get(record) else {
        return;
    };

    for (key, value) in inner {
        let rule = find_rule(rules, key);
        if let Some(rule) = rule {
            out.insert(rule.target.to_string(), rule.scale.apply(value));
        }
        if rule.is_none() || is_unknown(key) {
            out.insert(format!("{record}_{key}"), value.clone());
        }
    }
}

/// Transform used for shapes without specific rules.
#[must_use]
pub fn identity(input: &FieldMap) -> FieldMap {
    input.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> FieldMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn milli_divides_numbers() {
        assert_eq!(Scale::Milli.apply(&json!(230_000)), json!(230.0));
        assert_eq!(Scale::Milli.apply(&json!("n/a")), json!("n/a"));
        assert_eq!(Scale::Unit.apply(&json!(5)), json!(5));
    }

    #[test]
    fn rules_rename_and_rescale() {
        let input = map(json!({"acInVol": 231_500, "soc": 80, "other": 1}));
        let mut out = FieldMap::new();
        apply_rules(
            &input,
            &[Rule::milli("acInVol", "ac_in_vol"), Rule::rename("soc", "batt_soc")],
            &mut out,
        );
        assert_eq!(Value::Object(out), json!({"ac_in_vol": 231.5, "batt_soc": 80}));
    }

    #[test]
    fn allow_list_copies_only_listed() {
        let input = map(json!({"pow_in": 10, "pow_out": 20}));
        let mut out = FieldMap::new();
        copy_allowed(&input, &["pow_in", "missing"], &mut out);
        assert_eq!(Value::Object(out), json!({"pow_in": 10}));
    }

    #[test]
    fn unknown_fields_pass_verbatim() {
        let input = map(json!({"unknown8": 5, "volt4": 1, "myUnknownThing": 2}));
        let mut out = FieldMap::new();
        pass_unknown(&input, &mut out);
        assert_eq!(Value::Object(out), json!({"unknown8": 5}));
    }

    #[test]
    fn flatten_prefixes_uncovered_keys() {
        let input = map(json!({"rec": {"volt4": 5312, "temp": 20, "unknown9": 50}}));
        let mut out = FieldMap::new();
        flatten_record(
            &input,
            "rec",
            &[Rule::rename("volt4", "batt_vol"), Rule::rename("unknown9", "freq")],
            &mut out,
        );
        assert_eq!(
            Value::Object(out),
            json!({
                "batt_vol": 5312,
                "rec_temp": 20,
                "freq": 50,
                "rec_unknown9": 50
            })
        );
    }

    #[test]
    fn flatten_ignores_missing_record() {
        let input = map(json!({"rec": 5}));
        let mut out = FieldMap::new();
        flatten_record(&input, "rec", &[], &mut out);
        flatten_record(&input, "absent", &[], &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn identity_returns_input() {
        let input = map(json!({"a": {"b": 1}}));
        assert_eq!(identity(&input), input);
    }
}
