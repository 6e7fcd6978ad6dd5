//! Positional parameters in their wire form.
//!
//! Parameters arrive as flat string fields, `param_type_<i>`,
//! `param_value_<i>`, `param_direction_<i>` and `out_param_name_<i>`,
//! numbered densely from 1. The scan stops at the first missing
//! `param_type_<i>`.

use serde_json::Value;
use std::collections::HashMap;

/// Literal value standing for SQL NULL.
pub const NULL_SENTINEL: &str = "NULL";

/// One parameter exactly as the client sent it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamSpec {
    /// 1-based position.
    pub index: usize,
    pub type_tag: String,
    pub value: Option<String>,
    pub direction_tag: Option<String>,
    pub out_name: Option<String>,
}

impl ParamSpec {
    /// An IN parameter.
    pub fn input(index: usize, type_tag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            index,
            type_tag: type_tag.into(),
            value: Some(value.into()),
            ..Default::default()
        }
    }

    /// An OUT parameter with an optional result name.
    pub fn output(index: usize, type_tag: impl Into<String>, out_name: Option<&str>) -> Self {
        Self {
            index,
            type_tag: type_tag.into(),
            direction_tag: Some("out".to_string()),
            out_name: out_name.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn with_direction(mut self, direction: impl Into<String>) -> Self {
        self.direction_tag = Some(direction.into());
        self
    }
}

/// Collect the dense run of parameters in `fields`.
pub fn scan_fields(fields: &HashMap<String, String>) -> Vec<ParamSpec> {
    let mut specs = Vec::new();
    for index in 1.. {
        let Some(type_tag) = fields.get(&format!("param_type_{index}")) else {
            break;
        };
        specs.push(ParamSpec {
            index,
            type_tag: type_tag.clone(),
            value: fields.get(&format!("param_value_{index}")).cloned(),
            direction_tag: fields.get(&format!("param_direction_{index}")).cloned(),
            out_name: fields.get(&format!("out_param_name_{index}")).cloned(),
        });
    }
    specs
}

/// Flatten one JSON parameter set, as found on a prepared-batch line.
///
/// Returns `None` when `value` is not an object. JSON `null` becomes the
/// NULL sentinel; numbers and booleans keep their JSON spelling.
pub fn fields_from_json(value: &Value) -> Option<HashMap<String, String>> {
    let object = value.as_object()?;
    let fields = object
        .iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Null => NULL_SENTINEL.to_string(),
                other => other.to_string(),
            };
            (key.clone(), text)
        })
        .collect();
    Some(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_scan_stops_at_gap() {
        let fields = fields(&[
            ("param_type_1", "INTEGER"),
            ("param_value_1", "42"),
            ("param_type_2", "VARCHAR"),
            ("param_direction_2", "out"),
            ("out_param_name_2", "total"),
            ("param_type_4", "VARCHAR"),
            ("param_value_4", "never seen"),
        ]);

        let specs = scan_fields(&fields);
        assert_eq!(
            specs,
            vec![
                ParamSpec::input(1, "INTEGER", "42"),
                ParamSpec::output(2, "VARCHAR", Some("total")),
            ]
        );
    }

    #[test]
    fn test_scan_empty() {
        assert!(scan_fields(&fields(&[("param_value_1", "42")])).is_empty());
    }

    #[test]
    fn test_json_line() {
        let line = json!({
            "param_type_1": "INTEGER",
            "param_value_1": 7,
            "param_type_2": "BIT",
            "param_value_2": true,
            "param_type_3": "VARCHAR",
            "param_value_3": null,
        });

        let specs = scan_fields(&fields_from_json(&line).unwrap());
        let values: Vec<_> = specs.iter().map(|s| s.value.as_deref()).collect();
        assert_eq!(values, vec![Some("7"), Some("true"), Some("NULL")]);

        assert!(fields_from_json(&json!([1, 2])).is_none());
    }
}
