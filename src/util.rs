//! Helpers shared by the export, import and audit code paths.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Marker for "the main branch" in portfolio project selections.
pub const DEFAULT_BRANCH: &str = "__default__";

/// Split a comma separated list, trimming items and dropping empty ones.
pub fn csv_to_list(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Join items with a separator.
pub fn list_to_csv<S: AsRef<str>>(items: &[S], separator: &str) -> String {
    items
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(separator)
}

/// Decode a value that is either a CSV string or a JSON array of strings.
pub fn value_to_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => csv_to_list(s),
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

/// Drop null values, recursively through nested objects.
pub fn remove_nones(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| match v {
            Value::Object(inner) => (k, Value::Object(remove_nones(inner))),
            other => (k, other),
        })
        .collect()
}

/// Keep only importable keys.
///
/// On a full export the other keys are kept with a `_` prefix so that they
/// are ignored on import.
pub fn filter_export(map: Map<String, Value>, importable: &[&str], full: bool) -> Map<String, Value> {
    map.into_iter()
        .filter_map(|(k, v)| {
            if importable.contains(&k.as_str()) {
                Some((k, v))
            } else if full {
                Some((format!("_{k}"), v))
            } else {
                None
            }
        })
        .collect()
}

/// Parse a platform timestamp such as `2022-03-18T15:01:47+0100`.
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Whole days elapsed since `date`.
pub fn age_in_days(date: DateTime<Utc>) -> i64 {
    (Utc::now() - date).num_days()
}

/// String field of a JSON object.
pub fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Render a JSON scalar the way the platform expects it in a form parameter.
pub fn value_to_param(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_csv_to_list_trims_and_drops_empty() {
        assert_eq!(csv_to_list(" a, b,,c "), vec!["a", "b", "c"]);
        assert!(csv_to_list("").is_empty());
    }

    #[test]
    fn test_remove_nones_is_recursive() {
        let map = json!({"a": null, "b": {"c": null, "d": 1}, "e": "x"});
        let Value::Object(map) = map else { unreachable!() };
        let cleaned = remove_nones(map);
        assert_eq!(Value::Object(cleaned), json!({"b": {"d": 1}, "e": "x"}));
    }

    #[test]
    fn test_filter_export_drops_or_prefixes() {
        let Value::Object(map) = json!({"key": "k", "lastAnalysisDate": "2022"}) else {
            unreachable!()
        };
        let minimal = filter_export(map.clone(), &["key"], false);
        assert_eq!(Value::Object(minimal), json!({"key": "k"}));
        let full = filter_export(map, &["key"], true);
        assert_eq!(Value::Object(full), json!({"key": "k", "_lastAnalysisDate": "2022"}));
    }

    #[test]
    fn test_parse_date_accepts_compact_offset() {
        let d = parse_date("2022-03-18T15:01:47+0100").unwrap();
        assert_eq!(d.to_rfc3339(), "2022-03-18T14:01:47+00:00");
        assert!(parse_date("yesterday").is_none());
    }

    #[test]
    fn test_value_to_list_accepts_both_encodings() {
        assert_eq!(value_to_list(&json!("a, b")), vec!["a", "b"]);
        assert_eq!(value_to_list(&json!(["a", " b"])), vec!["a", "b"]);
    }
}
