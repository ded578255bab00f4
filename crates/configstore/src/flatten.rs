//! Flattening of the project document into Terraform-ready variables.
//!
//! Terraform variables are flat names, so nested objects are joined with
//! [`SEPARATOR`]: `{"__services": {"api": {"port": 80}}}` becomes
//! `__services__api__port = 80`.
//!
//! Top-level arrays are kept whole as long as every element is a scalar,
//! so `["a", "b"]` still maps onto a `list(string)` variable. Arrays that
//! contain an object or another array are flattened by index.

use crate::store::Config;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Joins the keys of nested values.
pub const SEPARATOR: &str = "__";

/// A flattened document, keyed by joined path.
pub type FlatConfig = BTreeMap<String, Value>;

/// Flatten a document into a single level of `__`-joined keys.
///
/// Every value in the result is a scalar, `null`, or a top-level array of
/// scalars. Empty objects and empty arrays produce no keys.
pub fn flatten(config: &Config) -> FlatConfig {
    let mut flat = FlatConfig::new();

    for (key, value) in config {
        if keeps_whole(value) {
            flat.insert(key.clone(), value.clone());
        } else {
            flatten_into(value, key, &mut flat);
        }
    }

    flat
}

/// Flatten a document into two levels.
///
/// Top-level keys are preserved and each nested value becomes an object of
/// `__`-joined keys relative to it, e.g.
/// `{"__services": {"api__port": 80}}`. This is the layout used with
/// Terraform variables typed as `map(any)`.
pub fn flatten_grouped(config: &Config) -> Config {
    let mut grouped = Config::new();

    for (key, value) in config {
        if keeps_whole(value) {
            grouped.insert(key.clone(), value.clone());
            continue;
        }

        let mut relative = FlatConfig::new();
        flatten_into(value, "", &mut relative);
        grouped.insert(key.clone(), Value::Object(relative.into_iter().collect::<Map<_, _>>()));
    }

    grouped
}

fn keeps_whole(value: &Value) -> bool {
    match value {
        Value::Object(_) => false,
        Value::Array(items) => !items.is_empty() && !items.iter().any(is_composite),
        _ => true,
    }
}

fn is_composite(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

fn flatten_into(value: &Value, prefix: &str, out: &mut FlatConfig) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(child, &join(prefix, key), out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(child, &join(prefix, &index.to_string()), out);
            }
        }
        scalar => {
            out.insert(prefix.to_string(), scalar.clone());
        }
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}{SEPARATOR}{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> Config {
        match value {
            Value::Object(map) => map,
            _ => panic!("test config must be an object"),
        }
    }

    fn flat(value: Value) -> FlatConfig {
        config(value).into_iter().collect()
    }

    #[test]
    fn test_flatten_scalars_unchanged() {
        let input = config(json!({
            "__project_name": "demo",
            "replicas": 2,
            "enabled": true,
            "nothing": null
        }));

        assert_eq!(flatten(&input), flat(json!({
            "__project_name": "demo",
            "replicas": 2,
            "enabled": true,
            "nothing": null
        })));
    }

    #[test]
    fn test_flatten_nested_objects() {
        let input = config(json!({
            "__services": {
                "frontend": {"image": "frontend", "port": 3000},
                "backend": {"image": "backend"}
            }
        }));

        assert_eq!(flatten(&input), flat(json!({
            "__services__frontend__image": "frontend",
            "__services__frontend__port": 3000,
            "__services__backend__image": "backend"
        })));
    }

    #[test]
    fn test_flatten_keeps_scalar_arrays() {
        let input = config(json!({
            "regions": ["us-east1", "us-west1"],
            "mixed": [1, "two", true, null]
        }));

        assert_eq!(flatten(&input), flat(json!({
            "regions": ["us-east1", "us-west1"],
            "mixed": [1, "two", true, null]
        })));
    }

    #[test]
    fn test_flatten_empty_top_level_array() {
        let input = config(json!({"empty": [], "blank": {}, "regions": ["a"]}));

        assert_eq!(flatten(&input), flat(json!({"regions": ["a"]})));
        assert_eq!(flatten_grouped(&input), config(json!({
            "empty": {},
            "blank": {},
            "regions": ["a"]
        })));
    }

    #[test]
    fn test_flatten_indexes_arrays_of_objects() {
        let input = config(json!({
            "volumes": [{"name": "data", "size": 10}, {"name": "logs"}]
        }));

        assert_eq!(flatten(&input), flat(json!({
            "volumes__0__name": "data",
            "volumes__0__size": 10,
            "volumes__1__name": "logs"
        })));
    }

    #[test]
    fn test_flatten_indexes_partially_composite_arrays() {
        let input = config(json!({"list": ["a", {"b": "c"}, ["d"]]}));

        assert_eq!(flatten(&input), flat(json!({
            "list__0": "a",
            "list__1__b": "c",
            "list__2__0": "d"
        })));
    }

    #[test]
    fn test_flatten_indexes_nested_arrays() {
        let input = config(json!({
            "__services": {"api": {"ports": [80, 443]}}
        }));

        assert_eq!(flatten(&input), flat(json!({
            "__services__api__ports__0": 80,
            "__services__api__ports__1": 443
        })));
    }

    #[test]
    fn test_flatten_drops_empty_containers() {
        let input = config(json!({
            "empty_object": {},
            "__services": {"api": {"secrets": {}, "ports": []}, "web": {"x": 1}}
        }));

        assert_eq!(flatten(&input), flat(json!({"__services__web__x": 1})));
    }

    #[test]
    fn test_flatten_output_is_flat() {
        let input = config(json!({
            "a": {"b": {"c": {"d": [{"e": [1, {"f": null}]}]}}},
            "g": ["h"]
        }));

        for (key, value) in flatten(&input) {
            match value {
                Value::Object(_) => panic!("{key} is still an object"),
                Value::Array(items) => {
                    assert_eq!(key, "g");
                    assert!(!items.iter().any(is_composite));
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_flatten_grouped_keeps_top_level() {
        let input = config(json!({
            "__project_name": "demo",
            "__services": {
                "frontend": {"image": "frontend", "env": [{"k": "v"}]}
            },
            "regions": ["a", "b"],
            "nested_list": [{"x": 1}]
        }));

        assert_eq!(flatten_grouped(&input), config(json!({
            "__project_name": "demo",
            "__services": {
                "frontend__image": "frontend",
                "frontend__env__0__k": "v"
            },
            "regions": ["a", "b"],
            "nested_list": {"0__x": 1}
        })));
    }

    #[test]
    fn test_flatten_grouped_empty_object() {
        let input = config(json!({"__services": {}}));

        assert_eq!(flatten_grouped(&input), config(json!({"__services": {}})));
    }
}
