//! Encoding of config values as Terraform variables.
//!
//! Terraform reads `TF_VAR_<name>` environment variables, and its parser
//! treats quoting differently depending on where a scalar appears. A bare
//! top-level value is taken literally, so `TF_VAR_name="demo"` would carry
//! the quotes into every interpolation. Inside a list or map, scalars must
//! be quoted or the value boundaries are lost.
//!
//! | value   | top level        | nested             |
//! |---------|------------------|--------------------|
//! | string  | `demo`           | `"demo"`           |
//! | number  | `3`              | `"3"`              |
//! | boolean | `true`           | `"true"`           |
//! | null    | `""`             | `""`               |
//! | object  | `{k="v",...}`    | same               |
//! | array   | `["v",...]`      | same               |

use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Prefix Terraform uses to pick variables out of the environment.
pub const VAR_PREFIX: &str = "TF_VAR_";

/// Encode any serializable value.
///
/// Fails with [`Error::UnsupportedValueKind`] when the value has no JSON
/// representation, for example a map with non-string keys.
pub fn encode<T: Serialize + ?Sized>(value: &T, top_level: bool) -> Result<String> {
    let value =
        serde_json::to_value(value).map_err(|e| Error::UnsupportedValueKind(e.to_string()))?;
    Ok(encode_value(&value, top_level))
}

/// Encode a JSON value. Composite values always encode their children as
/// nested.
pub fn encode_value(value: &Value, top_level: bool) -> String {
    match value {
        Value::Object(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(key, child)| format!("{key}={}", encode_value(child, false)))
                .collect();
            format!("{{{}}}", entries.join(","))
        }
        Value::Array(items) => {
            let entries: Vec<String> = items.iter().map(|item| encode_value(item, false)).collect();
            format!("[{}]", entries.join(","))
        }
        Value::Null => "\"\"".to_string(),
        Value::Bool(flag) => quote(&flag.to_string(), top_level),
        Value::Number(number) => quote(&number.to_string(), top_level),
        Value::String(text) => quote(text, top_level),
    }
}

/// Encode every entry as a top-level value keyed by its environment
/// variable name.
pub fn encode_all<'a, I>(variables: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (&'a String, &'a Value)>,
{
    variables
        .into_iter()
        .map(|(key, value)| (var_name(key), encode_value(value, true)))
        .collect()
}

/// Environment variable name for a Terraform variable.
pub fn var_name(key: &str) -> String {
    format!("{VAR_PREFIX}{key}")
}

fn quote(raw: &str, top_level: bool) -> String {
    if top_level {
        raw.to_string()
    } else {
        format!("\"{raw}\"")
    }
}
