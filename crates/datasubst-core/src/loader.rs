//! Data-source loading into the generic [`Value`] model.

use std::ffi::OsString;
use std::fmt;
use std::io::Read;

use serde::Deserialize;

use crate::error::{DatasubstError, Result};
use crate::value::{Mapping, Value};

/// Serialized data formats that can be decoded from bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Json,
    Yaml,
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataFormat::Json => f.write_str("JSON"),
            DataFormat::Yaml => f.write_str("YAML"),
        }
    }
}

/// Decode a complete JSON or YAML document.
pub fn load_bytes(format: DataFormat, bytes: &[u8]) -> Result<Value> {
    tracing::debug!(%format, bytes = bytes.len(), "decoding data source");
    match format {
        DataFormat::Json => load_json(bytes),
        DataFormat::Yaml => load_yaml(bytes),
    }
}

/// Read a handle to the end, then decode it. The handle is not retained.
pub fn load_reader<R: Read>(format: DataFormat, mut reader: R) -> Result<Value> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    load_bytes(format, &bytes)
}

fn load_json(bytes: &[u8]) -> Result<Value> {
    serde_json::from_slice(bytes).map_err(|source| DatasubstError::Json { source })
}

/// Only the first document of a multi-document stream is decoded. Merge keys (`<<`) are expanded.
fn load_yaml(bytes: &[u8]) -> Result<Value> {
    let document = serde_yaml::Deserializer::from_slice(bytes)
        .next()
        .ok_or(DatasubstError::EmptyYaml)?;
    let mut yaml = serde_yaml::Value::deserialize(document)
        .map_err(|source| DatasubstError::Yaml { source })?;
    yaml.apply_merge().map_err(|source| DatasubstError::Yaml { source })?;
    Value::deserialize(yaml).map_err(|source| DatasubstError::Yaml { source })
}

/// Build a flat string mapping from `(name, value)` pairs. Values are never type-coerced.
pub fn load_env_pairs<I, K, V>(pairs: I) -> Value
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let map: Mapping = pairs
        .into_iter()
        .map(|(name, value)| (name.into(), Value::String(value.into())))
        .collect();
    tracing::debug!(variables = map.len(), "built environment data");
    Value::Mapping(map)
}

/// Build a flat string mapping from raw `NAME=VALUE` entries.
///
/// Only the first `=` separates the name; an entry without `=` maps to an empty value.
pub fn load_env_entries<I, S>(entries: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    load_env_pairs(entries.into_iter().map(|entry| split_env_entry(entry.as_ref())))
}

fn split_env_entry(entry: &str) -> (String, String) {
    match entry.split_once('=') {
        Some((name, value)) => (name.to_string(), value.to_string()),
        None => (entry.to_string(), String::new()),
    }
}

/// Snapshot the process environment as `(name, value)` pairs.
///
/// Names and values that are not valid UTF-8 are converted lossily.
pub fn process_env_pairs() -> Vec<(String, String)> {
    std::env::vars_os()
        .map(|(name, value)| (lossy(name), lossy(value)))
        .collect()
}

fn lossy(s: OsString) -> String {
    s.into_string()
        .unwrap_or_else(|raw| raw.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_json_and_yaml_are_equivalent() {
        let json = br#"{"name": "World", "count": 3, "ratio": 0.5, "ok": true,
                        "tags": ["a", "b"], "nested": {"k": null}}"#;
        let yaml = b"name: World\ncount: 3\nratio: 0.5\nok: true\ntags:\n  - a\n  - b\nnested:\n  k: ~\n";
        let from_json = load_bytes(DataFormat::Json, json).unwrap();
        let from_yaml = load_bytes(DataFormat::Yaml, yaml).unwrap();
        assert_eq!(from_json, from_yaml);
    }

    #[test]
    fn test_json_trailing_garbage_rejected() {
        let err = load_bytes(DataFormat::Json, b"{} {}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn test_json_error_has_location() {
        let err = load_bytes(DataFormat::Json, b"{\n\"a\": [1,\n}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(err.location().map(|(line, _)| line), Some(3));
    }

    #[test]
    fn test_yaml_malformed() {
        let err = load_bytes(DataFormat::Yaml, b"a: [1, 2\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(err.to_string().starts_with("failed to decode YAML data"));
    }

    #[test]
    fn test_yaml_first_document_only() {
        let value = load_bytes(DataFormat::Yaml, b"a: 1\n---\na: 2\n").unwrap();
        assert_eq!(value.get("a"), Some(&Value::from(1)));
    }

    #[test]
    fn test_yaml_merge_keys() {
        let text = b"base: &base\n  x: 1\n  y: 1\nderived:\n  <<: *base\n  y: 2\n";
        let value = load_bytes(DataFormat::Yaml, text).unwrap();
        let derived = value.get("derived").unwrap();
        assert_eq!(derived.get("x"), Some(&Value::from(1)));
        assert_eq!(derived.get("y"), Some(&Value::from(2)));
        assert_eq!(derived.get("<<"), None);
    }

    #[test]
    fn test_yaml_merge_key_list() {
        let text = b"a: &a {x: 1}\nb: &b {x: 2, z: 3}\nc:\n  <<: [*a, *b]\n";
        let value = load_bytes(DataFormat::Yaml, text).unwrap();
        let c = value.get("c").unwrap();
        assert_eq!(c.get("x"), Some(&Value::from(1)));
        assert_eq!(c.get("z"), Some(&Value::from(3)));
    }

    #[test]
    fn test_load_reader() {
        let value = load_reader(DataFormat::Json, &br#"{"x": "y"}"#[..]).unwrap();
        assert_eq!(value.get("x"), Some(&Value::from("y")));
    }

    #[test]
    fn test_env_entries_split_on_first_equals() {
        let value = load_env_entries(["A=b=c", "EMPTY=", "BARE", "N=42"]);
        assert_eq!(value.get("A"), Some(&Value::from("b=c")));
        assert_eq!(value.get("EMPTY"), Some(&Value::from("")));
        assert_eq!(value.get("BARE"), Some(&Value::from("")));
        assert_eq!(value.get("N"), Some(&Value::from("42")));
    }

    #[test]
    fn test_process_env_snapshot() {
        let pairs = process_env_pairs();
        let value = load_env_pairs(pairs.clone());
        for (name, env_value) in pairs {
            assert_eq!(value.get(&name), Some(&Value::String(env_value)));
        }
    }
}
