//! Path-addressed access to the project document.
//!
//! The document is a single JSON object. Paths are dot-joined keys
//! (`__services.frontend.image`); when reading, a segment that lands on an
//! array is used as an index. Every mutation is written straight back to
//! disk.

use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the project document searched for by [`ConfigStore::discover`].
pub const CONFIG_FILE_NAME: &str = "kubails.json";

/// The root of a project document.
pub type Config = Map<String, Value>;

/// A project document with write-through persistence.
///
/// Stores created with [`ConfigStore::in_memory`] have no backing file and
/// never touch the disk.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    root: Config,
    path: Option<PathBuf>,
}

impl ConfigStore {
    /// Load a document from `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = fs::read_to_string(&path).map_err(|source| Error::Read {
            path: path.clone(),
            source,
        })?;

        let value: Value = serde_json::from_str(&content).map_err(|source| Error::Parse {
            path: path.clone(),
            source,
        })?;

        let Value::Object(root) = value else {
            return Err(Error::InvalidRoot(path));
        };

        log::debug!("Loaded config from {}", path.display());
        Ok(Self {
            root,
            path: Some(path),
        })
    }

    /// Find [`CONFIG_FILE_NAME`] in `start` or one of its parents and load it.
    pub fn discover(start: &Path) -> Result<Self> {
        let path = find_config_file(start, CONFIG_FILE_NAME).ok_or_else(|| Error::NotAProject {
            file_name: CONFIG_FILE_NAME.to_string(),
            start: start.to_path_buf(),
        })?;
        Self::open(path)
    }

    /// Create a store that is never persisted.
    pub fn in_memory(root: Config) -> Self {
        Self { root, path: None }
    }

    /// Location of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Directory holding the backing file (the project root).
    pub fn dir(&self) -> &Path {
        self.path
            .as_deref()
            .and_then(Path::parent)
            .unwrap_or_else(|| Path::new("."))
    }

    /// Resolve a path relative to the project root.
    pub fn project_path(&self, sub_path: impl AsRef<Path>) -> PathBuf {
        self.dir().join(sub_path)
    }

    /// The whole document.
    pub fn read(&self) -> &Config {
        &self.root
    }

    /// Replace the whole document and persist it once.
    ///
    /// Use this to batch several nested edits into a single write.
    pub fn replace(&mut self, config: Config) -> Result<()> {
        self.root = config;
        self.persist()
    }

    /// Look up the value at a dotted path.
    ///
    /// Returns `None` when any segment is missing, when an index is out of
    /// range, or when a segment would have to descend into a scalar.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.root.get(segments.next()?)?;

        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        Some(current)
    }

    /// Set the value at a dotted path and persist the document.
    ///
    /// Missing intermediate keys are created as empty objects. An existing
    /// intermediate that is not an object is never overwritten; the call
    /// fails with [`Error::InvalidConfigPath`] instead. String values are
    /// parsed as JSON first (`"3"` becomes a number, `"true"` a boolean,
    /// `'{"a":1}'` an object) and stored verbatim when they are not JSON.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::invalid_path(path, "empty key segment"));
        }

        let Some((last, parents)) = segments.split_last() else {
            return Err(Error::invalid_path(path, "empty path"));
        };

        let value = coerce(value.into());
        let mut current = &mut self.root;

        for (depth, segment) in parents.iter().enumerate() {
            let entry = current
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Object(Map::new()));

            current = match entry {
                Value::Object(map) => map,
                other => {
                    return Err(Error::invalid_path(
                        path,
                        format!(
                            "'{}' is {}, not an object",
                            segments[..=depth].join("."),
                            kind_name(other)
                        ),
                    ));
                }
            };
        }

        current.insert((*last).to_string(), value);
        log::debug!("Set {path}");
        self.persist()
    }

    /// Write the document to its backing file.
    ///
    /// Keys are written sorted with four-space indentation. In-memory
    /// stores return immediately.
    pub fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.root.serialize(&mut serializer)?;
        buf.push(b'\n');

        fs::write(path, buf).map_err(|source| Error::Persist {
            path: path.clone(),
            source,
        })?;

        log::debug!("Wrote config to {}", path.display());
        Ok(())
    }
}

/// Search `start` and every parent directory for `file_name`.
pub fn find_config_file(start: &Path, file_name: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(file_name))
        .find(|candidate| candidate.is_file())
}

/// Interpret string input as JSON when possible.
fn coerce(value: Value) -> Value {
    match value {
        Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        other => other,
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store(value: Value) -> ConfigStore {
        match value {
            Value::Object(root) => ConfigStore::in_memory(root),
            _ => panic!("test config must be an object"),
        }
    }

    #[test]
    fn test_get_nested_value() {
        let store = store(json!({
            "__services": {"backend": {"container_port": 5000}}
        }));

        assert_eq!(
            store.get("__services.backend.container_port"),
            Some(&json!(5000))
        );
        assert_eq!(
            store.get("__services.backend"),
            Some(&json!({"container_port": 5000}))
        );
    }

    #[test]
    fn test_get_indexes_into_arrays() {
        let store = store(json!({
            "__services": {"frontend": {"env": [{"name": "NODE_ENV"}]}}
        }));

        assert_eq!(
            store.get("__services.frontend.env.0.name"),
            Some(&json!("NODE_ENV"))
        );
        assert_eq!(store.get("__services.frontend.env.1.name"), None);
        assert_eq!(store.get("__services.frontend.env.first"), None);
    }

    #[test]
    fn test_get_missing_is_none() {
        let store = store(json!({"__domain": "example.com"}));

        assert_eq!(store.get("__project_name"), None);
        assert_eq!(store.get("__domain.sub"), None);
        assert_eq!(store.get(""), None);
    }

    #[test]
    fn test_set_creates_intermediate_objects() {
        let mut store = store(json!({"__services": {}}));

        store
            .set(
                "__services.frontend.secrets",
                json!({"name": "frontend-secrets", "file": ".env.encrypted"}),
            )
            .unwrap();

        assert_eq!(
            store.get("__services.frontend.secrets.name"),
            Some(&json!("frontend-secrets"))
        );
    }

    #[test]
    fn test_set_through_scalar_fails() {
        let mut store = store(json!({"__domain": "example.com"}));

        let err = store.set("__domain.sub", "x").unwrap_err();
        assert!(matches!(err, Error::InvalidConfigPath { .. }));
        assert!(err.to_string().contains("'__domain' is a string"));
        assert_eq!(store.get("__domain"), Some(&json!("example.com")));
    }

    #[test]
    fn test_set_through_array_fails() {
        let mut store = store(json!({"__list": ["a"]}));

        let err = store.set("__list.0", "b").unwrap_err();
        assert!(matches!(err, Error::InvalidConfigPath { .. }));
    }

    #[test]
    fn test_set_rejects_empty_segments() {
        let mut store = store(json!({}));

        assert!(store.set("", "x").is_err());
        assert!(store.set("a..b", "x").is_err());
        assert!(store.read().is_empty());
    }

    #[test]
    fn test_set_parses_json_strings() {
        let mut store = store(json!({}));

        store.set("port", "3").unwrap();
        store.set("enabled", "true").unwrap();
        store.set("nested", r#"{"a": 1}"#).unwrap();
        store.set("list", r#"["x", "y"]"#).unwrap();
        store.set("nothing", "null").unwrap();

        assert_eq!(store.get("port"), Some(&json!(3)));
        assert_eq!(store.get("enabled"), Some(&json!(true)));
        assert_eq!(store.get("nested.a"), Some(&json!(1)));
        assert_eq!(store.get("list"), Some(&json!(["x", "y"])));
        assert_eq!(store.get("nothing"), Some(&Value::Null));
    }

    #[test]
    fn test_set_keeps_plain_strings() {
        let mut store = store(json!({}));

        store.set("__domain", "test.com").unwrap();
        store.set("quoted", "\"3\"").unwrap();

        assert_eq!(store.get("__domain"), Some(&json!("test.com")));
        assert_eq!(store.get("quoted"), Some(&json!("3")));
    }

    #[test]
    fn test_set_non_string_values_untouched() {
        let mut store = store(json!({}));

        store.set("replicas", 2).unwrap();
        store.set("flag", false).unwrap();

        assert_eq!(store.get("replicas"), Some(&json!(2)));
        assert_eq!(store.get("flag"), Some(&json!(false)));
    }

    #[test]
    fn test_set_persists_sorted_document() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, r#"{"b": 1, "a": {"y": 2}}"#).unwrap();

        let mut store = ConfigStore::open(&path).unwrap();
        store.set("a.x", "hello").unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "{\n    \"a\": {\n        \"x\": \"hello\",\n        \"y\": 2\n    },\n    \"b\": 1\n}\n"
        );

        let reloaded = ConfigStore::open(&path).unwrap();
        assert_eq!(reloaded.get("a.x"), Some(&json!("hello")));
    }

    #[test]
    fn test_replace_persists_once() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "{}").unwrap();

        let mut store = ConfigStore::open(&path).unwrap();
        let mut config = store.read().clone();
        config.insert("__services".into(), json!({"api": {"image": "api"}}));
        config.insert("__domain".into(), json!("example.com"));
        store.replace(config).unwrap();

        let reloaded = ConfigStore::open(&path).unwrap();
        assert_eq!(reloaded.get("__services.api.image"), Some(&json!("api")));
        assert_eq!(reloaded.get("__domain"), Some(&json!("example.com")));
    }

    #[test]
    fn test_persist_failure_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "{}").unwrap();

        let mut store = ConfigStore::open(&path).unwrap();
        fs::remove_dir_all(temp.path()).unwrap();

        let err = store.set("a", "b").unwrap_err();
        assert!(matches!(err, Error::Persist { .. }));
    }

    #[test]
    fn test_open_rejects_non_object_root() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[1, 2]").unwrap();

        assert!(matches!(
            ConfigStore::open(&path),
            Err(Error::InvalidRoot(_))
        ));
    }

    #[test]
    fn test_open_rejects_invalid_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(ConfigStore::open(&path), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_discover_searches_parents() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(CONFIG_FILE_NAME), r#"{"__project_name": "demo"}"#).unwrap();
        let nested = temp.path().join("services").join("frontend");
        fs::create_dir_all(&nested).unwrap();

        let store = ConfigStore::discover(&nested).unwrap();
        assert_eq!(store.get("__project_name"), Some(&json!("demo")));
        assert_eq!(store.dir(), temp.path());
        assert_eq!(
            store.project_path("terraform"),
            temp.path().join("terraform")
        );
    }

    #[test]
    fn test_discover_outside_project() {
        let temp = TempDir::new().unwrap();

        let err = ConfigStore::discover(temp.path()).unwrap_err();
        assert!(matches!(err, Error::NotAProject { .. }));
    }

    #[test]
    fn test_in_memory_store_never_writes() {
        let mut store = store(json!({}));
        store.set("a", "b").unwrap();

        assert!(store.path().is_none());
        assert_eq!(store.dir(), Path::new("."));
    }
}
