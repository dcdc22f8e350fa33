//! Schema and fixture lookup by file name.
//!
//! A project keeps one directory per service under `tests/`:
//!
//! ```text
//! <root>/
//! ├── global_jsonschema/
//! └── tests/
//!     └── users/
//!         ├── schema/   user.json, user_list.yml
//!         └── data/     new_user.json, limits.yml
//! ```
//!
//! Files are found by exact name across the registered directories. Schema
//! and JSON data lookups insist on a single match; YAML lookups take the
//! first one.

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::collections::Node;
use crate::convert::RecursiveConverter;
use crate::transcode::{TranscodeError, parse_document};

/// Directory name under the project root holding one directory per service.
pub const SERVICES_DIR: &str = "tests";
/// Schemas shared by every service.
pub const GLOBAL_SCHEMA_DIR: &str = "global_jsonschema";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("File {name} not found")]
    NotFound { name: String },

    #[error("Found several files named {name}: {matches:?}")]
    Ambiguous { name: String, matches: Vec<PathBuf> },

    #[error("Cannot read {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Cannot parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

impl From<TranscodeError> for LookupError {
    fn from(err: TranscodeError) -> Self {
        match err {
            TranscodeError::Io { path, reason } => Self::Io { path, reason },
            TranscodeError::Parse { path, reason } => Self::Parse { path, reason },
            other => Self::Parse {
                path: PathBuf::new(),
                reason: other.to_string(),
            },
        }
    }
}

/// Directories searched for schemas, data and service configs.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRegistry {
    schema_dirs: Vec<PathBuf>,
    data_dirs: Vec<PathBuf>,
    service_dirs: Vec<PathBuf>,
}

impl FileRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_schema_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        push_unique(&mut self.schema_dirs, dir.into());
        self
    }

    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        push_unique(&mut self.data_dirs, dir.into());
        self
    }

    #[must_use]
    pub fn with_service_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        push_unique(&mut self.service_dirs, dir.into());
        self
    }

    /// Register every service directory under `<root>/tests`, its `schema/`
    /// and `data/` subdirectories and `<root>/global_jsonschema`.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::Io`] if the services directory exists but
    /// cannot be listed.
    pub fn discover(root: &Path) -> Result<Self, LookupError> {
        let mut registry = Self::new();
        let global = root.join(GLOBAL_SCHEMA_DIR);
        if global.is_dir() {
            registry = registry.with_schema_dir(global);
        }

        let services = root.join(SERVICES_DIR);
        if !services.is_dir() {
            tracing::info!(root = %root.display(), "no services directory, registry holds global schemas only");
            return Ok(registry);
        }

        let io_error = |e: std::io::Error| LookupError::Io {
            path: services.clone(),
            reason: e.to_string(),
        };
        let mut service_dirs: Vec<PathBuf> = std::fs::read_dir(&services)
            .map_err(io_error)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_dir() && !path.ends_with("__pycache__"))
            .collect();
        service_dirs.sort();

        for service in service_dirs {
            let schema = service.join("schema");
            let data = service.join("data");
            if schema.is_dir() {
                registry = registry.with_schema_dir(schema);
            }
            if data.is_dir() {
                registry = registry.with_data_dir(data);
            }
            registry = registry.with_service_dir(service);
        }

        tracing::info!(
            schemas = registry.schema_dirs.len(),
            data = registry.data_dirs.len(),
            services = registry.service_dirs.len(),
            "registry discovered"
        );
        Ok(registry)
    }

    #[must_use]
    pub fn schema_dirs(&self) -> &[PathBuf] {
        &self.schema_dirs
    }

    #[must_use]
    pub fn data_dirs(&self) -> &[PathBuf] {
        &self.data_dirs
    }

    #[must_use]
    pub fn service_dirs(&self) -> &[PathBuf] {
        &self.service_dirs
    }

    /// Path of the one schema called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::NotFound`] or [`LookupError::Ambiguous`].
    pub fn locate_schema(&self, name: &str) -> Result<PathBuf, LookupError> {
        unique(name, matches(name, &self.schema_dirs))
    }

    /// Locate and parse a schema (JSON or YAML).
    ///
    /// # Errors
    ///
    /// As [`FileRegistry::locate_schema`], plus read and parse failures.
    pub fn load_schema(&self, name: &str) -> Result<(PathBuf, Value), LookupError> {
        let path = self.locate_schema(name)?;
        let value = read_document(&path)?;
        Ok((path, value))
    }

    /// Parse the one JSON data file called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::NotFound`], [`LookupError::Ambiguous`] or a
    /// read/parse failure.
    pub fn parse_json_data(&self, name: &str) -> Result<Node, LookupError> {
        let path = unique(name, matches(name, &self.data_dirs))?;
        to_node(&path, &read_document(&path)?)
    }

    /// Parse the first YAML data file called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::NotFound`] or a read/parse failure.
    pub fn parse_yaml_data(&self, name: &str) -> Result<Node, LookupError> {
        let path = first(name, matches(name, &self.data_dirs))?;
        to_node(&path, &read_document(&path)?)
    }

    /// Parse the first file called `name` directly inside the directory of
    /// `service`.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::NotFound`] or a read/parse failure.
    pub fn parse_service_config(&self, name: &str, service: &str) -> Result<Node, LookupError> {
        let dirs: Vec<PathBuf> = self
            .service_dirs
            .iter()
            .filter(|dir| dir.file_name().is_some_and(|n| n == service))
            .cloned()
            .collect();
        let path = first(name, matches(name, &dirs))?;
        to_node(&path, &read_document(&path)?)
    }
}

fn push_unique(dirs: &mut Vec<PathBuf>, dir: PathBuf) {
    if !dirs.contains(&dir) {
        dirs.push(dir);
    }
}

fn matches(name: &str, dirs: &[PathBuf]) -> Vec<PathBuf> {
    dirs.iter()
        .map(|dir| dir.join(name))
        .filter(|candidate| candidate.is_file())
        .collect()
}

fn unique(name: &str, mut found: Vec<PathBuf>) -> Result<PathBuf, LookupError> {
    match found.len() {
        0 => Err(LookupError::NotFound { name: name.to_string() }),
        1 => Ok(found.remove(0)),
        _ => Err(LookupError::Ambiguous {
            name: name.to_string(),
            matches: found,
        }),
    }
}

fn first(name: &str, found: Vec<PathBuf>) -> Result<PathBuf, LookupError> {
    found
        .into_iter()
        .next()
        .ok_or_else(|| LookupError::NotFound { name: name.to_string() })
}

fn read_document(path: &Path) -> Result<Value, LookupError> {
    let text = std::fs::read_to_string(path).map_err(|e| LookupError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(parse_document(path, &text)?)
}

fn to_node(path: &Path, value: &Value) -> Result<Node, LookupError> {
    RecursiveConverter::default()
        .convert(value)
        .map_err(|e| LookupError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "global_jsonschema/error.json", r#"{"type": "object"}"#);
        write(root, "tests/users/schema/user.json", r#"{"type": "object"}"#);
        write(root, "tests/users/schema/shared.json", "{}");
        write(root, "tests/users/data/new_user.json", r#"{"name": "a", "roles": ["x"]}"#);
        write(root, "tests/users/data/limits.yml", "max: 5\n");
        write(root, "tests/users/config.yml", "url: /users\n");
        write(root, "tests/orders/schema/shared.json", "{}");
        write(root, "tests/orders/data/limits.yml", "max: 9\n");
        write(root, "tests/__pycache__/schema/user.json", "{}");
        dir
    }

    #[test]
    fn discover_registers_service_directories() {
        let dir = project();
        let registry = FileRegistry::discover(dir.path()).unwrap();
        assert_eq!(registry.schema_dirs().len(), 3);
        assert_eq!(registry.data_dirs().len(), 2);
        assert_eq!(registry.service_dirs().len(), 2);
        assert!(registry.schema_dirs()[0].ends_with(GLOBAL_SCHEMA_DIR));
    }

    #[test]
    fn schema_lookup_outcomes() {
        let dir = project();
        let registry = FileRegistry::discover(dir.path()).unwrap();

        assert!(registry.locate_schema("user.json").unwrap().ends_with("users/schema/user.json"));
        assert!(registry.locate_schema("error.json").is_ok());
        assert_eq!(
            registry.locate_schema("missing.json").unwrap_err(),
            LookupError::NotFound { name: "missing.json".into() }
        );
        match registry.locate_schema("shared.json").unwrap_err() {
            LookupError::Ambiguous { matches, .. } => assert_eq!(matches.len(), 2),
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn data_parsing() {
        let dir = project();
        let registry = FileRegistry::discover(dir.path()).unwrap();

        let user = registry.parse_json_data("new_user.json").unwrap();
        let user = user.as_dict().unwrap();
        assert_eq!(user.attr("name").unwrap().as_str(), Some("a"));
        assert_eq!(user.path("roles.0").unwrap().as_str(), Some("x"));

        // first match wins for YAML data
        let limits = registry.parse_yaml_data("limits.yml").unwrap();
        assert_eq!(limits.as_dict().unwrap()["max"].as_i64(), Some(9));

        let config = registry.parse_service_config("config.yml", "users").unwrap();
        assert_eq!(config.as_dict().unwrap()["url"].as_str(), Some("/users"));
        assert!(matches!(
            registry.parse_service_config("config.yml", "orders"),
            Err(LookupError::NotFound { .. })
        ));
    }

    #[test]
    fn unreadable_documents_are_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "schema/bad.json", "{not json");
        let registry = FileRegistry::new().with_schema_dir(dir.path().join("schema"));
        assert!(matches!(
            registry.load_schema("bad.json"),
            Err(LookupError::Parse { .. })
        ));
    }

    #[test]
    fn builder_deduplicates() {
        let registry = FileRegistry::new().with_schema_dir("a").with_schema_dir("a");
        assert_eq!(registry.schema_dirs(), [PathBuf::from("a")]);
    }
}
