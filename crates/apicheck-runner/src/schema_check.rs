//! Response validation against JSON Schema files.
//!
//! Schemas are located through a [`FileRegistry`]. Before compiling, a
//! schema without an `$id` is given the `file://` URL of its own file, so
//! relative `$ref`s resolve next to it and are loaded from disk as JSON or
//! YAML.

use std::path::{Path, PathBuf};

use jsonschema::{Retrieve, Uri};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use apicheck_core::http::Response;
use apicheck_core::registry::{FileRegistry, LookupError};
use apicheck_core::transcode::parse_document;

#[derive(Debug, Error)]
pub enum SchemaCheckError {
    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("invalid JSON schema '{}': {reason}", .path.display())]
    InvalidSchema { path: PathBuf, reason: String },

    #[error(
        "response does not conform to '{schema}'{}:\n  - {}\n{dump}",
        .context.as_deref().map(|c| format!(" ({c})")).unwrap_or_default(),
        .errors.join("\n  - ")
    )]
    Mismatch {
        schema: String,
        context: Option<String>,
        errors: Vec<String>,
        dump: String,
    },
}

const DRAFT4: &str = "http://json-schema.org/draft-04/schema";
const KNOWN_DIALECTS: [&str; 5] = [
    "http://json-schema.org/draft-04/schema",
    "http://json-schema.org/draft-06/schema",
    "http://json-schema.org/draft-07/schema",
    "https://json-schema.org/draft/2019-09/schema",
    "https://json-schema.org/draft/2020-12/schema",
];

fn dialect(schema: &Value) -> Option<&str> {
    schema
        .get("$schema")
        .and_then(Value::as_str)
        .map(|s| s.trim_end_matches('#'))
}

/// Loads `$ref` targets with `file://` URLs from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileRetriever;

impl Retrieve for FileRetriever {
    fn retrieve(&self, uri: &Uri<String>) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let url = Url::parse(uri.as_str())?;
        let path = url
            .to_file_path()
            .map_err(|()| format!("cannot resolve '{}': only file references are supported", uri.as_str()))?;
        let text = std::fs::read_to_string(&path).map_err(|e| format!("{}: {e}", path.display()))?;
        Ok(parse_document(&path, &text)?)
    }
}

/// Compiles schemas with on-disk reference resolution and collects every
/// violation of a document.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl SchemaValidator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Violations of `document` against `schema`, one message per error;
    /// empty when it conforms. `schema_path` roots relative references.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaCheckError::InvalidSchema`] when the schema itself
    /// does not compile.
    pub fn validate(&self, document: &Value, schema: &Value, schema_path: Option<&Path>) -> Result<Vec<String>, SchemaCheckError> {
        let invalid = |reason: String| SchemaCheckError::InvalidSchema {
            path: schema_path.map(Path::to_path_buf).unwrap_or_default(),
            reason,
        };

        let mut schema = schema.clone();
        let declared = dialect(&schema).map(str::to_string);
        if let Value::Object(map) = &mut schema {
            // unknown dialects validate as the latest draft
            if let Some(uri) = declared.as_deref().filter(|d| !KNOWN_DIALECTS.contains(d)) {
                tracing::debug!(dialect = uri, "unknown $schema, using the default draft");
                map.remove("$schema");
            }
            if let Some(path) = schema_path {
                let id_key = if declared.as_deref() == Some(DRAFT4) { "id" } else { "$id" };
                if !map.contains_key(id_key) {
                    let base = file_url(path).map_err(invalid)?;
                    map.insert(id_key.to_string(), Value::String(base));
                }
            }
        }

        let validator = jsonschema::options()
            .with_retriever(FileRetriever)
            .build(&schema)
            .map_err(|e| invalid(e.to_string()))?;

        Ok(validator.iter_errors(document).map(|e| e.to_string()).collect())
    }
}

fn file_url(path: &Path) -> Result<String, String> {
    let absolute = path
        .canonicalize()
        .map_err(|e| format!("{}: {e}", path.display()))?;
    Url::from_file_path(&absolute)
        .map(String::from)
        .map_err(|()| format!("{} cannot be expressed as a file URL", absolute.display()))
}

/// Check a response body against the schema file `name`. `context` is a
/// free-form note included in the failure message.
///
/// # Errors
///
/// Returns [`SchemaCheckError::Lookup`] when the schema is missing or
/// ambiguous, [`SchemaCheckError::InvalidSchema`] when it does not compile,
/// and [`SchemaCheckError::Mismatch`] with a full response dump when the
/// body does not conform.
pub fn conforms_to(response: &Response, registry: &FileRegistry, name: &str, context: Option<&str>) -> Result<(), SchemaCheckError> {
    let (path, schema) = registry.load_schema(name)?;
    let errors = SchemaValidator::new().validate(&response.body.to_json(), &schema, Some(&path))?;
    if errors.is_empty() {
        return Ok(());
    }
    Err(SchemaCheckError::Mismatch {
        schema: name.to_string(),
        context: context.map(str::to_string),
        errors,
        dump: response.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conforming_document_has_no_errors() {
        let schema = json!({"type": "object", "required": ["id"], "properties": {"id": {"type": "integer"}}});
        let errors = SchemaValidator::new().validate(&json!({"id": 1}), &schema, None).unwrap();
        assert!(errors.is_empty());
    }

    #[test]
    fn every_violation_is_reported() {
        let schema = json!({
            "type": "object",
            "required": ["id", "name"],
            "properties": {"id": {"type": "integer"}}
        });
        let errors = SchemaValidator::new().validate(&json!({"id": "x"}), &schema, None).unwrap();
        assert_eq!(errors.len(), 2, "{errors:?}");
    }

    #[test]
    fn broken_schema_is_not_a_mismatch() {
        let schema = json!({"type": "no-such-type"});
        let err = SchemaValidator::new().validate(&json!({}), &schema, None).unwrap_err();
        assert!(matches!(err, SchemaCheckError::InvalidSchema { .. }));
    }

    #[test]
    fn unknown_dialect_falls_back() {
        let schema = json!({"$schema": "http://json-schema.org/schema#", "type": "string"});
        let errors = SchemaValidator::new().validate(&json!(3), &schema, None).unwrap();
        assert_eq!(errors.len(), 1);
    }
}
