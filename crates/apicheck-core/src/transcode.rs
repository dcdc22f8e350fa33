//! JSON/YAML fixture files: load, dump, convert between formats.
//!
//! Conversion can enrich the document on the way (insert a key into every
//! mapping that holds a given pair) and sort it with [`SortRules`] so
//! generated schema fixtures diff cleanly.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;
use thiserror::Error;
use walkdir::WalkDir;

use crate::collections::Node;
use crate::convert::{ConvertError, RecursiveConverter};
use crate::http::pretty_json;
use crate::sort::{RecursiveSort, SortRuleError, SortRules, parse_scalar};

/// Directory names never descended into.
const EXCLUDED_DIRS: &[&str] = &["reports", "venv", ".pytest_cache", "__"];

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Cannot read {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Cannot parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Cannot render {format}: {reason}")]
    Render { format: &'static str, reason: String },

    #[error("unknown file format '{0}' (expected json, yml or yaml)")]
    UnknownFormat(String),

    #[error("enrichment '{0}' is not of the form search_key:search_value;key:value")]
    MalformedEnrichment(String),

    #[error(transparent)]
    SortRule(#[from] SortRuleError),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error("invalid token pattern: {0}")]
    Pattern(String),

    #[error("Walk error: {0}")]
    Walk(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Json,
    Yaml,
}

impl Format {
    /// Format named by a CLI value or file extension.
    ///
    /// # Errors
    ///
    /// Returns [`TranscodeError::UnknownFormat`] for anything else.
    pub fn from_name(name: &str) -> Result<Self, TranscodeError> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yml" | "yaml" => Ok(Self::Yaml),
            _ => Err(TranscodeError::UnknownFormat(name.to_string())),
        }
    }

    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| Self::from_name(ext).ok())
    }

    /// Extension written for converted files.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yml",
        }
    }

    fn matches_extension(self, path: &Path) -> bool {
        Self::from_path(path) == Some(self)
    }

    /// # Errors
    ///
    /// Returns the parser message on malformed input.
    pub fn parse(self, text: &str) -> Result<Value, String> {
        match self {
            Self::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
            Self::Yaml => serde_yml::from_str(text).map_err(|e| e.to_string()),
        }
    }

    /// Pretty JSON (4-space indent) or block YAML. Key order is kept.
    ///
    /// # Errors
    ///
    /// Returns [`TranscodeError::Render`] if the value cannot be encoded.
    pub fn render(self, value: &Value) -> Result<String, TranscodeError> {
        match self {
            Self::Json => Ok(pretty_json(value) + "\n"),
            Self::Yaml => serde_yml::to_string(value).map_err(|e| TranscodeError::Render {
                format: "yaml",
                reason: e.to_string(),
            }),
        }
    }
}

/// Parse a document whose format is taken from the extension. Files
/// without a known extension are tried as JSON, then YAML.
///
/// # Errors
///
/// Returns [`TranscodeError::Parse`] if no format accepts the text.
pub fn parse_document(path: &Path, text: &str) -> Result<Value, TranscodeError> {
    let parse_error = |reason: String| TranscodeError::Parse {
        path: path.to_path_buf(),
        reason,
    };
    match Format::from_path(path) {
        Some(format) => format.parse(text).map_err(parse_error),
        None => Format::Json
            .parse(text)
            .or_else(|_| Format::Yaml.parse(text))
            .map_err(parse_error),
    }
}

/// Read and parse a JSON or YAML file.
///
/// # Errors
///
/// Returns [`TranscodeError::Io`] or [`TranscodeError::Parse`].
pub fn load(path: &Path) -> Result<Value, TranscodeError> {
    let text = read_text(path)?;
    parse_document(path, &text)
}

/// Write `value` to `path` in `format`.
///
/// # Errors
///
/// Returns [`TranscodeError::Render`] or [`TranscodeError::Io`].
pub fn dump(value: &Value, path: &Path, format: Format) -> Result<(), TranscodeError> {
    let text = format.render(value)?;
    std::fs::write(path, text).map_err(|e| TranscodeError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn read_text(path: &Path) -> Result<String, TranscodeError> {
    std::fs::read_to_string(path).map_err(|e| TranscodeError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

// ── Enrichment ──

/// Adds `add` into every mapping that contains the `search` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    pub search: (String, Value),
    pub add: (String, Value),
}

impl Enrichment {
    /// Parse `search_key:search_value;key:value` entries separated by
    /// commas, e.g. `type:object;additionalProperties:false`.
    ///
    /// With `normalize`, values are read as scalars (`false`, `null`, numbers);
    /// otherwise they stay strings.
    ///
    /// # Errors
    ///
    /// Returns [`TranscodeError::MalformedEnrichment`] for entries of any
    /// other shape.
    pub fn parse_list(text: &str, normalize: bool) -> Result<Vec<Self>, TranscodeError> {
        text.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let malformed = || TranscodeError::MalformedEnrichment(entry.to_string());
                let (search, add) = entry.split_once(';').ok_or_else(malformed)?;
                let pair = |part: &str| {
                    let (key, value) = part.split_once(':')?;
                    if key.is_empty() || value.is_empty() || key.contains(char::is_whitespace) {
                        return None;
                    }
                    let value = if normalize {
                        parse_scalar(value)
                    } else {
                        Value::String(value.to_string())
                    };
                    Some((key.to_string(), value))
                };
                Ok(Self {
                    search: pair(search).ok_or_else(malformed)?,
                    add: pair(add).ok_or_else(malformed)?,
                })
            })
            .collect()
    }

    /// Apply at every depth.
    pub fn apply(&self, value: &mut Value) {
        match value {
            Value::Object(map) => {
                let (search_key, search_value) = &self.search;
                if map.get(search_key) == Some(search_value) {
                    map.insert(self.add.0.clone(), self.add.1.clone());
                }
                for child in map.values_mut() {
                    self.apply(child);
                }
            }
            Value::Array(items) => {
                for child in items {
                    self.apply(child);
                }
            }
            _ => {}
        }
    }
}

// ── Conversion ──

/// How [`convert_file`] treats one source file.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub target: Format,
    /// Defaults to the source path with the target extension.
    pub destination: Option<PathBuf>,
    pub enrich: Vec<Enrichment>,
    pub sort: Option<SortRules>,
    /// Keep the source file after a successful conversion.
    pub preserve: bool,
    /// Report the destination without touching any file.
    pub emulate: bool,
}

impl ConvertOptions {
    #[must_use]
    pub fn new(target: Format) -> Self {
        Self {
            target,
            destination: None,
            enrich: Vec::new(),
            sort: None,
            preserve: false,
            emulate: false,
        }
    }

    #[must_use]
    pub fn with_sort(mut self, rules: SortRules) -> Self {
        self.sort = Some(rules);
        self
    }

    #[must_use]
    pub fn with_enrichment(mut self, enrich: Vec<Enrichment>) -> Self {
        self.enrich = enrich;
        self
    }

    #[must_use]
    pub fn preserving(mut self, preserve: bool) -> Self {
        self.preserve = preserve;
        self
    }

    #[must_use]
    pub fn emulating(mut self, emulate: bool) -> Self {
        self.emulate = emulate;
        self
    }

    fn destination_for(&self, source: &Path) -> PathBuf {
        self.destination
            .clone()
            .unwrap_or_else(|| source.with_extension(self.target.extension()))
    }
}

/// Sort a plain JSON tree with the given rules.
///
/// # Errors
///
/// Returns [`TranscodeError::Convert`] for documents nested past the
/// converter's depth limit.
pub fn sort_value(value: &Value, rules: &SortRules) -> Result<Value, TranscodeError> {
    let node: Node = RecursiveConverter::default().convert(value)?;
    Ok(RecursiveSort::new(rules).sort(&node).to_json())
}

/// Convert one file and return the destination path.
///
/// The source is removed once the destination is written unless the
/// options preserve it or both paths are the same.
///
/// # Errors
///
/// Returns the first load, sort, render or write failure. The source is
/// left in place on any error.
pub fn convert_file(source: &Path, options: &ConvertOptions) -> Result<PathBuf, TranscodeError> {
    let destination = options.destination_for(source);
    if options.emulate {
        tracing::info!(source = %source.display(), destination = %destination.display(), "would convert");
        return Ok(destination);
    }

    let mut value = load(source)?;
    for enrichment in &options.enrich {
        enrichment.apply(&mut value);
    }
    if let Some(rules) = &options.sort {
        value = sort_value(&value, rules)?;
    }
    dump(&value, &destination, options.target)?;
    tracing::debug!(source = %source.display(), destination = %destination.display(), "converted");

    if destination != source && !options.preserve {
        std::fs::remove_file(source).map_err(|e| TranscodeError::Io {
            path: source.to_path_buf(),
            reason: e.to_string(),
        })?;
    }
    Ok(destination)
}

// ── File selection ──

/// Which files [`collect_files`] picks up.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Name of the directories holding fixtures, e.g. `schema`. When it
    /// names the root itself, files are taken from the root directly.
    pub dir_name: String,
    pub format: Format,
    /// Exact file names; when empty, every file of `format` is selected.
    pub names: Vec<String>,
    /// Descend into subdirectories of each matched directory.
    pub recursive: bool,
}

fn is_excluded(name: &str) -> bool {
    EXCLUDED_DIRS.iter().any(|ex| name.ends_with(ex))
}

/// Files to convert under `root`, in a stable order.
///
/// # Errors
///
/// Returns [`TranscodeError::Walk`] if a directory cannot be read.
pub fn collect_files(root: &Path, selection: &Selection) -> Result<Vec<PathBuf>, TranscodeError> {
    let root_is_target = root
        .file_name()
        .is_some_and(|name| name.to_string_lossy() == selection.dir_name)
        || Path::new(&selection.dir_name) == root;
    if root_is_target {
        return files_in(root, selection);
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && is_excluded(&e.file_name().to_string_lossy())));
    for entry in walker {
        let entry = entry.map_err(|e| TranscodeError::Walk(e.to_string()))?;
        if entry.file_type().is_dir() && entry.file_name().to_string_lossy() == selection.dir_name {
            files.extend(files_in(entry.path(), selection)?);
        }
    }
    Ok(files)
}

fn files_in(dir: &Path, selection: &Selection) -> Result<Vec<PathBuf>, TranscodeError> {
    let depth = if selection.recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).max_depth(depth).sort_by_file_name() {
        let entry = entry.map_err(|e| TranscodeError::Walk(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let selected = if selection.names.is_empty() {
            selection.format.matches_extension(path)
        } else {
            let name = entry.file_name().to_string_lossy();
            selection.names.iter().any(|n| *n == name)
        };
        if selected {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

/// Replace every mention of `old` with `new` in the text files under
/// `root`. Binary files are skipped. Returns the files that mention `old`;
/// with `emulate` they are reported but left unchanged.
///
/// # Errors
///
/// Returns [`TranscodeError::Walk`] or a write failure.
pub fn rewrite_references(
    root: &Path,
    old: &str,
    new: &str,
    emulate: bool,
) -> Result<Vec<PathBuf>, TranscodeError> {
    let mut touched = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && is_excluded(&e.file_name().to_string_lossy())));
    for entry in walker {
        let entry = entry.map_err(|e| TranscodeError::Walk(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(text) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        if !text.contains(old) {
            continue;
        }
        if !emulate {
            std::fs::write(entry.path(), text.replace(old, new)).map_err(|e| TranscodeError::Io {
                path: entry.path().to_path_buf(),
                reason: e.to_string(),
            })?;
        }
        tracing::info!(file = %entry.path().display(), emulate, "reference rewritten");
        touched.push(entry.path().to_path_buf());
    }
    Ok(touched)
}

// ── Case change ──

static SNAKE_TOKEN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r#""[a-z_]+_+[a-z]+""#));

/// Rewrite quoted snake_case tokens as camelCase: `"user_id"` becomes
/// `"userId"`. Everything outside the quotes is untouched.
///
/// # Errors
///
/// Returns [`TranscodeError::Pattern`] if the token pattern fails to compile.
pub fn camelize(text: &str) -> Result<String, TranscodeError> {
    let pattern = SNAKE_TOKEN
        .as_ref()
        .map_err(|e| TranscodeError::Pattern(e.to_string()))?;
    Ok(pattern
        .replace_all(text, |caps: &Captures<'_>| to_camel_case(&caps[0]))
        .into_owned())
}

fn to_camel_case(token: &str) -> String {
    let mut words = token.split('_');
    let mut out = words.next().unwrap_or_default().to_string();
    for word in words {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn format_names() {
        assert_eq!(Format::from_name("YAML").unwrap(), Format::Yaml);
        assert_eq!(Format::from_name("yml").unwrap(), Format::Yaml);
        assert_eq!(Format::from_name("json").unwrap(), Format::Json);
        assert!(Format::from_name("xml").is_err());
        assert_eq!(Format::from_path(Path::new("a/b.yaml")), Some(Format::Yaml));
        assert_eq!(Format::from_path(Path::new("a/b")), None);
    }

    #[test]
    fn extensionless_documents_are_sniffed() {
        let path = Path::new("fixture");
        assert_eq!(parse_document(path, r#"{"a": 1}"#).unwrap(), json!({"a": 1}));
        assert_eq!(parse_document(path, "a: 1\nb: [x]\n").unwrap(), json!({"a": 1, "b": ["x"]}));
    }

    #[test]
    fn enrichment_parsing() {
        let list = Enrichment::parse_list(
            "type:object;additionalProperties:false, type:array;uniqueItems:true",
            true,
        )
        .unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].search, ("type".into(), json!("object")));
        assert_eq!(list[0].add, ("additionalProperties".into(), json!(false)));

        let raw = Enrichment::parse_list("a:1;b:2", false).unwrap();
        assert_eq!(raw[0].add.1, json!("2"));

        assert!(matches!(
            Enrichment::parse_list("type:object", true),
            Err(TranscodeError::MalformedEnrichment(_))
        ));
    }

    #[test]
    fn enrichment_reaches_every_depth() {
        let mut schema = json!({
            "type": "object",
            "properties": {
                "tags": {"type": "array", "items": {"type": "object"}}
            }
        });
        for e in Enrichment::parse_list("type:object;additionalProperties:false", true).unwrap() {
            e.apply(&mut schema);
        }
        assert_eq!(schema["additionalProperties"], json!(false));
        assert_eq!(
            schema["properties"]["tags"]["items"]["additionalProperties"],
            json!(false)
        );
        assert!(schema["properties"]["tags"].get("additionalProperties").is_none());
    }

    #[test]
    fn convert_json_to_yaml_and_remove_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("user.json");
        std::fs::write(&source, r#"{"b": 1, "a": [3, 1, 2]}"#).unwrap();

        let options = ConvertOptions::new(Format::Yaml).with_sort(SortRules::new());
        let dest = convert_file(&source, &options).unwrap();

        assert_eq!(dest, dir.path().join("user.yml"));
        assert!(!source.exists());
        let back = load(&dest).unwrap();
        assert_eq!(back, json!({"a": [1, 2, 3], "b": 1}));
        assert_eq!(back.as_object().unwrap().keys().next().map(String::as_str), Some("a"));
    }

    #[test]
    fn preserve_and_emulate() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("user.yml");
        std::fs::write(&source, "name: x\n").unwrap();

        let dest = convert_file(&source, &ConvertOptions::new(Format::Json).emulating(true)).unwrap();
        assert!(!dest.exists());
        assert!(source.exists());

        let dest = convert_file(&source, &ConvertOptions::new(Format::Json).preserving(true)).unwrap();
        assert!(dest.exists());
        assert!(source.exists());
        let text = std::fs::read_to_string(dest).unwrap();
        assert_eq!(text, "{\n    \"name\": \"x\"\n}\n");
    }

    #[test]
    fn collect_only_named_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for rel in [
            "tests/users/schema/a.json",
            "tests/users/schema/nested/b.json",
            "tests/users/data/c.json",
            "tests/venv/schema/d.json",
            "tests/orders/schema/e.yml",
        ] {
            let path = root.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "{}").unwrap();
        }

        let mut selection = Selection {
            dir_name: "schema".into(),
            format: Format::Json,
            names: vec![],
            recursive: false,
        };
        let names = |files: Vec<PathBuf>| -> Vec<String> {
            files
                .iter()
                .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
                .collect()
        };
        assert_eq!(names(collect_files(root, &selection).unwrap()), ["a.json"]);

        selection.recursive = true;
        assert_eq!(names(collect_files(root, &selection).unwrap()), ["a.json", "b.json"]);

        selection.names = vec!["e.yml".into()];
        assert_eq!(names(collect_files(root, &selection).unwrap()), ["e.yml"]);
    }

    #[test]
    fn references_are_rewritten_in_text_files() {
        let dir = tempfile::tempdir().unwrap();
        let test_file = dir.path().join("test_users.py");
        std::fs::write(&test_file, "schema = 'user.json'\n").unwrap();
        std::fs::write(dir.path().join("blob.bin"), [0xff, 0xfe, 0x00]).unwrap();

        let dry = rewrite_references(dir.path(), "user.json", "user.yml", true).unwrap();
        assert_eq!(dry, vec![test_file.clone()]);
        assert!(std::fs::read_to_string(&test_file).unwrap().contains("user.json"));

        rewrite_references(dir.path(), "user.json", "user.yml", false).unwrap();
        assert_eq!(std::fs::read_to_string(&test_file).unwrap(), "schema = 'user.yml'\n");
    }

    #[test]
    fn camelize_quoted_tokens() {
        let text = r#"{"user_id": 1, "first_name": "snake_value", "plain": "x_"}"#;
        assert_eq!(
            camelize(text).unwrap(),
            r#"{"userId": 1, "firstName": "snakeValue", "plain": "x_"}"#
        );
        assert_eq!(camelize("no tokens here").unwrap(), "no tokens here");
    }
}
