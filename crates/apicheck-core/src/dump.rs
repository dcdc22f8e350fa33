//! Transcript persistence as JSONL files
//!
//! Every test gets its own file of [`TranscriptRecord`] lines so a failed
//! run can be inspected after the fact:
//!
//! ```text
//! .apicheck/transcripts/
//! ├── users__create_user.jsonl
//! ├── users__list_users.jsonl
//! └── index.json
//! ```

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::schema::{RecordEntry, TranscriptRecord};

/// Headers masked in persisted transcripts.
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "x-api-key",
    "x-auth-token",
    "cookie",
    "set-cookie",
    "proxy-authorization",
];

const MASK: &str = "***";

/// Longest test label kept in a file name.
const MAX_FILENAME_LEN: usize = 200;

/// Written as `index.json` next to the transcript files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptIndex {
    pub total: u64,
    pub tests: Vec<TranscriptFileEntry>,
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptFileEntry {
    pub test: String,
    pub file: String,
    pub count: u64,
}

/// Write records to one JSONL file per test plus `index.json`.
///
/// # Errors
///
/// Returns error if the directory cannot be created or a file cannot be
/// written.
pub fn write_transcript(
    records: &[TranscriptRecord],
    dir: &Path,
    mask_headers: bool,
) -> Result<TranscriptIndex, DumpError> {
    std::fs::create_dir_all(dir).map_err(|e| DumpError::Io(format!("create {}: {e}", dir.display())))?;

    let mut groups: BTreeMap<&str, Vec<&TranscriptRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.test.as_str()).or_default().push(record);
    }

    let mut tests = Vec::new();
    let mut total: u64 = 0;
    for (test, records) in groups {
        let file = sanitize_filename(test);
        let path = dir.join(&file);
        let handle = std::fs::File::create(&path)
            .map_err(|e| DumpError::Io(format!("create {}: {e}", path.display())))?;
        let mut writer = std::io::BufWriter::new(handle);

        for record in &records {
            let line = if mask_headers {
                serde_json::to_string(&mask_record(record))
            } else {
                serde_json::to_string(record)
            }
            .map_err(|e| DumpError::Serialize(e.to_string()))?;
            writeln!(writer, "{line}").map_err(|e| DumpError::Io(format!("write {}: {e}", path.display())))?;
        }
        writer
            .flush()
            .map_err(|e| DumpError::Io(format!("flush {}: {e}", path.display())))?;

        let count = records.len() as u64;
        total += count;
        tests.push(TranscriptFileEntry {
            test: test.to_string(),
            file,
            count,
        });
    }

    let index = TranscriptIndex {
        total,
        tests,
        dir: dir.to_path_buf(),
    };
    let index_path = dir.join("index.json");
    let text = serde_json::to_string_pretty(&index).map_err(|e| DumpError::Serialize(e.to_string()))?;
    std::fs::write(&index_path, text)
        .map_err(|e| DumpError::Io(format!("write {}: {e}", index_path.display())))?;

    tracing::debug!(total, dir = %dir.display(), "transcript written");
    Ok(index)
}

/// Read back one JSONL transcript file.
///
/// # Errors
///
/// Returns error if the file cannot be read or a line does not parse.
pub fn read_transcript(path: &Path) -> Result<Vec<TranscriptRecord>, DumpError> {
    let text = std::fs::read_to_string(path).map_err(|e| DumpError::Io(format!("read {}: {e}", path.display())))?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(|e| DumpError::Serialize(e.to_string())))
        .collect()
}

/// "users::create user" -> "users__create_user.jsonl"
fn sanitize_filename(test: &str) -> String {
    let sanitized: String = test
        .chars()
        .take(MAX_FILENAME_LEN)
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' => c,
            _ => '_',
        })
        .collect();
    format!("{sanitized}.jsonl")
}

fn is_sensitive_header(name: &str) -> bool {
    SENSITIVE_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h))
}

fn mask_record(record: &TranscriptRecord) -> TranscriptRecord {
    let mut masked = record.clone();
    if let RecordEntry::Http { request, response, .. } = &mut masked.entry {
        for headers in [&mut request.headers, &mut response.headers] {
            for (name, value) in headers.iter_mut() {
                if is_sensitive_header(name) {
                    *value = MASK.to_string();
                }
            }
        }
    }
    masked
}

#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RequestSnapshot, ResponseSnapshot};
    use chrono::Utc;
    use indexmap::IndexMap;

    fn http_record(test: &str, status: u16) -> TranscriptRecord {
        TranscriptRecord {
            test: test.into(),
            index: 0,
            recorded_at: Utc::now(),
            entry: RecordEntry::Http {
                comment: None,
                request: RequestSnapshot {
                    method: "POST".into(),
                    url: "https://api/users".into(),
                    headers: IndexMap::from([
                        ("Authorization".into(), "Bearer secret-token".into()),
                        ("Content-Type".into(), "application/json".into()),
                    ]),
                    body: Some("{}".into()),
                },
                response: ResponseSnapshot {
                    status,
                    reason: String::new(),
                    headers: IndexMap::from([("Set-Cookie".into(), "session=1".into())]),
                    body: String::new(),
                    decode_fallback: None,
                },
            },
        }
    }

    fn request_headers(record: &TranscriptRecord) -> &IndexMap<String, String> {
        match &record.entry {
            RecordEntry::Http { request, .. } => &request.headers,
            _ => panic!("not an http record"),
        }
    }

    #[test]
    fn sanitize_test_labels() {
        assert_eq!(sanitize_filename("users::create user"), "users__create_user.jsonl");
    }

    #[test]
    fn mask_request_and_response_headers() {
        let masked = mask_record(&http_record("t", 200));
        assert_eq!(request_headers(&masked)["Authorization"], "***");
        assert_eq!(request_headers(&masked)["Content-Type"], "application/json");
        match &masked.entry {
            RecordEntry::Http { response, .. } => assert_eq!(response.headers["Set-Cookie"], "***"),
            _ => unreachable!(),
        }
    }

    #[test]
    fn write_groups_by_test() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            http_record("users::create", 201),
            http_record("users::create", 400),
            http_record("health", 200),
        ];
        let index = write_transcript(&records, dir.path(), true).unwrap();

        assert_eq!(index.total, 3);
        assert_eq!(index.tests[0].test, "health");
        assert_eq!(index.tests[1].count, 2);

        let back = read_transcript(&dir.path().join(&index.tests[1].file)).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(request_headers(&back[0])["Authorization"], "***");

        let index_json = std::fs::read_to_string(dir.path().join("index.json")).unwrap();
        let parsed: TranscriptIndex = serde_json::from_str(&index_json).unwrap();
        assert_eq!(parsed.total, 3);
    }

    #[test]
    fn unmasked_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        write_transcript(&[http_record("t", 200)], dir.path(), false).unwrap();
        let back = read_transcript(&dir.path().join("t.jsonl")).unwrap();
        assert_eq!(request_headers(&back[0])["Authorization"], "Bearer secret-token");
    }

    #[test]
    fn empty_transcript_still_writes_index() {
        let dir = tempfile::tempdir().unwrap();
        let index = write_transcript(&[], dir.path(), true).unwrap();
        assert_eq!(index.total, 0);
        assert!(dir.path().join("index.json").exists());
    }
}
