//! Persisted transcript format.
//!
//! One [`TranscriptRecord`] per JSON line. The JSON Schema produced by
//! [`generate_schema`] lets report tooling validate what it reads.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One transcript item of one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptRecord {
    /// Test the item belongs to, e.g. "tests/users/test_create.rs::creates_user"
    pub test: String,
    /// Position within the test's transcript
    pub index: usize,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub entry: RecordEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordEntry {
    Text {
        text: String,
    },
    Http {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
        request: RequestSnapshot,
        response: ResponseSnapshot,
    },
    Sql {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
        query: String,
        /// Result rows, column name to value
        #[serde(default)]
        rows: Vec<serde_json::Value>,
    },
}

/// Request as sent on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RequestSnapshot {
    pub method: String,
    /// Full URL including the query string
    pub url: String,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Response as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResponseSnapshot {
    pub status: u16,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    /// Raw body decoded as UTF-8 (lossy)
    #[serde(default)]
    pub body: String,
    /// Body did not decode as its content type promised
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decode_fallback: Option<String>,
}

/// Generate JSON Schema for the transcript record format.
///
/// # Errors
///
/// Returns the serializer error if the schema cannot be rendered.
pub fn generate_schema() -> Result<String, serde_json::Error> {
    let schema = schemars::schema_for!(TranscriptRecord);
    serde_json::to_string_pretty(&schema)
}
