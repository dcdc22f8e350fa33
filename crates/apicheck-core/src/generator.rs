//! `.http` reproduction files from persisted transcripts

use crate::schema::{RecordEntry, RequestSnapshot, TranscriptRecord};

/// Generate `.http` file content from the HTTP records of a transcript.
/// URLs starting with `base_url` are rewritten to use the `{{base_url_var}}`
/// variable.
#[must_use]
pub fn to_http_file(records: &[TranscriptRecord], base_url: Option<&str>, base_url_var: &str) -> String {
    let exchanges: Vec<_> = records
        .iter()
        .filter_map(|record| match &record.entry {
            RecordEntry::Http {
                request,
                response,
                comment,
            } => Some((record, request, response, comment)),
            _ => None,
        })
        .collect();

    let mut lines = vec![
        format!("# Recorded exchanges ({})", exchanges.len()),
        format!("# Base URL variable: {{{{{base_url_var}}}}}"),
        String::new(),
    ];

    for (idx, (record, request, response, comment)) in exchanges.into_iter().enumerate() {
        let label = comment.as_deref().unwrap_or(&record.test);
        lines.push(format!("### [{idx}] {label} -> {} {}", response.status, response.reason));
        lines.push(format!("# Test: {}", record.test));

        let url = match base_url.and_then(|base| request.url.strip_prefix(base)) {
            Some(rest) => format!("{{{{{base_url_var}}}}}{rest}"),
            None => request.url.clone(),
        };
        lines.push(format!("{} {url}", request.method));

        for (key, value) in &request.headers {
            if !matches!(key.to_lowercase().as_str(), "host" | "content-length") {
                lines.push(format!("{key}: {value}"));
            }
        }

        if let Some(body) = &request.body {
            lines.push(String::new());
            lines.push(body.clone());
        }

        lines.push(String::new());
    }

    lines.join("\n")
}

/// Generate a single request as .http format
#[must_use]
pub fn request_to_http(request: &RequestSnapshot, comment: Option<&str>) -> String {
    let mut lines = Vec::new();

    if let Some(c) = comment {
        lines.push(format!("### {c}"));
    }

    lines.push(format!("{} {}", request.method, request.url));

    for (key, value) in &request.headers {
        lines.push(format!("{key}: {value}"));
    }

    if let Some(body) = &request.body {
        lines.push(String::new());
        lines.push(body.clone());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ResponseSnapshot;
    use chrono::Utc;
    use indexmap::IndexMap;

    fn snapshot(method: &str, url: &str, body: Option<&str>) -> RequestSnapshot {
        RequestSnapshot {
            method: method.into(),
            url: url.into(),
            headers: IndexMap::from([
                ("Authorization".into(), "Bearer token".into()),
                ("Content-Length".into(), "16".into()),
            ]),
            body: body.map(str::to_string),
        }
    }

    fn records() -> Vec<TranscriptRecord> {
        let http = |index, comment: Option<&str>| TranscriptRecord {
            test: "users::create".into(),
            index,
            recorded_at: Utc::now(),
            entry: RecordEntry::Http {
                comment: comment.map(str::to_string),
                request: snapshot("POST", "http://localhost:8080/api/users", Some(r#"{"name": "test"}"#)),
                response: ResponseSnapshot {
                    status: 500,
                    reason: "Internal Server Error".into(),
                    headers: IndexMap::new(),
                    body: String::new(),
                    decode_fallback: None,
                },
            },
        };
        vec![
            http(0, Some("create user")),
            TranscriptRecord {
                test: "users::create".into(),
                index: 1,
                recorded_at: Utc::now(),
                entry: RecordEntry::Text { text: "note".into() },
            },
            http(2, None),
        ]
    }

    #[test]
    fn only_http_records_are_rendered() {
        let output = to_http_file(&records(), None, "base_url");
        assert!(output.starts_with("# Recorded exchanges (2)"));
        assert!(output.contains("### [0] create user -> 500 Internal Server Error"));
        assert!(output.contains("### [1] users::create -> 500"));
        assert!(!output.contains("note"));
    }

    #[test]
    fn base_url_becomes_a_variable() {
        let output = to_http_file(&records(), Some("http://localhost:8080"), "base_url");
        assert!(output.contains("POST {{base_url}}/api/users"));
        let output = to_http_file(&records(), Some("https://elsewhere"), "base_url");
        assert!(output.contains("POST http://localhost:8080/api/users"));
    }

    #[test]
    fn headers_and_body() {
        let output = to_http_file(&records(), None, "base_url");
        assert!(output.contains("Authorization: Bearer token"));
        assert!(!output.contains("Content-Length"));
        assert!(output.contains(r#"{"name": "test"}"#));
    }

    #[test]
    fn request_to_http_basic() {
        let output = request_to_http(&snapshot("GET", "http://localhost/api", None), Some("Test request"));
        assert!(output.contains("### Test request"));
        assert!(output.contains("GET http://localhost/api"));
    }
}
