//! Report-facing log of what a test did.
//!
//! A [`Transcript`] collects HTTP exchanges, SQL queries and free text while
//! a test runs. At the end of the test the items are drained and rendered
//! as HTML fragments, handed to an [`AttachmentSink`] as steps, or persisted
//! as [`TranscriptRecord`]s.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use crate::collections::ExtDict;
use crate::config::Config;
use crate::http::{BodyOutcome, Request, Response};
use crate::schema::{RecordEntry, RequestSnapshot, ResponseSnapshot, TranscriptRecord};

/// Response dumps longer than this are cut to their first line in HTML.
const MAX_HTML_RESPONSE: usize = 1_000_000;

/// One logged event. Items own deep copies of what they describe.
#[derive(Debug, Clone, PartialEq)]
pub enum LogItem {
    Text(String),
    Http {
        request: Request,
        response: Response,
        comment: Option<String>,
    },
    Sql {
        query: String,
        rows: Vec<ExtDict>,
        comment: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Json,
    Html,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub body: String,
    pub kind: AttachmentKind,
}

/// A titled group of attachments, as report steps are shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub title: String,
    pub attachments: Vec<Attachment>,
}

/// Receives rendered steps, e.g. a report writer.
pub trait AttachmentSink {
    fn attach(&mut self, step: Step);
}

impl AttachmentSink for Vec<Step> {
    fn attach(&mut self, step: Step) {
        self.push(step);
    }
}

impl LogItem {
    /// HTML fragment for report extras. Content is escaped.
    #[must_use]
    pub fn to_html(&self) -> String {
        match self {
            Self::Text(text) => format!(
                "<div class=\"extra_block\">\n<p>{}</p>\n</div>",
                escape(text)
            ),
            Self::Http {
                request,
                response,
                comment,
            } => {
                let mut dump = response.to_string();
                if dump.len() > MAX_HTML_RESPONSE {
                    let first = dump.trim_start().lines().next().unwrap_or_default().to_string();
                    dump = first;
                }
                format!(
                    "<div class=\"extra_block\">\n<p>{}</p>\n<pre class=\"extra_request\">{}</pre>\n<hr>\n<pre class=\"extra_response\">{}</pre>\n</div>",
                    escape(comment.as_deref().unwrap_or_default()),
                    escape(&request.to_string()),
                    escape(&dump)
                )
            }
            Self::Sql { .. } => self.sql_html(),
        }
    }

    /// Step for attachment-based reports.
    #[must_use]
    pub fn to_step(&self) -> Step {
        match self {
            Self::Text(text) => Step {
                title: text.clone(),
                attachments: Vec::new(),
            },
            Self::Http {
                request,
                response,
                comment,
            } => {
                let url = request
                    .full_url()
                    .map_or_else(|_| format!("{}{}", request.host, request.path), |u| u.to_string());
                Step {
                    title: comment
                        .clone()
                        .unwrap_or_else(|| format!("{} {url}", request.method)),
                    attachments: vec![
                        Attachment {
                            name: "Request".into(),
                            body: request.to_string(),
                            kind: AttachmentKind::Json,
                        },
                        Attachment {
                            name: format!("Response -> {} {}", response.status, response.reason),
                            body: response.to_string(),
                            kind: AttachmentKind::Json,
                        },
                    ],
                }
            }
            Self::Sql { query, comment, .. } => Step {
                title: comment.clone().unwrap_or_else(|| query.clone()),
                attachments: vec![Attachment {
                    name: "SQL Query".into(),
                    body: self.sql_html(),
                    kind: AttachmentKind::Html,
                }],
            },
        }
    }

    /// Persisted form of this item.
    #[must_use]
    pub fn to_record(&self, test: &str, index: usize) -> TranscriptRecord {
        let entry = match self {
            Self::Text(text) => RecordEntry::Text { text: text.clone() },
            Self::Http {
                request,
                response,
                comment,
            } => RecordEntry::Http {
                comment: comment.clone(),
                request: request_snapshot(request),
                response: response_snapshot(response),
            },
            Self::Sql {
                query,
                rows,
                comment,
            } => RecordEntry::Sql {
                comment: comment.clone(),
                query: query.clone(),
                rows: rows.iter().map(ExtDict::to_json).collect(),
            },
        };
        TranscriptRecord {
            test: test.to_string(),
            index,
            recorded_at: Utc::now(),
            entry,
        }
    }

    fn sql_html(&self) -> String {
        let Self::Sql {
            query,
            rows,
            comment,
        } = self
        else {
            return String::new();
        };
        let mut header = String::new();
        let mut body = String::new();
        if let Some(first) = rows.first() {
            for key in first.keys() {
                let _ = write!(header, "<th>{}</th>", escape(key));
            }
            for row in rows {
                body.push_str("<tr>");
                for value in row.values() {
                    let _ = write!(body, "<td>{}</td>", escape(&value.scalar_text()));
                }
                body.push_str("</tr>");
            }
        }
        format!(
            "<div class=\"extra_block\">\n<p>{}</p>\n<pre>{}</pre>\n<table>\n<tr>{header}</tr>\n<tbody>{body}</tbody>\n</table>\n</div>",
            escape(comment.as_deref().unwrap_or_default()),
            escape(query)
        )
    }
}

fn request_snapshot(request: &Request) -> RequestSnapshot {
    let url = request
        .full_url()
        .map_or_else(|_| format!("{}{}", request.host, request.path), |u| u.to_string());
    let mut headers: indexmap::IndexMap<String, String> = request.header_pairs().into_iter().collect();
    if let Some(cookie) = request.cookie_header() {
        headers.insert("Cookie".into(), cookie);
    }
    RequestSnapshot {
        method: request.method.to_string(),
        url,
        headers,
        body: request.formatted_body(),
    }
}

fn response_snapshot(response: &Response) -> ResponseSnapshot {
    ResponseSnapshot {
        status: response.status,
        reason: response.reason.clone(),
        headers: response.headers.clone(),
        body: String::from_utf8_lossy(response.raw()).into_owned(),
        decode_fallback: match &response.outcome {
            BodyOutcome::Parsed => None,
            BodyOutcome::FellBackToText { reason } => Some(reason.clone()),
        },
    }
}

/// Minimal HTML escaping for text and attribute content.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Shared, clonable transcript buffer. Clones append to the same items.
#[derive(Debug, Clone)]
pub struct Transcript {
    items: Arc<Mutex<Vec<LogItem>>>,
    log_http: bool,
    log_sql: bool,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new(true, true)
    }
}

impl Transcript {
    #[must_use]
    pub fn new(log_http: bool, log_sql: bool) -> Self {
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
            log_http,
            log_sql,
        }
    }

    /// Toggles taken from `log_requests` / `log_sql`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.log_requests, config.log_sql)
    }

    #[must_use]
    pub fn log_http(&self) -> bool {
        self.log_http
    }

    #[must_use]
    pub fn log_sql(&self) -> bool {
        self.log_sql
    }

    pub fn append_text(&self, text: impl Into<String>) {
        self.items.lock().push(LogItem::Text(text.into()));
    }

    /// Record an exchange. Ignored when HTTP logging is off.
    pub fn append_http(&self, request: &Request, response: &Response, comment: Option<&str>) {
        if !self.log_http {
            return;
        }
        self.items.lock().push(LogItem::Http {
            request: request.clone(),
            response: response.clone(),
            comment: comment.map(str::to_string),
        });
    }

    /// Record a query and its rows. Ignored when SQL logging is off.
    pub fn append_sql(&self, query: &str, rows: &[ExtDict], comment: Option<&str>) {
        if !self.log_sql {
            return;
        }
        self.items.lock().push(LogItem::Sql {
            query: query.to_string(),
            rows: rows.to_vec(),
            comment: comment.map(str::to_string),
        });
    }

    /// Snapshot of the current items.
    #[must_use]
    pub fn items(&self) -> Vec<LogItem> {
        self.items.lock().clone()
    }

    /// Take every item, leaving the buffer empty for the next test.
    #[must_use]
    pub fn drain(&self) -> Vec<LogItem> {
        std::mem::take(&mut *self.items.lock())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Drain into a sink as steps; returns how many were delivered.
    pub fn flush_into(&self, sink: &mut dyn AttachmentSink) -> usize {
        let items = self.drain();
        let count = items.len();
        for item in &items {
            sink.attach(item.to_step());
        }
        count
    }

    /// Drain as persisted records of `test`.
    #[must_use]
    pub fn drain_records(&self, test: &str) -> Vec<TranscriptRecord> {
        self.drain()
            .iter()
            .enumerate()
            .map(|(index, item)| item.to_record(test, index))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Method, ResponseParts};
    use serde_json::json;

    fn exchange() -> (Request, Response) {
        let request = Request::build(Method::Get, "https://api.example.com", "/users")
            .with_headers(ExtDict::try_from(json!({"Accept": "application/json"})).unwrap())
            .with_cookies(ExtDict::try_from(json!({"session": "abc"})).unwrap());
        let response = Response::from_parts(ResponseParts {
            status: 200,
            reason: "OK".into(),
            url: "https://api.example.com/users".into(),
            headers: vec![("Content-Type".into(), "application/json".into())],
            cookies: vec![],
            raw: br#"{"items": []}"#.to_vec(),
        });
        (request, response)
    }

    #[test]
    fn clones_share_the_buffer() {
        let transcript = Transcript::default();
        let handle = transcript.clone();
        handle.append_text("step one");
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.drain(), vec![LogItem::Text("step one".into())]);
        assert!(handle.is_empty());
    }

    #[test]
    fn toggles_suppress_items() {
        let (request, response) = exchange();
        let transcript = Transcript::new(false, false);
        transcript.append_http(&request, &response, None);
        transcript.append_sql("select 1", &[], None);
        assert!(transcript.is_empty());
        transcript.append_text("always kept");
        assert_eq!(transcript.len(), 1);
    }

    #[test]
    fn http_step_uses_method_and_url() {
        let (request, response) = exchange();
        let transcript = Transcript::default();
        transcript.append_http(&request, &response, None);
        let mut steps: Vec<Step> = Vec::new();
        assert_eq!(transcript.flush_into(&mut steps), 1);
        assert_eq!(steps[0].title, "GET https://api.example.com/users");
        assert_eq!(steps[0].attachments[1].name, "Response -> 200 OK");
        assert!(transcript.is_empty());
    }

    #[test]
    fn sql_html_renders_a_table() {
        let rows = vec![
            ExtDict::try_from(json!({"id": 1, "name": "a<b"})).unwrap(),
            ExtDict::try_from(json!({"id": 2, "name": null})).unwrap(),
        ];
        let item = LogItem::Sql {
            query: "select id, name from users".into(),
            rows,
            comment: Some("users".into()),
        };
        insta::assert_snapshot!(item.to_html(), @r#"
        <div class="extra_block">
        <p>users</p>
        <pre>select id, name from users</pre>
        <table>
        <tr><th>id</th><th>name</th></tr>
        <tbody><tr><td>1</td><td>a&lt;b</td></tr><tr><td>2</td><td></td></tr></tbody>
        </table>
        </div>
        "#);
        assert_eq!(item.to_step().attachments[0].kind, AttachmentKind::Html);
    }

    #[test]
    fn records_capture_the_wire_view() {
        let (request, response) = exchange();
        let transcript = Transcript::default();
        transcript.append_text("start");
        transcript.append_http(&request, &response, Some("list users"));
        let records = transcript.drain_records("users::list");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].index, 1);
        match &records[1].entry {
            RecordEntry::Http { request, response, comment } => {
                assert_eq!(comment.as_deref(), Some("list users"));
                assert_eq!(request.url, "https://api.example.com/users");
                assert_eq!(request.headers["Cookie"], "session=abc");
                assert_eq!(response.body, r#"{"items": []}"#);
                assert_eq!(response.decode_fallback, None);
            }
            other => panic!("unexpected entry {other:?}"),
        }
    }
}
