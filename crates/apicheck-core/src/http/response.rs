use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;

use super::message::{MediaType, pretty_json, raw_formatted_headers};
use super::xml::xml_to_dict;
use crate::collections::{DictError, ExtDict, Node};
use crate::convert::RecursiveConverter;
use crate::status::{StatusChecker, StatusError};

/// What a transport hands over after reading a response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseParts {
    pub status: u16,
    pub reason: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    pub raw: Vec<u8>,
}

/// Decoded response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// JSON document; mappings and arrays are containers.
    Json(Node),
    /// XML document as `{root: ...}`.
    Xml(ExtDict),
    Text(String),
}

impl ResponseBody {
    /// The top-level mapping, for JSON objects and XML documents.
    #[must_use]
    pub fn as_dict(&self) -> Option<&ExtDict> {
        match self {
            Self::Json(node) => node.as_dict(),
            Self::Xml(dict) => Some(dict),
            Self::Text(_) => None,
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&Node> {
        match self {
            Self::Json(node) => Some(node),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Json(node) => node.is_truthy(),
            Self::Xml(dict) => !dict.is_empty(),
            Self::Text(text) => !text.is_empty(),
        }
    }

    /// JSON view used for schema validation. Text becomes a JSON string.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Json(node) => node.to_json(),
            Self::Xml(dict) => dict.to_json(),
            Self::Text(text) => Value::String(text.clone()),
        }
    }
}

/// Whether the body decoded as its content type promised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyOutcome {
    Parsed,
    FellBackToText { reason: String },
}

/// A received HTTP response with its decoded body.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub reason: String,
    pub url: String,
    /// Header names keep their first-seen case; repeated headers are joined
    /// with `", "`.
    pub headers: IndexMap<String, String>,
    pub cookies: IndexMap<String, String>,
    pub body: ResponseBody,
    pub outcome: BodyOutcome,
    raw: Vec<u8>,
}

impl Response {
    /// Decode a response. JSON content types are parsed as JSON; XML, HTML
    /// and plain-text bodies that open with an XML declaration are parsed as
    /// XML; everything else is text. A body that fails to parse is kept as
    /// text and the reason is recorded in [`Response::outcome`].
    #[must_use]
    pub fn from_parts(parts: ResponseParts) -> Self {
        let mut headers: IndexMap<String, String> = IndexMap::new();
        for (name, value) in parts.headers {
            let existing = headers
                .iter_mut()
                .find(|(k, _)| k.eq_ignore_ascii_case(&name))
                .map(|(_, v)| v);
            match existing {
                Some(joined) => {
                    joined.push_str(", ");
                    joined.push_str(&value);
                }
                None => {
                    headers.insert(name, value);
                }
            }
        }

        let media = header_lookup(&headers, "content-type")
            .and_then(MediaType::classify)
            .unwrap_or(MediaType::Text);
        let (body, outcome) = decode_body(&media, &parts.raw);
        if let BodyOutcome::FellBackToText { reason } = &outcome {
            tracing::warn!(status = parts.status, media = %media, %reason, "response body kept as text");
        }

        Self {
            status: parts.status,
            reason: parts.reason,
            url: parts.url,
            headers,
            cookies: parts.cookies.into_iter().collect(),
            body,
            outcome,
            raw: parts.raw,
        }
    }

    /// Header lookup ignoring ASCII case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_lookup(&self.headers, name)
    }

    #[must_use]
    pub fn media_type(&self) -> Option<MediaType> {
        self.header("content-type").and_then(MediaType::classify)
    }

    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Dotted path into a mapping body, e.g. `data.items.0.id`.
    ///
    /// # Errors
    ///
    /// Returns [`DictError::AttributeNotFound`] when the body is not a
    /// mapping, or the path error from [`ExtDict::path`].
    pub fn path(&self, dotted: &str) -> Result<&Node, DictError> {
        self.body
            .as_dict()
            .ok_or_else(|| DictError::AttributeNotFound {
                container: "Response body",
                name: dotted.to_string(),
            })?
            .path(dotted)
    }

    /// Checker for named statuses: `response.status_is().ok()?`.
    #[must_use]
    pub fn status_is(&self) -> StatusChecker<'_> {
        StatusChecker::new(self.status, self)
    }

    /// Expect a status by code.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::UnknownCode`] for codes without a standard
    /// name, or [`StatusError::Mismatch`] with the response dump.
    pub fn status_eq(&self, code: u16) -> Result<(), StatusError> {
        self.status_is().code(code)
    }

    /// Header block as shown in the response dump.
    #[must_use]
    pub fn formatted_headers(&self) -> String {
        raw_formatted_headers(self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    fn formatted_body(&self) -> String {
        match &self.body {
            ResponseBody::Json(node) => pretty_json(node),
            ResponseBody::Xml(dict) => pretty_json(dict),
            ResponseBody::Text(text) => text.clone(),
        }
    }
}

fn header_lookup<'a>(headers: &'a IndexMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn decode_body(media: &MediaType, raw: &[u8]) -> (ResponseBody, BodyOutcome) {
    let text = || String::from_utf8_lossy(raw).into_owned();
    let fallback = |reason: String| {
        (
            ResponseBody::Text(text()),
            BodyOutcome::FellBackToText { reason },
        )
    };
    if *media == MediaType::Json {
        return match serde_json::from_slice::<Value>(raw) {
            Ok(value) => match RecursiveConverter::default().convert(&value) {
                Ok(node) => (ResponseBody::Json(node), BodyOutcome::Parsed),
                Err(e) => fallback(e.to_string()),
            },
            Err(e) => fallback(e.to_string()),
        };
    }
    if media.may_hold_xml() && raw.starts_with(b"<?xml") {
        return match xml_to_dict(raw) {
            Ok(dict) => (ResponseBody::Xml(dict), BodyOutcome::Parsed),
            Err(e) => fallback(e.to_string()),
        };
    }
    (ResponseBody::Text(text()), BodyOutcome::Parsed)
}

/// Multi-line dump used in assertion messages and logs.
impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\n---------------------------------------\nResponse:\nHTTP status: {} {}\n{}\n{}",
            self.status,
            self.reason,
            self.formatted_headers(),
            self.formatted_body()
        )
    }
}
