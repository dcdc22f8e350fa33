use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;
use url::form_urlencoded;

use super::message::{MediaType, pretty_json};
use super::{Method, RequestError};
use crate::collections::{ExtDict, Node};

/// Request payload as supplied by a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Body {
    /// Structured data, encoded according to the request media type.
    Data(Node),
    Text(String),
    /// Raw bytes. Under a JSON media type they must hold a JSON literal.
    Bytes(Vec<u8>),
}

impl Body {
    /// JSON view of the payload.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidBytesLiteral`] for byte payloads that
    /// are not a JSON document.
    pub fn to_json(&self) -> Result<Value, RequestError> {
        match self {
            Self::Data(node) => Ok(node.to_json()),
            Self::Text(text) => Ok(Value::String(text.clone())),
            Self::Bytes(bytes) => serde_json::from_slice(bytes)
                .map_err(|e| RequestError::InvalidBytesLiteral(e.to_string())),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Data(node) => node.type_name(),
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl From<Node> for Body {
    fn from(value: Node) -> Self {
        Self::Data(value)
    }
}

impl From<ExtDict> for Body {
    fn from(value: ExtDict) -> Self {
        Self::Data(Node::Map(value))
    }
}

impl From<&str> for Body {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

/// Wire form of a request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedBody {
    Empty,
    Bytes(Vec<u8>),
    /// Text fields for a `multipart/form-data` body. The transport supplies
    /// the boundary and the matching `Content-Type`.
    Multipart(Vec<(String, String)>),
}

/// An outgoing HTTP request, fully described before it is sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: Method,
    pub host: String,
    pub path: String,
    #[serde(default)]
    pub headers: ExtDict,
    #[serde(default)]
    pub cookies: ExtDict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<ExtDict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Body>,
    #[serde(default)]
    pub allow_redirects: bool,
}

impl Request {
    #[must_use]
    pub fn build(method: Method, host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method,
            host: host.into(),
            path: path.into(),
            headers: ExtDict::new(),
            cookies: ExtDict::new(),
            params: None,
            body: None,
            allow_redirects: false,
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: ExtDict) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_cookies(mut self, cookies: ExtDict) -> Self {
        self.cookies = cookies;
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: ExtDict) -> Self {
        self.params = Some(params);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn with_allow_redirects(mut self, allow: bool) -> Self {
        self.allow_redirects = allow;
        self
    }

    /// Base URL joined with the path, RFC 3986 style: an absolute path
    /// replaces the base path, a relative one resolves against it.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidUrl`] if either part does not parse.
    pub fn url(&self) -> Result<Url, RequestError> {
        let invalid = |e: url::ParseError| RequestError::InvalidUrl {
            url: format!("{}{}", self.host, self.path),
            reason: e.to_string(),
        };
        Url::parse(&self.host)
            .and_then(|base| base.join(&self.path))
            .map_err(invalid)
    }

    /// [`Request::url`] with the query parameters appended.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidUrl`] if the URL does not parse.
    pub fn full_url(&self) -> Result<Url, RequestError> {
        let mut url = self.url()?;
        let pairs = self.query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(url)
    }

    /// Query parameters as text pairs. Sequence values expand into one pair
    /// per item (the `ids[]=1&ids[]=2` convention); null values are dropped.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.params.as_ref().map_or_else(Vec::new, expand_pairs)
    }

    /// Percent-encoded query string with its leading `?`, or empty.
    #[must_use]
    pub fn query_string(&self) -> String {
        let pairs = self.query_pairs();
        if pairs.is_empty() {
            return String::new();
        }
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        format!("?{encoded}")
    }

    /// Header lookup ignoring ASCII case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&Node> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn media_type(&self) -> Option<MediaType> {
        self.header("content-type")
            .and_then(|v| MediaType::classify(&v.scalar_text()))
    }

    /// Header values as text. Booleans and numbers are rendered, nulls
    /// are skipped.
    #[must_use]
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.scalar_text()))
            .collect()
    }

    /// `Cookie` header value for the request cookies, if any.
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        let parts: Vec<String> = self
            .cookies
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| format!("{k}={}", v.scalar_text()))
            .collect();
        (!parts.is_empty()).then(|| parts.join("; "))
    }

    /// Encode the body for the wire according to the media type.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::UnsupportedBody`] when the payload kind does
    /// not fit the media type, or [`RequestError::InvalidBytesLiteral`] for
    /// byte payloads under JSON that do not parse.
    pub fn encode_body(&self) -> Result<EncodedBody, RequestError> {
        let media = self.media_type();
        let unsupported = |body: &Body| RequestError::UnsupportedBody {
            media: media.as_ref().map_or("none", MediaType::as_str).to_string(),
            found: body.kind(),
        };
        let encoded = match (&media, &self.body) {
            (Some(MediaType::FormUrlEncoded), None) => {
                let query = self.query_string();
                bytes_or_empty(query.trim_start_matches('?').as_bytes().to_vec())
            }
            (Some(MediaType::FormUrlEncoded), Some(body)) => match body {
                Body::Data(Node::Map(fields)) => {
                    let encoded = form_urlencoded::Serializer::new(String::new())
                        .extend_pairs(expand_pairs(fields))
                        .finish();
                    bytes_or_empty(encoded.into_bytes())
                }
                Body::Text(text) => bytes_or_empty(text.clone().into_bytes()),
                Body::Bytes(bytes) => bytes_or_empty(bytes.clone()),
                other => return Err(unsupported(other)),
            },
            (Some(MediaType::FormData), None) => EncodedBody::Multipart(Vec::new()),
            (Some(MediaType::FormData), Some(body)) => match body {
                Body::Data(Node::Map(fields)) => EncodedBody::Multipart(expand_pairs(fields)),
                other => return Err(unsupported(other)),
            },
            (Some(MediaType::Xml), body) => match body {
                None => EncodedBody::Empty,
                Some(Body::Text(text)) => bytes_or_empty(text.clone().into_bytes()),
                Some(Body::Bytes(bytes)) => bytes_or_empty(bytes.clone()),
                Some(other) => return Err(unsupported(other)),
            },
            (Some(MediaType::Text), body) => match body {
                None => EncodedBody::Empty,
                Some(Body::Text(text)) => bytes_or_empty(text.clone().into_bytes()),
                Some(Body::Bytes(bytes)) => bytes_or_empty(bytes.clone()),
                Some(Body::Data(node)) => bytes_or_empty(node.scalar_text().into_bytes()),
            },
            (Some(MediaType::Json), Some(body)) => {
                let value = body.to_json()?;
                let bytes = serde_json::to_vec(&value)
                    .map_err(|e| RequestError::InvalidBytesLiteral(e.to_string()))?;
                EncodedBody::Bytes(bytes)
            }
            (_, None) => EncodedBody::Empty,
            (_, Some(_)) => match self.formatted_body() {
                Some(text) => EncodedBody::Bytes(text.into_bytes()),
                None => EncodedBody::Empty,
            },
        };
        Ok(encoded)
    }

    /// Body as pretty JSON, as shown in logs and the generic encoding.
    #[must_use]
    pub fn formatted_body(&self) -> Option<String> {
        let body = self.body.as_ref()?;
        Some(match body.to_json() {
            Ok(value) => pretty_json(&value),
            Err(_) => match body {
                Body::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                _ => String::new(),
            },
        })
    }

    /// Query string with values left unescaped, for display.
    fn display_query(&self) -> String {
        let pairs = self.query_pairs();
        if pairs.is_empty() {
            return String::new();
        }
        let joined: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("?{}", joined.join("&"))
    }
}

fn bytes_or_empty(bytes: Vec<u8>) -> EncodedBody {
    if bytes.is_empty() {
        EncodedBody::Empty
    } else {
        EncodedBody::Bytes(bytes)
    }
}

fn expand_pairs(params: &ExtDict) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in params {
        match value {
            Node::Null => {}
            Node::Seq(items) => {
                for item in items.iter().filter(|i| !i.is_null()) {
                    pairs.push((key.clone(), item.scalar_text()));
                }
            }
            other => pairs.push((key.clone(), other.scalar_text())),
        }
    }
    pairs
}

/// Rendered as a `curl` command that reproduces the request.
impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let url = self
            .url()
            .map_or_else(|_| format!("{}{}", self.host, self.path), |u| u.to_string());
        let mut lines = vec![format!(
            "curl -X {} \"{}{}\"",
            self.method,
            url,
            self.display_query()
        )];
        for (name, value) in self.header_pairs() {
            lines.push(format!("-H \"{name}: {value}\""));
        }
        if let Some(cookie) = self.cookie_header() {
            lines.push(format!("-b \"{cookie}\""));
        }
        if let Some(body) = self.formatted_body() {
            lines.push(format!("--data '{body}'"));
        }
        f.write_str(&lines.join(" \\\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ext(value: Value) -> ExtDict {
        ExtDict::try_from(value).unwrap()
    }

    fn json_request(body: Value) -> Request {
        Request::build(Method::Post, "https://api.example.com", "/v1/users")
            .with_headers(ext(json!({"Content-Type": "application/json"})))
            .with_body(Node::try_from(body).unwrap())
    }

    // ── url ──

    #[test]
    fn url_joins_base_and_path() {
        let r = Request::build(Method::Get, "https://h.example/api/", "users/1");
        assert_eq!(r.url().unwrap().as_str(), "https://h.example/api/users/1");
        let r = Request::build(Method::Get, "https://h.example/api/", "/users/1");
        assert_eq!(r.url().unwrap().as_str(), "https://h.example/users/1");
    }

    #[test]
    fn invalid_base_is_reported() {
        let r = Request::build(Method::Get, "not a url", "/x");
        assert!(matches!(r.url(), Err(RequestError::InvalidUrl { .. })));
    }

    #[test]
    fn query_string_expands_sequences() {
        let r = Request::build(Method::Get, "https://h", "/s")
            .with_params(ext(json!({"ids[]": [1, 2], "q": "a b", "skip": null})));
        assert_eq!(r.query_string(), "?ids%5B%5D=1&ids%5B%5D=2&q=a+b");
        assert_eq!(
            r.full_url().unwrap().as_str(),
            "https://h/s?ids%5B%5D=1&ids%5B%5D=2&q=a+b"
        );
    }

    #[test]
    fn empty_params_give_empty_query() {
        let r = Request::build(Method::Get, "https://h", "/s").with_params(ExtDict::new());
        assert_eq!(r.query_string(), "");
        assert_eq!(r.full_url().unwrap().as_str(), "https://h/s");
    }

    // ── headers ──

    #[test]
    fn header_values_are_coerced_to_text() {
        let r = Request::build(Method::Get, "https://h", "/")
            .with_headers(ext(json!({"X-Flag": true, "X-Count": 3, "X-Ratio": 0.5, "X-None": null})));
        assert_eq!(
            r.header_pairs(),
            vec![
                ("X-Flag".to_string(), "true".to_string()),
                ("X-Count".to_string(), "3".to_string()),
                ("X-Ratio".to_string(), "0.5".to_string()),
            ]
        );
    }

    #[test]
    fn media_type_lookup_ignores_header_case() {
        let r = Request::build(Method::Get, "https://h", "/")
            .with_headers(ext(json!({"content-TYPE": "text/xml; charset=utf-8"})));
        assert_eq!(r.media_type(), Some(MediaType::TextXml));
    }

    // ── body encoding ──

    #[test]
    fn json_body_is_compact() {
        let encoded = json_request(json!({"name": "Zoë", "tags": ["a"]}))
            .encode_body()
            .unwrap();
        assert_eq!(
            encoded,
            EncodedBody::Bytes(r#"{"name":"Zoë","tags":["a"]}"#.as_bytes().to_vec())
        );
    }

    #[test]
    fn json_bytes_must_be_a_literal() {
        let r = json_request(json!(null)).with_body(b"{\"a\": 1}".to_vec());
        assert_eq!(
            r.encode_body().unwrap(),
            EncodedBody::Bytes(br#"{"a":1}"#.to_vec())
        );
        let bad = json_request(json!(null)).with_body(b"not json".to_vec());
        assert!(matches!(
            bad.encode_body(),
            Err(RequestError::InvalidBytesLiteral(_))
        ));
    }

    #[test]
    fn urlencoded_without_body_uses_params() {
        let r = Request::build(Method::Post, "https://h", "/login")
            .with_headers(ext(json!({"Content-Type": "application/x-www-form-urlencoded"})))
            .with_params(ext(json!({"user": "a", "pass": "b c"})));
        assert_eq!(
            r.encode_body().unwrap(),
            EncodedBody::Bytes(b"user=a&pass=b+c".to_vec())
        );
    }

    #[test]
    fn urlencoded_mapping_body() {
        let r = Request::build(Method::Post, "https://h", "/login")
            .with_headers(ext(json!({"Content-Type": "application/x-www-form-urlencoded"})))
            .with_body(ext(json!({"a": 1, "b": [true, false]})));
        assert_eq!(
            r.encode_body().unwrap(),
            EncodedBody::Bytes(b"a=1&b=true&b=false".to_vec())
        );
    }

    #[test]
    fn multipart_fields_from_mapping() {
        let r = Request::build(Method::Post, "https://h", "/upload")
            .with_headers(ext(json!({"Content-Type": "multipart/form-data"})))
            .with_body(ext(json!({"name": "doc", "size": 10})));
        assert_eq!(
            r.encode_body().unwrap(),
            EncodedBody::Multipart(vec![
                ("name".into(), "doc".into()),
                ("size".into(), "10".into())
            ])
        );
        let text = r.clone().with_body("raw");
        assert!(matches!(
            text.encode_body(),
            Err(RequestError::UnsupportedBody { found: "text", .. })
        ));
    }

    #[test]
    fn xml_and_text_pass_through() {
        let xml = Request::build(Method::Post, "https://h", "/x")
            .with_headers(ext(json!({"Content-Type": "application/xml"})))
            .with_body("<a/>");
        assert_eq!(xml.encode_body().unwrap(), EncodedBody::Bytes(b"<a/>".to_vec()));
        let text = Request::build(Method::Post, "https://h", "/x")
            .with_headers(ext(json!({"Content-Type": "text/plain"})));
        assert_eq!(text.encode_body().unwrap(), EncodedBody::Empty);
    }

    #[test]
    fn unknown_media_falls_back_to_pretty_json() {
        let r = Request::build(Method::Put, "https://h", "/x").with_body(ext(json!({"a": 1})));
        assert_eq!(
            r.encode_body().unwrap(),
            EncodedBody::Bytes(b"{\n    \"a\": 1\n}".to_vec())
        );
        let empty = Request::build(Method::Put, "https://h", "/x");
        assert_eq!(empty.encode_body().unwrap(), EncodedBody::Empty);
    }

    #[test]
    fn datetime_values_encode_as_iso_text() {
        let at = chrono::NaiveDate::from_ymd_opt(2023, 12, 31)
            .and_then(|d| d.and_hms_opt(23, 59, 1))
            .unwrap();
        let mut body = ExtDict::new();
        body.insert("at", at);
        let r = json_request(json!(null)).with_body(body);
        assert_eq!(
            r.encode_body().unwrap(),
            EncodedBody::Bytes(br#"{"at":"2023-12-31T23:59:01"}"#.to_vec())
        );
    }

    // ── rendering ──

    #[test]
    fn renders_as_curl() {
        let r = json_request(json!({"name": "a"}))
            .with_params(ext(json!({"q": "x y"})))
            .with_cookies(ext(json!({"session": "s1"})));
        insta::assert_snapshot!(r.to_string(), @r#"
        curl -X POST "https://api.example.com/v1/users?q=x y" \
        -H "Content-Type: application/json" \
        -b "session=s1" \
        --data '{
            "name": "a"
        }'
        "#);
    }

    #[test]
    fn curl_without_body_or_headers_is_one_line() {
        let r = Request::build(Method::Delete, "https://h", "/items/1");
        assert_eq!(r.to_string(), "curl -X DELETE \"https://h/items/1\"");
    }
}
