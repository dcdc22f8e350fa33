use std::fmt;

use serde::Serialize;

/// Content classification derived from a `Content-Type` header.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaType {
    Json,
    FormUrlEncoded,
    FormData,
    Xml,
    TextXml,
    Html,
    Text,
    Other(String),
}

impl MediaType {
    /// The media type part of a header value: text before `;`, trimmed and
    /// lower-cased.
    #[must_use]
    pub fn parse_content_type(header_value: &str) -> String {
        header_value
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }

    /// Classify a header value. `None` when the header is empty.
    #[must_use]
    pub fn classify(header_value: &str) -> Option<Self> {
        let essence = Self::parse_content_type(header_value);
        let media = match essence.as_str() {
            "" => return None,
            "application/json" => Self::Json,
            "application/x-www-form-urlencoded" => Self::FormUrlEncoded,
            "multipart/form-data" => Self::FormData,
            "application/xml" => Self::Xml,
            "text/xml" => Self::TextXml,
            "text/html" => Self::Html,
            "text/plain" => Self::Text,
            _ => Self::Other(essence),
        };
        Some(media)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Json => "application/json",
            Self::FormUrlEncoded => "application/x-www-form-urlencoded",
            Self::FormData => "multipart/form-data",
            Self::Xml => "application/xml",
            Self::TextXml => "text/xml",
            Self::Html => "text/html",
            Self::Text => "text/plain",
            Self::Other(essence) => essence,
        }
    }

    /// Whether bodies of this type may carry an XML document.
    #[must_use]
    pub fn may_hold_xml(&self) -> bool {
        matches!(self, Self::Xml | Self::TextXml | Self::Html | Self::Text)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pretty JSON with four-space indentation and unescaped non-ASCII text.
#[must_use]
pub fn pretty_json<T: Serialize + ?Sized>(value: &T) -> String {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    match value.serialize(&mut ser) {
        Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
        Err(e) => format!("<unserializable: {e}>"),
    }
}

/// Header block rendering: one `name: value` line per header, preceded by a
/// newline and followed by a final newline.
#[must_use]
pub fn raw_formatted_headers<'a>(headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut out = String::new();
    for (name, value) in headers {
        out.push('\n');
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classification_ignores_parameters_and_case() {
        assert_eq!(
            MediaType::classify("Application/JSON; charset=utf-8"),
            Some(MediaType::Json)
        );
        assert_eq!(
            MediaType::classify("multipart/form-data; boundary=x"),
            Some(MediaType::FormData)
        );
        assert_eq!(MediaType::classify("  "), None);
        assert_eq!(
            MediaType::classify("image/png"),
            Some(MediaType::Other("image/png".into()))
        );
    }

    #[test]
    fn pretty_json_uses_four_spaces() {
        let text = pretty_json(&json!({"a": [1], "b": "ü"}));
        assert_eq!(text, "{\n    \"a\": [\n        1\n    ],\n    \"b\": \"ü\"\n}");
    }

    #[test]
    fn header_block_layout() {
        let block = raw_formatted_headers([("A", "1"), ("B", "2")]);
        assert_eq!(block, "\nA: 1\nB: 2\n");
    }
}
