//! XML documents as nested mappings.
//!
//! Attributes become `@name` keys, mixed text becomes `#text`, repeated
//! child elements collapse into a list and leaf elements become their text.

use roxmltree::{Document, ParsingOptions};

use crate::collections::{ExtDict, Node};

/// Parse a document into `{root_tag: value}`.
///
/// # Errors
///
/// Returns the parser error for malformed documents.
pub fn xml_to_dict(raw: &[u8]) -> Result<ExtDict, roxmltree::Error> {
    let text = String::from_utf8_lossy(raw);
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(&text, options)?;
    let root = doc.root_element();
    let mut dict = ExtDict::new();
    dict.insert(tag_name(root), element(root));
    Ok(dict)
}

fn element(node: roxmltree::Node<'_, '_>) -> Node {
    let mut dict = ExtDict::new();
    for attr in node.attributes() {
        let name = qualified(node, attr.namespace(), attr.name());
        dict.insert(format!("@{name}"), attr.value());
    }

    let mut text = String::new();
    for child in node.children() {
        if child.is_text() {
            text.push_str(child.text().unwrap_or_default());
        } else if child.is_element() {
            let name = tag_name(child);
            let value = element(child);
            match dict.get_mut(&name) {
                Ok(Node::Seq(repeated)) => repeated.push(value),
                Ok(existing) => {
                    let first = std::mem::take(existing);
                    *existing = Node::from(vec![first, value]);
                }
                Err(_) => {
                    dict.insert(name, value);
                }
            }
        }
    }

    let text = text.trim();
    if dict.is_empty() {
        return if text.is_empty() {
            Node::Null
        } else {
            Node::from(text)
        };
    }
    if !text.is_empty() {
        dict.insert("#text", text);
    }
    Node::Map(dict)
}

fn tag_name(node: roxmltree::Node<'_, '_>) -> String {
    let tag = node.tag_name();
    qualified(node, tag.namespace(), tag.name())
}

fn qualified(node: roxmltree::Node<'_, '_>, namespace: Option<&str>, local: &str) -> String {
    match namespace.and_then(|uri| node.lookup_prefix(uri)) {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}:{local}"),
        _ => local.to_string(),
    }
}
