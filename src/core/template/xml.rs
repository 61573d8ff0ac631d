//! Shared XML plumbing for import specifications, match rules and schema files.
//!
//! Elements are matched by local name so namespaced and plain documents read
//! the same way.

use crate::utils::error::Result;
use roxmltree::{Document, Node, ParsingOptions};
use std::path::Path;

/// Decodes raw XML bytes. Import specifications are commonly UTF-16.
///
/// Order: BOM (UTF-16 LE/BE, UTF-8), BOM-less UTF-16 detected from the first
/// `<`, strict UTF-8, then a byte-per-char Latin-1 reading.
pub fn decode_xml_bytes(raw: &[u8]) -> String {
    match raw {
        [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
        [b'<', 0, ..] => decode_utf16(raw, u16::from_le_bytes),
        [0, b'<', ..] => decode_utf16(raw, u16::from_be_bytes),
        _ => match std::str::from_utf8(raw) {
            Ok(text) => text.to_string(),
            Err(_) => raw.iter().map(|&b| b as char).collect(),
        },
    }
}

fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> String {
    let units = bytes.chunks_exact(2).map(|pair| to_unit([pair[0], pair[1]]));
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

pub fn read_xml_file(path: &Path) -> Result<String> {
    let raw = std::fs::read(path)?;
    Ok(decode_xml_bytes(&raw))
}

pub fn parse_document(text: &str) -> Result<Document<'_>> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Ok(Document::parse_with_options(text, options)?)
}

pub fn is_named(node: &Node, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name
}

/// Descendant elements (excluding `node` itself) with the given local name.
pub fn descendants<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.descendants()
        .skip(1)
        .filter(move |n| is_named(n, name))
}

pub fn first_descendant<'a, 'input: 'a>(node: Node<'a, 'input>, name: &'a str) -> Option<Node<'a, 'input>> {
    descendants(node, name).next()
}

pub fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(move |n| is_named(n, name))
}

pub fn attr(node: Node, name: &str) -> String {
    node.attribute(name).unwrap_or("").to_string()
}

/// Element text, or `""` when absent.
pub fn text(node: Option<Node>) -> String {
    node.and_then(|n| n.text()).unwrap_or("").to_string()
}

/// Text of the first descendant with the given local name.
pub fn descendant_text(node: Node, name: &str) -> String {
    text(first_descendant(node, name))
}
