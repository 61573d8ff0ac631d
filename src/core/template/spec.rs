//! Import specification (`.oimp` / `.ximp`) model and parser.

use super::xml::{self, attr, children, descendant_text, descendants, first_descendant};
use crate::domain::model::Row;
use crate::utils::error::Result;
use regex::Regex;
use roxmltree::Node;
use std::collections::HashMap;
use std::path::Path;

/// `[Column]` references inside a column expression.
const COLUMN_REFERENCE: &str = r"\[([^\]]+)\]";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Column(String),
}

/// A parsed column expression such as `[First] [Last]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expression {
    source: String,
    segments: Vec<Segment>,
}

impl Expression {
    pub fn parse(source: &str, pattern: &Regex) -> Self {
        let mut segments = Vec::new();
        let mut last = 0;
        for caps in pattern.captures_iter(source) {
            let (Some(whole), Some(column)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > last {
                segments.push(Segment::Literal(source[last..whole.start()].to_string()));
            }
            segments.push(Segment::Column(column.as_str().to_string()));
            last = whole.end();
        }
        if last < source.len() {
            segments.push(Segment::Literal(source[last..].to_string()));
        }
        Self {
            source: source.to_string(),
            segments,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Column names referenced by the expression, in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Column(c) => Some(c.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Substitutes cell values (missing columns read as empty) and trims.
    pub fn evaluate(&self, row: &Row) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Column(column) => out.push_str(row.get(column)),
            }
        }
        out.trim().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlankHandling {
    Import,
    DoNotImportIfBlank,
}

#[derive(Debug, Clone)]
pub struct PropertyMap {
    pub property_id: String,
    pub property_name: String,
    pub expression: Expression,
    pub blank_handling: BlankHandling,
}

impl PropertyMap {
    /// Name used in output properties.
    pub fn output_name(&self) -> &str {
        if self.property_name.is_empty() {
            &self.property_id
        } else {
            &self.property_name
        }
    }
}

#[derive(Debug, Clone)]
pub struct EntityTemplate {
    pub entity_id: String,
    pub type_id: String,
    pub type_name: String,
    pub identity_expression: Expression,
    pub properties: Vec<PropertyMap>,
}

#[derive(Debug, Clone)]
pub struct LinkTemplate {
    pub link_id: String,
    pub from_entity_id: String,
    pub to_entity_id: String,
    pub type_id: String,
    pub type_name: String,
    pub properties: Vec<PropertyMap>,
}

#[derive(Debug, Clone)]
pub struct UserColumn {
    pub column_id: String,
    pub expression: Expression,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    RemoveCharacters { characters: String },
    /// Inclusive character indices; `to` defaults to the last character.
    ExtractText { from: usize, to: Option<usize> },
    ValuePrefix { text: String },
    ValueSuffix { text: String },
    ColumnSuffix { column: String, separator: String },
    /// Unrecognised action, values pass through.
    Unknown(String),
}

#[derive(Debug, Clone)]
pub struct ColumnAction {
    pub column_id: String,
    pub order: i64,
    pub kind: ActionKind,
}

#[derive(Debug, Clone)]
pub struct DateFormatSpec {
    pub column: String,
    pub format: String,
}

#[derive(Debug, Clone)]
pub struct IdentityRule {
    pub type_id: String,
    pub criteria_property_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ImportTemplate {
    pub file_name: String,
    pub source_type: String,
    pub row_header_index: i64,
    pub exclude_ranges: Vec<(i64, i64)>,
    pub ignore_rows_starting_with: String,
    pub delimiter: u8,
    pub user_columns: Vec<UserColumn>,
    /// Sorted by column, then order.
    pub column_actions: Vec<ColumnAction>,
    pub date_formats: Vec<DateFormatSpec>,
    pub entities: Vec<EntityTemplate>,
    pub links: Vec<LinkTemplate>,
    pub identity_rules: HashMap<String, IdentityRule>,
}

impl ImportTemplate {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = xml::read_xml_file(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_xml_str(&text, &file_name)
    }

    pub fn from_xml_str(text: &str, file_name: &str) -> Result<Self> {
        let doc = xml::parse_document(text)?;
        let root = doc.root_element();
        let pattern = Regex::new(COLUMN_REFERENCE)?;

        let source_type = first_descendant(root, "Data")
            .and_then(|n| n.attribute("Source"))
            .unwrap_or("File")
            .to_string();

        let row_header_index = first_descendant(root, "RowContainingColumnIdentifiers")
            .and_then(|n| n.attribute("RowIndex"))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(1);

        let ignore_rows_starting_with = first_descendant(root, "RowDefinitions")
            .map(|n| attr(n, "IgnoreRowsStartingWith"))
            .unwrap_or_default();

        let exclude_ranges = descendants(root, "ExcludeRows")
            .filter_map(|n| parse_range(n.attribute("Range").unwrap_or("")))
            .collect();

        let delimiter = first_descendant(root, "DelimitedColumns")
            .and_then(|n| n.attribute("Delimiters"))
            .map(parse_delimiter)
            .unwrap_or(b',');

        let user_columns = descendants(root, "UserColumn")
            .map(|uc| UserColumn {
                column_id: attr(uc, "ColumnId"),
                expression: Expression::parse(&descendant_text(uc, "ColumnExpression"), &pattern),
            })
            .collect();

        let mut column_actions: Vec<ColumnAction> = descendants(root, "Column")
            .flat_map(|col| {
                let column_id = attr(col, "ColumnId");
                first_descendant(col, "Actions")
                    .into_iter()
                    .flat_map(|actions| actions.children().filter(|n| n.is_element()))
                    .map(move |action| parse_action(column_id.clone(), action))
            })
            .collect();
        column_actions.sort_by(|a, b| a.column_id.cmp(&b.column_id).then(a.order.cmp(&b.order)));

        let date_formats = descendants(root, "DateTimeFormat")
            .map(|n| DateFormatSpec {
                column: attr(n, "ColumnId"),
                format: attr(n, "Format"),
            })
            .collect();

        let entities = descendants(root, "Entity")
            .map(|e| {
                let (type_id, type_name) = item_type(e, "Unknown");
                let identity_expression = first_descendant(e, "Identity")
                    .and_then(|id| children(id, "ColumnExpression").next())
                    .and_then(|n| n.text())
                    .unwrap_or("");
                EntityTemplate {
                    entity_id: attr(e, "EntityId"),
                    type_id,
                    type_name,
                    identity_expression: Expression::parse(identity_expression, &pattern),
                    properties: property_maps(e, &pattern),
                }
            })
            .collect();

        let links = descendants(root, "Link")
            .map(|l| {
                let (type_id, type_name) = item_type(l, "Link");
                LinkTemplate {
                    link_id: attr(l, "LinkId"),
                    from_entity_id: attr(l, "FromEntityId"),
                    to_entity_id: attr(l, "ToEntityId"),
                    type_id,
                    type_name,
                    properties: property_maps(l, &pattern),
                }
            })
            .collect();

        let identity_rules = descendants(root, "ItemTypeIdentity")
            .filter_map(|n| {
                let type_id = attr(n, "TypeId");
                if type_id.is_empty() {
                    return None;
                }
                let criteria_property_ids = descendants(n, "Property")
                    .map(|p| attr(p, "TypeId"))
                    .filter(|id| !id.is_empty())
                    .collect();
                Some((
                    type_id.clone(),
                    IdentityRule {
                        type_id,
                        criteria_property_ids,
                    },
                ))
            })
            .collect();

        Ok(Self {
            file_name: file_name.to_string(),
            source_type,
            row_header_index,
            exclude_ranges,
            ignore_rows_starting_with,
            delimiter,
            user_columns,
            column_actions,
            date_formats,
            entities,
            links,
            identity_rules,
        })
    }
}

fn parse_range(raw: &str) -> Option<(i64, i64)> {
    let (a, b) = raw.trim().split_once('-')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

fn parse_delimiter(raw: &str) -> u8 {
    if raw == "&#x9;" || raw == "\\t" {
        return b'\t';
    }
    match raw.chars().next() {
        Some(c) if c.is_ascii() => c as u8,
        _ => b',',
    }
}

/// `(type_id, type_name)` from `ItemType`, falling back to `Type/Text`.
fn item_type(node: Node, default_name: &str) -> (String, String) {
    let item = first_descendant(node, "ItemType");
    let type_id = item.map(|n| attr(n, "Identifier")).unwrap_or_default();
    let display = item.map(|n| attr(n, "DisplayName")).unwrap_or_default();
    if !display.is_empty() {
        return (type_id, display);
    }

    let fallback = first_descendant(node, "Type")
        .and_then(|t| children(t, "Text").next())
        .map(|t| {
            t.attribute("Value")
                .filter(|v| !v.is_empty())
                .or(t.text())
                .unwrap_or("")
                .to_string()
        })
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default_name.to_string());
    (type_id, fallback)
}

fn property_maps(node: Node, pattern: &Regex) -> Vec<PropertyMap> {
    descendants(node, "DatabaseProperty")
        .map(|p| {
            let expr = first_descendant(p, "ColumnExpression");
            let blank_handling = match expr.and_then(|e| e.attribute("BlankHandling")) {
                Some("DoNotImportIfBlank") => BlankHandling::DoNotImportIfBlank,
                _ => BlankHandling::Import,
            };
            PropertyMap {
                property_id: attr(p, "Identifier"),
                property_name: attr(p, "DisplayName"),
                expression: Expression::parse(&xml::text(expr), pattern),
                blank_handling,
            }
        })
        .collect()
}

fn parse_action(column_id: String, action: Node) -> ColumnAction {
    let name = action.tag_name().name();
    let order = action
        .attribute("Order")
        .and_then(|o| o.trim().parse().ok())
        .unwrap_or(9999);

    let kind = match name {
        "RemoveCharacters" => ActionKind::RemoveCharacters {
            characters: attr(action, "Characters"),
        },
        "ExtractText" => {
            let index = |child: &str| {
                children(action, child)
                    .next()
                    .and_then(|n| n.attribute("Index"))
                    .map(|v| v.trim().parse::<usize>())
            };
            match (index("From"), index("To")) {
                (Some(Err(_)), _) | (_, Some(Err(_))) => {
                    tracing::warn!("ExtractText on column {} has a bad index, values pass through", column_id);
                    ActionKind::Unknown(name.to_string())
                }
                (from, to) => ActionKind::ExtractText {
                    from: from.and_then(|r| r.ok()).unwrap_or(0),
                    to: to.and_then(|r| r.ok()),
                },
            }
        }
        "ValuePrefix" => ActionKind::ValuePrefix {
            text: attr(action, "Text"),
        },
        "ValueSuffix" => ActionKind::ValueSuffix {
            text: attr(action, "Text"),
        },
        "ColumnSuffix" => ActionKind::ColumnSuffix {
            column: attr(action, "ColumnId"),
            separator: attr(action, "SeparateWith"),
        },
        other => ActionKind::Unknown(other.to_string()),
    };

    ColumnAction {
        column_id,
        order,
        kind,
    }
}
