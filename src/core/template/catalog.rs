//! Flat catalogs of the information-store schema and summaries of the
//! import specifications, formatting specifications and match rules.

use super::xml::{self, attr, children, descendants, first_descendant};
use crate::utils::error::Result;
use regex::Regex;
use roxmltree::Node;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const SPECS_DIR: &str = "Import Specifications";
pub const SCHEMA_FILE: [&str; 3] = ["Offline Cache", "Schema", "InformationStore.dat"];
pub const MATCH_RULE_FILES: [&str; 2] = ["cached-system-match-rules.xml", "cached-fmr-match-rules.xml"];
pub const FORMATTING_DIRS: [&str; 2] = [
    "Conditional Formatting",
    "Conditional Formatting Specifications",
];

pub fn schema_path(base_dir: &Path) -> PathBuf {
    SCHEMA_FILE.iter().fold(base_dir.to_path_buf(), |p, part| p.join(part))
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertyTypeEntry {
    pub property_id: String,
    pub property_name: String,
    pub logical_type: String,
    pub mandatory: String,
    pub max_len: String,
    pub semantic_type_id: String,
    pub possible_values: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityTypeEntry {
    pub entity_id: String,
    pub entity_name: String,
    pub icon: String,
    pub properties: Vec<PropertyTypeEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkTypeEntry {
    pub link_id: String,
    pub link_name: String,
    pub properties: Vec<PropertyTypeEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    pub entities: Vec<EntityTypeEntry>,
    pub links: Vec<LinkTypeEntry>,
}

const PROPERTY_CSV_COLUMNS: [&str; 8] = [
    "property_id",
    "property_name",
    "logical_type",
    "mandatory",
    "max_len",
    "semantic_type_id",
    "possible_values_count",
    "possible_values",
];

impl PropertyTypeEntry {
    fn csv_cells(&self) -> [String; 8] {
        [
            self.property_id.clone(),
            self.property_name.clone(),
            self.logical_type.clone(),
            self.mandatory.clone(),
            self.max_len.clone(),
            self.semantic_type_id.clone(),
            self.possible_values.len().to_string(),
            self.possible_values.join(" | "),
        ]
    }
}

/// One CSV row per property type, prefixed with the owning item's columns.
fn write_property_csv<'a>(
    path: &Path,
    item_columns: &[&str],
    rows: impl Iterator<Item = (Vec<&'a str>, &'a PropertyTypeEntry)>,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(item_columns.iter().chain(PROPERTY_CSV_COLUMNS.iter()))?;
    for (item, property) in rows {
        let cells = property.csv_cells();
        writer.write_record(item.into_iter().chain(cells.iter().map(String::as_str)))?;
    }
    writer.flush()?;
    Ok(())
}

fn property_types(node: Node) -> Vec<PropertyTypeEntry> {
    descendants(node, "PropertyType")
        .map(|p| PropertyTypeEntry {
            property_id: attr(p, "Id"),
            property_name: attr(p, "DisplayName"),
            logical_type: attr(p, "LogicalType"),
            mandatory: attr(p, "Mandatory"),
            max_len: attr(p, "MaximumLengthChars"),
            semantic_type_id: attr(p, "SemanticTypeId"),
            possible_values: descendants(p, "PossibleValue")
                .map(|v| attr(v, "Value"))
                .collect(),
        })
        .collect()
}

impl SchemaCatalog {
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_xml_str(&xml::read_xml_file(path)?)
    }

    pub fn from_xml_str(text: &str) -> Result<Self> {
        let doc = xml::parse_document(text)?;
        let root = doc.root_element();

        let entities = descendants(root, "EntityType")
            .map(|e| EntityTypeEntry {
                entity_id: attr(e, "Id"),
                entity_name: attr(e, "DisplayName"),
                icon: attr(e, "Icon"),
                properties: property_types(e),
            })
            .collect();
        let links = descendants(root, "LinkType")
            .map(|l| LinkTypeEntry {
                link_id: attr(l, "Id"),
                link_name: attr(l, "DisplayName"),
                properties: property_types(l),
            })
            .collect();

        Ok(Self { entities, links })
    }

    pub fn entity_property_count(&self) -> usize {
        self.entities.iter().map(|e| e.properties.len()).sum()
    }

    pub fn link_property_count(&self) -> usize {
        self.links.iter().map(|l| l.properties.len()).sum()
    }

    /// Writes the JSON and CSV catalogs, returning the written paths.
    pub fn write(&self, out_dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(out_dir)?;

        let entities_json = out_dir.join("entity_catalog.json");
        let links_json = out_dir.join("link_catalog.json");
        let entities_csv = out_dir.join("entity_catalog.csv");
        let links_csv = out_dir.join("link_catalog.csv");

        fs::write(&entities_json, serde_json::to_vec_pretty(&self.entities)?)?;
        fs::write(&links_json, serde_json::to_vec_pretty(&self.links)?)?;

        write_property_csv(
            &entities_csv,
            &["entity_id", "entity_name", "icon"],
            self.entities.iter().flat_map(|e| {
                e.properties.iter().map(move |p| {
                    (vec![e.entity_id.as_str(), e.entity_name.as_str(), e.icon.as_str()], p)
                })
            }),
        )?;
        write_property_csv(
            &links_csv,
            &["link_id", "link_name"],
            self.links.iter().flat_map(|l| {
                l.properties
                    .iter()
                    .map(move |p| (vec![l.link_id.as_str(), l.link_name.as_str()], p))
            }),
        )?;

        Ok(vec![entities_json, links_json, entities_csv, links_csv])
    }
}

#[derive(Debug, Serialize)]
pub struct ItemSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct TemplateItemSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_id: Option<String>,
    pub type_id: String,
    pub type_name: String,
    pub property_count: usize,
    pub properties: Vec<ItemSummary>,
}

#[derive(Debug, Serialize)]
pub struct DateFormatSummary {
    pub column: String,
    pub format: String,
}

#[derive(Debug, Serialize)]
pub struct ImportSpecSummary {
    pub file: String,
    pub source_type: String,
    pub entities: Vec<TemplateItemSummary>,
    pub links: Vec<TemplateItemSummary>,
    pub user_columns: BTreeSet<String>,
    pub date_formats: Vec<DateFormatSummary>,
    pub actions: BTreeSet<String>,
    pub referenced_columns: BTreeSet<String>,
    pub identity_type_ids: BTreeSet<String>,
}

fn item_summary(node: Node, entity: bool) -> TemplateItemSummary {
    let item_type = first_descendant(node, "ItemType");
    let properties: Vec<ItemSummary> = descendants(node, "DatabaseProperty")
        .map(|p| ItemSummary {
            id: attr(p, "Identifier"),
            name: attr(p, "DisplayName"),
        })
        .collect();
    TemplateItemSummary {
        entity_id: entity.then(|| attr(node, "EntityId")),
        link_id: (!entity).then(|| attr(node, "LinkId")),
        type_id: item_type.map(|n| attr(n, "Identifier")).unwrap_or_default(),
        type_name: item_type.map(|n| attr(n, "DisplayName")).unwrap_or_default(),
        property_count: properties.len(),
        properties,
    }
}

pub fn summarize_import_spec(text: &str, file: &str) -> Result<ImportSpecSummary> {
    let doc = xml::parse_document(text)?;
    let root = doc.root_element();
    let pattern = Regex::new(r"\[([^\]]+)\]")?;

    let referenced_columns = descendants(root, "ColumnExpression")
        .filter_map(|e| e.text())
        .flat_map(|t| {
            pattern
                .captures_iter(t)
                .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
                .collect::<Vec<_>>()
        })
        .collect();

    Ok(ImportSpecSummary {
        file: file.to_string(),
        source_type: first_descendant(root, "Data")
            .map(|d| attr(d, "Source"))
            .unwrap_or_default(),
        entities: descendants(root, "Entity").map(|e| item_summary(e, true)).collect(),
        links: descendants(root, "Link").map(|l| item_summary(l, false)).collect(),
        user_columns: descendants(root, "UserColumn")
            .map(|u| attr(u, "ColumnId"))
            .filter(|c| !c.is_empty())
            .collect(),
        date_formats: descendants(root, "DateTimeFormat")
            .map(|d| DateFormatSummary {
                column: attr(d, "ColumnId"),
                format: attr(d, "Format"),
            })
            .collect(),
        actions: descendants(root, "Actions")
            .flat_map(|a| a.children().filter(|n| n.is_element()))
            .map(|n| n.tag_name().name().to_string())
            .collect(),
        referenced_columns,
        identity_type_ids: descendants(root, "ItemTypeIdentity")
            .map(|i| attr(i, "TypeId"))
            .filter(|t| !t.is_empty())
            .collect(),
    })
}

#[derive(Debug, Serialize)]
pub struct FormattingRuleSummary {
    pub target: String,
    pub style: String,
    pub parameter: String,
}

#[derive(Debug, Serialize)]
pub struct FormattingSpecSummary {
    pub file: String,
    pub subject: String,
    pub rule_count: usize,
    pub rules: Vec<FormattingRuleSummary>,
}

/// Local name of the first element inside `rule`'s `wrapper` child.
fn first_child_tag(rule: Node, wrapper: &str) -> String {
    children(rule, wrapper)
        .next()
        .and_then(|w| w.children().find(|n| n.is_element()))
        .map(|n| n.tag_name().name().to_string())
        .unwrap_or_default()
}

pub fn summarize_formatting_spec(text: &str, file: &str) -> Result<FormattingSpecSummary> {
    let doc = xml::parse_document(text)?;
    let root = doc.root_element();

    let rules: Vec<FormattingRuleSummary> = descendants(root, "FormattingRule")
        .map(|rule| FormattingRuleSummary {
            target: first_child_tag(rule, "Target"),
            style: first_child_tag(rule, "Style"),
            parameter: first_child_tag(rule, "Parameter"),
        })
        .collect();

    let subject = first_descendant(root, "Details")
        .and_then(|d| children(d, "Subject").next())
        .map(|s| attr(s, "Value"))
        .unwrap_or_default();

    Ok(FormattingSpecSummary {
        file: file.to_string(),
        subject,
        rule_count: rules.len(),
        rules,
    })
}

#[derive(Debug, Serialize)]
pub struct MatchRuleHeader {
    pub display_name: String,
    pub item_type_id: String,
    pub active: String,
}

#[derive(Debug, Serialize)]
pub struct MatchRulesSummary {
    pub file: String,
    pub rule_count: usize,
    pub rules: Vec<MatchRuleHeader>,
    pub operators: BTreeMap<String, usize>,
    pub normalizations: BTreeMap<String, usize>,
}

pub fn summarize_match_rules(text: &str, file: &str) -> Result<MatchRulesSummary> {
    let doc = xml::parse_document(text)?;
    let mut rules = Vec::new();
    let mut operators = BTreeMap::new();
    let mut normalizations = BTreeMap::new();

    for node in doc.descendants().filter(|n| n.is_element()) {
        match node.tag_name().name() {
            "matchRule" => rules.push(MatchRuleHeader {
                display_name: attr(node, "displayName"),
                item_type_id: attr(node, "itemTypeId"),
                active: attr(node, "active"),
            }),
            "operator" => {
                if let Some(t) = node.text().filter(|t| !t.is_empty()) {
                    *operators.entry(t.to_string()).or_insert(0) += 1;
                }
            }
            "normalization" => {
                if let Some(t) = node.text().filter(|t| !t.is_empty()) {
                    *normalizations.entry(t.to_string()).or_insert(0) += 1;
                }
            }
            _ => {}
        }
    }

    Ok(MatchRulesSummary {
        file: file.to_string(),
        rule_count: rules.len(),
        rules,
        operators,
        normalizations,
    })
}

#[derive(Debug, Serialize)]
pub struct SchemaSummary {
    pub entity_type_count: usize,
    pub link_type_count: usize,
    pub entity_types: Vec<ItemSummary>,
    pub link_types: Vec<ItemSummary>,
    pub label_definition_count: usize,
}

pub fn summarize_schema(text: &str) -> Result<SchemaSummary> {
    let doc = xml::parse_document(text)?;
    let root = doc.root_element();
    let types = |name: &str| -> Vec<ItemSummary> {
        descendants(root, name)
            .map(|n| ItemSummary {
                id: attr(n, "Id"),
                name: attr(n, "DisplayName"),
            })
            .collect()
    };
    let entity_types = types("EntityType");
    let link_types = types("LinkType");
    Ok(SchemaSummary {
        entity_type_count: entity_types.len(),
        link_type_count: link_types.len(),
        entity_types,
        link_types,
        label_definition_count: descendants(root, "LabelDefinition").count(),
    })
}

/// Files in `dir` with the given extension (case-insensitive), sorted by name.
pub fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(extension))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Writes the four summary files for an i2 specs directory.
pub fn write_summaries(base_dir: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)?;

    let mut import_specs = Vec::new();
    for path in files_with_extension(&base_dir.join(SPECS_DIR), "oimp")? {
        let text = xml::read_xml_file(&path)?;
        import_specs.push(summarize_import_spec(&text, &file_name(&path))?);
    }

    let mut formatting = Vec::new();
    for dir in FORMATTING_DIRS {
        for path in files_with_extension(&base_dir.join(dir), "cfs")? {
            let text = xml::read_xml_file(&path)?;
            formatting.push(summarize_formatting_spec(&text, &file_name(&path))?);
        }
    }

    let mut match_rules = Vec::new();
    for name in MATCH_RULE_FILES {
        let path = base_dir.join("Matching Settings").join(name);
        if path.exists() {
            let text = xml::read_xml_file(&path)?;
            match_rules.push(summarize_match_rules(&text, name)?);
        }
    }

    let schema = schema_path(base_dir);
    let schema_summary = if schema.exists() {
        serde_json::to_value(summarize_schema(&xml::read_xml_file(&schema)?)?)?
    } else {
        serde_json::json!({})
    };

    tracing::info!(
        "Summarized {} import specs, {} formatting specs, {} match rule files",
        import_specs.len(),
        formatting.len(),
        match_rules.len()
    );

    let outputs = [
        ("import_specs_summary.json", serde_json::to_vec_pretty(&import_specs)?),
        ("formatting_rules_summary.json", serde_json::to_vec_pretty(&formatting)?),
        ("matching_rules_summary.json", serde_json::to_vec_pretty(&match_rules)?),
        ("schema_summary.json", serde_json::to_vec_pretty(&schema_summary)?),
    ];
    let mut written = Vec::new();
    for (name, bytes) in outputs {
        let path = out_dir.join(name);
        fs::write(&path, bytes)?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SCHEMA: &str = r#"<Schema xmlns="urn:schema">
      <EntityType Id="PER" DisplayName="Person" Icon="person">
        <PropertyType Id="PER4" DisplayName="Name" LogicalType="SINGLE_LINE_STRING" Mandatory="true" MaximumLengthChars="250" />
        <PropertyType Id="PER7" DisplayName="Gender" LogicalType="SELECTED_FROM">
          <PossibleValue Value="Female" /><PossibleValue Value="Male" />
        </PropertyType>
      </EntityType>
      <LinkType Id="LAS" DisplayName="Associate" />
      <LabelDefinition ItemTypeId="PER" />
    </Schema>"#;

    #[test]
    fn test_catalog_files() {
        let catalog = SchemaCatalog::from_xml_str(SCHEMA).unwrap();
        assert_eq!(catalog.entities.len(), 1);
        assert_eq!(catalog.entity_property_count(), 2);
        assert_eq!(catalog.links[0].link_name, "Associate");

        let dir = TempDir::new().unwrap();
        let written = catalog.write(dir.path()).unwrap();
        assert_eq!(written.len(), 4);

        let csv_text = fs::read_to_string(dir.path().join("entity_catalog.csv")).unwrap();
        let mut lines = csv_text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "entity_id,entity_name,icon,property_id,property_name,logical_type,mandatory,max_len,semantic_type_id,possible_values_count,possible_values"
        );
        assert!(csv_text.contains("PER7,Gender,SELECTED_FROM,,,,2,Female | Male"));

        let links_csv = fs::read_to_string(dir.path().join("link_catalog.csv")).unwrap();
        assert_eq!(links_csv.lines().count(), 1);
        assert!(links_csv.starts_with("link_id,link_name,property_id,"));
    }

    #[test]
    fn test_schema_summary() {
        let summary = summarize_schema(SCHEMA).unwrap();
        assert_eq!(summary.entity_type_count, 1);
        assert_eq!(summary.link_type_count, 1);
        assert_eq!(summary.label_definition_count, 1);
    }

    #[test]
    fn test_import_spec_summary() {
        let spec = r#"<S><Data Source="File"/>
          <UserColumn ColumnId="Full"><ColumnExpression>[A] [B]</ColumnExpression></UserColumn>
          <Column ColumnId="A"><Actions><ValuePrefix Text="x"/><RemoveCharacters Characters="-"/></Actions></Column>
          <Entity EntityId="1"><ItemType Identifier="PER" DisplayName="Person"/>
            <DatabaseProperty Identifier="PER4" DisplayName="Name"><ColumnExpression>[Full]</ColumnExpression></DatabaseProperty>
          </Entity>
          <ItemTypeIdentity TypeId="PER"/></S>"#;
        let s = summarize_import_spec(spec, "a.oimp").unwrap();
        assert_eq!(s.source_type, "File");
        assert_eq!(s.actions.iter().collect::<Vec<_>>(), vec!["RemoveCharacters", "ValuePrefix"]);
        assert_eq!(s.referenced_columns.iter().collect::<Vec<_>>(), vec!["A", "B", "Full"]);
        assert_eq!(s.entities[0].property_count, 1);
        assert!(s.identity_type_ids.contains("PER"));
    }

    #[test]
    fn test_match_rule_counts() {
        let xml = r#"<m><matchRule itemTypeId="PER" displayName="A" active="true">
            <condition><operator>EXACT_MATCH</operator><normalization>IGNORE_CASE</normalization></condition>
            <condition><operator>EXACT_MATCH</operator></condition></matchRule></m>"#;
        let s = summarize_match_rules(xml, "rules.xml").unwrap();
        assert_eq!(s.rule_count, 1);
        assert_eq!(s.operators["EXACT_MATCH"], 2);
        assert_eq!(s.normalizations["IGNORE_CASE"], 1);
    }
}
