//! Materializes shaped rows into a deduplicated node/edge graph.

use super::match_rules::MatchRuleSet;
use super::spec::{BlankHandling, IdentityRule, ImportTemplate, PropertyMap};
use crate::domain::model::{Edge, Graph, GraphMetadata, Node, Row};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Property ids checked, in order, when picking a node label.
const LABEL_PROPERTY_IDS: [&str; 6] = ["PT123", "PER4", "PER6", "VEH2", "ACC3", "PT170"];

const IDENTITY_PROPERTY_ID: &str = "IDENTITY";
const IDENTITY_PROPERTY_NAME: &str = "Identity";

/// Evaluated property values of one item, keyed by id in template order and
/// by output name.
#[derive(Debug, Default)]
struct ItemProperties {
    by_id: Vec<(String, String)>,
    by_name: BTreeMap<String, String>,
}

impl ItemProperties {
    fn evaluate(maps: &[PropertyMap], row: &Row) -> Self {
        let mut props = Self::default();
        for pm in maps {
            let value = pm.expression.evaluate(row);
            if pm.blank_handling == BlankHandling::DoNotImportIfBlank && value.is_empty() {
                continue;
            }
            props.insert_id(&pm.property_id, &value);
            props.by_name.insert(pm.output_name().to_string(), value);
        }
        props
    }

    fn insert_id(&mut self, id: &str, value: &str) {
        match self.by_id.iter_mut().find(|(k, _)| k == id) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.by_id.push((id.to_string(), value.to_string())),
        }
    }

    fn get(&self, id: &str) -> &str {
        self.by_id
            .iter()
            .find(|(k, _)| k == id)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    fn contains_id(&self, id: &str) -> bool {
        self.by_id.iter().any(|(k, _)| k == id)
    }

    fn label(&self, type_name: &str) -> String {
        LABEL_PROPERTY_IDS
            .iter()
            .map(|id| self.get(id))
            .find(|v| !v.is_empty())
            .or_else(|| {
                self.by_id
                    .iter()
                    .map(|(_, v)| v.as_str())
                    .find(|v| !v.is_empty())
            })
            .unwrap_or(type_name)
            .to_string()
    }
}

/// Rule-based dedup key: identity rule first, then the first active match rule.
fn dedup_key(
    type_key: &str,
    props: &ItemProperties,
    identity_rules: &HashMap<String, IdentityRule>,
    match_rules: &MatchRuleSet,
) -> Option<String> {
    if let Some(rule) = identity_rules.get(type_key) {
        let values: Vec<&str> = rule
            .criteria_property_ids
            .iter()
            .map(|pid| props.get(pid))
            .collect();
        if values.iter().any(|v| !v.is_empty()) {
            return Some(format!("{}|IDRULE|{}", type_key, values.join("|")));
        }
    }

    if let Some(rule) = match_rules.applicable(type_key) {
        let components: Vec<(String, String)> = rule
            .conditions
            .iter()
            .map(|c| (c.property_id.clone(), c.comparable(props.get(&c.property_id))))
            .collect();
        if components.iter().any(|(_, v)| !v.is_empty()) {
            let joined: Vec<String> = components
                .iter()
                .map(|(pid, v)| format!("{}:{}", pid, v))
                .collect();
            return Some(format!("{}|MATCH|{}", type_key, joined.join("|")));
        }
    }

    None
}

fn fresh_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &hex[..12])
}

/// Builds the graph for `rows` (already shaped by [`super::rows::shape_rows`]).
pub fn run_template(template: &ImportTemplate, rows: &[Row], match_rules: &MatchRuleSet) -> Graph {
    let mut nodes: Vec<Node> = Vec::new();
    let mut edges: Vec<Edge> = Vec::new();
    let mut node_index: HashMap<String, usize> = HashMap::new();
    let mut edge_keys: HashMap<String, usize> = HashMap::new();

    for (i, row) in rows.iter().enumerate() {
        let source_row = i + 1;
        let mut row_nodes: HashMap<&str, String> = HashMap::new();

        for entity in &template.entities {
            let mut props = ItemProperties::evaluate(&entity.properties, row);

            let identity_value = entity.identity_expression.evaluate(row);
            if !identity_value.is_empty() {
                if !props.contains_id(IDENTITY_PROPERTY_ID) {
                    props.insert_id(IDENTITY_PROPERTY_ID, &identity_value);
                }
                props
                    .by_name
                    .entry(IDENTITY_PROPERTY_NAME.to_string())
                    .or_insert_with(|| identity_value.clone());
            }

            let type_key = if entity.type_id.is_empty() {
                &entity.type_name
            } else {
                &entity.type_id
            };
            let key = dedup_key(type_key, &props, &template.identity_rules, match_rules).or_else(|| {
                (!identity_value.is_empty())
                    .then(|| format!("{}|IDENTITY|{}", entity.type_name, identity_value))
            });

            let existing = key.as_ref().and_then(|k| node_index.get(k).copied());
            let node_id = match existing {
                Some(idx) => {
                    let node = &mut nodes[idx];
                    for (name, value) in props.by_name {
                        if value.is_empty() {
                            continue;
                        }
                        let slot = node.properties.entry(name).or_default();
                        if slot.is_empty() {
                            *slot = value;
                        }
                    }
                    node.id.clone()
                }
                None => {
                    let id = fresh_id("N");
                    let label = props.label(&entity.type_name);
                    if let Some(k) = &key {
                        node_index.insert(k.clone(), nodes.len());
                    }
                    nodes.push(Node {
                        id: id.clone(),
                        type_id: entity.type_id.clone(),
                        type_name: entity.type_name.clone(),
                        label,
                        properties: props.by_name,
                        identity_key: key.unwrap_or_default(),
                        source_row,
                    });
                    id
                }
            };
            row_nodes.insert(entity.entity_id.as_str(), node_id);
        }

        for link in &template.links {
            let (Some(src), Some(dst)) = (
                row_nodes.get(link.from_entity_id.as_str()),
                row_nodes.get(link.to_entity_id.as_str()),
            ) else {
                continue;
            };

            let props = ItemProperties::evaluate(&link.properties, row);
            let type_key = if link.type_id.is_empty() {
                &link.type_name
            } else {
                &link.type_id
            };
            let key = dedup_key(type_key, &props, &template.identity_rules, match_rules)
                .unwrap_or_else(|| {
                    let mut sorted: Vec<&(String, String)> =
                        props.by_id.iter().filter(|(_, v)| !v.is_empty()).collect();
                    sorted.sort();
                    let mut parts = vec![type_key.to_string(), src.clone(), dst.clone()];
                    parts.extend(sorted.iter().map(|(k, v)| format!("{}={}", k, v)));
                    format!("EDGE|{}", parts.join("|"))
                });

            if edge_keys.contains_key(&key) {
                continue;
            }
            edge_keys.insert(key.clone(), edges.len());
            edges.push(Edge {
                id: fresh_id("E"),
                type_id: link.type_id.clone(),
                type_name: link.type_name.clone(),
                source: src.clone(),
                target: dst.clone(),
                properties: props.by_name,
                identity_key: key,
                source_row,
            });
        }
    }

    tracing::debug!(
        "Materialized {} nodes and {} edges from {} rows",
        nodes.len(),
        edges.len(),
        rows.len()
    );

    Graph {
        metadata: GraphMetadata {
            template_file: template.file_name.clone(),
            source_type: template.source_type.clone(),
            rows_processed: rows.len(),
            nodes: nodes.len(),
            edges: edges.len(),
        },
        nodes,
        edges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::template::rows::shape_rows;

    const SPEC: &str = r#"<Spec>
      <RowContainingColumnIdentifiers RowIndex="1" />
      <Entity EntityId="P">
        <ItemType Identifier="PER" DisplayName="Person" />
        <DatabaseProperty Identifier="PER4" DisplayName="Name"><ColumnExpression>[Name]</ColumnExpression></DatabaseProperty>
        <DatabaseProperty Identifier="PER9" DisplayName="Email"><ColumnExpression BlankHandling="DoNotImportIfBlank">[Email]</ColumnExpression></DatabaseProperty>
      </Entity>
      <Entity EntityId="T">
        <ItemType Identifier="TEL" DisplayName="Telephone" />
        <Identity><ColumnExpression>[Phone]</ColumnExpression></Identity>
      </Entity>
      <Link LinkId="L" FromEntityId="P" ToEntityId="T">
        <ItemType Identifier="USE" DisplayName="Uses" />
      </Link>
      <ItemTypeIdentity TypeId="PER"><Property TypeId="PER4" /></ItemTypeIdentity>
    </Spec>"#;

    fn matrix(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_identity_rule_dedups_nodes_and_backfills() {
        let template = ImportTemplate::from_xml_str(SPEC, "people.oimp").unwrap();
        let rows = shape_rows(
            &template,
            matrix(&[
                &["Name", "Email", "Phone"],
                &["Ada", "", "0123"],
                &["Ada", "ada@example.org", "0123"],
            ]),
        );
        let graph = run_template(&template, &rows, &MatchRuleSet::default());

        let people: Vec<&Node> = graph.nodes.iter().filter(|n| n.type_id == "PER").collect();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].identity_key, "PER|IDRULE|Ada");
        assert_eq!(people[0].label, "Ada");
        assert_eq!(people[0].properties["Email"], "ada@example.org");

        let phones: Vec<&Node> = graph.nodes.iter().filter(|n| n.type_id == "TEL").collect();
        assert_eq!(phones.len(), 1);
        assert_eq!(phones[0].identity_key, "Telephone|IDENTITY|0123");
        assert_eq!(phones[0].properties["Identity"], "0123");

        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].source, people[0].id);
        assert_eq!(graph.edges[0].target, phones[0].id);
        assert!(graph.edges[0].identity_key.starts_with("EDGE|USE|N-"));
        assert_eq!(graph.metadata.rows_processed, 2);
    }

    #[test]
    fn test_blank_property_is_omitted() {
        let template = ImportTemplate::from_xml_str(SPEC, "people.oimp").unwrap();
        let rows = shape_rows(&template, matrix(&[&["Name", "Email", "Phone"], &["Grace", "", ""]]));
        let graph = run_template(&template, &rows, &MatchRuleSet::default());

        let person = &graph.nodes[0];
        assert!(!person.properties.contains_key("Email"));
        assert_eq!(person.properties["Name"], "Grace");
        assert!(person.id.starts_with("N-") && person.id.len() == 14);

        // Telephone without identity or properties gets no key and its label
        // falls back to the type name.
        let phone = &graph.nodes[1];
        assert_eq!(phone.identity_key, "");
        assert_eq!(phone.label, "Telephone");
    }

    #[test]
    fn test_match_rule_merges_case_and_diacritic_variants() {
        let spec = r#"<Spec>
          <Entity EntityId="P">
            <ItemType Identifier="PER" DisplayName="Person" />
            <DatabaseProperty Identifier="PER4" DisplayName="Name"><ColumnExpression>[Name]</ColumnExpression></DatabaseProperty>
          </Entity>
        </Spec>"#;
        let rules = MatchRuleSet::from_xml_str(
            r#"<r><matchRule itemTypeId="PER" displayName="Name">
                <condition propertyTypeId="PER4">
                  <operator>EXACT_MATCH</operator>
                  <normalization>IGNORE_CASE</normalization>
                  <normalization>IGNORE_DIACRITICS</normalization>
                </condition>
            </matchRule></r>"#,
        )
        .unwrap();
        let template = ImportTemplate::from_xml_str(spec, "m.oimp").unwrap();
        let rows = shape_rows(
            &template,
            matrix(&[&["Name"], &["Chloé"], &["CHLOE"], &["Zoe"]]),
        );
        let graph = run_template(&template, &rows, &rules);

        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.nodes[0].identity_key, "PER|MATCH|PER4:chloe");
        assert_eq!(graph.nodes[0].label, "Chloé");
    }
}
