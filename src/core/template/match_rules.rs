//! Match-rule XML: fallback deduplication keys built from normalized values.

use super::xml::{self, attr, descendant_text, descendants};
use crate::utils::error::Result;
use std::collections::HashMap;
use std::path::Path;
use unicode_normalization::char::canonical_combining_class;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchCondition {
    pub property_id: String,
    pub operator: String,
    pub value: Option<String>,
    pub normalizations: Vec<String>,
}

impl MatchCondition {
    /// Normalizes `raw` then applies the operator.
    pub fn comparable(&self, raw: &str) -> String {
        let normalized = normalize_value(raw, &self.normalizations);
        apply_operator(&normalized, &self.operator, self.value.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRule {
    pub item_type_id: String,
    pub display_name: String,
    pub active: bool,
    pub conditions: Vec<MatchCondition>,
}

/// Rules grouped by item type id, in document order.
#[derive(Debug, Clone, Default)]
pub struct MatchRuleSet {
    rules: HashMap<String, Vec<MatchRule>>,
}

impl MatchRuleSet {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = xml::read_xml_file(path)?;
        Self::from_xml_str(&text)
    }

    pub fn from_xml_str(text: &str) -> Result<Self> {
        let doc = xml::parse_document(text)?;
        let mut rules: HashMap<String, Vec<MatchRule>> = HashMap::new();

        for rule in doc.descendants().filter(|n| xml::is_named(n, "matchRule")) {
            let item_type_id = attr(rule, "itemTypeId");
            if item_type_id.is_empty() {
                continue;
            }
            let conditions = descendants(rule, "condition")
                .map(|cond| {
                    let value = descendant_text(cond, "value");
                    MatchCondition {
                        property_id: attr(cond, "propertyTypeId"),
                        operator: descendant_text(cond, "operator"),
                        value: (!value.is_empty()).then_some(value),
                        normalizations: descendants(cond, "normalization")
                            .filter_map(|n| n.text())
                            .filter(|t| !t.is_empty())
                            .map(str::to_string)
                            .collect(),
                    }
                })
                .collect();

            rules.entry(item_type_id.clone()).or_default().push(MatchRule {
                item_type_id,
                display_name: attr(rule, "displayName"),
                active: !rule
                    .attribute("active")
                    .is_some_and(|a| a.eq_ignore_ascii_case("false")),
                conditions,
            });
        }

        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    /// First active rule for the type.
    pub fn applicable(&self, type_id: &str) -> Option<&MatchRule> {
        self.rules.get(type_id)?.iter().find(|r| r.active)
    }
}

/// Applies the normalizations in the order listed.
pub fn normalize_value(value: &str, normalizations: &[String]) -> String {
    let mut out = value.to_string();
    for n in normalizations {
        out = match n.as_str() {
            "IGNORE_CASE" => out.to_lowercase(),
            "SIMPLIFY_LIGATURES" => out
                .replace('æ', "ae")
                .replace('œ', "oe")
                .replace('Æ', "AE")
                .replace('Œ', "OE"),
            "IGNORE_DIACRITICS" => out
                .nfkd()
                .filter(|c| canonical_combining_class(*c) == 0)
                .collect(),
            "IGNORE_NONALPHANUMERIC" => out.chars().filter(|c| c.is_ascii_alphanumeric()).collect(),
            "IGNORE_WHITESPACE_BETWEEN" => out.chars().filter(|c| !c.is_whitespace()).collect(),
            "IGNORE_WHITESPACE_AROUND" => out.trim().to_string(),
            _ => out,
        };
    }
    out
}

/// `EXACT_MATCH_START n` keeps the first n characters, `EXACT_MATCH_END n` the
/// last n; anything else compares the whole value.
pub fn apply_operator(value: &str, operator: &str, operand: Option<&str>) -> String {
    let n = match operand.unwrap_or("0").trim().parse::<usize>() {
        Ok(n) if n > 0 => n,
        _ => return value.to_string(),
    };
    match operator {
        "EXACT_MATCH_START" => value.chars().take(n).collect(),
        "EXACT_MATCH_END" => {
            let len = value.chars().count();
            value.chars().skip(len.saturating_sub(n)).collect()
        }
        _ => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norms(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalizations_merge_variants() {
        let n = norms(&["IGNORE_CASE", "IGNORE_DIACRITICS", "IGNORE_WHITESPACE_AROUND"]);
        assert_eq!(normalize_value("  Zoë Brontë ", &n), "zoe bronte");
        assert_eq!(normalize_value("ZOE BRONTE", &n), "zoe bronte");
    }

    #[test]
    fn test_ligatures_and_punctuation() {
        assert_eq!(
            normalize_value("Æsop's Œuvre", &norms(&["SIMPLIFY_LIGATURES", "IGNORE_NONALPHANUMERIC"])),
            "AEsopsOEuvre"
        );
        assert_eq!(
            normalize_value("AB 12\tCD", &norms(&["IGNORE_WHITESPACE_BETWEEN"])),
            "AB12CD"
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(apply_operator("07700900123", "EXACT_MATCH_END", Some("6")), "900123");
        assert_eq!(apply_operator("SW1A1AA", "EXACT_MATCH_START", Some("4")), "SW1A");
        assert_eq!(apply_operator("abc", "EXACT_MATCH_END", Some("10")), "abc");
        assert_eq!(apply_operator("abc", "EXACT_MATCH_END", None), "abc");
        assert_eq!(apply_operator("abc", "EXACT_MATCH", Some("1")), "abc");
    }

    #[test]
    fn test_first_active_rule_applies() {
        let xml = r#"<rules xmlns="urn:match">
          <matchRule itemTypeId="PER" displayName="Off" active="false">
            <condition propertyTypeId="PER4"><operator>EXACT_MATCH</operator></condition>
          </matchRule>
          <matchRule itemTypeId="PER" displayName="Name">
            <condition propertyTypeId="PER4">
              <operator>EXACT_MATCH</operator>
              <normalization>IGNORE_CASE</normalization>
            </condition>
          </matchRule>
          <matchRule itemTypeId="PER" displayName="Later" active="true" />
          <matchRule displayName="No type" />
        </rules>"#;
        let set = MatchRuleSet::from_xml_str(xml).unwrap();
        assert_eq!(set.len(), 3);
        let rule = set.applicable("PER").unwrap();
        assert_eq!(rule.display_name, "Name");
        assert_eq!(rule.conditions[0].normalizations, vec!["IGNORE_CASE"]);
        assert_eq!(rule.conditions[0].value, None);
        assert!(set.applicable("VEH").is_none());
    }
}
