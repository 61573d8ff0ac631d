//! Loading tabular input into rows shaped by an import specification.

use super::spec::{ActionKind, ColumnAction, ImportTemplate};
use super::xlsx;
use crate::domain::model::Row;
use crate::utils::error::{PrepError, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::BTreeMap;
use std::path::Path;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Reads CSV/TXT/TSV (with the given delimiter) or XLSX into a cell matrix.
pub fn load_matrix(path: &Path, delimiter: u8) -> Result<Vec<Vec<String>>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "xlsx" => xlsx::read_first_sheet(path),
        "csv" | "txt" | "tsv" => {
            let raw = std::fs::read(path)?;
            read_delimited(raw.strip_prefix(UTF8_BOM).unwrap_or(&raw), delimiter)
        }
        _ => Err(PrepError::UnsupportedInput {
            path: path.display().to_string(),
            reason: format!(
                "unsupported input type '.{}', use CSV/TXT/TSV/XLSX",
                extension
            ),
        }),
    }
}

fn read_delimited(data: &[u8], delimiter: u8) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(data);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|v| v.trim().to_string()).collect());
    }
    Ok(rows)
}

/// Header selection, row filtering, user columns, column actions and date
/// rewriting, in that order.
pub fn shape_rows(template: &ImportTemplate, matrix: Vec<Vec<String>>) -> Vec<Row> {
    if matrix.is_empty() {
        return Vec::new();
    }

    let mut header_idx = (template.row_header_index - 1).max(0) as usize;
    if header_idx >= matrix.len() {
        header_idx = 0;
    }
    let headers: Vec<String> = matrix[header_idx].iter().map(|h| h.trim().to_string()).collect();

    let mut rows: Vec<Row> = matrix
        .iter()
        .enumerate()
        .map(|(i, values)| (i as i64 + 1, values))
        .filter(|(idx, values)| !is_skipped(template, *idx, values))
        .map(|(_, values)| {
            headers
                .iter()
                .enumerate()
                .filter(|(_, h)| !h.is_empty())
                .map(|(i, h)| (h.clone(), values.get(i).cloned().unwrap_or_default()))
                .collect()
        })
        .collect();

    let mut actions_by_column: BTreeMap<&str, Vec<&ColumnAction>> = BTreeMap::new();
    for action in &template.column_actions {
        actions_by_column
            .entry(action.column_id.as_str())
            .or_default()
            .push(action);
    }
    for actions in actions_by_column.values_mut() {
        actions.sort_by_key(|a| a.order);
    }

    for row in &mut rows {
        for uc in &template.user_columns {
            let value = uc.expression.evaluate(row);
            row.set(uc.column_id.clone(), value);
        }

        for (column, actions) in &actions_by_column {
            let mut value = row.get(column).to_string();
            for action in actions {
                value = apply_column_action(&value, &action.kind, row);
            }
            row.set(*column, value);
        }

        for date in &template.date_formats {
            if row.contains(&date.column) {
                let converted = parse_datetime_value(row.get(&date.column), &date.format);
                row.set(date.column.clone(), converted);
            }
        }
    }

    rows
}

fn is_skipped(template: &ImportTemplate, idx: i64, values: &[String]) -> bool {
    if idx <= template.row_header_index {
        return true;
    }
    if template
        .exclude_ranges
        .iter()
        .any(|(a, b)| *a <= idx && idx <= *b)
    {
        return true;
    }
    let first = values.first().map(String::as_str).unwrap_or("");
    !template.ignore_rows_starting_with.is_empty()
        && first.starts_with(&template.ignore_rows_starting_with)
}

/// Loads and shapes the rows of `input` for `template`.
pub fn load_rows(template: &ImportTemplate, input: &Path) -> Result<Vec<Row>> {
    let matrix = load_matrix(input, template.delimiter)?;
    tracing::debug!("Read {} raw rows from {}", matrix.len(), input.display());
    Ok(shape_rows(template, matrix))
}

pub fn apply_column_action(value: &str, action: &ActionKind, row: &Row) -> String {
    match action {
        ActionKind::RemoveCharacters { characters } => {
            value.chars().filter(|c| !characters.contains(*c)).collect()
        }
        ActionKind::ExtractText { from, to } => {
            let chars: Vec<char> = value.chars().collect();
            if chars.is_empty() {
                return String::new();
            }
            let end = to.unwrap_or(chars.len() - 1).min(chars.len() - 1);
            if *from > end {
                return String::new();
            }
            chars[*from..=end].iter().collect()
        }
        ActionKind::ValuePrefix { text } => format!("{}{}", text, value),
        ActionKind::ValueSuffix { text } => format!("{}{}", value, text),
        ActionKind::ColumnSuffix { column, separator } => {
            format!("{}{}{}", value, separator, row.get(column))
        }
        ActionKind::Unknown(_) => value.to_string(),
    }
}

/// Rewrites `value` to ISO-8601 using a `yyyy dd MM HH mm ss` token format.
/// Values that do not parse come back unchanged.
pub fn parse_datetime_value(value: &str, format: &str) -> String {
    if value.is_empty() {
        return value.to_string();
    }
    let fmt = format
        .replace("yyyy", "%Y")
        .replace("dd", "%d")
        .replace("MM", "%m")
        .replace("HH", "%H")
        .replace("mm", "%M")
        .replace("ss", "%S");

    let parsed = NaiveDateTime::parse_from_str(value, &fmt)
        .or_else(|_| NaiveDate::parse_from_str(value, &fmt).map(|d| d.and_time(NaiveTime::default())))
        .or_else(|_| {
            NaiveTime::parse_from_str(value, &fmt).map(|t| {
                NaiveDate::from_ymd_opt(1900, 1, 1)
                    .unwrap_or_default()
                    .and_time(t)
            })
        });

    match parsed {
        Ok(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
        Err(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_column_actions() {
        let r = row(&[("Area", "020")]);
        let remove = ActionKind::RemoveCharacters {
            characters: " -".into(),
        };
        assert_eq!(apply_column_action("07700 900-123", &remove, &r), "07700900123");

        let extract = ActionKind::ExtractText { from: 1, to: Some(3) };
        assert_eq!(apply_column_action("abcdef", &extract, &r), "bcd");
        let tail = ActionKind::ExtractText { from: 2, to: None };
        assert_eq!(apply_column_action("abcdef", &tail, &r), "cdef");
        let past_end = ActionKind::ExtractText { from: 9, to: Some(12) };
        assert_eq!(apply_column_action("abc", &past_end, &r), "");

        let suffix = ActionKind::ColumnSuffix {
            column: "Area".into(),
            separator: "/".into(),
        };
        assert_eq!(apply_column_action("1234", &suffix, &r), "1234/020");
    }

    #[test]
    fn test_date_parsing() {
        assert_eq!(parse_datetime_value("05/01/2024", "dd/MM/yyyy"), "2024-01-05T00:00:00");
        assert_eq!(
            parse_datetime_value("2024-01-05 13:45:10", "yyyy-MM-dd HH:mm:ss"),
            "2024-01-05T13:45:10"
        );
        assert_eq!(parse_datetime_value("not a date", "dd/MM/yyyy"), "not a date");
        assert_eq!(parse_datetime_value("", "dd/MM/yyyy"), "");
    }

    #[test]
    fn test_unsupported_extension() {
        let err = load_matrix(Path::new("rows.ods"), b',').unwrap_err();
        assert!(matches!(err, PrepError::UnsupportedInput { .. }));
    }

    #[test]
    fn test_hash_prefixed_rows_are_dropped() {
        let template = ImportTemplate::from_xml_str(
            r##"<ImportSpecification>
  <RowDefinitions IgnoreRowsStartingWith="#">
    <RowContainingColumnIdentifiers RowIndex="1" />
  </RowDefinitions>
</ImportSpecification>"##,
            "comments.oimp",
        )
        .unwrap();
        assert_eq!(template.ignore_rows_starting_with, "#");

        let matrix = vec![
            vec!["Name".to_string()],
            vec!["# exported 2024-01-05".to_string()],
            vec!["Ada".to_string()],
            vec!["#2 starts with the prefix too".to_string()],
        ];
        let rows = shape_rows(&template, matrix);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("Name"), "Ada");
    }

    #[test]
    fn test_delimited_rows_are_trimmed_and_ragged() {
        let rows = read_delimited(b"a\tb\tc\n 1 \t2\n", b'\t').unwrap();
        assert_eq!(rows, vec![vec!["a", "b", "c"], vec!["1", "2"]]);
    }
}
