//! Minimal XLSX reader: first worksheet, shared and inline strings.

use super::xml::{self, children, descendants};
use crate::utils::error::{PrepError, Result};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use zip::result::ZipError;
use zip::ZipArchive;

const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Option<String>> {
    let mut part = match archive.by_name(name) {
        Ok(part) => part,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut raw = Vec::new();
    part.read_to_end(&mut raw)?;
    Ok(Some(xml::decode_xml_bytes(&raw)))
}

fn require_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str, path: &Path) -> Result<String> {
    read_part(archive, name)?.ok_or_else(|| PrepError::UnsupportedInput {
        path: path.display().to_string(),
        reason: format!("workbook is missing {}", name),
    })
}

/// Columns in a worksheet, `A` through `XFD`.
const MAX_COLUMNS: usize = 16_384;

/// Zero-based column index from a cell reference such as `AB12`.
///
/// `None` when the reference has no letters or points past `XFD`.
fn column_index(reference: &str) -> Option<usize> {
    let letters: Vec<u8> = reference
        .bytes()
        .take_while(u8::is_ascii_alphabetic)
        .map(|b| b.to_ascii_uppercase())
        .collect();
    if letters.is_empty() {
        return None;
    }
    let n = letters.iter().try_fold(0usize, |acc, b| {
        acc.checked_mul(26)?
            .checked_add((b - b'A' + 1) as usize)
            .filter(|n| *n <= MAX_COLUMNS)
    })?;
    Some(n - 1)
}

fn worksheet_part(target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        absolute.to_string()
    } else if target.starts_with("xl/") {
        target.to_string()
    } else {
        format!("xl/{}", target)
    }
}

/// Reads the first worksheet into rows of trimmed cell strings.
///
/// Cells are placed by their `r` reference when present, so sparse rows keep
/// their column positions.
pub fn read_first_sheet(path: &Path) -> Result<Vec<Vec<String>>> {
    let file = BufReader::new(File::open(path)?);
    let mut archive = ZipArchive::new(file)?;

    let workbook = require_part(&mut archive, "xl/workbook.xml", path)?;
    let workbook = xml::parse_document(&workbook)?;
    let Some(sheet) = descendants(workbook.root_element(), "sheet").next() else {
        return Ok(Vec::new());
    };
    let rel_id = sheet.attribute((REL_NS, "id")).unwrap_or("").to_string();

    let rels = require_part(&mut archive, "xl/_rels/workbook.xml.rels", path)?;
    let rels = xml::parse_document(&rels)?;
    let target = descendants(rels.root_element(), "Relationship")
        .find(|r| r.attribute("Id") == Some(rel_id.as_str()))
        .and_then(|r| r.attribute("Target"))
        .map(str::to_string);
    let Some(target) = target else {
        return Ok(Vec::new());
    };

    let shared_strings = match read_part(&mut archive, "xl/sharedStrings.xml")? {
        Some(text) => {
            let doc = xml::parse_document(&text)?;
            descendants(doc.root_element(), "si")
                .map(|si| descendants(si, "t").filter_map(|t| t.text()).collect::<String>())
                .collect()
        }
        None => Vec::new(),
    };

    let sheet_xml = require_part(&mut archive, &worksheet_part(&target), path)?;
    let sheet_doc = xml::parse_document(&sheet_xml)?;

    let mut rows = Vec::new();
    for row in descendants(sheet_doc.root_element(), "row") {
        let mut values: Vec<String> = Vec::new();
        for cell in children(row, "c") {
            let value = cell_value(cell, &shared_strings);
            let index = match cell.attribute("r") {
                Some(reference) => match column_index(reference) {
                    Some(index) => index,
                    None if reference.starts_with(|c: char| c.is_ascii_alphabetic()) => {
                        tracing::warn!("Skipping cell with out-of-range reference {}", reference);
                        continue;
                    }
                    None => values.len(),
                },
                None => values.len(),
            };
            if index >= values.len() {
                values.resize(index + 1, String::new());
            }
            values[index] = value.trim().to_string();
        }
        rows.push(values);
    }
    Ok(rows)
}

fn cell_value(cell: roxmltree::Node, shared_strings: &[String]) -> String {
    match cell.attribute("t") {
        Some("s") => children(cell, "v")
            .next()
            .and_then(|v| v.text())
            .and_then(|v| v.trim().parse::<usize>().ok())
            .and_then(|i| shared_strings.get(i).cloned())
            .unwrap_or_default(),
        Some("inlineStr") => descendants(cell, "t").filter_map(|t| t.text()).collect(),
        _ => xml::text(children(cell, "v").next()),
    }
}
