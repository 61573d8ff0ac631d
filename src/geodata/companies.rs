//! Companies House bulk CSV split into resumable JSON chunks.

use crate::domain::model::ChunkIndexEntry;
use crate::utils::error::Result;
use csv::StringRecord;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashSet;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompaniesSettings {
    pub output_dir: String,
    pub index_file: String,
    pub rows_per_file: usize,
    pub progress_every: usize,
}

impl Default for CompaniesSettings {
    fn default() -> Self {
        Self {
            output_dir: "data/companies_house_subsets".into(),
            index_file: "data/companies_house_index.json".into(),
            rows_per_file: 100_000,
            progress_every: 25_000,
        }
    }
}

pub fn chunk_file_name(start: usize, end: usize) -> String {
    format!("companies_{:06}_{:06}.json", start, end)
}

/// A CSV record serialized as an object in header order. Short records
/// serialize their missing fields as null.
struct RecordObject<'a> {
    headers: &'a StringRecord,
    record: &'a StringRecord,
}

impl Serialize for RecordObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.headers.len()))?;
        for (i, header) in self.headers.iter().enumerate() {
            map.serialize_entry(header, &self.record.get(i))?;
        }
        map.end()
    }
}

pub fn chunk_json(headers: &StringRecord, rows: &[StringRecord]) -> Result<Vec<u8>> {
    let objects: Vec<RecordObject> = rows
        .iter()
        .map(|record| RecordObject { headers, record })
        .collect();
    Ok(serde_json::to_vec(&objects)?)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitSummary {
    pub total_rows: usize,
    pub chunks_written: usize,
    pub chunks_skipped: usize,
}

/// Where chunk files go and how the index is persisted after each new chunk.
pub trait ChunkSink {
    fn write_chunk(&mut self, file: &str, data: &[u8]) -> Result<()>;
    fn save_index(&mut self, index: &[ChunkIndexEntry]) -> Result<()>;
}

/// Streams the CSV into chunks of `rows_per_file`. Chunks whose range is
/// already in `index` are not rewritten.
pub fn split_companies<R: Read>(
    input: R,
    settings: &CompaniesSettings,
    index: &mut Vec<ChunkIndexEntry>,
    sink: &mut impl ChunkSink,
) -> Result<SplitSummary> {
    let rows_per_file = settings.rows_per_file.max(1);
    let mut input = BufReader::new(input);
    if input.fill_buf()?.starts_with(UTF8_BOM) {
        input.consume(UTF8_BOM.len());
    }
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(input);
    let headers = reader.headers()?.clone();

    let existing: HashSet<(usize, usize)> = index.iter().map(|e| (e.start, e.end)).collect();
    let out_dir = settings.output_dir.replace('\\', "/");
    let out_dir = out_dir.trim_end_matches('/');

    let mut summary = SplitSummary::default();
    let mut chunk: Vec<StringRecord> = Vec::new();
    let mut chunk_start = 0;

    let mut flush = |chunk: &mut Vec<StringRecord>, start: usize, summary: &mut SplitSummary| -> Result<()> {
        let end = start + chunk.len() - 1;
        if existing.contains(&(start, end)) {
            tracing::info!("⏭️ Rows {} → {} already indexed, skipping", start, end);
            summary.chunks_skipped += 1;
        } else {
            let file = format!("{}/{}", out_dir, chunk_file_name(start, end));
            sink.write_chunk(&file, &chunk_json(&headers, chunk)?)?;
            index.push(ChunkIndexEntry {
                start,
                end,
                file,
                rows: chunk.len(),
            });
            sink.save_index(index)?;
            summary.chunks_written += 1;
            tracing::info!("✅ Written rows {} → {} (total processed: {})", start, end, summary.total_rows);
        }
        chunk.clear();
        Ok(())
    };

    for record in reader.records() {
        chunk.push(record?);
        summary.total_rows += 1;

        if chunk.len() >= rows_per_file {
            flush(&mut chunk, chunk_start, &mut summary)?;
            chunk_start = summary.total_rows;
        }
        if settings.progress_every > 0 && summary.total_rows % settings.progress_every == 0 {
            tracing::info!("… processed {} rows", summary.total_rows);
        }
    }
    if !chunk.is_empty() {
        flush(&mut chunk, chunk_start, &mut summary)?;
    }

    Ok(summary)
}

/// Reads the index file, treating a missing file as empty.
pub fn load_index(path: &Path) -> Result<Vec<ChunkIndexEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct MemorySink {
        files: BTreeMap<String, Vec<u8>>,
        index_saves: usize,
    }

    impl ChunkSink for MemorySink {
        fn write_chunk(&mut self, file: &str, data: &[u8]) -> Result<()> {
            self.files.insert(file.to_string(), data.to_vec());
            Ok(())
        }

        fn save_index(&mut self, _index: &[ChunkIndexEntry]) -> Result<()> {
            self.index_saves += 1;
            Ok(())
        }
    }

    const CSV: &str = "\u{feff}CompanyName,CompanyNumber\nACME LTD,001\nBETA PLC,002\nGAMMA LLP,003\nDELTA,004\nEPSILON,005\n";

    fn settings() -> CompaniesSettings {
        CompaniesSettings {
            output_dir: "out\\subsets/".into(),
            rows_per_file: 2,
            ..CompaniesSettings::default()
        }
    }

    #[test]
    fn test_split_into_chunks() {
        let mut index = Vec::new();
        let mut sink = MemorySink::default();
        let summary = split_companies(CSV.as_bytes(), &settings(), &mut index, &mut sink).unwrap();

        assert_eq!(summary.total_rows, 5);
        assert_eq!(summary.chunks_written, 3);
        assert_eq!(sink.index_saves, 3);
        assert_eq!(
            index.iter().map(|e| (e.start, e.end, e.rows)).collect::<Vec<_>>(),
            vec![(0, 1, 2), (2, 3, 2), (4, 4, 1)]
        );
        assert_eq!(index[0].file, "out/subsets/companies_000000_000001.json");

        let first: serde_json::Value = serde_json::from_slice(&sink.files[&index[0].file]).unwrap();
        assert_eq!(first[0]["CompanyName"], "ACME LTD");
        assert_eq!(first[1]["CompanyNumber"], "002");
    }

    #[test]
    fn test_resume_skips_indexed_chunks() {
        let mut index = vec![ChunkIndexEntry {
            start: 0,
            end: 1,
            file: "out/subsets/companies_000000_000001.json".into(),
            rows: 2,
        }];
        let mut sink = MemorySink::default();
        let summary = split_companies(CSV.as_bytes(), &settings(), &mut index, &mut sink).unwrap();
        assert_eq!(summary.chunks_skipped, 1);
        assert_eq!(summary.chunks_written, 2);
        assert_eq!(index.len(), 3);
        assert!(!sink.files.contains_key("out/subsets/companies_000000_000001.json"));
    }

    #[test]
    fn test_short_records_serialize_null() {
        let headers = StringRecord::from(vec!["a", "b"]);
        let rows = vec![StringRecord::from(vec!["1"])];
        let json: serde_json::Value = serde_json::from_slice(&chunk_json(&headers, &rows).unwrap()).unwrap();
        assert_eq!(json[0]["a"], "1");
        assert!(json[0]["b"].is_null());
    }

    #[test]
    fn test_missing_index_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(load_index(&dir.path().join("index.json")).unwrap().is_empty());
    }
}
