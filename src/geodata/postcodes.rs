//! ONS postcode directory CSVs to a compact postcode → coordinate lookup.

use crate::domain::model::{PostcodeLocation, PostcodeLookup};
use crate::utils::error::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OnspdRow {
    pcd: String,
    lat: String,
    long: String,
    doterm: String,
}

/// Uppercase with all whitespace removed.
pub fn normalize_postcode(pcd: &str) -> String {
    pcd.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// Adds the live, geocoded rows of one CSV to `lookup`, returning how many
/// were accepted.
pub fn read_postcode_csv(data: &[u8], lookup: &mut PostcodeLookup) -> Result<usize> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(data);
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(data);

    let mut accepted = 0;
    for row in reader.deserialize::<OnspdRow>() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!("⚠️ Skipping malformed postcode row: {}", e);
                continue;
            }
        };
        let (pcd, lat, lon) = (row.pcd.trim(), row.lat.trim(), row.long.trim());
        if pcd.is_empty() || lat.is_empty() || lon.is_empty() || !row.doterm.trim().is_empty() {
            continue;
        }
        let (Ok(lat), Ok(lon)) = (lat.parse::<f64>(), lon.parse::<f64>()) else {
            continue;
        };
        lookup.insert(
            normalize_postcode(pcd),
            PostcodeLocation {
                lat: round6(lat),
                lon: round6(lon),
            },
        );
        accepted += 1;
    }
    Ok(accepted)
}

/// `*.csv` files in `dir`, sorted by name.
pub fn csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Leading one or two ASCII uppercase letters of a normalized postcode.
pub fn area_prefix(postcode: &str) -> Option<&str> {
    let len = postcode
        .bytes()
        .take(2)
        .take_while(u8::is_ascii_uppercase)
        .count();
    (len > 0).then(|| &postcode[..len])
}

/// Buckets the lookup by area prefix. Keys without a letter prefix are dropped.
pub fn split_by_area(lookup: &PostcodeLookup) -> BTreeMap<String, PostcodeLookup> {
    let mut buckets: BTreeMap<String, PostcodeLookup> = BTreeMap::new();
    for (key, location) in lookup {
        let Some(prefix) = area_prefix(key) else {
            tracing::debug!("No area prefix for {}", key);
            continue;
        };
        buckets
            .entry(prefix.to_string())
            .or_default()
            .insert(key.clone(), *location);
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "pcd,doterm,lat,long,oa21\n\
        BS1 5AH,,51.449512345,-2.5784,E1\n\
        BS1 6XX,202001,51.45,-2.58,E1\n\
        SW1A 1AA,,,-0.1419,E2\n\
        SW1A 2AA,,51.5034,,E2\n\
        ,,51.0,-1.0,E3\n\
        ZZ99 9ZZ,,not-a-number,-1.0,E4\n\
        sw1a  1aa,,51.501009,-0.141588,E5\n";

    #[test]
    fn test_excludes_terminated_and_blank_rows() {
        let mut lookup = PostcodeLookup::new();
        let accepted = read_postcode_csv(CSV.as_bytes(), &mut lookup).unwrap();
        assert_eq!(accepted, 2);
        assert_eq!(lookup.len(), 2);
        assert_eq!(lookup["BS15AH"], PostcodeLocation { lat: 51.449512, lon: -2.5784 });
        assert!(lookup.contains_key("SW1A1AA"));
        assert!(!lookup.contains_key("BS16XX"));
    }

    #[test]
    fn test_bom_header() {
        let mut lookup = PostcodeLookup::new();
        let data = [b"\xEF\xBB\xBF".as_slice(), b"pcd,lat,long\nAB1 0AA,57.1,-2.2\n"].concat();
        read_postcode_csv(&data, &mut lookup).unwrap();
        assert!(lookup.contains_key("AB10AA"));
    }

    #[test]
    fn test_split_by_area() {
        let mut lookup = PostcodeLookup::new();
        for key in ["BS15AH", "B11AA", "SW1A1AA", "9XX"] {
            lookup.insert(key.into(), PostcodeLocation { lat: 0.0, lon: 0.0 });
        }
        let buckets = split_by_area(&lookup);
        assert_eq!(buckets.keys().collect::<Vec<_>>(), vec!["B", "BS", "SW"]);
        assert_eq!(buckets["B"].len(), 1);
        assert_eq!(area_prefix("9XX"), None);
    }
}
