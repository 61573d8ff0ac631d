use crate::domain::model::PostcodeLookup;
use crate::domain::ports::{Pipeline, Storage};
use crate::geodata::postcodes::{csv_files, read_postcode_csv, split_by_area};
use crate::utils::error::Result;
use std::path::PathBuf;

/// Raw bytes of one source CSV.
pub struct SourceFile {
    pub name: String,
    pub data: Vec<u8>,
}

/// Builds the postcode lookup from a directory of ONS CSVs and writes it as
/// compact JSON.
pub struct PostcodePipeline<S: Storage> {
    storage: S,
    input_dir: PathBuf,
    output: String,
}

impl<S: Storage> PostcodePipeline<S> {
    pub fn new(storage: S, input_dir: impl Into<PathBuf>, output: impl Into<String>) -> Self {
        Self {
            storage,
            input_dir: input_dir.into(),
            output: output.into(),
        }
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for PostcodePipeline<S> {
    type Extracted = Vec<SourceFile>;
    type Transformed = PostcodeLookup;

    fn name(&self) -> &str {
        "postcode-lookup"
    }

    async fn extract(&self) -> Result<Vec<SourceFile>> {
        let mut files = Vec::new();
        for path in csv_files(&self.input_dir)? {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            files.push(SourceFile {
                name,
                data: tokio::fs::read(&path).await?,
            });
        }
        Ok(files)
    }

    async fn transform(&self, files: Vec<SourceFile>) -> Result<PostcodeLookup> {
        let total = files.len();
        let mut lookup = PostcodeLookup::new();
        for (i, file) in files.iter().enumerate() {
            let accepted = read_postcode_csv(&file.data, &mut lookup)?;
            tracing::info!("[{}/{}] {}: {} postcodes", i + 1, total, file.name, accepted);
        }
        Ok(lookup)
    }

    async fn load(&self, lookup: PostcodeLookup) -> Result<String> {
        let data = serde_json::to_vec(&lookup)?;
        self.storage.write_file(&self.output, &data).await?;
        tracing::info!("{} postcodes, {:.1} MB", lookup.len(), data.len() as f64 / 1_048_576.0);
        Ok(self.output.clone())
    }
}

/// Writes `<out_dir>/<prefix>.json` per area and a sorted prefix list to
/// `index_file`. Returns the prefixes.
pub async fn write_area_split<S: Storage>(
    storage: &S,
    lookup: &PostcodeLookup,
    out_dir: &str,
    index_file: &str,
) -> Result<Vec<String>> {
    let buckets = split_by_area(lookup);
    let out_dir = out_dir.trim_end_matches('/');

    for (prefix, bucket) in &buckets {
        let data = serde_json::to_vec(bucket)?;
        storage
            .write_file(&format!("{}/{}.json", out_dir, prefix), &data)
            .await?;
        tracing::info!("  {}.json: {:>6} postcodes ({} KB)", prefix, bucket.len(), data.len() / 1024);
    }

    let index: Vec<String> = buckets.into_keys().collect();
    storage
        .write_file(index_file, &serde_json::to_vec(&index)?)
        .await?;
    Ok(index)
}

/// Loads a lookup written by [`PostcodePipeline`].
pub async fn read_lookup<S: Storage>(storage: &S, path: &str) -> Result<PostcodeLookup> {
    Ok(serde_json::from_slice(&storage.read_file(path).await?)?)
}
