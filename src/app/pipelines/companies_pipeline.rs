use crate::config::cli::write_file_sync;
use crate::domain::model::{ChunkIndexEntry, RecordCount};
use crate::domain::ports::{Pipeline, Storage};
use crate::geodata::companies::{load_index, split_companies, ChunkSink, CompaniesSettings, SplitSummary};
use crate::utils::error::{PrepError, Result};
use std::fs::File;
use std::path::{Path, PathBuf};

/// The index after a split, with the run's counters.
pub struct SplitOutcome {
    pub index: Vec<ChunkIndexEntry>,
    pub summary: SplitSummary,
}

impl RecordCount for SplitOutcome {
    fn record_count(&self) -> usize {
        self.index.len()
    }
}

/// Writes chunk files and the index straight to disk, so an interrupted
/// split resumes from the last saved index.
struct FileSink<'a> {
    index_file: &'a Path,
}

impl ChunkSink for FileSink<'_> {
    fn write_chunk(&mut self, file: &str, data: &[u8]) -> Result<()> {
        write_file_sync(Path::new(file), data)
    }

    fn save_index(&mut self, index: &[ChunkIndexEntry]) -> Result<()> {
        write_file_sync(self.index_file, &serde_json::to_vec_pretty(index)?)
    }
}

/// Splits the Companies House bulk CSV into indexed JSON chunks.
///
/// Extract reads the existing index, transform streams the CSV (chunk files
/// and the index are written as each chunk completes) and load writes the
/// final index through storage.
pub struct CompaniesPipeline<S: Storage> {
    storage: S,
    input: PathBuf,
    settings: CompaniesSettings,
}

impl<S: Storage> CompaniesPipeline<S> {
    pub fn new(storage: S, input: impl Into<PathBuf>, settings: CompaniesSettings) -> Self {
        Self {
            storage,
            input: input.into(),
            settings,
        }
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for CompaniesPipeline<S> {
    type Extracted = Vec<ChunkIndexEntry>;
    type Transformed = SplitOutcome;

    fn name(&self) -> &str {
        "companies-split"
    }

    async fn extract(&self) -> Result<Vec<ChunkIndexEntry>> {
        let index = load_index(Path::new(&self.settings.index_file))?;
        if !index.is_empty() {
            tracing::info!("Resuming with {} indexed chunks", index.len());
        }
        Ok(index)
    }

    async fn transform(&self, index: Vec<ChunkIndexEntry>) -> Result<SplitOutcome> {
        let input = self.input.clone();
        let settings = self.settings.clone();

        tokio::task::spawn_blocking(move || -> Result<SplitOutcome> {
            let mut index = index;
            let mut sink = FileSink {
                index_file: Path::new(&settings.index_file),
            };
            let summary = split_companies(File::open(&input)?, &settings, &mut index, &mut sink)?;
            Ok(SplitOutcome { index, summary })
        })
        .await
        .map_err(|e| PrepError::processing(format!("split task failed: {}", e)))?
    }

    async fn load(&self, outcome: SplitOutcome) -> Result<String> {
        self.storage
            .write_file(&self.settings.index_file, &serde_json::to_vec_pretty(&outcome.index)?)
            .await?;
        tracing::info!(
            "🎉 {} rows, {} chunks written, {} skipped",
            outcome.summary.total_rows,
            outcome.summary.chunks_written,
            outcome.summary.chunks_skipped
        );
        Ok(self.settings.index_file.clone())
    }
}
