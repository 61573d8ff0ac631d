use crate::core::template::{load_rows, run_template, ImportTemplate, MatchRuleSet};
use crate::domain::model::{Graph, GraphMetadata, Row};
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::error::Result;
use std::path::PathBuf;
use std::sync::Mutex;

/// Runs one import specification over one input file and writes the graph
/// as pretty JSON.
pub struct TemplatePipeline<S: Storage> {
    storage: S,
    template: ImportTemplate,
    match_rules: MatchRuleSet,
    input: PathBuf,
    output: String,
    last_metadata: Mutex<Option<GraphMetadata>>,
}

impl<S: Storage> TemplatePipeline<S> {
    pub fn new(
        storage: S,
        template: ImportTemplate,
        match_rules: MatchRuleSet,
        input: impl Into<PathBuf>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            template,
            match_rules,
            input: input.into(),
            output: output.into(),
            last_metadata: Mutex::new(None),
        }
    }

    /// Metadata of the most recently loaded graph.
    pub fn last_metadata(&self) -> Option<GraphMetadata> {
        self.last_metadata.lock().ok().and_then(|m| m.clone())
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for TemplatePipeline<S> {
    type Extracted = Vec<Row>;
    type Transformed = Graph;

    fn name(&self) -> &str {
        "template-etl"
    }

    async fn extract(&self) -> Result<Vec<Row>> {
        tracing::debug!(
            "Loading {} with template {}",
            self.input.display(),
            self.template.file_name
        );
        load_rows(&self.template, &self.input)
    }

    async fn transform(&self, rows: Vec<Row>) -> Result<Graph> {
        if !self.match_rules.is_empty() {
            tracing::debug!("Applying {} match rules", self.match_rules.len());
        }
        Ok(run_template(&self.template, &rows, &self.match_rules))
    }

    async fn load(&self, graph: Graph) -> Result<String> {
        let data = serde_json::to_vec_pretty(&graph)?;
        self.storage.write_file(&self.output, &data).await?;

        if let Ok(mut slot) = self.last_metadata.lock() {
            *slot = Some(graph.metadata);
        }
        Ok(self.output.clone())
    }
}
