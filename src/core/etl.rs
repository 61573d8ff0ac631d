use crate::domain::model::RecordCount;
use crate::domain::ports::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub async fn run(&self) -> Result<String> {
        let name = self.pipeline.name();
        tracing::info!("🚀 Starting {}", name);
        self.monitor.log_stats("Start");

        tracing::info!("📥 Extracting...");
        let raw = self.pipeline.extract().await?;
        tracing::info!("Extracted {} records", raw.record_count());
        self.monitor.log_stats("Extract");

        tracing::info!("🔄 Transforming...");
        let transformed = self.pipeline.transform(raw).await?;
        tracing::info!("Transformed into {} records", transformed.record_count());
        self.monitor.log_stats("Transform");

        tracing::info!("💾 Loading...");
        let output_path = self.pipeline.load(transformed).await?;
        tracing::info!("📁 Output saved to: {}", output_path);
        self.monitor.log_stats("Load");
        self.monitor.log_final_stats();

        Ok(output_path)
    }
}
