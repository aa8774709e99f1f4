use crate::core::Pipeline;
use crate::utils::error::Result;
use std::time::Instant;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    /// Run extract → transform → load once and return the report path.
    pub async fn run(&self) -> Result<String> {
        let started = Instant::now();
        tracing::info!("🚀 Starting tracker run");

        // Extract
        let phase = Instant::now();
        let raw_data = self.pipeline.extract().await?;
        tracing::info!(
            "📥 Extracted {} records in {:.1?}",
            raw_data.record_count(),
            phase.elapsed()
        );

        // Transform
        let phase = Instant::now();
        let result = self.pipeline.transform(raw_data).await?;
        tracing::info!(
            "🔎 Kept {} projects ({} new) in {:.1?}",
            result.project_count(),
            result.new_count(),
            phase.elapsed()
        );

        // Load
        let phase = Instant::now();
        let output_path = self.pipeline.load(result).await?;
        tracing::info!("📝 Report written in {:.1?}", phase.elapsed());

        tracing::info!("✅ Run finished in {:.1?}", started.elapsed());
        Ok(output_path)
    }
}
