use crate::domain::model::RecordCount;
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn exists(&self, path: &str) -> impl std::future::Future<Output = bool> + Send;
}

/// A read → transform → write batch job driven by [`crate::core::etl::EtlEngine`].
#[async_trait]
pub trait Pipeline: Send + Sync {
    type Extracted: RecordCount + Send;
    type Transformed: RecordCount + Send;

    fn name(&self) -> &str;
    async fn extract(&self) -> Result<Self::Extracted>;
    async fn transform(&self, data: Self::Extracted) -> Result<Self::Transformed>;
    /// Writes the result and returns the primary output path.
    async fn load(&self, result: Self::Transformed) -> Result<String>;
}
