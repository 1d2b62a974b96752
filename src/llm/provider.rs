use async_trait::async_trait;

use crate::core::errors::ApiError;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// model identifier sent upstream
    fn model_name(&self) -> &str;

    /// single non-streaming completion over retrieved context
    async fn complete(&self, system: &str, context: &str, question: &str)
        -> Result<String, ApiError>;
}
