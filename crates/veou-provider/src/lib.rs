pub mod anthropic;
pub mod error;
pub mod types;

use async_trait::async_trait;

pub use anthropic::AnthropicProvider;
pub use error::ProviderError;
pub use types::*;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse, ProviderError>;
}
