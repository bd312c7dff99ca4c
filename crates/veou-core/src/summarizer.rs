use std::sync::Arc;

use thiserror::Error;
use veou_provider::{AnthropicProvider, LlmProvider, LlmRequest, ProviderError};
use veou_schema::{AiSummary, Review};

use crate::config::SummaryConfig;
use crate::prompt::{build_summary_prompt, parse_summary_reply};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SummaryError {
    #[error("No reviews available to generate summary")]
    EmptyInput,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Turns a review set into an [`AiSummary`] with one model call.
#[derive(Clone)]
pub struct ReviewSummarizer {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
}

impl ReviewSummarizer {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens,
        }
    }

    /// Anthropic-backed summarizer from config; the key comes from
    /// [`SummaryConfig::resolve_api_key`].
    pub fn from_config(config: &SummaryConfig) -> Self {
        let provider = AnthropicProvider::with_timeout(
            config.resolve_api_key(),
            config.api_base.clone(),
            config.timeout(),
        );
        Self::new(Arc::new(provider), config.model.clone(), config.max_tokens)
    }

    pub async fn generate(
        &self,
        reviews: &[Review],
        location_name: &str,
    ) -> Result<AiSummary, SummaryError> {
        if reviews.is_empty() {
            return Err(SummaryError::EmptyInput);
        }
        let prompt = build_summary_prompt(reviews, location_name);
        let request = LlmRequest::simple(self.model.clone(), self.max_tokens, prompt);

        tracing::debug!(
            reviews = reviews.len(),
            location = location_name,
            model = %self.model,
            "requesting review summary"
        );
        let response = self.provider.chat(request).await?;
        if let (Some(input), Some(output)) = (response.input_tokens, response.output_tokens) {
            tracing::debug!(input_tokens = input, output_tokens = output, "summary usage");
        }
        Ok(parse_summary_reply(&response)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use veou_provider::LlmResponse;
    use veou_schema::TimeOfDay;

    struct RecordingProvider {
        requests: Mutex<Vec<LlmRequest>>,
        reply: Result<LlmResponse, ProviderError>,
    }

    #[async_trait]
    impl LlmProvider for RecordingProvider {
        async fn chat(&self, request: LlmRequest) -> Result<LlmResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            self.reply.clone()
        }
    }

    fn reviews() -> Vec<Review> {
        vec![Review {
            id: "r1".into(),
            username: "ana".into(),
            time_of_day: TimeOfDay::Evening,
            safety_rating: 4,
            crowd_rating: 3,
            text: "Busy but fine.".into(),
            helpful_count: 2,
        }]
    }

    #[tokio::test]
    async fn sends_single_user_turn_with_configured_model() {
        let provider = Arc::new(RecordingProvider {
            requests: Mutex::new(Vec::new()),
            reply: Ok(LlmResponse::text(
                r#"{"overallSafetyConsensus":"Fine.","keyWarnings":[],"bestTimesToVisit":["Evening"]}"#,
            )),
        });
        let summarizer = ReviewSummarizer::new(provider.clone(), "claude-test", 512);

        let summary = summarizer.generate(&reviews(), "Harbor").await.unwrap();
        assert_eq!(summary.best_times_to_visit, vec!["Evening"]);

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "claude-test");
        assert_eq!(requests[0].max_tokens, 512);
        assert_eq!(requests[0].messages[0].role, "user");
        assert!(requests[0].messages[0].content.contains("reviews for Harbor"));
    }

    #[tokio::test]
    async fn empty_input_makes_no_call() {
        let provider = Arc::new(RecordingProvider {
            requests: Mutex::new(Vec::new()),
            reply: Err(ProviderError::Http(500)),
        });
        let summarizer = ReviewSummarizer::new(provider.clone(), "m", 1);
        assert_eq!(
            summarizer.generate(&[], "Harbor").await,
            Err(SummaryError::EmptyInput)
        );
        assert!(provider.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn provider_errors_pass_through() {
        let provider = Arc::new(RecordingProvider {
            requests: Mutex::new(Vec::new()),
            reply: Err(ProviderError::Api {
                status: 429,
                message: "rate limited".into(),
            }),
        });
        let summarizer = ReviewSummarizer::new(provider, "m", 1);
        let err = summarizer.generate(&reviews(), "Harbor").await.unwrap_err();
        assert_eq!(err.to_string(), "API error: rate limited");
    }

    #[tokio::test]
    async fn missing_key_fails_before_network() {
        let provider = Arc::new(AnthropicProvider::new("", "http://127.0.0.1:9"));
        let summarizer = ReviewSummarizer::new(provider, "m", 16);
        assert_eq!(
            summarizer.generate(&reviews(), "Harbor").await,
            Err(SummaryError::Provider(ProviderError::MissingCredential))
        );
    }
}
