use thiserror::Error;

/// Failures talking to the text-completion endpoint. The `Display` text is
/// what the summary panel shows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("API key is missing. Set ANTHROPIC_API_KEY or summary.api_key in the config file")]
    MissingCredential,

    #[error("failed to create API request: {0}")]
    InvalidRequest(String),

    #[error("invalid response from API: {0}")]
    Transport(String),

    #[error("API error: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(u16),

    #[error("failed to decode response: {0}")]
    Decoding(String),
}

impl ProviderError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Api { status, .. } | ProviderError::Http(status) => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_user_facing() {
        assert_eq!(ProviderError::Http(503).to_string(), "HTTP error: 503");
        assert_eq!(
            ProviderError::Api {
                status: 400,
                message: "messages: field required".into()
            }
            .to_string(),
            "API error: messages: field required"
        );
        assert!(ProviderError::MissingCredential
            .to_string()
            .contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn status_only_for_http_kinds() {
        assert_eq!(ProviderError::Http(500).status(), Some(500));
        assert_eq!(
            ProviderError::Api {
                status: 429,
                message: "slow down".into()
            }
            .status(),
            Some(429)
        );
        assert_eq!(ProviderError::Decoding("x".into()).status(), None);
    }
}
