use std::fmt::Write as _;

use veou_provider::{LlmResponse, ProviderError};
use veou_schema::{AiSummary, Review};

const INSTRUCTIONS: &str = "
Please analyze these reviews and provide:
1. Overall Safety Consensus: A 2-3 sentence summary of the general safety perception based on all reviews
2. Key Warnings: List specific safety concerns, warnings, or issues mentioned in the reviews
3. Best Times to Visit: Identify the best times to visit based on safety ratings, crowd levels, and review patterns

Focus on safety-related information and practical advice for travelers.";

const JSON_FORMAT: &str = r#"
Please respond with ONLY a valid JSON object in this exact format (no markdown, no code blocks, just the JSON):
{
    "overallSafetyConsensus": "2-3 sentence summary here",
    "keyWarnings": ["warning 1", "warning 2"],
    "bestTimesToVisit": ["time recommendation 1", "time recommendation 2"]
}"#;

const SNIPPET_CHARS: usize = 200;

/// Prompt asking for a JSON safety summary of `reviews` at `location_name`.
pub fn build_summary_prompt(reviews: &[Review], location_name: &str) -> String {
    let mut prompt = format!(
        "Analyze the following reviews for {location_name} and provide a comprehensive safety summary.\n\nReviews:"
    );
    for (index, review) in reviews.iter().enumerate() {
        let _ = write!(
            prompt,
            "\nReview {}:\n- Time of Day: {}\n- Safety Rating: {}/5\n- Crowd Rating: {}/5\n- Review Text: {}",
            index + 1,
            review.time_of_day,
            review.safety_rating,
            review.crowd_rating,
            review.text,
        );
    }
    prompt.push('\n');
    prompt.push_str(INSTRUCTIONS);
    prompt.push('\n');
    prompt.push_str(JSON_FORMAT);
    prompt
}

/// Strips a surrounding markdown code fence, if any.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let without_open = match trimmed.find('\n') {
        Some(newline) => &trimmed[newline + 1..],
        None => return "",
    };
    let body = match without_open.rfind("```") {
        Some(close) => &without_open[..close],
        None => without_open,
    };
    body.trim()
}

/// Decodes the model reply. The first content block must be text holding
/// the summary object.
pub fn parse_summary_reply(response: &LlmResponse) -> Result<AiSummary, ProviderError> {
    let text = response
        .first_text()
        .ok_or_else(|| ProviderError::Transport("first content block is not text".to_string()))?;
    let body = strip_code_fence(text);
    serde_json::from_str(body).map_err(|e| {
        let snippet: String = body.chars().take(SNIPPET_CHARS).collect();
        ProviderError::Decoding(format!("{e}; reply started with: {snippet}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use veou_provider::ContentBlock;
    use veou_schema::TimeOfDay;

    fn review(id: &str, time: TimeOfDay, safety: u8, crowd: u8, text: &str) -> Review {
        Review {
            id: id.to_string(),
            username: "traveler".to_string(),
            time_of_day: time,
            safety_rating: safety,
            crowd_rating: crowd,
            text: text.to_string(),
            helpful_count: 0,
        }
    }

    #[test]
    fn prompt_lists_reviews_in_order() {
        let prompt = build_summary_prompt(
            &[
                review("1", TimeOfDay::Morning, 5, 2, "Quiet and well lit."),
                review("2", TimeOfDay::Night, 2, 4, "Pickpockets near the exit."),
            ],
            "Central Park",
        );
        assert!(prompt.starts_with(
            "Analyze the following reviews for Central Park and provide a comprehensive safety summary."
        ));
        let first = prompt.find("Review 1:\n- Time of Day: Morning").unwrap();
        let second = prompt
            .find("Review 2:\n- Time of Day: Night\n- Safety Rating: 2/5\n- Crowd Rating: 4/5\n- Review Text: Pickpockets near the exit.")
            .unwrap();
        assert!(first < second);
        assert!(prompt.contains("Focus on safety-related information"));
        assert!(prompt.trim_end().ends_with('}'));
        assert!(prompt.contains("\"bestTimesToVisit\""));
    }

    #[test]
    fn parses_plain_json_reply() {
        let response = LlmResponse::text(
            r#"{"overallSafetyConsensus":"Safe by day.","keyWarnings":["Dark paths"],"bestTimesToVisit":["Morning"]}"#,
        );
        let summary = parse_summary_reply(&response).unwrap();
        assert_eq!(summary.overall_safety_consensus, "Safe by day.");
        assert_eq!(summary.key_warnings, vec!["Dark paths"]);
    }

    #[test]
    fn parses_fenced_reply() {
        let response = LlmResponse::text(
            "```json\n{\"overallSafetyConsensus\":\"ok\",\"keyWarnings\":[],\"bestTimesToVisit\":[],\"extra\":1}\n```",
        );
        let summary = parse_summary_reply(&response).unwrap();
        assert_eq!(summary.overall_safety_consensus, "ok");
        assert!(summary.best_times_to_visit.is_empty());
    }

    #[test]
    fn missing_field_is_a_decoding_error() {
        let response = LlmResponse::text(r#"{"overallSafetyConsensus":"ok"}"#);
        let err = parse_summary_reply(&response).unwrap_err();
        assert!(matches!(err, ProviderError::Decoding(ref m) if m.contains("overallSafetyConsensus")));
    }

    #[test]
    fn non_text_first_block_is_rejected() {
        let response = LlmResponse {
            content: vec![ContentBlock::Other {
                block_type: "tool_use".to_string(),
            }],
            input_tokens: None,
            output_tokens: None,
            stop_reason: None,
        };
        assert!(matches!(
            parse_summary_reply(&response),
            Err(ProviderError::Transport(_))
        ));
    }

    #[test]
    fn strip_code_fence_handles_unterminated_fence() {
        assert_eq!(strip_code_fence("```json\n{}"), "{}");
        assert_eq!(strip_code_fence("  {}  "), "{}");
    }
}
