use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

fn default_search_debounce_ms() -> u64 {
    150
}

fn default_short_query_max_chars() -> usize {
    2
}

fn default_autocomplete_limit() -> usize {
    6
}

fn default_popular_mix_limit() -> usize {
    3
}

fn default_search_span() -> f64 {
    0.1
}

fn default_popular_keywords() -> Vec<String> {
    [
        "restaurant",
        "café",
        "coffee",
        "bar",
        "pub",
        "park",
        "theater",
        "cinema",
        "mall",
        "shopping",
        "museum",
        "hotel",
        "gym",
        "pharmacy",
        "hospital",
        "gas station",
        "bank",
        "atm",
        "grocery",
        "supermarket",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Debounced query controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_debounce_ms")]
    pub debounce_ms: u64,
    /// Queries up to this many characters are answered from the popular list.
    #[serde(default = "default_short_query_max_chars")]
    pub short_query_max_chars: usize,
    #[serde(default = "default_autocomplete_limit")]
    pub autocomplete_limit: usize,
    /// Popular places mixed into autocomplete results.
    #[serde(default = "default_popular_mix_limit")]
    pub popular_mix_limit: usize,
    #[serde(default = "default_search_span")]
    pub region_span_degrees: f64,
    #[serde(default = "default_popular_keywords")]
    pub popular_keywords: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_search_debounce_ms(),
            short_query_max_chars: default_short_query_max_chars(),
            autocomplete_limit: default_autocomplete_limit(),
            popular_mix_limit: default_popular_mix_limit(),
            region_span_degrees: default_search_span(),
            popular_keywords: default_popular_keywords(),
        }
    }
}

impl SearchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn default_popular_query() -> String {
    "popular places".to_string()
}

fn default_aggregator_span() -> f64 {
    0.05
}

fn default_popular_limit() -> usize {
    10
}

fn default_categories() -> Vec<String> {
    ["restaurant", "cafe", "park", "museum", "shopping"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_per_category_limit() -> usize {
    3
}

fn default_max_results() -> usize {
    15
}

fn default_inter_request_delay_ms() -> u64 {
    100
}

fn default_refresh_debounce_ms() -> u64 {
    500
}

/// Nearby-place aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_popular_query")]
    pub popular_query: String,
    #[serde(default = "default_aggregator_span")]
    pub region_span_degrees: f64,
    #[serde(default = "default_popular_limit")]
    pub popular_limit: usize,
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
    #[serde(default = "default_per_category_limit")]
    pub per_category_limit: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_inter_request_delay_ms")]
    pub inter_request_delay_ms: u64,
    /// Quiet period for map-panning refreshes.
    #[serde(default = "default_refresh_debounce_ms")]
    pub refresh_debounce_ms: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            popular_query: default_popular_query(),
            region_span_degrees: default_aggregator_span(),
            popular_limit: default_popular_limit(),
            categories: default_categories(),
            per_category_limit: default_per_category_limit(),
            max_results: default_max_results(),
            inter_request_delay_ms: default_inter_request_delay_ms(),
            refresh_debounce_ms: default_refresh_debounce_ms(),
        }
    }
}

impl AggregatorConfig {
    pub fn inter_request_delay(&self) -> Duration {
        Duration::from_millis(self.inter_request_delay_ms)
    }

    pub fn refresh_debounce(&self) -> Duration {
        Duration::from_millis(self.refresh_debounce_ms)
    }
}

fn default_api_base() -> String {
    veou_provider::anthropic::DEFAULT_API_BASE.to_string()
}

fn default_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_summary_debounce_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    60
}

/// Review summary settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_summary_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_true")]
    pub skip_debounce_on_first_load: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            debounce_ms: default_summary_debounce_ms(),
            skip_debounce_on_first_load: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl SummaryConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Configured key, else the environment. Empty when neither is set;
    /// the provider rejects that before any request goes out.
    pub fn resolve_api_key(&self) -> String {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VeouConfig {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
}

impl VeouConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: VeouConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.aggregator.max_results >= self.aggregator.popular_limit,
            "aggregator.max_results ({}) must be at least aggregator.popular_limit ({})",
            self.aggregator.max_results,
            self.aggregator.popular_limit
        );
        anyhow::ensure!(
            self.search.region_span_degrees > 0.0 && self.aggregator.region_span_degrees > 0.0,
            "region spans must be positive"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = VeouConfig::default();
        assert_eq!(config.search.debounce(), Duration::from_millis(150));
        assert_eq!(config.search.short_query_max_chars, 2);
        assert_eq!(config.search.popular_keywords.len(), 20);
        assert_eq!(config.aggregator.popular_limit, 10);
        assert_eq!(config.aggregator.max_results, 15);
        assert_eq!(config.aggregator.categories.len(), 5);
        assert_eq!(config.aggregator.inter_request_delay(), Duration::from_millis(100));
        assert_eq!(config.summary.debounce(), Duration::from_millis(500));
        assert_eq!(config.summary.max_tokens, 1024);
        assert!(config.summary.skip_debounce_on_first_load);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = VeouConfig::from_yaml(
            r#"
search:
  debounce_ms: 200
summary:
  model: claude-3-5-haiku-latest
"#,
        )
        .unwrap();
        assert_eq!(config.search.debounce_ms, 200);
        assert_eq!(config.search.autocomplete_limit, 6);
        assert_eq!(config.summary.model, "claude-3-5-haiku-latest");
        assert_eq!(config.aggregator.popular_query, "popular places");
    }

    #[test]
    fn empty_yaml_is_default() {
        let config = VeouConfig::from_yaml("  \n").unwrap();
        assert_eq!(config.aggregator.max_results, 15);
    }

    #[test]
    fn rejects_inconsistent_limits() {
        let err = VeouConfig::from_yaml(
            r#"
aggregator:
  popular_limit: 20
  max_results: 15
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_results"));
    }

    #[test]
    fn load_reads_file_and_reports_path_on_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "aggregator:\n  categories: [bar, pub]").unwrap();
        let config = VeouConfig::load(file.path()).unwrap();
        assert_eq!(config.aggregator.categories, vec!["bar", "pub"]);

        let missing = file.path().with_extension("missing");
        let err = VeouConfig::load(&missing).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn configured_api_key_wins() {
        let summary = SummaryConfig {
            api_key: Some("sk-from-config".into()),
            ..SummaryConfig::default()
        };
        assert_eq!(summary.resolve_api_key(), "sk-from-config");
    }
}
