//! Runtime configuration (spec.md §6 configuration table). Loaded once at
//! startup; passed down by reference, never a global singleton.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    /// score >= this -> auto-complete without human review.
    pub auto_complete: f64,
    /// score >= this and < auto_complete -> apply corrections but flag for review.
    pub auto_correct: f64,
    /// score below auto_correct -> needs_review / needs_human.
    pub needs_review: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self { auto_complete: 0.95, auto_correct: 0.80, needs_review: 0.50 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_secs: f64,
    pub max_delay_secs: f64,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_secs: 1.0,
            max_delay_secs: 30.0,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer2Config {
    /// Percent tolerance for diagnostic-answer vs. computed-aggregate reconciliation.
    pub tolerance_percent: f64,
}

impl Default for Layer2Config {
    fn default() -> Self {
        Self { tolerance_percent: 5.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    pub max_rows: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self { max_rows: 50_000 }
    }
}

/// Top-level configuration, assembled by the server binary from defaults,
/// an optional config file, and environment overrides (CLI layer), then
/// threaded through to the Agent and its components by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// ReACT loop bound (spec.md §4.11). Default 5.
    pub max_iterations: u32,
    /// Whether an `LlmClient` is wired in at all. When false, the Header
    /// Matcher and Layer-AI Validator both skip straight to their non-AI path.
    pub llm_enabled: bool,
    pub confidence: ConfidenceThresholds,
    pub retry: RetryConfig,
    pub layer2: Layer2Config,
    pub parser: ParserConfig,
    pub case_store_path: Option<String>,
    pub knowledge_base_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            llm_enabled: false,
            confidence: ConfidenceThresholds::default(),
            retry: RetryConfig::default(),
            layer2: Layer2Config::default(),
            parser: ParserConfig::default(),
            case_store_path: None,
            knowledge_base_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_are_ordered() {
        let c = ConfidenceThresholds::default();
        assert!(c.auto_complete >= c.auto_correct);
        assert!(c.needs_review < c.auto_correct);
    }

    #[test]
    fn default_config_disables_llm() {
        let config = Config::default();
        assert!(!config.llm_enabled);
        assert_eq!(config.max_iterations, 5);
    }
}
