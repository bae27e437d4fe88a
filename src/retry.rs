//! Retry Strategy (C12): per-reason escalation chains with exponential
//! backoff, ported from the production agent's retry controller.

use serde::{Deserialize, Serialize};

use crate::config::RetryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryReason {
    LowConfidence,
    ParseFailure,
    MatchFailure,
    ValidateFailure,
    ApiError,
    Timeout,
    RateLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    ExponentialBackoff,
    StrictMatching,
    LenientMatching,
    AlternativeParser,
    FallbackOnly,
    AskHuman,
    GiveUp,
}

/// Per-reason escalation chain, walked one step per retry attempt.
fn strategy_chain(reason: RetryReason) -> &'static [StrategyType] {
    use StrategyType::*;
    match reason {
        RetryReason::LowConfidence => &[StrictMatching, LenientMatching, AskHuman],
        RetryReason::ParseFailure => &[AlternativeParser, AskHuman],
        RetryReason::MatchFailure => &[FallbackOnly, LenientMatching, AskHuman],
        RetryReason::ValidateFailure => &[FallbackOnly, AskHuman],
        RetryReason::ApiError | RetryReason::Timeout => &[ExponentialBackoff, FallbackOnly],
        RetryReason::RateLimit => &[ExponentialBackoff],
    }
}

/// Next strategy for the given reason at 0-based `attempt`, or `GiveUp` once
/// the chain and the configured retry budget are both exhausted.
pub fn next_strategy(reason: RetryReason, attempt: u32, config: &RetryConfig) -> StrategyType {
    if attempt >= config.max_retries {
        return StrategyType::GiveUp;
    }
    let chain = strategy_chain(reason);
    chain.get(attempt as usize).copied().unwrap_or(StrategyType::GiveUp)
}

/// `delay = min(base * exponential_base^attempt, max_delay) * (0.5 + jitter)`,
/// where `jitter` is the caller-supplied [0,1) sample so the function stays
/// pure and deterministic under test.
pub fn backoff_delay_secs(config: &RetryConfig, attempt: u32, jitter_sample: f64) -> f64 {
    let raw = config.base_delay_secs * config.exponential_base.powi(attempt as i32);
    let capped = raw.min(config.max_delay_secs);
    if config.jitter {
        capped * (0.5 + jitter_sample.clamp(0.0, 1.0) * 0.5)
    } else {
        capped
    }
}

/// What a strategy concretely changes about the next attempt's parameters.
/// The Agent reads this to mutate its working context before retrying.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyEffect {
    pub match_threshold: Option<f64>,
    pub use_ai: Option<bool>,
    pub rotate_encoding: bool,
    pub escalate_to_human: bool,
    pub delay_secs: Option<f64>,
}

pub fn apply_strategy(strategy: StrategyType, config: &RetryConfig, attempt: u32, jitter_sample: f64) -> StrategyEffect {
    match strategy {
        StrategyType::StrictMatching => StrategyEffect { match_threshold: Some(0.90), use_ai: Some(true), ..Default::default() },
        StrategyType::LenientMatching => StrategyEffect { match_threshold: Some(0.50), use_ai: Some(true), ..Default::default() },
        StrategyType::FallbackOnly => StrategyEffect { use_ai: Some(false), ..Default::default() },
        StrategyType::AlternativeParser => StrategyEffect { rotate_encoding: true, ..Default::default() },
        StrategyType::ExponentialBackoff => {
            StrategyEffect { delay_secs: Some(backoff_delay_secs(config, attempt, jitter_sample)), ..Default::default() }
        }
        StrategyType::AskHuman => StrategyEffect { escalate_to_human: true, ..Default::default() },
        StrategyType::GiveUp => StrategyEffect::default(),
    }
}

/// The looser bar a retried LOW_CONFIDENCE attempt is held to versus the
/// Agent's initial 0.80 completion threshold: an attempt that recovers to at
/// least 0.70 confidence is accepted rather than driven through the whole
/// chain to `ask_human`.
pub const LOW_CONFIDENCE_RETRY_SUCCESS_THRESHOLD: f64 = 0.70;

pub fn is_retry_success(reason: RetryReason, confidence: f64) -> bool {
    match reason {
        RetryReason::LowConfidence => confidence >= LOW_CONFIDENCE_RETRY_SUCCESS_THRESHOLD,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RetryConfig {
        RetryConfig { max_retries: 3, base_delay_secs: 1.0, max_delay_secs: 30.0, exponential_base: 2.0, jitter: true }
    }

    #[test]
    fn low_confidence_chain_ends_in_ask_human() {
        let cfg = config();
        assert_eq!(next_strategy(RetryReason::LowConfidence, 0, &cfg), StrategyType::StrictMatching);
        assert_eq!(next_strategy(RetryReason::LowConfidence, 1, &cfg), StrategyType::LenientMatching);
        assert_eq!(next_strategy(RetryReason::LowConfidence, 2, &cfg), StrategyType::AskHuman);
    }

    #[test]
    fn exhausted_retry_budget_gives_up_regardless_of_chain_position() {
        let cfg = config();
        assert_eq!(next_strategy(RetryReason::LowConfidence, 3, &cfg), StrategyType::GiveUp);
    }

    #[test]
    fn backoff_delay_is_capped_at_max_delay() {
        let cfg = config();
        let delay = backoff_delay_secs(&cfg, 10, 0.0);
        assert!(delay <= cfg.max_delay_secs);
    }

    #[test]
    fn backoff_delay_grows_exponentially_before_the_cap() {
        let cfg = config();
        let d0 = backoff_delay_secs(&cfg, 0, 0.0);
        let d1 = backoff_delay_secs(&cfg, 1, 0.0);
        assert!(d1 > d0);
    }

    #[test]
    fn jitter_keeps_delay_within_half_to_full_of_capped_value() {
        let cfg = config();
        let capped = cfg.base_delay_secs * cfg.exponential_base.powi(1);
        let low = backoff_delay_secs(&cfg, 1, 0.0);
        let high = backoff_delay_secs(&cfg, 1, 1.0);
        assert!(low >= capped * 0.5 - 1e-9);
        assert!(high <= capped + 1e-9);
    }

    #[test]
    fn strict_matching_raises_threshold_above_lenient() {
        let cfg = config();
        let strict = apply_strategy(StrategyType::StrictMatching, &cfg, 0, 0.0);
        let lenient = apply_strategy(StrategyType::LenientMatching, &cfg, 0, 0.0);
        assert!(strict.match_threshold.unwrap() > lenient.match_threshold.unwrap());
    }

    #[test]
    fn low_confidence_retry_success_uses_looser_threshold() {
        assert!(is_retry_success(RetryReason::LowConfidence, 0.70));
        assert!(!is_retry_success(RetryReason::LowConfidence, 0.69));
    }
}
