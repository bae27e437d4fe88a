//! Header Matcher (C4): map customer headers to schema fields via case memory →
//! LLM → lexical fallback, executed in exactly the order spec.md §4.4 describes.

use std::future::Future;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::case_store::CaseStore;
use crate::config::{Config, RetryConfig};
use crate::error::Error;
use crate::llm::LlmClient;
use crate::retry::{self, RetryReason, StrategyType};
use crate::schema::{normalize, SheetAffinity, StandardSchema};

const IGNORED_KEYWORDS: [&str; 7] =
    ["참고사항", "비고", "메모", "note", "remark", "comment", "unnamed"];

/// Origin tag on a match: memory, the model, the lexical fallback, or deliberately
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Ignored,
    FewShot,
    Ai,
    LexicalFallback,
    Unmapped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderMatch {
    pub source: String,
    pub target: Option<String>,
    pub confidence: f64,
    pub provenance: Provenance,
}

impl HeaderMatch {
    fn ignored(source: &str) -> Self {
        Self { source: source.to_string(), target: None, confidence: 0.0, provenance: Provenance::Ignored }
    }

    fn unmapped(source: &str) -> Self {
        Self { source: source.to_string(), target: None, confidence: 0.0, provenance: Provenance::Unmapped }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchSet {
    pub columns: Vec<String>,
    pub matches: Vec<HeaderMatch>,
    pub warnings: Vec<String>,
    pub used_ai: bool,
    pub used_fewshot: bool,
}

/// Mean of per-match confidence over active (non-ignored) matches, minus 0.05 per
/// unmapped header — the quantity the Agent's Think step consults.
pub fn match_confidence(match_set: &MatchSet) -> f64 {
    let active: Vec<&HeaderMatch> =
        match_set.matches.iter().filter(|m| m.provenance != Provenance::Ignored).collect();
    if active.is_empty() {
        return 1.0;
    }
    let mean: f64 = active.iter().map(|m| m.confidence).sum::<f64>() / active.len() as f64;
    let unmapped_count = active.iter().filter(|m| m.provenance == Provenance::Unmapped).count();
    (mean - 0.05 * unmapped_count as f64).max(0.0)
}

fn is_ignored(header: &str) -> bool {
    let norm = normalize(header);
    norm.is_empty() || IGNORED_KEYWORDS.iter().any(|kw| norm == *kw || norm.contains(kw))
}

/// Stable edit-distance ratio in [0,1], Levenshtein-normalized.
pub fn string_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let distance = levenshtein(&a, &b);
    let max_len = a.len().max(b.len()) as f64;
    if max_len == 0.0 {
        1.0
    } else {
        1.0 - (distance as f64 / max_len)
    }
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let (m, n) = (a.len(), b.len());
    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];
    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[n]
}

const LEXICAL_ACCEPT_THRESHOLD: f64 = 0.65;

fn lexical_best_match(header: &str, candidates: &[(&str, &str)]) -> Option<(String, f64)> {
    let header_norm = normalize(header);
    let mut best: Option<(String, f64)> = None;
    for (canonical, candidate) in candidates {
        let score = string_similarity(&header_norm, &normalize(candidate));
        if best.as_ref().map(|(_, s)| score > *s).unwrap_or(true) {
            best = Some((canonical.to_string(), score));
        }
    }
    best.filter(|(_, score)| *score >= LEXICAL_ACCEPT_THRESHOLD)
}

fn lexical_fallback(headers: &[String], schema: &StandardSchema, sheet: SheetAffinity) -> (Vec<HeaderMatch>, Vec<String>) {
    let fields = schema.fields(sheet);
    let mut candidates: Vec<(&str, &str)> = Vec::new();
    for f in &fields {
        candidates.push((f.name.as_str(), f.name.as_str()));
        for alias in &f.aliases {
            candidates.push((f.name.as_str(), alias.as_str()));
        }
    }

    let mut matches = Vec::new();
    let mut warnings = Vec::new();
    for h in headers {
        match lexical_best_match(h, &candidates) {
            Some((target, score)) => matches.push(HeaderMatch {
                source: h.clone(),
                target: Some(target),
                confidence: (score * 1000.0).round() / 1000.0,
                provenance: Provenance::LexicalFallback,
            }),
            None => {
                matches.push(HeaderMatch::unmapped(h));
                warnings.push(format!("unmapped header: {h}"));
            }
        }
    }
    (matches, warnings)
}

/// Pseudo-random [0,1) sample from wall-clock jitter. The Retry Strategy's
/// backoff formula only needs enough spread to avoid a thundering herd, not
/// cryptographic randomness, so the nanosecond component of the current time
/// stands in for a dedicated RNG dependency.
fn jitter_sample() -> f64 {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.subsec_nanos()).unwrap_or(0);
    (nanos % 1_000_000) as f64 / 1_000_000.0
}

/// Retry an LLM call through the Retry Strategy's ApiError/Timeout/RateLimit
/// chain, sleeping for the prescribed backoff between attempts. Any non-transient
/// error (malformed JSON, logical error) is returned immediately without retry.
async fn call_with_transient_retry<F, Fut, T>(config: &RetryConfig, mut call: F) -> crate::error::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::error::Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match call().await {
            Ok(v) => return Ok(v),
            Err(Error::Transient { reason, message }) => {
                let retry_reason = match reason {
                    crate::error::TransientReason::ApiError => RetryReason::ApiError,
                    crate::error::TransientReason::Timeout => RetryReason::Timeout,
                    crate::error::TransientReason::RateLimit => RetryReason::RateLimit,
                };
                match retry::next_strategy(retry_reason, attempt, config) {
                    StrategyType::ExponentialBackoff => {
                        let delay = retry::backoff_delay_secs(config, attempt, jitter_sample());
                        tokio::time::sleep(std::time::Duration::from_secs_f64(delay)).await;
                        attempt += 1;
                    }
                    _ => return Err(Error::Transient { reason, message }),
                }
            }
            Err(other) => return Err(other),
        }
    }
}

/// Canonical matching algorithm, §4.4.
pub async fn match_headers(
    headers: &[String],
    sheet: SheetAffinity,
    schema: &StandardSchema,
    case_store: &CaseStore,
    llm: Option<&dyn LlmClient>,
    config: &Config,
) -> MatchSet {
    // Step 1: partition ignored vs active, preserving original order for later merge.
    let mut slots: Vec<Option<HeaderMatch>> = vec![None; headers.len()];
    let mut active_indices: Vec<usize> = Vec::new();

    for (i, h) in headers.iter().enumerate() {
        if is_ignored(h) {
            slots[i] = Some(HeaderMatch::ignored(h));
        } else {
            active_indices.push(i);
        }
    }

    // Step 2: case-store direct hits.
    let mut remaining: Vec<usize> = Vec::new();
    for &i in &active_indices {
        let h = &headers[i];
        if let Ok(cases) = case_store.find_by_header(h) {
            if let Some(case) = cases.first() {
                let normalized_h = normalize(h);
                if let Some(m) = case
                    .normalized_headers
                    .iter()
                    .position(|nh| *nh == normalized_h)
                    .and_then(|pos| case.matches.get(pos))
                {
                    if let Some(target) = &m.target {
                        slots[i] = Some(HeaderMatch {
                            source: h.clone(),
                            target: Some(target.clone()),
                            confidence: 0.95,
                            provenance: Provenance::FewShot,
                        });
                        continue;
                    }
                }
            }
        }
        remaining.push(i);
    }

    let mut warnings = Vec::new();
    let mut used_ai = false;
    let used_fewshot = remaining.len() < active_indices.len();

    if remaining.is_empty() {
        return finish_match_set(headers, slots, warnings, used_ai, used_fewshot, schema, sheet);
    }

    // Step 3: LLM matcher, when credentials/feature are available.
    let remaining_headers: Vec<String> = remaining.iter().map(|&i| headers[i].clone()).collect();
    let mut llm_handled = false;

    if config.llm_enabled {
        if let Some(client) = llm {
            let few_shot = case_store.few_shot(&remaining_headers, 3).unwrap_or_default();
            match call_with_transient_retry(&config.retry, || client.match_headers(&remaining_headers, schema, sheet, &few_shot)).await {
                Ok(response) => {
                    for (i, h) in remaining.iter().zip(remaining_headers.iter()) {
                        if let Some(m) = response.mappings.iter().find(|m| &m.customer_header == h) {
                            slots[*i] = Some(HeaderMatch {
                                source: h.clone(),
                                target: Some(m.standard_field.clone()),
                                confidence: m.confidence,
                                provenance: Provenance::Ai,
                            });
                        } else if response.unmapped.iter().any(|u| u == h) {
                            slots[*i] = Some(HeaderMatch::unmapped(h));
                        }
                    }
                    used_ai = true;
                    llm_handled = true;
                }
                Err(e) => {
                    warnings.push(format!("AI matcher failed, fallback used: {e}"));
                }
            }
        }
    }

    // Step 4: lexical fallback for anything the LLM step didn't resolve.
    if !llm_handled {
        let (fallback_matches, fallback_warnings) = lexical_fallback(&remaining_headers, schema, sheet);
        for (i, m) in remaining.iter().zip(fallback_matches.into_iter()) {
            slots[*i] = Some(m);
        }
        warnings.extend(fallback_warnings);
    } else {
        // Any slot the LLM left empty (malformed response) also falls to lexical.
        let still_empty: Vec<usize> = remaining.iter().copied().filter(|&i| slots[i].is_none()).collect();
        if !still_empty.is_empty() {
            let still_empty_headers: Vec<String> = still_empty.iter().map(|&i| headers[i].clone()).collect();
            let (fallback_matches, fallback_warnings) = lexical_fallback(&still_empty_headers, schema, sheet);
            for (i, m) in still_empty.iter().zip(fallback_matches.into_iter()) {
                slots[*i] = Some(m);
            }
            warnings.extend(fallback_warnings);
        }
    }

    finish_match_set(headers, slots, warnings, used_ai, used_fewshot, schema, sheet)
}

fn finish_match_set(
    headers: &[String],
    slots: Vec<Option<HeaderMatch>>,
    mut warnings: Vec<String>,
    used_ai: bool,
    used_fewshot: bool,
    schema: &StandardSchema,
    sheet: SheetAffinity,
) -> MatchSet {
    let matches: Vec<HeaderMatch> = slots
        .into_iter()
        .enumerate()
        .map(|(i, m)| m.unwrap_or_else(|| HeaderMatch::unmapped(&headers[i])))
        .collect();

    let mapped_targets: std::collections::HashSet<&str> =
        matches.iter().filter_map(|m| m.target.as_deref()).collect();
    let missing_required: Vec<&str> = schema
        .required(sheet)
        .into_iter()
        .filter(|r| !mapped_targets.contains(r))
        .collect();
    for field in missing_required {
        warnings.push(format!("missing required field: {field}"));
    }

    MatchSet { columns: headers.to_vec(), matches, warnings, used_ai, used_fewshot }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn ignored_headers_never_affect_required_warnings() {
        let schema = StandardSchema::default();
        let store = CaseStore::in_memory().unwrap();
        let config = Config { llm_enabled: false, ..Config::default() };
        let headers = vec!["비고".to_string()];

        let result = match_headers(&headers, SheetAffinity::Active, &schema, &store, None, &config).await;
        assert_eq!(result.matches[0].provenance, Provenance::Ignored);
        assert_eq!(result.matches[0].confidence, 0.0);
    }

    #[tokio::test]
    async fn exactly_one_match_per_input_header() {
        let schema = StandardSchema::default();
        let store = CaseStore::in_memory().unwrap();
        let config = Config { llm_enabled: false, ..Config::default() };
        let headers = vec!["사번".to_string(), "성명".to_string(), "완전히모를컬럼123".to_string()];

        let result = match_headers(&headers, SheetAffinity::Active, &schema, &store, None, &config).await;
        assert_eq!(result.matches.len(), headers.len());
        let sources: Vec<&str> = result.matches.iter().map(|m| m.source.as_str()).collect();
        assert_eq!(sources, vec!["사번", "성명", "완전히모를컬럼123"]);
    }

    #[tokio::test]
    async fn case_store_hit_short_circuits_lexical() {
        let schema = StandardSchema::default();
        let store = CaseStore::in_memory().unwrap();
        let config = Config { llm_enabled: false, ..Config::default() };

        store
            .save(
                &["이상한헤더".to_string()],
                &[HeaderMatch {
                    source: "이상한헤더".to_string(),
                    target: Some("이름".to_string()),
                    confidence: 0.9,
                    provenance: Provenance::Ai,
                }],
                0.9,
                true,
                None,
                None,
            )
            .unwrap();

        let headers = vec!["이상한헤더".to_string()];
        let result = match_headers(&headers, SheetAffinity::Active, &schema, &store, None, &config).await;
        assert_eq!(result.matches[0].target.as_deref(), Some("이름"));
        assert_eq!(result.matches[0].confidence, 0.95);
        assert_eq!(result.matches[0].provenance, Provenance::FewShot);
    }

    #[test]
    fn similarity_is_symmetric_and_bounded() {
        let s = string_similarity("사원번호", "사번");
        assert!((0.0..=1.0).contains(&s));
        assert_eq!(s, string_similarity("사번", "사원번호"));
    }
}
