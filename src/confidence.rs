//! Confidence Scorer (C9): the single number the Agent's Think step and the
//! server's auto-complete/auto-correct/needs-review routing both key off of.

use serde::{Deserialize, Serialize};

use crate::header_matcher::MatchSet;
use crate::validation::{Finding, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub unmapped_ratio_exceeded: bool,
    pub low_match_confidence: bool,
    pub flagged: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceRecord {
    pub score: f64,
    pub total_rows: usize,
    pub distinct_error_rows: usize,
    pub anomalies: AnomalyReport,
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    AutoComplete,
    ManualReview,
}

const UNMAPPED_RATIO_THRESHOLD: f64 = 0.20;
const MATCH_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// `score = normal_rows / total_rows`, where `normal_rows = total_rows -
/// |distinct error rows|`. Warnings never reduce the score — only rows that
/// produced at least one error count against it. Note there is deliberately
/// no separate "Layer-1 error ratio" anomaly check here: a high error count
/// already shows up as a lower score, and double-counting it as an anomaly
/// too would just repeat the same signal under a different name.
pub fn score(errors: &[Finding], total_rows: usize) -> (f64, usize) {
    if total_rows == 0 {
        return (1.0, 0);
    }
    let distinct_error_rows: std::collections::BTreeSet<usize> =
        errors.iter().filter(|e| e.severity == Severity::Error).filter_map(|e| e.row).collect();
    let normal_rows = total_rows.saturating_sub(distinct_error_rows.len());
    (normal_rows as f64 / total_rows as f64, distinct_error_rows.len())
}

fn detect_anomalies(match_set: &MatchSet, match_confidence: f64) -> AnomalyReport {
    let active = match_set.matches.iter().filter(|m| m.provenance != crate::header_matcher::Provenance::Ignored);
    let active_count = active.clone().count();
    let unmapped_count = active.filter(|m| m.provenance == crate::header_matcher::Provenance::Unmapped).count();
    let unmapped_ratio = if active_count == 0 { 0.0 } else { unmapped_count as f64 / active_count as f64 };

    let unmapped_ratio_exceeded = unmapped_ratio > UNMAPPED_RATIO_THRESHOLD;
    let low_match_confidence = match_confidence < MATCH_CONFIDENCE_THRESHOLD;

    AnomalyReport {
        unmapped_ratio_exceeded,
        low_match_confidence,
        flagged: unmapped_ratio_exceeded || low_match_confidence,
    }
}

pub fn assess(errors: &[Finding], total_rows: usize, match_set: &MatchSet, match_confidence: f64) -> ConfidenceRecord {
    let (score, distinct_error_rows) = score(errors, total_rows);
    let anomalies = detect_anomalies(match_set, match_confidence);
    let recommendation = if anomalies.flagged { Recommendation::ManualReview } else { Recommendation::AutoComplete };

    ConfidenceRecord { score, total_rows, distinct_error_rows, anomalies, recommendation }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header_matcher::{HeaderMatch, Provenance};
    use crate::validation::FindingSource;

    fn err(row: usize) -> Finding {
        Finding::new(Some(row), "", "field", "msg", Severity::Error, FindingSource::Layer1)
    }

    fn warn(row: usize) -> Finding {
        Finding::new(Some(row), "", "field", "msg", Severity::Warning, FindingSource::Layer1)
    }

    #[test]
    fn warnings_never_reduce_score() {
        let findings = vec![warn(1), warn(2), warn(3)];
        let (s, distinct) = score(&findings, 10);
        assert_eq!(s, 1.0);
        assert_eq!(distinct, 0);
    }

    #[test]
    fn multiple_errors_on_same_row_count_once() {
        let findings = vec![err(1), err(1), err(1)];
        let (s, distinct) = score(&findings, 10);
        assert_eq!(distinct, 1);
        assert_eq!(s, 0.9);
    }

    #[test]
    fn zero_rows_scores_perfect() {
        let (s, distinct) = score(&[], 0);
        assert_eq!(s, 1.0);
        assert_eq!(distinct, 0);
    }

    fn match_set(matches: Vec<HeaderMatch>) -> MatchSet {
        MatchSet { columns: Vec::new(), matches, warnings: Vec::new(), used_ai: false, used_fewshot: false }
    }

    fn m(provenance: Provenance, confidence: f64) -> HeaderMatch {
        HeaderMatch { source: "h".to_string(), target: Some("t".to_string()), confidence, provenance }
    }

    #[test]
    fn high_unmapped_ratio_flags_manual_review() {
        let set = match_set(vec![
            m(Provenance::Unmapped, 0.0),
            m(Provenance::Unmapped, 0.0),
            m(Provenance::FewShot, 0.9),
        ]);
        let record = assess(&[], 10, &set, 0.9);
        assert!(record.anomalies.unmapped_ratio_exceeded);
        assert_eq!(record.recommendation, Recommendation::ManualReview);
    }

    #[test]
    fn clean_match_set_recommends_auto_complete() {
        let set = match_set(vec![m(Provenance::FewShot, 0.95), m(Provenance::FewShot, 0.95)]);
        let record = assess(&[], 10, &set, 0.95);
        assert!(!record.anomalies.flagged);
        assert_eq!(record.recommendation, Recommendation::AutoComplete);
    }
}
