//! Layer-2 Validator (C6): reconcile diagnostic-answer values against computed
//! aggregates over the parsed rows, within a configurable percent tolerance.

use std::collections::HashMap;

use serde_json::Value;

use super::{Finding, FindingSource, Severity};
use crate::diagnostic_questions::get_validation_questions;

/// Computed aggregates keyed by name, e.g. `"headcount"`, `"amount"`, or an
/// array-valued key addressed as `key[index]` from a question's `validate_against`.
pub type Aggregates = HashMap<String, Value>;

#[derive(Debug, Clone)]
pub struct ReconciliationOutcome {
    pub question_id: String,
    pub diff_percent: Option<f64>,
    pub finding: Option<Finding>,
}

/// `diff_percent = |diff / calc| * 100`; `calc == 0` reconciles to infinity so
/// any nonzero diagnostic answer against a zero aggregate always fails.
fn diff_percent(answer: f64, calc: f64) -> f64 {
    let diff = (answer - calc).abs();
    if calc == 0.0 {
        if diff == 0.0 {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        (diff / calc).abs() * 100.0
    }
}

fn extract_value(aggregates: &Aggregates, path: &str) -> Option<f64> {
    if let Some(bracket) = path.find('[') {
        let key = &path[..bracket];
        let index_str = &path[bracket + 1..path.len() - 1];
        let index: usize = index_str.parse().ok()?;
        aggregates.get(key)?.as_array()?.get(index)?.as_f64()
    } else {
        aggregates.get(path)?.as_f64()
    }
}

fn format_currency(value: f64) -> String {
    let won = value as i64;
    if won.abs() >= 100_000_000 {
        format!("{:.1}억원", won as f64 / 100_000_000.0)
    } else if won.abs() >= 10_000 {
        format!("{:.0}만원", won as f64 / 10_000.0)
    } else {
        format!("{won}원")
    }
}

/// Reconcile every answer that has a `validate_against` target. Questions with
/// no answer, or no matching aggregate, are skipped (not a finding).
pub fn validate(
    answers: &HashMap<String, Value>,
    aggregates: &Aggregates,
    tolerance_percent: f64,
) -> (Vec<Finding>, Vec<Finding>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let mut aggregates = aggregates.clone();
    // 퇴직자전체 = q24 + q25 + q26, only when all three are present as answers.
    if let (Some(q24), Some(q25), Some(q26)) = (
        answers.get("q24").and_then(Value::as_f64),
        answers.get("q25").and_then(Value::as_f64),
        answers.get("q26").and_then(Value::as_f64),
    ) {
        aggregates.entry("퇴직자전체".to_string()).or_insert(Value::from(q24 + q25 + q26));
    }

    for question in get_validation_questions() {
        let Some(answer_value) = answers.get(question.id) else { continue };
        let Some(answer) = answer_value.as_f64().or_else(|| answer_value.as_str().and_then(|s| s.parse().ok())) else {
            errors.push(Finding::new(
                None,
                "",
                question.id,
                format!("{} 답변 숫자 변환 실패", question.id),
                Severity::Error,
                FindingSource::Layer2,
            ));
            continue;
        };

        let Some(target_path) = question.validate_against else { continue };
        let Some(calc) = extract_value(&aggregates, target_path) else { continue };

        let diff = (answer - calc).abs();
        let pct = diff_percent(answer, calc);

        let formatted = |v: f64| if question.format_currency { format_currency(v) } else { format!("{v:.0}") };

        if diff < 0.01 {
            continue;
        }
        if pct <= tolerance_percent {
            warnings.push(Finding::new(
                None,
                "",
                question.id,
                format!(
                    "{}: 응답 {} vs 계산값 {} (차이 {:.1}%, 허용범위 내)",
                    question.text,
                    formatted(answer),
                    formatted(calc),
                    pct
                ),
                Severity::Warning,
                FindingSource::Layer2,
            ));
        } else {
            warnings.push(Finding::new(
                None,
                "",
                question.id,
                format!(
                    "{}: 응답 {} vs 계산값 {} (차이 {:.1}%, 허용범위 초과)",
                    question.text,
                    formatted(answer),
                    formatted(calc),
                    pct
                ),
                Severity::Warning,
                FindingSource::Layer2,
            ));
        }
    }

    (errors, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregates(pairs: &[(&str, f64)]) -> Aggregates {
        pairs.iter().map(|(k, v)| (k.to_string(), Value::from(*v))).collect()
    }

    #[test]
    fn matching_answer_produces_no_warning() {
        let answers: HashMap<String, Value> = [("q21".to_string(), Value::from(100.0))].into_iter().collect();
        let aggs = aggregates(&[("headcount", 100.0)]);
        let (errors, warnings) = validate(&answers, &aggs, 5.0);
        assert!(errors.is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn mismatch_within_tolerance_is_a_low_severity_warning() {
        let answers: HashMap<String, Value> = [("q21".to_string(), Value::from(102.0))].into_iter().collect();
        let aggs = aggregates(&[("headcount", 100.0)]);
        let (_, warnings) = validate(&answers, &aggs, 5.0);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("허용범위 내"));
    }

    #[test]
    fn mismatch_beyond_tolerance_is_flagged_as_exceeding() {
        let answers: HashMap<String, Value> = [("q21".to_string(), Value::from(150.0))].into_iter().collect();
        let aggs = aggregates(&[("headcount", 100.0)]);
        let (_, warnings) = validate(&answers, &aggs, 5.0);
        assert!(warnings[0].message.contains("허용범위 초과"));
    }

    #[test]
    fn unanswered_question_is_skipped() {
        let answers: HashMap<String, Value> = HashMap::new();
        let aggs = aggregates(&[("headcount", 100.0)]);
        let (errors, warnings) = validate(&answers, &aggs, 5.0);
        assert!(errors.is_empty() && warnings.is_empty());
    }

    #[test]
    fn zero_aggregate_with_nonzero_answer_always_exceeds_tolerance() {
        assert_eq!(diff_percent(10.0, 0.0), f64::INFINITY);
        assert_eq!(diff_percent(0.0, 0.0), 0.0);
    }
}
