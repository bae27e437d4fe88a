//! Validation: three layers (rule-based, diagnostic-answer reconciliation,
//! AI context review) merged into one finding set (spec.md §4.5-§4.7).

pub mod layer1;
pub mod layer2;
pub mod layer_ai;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::header_matcher::MatchSet;
use crate::knowledge_base::KnowledgeRule;
use crate::llm::LlmClient;
use crate::parser::ParsedWorkbook;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingSource {
    Layer1,
    Layer2,
    LayerAi,
    Duplicate,
}

/// A single validation finding. `row` is the display row number (header row +
/// 1-based offset), matching the convention `idx + 2` used throughout the
/// original rule layer; `None` for column-level (not row-level) findings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub row: Option<usize>,
    pub emp_info: String,
    pub field: String,
    pub message: String,
    pub severity: Severity,
    pub source: FindingSource,
}

impl Finding {
    pub fn new(
        row: Option<usize>,
        emp_info: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        source: FindingSource,
    ) -> Self {
        Self {
            row,
            emp_info: emp_info.into(),
            field: field.into(),
            message: message.into(),
            severity,
            source,
        }
    }
}

/// Map canonical field name -> column index, built from the accepted matches.
pub fn canonical_columns(match_set: &MatchSet) -> HashMap<String, usize> {
    let mut map = HashMap::new();
    for (i, h) in match_set.columns.iter().enumerate() {
        if let Some(m) = match_set.matches.iter().find(|m| &m.source == h) {
            if let Some(target) = &m.target {
                map.entry(target.clone()).or_insert(i);
            }
        }
    }
    map
}

pub fn cell<'a>(row: &'a [String], columns: &HashMap<String, usize>, field: &str) -> Option<&'a str> {
    columns.get(field).and_then(|&i| row.get(i)).map(|s| s.as_str())
}

/// `"사원번호 {id}"`, falling back to `"행 {idx+2}"` when the id column is absent
/// or blank for this row.
pub fn emp_info(row: &[String], columns: &HashMap<String, usize>, idx: usize) -> String {
    match cell(row, columns, "사원번호") {
        Some(id) if !id.trim().is_empty() => format!("사원번호 {}", id.trim()),
        _ => format!("행 {}", idx + 2),
    }
}

/// Normalize a message to a comparison key so that near-duplicate phrasings of
/// the same underlying condition collapse to one finding.
fn normalize_message(msg: &str) -> String {
    let lower = msg.to_lowercase();
    let stripped: String = lower.chars().filter(|c| *c != ',' && *c != '원').collect();
    let stripped = stripped.replace("연령", "나이");

    const TYPE_KEYWORDS: [&str; 7] = ["미만", "초과", "미달", "음수", "누락", "중복", "불일치"];
    const FIELD_KEYWORDS: [&str; 7] =
        ["입사", "나이", "급여", "최저임금", "생년월일", "사원번호", "성별"];

    let mut found_types: Vec<&str> = TYPE_KEYWORDS.iter().filter(|k| stripped.contains(**k)).copied().collect();
    let mut found_fields: Vec<&str> = FIELD_KEYWORDS.iter().filter(|k| stripped.contains(**k)).copied().collect();
    found_types.sort_unstable();
    found_fields.sort_unstable();

    if !found_types.is_empty() && !found_fields.is_empty() {
        format!("{}:{}", found_fields.join("|"), found_types.join("|"))
    } else if !found_fields.is_empty() {
        found_fields.join("|")
    } else {
        stripped.chars().take(30).collect()
    }
}

/// Merge errors and warnings from all layers. Key is `(emp_info, field,
/// normalized_message)`; an error always wins over a warning with the same
/// key, and a repeated distinct message under the same key is appended rather
/// than dropped.
pub fn merge_findings(errors: Vec<Finding>, warnings: Vec<Finding>) -> (Vec<Finding>, Vec<Finding>) {
    let mut seen: HashMap<(String, String, String), (Finding, bool)> = HashMap::new();
    let mut order: Vec<(String, String, String)> = Vec::new();

    for err in errors {
        let key = (err.emp_info.clone(), err.field.clone(), normalize_message(&err.message));
        match seen.get_mut(&key) {
            Some((existing, _)) => {
                if !existing.message.contains(&err.message) {
                    existing.message = format!("{}; {}", existing.message, err.message);
                }
            }
            None => {
                order.push(key.clone());
                seen.insert(key, (err, true));
            }
        }
    }

    for warn in warnings {
        let key = (warn.emp_info.clone(), warn.field.clone(), normalize_message(&warn.message));
        if !seen.contains_key(&key) {
            order.push(key.clone());
            seen.insert(key, (warn, false));
        }
        // Already present as an error: the warning is strictly less severe, drop it.
    }

    let mut out_errors = Vec::new();
    let mut out_warnings = Vec::new();
    for key in order {
        if let Some((finding, is_error)) = seen.remove(&key) {
            if is_error {
                out_errors.push(finding);
            } else {
                out_warnings.push(finding);
            }
        }
    }
    (out_errors, out_warnings)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationBundle {
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
    pub ai_reasoning: Vec<String>,
    pub used_ai: bool,
    pub passed: bool,
}

/// Run Layer-1 unconditionally, then Layer-AI when enabled, then merge. Layer-2
/// (diagnostic-answer reconciliation) is run separately by the caller against
/// computed aggregates and folded into the same bundle via `merge_findings`.
pub async fn validate(
    workbook: &ParsedWorkbook,
    match_set: &MatchSet,
    llm: Option<&dyn LlmClient>,
    config: &Config,
    rules: &[KnowledgeRule],
) -> ValidationBundle {
    let columns = canonical_columns(match_set);
    let (mut errors, mut warnings) = layer1::validate(workbook, &columns);

    let mut used_ai = false;
    let mut ai_reasoning = Vec::new();

    if config.llm_enabled {
        if let Some(client) = llm {
            match layer_ai::validate(workbook, &columns, client, rules).await {
                Ok(result) => {
                    errors.extend(result.errors);
                    warnings.extend(result.warnings);
                    ai_reasoning = result.reasoning;
                    used_ai = true;
                }
                Err(_) => {
                    // Advisory only: AI failure never blocks the rule-based result.
                }
            }
        }
    }

    let (errors, warnings) = merge_findings(errors, warnings);
    let passed = errors.is_empty() && warnings.is_empty();

    ValidationBundle { errors, warnings, ai_reasoning, used_ai, passed }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(emp: &str, field: &str, msg: &str, sev: Severity) -> Finding {
        Finding::new(Some(3), emp, field, msg, sev, FindingSource::Layer1)
    }

    #[test]
    fn error_wins_over_warning_for_same_key() {
        let errors = vec![finding("사원번호 1", "기준급여", "기준급여 음수 또는 0", Severity::Error)];
        let warnings = vec![finding("사원번호 1", "기준급여", "기준급여 최저임금 미달", Severity::Warning)];
        let (merged_errors, merged_warnings) = merge_findings(errors, warnings);
        assert_eq!(merged_errors.len(), 1);
        assert!(merged_warnings.is_empty());
    }

    #[test]
    fn distinct_messages_under_same_key_are_concatenated() {
        let errors = vec![
            finding("사원번호 1", "생년월일", "생년월일 형식 오류", Severity::Error),
            finding("사원번호 1", "생년월일", "생년월일 형식 오류 상세", Severity::Error),
        ];
        let (merged, _) = merge_findings(errors, Vec::new());
        assert_eq!(merged.len(), 1);
        assert!(merged[0].message.contains(';'));
    }

    #[test]
    fn distinct_keys_are_not_merged() {
        let errors = vec![
            finding("사원번호 1", "기준급여", "기준급여 음수", Severity::Error),
            finding("사원번호 2", "기준급여", "기준급여 음수", Severity::Error),
        ];
        let (merged, _) = merge_findings(errors, Vec::new());
        assert_eq!(merged.len(), 2);
    }
}
