//! Layer-AI Validator (C7): context-aware anomaly review. Builds a compact
//! data summary (candidate anomalies only, never the full sheet) plus a
//! handful of sample rows, and asks the LLM to reason about what a pure rule
//! layer can't: plausibility given the surrounding context.

use std::collections::HashMap;

use serde_json::json;

use super::{cell, emp_info, Finding, FindingSource, Severity};
use crate::error::Result;
use crate::knowledge_base::KnowledgeRule;
use crate::llm::LlmClient;
use crate::parser::{normalize_date, ParsedWorkbook};

pub struct AiValidationResult {
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
    pub reasoning: Vec<String>,
}

const SAMPLE_ROWS: usize = 5;
const MIN_PLAUSIBLE_SALARY: f64 = 1_900_000.0;

fn birth_year_outlier(columns: &HashMap<String, usize>, row: &[String]) -> Option<String> {
    let raw = cell(row, columns, "생년월일")?;
    let norm = normalize_date(raw)?;
    let year: i32 = norm[0..4].parse().ok()?;
    if !(1945..=2005).contains(&year) {
        Some(format!("출생연도 {year}"))
    } else {
        None
    }
}

fn hire_date_in_future(columns: &HashMap<String, usize>, row: &[String]) -> bool {
    let Some(raw) = cell(row, columns, "입사일") else { return false };
    let Some(norm) = normalize_date(raw) else { return false };
    norm.as_str() > chrono::Utc::now().format("%Y%m%d").to_string().as_str()
}

fn salary_outlier(columns: &HashMap<String, usize>, row: &[String]) -> Option<f64> {
    let raw = cell(row, columns, "기준급여")?;
    let salary: f64 = raw.trim().replace(',', "").parse().ok()?;
    if salary < MIN_PLAUSIBLE_SALARY || salary < 0.0 {
        Some(salary)
    } else {
        None
    }
}

fn gender_outlier(columns: &HashMap<String, usize>, row: &[String]) -> Option<String> {
    let raw = cell(row, columns, "성별")?.trim();
    let normalized = raw.to_lowercase();
    if raw.is_empty() || ["1", "2", "1.0", "2.0", "남", "여", "m", "f"].contains(&normalized.as_str()) {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Candidate-anomaly summary: each bucket lists only rows the cheap rule
/// checks above flagged, plus a distribution of 종업원구분 and a small sample.
/// Kept deliberately small so the prompt stays bounded regardless of sheet size.
fn build_summary(workbook: &ParsedWorkbook, columns: &HashMap<String, usize>) -> serde_json::Value {
    let mut birth_outliers = Vec::new();
    let mut future_hires = Vec::new();
    let mut salary_outliers = Vec::new();
    let mut gender_outliers = Vec::new();
    let mut class_distribution: HashMap<String, usize> = HashMap::new();

    for (idx, row) in workbook.rows.iter().enumerate() {
        if let Some(note) = birth_year_outlier(columns, row) {
            birth_outliers.push(json!({"row": idx, "emp_info": emp_info(row, columns, idx), "note": note}));
        }
        if hire_date_in_future(columns, row) {
            future_hires.push(json!({"row": idx, "emp_info": emp_info(row, columns, idx)}));
        }
        if let Some(salary) = salary_outlier(columns, row) {
            salary_outliers.push(json!({"row": idx, "emp_info": emp_info(row, columns, idx), "salary": salary}));
        }
        if let Some(value) = gender_outlier(columns, row) {
            gender_outliers.push(json!({"row": idx, "emp_info": emp_info(row, columns, idx), "value": value}));
        }
        if let Some(class) = cell(row, columns, "종업원구분") {
            *class_distribution.entry(class.trim().to_string()).or_insert(0) += 1;
        }
    }

    let sample: Vec<serde_json::Value> = workbook
        .rows
        .iter()
        .take(SAMPLE_ROWS)
        .map(|r| json!(r))
        .collect();

    json!({
        "row_count": workbook.rows.len(),
        "birth_year_outliers": birth_outliers,
        "future_hire_dates": future_hires,
        "salary_outliers": salary_outliers,
        "gender_outliers": gender_outliers,
        "employee_class_distribution": class_distribution,
        "sample_rows": sample,
        "headers": workbook.headers,
    })
}

fn build_rules_section(rules: &[KnowledgeRule]) -> String {
    if rules.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = rules
        .iter()
        .map(|r| format!("- [{}/{}] {}: {} ({})", r.category, r.severity, r.field, r.condition, r.message))
        .collect();
    format!("\n\nKnown rules to apply when judging plausibility:\n{}", lines.join("\n"))
}

fn build_prompt(summary: &serde_json::Value, rules: &[KnowledgeRule]) -> String {
    format!(
        "roster data summary (candidate anomalies only, not the full sheet): {}{}\n\n\
         Review the candidates above in context. Only report an anomaly if it's genuinely \
         implausible, not merely unusual. Respond with JSON only: \
         {{\"errors\":[{{\"row\":0,\"field\":\"...\",\"value\":\"...\",\"message\":\"...\",\"reason\":\"...\"}}],\
         \"warnings\":[...],\"reasoning\":\"...\"}}",
        summary,
        build_rules_section(rules)
    )
}

pub async fn validate(
    workbook: &ParsedWorkbook,
    columns: &HashMap<String, usize>,
    client: &dyn LlmClient,
    rules: &[KnowledgeRule],
) -> Result<AiValidationResult> {
    let summary = build_summary(workbook, columns);
    let prompt = build_prompt(&summary, rules);
    let response = client.validate_rows(&prompt).await?;

    let to_finding = |f: &crate::llm::AiFinding, severity: Severity| {
        let display_row = Some(f.row + 2);
        let info = workbook
            .rows
            .get(f.row)
            .map(|row| emp_info(row, columns, f.row))
            .unwrap_or_default();
        Finding::new(display_row, info, f.field.clone(), f.message.clone(), severity, FindingSource::LayerAi)
    };

    let errors = response.errors.iter().map(|f| to_finding(f, Severity::Error)).collect();
    let warnings = response.warnings.iter().map(|f| to_finding(f, Severity::Warning)).collect();
    let reasoning = if response.reasoning.trim().is_empty() { Vec::new() } else { vec![response.reasoning] };

    Ok(AiValidationResult { errors, warnings, reasoning })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header_matcher::{HeaderMatch, MatchSet, Provenance};
    use crate::llm::{AiFinding, MatchResponse, ValidationResponse};
    use crate::parser::ParseMeta;
    use crate::schema::{SheetAffinity, StandardSchema};
    use crate::validation::canonical_columns;
    use async_trait::async_trait;

    struct StubClient {
        response: ValidationResponse,
    }

    #[async_trait]
    impl LlmClient for StubClient {
        async fn match_headers(
            &self,
            _headers: &[String],
            _schema: &StandardSchema,
            _sheet: SheetAffinity,
            _few_shot: &[crate::case_store::FewShotExample],
        ) -> Result<MatchResponse> {
            unimplemented!()
        }

        async fn validate_rows(&self, _prompt: &str) -> Result<ValidationResponse> {
            Ok(self.response.clone())
        }
    }

    fn workbook() -> (ParsedWorkbook, HashMap<String, usize>) {
        let headers = vec!["사원번호".to_string(), "생년월일".to_string()];
        let rows = vec![vec!["1".to_string(), "19300101".to_string()]];
        let matches: Vec<HeaderMatch> = headers
            .iter()
            .map(|h| HeaderMatch { source: h.clone(), target: Some(h.clone()), confidence: 1.0, provenance: Provenance::FewShot })
            .collect();
        let match_set = MatchSet { columns: headers.clone(), matches, warnings: Vec::new(), used_ai: false, used_fewshot: false };
        let columns = canonical_columns(&match_set);
        (ParsedWorkbook { headers, rows, meta: ParseMeta::default() }, columns)
    }

    #[tokio::test]
    async fn summary_flags_birth_year_outlier() {
        let (wb, columns) = workbook();
        let summary = build_summary(&wb, &columns);
        assert_eq!(summary["birth_year_outliers"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ai_error_row_is_shifted_by_two() {
        let (wb, columns) = workbook();
        let client = StubClient {
            response: ValidationResponse {
                errors: vec![AiFinding { row: 0, field: "생년월일".to_string(), value: None, message: "msg".to_string(), reason: String::new() }],
                warnings: Vec::new(),
                reasoning: "because".to_string(),
            },
        };
        let result = validate(&wb, &columns, &client, &[]).await.unwrap();
        assert_eq!(result.errors[0].row, Some(2));
        assert_eq!(result.reasoning, vec!["because".to_string()]);
    }

    #[test]
    fn prompt_includes_active_rules() {
        let summary = serde_json::json!({});
        let rules = vec![KnowledgeRule {
            id: Some(1),
            field: "기준급여".to_string(),
            condition: "salary < minimum wage".to_string(),
            message: "최저임금 미달".to_string(),
            severity: "error".to_string(),
            category: "wage".to_string(),
        }];
        let prompt = build_prompt(&summary, &rules);
        assert!(prompt.contains("최저임금 미달"));
    }

    #[test]
    fn prompt_omits_rules_section_when_empty() {
        let summary = serde_json::json!({});
        let prompt = build_prompt(&summary, &[]);
        assert!(!prompt.contains("Known rules"));
    }
}
