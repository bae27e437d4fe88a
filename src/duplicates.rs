//! Duplicate Detector (C8): exact, similar, and suspicious duplicate groupings
//! over employee identity fields. Three independent passes, not a single
//! merged pass, since each category carries a different confidence and a
//! different severity.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::parser::ParsedWorkbook;
use crate::validation::{cell, Finding, FindingSource, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub key: String,
    pub rows: Vec<usize>,
    pub category: DuplicateCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateCategory {
    Exact,
    Similar,
    Suspicious,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuplicateReport {
    pub exact: Vec<DuplicateGroup>,
    pub similar: Vec<DuplicateGroup>,
    pub suspicious: Vec<DuplicateGroup>,
}

fn group_by<'a>(
    rows: &'a [Vec<String>],
    key_fn: impl Fn(&'a [String]) -> Option<String>,
) -> Vec<(String, Vec<usize>)> {
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for (idx, row) in rows.iter().enumerate() {
        let Some(key) = key_fn(row) else { continue };
        if key.trim().is_empty() {
            continue;
        }
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(idx);
    }
    order
        .into_iter()
        .filter_map(|k| groups.remove(&k).map(|v| (k, v)))
        .filter(|(_, rows)| rows.len() > 1)
        .collect()
}

fn emp_ids_all_identical(rows: &[usize], data: &[Vec<String>], emp_col: Option<usize>) -> bool {
    let Some(col) = emp_col else { return false };
    let mut ids = rows.iter().filter_map(|&i| data.get(i)?.get(col));
    let Some(first) = ids.next() else { return false };
    ids.all(|id| id == first)
}

/// Exact duplicates: identical 사원번호. Always reported, even if every other
/// field also matches, since the id itself should be unique.
fn find_exact_duplicates(workbook: &ParsedWorkbook, columns: &HashMap<String, usize>) -> Vec<DuplicateGroup> {
    let Some(&col) = columns.get("사원번호") else { return Vec::new() };
    group_by(&workbook.rows, |row| row.get(col).map(|s| s.trim().to_string()))
        .into_iter()
        .map(|(key, rows)| DuplicateGroup { key, rows, category: DuplicateCategory::Exact })
        .collect()
}

/// Similar duplicates: same name + birth date but different 사원번호. Skips
/// groups that are already reported as exact duplicates (same id throughout).
fn find_similar_duplicates(workbook: &ParsedWorkbook, columns: &HashMap<String, usize>) -> Vec<DuplicateGroup> {
    let (Some(&name_col), Some(&birth_col)) = (columns.get("이름"), columns.get("생년월일")) else {
        return Vec::new();
    };
    let emp_col = columns.get("사원번호").copied();

    group_by(&workbook.rows, |row| {
        let name = row.get(name_col)?.trim();
        let birth = row.get(birth_col)?.trim();
        if name.is_empty() || birth.is_empty() {
            None
        } else {
            Some(format!("{name}|{birth}"))
        }
    })
    .into_iter()
    .filter(|(_, rows)| !emp_ids_all_identical(rows, &workbook.rows, emp_col))
    .map(|(key, rows)| DuplicateGroup { key, rows, category: DuplicateCategory::Similar })
    .collect()
}

/// Suspicious duplicates: shared phone or email across otherwise distinct
/// people. Lower confidence still, surfaced as info rather than a warning.
fn find_suspicious_duplicates(workbook: &ParsedWorkbook, columns: &HashMap<String, usize>) -> Vec<DuplicateGroup> {
    let emp_col = columns.get("사원번호").copied();
    let mut groups = Vec::new();

    for field in ["전화번호", "이메일"] {
        let Some(&col) = columns.get(field) else { continue };
        let found = group_by(&workbook.rows, |row| row.get(col).map(|s| s.trim().to_string()))
            .into_iter()
            .filter(|(_, rows)| !emp_ids_all_identical(rows, &workbook.rows, emp_col))
            .map(|(key, rows)| DuplicateGroup { key: format!("{field}:{key}"), rows, category: DuplicateCategory::Suspicious });
        groups.extend(found);
    }
    groups
}

pub fn detect(workbook: &ParsedWorkbook, columns: &HashMap<String, usize>) -> DuplicateReport {
    DuplicateReport {
        exact: find_exact_duplicates(workbook, columns),
        similar: find_similar_duplicates(workbook, columns),
        suspicious: find_suspicious_duplicates(workbook, columns),
    }
}

/// Flatten a report into findings for the merged validation bundle. Exact ->
/// warning, similar -> warning, suspicious -> info (`auto_fix` hint folded
/// into the message since there's no separate hint field on `Finding`).
pub fn to_findings(report: &DuplicateReport, workbook: &ParsedWorkbook, columns: &HashMap<String, usize>) -> Vec<Finding> {
    let mut findings = Vec::new();

    for group in &report.exact {
        let row0 = group.rows[0];
        let info = cell(&workbook.rows[row0], columns, "사원번호")
            .map(|id| format!("{id} (행 {})", row0 + 1))
            .unwrap_or_else(|| format!("행 {}", row0 + 1));
        findings.push(Finding::new(
            Some(row0 + 2),
            info,
            "사원번호".to_string(),
            format!("사원번호 '{}' 중복 ({}건, 행: {})", group.key, group.rows.len(), display_rows(&group.rows)),
            Severity::Error,
            FindingSource::Duplicate,
        ));
    }

    for group in &report.similar {
        let row0 = group.rows[0];
        findings.push(Finding::new(
            Some(row0 + 2),
            format!("행 {}", row0 + 2),
            "이름+생년월일".to_string(),
            format!("동일 이름/생년월일이 다른 사원번호로 {}건 존재 (행: {})", group.rows.len(), display_rows(&group.rows)),
            Severity::Warning,
            FindingSource::Duplicate,
        ));
    }

    for group in &report.suspicious {
        let row0 = group.rows[0];
        findings.push(Finding::new(
            Some(row0 + 2),
            format!("행 {}", row0 + 2),
            "연락처".to_string(),
            format!("{}건의 행이 연락처를 공유함 ({}, 행: {})", group.rows.len(), group.key, display_rows(&group.rows)),
            Severity::Info,
            FindingSource::Duplicate,
        ));
    }

    findings
}

fn display_rows(rows: &[usize]) -> String {
    rows.iter().map(|r| (r + 2).to_string()).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header_matcher::{HeaderMatch, MatchSet, Provenance};
    use crate::parser::ParseMeta;
    use crate::validation::canonical_columns;

    fn workbook(headers: &[&str], rows: Vec<Vec<&str>>) -> (ParsedWorkbook, HashMap<String, usize>) {
        let headers: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
        let rows: Vec<Vec<String>> = rows.into_iter().map(|r| r.into_iter().map(String::from).collect()).collect();
        let matches: Vec<HeaderMatch> = headers
            .iter()
            .map(|h| HeaderMatch { source: h.clone(), target: Some(h.clone()), confidence: 1.0, provenance: Provenance::FewShot })
            .collect();
        let match_set = MatchSet { columns: headers.clone(), matches, warnings: Vec::new(), used_ai: false, used_fewshot: false };
        let columns = canonical_columns(&match_set);
        (ParsedWorkbook { headers, rows, meta: ParseMeta::default() }, columns)
    }

    #[test]
    fn exact_duplicate_ids_are_grouped() {
        let (wb, cols) = workbook(&["사원번호", "이름"], vec![vec!["1", "Kim"], vec!["1", "Lee"], vec!["2", "Park"]]);
        let report = detect(&wb, &cols);
        assert_eq!(report.exact.len(), 1);
        assert_eq!(report.exact[0].rows, vec![0, 1]);
    }

    #[test]
    fn similar_duplicates_skip_groups_already_exact() {
        let (wb, cols) = workbook(
            &["사원번호", "이름", "생년월일"],
            vec![vec!["1", "Kim", "19900101"], vec!["1", "Kim", "19900101"]],
        );
        let report = detect(&wb, &cols);
        assert!(report.similar.is_empty());
        assert_eq!(report.exact.len(), 1);
    }

    #[test]
    fn similar_duplicates_found_across_distinct_ids() {
        let (wb, cols) = workbook(
            &["사원번호", "이름", "생년월일"],
            vec![vec!["1", "Kim", "19900101"], vec!["2", "Kim", "19900101"]],
        );
        let report = detect(&wb, &cols);
        assert_eq!(report.similar.len(), 1);
    }

    #[test]
    fn suspicious_duplicates_ignore_blank_values() {
        let (wb, cols) = workbook(
            &["사원번호", "이름", "전화번호"],
            vec![vec!["1", "Kim", ""], vec!["2", "Lee", ""]],
        );
        let report = detect(&wb, &cols);
        assert!(report.suspicious.is_empty());
    }
}
