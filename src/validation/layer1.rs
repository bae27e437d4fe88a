//! Layer-1 Validator (C5): pure row-level rule checks, no I/O, no LLM.
//! Ported rule-for-rule from the rule-based validator this system replaced.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use regex::Regex;
use std::sync::LazyLock;

use crate::parser::{normalize_date, ParsedWorkbook};
use crate::schema::MIN_MONTHLY_WAGE;

use super::{cell, emp_info, Finding, FindingSource, Severity};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

const VALID_GENDER_VALUES: [&str; 8] = ["1", "2", "1.0", "2.0", "남", "여", "m", "f"];

/// Run every row-level rule over `workbook`, resolving header names to
/// canonical fields via `columns`. Returns `(errors, warnings)`.
pub fn validate(workbook: &ParsedWorkbook, columns: &HashMap<String, usize>) -> (Vec<Finding>, Vec<Finding>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for required in ["생년월일", "사원번호", "기준급여"] {
        if !columns.contains_key(required) {
            warnings.push(Finding::new(
                None,
                "",
                required,
                format!("권장 필드 없음: {required}"),
                Severity::Warning,
                FindingSource::Layer1,
            ));
        }
    }
    if !columns.contains_key("입사일") {
        warnings.push(Finding::new(
            None,
            "",
            "입사일",
            "권장 필드 없음: 입사일".to_string(),
            Severity::Warning,
            FindingSource::Layer1,
        ));
    }

    for (idx, row) in workbook.rows.iter().enumerate() {
        let info = emp_info(row, columns, idx);
        let display_row = Some(idx + 2);

        check_required_values(row, columns, idx, &info, display_row, &mut errors);
        check_phone(row, columns, &info, display_row, &mut errors);
        check_email(row, columns, &info, display_row, &mut warnings);
        check_birth_date(row, columns, &info, display_row, &mut errors);
        check_salary(row, columns, &info, display_row, &mut errors, &mut warnings);
        check_hire_date(row, columns, &info, display_row, &mut errors, &mut warnings);
        check_separation_date(row, columns, &info, display_row, &mut errors);
        check_non_negative_amounts(row, columns, &info, display_row, &mut errors);
        check_gender(row, columns, &info, display_row, &mut errors);
    }

    check_duplicate_ids(workbook, columns, &mut warnings);

    (errors, warnings)
}

fn check_required_values(
    row: &[String],
    columns: &HashMap<String, usize>,
    _idx: usize,
    info: &str,
    display_row: Option<usize>,
    errors: &mut Vec<Finding>,
) {
    for field in ["사원번호", "생년월일", "기준급여"] {
        if let Some(v) = cell(row, columns, field) {
            if v.trim().is_empty() {
                errors.push(Finding::new(
                    display_row,
                    info,
                    field,
                    "필수 값 누락".to_string(),
                    Severity::Error,
                    FindingSource::Layer1,
                ));
            }
        }
    }
}

fn check_phone(
    row: &[String],
    columns: &HashMap<String, usize>,
    info: &str,
    display_row: Option<usize>,
    errors: &mut Vec<Finding>,
) {
    let Some(phone) = cell(row, columns, "전화번호") else { return };
    let phone = phone.trim();
    if phone.is_empty() || phone.starts_with("PHONE_") {
        return;
    }
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    let ok = digits.starts_with('0') && (digits.len() == 10 || digits.len() == 11);
    if !ok {
        errors.push(Finding::new(
            display_row,
            info,
            "전화번호",
            "전화번호 형식 오류".to_string(),
            Severity::Error,
            FindingSource::Layer1,
        ));
    }
}

fn check_email(
    row: &[String],
    columns: &HashMap<String, usize>,
    info: &str,
    display_row: Option<usize>,
    warnings: &mut Vec<Finding>,
) {
    let Some(email) = cell(row, columns, "이메일") else { return };
    let email = email.trim();
    if email.is_empty() || EMAIL_RE.is_match(email) {
        return;
    }
    warnings.push(Finding::new(
        display_row,
        info,
        "이메일",
        "이메일 형식 경고".to_string(),
        Severity::Warning,
        FindingSource::Layer1,
    ));
}

fn check_birth_date(
    row: &[String],
    columns: &HashMap<String, usize>,
    info: &str,
    display_row: Option<usize>,
    errors: &mut Vec<Finding>,
) {
    let Some(raw) = cell(row, columns, "생년월일") else { return };
    match normalize_date(raw) {
        Some(norm) => {
            let year: i32 = norm[0..4].parse().unwrap_or(0);
            if !(1945..=2010).contains(&year) {
                errors.push(Finding::new(
                    display_row,
                    info,
                    "생년월일",
                    "생년월일 범위 오류".to_string(),
                    Severity::Error,
                    FindingSource::Layer1,
                ));
            }
        }
        None => errors.push(Finding::new(
            display_row,
            info,
            "생년월일",
            "생년월일 형식 오류".to_string(),
            Severity::Error,
            FindingSource::Layer1,
        )),
    }
}

fn check_salary(
    row: &[String],
    columns: &HashMap<String, usize>,
    info: &str,
    display_row: Option<usize>,
    errors: &mut Vec<Finding>,
    warnings: &mut Vec<Finding>,
) {
    let Some(raw) = cell(row, columns, "기준급여") else { return };
    let raw = raw.trim();
    if raw.is_empty() {
        return; // already reported by check_required_values
    }
    match raw.replace(',', "").parse::<f64>() {
        Ok(salary) if salary <= 0.0 => errors.push(Finding::new(
            display_row,
            info,
            "기준급여",
            "기준급여 음수 또는 0".to_string(),
            Severity::Error,
            FindingSource::Layer1,
        )),
        Ok(salary) if salary < MIN_MONTHLY_WAGE as f64 => warnings.push(Finding::new(
            display_row,
            info,
            "기준급여",
            format!("기준급여 {salary:.0}원 - 최저임금(월 206만원) 미달"),
            Severity::Warning,
            FindingSource::Layer1,
        )),
        Ok(_) => {}
        Err(_) => errors.push(Finding::new(
            display_row,
            info,
            "기준급여",
            "기준급여 형식 오류".to_string(),
            Severity::Error,
            FindingSource::Layer1,
        )),
    }
}

fn parse_ymd(norm: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(norm, "%Y%m%d").ok()
}

fn check_hire_date(
    row: &[String],
    columns: &HashMap<String, usize>,
    info: &str,
    display_row: Option<usize>,
    errors: &mut Vec<Finding>,
    warnings: &mut Vec<Finding>,
) {
    let Some(raw) = cell(row, columns, "입사일") else { return };
    let Some(hire_norm) = normalize_date(raw) else { return };
    let Some(hire_date) = parse_ymd(&hire_norm) else { return };

    if hire_date > Utc::now().date_naive() {
        errors.push(Finding::new(
            display_row,
            info,
            "입사일",
            "입사일이 미래임".to_string(),
            Severity::Error,
            FindingSource::Layer1,
        ));
    }

    let Some(birth_raw) = cell(row, columns, "생년월일") else { return };
    let Some(birth_norm) = normalize_date(birth_raw) else { return };
    let Some(birth_date) = parse_ymd(&birth_norm) else { return };

    let age_at_hire = (hire_date - birth_date).num_days() as f64 / 365.25;
    if age_at_hire < 18.0 {
        errors.push(Finding::new(
            display_row,
            info,
            "입사일",
            "입사 나이 18세 미만".to_string(),
            Severity::Error,
            FindingSource::Layer1,
        ));
    }
    if age_at_hire > 70.0 {
        warnings.push(Finding::new(
            display_row,
            info,
            "입사일",
            format!("입사 나이 {}세 (70세 초과)", age_at_hire as i64),
            Severity::Warning,
            FindingSource::Layer1,
        ));
    }
    if hire_date < birth_date {
        errors.push(Finding::new(
            display_row,
            info,
            "입사일",
            "입사일이 생년월일보다 앞섬".to_string(),
            Severity::Error,
            FindingSource::Layer1,
        ));
    }
}

fn check_separation_date(
    row: &[String],
    columns: &HashMap<String, usize>,
    info: &str,
    display_row: Option<usize>,
    errors: &mut Vec<Finding>,
) {
    let separation_field = if columns.contains_key("퇴직일") { "퇴직일" } else { "전환일" };
    let Some(raw) = cell(row, columns, separation_field) else { return };
    let Some(sep_norm) = normalize_date(raw) else { return };
    let Some(hire_raw) = cell(row, columns, "입사일") else { return };
    let Some(hire_norm) = normalize_date(hire_raw) else { return };

    if let (Some(sep_date), Some(hire_date)) = (parse_ymd(&sep_norm), parse_ymd(&hire_norm)) {
        if sep_date < hire_date {
            errors.push(Finding::new(
                display_row,
                info,
                separation_field,
                format!("{separation_field} < 입사일"),
                Severity::Error,
                FindingSource::Layer1,
            ));
        }
    }
}

fn check_non_negative_amounts(
    row: &[String],
    columns: &HashMap<String, usize>,
    info: &str,
    display_row: Option<usize>,
    errors: &mut Vec<Finding>,
) {
    for field in ["퇴직금", "중간정산금액"] {
        let Some(raw) = cell(row, columns, field) else { continue };
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        match raw.replace(',', "").parse::<f64>() {
            Ok(v) if v < 0.0 => errors.push(Finding::new(
                display_row,
                info,
                field,
                format!("{field} 음수"),
                Severity::Error,
                FindingSource::Layer1,
            )),
            Ok(_) => {}
            Err(_) => errors.push(Finding::new(
                display_row,
                info,
                field,
                format!("{field} 형식 오류"),
                Severity::Error,
                FindingSource::Layer1,
            )),
        }
    }
}

fn check_gender(
    row: &[String],
    columns: &HashMap<String, usize>,
    info: &str,
    display_row: Option<usize>,
    errors: &mut Vec<Finding>,
) {
    let Some(raw) = cell(row, columns, "성별") else { return };
    let val = raw.trim();
    if val.is_empty() {
        return;
    }
    if !VALID_GENDER_VALUES.contains(&val.to_lowercase().as_str()) {
        errors.push(Finding::new(
            display_row,
            info,
            "성별",
            format!("성별 값 오류: {val}"),
            Severity::Error,
            FindingSource::Layer1,
        ));
    }
}

fn check_duplicate_ids(workbook: &ParsedWorkbook, columns: &HashMap<String, usize>, warnings: &mut Vec<Finding>) {
    let Some(&col) = columns.get("사원번호") else { return };
    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, row) in workbook.rows.iter().enumerate() {
        let id = row.get(col).map(|s| s.trim()).unwrap_or("");
        if id.is_empty() {
            continue;
        }
        groups.entry(id).or_default().push(idx);
    }
    let mut groups: Vec<(&str, Vec<usize>)> = groups.into_iter().filter(|(_, rows)| rows.len() > 1).collect();
    groups.sort_by_key(|(_, rows)| rows[0]);
    for (id, rows) in groups {
        warnings.push(Finding::new(
            Some(rows[0] + 1),
            format!("{id} (행 {})", rows[0] + 1),
            "사원번호",
            format!("중복 사원번호 {}건", rows.len()),
            Severity::Warning,
            FindingSource::Layer1,
        ));
    }
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
    fn missing_required_value_is_an_error() {
        let (wb, cols) = workbook(&["사원번호", "생년월일", "기준급여"], vec![vec!["", "19900101", "3000000"]]);
        let (errors, _) = validate(&wb, &cols);
        assert!(errors.iter().any(|e| e.field == "사원번호" && e.message == "필수 값 누락"));
    }

    #[test]
    fn salary_below_minimum_wage_is_a_warning_not_an_error() {
        let (wb, cols) = workbook(&["사원번호", "생년월일", "기준급여"], vec![vec!["1", "19900101", "1000000"]]);
        let (errors, warnings) = validate(&wb, &cols);
        assert!(!errors.iter().any(|e| e.field == "기준급여"));
        assert!(warnings.iter().any(|w| w.field == "기준급여"));
    }

    #[test]
    fn negative_salary_is_an_error() {
        let (wb, cols) = workbook(&["사원번호", "생년월일", "기준급여"], vec![vec!["1", "19900101", "-1"]]);
        let (errors, _) = validate(&wb, &cols);
        assert!(errors.iter().any(|e| e.field == "기준급여" && e.message.contains("음수")));
    }

    #[test]
    fn underage_hire_is_an_error() {
        let (wb, cols) = workbook(
            &["사원번호", "생년월일", "기준급여", "입사일"],
            vec![vec!["1", "20100101", "3000000", "20200101"]],
        );
        let (errors, _) = validate(&wb, &cols);
        assert!(errors.iter().any(|e| e.message == "입사 나이 18세 미만"));
    }

    #[test]
    fn duplicate_employee_ids_produce_one_warning_per_group() {
        let (wb, cols) = workbook(
            &["사원번호", "생년월일", "기준급여"],
            vec![
                vec!["1", "19900101", "3000000"],
                vec!["1", "19900101", "3000000"],
                vec!["2", "19900101", "3000000"],
            ],
        );
        let (_, warnings) = validate(&wb, &cols);
        let dup_warnings: Vec<_> = warnings.iter().filter(|w| w.message.contains("중복 사원번호")).collect();
        assert_eq!(dup_warnings.len(), 1);
        assert!(dup_warnings[0].message.contains("2건"));
    }

    #[test]
    fn invalid_gender_value_is_an_error() {
        let (wb, cols) = workbook(&["사원번호", "생년월일", "기준급여", "성별"], vec![vec!["1", "19900101", "3000000", "3"]]);
        let (errors, _) = validate(&wb, &cols);
        assert!(errors.iter().any(|e| e.field == "성별"));
    }
}
