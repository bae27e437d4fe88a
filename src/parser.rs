//! Parser (C2): decode uploaded bytes into (headers, rows, metadata).

use std::io::Cursor;

use calamine::{open_workbook_from_rs, Data, Reader, Xls, Xlsx};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single parsed row, keyed by header position.
pub type Row = Vec<String>;

/// Which decoder produced the parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserKind {
    Xlsx,
    Xls,
    DelimitedText,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseMeta {
    pub parser_kind: Option<ParserKind>,
    pub rows_skipped_empty: usize,
    pub rows_skipped_description: usize,
    pub detected_column_types: Vec<String>,
    pub sheet_name: Option<String>,
    pub row_cap_applied: bool,
    pub raw_row_count: usize,
}

/// A parsed workbook: invariant every row has exactly `headers.len()` cells; empty
/// and description rows are filtered before this is constructed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedWorkbook {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
    pub meta: ParseMeta,
}

/// Encoding used for delimited-text decoding, rotated by the Retry Strategy's
/// ALTERNATIVE_PARSER strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Cp949,
    EucKr,
    Latin1,
}

impl TextEncoding {
    pub const ROTATION: [TextEncoding; 4] =
        [TextEncoding::Utf8, TextEncoding::Cp949, TextEncoding::EucKr, TextEncoding::Latin1];

    pub fn next(self) -> TextEncoding {
        let idx = Self::ROTATION.iter().position(|e| *e == self).unwrap_or(0);
        Self::ROTATION[(idx + 1) % Self::ROTATION.len()]
    }

    fn decode(self, bytes: &[u8]) -> String {
        let encoding = match self {
            TextEncoding::Utf8 => encoding_rs::UTF_8,
            TextEncoding::Cp949 => encoding_rs::EUC_KR, // cp949 is a superset encoding_rs treats as euc-kr
            TextEncoding::EucKr => encoding_rs::EUC_KR,
            TextEncoding::Latin1 => encoding_rs::WINDOWS_1252,
        };
        let (cow, _, _) = encoding.decode(bytes);
        cow.into_owned()
    }
}

pub struct ParserConfig {
    pub max_rows: usize,
    pub encoding: TextEncoding,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self { max_rows: 5000, encoding: TextEncoding::Utf8 }
    }
}

const DESCRIPTION_KEYWORDS: [&str; 3] = ["※", "양식", "입력"];

/// Classify bytes by magic number and dispatch to the matching decoder.
pub fn parse_workbook(bytes: &[u8], config: &ParserConfig) -> Result<ParsedWorkbook> {
    if bytes.len() >= 4 && &bytes[0..4] == b"PK\x03\x04" {
        parse_xlsx(bytes, config)
    } else if bytes.len() >= 2 && &bytes[0..2] == b"\xD0\xCF" {
        parse_xls(bytes, config)
    } else {
        parse_delimited(bytes, config)
    }
}

fn parse_xlsx(bytes: &[u8], config: &ParserConfig) -> Result<ParsedWorkbook> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut wb: Xlsx<_> =
        open_workbook_from_rs(cursor).map_err(|e| Error::input(format!("xlsx decode failed: {e}")))?;
    let sheet_names = wb.sheet_names().to_vec();
    let sheet_name = select_sheet(&sheet_names);
    let range = wb
        .worksheet_range(&sheet_name)
        .map_err(|e| Error::input(format!("sheet '{sheet_name}' unreadable: {e}")))?;
    build_from_rows(calamine_rows(&range), ParserKind::Xlsx, Some(sheet_name), config)
}

fn parse_xls(bytes: &[u8], config: &ParserConfig) -> Result<ParsedWorkbook> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut wb: Xls<_> =
        open_workbook_from_rs(cursor).map_err(|e| Error::input(format!("xls decode failed: {e}")))?;
    let sheet_names = wb.sheet_names().to_vec();
    let sheet_name = select_sheet(&sheet_names);
    let range = wb
        .worksheet_range(&sheet_name)
        .map_err(|e| Error::input(format!("sheet '{sheet_name}' unreadable: {e}")))?;
    build_from_rows(calamine_rows(&range), ParserKind::Xls, Some(sheet_name), config)
}

fn calamine_rows(range: &calamine::Range<Data>) -> Vec<Vec<String>> {
    range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>())
        .collect()
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => {
            if let Some(d) = excel_serial_to_date(*f) {
                d
            } else if f.fract() == 0.0 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR:{e:?}"),
    }
}

/// Sheet selection for legacy workbooks (§4.2): this ordering is part of the
/// contract, not an implementation detail.
fn select_sheet(names: &[String]) -> String {
    if let Some(n) = names.iter().find(|n| n.contains("(2-2)") && n.contains("재직자")) {
        return n.clone();
    }
    if let Some(n) = names.iter().find(|n| n.contains("재직자명부") && n.contains("시스템")) {
        return n.clone();
    }
    if let Some(n) = names.iter().find(|n| n.contains("재직자") && n.contains("명부")) {
        return n.clone();
    }
    names.first().cloned().unwrap_or_default()
}

fn parse_delimited(bytes: &[u8], config: &ParserConfig) -> Result<ParsedWorkbook> {
    let text = config.encoding.decode(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_reader(text.as_bytes());

    let mut rows: Vec<Vec<String>> = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| Error::input(format!("delimited-text decode failed: {e}")))?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }
    build_from_rows(rows, ParserKind::DelimitedText, None, config)
}

fn build_from_rows(
    raw_rows: Vec<Vec<String>>,
    kind: ParserKind,
    sheet_name: Option<String>,
    config: &ParserConfig,
) -> Result<ParsedWorkbook> {
    let raw_row_count = raw_rows.len();
    let mut iter = raw_rows.into_iter();

    let header_row = loop {
        match iter.next() {
            Some(row) if row.iter().any(|c| !c.trim().is_empty()) => break row,
            Some(_) => continue,
            None => return Err(Error::input("no header row found")),
        }
    };

    let headers: Vec<String> = header_row.iter().map(|h| normalize_header(h)).collect();
    let width = headers.len();

    // Heuristic: identifying column is the first header resolving to 사원번호/name-ish
    // content, or just column 0 if none is obviously an id column.
    let id_col = 0usize;
    let note_col = headers
        .iter()
        .position(|h| h.contains("비고") || h.contains("참고") || h.contains("메모"));

    let mut rows = Vec::new();
    let mut skipped_empty = 0usize;
    let mut skipped_description = 0usize;
    let mut truncated = false;

    for raw in iter {
        let mut cells: Vec<String> = raw;
        if cells.len() < width {
            cells.resize(width, String::new());
        } else if cells.len() > width {
            cells.truncate(width);
        }

        if is_empty_row(&cells) {
            skipped_empty += 1;
            continue;
        }
        if is_description_row(&cells, id_col, note_col) {
            skipped_description += 1;
            continue;
        }

        if rows.len() >= config.max_rows {
            truncated = true;
            break;
        }

        let normalized = cells
            .into_iter()
            .map(|c| normalize_identifier_cell(&c))
            .collect::<Vec<_>>();
        rows.push(normalized);
    }

    if headers.is_empty() && rows.is_empty() {
        return Err(Error::input("empty workbook"));
    }

    Ok(ParsedWorkbook {
        headers,
        rows,
        meta: ParseMeta {
            parser_kind: Some(kind),
            rows_skipped_empty: skipped_empty,
            rows_skipped_description: skipped_description,
            detected_column_types: Vec::new(),
            sheet_name,
            row_cap_applied: truncated,
            raw_row_count,
        },
    })
}

/// Strip embedded newlines and bracketed annotations from a header; collapse
/// whitespace to single spaces. `"성별\n(1:남, 2:여)"` becomes `"성별"`.
pub fn normalize_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0i32;
    for c in raw.chars() {
        match c {
            '(' | '（' | '[' => depth += 1,
            ')' | '）' | ']' => {
                if depth > 0 {
                    depth -= 1;
                }
            }
            '\n' | '\r' => out.push(' '),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_empty_row(cells: &[String]) -> bool {
    cells.iter().all(|c| c.trim().is_empty())
}

fn is_description_row(cells: &[String], id_col: usize, note_col: Option<usize>) -> bool {
    let identifier_numeric = cells
        .get(id_col)
        .map(|c| c.trim().chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false))
        .unwrap_or(false);
    if identifier_numeric {
        return false;
    }
    if let Some(nc) = note_col {
        if let Some(note) = cells.get(nc) {
            if DESCRIPTION_KEYWORDS.iter().any(|kw| note.contains(kw)) {
                return true;
            }
        }
    }
    // No note column / no keyword hit: fall back to "identifier column has no
    // numeric value" being necessary but not sufficient on its own.
    false
}

/// Strip a trailing `.0` (Excel-origin float artefact) from an identifier-looking
/// cell, e.g. `"190001.0"` -> `"190001"`.
fn normalize_identifier_cell(cell: &str) -> String {
    let trimmed = cell.trim();
    if let Some(stripped) = trimmed.strip_suffix(".0") {
        if stripped.chars().all(|c| c.is_ascii_digit()) && !stripped.is_empty() {
            return stripped.to_string();
        }
    }
    trimmed.to_string()
}

/// Normalize a date value to canonical `YYYYMMDD` (8-digit string), or `None` if
/// it cannot be recognized. Idempotent: `normalize_date(normalize_date(x)) ==
/// normalize_date(x)`.
pub fn normalize_date(raw: &str) -> Option<String> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    // Excel serial day-number, base 1899-12-30, only in the plausible range.
    if let Ok(n) = s.parse::<f64>() {
        if n.fract() == 0.0 {
            let i = n as i64;
            if (10_000..80_000).contains(&i) {
                return excel_serial_to_date(n);
            }
        }
    }

    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();

    // YYYYMMDD
    if digits.len() == 8 {
        if is_valid_ymd(&digits[0..4], &digits[4..6], &digits[6..8]) {
            return Some(digits);
        }
    }

    // YYMMDD -> century rule: YY <= 49 -> 2000s, else 1900s.
    if digits.len() == 6 {
        let yy: i32 = digits[0..2].parse().ok()?;
        let century = if yy <= 49 { 2000 } else { 1900 };
        let year = format!("{:04}", century + yy);
        let mm = &digits[2..4];
        let dd = &digits[4..6];
        if is_valid_ymd(&year, mm, dd) {
            return Some(format!("{year}{mm}{dd}"));
        }
    }

    None
}

fn is_valid_ymd(y: &str, m: &str, d: &str) -> bool {
    let (Ok(y), Ok(m), Ok(d)) = (y.parse::<i32>(), m.parse::<u32>(), d.parse::<u32>()) else {
        return false;
    };
    (1..=9999).contains(&y) && (1..=12).contains(&m) && (1..=31).contains(&d)
}

fn excel_serial_to_date(serial: f64) -> Option<String> {
    use chrono::{Duration, NaiveDate};
    if serial.fract() != 0.0 {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let date = base.checked_add_signed(Duration::days(serial as i64))?;
    Some(date.format("%Y%m%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_normalization_strips_annotation() {
        assert_eq!(normalize_header("성별\n(1:남, 2:여)"), "성별");
    }

    #[test]
    fn yymmdd_century_rule() {
        assert_eq!(normalize_date("491231"), Some("20491231".to_string()));
        assert_eq!(normalize_date("501231"), Some("19501231".to_string()));
    }

    #[test]
    fn date_normalize_is_idempotent() {
        let once = normalize_date("20231225").unwrap();
        let twice = normalize_date(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn identifier_strips_trailing_float_artefact() {
        assert_eq!(normalize_identifier_cell("190001.0"), "190001");
    }

    #[test]
    fn empty_workbook_is_input_error() {
        let result = parse_workbook(b"", &ParserConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn delimited_csv_round_trips_headers_and_rows() {
        let csv_bytes = "사원번호,이름\n1,Kim\n2,Lee\n".as_bytes();
        let parsed = parse_workbook(csv_bytes, &ParserConfig::default()).unwrap();
        assert_eq!(parsed.headers, vec!["사원번호", "이름"]);
        assert_eq!(parsed.rows.len(), 2);
        assert!(parsed.rows.iter().all(|r| r.len() == parsed.headers.len()));
    }

    #[test]
    fn row_cap_is_recorded_in_meta() {
        let mut csv_text = String::from("id,name\n");
        for i in 0..10 {
            csv_text.push_str(&format!("{i},n{i}\n"));
        }
        let mut config = ParserConfig::default();
        config.max_rows = 5;
        let parsed = parse_workbook(csv_text.as_bytes(), &config).unwrap();
        assert_eq!(parsed.rows.len(), 5);
        assert!(parsed.meta.row_cap_applied);
    }
}
