//! Standard Schema (C1): a static registry of canonical field names.
//!
//! No runtime mutation after `StandardSchema::default()` is built. Canonical names
//! are globally unique; an alias never collides with another field's canonical name
//! (checked at construction, since a silently-shadowed alias would be a logical bug
//! rather than a recoverable one).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Data type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Date,
    Category,
}

/// Which sheet(s) a field is relevant to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetAffinity {
    Active,       // 재직자
    Departed,     // 퇴직자
    Supplemental, // 추가
    All,
}

impl SheetAffinity {
    pub fn matches(&self, sheet: SheetAffinity) -> bool {
        matches!(self, SheetAffinity::All) || *self == sheet
    }
}

/// Specification for a single canonical field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub sheet: SheetAffinity,
    pub aliases: Vec<String>,
    pub examples: Vec<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType, sheet: SheetAffinity) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            sheet,
            aliases: Vec::new(),
            examples: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_examples(mut self, examples: &[&str]) -> Self {
        self.examples = examples.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// Normalize a header/field name the same way the Header Matcher does: strip
/// bracketed annotations, collapse whitespace, lowercase.
pub fn normalize(raw: &str) -> String {
    let no_parens = strip_parenthetical(raw);
    let collapsed = no_parens.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.to_lowercase()
}

fn strip_parenthetical(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0i32;
    for c in s.chars() {
        match c {
            '(' | '（' => depth += 1,
            ')' | '）' => {
                if depth > 0 {
                    depth -= 1;
                }
            }
            '\n' => out.push(' '),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

/// The canonical field registry. Immutable after construction; lock-free reads.
#[derive(Debug, Clone)]
pub struct StandardSchema {
    fields: Vec<FieldSpec>,
    /// normalized alias or canonical name -> index into `fields`, first-declared wins.
    resolve_index: HashMap<String, usize>,
}

impl StandardSchema {
    /// Build the registry from a declaration list, checking the invariant that no
    /// alias collides with another field's canonical name.
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        let mut resolve_index: HashMap<String, usize> = HashMap::new();

        // Canonical names are indexed first, in declaration order, so that a
        // header which matches both a canonical name and some other field's
        // alias resolves to the canonical owner.
        for (i, f) in fields.iter().enumerate() {
            let key = normalize(&f.name);
            resolve_index.entry(key).or_insert(i);
        }

        // Aliases fill in remaining slots; ties between two canonical fields'
        // aliases are broken by declaration order (first-declared wins).
        for (i, f) in fields.iter().enumerate() {
            for alias in &f.aliases {
                let key = normalize(alias);
                resolve_index.entry(key).or_insert(i);
            }
        }

        Self { fields, resolve_index }
    }

    /// Descriptors whose affinity matches `sheet` or is `All`.
    pub fn fields(&self, sheet: SheetAffinity) -> Vec<&FieldSpec> {
        self.fields.iter().filter(|f| f.sheet.matches(sheet)).collect()
    }

    /// Canonical names with `required = true` for `sheet`.
    pub fn required(&self, sheet: SheetAffinity) -> Vec<&str> {
        self.fields(sheet)
            .into_iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Resolve an alias or canonical name (case-/punctuation-insensitive after
    /// normalization identical to the Matcher's) to a canonical name.
    pub fn resolve(&self, alias: &str) -> Option<&str> {
        let key = normalize(alias);
        self.resolve_index.get(&key).map(|&i| self.fields[i].name.as_str())
    }

    pub fn all_fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, canonical_name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == canonical_name)
    }
}

/// Minimum-monthly-wage constant consulted by the Layer-1 Validator.
pub const MIN_MONTHLY_WAGE: i64 = 2_060_740;

impl Default for StandardSchema {
    fn default() -> Self {
        use FieldType::*;
        use SheetAffinity::*;

        Self::new(vec![
            FieldSpec::new("사원번호", String, All)
                .required()
                .with_aliases(&["사번", "employee_id", "emp_no", "직원번호"]),
            FieldSpec::new("이름", String, All)
                .required()
                .with_aliases(&["성명", "name", "직원명"]),
            FieldSpec::new("생년월일", Date, All)
                .required()
                .with_aliases(&["생일", "birth_date", "생년월일자", "출생일"]),
            FieldSpec::new("입사일", Date, All)
                .required()
                .with_aliases(&["입사년월일", "입사일자", "hire_date", "입사"]),
            FieldSpec::new("성별", Category, All)
                .required()
                .with_aliases(&["성", "gender", "sex"]),
            FieldSpec::new("종업원구분", Category, All)
                .required()
                .with_aliases(&["직급구분", "employee_class", "직원구분", "구분"]),
            FieldSpec::new("기준급여", Number, Active)
                .required()
                .with_aliases(&["월급", "base_salary", "기준임금", "급여"]),
            FieldSpec::new("전화번호", String, All).with_aliases(&["연락처", "phone", "휴대폰번호"]),
            FieldSpec::new("이메일", String, All).with_aliases(&["email", "메일", "이메일주소"]),
            FieldSpec::new("퇴직일", Date, Departed)
                .with_aliases(&["퇴사일", "퇴직일자", "termination_date", "퇴사일자"]),
            FieldSpec::new("전환일", Date, Supplemental).with_aliases(&["전환일자", "conversion_date"]),
            FieldSpec::new("퇴직금", Number, Departed).with_aliases(&["퇴직급여", "severance_pay"]),
            FieldSpec::new("중간정산금액", Number, Supplemental).with_aliases(&["중간정산액"]),
            FieldSpec::new("참고사항", String, All).with_aliases(&["비고", "메모", "note", "remark", "comment"]),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_parens_and_newlines() {
        assert_eq!(normalize("성별\n(1:남, 2:여)"), "성별");
    }

    #[test]
    fn canonical_name_wins_over_alias_collision() {
        let schema = StandardSchema::new(vec![
            FieldSpec::new("A", FieldType::String, SheetAffinity::All).with_aliases(&["b"]),
            FieldSpec::new("B", FieldType::String, SheetAffinity::All),
        ]);
        // "b" is both field B's canonical name and field A's alias; canonical
        // names are indexed first so "b" resolves to field B.
        assert_eq!(schema.resolve("b"), Some("B"));
    }

    #[test]
    fn alias_tie_break_is_declaration_order() {
        let schema = StandardSchema::new(vec![
            FieldSpec::new("First", FieldType::String, SheetAffinity::All).with_aliases(&["x"]),
            FieldSpec::new("Second", FieldType::String, SheetAffinity::All).with_aliases(&["x"]),
        ]);
        assert_eq!(schema.resolve("x"), Some("First"));
    }

    #[test]
    fn required_filters_by_sheet() {
        let schema = StandardSchema::default();
        let req = schema.required(SheetAffinity::Active);
        assert!(req.contains(&"사원번호"));
        assert!(req.contains(&"기준급여"));
    }

    #[test]
    fn resolve_unknown_returns_none() {
        let schema = StandardSchema::default();
        assert_eq!(schema.resolve("완전히모르는컬럼"), None);
    }
}
