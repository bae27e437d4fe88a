//! Knowledge Base (C13): curated system-context digest plus a persisted log
//! of training examples (AI hits, AI misses, human corrections) used to
//! improve future Layer-AI prompts and post-incident review.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Curated Korean-language system overview injected into AI prompts so the
/// model has consistent background on the domain without re-deriving it from
/// raw column data each time.
pub const SYSTEM_DIGEST: &str = "\
이 시스템은 한국 기업의 퇴직연금/인사 명부 데이터를 검증하고 표준 스키마로 정리합니다. \
재직자명부, 퇴직자명부, 추가(중간정산/전환) 명부 세 종류의 시트를 다루며, \
사원번호/이름/생년월일/입사일/성별/종업원구분/기준급여가 핵심 필드입니다. \
최저임금(2024년 기준 월 2,060,740원), 만 18세 미만 입사 금지, 날짜 선후관계 등의 \
법적/상식적 제약을 기준으로 이상치를 판단합니다.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingExample {
    pub id: Option<i64>,
    pub category: String,
    pub input_data: Value,
    pub ai_response: Value,
    pub human_correction: Option<Value>,
    pub is_correct: bool,
}

/// A standing rule consulted by the Layer-AI prompt builder, e.g. "a salary
/// below minimum wage for a full-time row is an error". `condition` is a
/// free-text description, not an executable expression: the LLM reads it as
/// prose, the rule layer doesn't evaluate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeRule {
    pub id: Option<i64>,
    pub field: String,
    pub condition: String,
    pub message: String,
    pub severity: String,
    pub category: String,
}

/// Length of the interpretation prefix used to key corrections, so near-
/// identical corrections for the same field collapse into one learned entry
/// instead of accumulating duplicates.
const CORRECTION_KEY_LEN: usize = 30;

pub struct KnowledgeBase {
    conn: Arc<Mutex<Connection>>,
}

impl KnowledgeBase {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn init(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS training_examples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                category TEXT NOT NULL,
                input_data TEXT NOT NULL,
                ai_response TEXT NOT NULL,
                human_correction TEXT,
                is_correct INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                field TEXT NOT NULL,
                condition TEXT NOT NULL,
                message TEXT NOT NULL,
                severity TEXT NOT NULL,
                category TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS corrections (
                field TEXT NOT NULL,
                interpretation_key TEXT NOT NULL,
                original_value TEXT,
                was_error INTEGER NOT NULL,
                correct_interpretation TEXT NOT NULL,
                diagnostic_context TEXT,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (field, interpretation_key)
            )",
            [],
        )?;
        Ok(())
    }

    /// Register a standing rule. Returns the new rule's id.
    pub fn add_rule(
        &self,
        field: impl Into<String>,
        condition: impl Into<String>,
        message: impl Into<String>,
        severity: impl Into<String>,
        category: impl Into<String>,
    ) -> Result<i64> {
        let conn = self.conn.lock().map_err(|_| Error::internal("knowledge base lock poisoned"))?;
        conn.execute(
            "INSERT INTO rules (field, condition, message, severity, category) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![field.into(), condition.into(), message.into(), severity.into(), category.into()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The active rule set, in declaration order, consulted by the Layer-AI
    /// prompt builder alongside the curated system digest.
    pub fn rules(&self) -> Result<Vec<KnowledgeRule>> {
        let conn = self.conn.lock().map_err(|_| Error::internal("knowledge base lock poisoned"))?;
        let mut stmt = conn.prepare(
            "SELECT id, field, condition, message, severity, category FROM rules ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(KnowledgeRule {
                    id: row.get(0)?,
                    field: row.get(1)?,
                    condition: row.get(2)?,
                    message: row.get(3)?,
                    severity: row.get(4)?,
                    category: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Record a human correction of an AI (or rule-layer) finding, keyed by
    /// `(field, first 30 chars of correct_interpretation)` so repeated
    /// corrections of the same substance update one entry instead of piling up.
    pub fn learn_from_correction(
        &self,
        field: impl Into<String>,
        original_value: Option<&str>,
        was_error: bool,
        correct_interpretation: impl Into<String>,
        diagnostic_context: Option<&Value>,
    ) -> Result<()> {
        let field = field.into();
        let correct_interpretation = correct_interpretation.into();
        let key: String = correct_interpretation.chars().take(CORRECTION_KEY_LEN).collect();
        let conn = self.conn.lock().map_err(|_| Error::internal("knowledge base lock poisoned"))?;
        conn.execute(
            "INSERT INTO corrections (field, interpretation_key, original_value, was_error, correct_interpretation, diagnostic_context, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))
             ON CONFLICT(field, interpretation_key) DO UPDATE SET
                original_value = excluded.original_value,
                was_error = excluded.was_error,
                correct_interpretation = excluded.correct_interpretation,
                diagnostic_context = excluded.diagnostic_context,
                updated_at = datetime('now')",
            params![
                field,
                key,
                original_value,
                was_error as i64,
                correct_interpretation,
                diagnostic_context.map(|v| v.to_string()),
            ],
        )?;
        Ok(())
    }

    /// Persist an example. Used both when a human corrects an AI finding, and
    /// when a rule layer catches something the AI layer missed (`is_correct =
    /// false`, `category = "layer1_error"`) so future prompts can be tuned.
    pub fn save_example(&self, example: &TrainingExample) -> Result<i64> {
        let conn = self.conn.lock().map_err(|_| Error::internal("knowledge base lock poisoned"))?;
        conn.execute(
            "INSERT INTO training_examples (category, input_data, ai_response, human_correction, is_correct)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                example.category,
                example.input_data.to_string(),
                example.ai_response.to_string(),
                example.human_correction.as_ref().map(|v| v.to_string()),
                example.is_correct as i64,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn examples_by_category(&self, category: &str, limit: usize) -> Result<Vec<TrainingExample>> {
        let conn = self.conn.lock().map_err(|_| Error::internal("knowledge base lock poisoned"))?;
        let mut stmt = conn.prepare(
            "SELECT id, category, input_data, ai_response, human_correction, is_correct
             FROM training_examples WHERE category = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![category, limit as i64], |row| {
                let input_data: String = row.get(2)?;
                let ai_response: String = row.get(3)?;
                let human_correction: Option<String> = row.get(4)?;
                let is_correct: i64 = row.get(5)?;
                Ok(TrainingExample {
                    id: row.get(0)?,
                    category: row.get(1)?,
                    input_data: serde_json::from_str(&input_data).unwrap_or(Value::Null),
                    ai_response: serde_json::from_str(&ai_response).unwrap_or(Value::Null),
                    human_correction: human_correction.and_then(|s| serde_json::from_str(&s).ok()),
                    is_correct: is_correct != 0,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn incorrect_count(&self) -> Result<usize> {
        let conn = self.conn.lock().map_err(|_| Error::internal("knowledge base lock poisoned"))?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM training_examples WHERE is_correct = 0", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(category: &str, is_correct: bool) -> TrainingExample {
        TrainingExample {
            id: None,
            category: category.to_string(),
            input_data: serde_json::json!({"field": "기준급여"}),
            ai_response: serde_json::json!({"detected": false}),
            human_correction: None,
            is_correct,
        }
    }

    #[test]
    fn save_and_fetch_by_category() {
        let kb = KnowledgeBase::in_memory().unwrap();
        kb.save_example(&sample("layer1_error", false)).unwrap();
        kb.save_example(&sample("layer1_error", false)).unwrap();
        kb.save_example(&sample("human_correction", true)).unwrap();

        let fetched = kb.examples_by_category("layer1_error", 10).unwrap();
        assert_eq!(fetched.len(), 2);
    }

    #[test]
    fn incorrect_count_reflects_ai_misses() {
        let kb = KnowledgeBase::in_memory().unwrap();
        kb.save_example(&sample("layer1_error", false)).unwrap();
        kb.save_example(&sample("human_correction", true)).unwrap();
        assert_eq!(kb.incorrect_count().unwrap(), 1);
    }

    #[test]
    fn system_digest_mentions_minimum_wage_constant() {
        assert!(SYSTEM_DIGEST.contains("2,060,740"));
    }

    #[test]
    fn added_rules_are_returned_in_declaration_order() {
        let kb = KnowledgeBase::in_memory().unwrap();
        kb.add_rule("기준급여", "salary < minimum wage", "최저임금 미달", "error", "wage").unwrap();
        kb.add_rule("생년월일", "age at hire < 18", "미성년 입사", "warning", "age").unwrap();

        let rules = kb.rules().unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].field, "기준급여");
        assert_eq!(rules[1].field, "생년월일");
    }

    #[test]
    fn learn_from_correction_upserts_on_matching_key() {
        let kb = KnowledgeBase::in_memory().unwrap();
        kb.learn_from_correction("기준급여", Some("1000000"), true, "세후 금액이므로 최저임금 위반 아님", None).unwrap();
        kb.learn_from_correction("기준급여", Some("1000000"), false, "세후 금액이므로 최저임금 위반 아님 (수정)", None).unwrap();

        let conn = kb.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM corrections", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn learn_from_correction_keys_on_interpretation_prefix_only() {
        let kb = KnowledgeBase::in_memory().unwrap();
        let prefix = "same thirty character prefix!!";
        assert_eq!(prefix.chars().count(), CORRECTION_KEY_LEN);
        let long_a = format!("{prefix} tail one");
        let long_b = format!("{prefix} a completely different tail");
        kb.learn_from_correction("입사일", None, true, long_a, None).unwrap();
        kb.learn_from_correction("입사일", None, true, long_b, None).unwrap();

        let conn = kb.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM corrections", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 1);
    }
}
