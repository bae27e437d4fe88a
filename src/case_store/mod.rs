//! Case Store (C3): content-addressed memory of prior successful header mappings.

pub mod schema;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::header_matcher::HeaderMatch;
use crate::schema::normalize;

/// A persisted record of a prior successful (or human-corrected) mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    pub case_id: String,
    pub timestamp: DateTime<Utc>,
    pub headers: Vec<String>,
    pub normalized_headers: Vec<String>,
    pub matches: Vec<HeaderMatch>,
    pub confidence: f64,
    pub was_auto_approved: bool,
    pub human_corrections: Option<Value>,
    pub metadata: Option<Value>,
}

/// A case ranked by similarity to a query header set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCase {
    pub case: CaseRecord,
    pub similarity: f64,
}

/// A distilled few-shot example for prompt injection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FewShotExample {
    pub input_headers: Vec<String>,
    pub output_matches: Vec<HeaderMatch>,
    pub human_corrections: Option<Value>,
    pub priority: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseStoreStats {
    pub total_cases: usize,
    pub auto_approved: usize,
    pub auto_approval_ratio: f64,
    pub distinct_header_patterns: usize,
}

/// `case_id = hash(sorted(normalized(headers)))` — content-addressed, so saving
/// the same header set twice returns the same id.
pub fn compute_case_id(headers: &[String]) -> String {
    let mut normalized: Vec<String> = headers.iter().map(|h| normalize(h)).collect();
    normalized.sort();
    let joined = normalized.join("\u{1f}");
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// SQLite-backed, single-writer case store.
pub struct CaseStore {
    conn: Arc<Mutex<Connection>>,
}

impl CaseStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        if !schema::is_initialized(&conn) {
            schema::initialize_schema(&conn)?;
        }
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self.conn.lock().map_err(|_| Error::internal("case store lock poisoned"))?;
        Ok(f(&conn)?)
    }

    /// Upsert by content-addressed id. Writes the case row and rebuilds that
    /// case's header-pattern index entries atomically (single-writer lock held
    /// for the whole transaction, so readers never see a torn state).
    pub fn save(
        &self,
        headers: &[String],
        matches: &[HeaderMatch],
        confidence: f64,
        was_auto_approved: bool,
        human_corrections: Option<Value>,
        metadata: Option<Value>,
    ) -> Result<String> {
        let case_id = compute_case_id(headers);
        let normalized_headers: Vec<String> = headers.iter().map(|h| normalize(h)).collect();

        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO cases (case_id, headers, normalized_headers, matches, confidence,
                    was_auto_approved, human_corrections, metadata, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now'))
                 ON CONFLICT(case_id) DO UPDATE SET
                    headers = excluded.headers,
                    normalized_headers = excluded.normalized_headers,
                    matches = excluded.matches,
                    confidence = excluded.confidence,
                    was_auto_approved = excluded.was_auto_approved,
                    human_corrections = excluded.human_corrections,
                    metadata = excluded.metadata,
                    updated_at = datetime('now')",
                params![
                    case_id,
                    serde_json::to_string(headers).unwrap_or_default(),
                    serde_json::to_string(&normalized_headers).unwrap_or_default(),
                    serde_json::to_string(matches).unwrap_or_default(),
                    confidence,
                    was_auto_approved as i64,
                    human_corrections.as_ref().map(|v| v.to_string()),
                    metadata.as_ref().map(|v| v.to_string()),
                ],
            )?;

            tx.execute("DELETE FROM header_patterns WHERE case_id = ?1", params![case_id])?;
            for h in &normalized_headers {
                tx.execute(
                    "INSERT OR IGNORE INTO header_patterns (normalized_header, case_id) VALUES (?1, ?2)",
                    params![h, case_id],
                )?;
            }

            tx.commit()?;
            Ok(case_id)
        })
    }

    fn row_to_case(
        case_id: String,
        timestamp: String,
        headers_json: String,
        normalized_headers_json: String,
        matches_json: String,
        confidence: f64,
        was_auto_approved: i64,
        human_corrections_json: Option<String>,
        metadata_json: Option<String>,
    ) -> CaseRecord {
        CaseRecord {
            case_id,
            timestamp: timestamp.parse().unwrap_or_else(|_| Utc::now()),
            headers: serde_json::from_str(&headers_json).unwrap_or_default(),
            normalized_headers: serde_json::from_str(&normalized_headers_json).unwrap_or_default(),
            matches: serde_json::from_str(&matches_json).unwrap_or_default(),
            confidence,
            was_auto_approved: was_auto_approved != 0,
            human_corrections: human_corrections_json.and_then(|s| serde_json::from_str(&s).ok()),
            metadata: metadata_json.and_then(|s| serde_json::from_str(&s).ok()),
        }
    }

    fn all_cases(&self) -> Result<Vec<CaseRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT case_id, updated_at, headers, normalized_headers, matches, confidence,
                        was_auto_approved, human_corrections, metadata FROM cases",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(Self::row_to_case(
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Jaccard-like nearest-neighbour lookup: for each candidate case, count
    /// headers whose normalized form is shared with the query and divide by the
    /// union size; filter by `min_overlap`, return top `k` by similarity descending.
    pub fn find_similar(&self, headers: &[String], k: usize, min_overlap: f64) -> Result<Vec<RankedCase>> {
        let query: BTreeSet<String> = headers.iter().map(|h| normalize(h)).collect();
        let mut ranked: Vec<RankedCase> = self
            .all_cases()?
            .into_iter()
            .filter_map(|case| {
                let candidate: BTreeSet<String> = case.normalized_headers.iter().cloned().collect();
                let intersection = query.intersection(&candidate).count();
                let union = query.union(&candidate).count();
                if union == 0 {
                    return None;
                }
                let similarity = intersection as f64 / union as f64;
                if similarity >= min_overlap {
                    Some(RankedCase { case, similarity })
                } else {
                    None
                }
            })
            .collect();

        ranked.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(k);
        Ok(ranked)
    }

    /// Exact normalized-header index lookup, sorted most-recent-first.
    pub fn find_by_header(&self, header: &str) -> Result<Vec<CaseRecord>> {
        let normalized = normalize(header);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.case_id, c.updated_at, c.headers, c.normalized_headers, c.matches,
                        c.confidence, c.was_auto_approved, c.human_corrections, c.metadata
                 FROM cases c
                 JOIN header_patterns hp ON hp.case_id = c.case_id
                 WHERE hp.normalized_header = ?1
                 ORDER BY c.updated_at DESC",
            )?;
            let rows = stmt
                .query_map(params![normalized], |row| {
                    Ok(Self::row_to_case(
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Distilled examples for prompt injection. Human-corrected cases are marked
    /// high priority and sorted ahead.
    pub fn few_shot(&self, headers: &[String], k: usize) -> Result<Vec<FewShotExample>> {
        let ranked = self.find_similar(headers, k.max(3) * 2, 0.1)?;
        let mut examples: Vec<FewShotExample> = ranked
            .into_iter()
            .map(|r| FewShotExample {
                priority: r.case.human_corrections.is_some(),
                input_headers: r.case.headers,
                output_matches: r.case.matches,
                human_corrections: r.case.human_corrections,
            })
            .collect();
        examples.sort_by_key(|e| !e.priority);
        examples.truncate(k);
        Ok(examples)
    }

    pub fn stats(&self) -> Result<CaseStoreStats> {
        let cases = self.all_cases()?;
        let total = cases.len();
        let approved = cases.iter().filter(|c| c.was_auto_approved).count();
        let distinct: BTreeSet<String> =
            cases.iter().flat_map(|c| c.normalized_headers.iter().cloned()).collect();
        Ok(CaseStoreStats {
            total_cases: total,
            auto_approved: approved,
            auto_approval_ratio: if total == 0 { 0.0 } else { approved as f64 / total as f64 },
            distinct_header_patterns: distinct.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header_matcher::Provenance;

    fn sample_match(source: &str, target: &str) -> HeaderMatch {
        HeaderMatch {
            source: source.to_string(),
            target: Some(target.to_string()),
            confidence: 0.95,
            provenance: Provenance::FewShot,
        }
    }

    #[test]
    fn save_twice_same_headers_updates_not_duplicates() {
        let store = CaseStore::in_memory().unwrap();
        let headers = vec!["사번".to_string(), "성명".to_string()];
        let matches = vec![sample_match("사번", "사원번호"), sample_match("성명", "이름")];

        let id1 = store.save(&headers, &matches, 0.9, true, None, None).unwrap();
        let id2 = store.save(&headers, &matches, 0.95, true, None, None).unwrap();
        assert_eq!(id1, id2);

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_cases, 1);
    }

    #[test]
    fn find_by_header_is_exact_normalized_match() {
        let store = CaseStore::in_memory().unwrap();
        let headers = vec!["사번".to_string()];
        let matches = vec![sample_match("사번", "사원번호")];
        store.save(&headers, &matches, 0.9, true, None, None).unwrap();

        let found = store.find_by_header("사번").unwrap();
        assert_eq!(found.len(), 1);
        let none = store.find_by_header("존재하지않음").unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn find_similar_ranks_by_jaccard_overlap() {
        let store = CaseStore::in_memory().unwrap();
        store
            .save(
                &["사번".into(), "성명".into(), "생일".into()],
                &[sample_match("사번", "사원번호")],
                0.9,
                true,
                None,
                None,
            )
            .unwrap();
        store
            .save(
                &["사번".into(), "전혀다른컬럼".into()],
                &[sample_match("사번", "사원번호")],
                0.9,
                true,
                None,
                None,
            )
            .unwrap();

        let ranked = store.find_similar(&["사번".into(), "성명".into()], 5, 0.1).unwrap();
        assert!(!ranked.is_empty());
        assert!(ranked[0].similarity >= ranked.last().unwrap().similarity);
    }

    #[test]
    fn case_id_is_deterministic_and_order_independent() {
        let a = compute_case_id(&["사번".into(), "성명".into()]);
        let b = compute_case_id(&["성명".into(), "사번".into()]);
        assert_eq!(a, b);
    }
}
