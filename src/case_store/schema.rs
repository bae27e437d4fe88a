//! SQLite schema and migrations for the Case Store.

use rusqlite::{Connection, Result as SqliteResult};

pub const SCHEMA_VERSION: i32 = 1;

pub fn initialize_schema(conn: &Connection) -> SqliteResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))
        .unwrap_or(0);

    if current_version < 1 {
        apply_v1_schema(conn)?;
        conn.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
    }

    Ok(())
}

fn apply_v1_schema(conn: &Connection) -> SqliteResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cases (
            case_id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            headers TEXT NOT NULL,
            normalized_headers TEXT NOT NULL,
            matches TEXT NOT NULL,
            confidence REAL NOT NULL,
            was_auto_approved INTEGER NOT NULL,
            human_corrections TEXT,
            metadata TEXT
        )",
        [],
    )?;

    // Inverted index: normalized_header -> case_ids (one row per header per case).
    conn.execute(
        "CREATE TABLE IF NOT EXISTS header_patterns (
            normalized_header TEXT NOT NULL,
            case_id TEXT NOT NULL,
            PRIMARY KEY (normalized_header, case_id),
            FOREIGN KEY (case_id) REFERENCES cases(case_id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_header_patterns_header ON header_patterns(normalized_header)",
        [],
    )?;

    Ok(())
}

pub fn is_initialized(conn: &Connection) -> bool {
    conn.query_row(
        "SELECT name FROM sqlite_master WHERE type='table' AND name='cases'",
        [],
        |row| row.get::<_, String>(0),
    )
    .is_ok()
}
