//! SQL DDL for the turn store.
//!
//! Defines the `turns` table, the `turns_vec` (vec0) virtual table, and the
//! `store_meta` key-value table that records the embedding dimension the
//! database was created with. All DDL uses `IF NOT EXISTS` for idempotent
//! initialization.

use rusqlite::{params, Connection, OptionalExtension};

/// DDL for the plain tables.
const SCHEMA_SQL: &str = r#"
-- One row per conversational turn
CREATE TABLE IF NOT EXISTS turns (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    role TEXT NOT NULL CHECK(role IN ('user','assistant')),
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_turns_conversation ON turns(conversation_id);
CREATE INDEX IF NOT EXISTS idx_turns_created ON turns(created_at);

-- Store metadata
CREATE TABLE IF NOT EXISTS store_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all tables. Idempotent (uses IF NOT EXISTS).
///
/// The vec0 virtual table is created separately because its column width is
/// the configured embedding dimension.
pub fn init_schema(conn: &Connection, dimension: usize) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    let vec_sql = format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS turns_vec USING vec0(
    id TEXT PRIMARY KEY,
    embedding FLOAT[{dimension}]
)"
    );
    conn.execute_batch(&vec_sql)?;

    conn.execute(
        "INSERT OR IGNORE INTO store_meta (key, value) VALUES ('dimension', ?1)",
        params![dimension.to_string()],
    )?;

    Ok(())
}

/// The embedding dimension this database was created with, if recorded.
pub fn stored_dimension(conn: &Connection) -> rusqlite::Result<Option<usize>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = 'dimension'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.and_then(|v| v.parse().ok()))
}
