//! Persistent vector index of conversational turns.
//!
//! [`VectorMemoryStore`] owns the SQLite connection holding the `turns` table and
//! the `turns_vec` KNN index. Writes are transactional: a turn row and its
//! embedding land together or not at all. Queries run through sqlite-vec's KNN
//! scan, so the corpus is never loaded into working memory.

use rusqlite::{params, Connection};
use std::str::FromStr;
use std::sync::Mutex;
use tracing::debug;

use crate::error::MemoryError;
use crate::memory::embedding_to_bytes;
use crate::memory::types::{MemoryRecord, Role, Turn};

/// How query similarity is derived from the index's L2 distance.
///
/// Embeddings are stored unit-normalized (the local provider guarantees this),
/// so L2 nearest-neighbor order matches cosine order and the two metrics
/// differ only in how distance maps onto the [0, 1] relevance scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    /// `1 - d²/2` — the cosine similarity of unit vectors at L2 distance d.
    Cosine,
    /// `1 / (1 + d)` — raw distance squashed onto (0, 1].
    L2,
}

impl DistanceMetric {
    pub fn similarity(&self, distance: f64) -> f64 {
        match self {
            Self::Cosine => (1.0 - distance * distance / 2.0).clamp(0.0, 1.0),
            Self::L2 => 1.0 / (1.0 + distance),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cosine" => Ok(Self::Cosine),
            "l2" => Ok(Self::L2),
            other => Err(MemoryError::Config(format!("unknown distance metric: {other}"))),
        }
    }
}

/// Counts reported by [`VectorMemoryStore::stats`].
#[derive(Debug, serde::Serialize)]
pub struct StoreStats {
    pub total_turns: u64,
    pub user_turns: u64,
    pub assistant_turns: u64,
    pub indexed_turns: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest: Option<String>,
}

pub struct VectorMemoryStore {
    conn: Mutex<Connection>,
    dimension: usize,
    metric: DistanceMetric,
}

impl VectorMemoryStore {
    pub fn new(conn: Connection, dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            conn: Mutex::new(conn),
            dimension,
            metric,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Durably persist a turn and its embedding. Rejects embeddings whose
    /// length disagrees with the store's fixed dimension before touching the
    /// database, so a failed insert leaves no partial state.
    pub fn insert(&self, turn: &Turn, embedding: &[f32]) -> Result<String, MemoryError> {
        if embedding.len() != self.dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO turns (id, conversation_id, role, content, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                turn.id,
                turn.conversation_id,
                turn.role.as_str(),
                turn.text,
                turn.created_at,
            ],
        )?;
        tx.execute(
            "INSERT INTO turns_vec (id, embedding) VALUES (?1, ?2)",
            params![turn.id, embedding_to_bytes(embedding)],
        )?;

        tx.commit()?;
        debug!(id = %turn.id, "turn indexed");
        Ok(turn.id.clone())
    }

    /// Up to `top_k` records ordered by descending similarity, excluding any
    /// below `min_score`; ties broken by more-recent timestamp first.
    pub fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        min_score: f64,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        if embedding.len() != self.dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT v.id, v.distance, t.conversation_id, t.role, t.content, t.created_at \
             FROM turns_vec v JOIN turns t ON t.id = v.id \
             WHERE v.embedding MATCH ?1 ORDER BY v.distance LIMIT ?2",
        )?;

        let mut records: Vec<MemoryRecord> = stmt
            .query_map(
                params![embedding_to_bytes(embedding), top_k as i64],
                |row| {
                    let distance: f64 = row.get(1)?;
                    let role: String = row.get(3)?;
                    Ok((distance, row.get::<_, String>(0)?, row.get::<_, String>(2)?, role,
                        row.get::<_, String>(4)?, row.get::<_, String>(5)?))
                },
            )?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter_map(|(distance, id, conversation_id, role, text, created_at)| {
                let role = Role::from_str(&role).ok()?;
                Some(MemoryRecord {
                    id,
                    conversation_id,
                    role,
                    text,
                    created_at,
                    similarity: self.metric.similarity(distance),
                })
            })
            .filter(|r| r.similarity >= min_score)
            .collect();

        records.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        Ok(records)
    }

    /// Number of turns persisted (indexed or not).
    pub fn count(&self) -> Result<u64, MemoryError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM turns", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn stats(&self) -> Result<StoreStats, MemoryError> {
        let conn = self.lock()?;
        let (total, user_turns, assistant_turns): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*), \
             COUNT(*) FILTER (WHERE role = 'user'), \
             COUNT(*) FILTER (WHERE role = 'assistant') FROM turns",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let indexed: i64 =
            conn.query_row("SELECT COUNT(*) FROM turns_vec", [], |row| row.get(0))?;
        let (oldest, newest): (Option<String>, Option<String>) = conn.query_row(
            "SELECT MIN(created_at), MAX(created_at) FROM turns",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(StoreStats {
            total_turns: total as u64,
            user_turns: user_turns as u64,
            assistant_turns: assistant_turns as u64,
            indexed_turns: indexed as u64,
            oldest,
            newest,
        })
    }

    /// User-initiated purge: remove every stored turn and embedding.
    pub fn purge(&self) -> Result<u64, MemoryError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM turns_vec", [])?;
        let removed = tx.execute("DELETE FROM turns", [])?;
        tx.commit()?;
        Ok(removed as u64)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, MemoryError> {
        self.conn
            .lock()
            .map_err(|_| MemoryError::StoreUnavailable("connection lock poisoned".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    const DIM: usize = 8;

    fn test_store() -> VectorMemoryStore {
        let conn = db::open_memory_database(DIM).unwrap();
        VectorMemoryStore::new(conn, DIM, DistanceMetric::Cosine)
    }

    /// Unit vector along the given axis.
    fn axis(i: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; DIM];
        v[i % DIM] = 1.0;
        v
    }

    fn user_turn(text: &str) -> Turn {
        Turn::new("conv-1", Role::User, text)
    }

    #[test]
    fn insert_then_query_round_trips() {
        let store = test_store();
        let turn = user_turn("Rust is a systems language");
        let id = store.insert(&turn, &axis(0)).unwrap();

        let results = store.query(&axis(0), 1, 0.0).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, id);
        assert_eq!(results[0].text, "Rust is a systems language");
    }

    #[test]
    fn identical_embedding_scores_maximum_and_ranks_first() {
        let store = test_store();
        store.insert(&user_turn("exact match"), &axis(0)).unwrap();
        store.insert(&user_turn("unrelated"), &axis(3)).unwrap();

        let results = store.query(&axis(0), 5, 0.0).unwrap();
        assert_eq!(results[0].text, "exact match");
        assert!((results[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn dimension_mismatch_rejected_without_partial_write() {
        let store = test_store();
        let turn = user_turn("wrong shape");

        let err = store.insert(&turn, &[1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            MemoryError::DimensionMismatch { expected: 8, actual: 3 }
        ));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn min_score_excludes_distant_records() {
        let store = test_store();
        store.insert(&user_turn("near"), &axis(0)).unwrap();
        store.insert(&user_turn("far"), &axis(5)).unwrap();

        // Orthogonal unit vectors sit at cosine similarity 0
        let results = store.query(&axis(0), 5, 0.5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "near");
    }

    #[test]
    fn equal_similarity_ties_break_newest_first() {
        let store = test_store();
        let mut older = user_turn("older");
        older.created_at = "2026-01-01T00:00:00+00:00".into();
        let mut newer = user_turn("newer");
        newer.created_at = "2026-02-01T00:00:00+00:00".into();

        // Same embedding, so identical similarity
        store.insert(&older, &axis(0)).unwrap();
        store.insert(&newer, &axis(0)).unwrap();

        let results = store.query(&axis(0), 2, 0.0).unwrap();
        assert_eq!(results[0].text, "newer");
        assert_eq!(results[1].text, "older");
    }

    #[test]
    fn top_k_bounds_result_count() {
        let store = test_store();
        for i in 0..5 {
            store.insert(&user_turn(&format!("turn {i}")), &axis(i)).unwrap();
        }
        assert_eq!(store.query(&axis(0), 2, 0.0).unwrap().len(), 2);
        assert!(store.query(&axis(0), 0, 0.0).unwrap().is_empty());
    }

    #[test]
    fn purge_empties_both_tables() {
        let store = test_store();
        store.insert(&user_turn("a"), &axis(0)).unwrap();
        store.insert(&user_turn("b"), &axis(1)).unwrap();

        assert_eq!(store.purge().unwrap(), 2);
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.query(&axis(0), 5, 0.0).unwrap().is_empty());
    }

    #[test]
    fn stats_count_roles_separately() {
        let store = test_store();
        store.insert(&user_turn("q"), &axis(0)).unwrap();
        store
            .insert(&Turn::new("conv-1", Role::Assistant, "a"), &axis(1))
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_turns, 2);
        assert_eq!(stats.user_turns, 1);
        assert_eq!(stats.assistant_turns, 1);
        assert_eq!(stats.indexed_turns, 2);
        assert!(stats.oldest.is_some());
    }

    #[test]
    fn l2_metric_also_maxes_at_identical() {
        let conn = db::open_memory_database(DIM).unwrap();
        let store = VectorMemoryStore::new(conn, DIM, DistanceMetric::L2);
        store.insert(&user_turn("same"), &axis(0)).unwrap();

        let results = store.query(&axis(0), 1, 0.0).unwrap();
        assert!((results[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn metric_parses_from_config_strings() {
        assert_eq!(DistanceMetric::from_str("cosine").unwrap(), DistanceMetric::Cosine);
        assert_eq!(DistanceMetric::from_str("l2").unwrap(), DistanceMetric::L2);
        assert!(DistanceMetric::from_str("manhattan").is_err());
    }
}
