#![allow(dead_code)]

use std::sync::Arc;

use engram::config::EngramConfig;
use engram::db;
use engram::embedding::EmbeddingProvider;
use engram::memory::types::{Role, Turn};
use engram::memory::vector::{DistanceMetric, VectorMemoryStore};

pub const DIM: usize = 8;

/// Open a fresh in-memory vector store with the test dimension.
pub fn test_store() -> VectorMemoryStore {
    let conn = db::open_memory_database(DIM).unwrap();
    VectorMemoryStore::new(conn, DIM, DistanceMetric::Cosine)
}

/// Deterministic unit embedding with a spike at position `seed`.
/// Distinct seeds produce orthogonal vectors.
pub fn axis_embedding(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    v[seed % DIM] = 1.0;
    v
}

pub fn user_turn(conversation: &str, text: &str) -> Turn {
    Turn::new(conversation, Role::User, text)
}

/// Deterministic embedding provider for engine tests: identical text always
/// maps to the identical unit vector, so exact-text recall is exact-match.
pub struct StubEmbedder;

impl EmbeddingProvider for StubEmbedder {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let seed: usize = text.bytes().map(|b| b as usize).sum();
        Ok(axis_embedding(seed))
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// Provider whose every call fails, for degraded-pipeline tests.
pub struct BrokenEmbedder;

impl EmbeddingProvider for BrokenEmbedder {
    fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("embedder offline")
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// Config pointing every path into the given temp directory, with the test
/// dimension and no identity/vault content unless the test adds some.
pub fn test_config(dir: &std::path::Path) -> EngramConfig {
    let mut config = EngramConfig::default();
    config.storage.db_path = dir.join("memory.db").display().to_string();
    config.storage.dimension = DIM;
    config.buffer.path = dir.join("buffer.json").display().to_string();
    config.buffer.capacity = 10;
    config.identity.files = vec![];
    config.vault.root = dir.join("vault").display().to_string();
    config
}

pub fn stub_embedder() -> Arc<dyn EmbeddingProvider> {
    Arc::new(StubEmbedder)
}
