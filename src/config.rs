use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::MemoryError;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngramConfig {
    pub log_level: String,
    pub storage: StorageConfig,
    pub buffer: BufferConfig,
    pub embedding: EmbeddingConfig,
    pub identity: IdentityConfig,
    pub vault: VaultConfig,
    pub retrieval: RetrievalConfig,
    pub conflict: ConflictConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    /// Embedding vector length. Must match the provider's output size;
    /// checked against the value recorded in the database at open.
    pub dimension: usize,
    /// Distance metric for nearest-neighbor queries: "cosine" or "l2".
    pub metric: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BufferConfig {
    /// Maximum turns held; oldest evicted first.
    pub capacity: usize,
    /// Persist the buffer across restarts. Memory-only when false.
    pub persist: bool,
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
    /// Deadline for one embedding computation.
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IdentityConfig {
    /// Identity documents, loaded all-or-nothing. Paths may use `~/`.
    pub files: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VaultConfig {
    /// Root of the markdown note tree searched by keyword.
    pub root: String,
    pub top_k: usize,
    /// Longest passage extracted from a matching document.
    pub excerpt_chars: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Similarity floor for vector-memory results, in [0, 1].
    pub min_score: f64,
    /// Character budget for the assembled context bundle.
    pub context_budget: usize,
    /// Excerpts below this relevance are annotated as uncertain.
    pub high_confidence: f64,
    /// Per-plugin call deadline during fan-out.
    pub plugin_timeout_ms: u64,
    /// Size of the recent-conversation window handed to the renderer.
    pub recent_turns: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConflictConfig {
    /// Only excerpt pairs where both sides score above this are compared.
    pub threshold: f64,
    /// Minimum shared significant terms before two excerpts count as
    /// covering the same topic.
    pub min_topic_overlap: usize,
    /// Term pairs treated as opposing claims when they appear on opposite
    /// sides of a same-topic pair.
    pub opposition_pairs: Vec<[String; 2]>,
}

impl Default for EngramConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            storage: StorageConfig::default(),
            buffer: BufferConfig::default(),
            embedding: EmbeddingConfig::default(),
            identity: IdentityConfig::default(),
            vault: VaultConfig::default(),
            retrieval: RetrievalConfig::default(),
            conflict: ConflictConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_engram_dir()
            .join("memory.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            dimension: 384,
            metric: "cosine".into(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        let path = default_engram_dir()
            .join("buffer.json")
            .to_string_lossy()
            .into_owned();
        Self {
            capacity: 20,
            persist: true,
            path,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_engram_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir,
            timeout_ms: 5000,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        let identity = default_engram_dir()
            .join("vault/_system/identity.md")
            .to_string_lossy()
            .into_owned();
        Self {
            files: vec![identity],
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        let root = default_engram_dir()
            .join("vault")
            .to_string_lossy()
            .into_owned();
        Self {
            root,
            top_k: 5,
            excerpt_chars: 300,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.3,
            context_budget: 4000,
            high_confidence: 0.5,
            plugin_timeout_ms: 3000,
            recent_turns: 5,
        }
    }
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            min_topic_overlap: 1,
            opposition_pairs: vec![
                ["vegetarian".into(), "steak".into()],
                ["vegetarian".into(), "meat".into()],
                ["vegan".into(), "dairy".into()],
                ["dark".into(), "light".into()],
                ["remote".into(), "office".into()],
                ["morning".into(), "night".into()],
            ],
        }
    }
}

/// Returns `~/.engram/`
pub fn default_engram_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".engram")
}

/// Returns the default config file path: `~/.engram/config.toml`
pub fn default_config_path() -> PathBuf {
    default_engram_dir().join("config.toml")
}

impl EngramConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            EngramConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (ENGRAM_DB, ENGRAM_VAULT, ENGRAM_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ENGRAM_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("ENGRAM_VAULT") {
            self.vault.root = val;
        }
        if let Ok(val) = std::env::var("ENGRAM_LOG_LEVEL") {
            self.log_level = val;
        }
    }

    /// Reject invalid settings before any turn is processed. This is the only
    /// fatal failure class; everything downstream degrades instead.
    pub fn validate(&self) -> Result<(), MemoryError> {
        if self.storage.dimension == 0 {
            return Err(MemoryError::Config("storage.dimension must be > 0".into()));
        }
        if !matches!(self.storage.metric.as_str(), "cosine" | "l2") {
            return Err(MemoryError::Config(format!(
                "storage.metric must be \"cosine\" or \"l2\", got {:?}",
                self.storage.metric
            )));
        }
        if self.buffer.capacity == 0 {
            return Err(MemoryError::Config("buffer.capacity must be > 0".into()));
        }
        if self.retrieval.context_budget == 0 {
            return Err(MemoryError::Config(
                "retrieval.context_budget must be > 0".into(),
            ));
        }
        if self.retrieval.plugin_timeout_ms == 0 {
            return Err(MemoryError::Config(
                "retrieval.plugin_timeout_ms must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retrieval.min_score) {
            return Err(MemoryError::Config(
                "retrieval.min_score must be in [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retrieval.high_confidence) {
            return Err(MemoryError::Config(
                "retrieval.high_confidence must be in [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.conflict.threshold) {
            return Err(MemoryError::Config(
                "conflict.threshold must be in [0, 1]".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}
