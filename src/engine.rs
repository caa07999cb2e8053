//! The per-turn pipeline — the core boundary offered to the outside interface.
//!
//! [`MemoryEngine`] accepts `(conversation_id, text, role)` from the transport
//! layer and does the rest: embed the turn under a deadline, fan the write out
//! to every storage plugin while the retrieval fan-out assembles the context
//! bundle, and hand both back. Same-conversation turns are serialized by the
//! caller; the engine never blocks one plugin on another.

use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::{expand_tilde, EngramConfig};
use crate::context::retrieval::{
    IdentityContext, MemoryRecall, RetrievalOrchestrator, VaultContext,
};
use crate::context::storage::{BufferWriter, StorageOrchestrator, StorageReport, VectorWriter};
use crate::context::{ContextBundle, QueryContext, RetrievalPlugin, StoragePlugin};
use crate::db;
use crate::embedding::EmbeddingProvider;
use crate::memory::buffer::ConversationBuffer;
use crate::memory::identity::IdentityLoader;
use crate::memory::types::{Role, Turn};
use crate::memory::vault::VaultSearch;
use crate::memory::vector::{DistanceMetric, StoreStats, VectorMemoryStore};

/// Everything produced for one user turn.
#[derive(Debug)]
pub struct TurnContext {
    pub bundle: ContextBundle,
    /// Chronological recent-conversation window, including this turn.
    pub recent: Vec<Turn>,
    pub storage: StorageReport,
}

pub struct MemoryEngine {
    config: EngramConfig,
    buffer: Arc<Mutex<ConversationBuffer>>,
    vector: Arc<VectorMemoryStore>,
    identity: Arc<IdentityLoader>,
    embedder: Arc<dyn EmbeddingProvider>,
    storage: StorageOrchestrator,
    retrieval: RetrievalOrchestrator,
}

impl MemoryEngine {
    /// Build the engine with the configured local embedding provider.
    pub fn new(config: EngramConfig) -> Result<Self> {
        let provider = crate::embedding::create_provider(&config.embedding)?;
        Self::with_provider(config, Arc::from(provider))
    }

    /// Build the engine around an externally supplied embedding capability.
    ///
    /// Configuration problems are the only fatal failure class, all caught
    /// here before any turn is processed. A failed identity load is not one
    /// of them: the engine starts with an empty identity set.
    pub fn with_provider(
        config: EngramConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        config.validate()?;
        anyhow::ensure!(
            embedder.dimensions() == config.storage.dimension,
            "embedding provider produces {} dimensions but storage.dimension is {}",
            embedder.dimensions(),
            config.storage.dimension
        );
        let metric = DistanceMetric::from_str(&config.storage.metric)?;

        let conn = db::open_database(config.resolved_db_path(), config.storage.dimension)?;
        let vector = Arc::new(VectorMemoryStore::new(
            conn,
            config.storage.dimension,
            metric,
        ));

        let buffer = if config.buffer.persist {
            ConversationBuffer::persistent(config.buffer.capacity, expand_tilde(&config.buffer.path))
        } else {
            ConversationBuffer::in_memory(config.buffer.capacity)
        };
        let buffer = Arc::new(Mutex::new(buffer));

        let identity_files = config.identity.files.iter().map(|f| expand_tilde(f)).collect();
        let (identity, load_result) = IdentityLoader::new(identity_files);
        if let Err(err) = load_result {
            warn!(error = %err, "starting with empty identity set");
        }
        let identity = Arc::new(identity);

        let vault = Arc::new(VaultSearch::new(
            expand_tilde(&config.vault.root),
            config.vault.excerpt_chars,
        ));

        let storage_plugins: Vec<Arc<dyn StoragePlugin>> = vec![
            Arc::new(BufferWriter::new(Arc::clone(&buffer))),
            Arc::new(VectorWriter::new(Arc::clone(&vector))),
        ];
        let storage = StorageOrchestrator::new(
            storage_plugins,
            Duration::from_millis(config.retrieval.plugin_timeout_ms),
        );

        // Registration order is the tie-break order: identity > vault > memory
        let retrieval_plugins: Vec<Arc<dyn RetrievalPlugin>> = vec![
            Arc::new(IdentityContext::new(Arc::clone(&identity))),
            Arc::new(VaultContext::new(Arc::clone(&vault))),
            Arc::new(MemoryRecall::new(
                Arc::clone(&vector),
                config.retrieval.min_score,
            )),
        ];
        let retrieval =
            RetrievalOrchestrator::new(retrieval_plugins, &config.retrieval, &config.conflict);

        info!("memory engine ready");
        Ok(Self {
            config,
            buffer,
            vector,
            identity,
            embedder,
            storage,
            retrieval,
        })
    }

    /// Process one inbound user turn: persist it everywhere and assemble the
    /// context bundle, concurrently. Always returns a usable `TurnContext` —
    /// degraded sources contribute nothing rather than failing the turn.
    pub async fn handle_user_turn(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> TurnContext {
        let embedding = self.embed(text).await;
        let turn = Turn::new(conversation_id, Role::User, text).with_embedding(embedding.clone());

        let query = QueryContext {
            text: text.to_string(),
            embedding,
            top_k: self.config.retrieval.top_k,
        };

        let (storage, bundle) =
            tokio::join!(self.storage.store_all(&turn), self.retrieval.assemble(&query));

        TurnContext {
            bundle,
            recent: self.recent_window(),
            storage,
        }
    }

    /// Persist the assistant's reply through the same storage fan-out.
    pub async fn record_assistant_turn(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> StorageReport {
        let embedding = self.embed(text).await;
        let turn =
            Turn::new(conversation_id, Role::Assistant, text).with_embedding(embedding);
        self.storage.store_all(&turn).await
    }

    /// Re-read the identity documents (e.g. after the user edits them).
    pub fn refresh_identity(&self) -> Result<()> {
        self.identity.refresh().context("identity refresh failed")
    }

    /// User-initiated purge of all remembered turns, buffer and index alike.
    pub fn purge(&self) -> Result<u64> {
        self.buffer
            .lock()
            .map_err(|_| anyhow::anyhow!("buffer lock poisoned"))?
            .purge()?;
        Ok(self.vector.purge()?)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        Ok(self.vector.stats()?)
    }

    /// Assemble a context bundle for a query without persisting anything —
    /// the read path alone, used by the search CLI.
    pub async fn peek(&self, text: &str) -> ContextBundle {
        let query = QueryContext {
            text: text.to_string(),
            embedding: self.embed(text).await,
            top_k: self.config.retrieval.top_k,
        };
        self.retrieval.assemble(&query).await
    }

    fn recent_window(&self) -> Vec<Turn> {
        match self.buffer.lock() {
            Ok(buffer) => buffer.recent(self.config.retrieval.recent_turns),
            Err(_) => {
                warn!("buffer lock poisoned, recent window unavailable");
                Vec::new()
            }
        }
    }

    /// Embed under the configured deadline. Failure or timeout means the turn
    /// goes unindexed and recall falls back to lexical sources — logged, never
    /// surfaced to the user.
    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        let text = text.to_string();
        let deadline = Duration::from_millis(self.config.embedding.timeout_ms);

        let task = tokio::task::spawn_blocking(move || embedder.embed(&text));
        match tokio::time::timeout(deadline, task).await {
            Ok(Ok(Ok(embedding))) => Some(embedding),
            Ok(Ok(Err(err))) => {
                warn!(error = %err, "embedding failed, turn will not be indexed");
                None
            }
            Ok(Err(join_err)) => {
                warn!(error = %join_err, "embedding task panicked");
                None
            }
            Err(_) => {
                warn!(timeout_ms = self.config.embedding.timeout_ms, "embedding timed out");
                None
            }
        }
    }
}
