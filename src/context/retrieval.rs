//! Read path: fan out to every knowledge source, merge, rank, and annotate.
//!
//! Each plugin call runs concurrently under its own deadline and is
//! failure-isolated — a slow or broken source contributes zero excerpts and a
//! logged diagnostic. If every source fails the result is an empty bundle, not
//! an error: the assistant still answers from the live turn alone.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::config::{ConflictConfig, RetrievalConfig};
use crate::context::conflict::{ConflictStrategy, RuleBasedConflicts};
use crate::context::{
    ConflictFlag, ContextBundle, KnowledgeExcerpt, QueryContext, RetrievalPlugin, SourceKind,
};
use crate::error::MemoryError;
use crate::memory::identity::IdentityLoader;
use crate::memory::vault::VaultSearch;
use crate::memory::vector::VectorMemoryStore;

// ── Plugin adapters ───────────────────────────────────────────────────────────

/// Identity documents as excerpts. Authoritative, so relevance is pinned to 1.0.
pub struct IdentityContext {
    loader: Arc<IdentityLoader>,
}

impl IdentityContext {
    pub fn new(loader: Arc<IdentityLoader>) -> Self {
        Self { loader }
    }
}

#[async_trait]
impl RetrievalPlugin for IdentityContext {
    fn name(&self) -> &'static str {
        "identity"
    }

    async fn retrieve(&self, _query: &QueryContext) -> Result<Vec<KnowledgeExcerpt>, MemoryError> {
        Ok(self
            .loader
            .documents()
            .into_iter()
            .map(|doc| KnowledgeExcerpt {
                source_path: doc.path,
                text: doc.text,
                relevance_score: 1.0,
                source_kind: SourceKind::Identity,
            })
            .collect())
    }
}

/// Keyword search over the note vault.
pub struct VaultContext {
    vault: Arc<VaultSearch>,
}

impl VaultContext {
    pub fn new(vault: Arc<VaultSearch>) -> Self {
        Self { vault }
    }
}

#[async_trait]
impl RetrievalPlugin for VaultContext {
    fn name(&self) -> &'static str {
        "vault"
    }

    async fn retrieve(&self, query: &QueryContext) -> Result<Vec<KnowledgeExcerpt>, MemoryError> {
        Ok(self
            .vault
            .search(&query.text, query.top_k)
            .into_iter()
            .map(|hit| KnowledgeExcerpt {
                source_path: hit.path,
                text: hit.excerpt,
                relevance_score: hit.score,
                source_kind: SourceKind::Vault,
            })
            .collect())
    }
}

/// Semantic recall over stored turns. Needs the query embedding; without one
/// (embedding failed or timed out) it contributes nothing rather than failing.
pub struct MemoryRecall {
    store: Arc<VectorMemoryStore>,
    min_score: f64,
}

impl MemoryRecall {
    pub fn new(store: Arc<VectorMemoryStore>, min_score: f64) -> Self {
        Self { store, min_score }
    }
}

#[async_trait]
impl RetrievalPlugin for MemoryRecall {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn retrieve(&self, query: &QueryContext) -> Result<Vec<KnowledgeExcerpt>, MemoryError> {
        let Some(embedding) = query.embedding.as_deref() else {
            debug!("no query embedding, skipping semantic recall");
            return Ok(Vec::new());
        };

        let records = self.store.query(embedding, query.top_k, self.min_score)?;
        Ok(records
            .into_iter()
            .map(|record| KnowledgeExcerpt {
                source_path: format!("turn/{}", record.id),
                text: record.text,
                relevance_score: record.similarity,
                source_kind: SourceKind::Memory,
            })
            .collect())
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct RetrievalOrchestrator {
    plugins: Vec<Arc<dyn RetrievalPlugin>>,
    conflicts: Box<dyn ConflictStrategy>,
    timeout: Duration,
    context_budget: usize,
    high_confidence: f64,
    conflict_threshold: f64,
}

impl RetrievalOrchestrator {
    pub fn new(
        plugins: Vec<Arc<dyn RetrievalPlugin>>,
        retrieval: &RetrievalConfig,
        conflict: &ConflictConfig,
    ) -> Self {
        Self {
            plugins,
            conflicts: Box::new(RuleBasedConflicts::new(conflict)),
            timeout: Duration::from_millis(retrieval.plugin_timeout_ms),
            context_budget: retrieval.context_budget,
            high_confidence: retrieval.high_confidence,
            conflict_threshold: conflict.threshold,
        }
    }

    /// Swap the contradiction judgment (e.g. for a model-assisted check).
    pub fn with_conflict_strategy(mut self, strategy: Box<dyn ConflictStrategy>) -> Self {
        self.conflicts = strategy;
        self
    }

    /// Produce one [`ContextBundle`] for the query.
    pub async fn assemble(&self, query: &QueryContext) -> ContextBundle {
        // 1. Concurrent failure-isolated fan-out
        let calls = self.plugins.iter().map(|plugin| {
            let plugin = Arc::clone(plugin);
            let query = query.clone();
            let deadline = self.timeout;
            async move {
                match tokio::time::timeout(deadline, plugin.retrieve(&query)).await {
                    Ok(Ok(excerpts)) => excerpts,
                    Ok(Err(err)) => {
                        warn!(plugin = plugin.name(), error = %err, "retrieval plugin failed");
                        Vec::new()
                    }
                    Err(_) => {
                        let err = MemoryError::PluginTimeout {
                            plugin: plugin.name().to_string(),
                            timeout_ms: deadline.as_millis() as u64,
                        };
                        warn!(plugin = plugin.name(), error = %err, "retrieval plugin timed out");
                        Vec::new()
                    }
                }
            }
        });

        // 2. Merge into one ranked sequence. The sort is stable, so equal
        // score and priority keep plugin registration order.
        let mut merged: Vec<KnowledgeExcerpt> =
            join_all(calls).await.into_iter().flatten().collect();
        merged.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.source_kind.priority().cmp(&b.source_kind.priority()))
        });

        // 3. Truncate to the character budget, dropping lowest relevance
        // first. The top excerpt is always kept so the bundle is never
        // emptied by truncation while sources exist.
        let total = merged.len();
        let mut excerpts = Vec::new();
        let mut used = 0usize;
        for excerpt in merged {
            let chars = excerpt.text.chars().count();
            if !excerpts.is_empty() && used + chars > self.context_budget {
                break;
            }
            used += chars;
            excerpts.push(excerpt);
        }
        let truncated = excerpts.len() < total;

        // 4. Annotate uncertainty
        let uncertain: Vec<usize> = excerpts
            .iter()
            .enumerate()
            .filter(|(_, e)| e.relevance_score < self.high_confidence)
            .map(|(i, _)| i)
            .collect();

        // 5. Flag contradictions across source kinds
        let conflict_flags = self.detect_conflicts(&excerpts);

        ContextBundle {
            excerpts,
            conflict_flags,
            uncertain,
            truncated,
        }
    }

    /// Pairwise comparison of cross-source excerpts with both scores above
    /// the conflict threshold.
    fn detect_conflicts(&self, excerpts: &[KnowledgeExcerpt]) -> Vec<ConflictFlag> {
        let mut flags = Vec::new();
        for i in 0..excerpts.len() {
            for j in (i + 1)..excerpts.len() {
                let (a, b) = (&excerpts[i], &excerpts[j]);
                if a.source_kind == b.source_kind {
                    continue;
                }
                if a.relevance_score <= self.conflict_threshold
                    || b.relevance_score <= self.conflict_threshold
                {
                    continue;
                }
                if self.conflicts.is_conflicting(a, b) {
                    flags.push(ConflictFlag { first: i, second: j });
                }
            }
        }
        flags
    }
}
