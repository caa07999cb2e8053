//! Context assembly — plugin capabilities, orchestrators, and rendering.
//!
//! Every knowledge source sits behind [`RetrievalPlugin`] and every persistence
//! backend behind [`StoragePlugin`]. The orchestrators in [`retrieval`] and
//! [`storage`] fan out over registered plugins with per-call timeouts; a
//! failing plugin contributes nothing and is logged, never aborting the turn.

pub mod conflict;
pub mod render;
pub mod retrieval;
pub mod storage;

use async_trait::async_trait;

use crate::error::MemoryError;
use crate::memory::types::Turn;

/// Where an excerpt came from. Determines tie-break priority when relevance
/// scores are equal: identity is small and authoritative, so it wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Identity,
    Vault,
    Memory,
}

impl SourceKind {
    /// Rank used for stable tie-breaking; lower wins.
    pub(crate) fn priority(&self) -> u8 {
        match self {
            Self::Identity => 0,
            Self::Vault => 1,
            Self::Memory => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Vault => "vault",
            Self::Memory => "memory",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One retrieved piece of knowledge. Transient — constructed fresh per query,
/// never persisted.
#[derive(Debug, Clone, serde::Serialize)]
pub struct KnowledgeExcerpt {
    pub source_path: String,
    pub text: String,
    /// Relevance on the shared [0, 1] scale.
    pub relevance_score: f64,
    pub source_kind: SourceKind,
}

/// Query handed to every retrieval plugin.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub text: String,
    /// Present when embedding the turn succeeded within its deadline.
    pub embedding: Option<Vec<f32>>,
    pub top_k: usize,
}

/// A pair of excerpt indices judged contradictory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ConflictFlag {
    pub first: usize,
    pub second: usize,
}

/// The orchestrator's output: ranked excerpts plus annotations for the
/// downstream renderer. One bundle per turn, consumed immediately.
#[derive(Debug, Default, serde::Serialize)]
pub struct ContextBundle {
    /// Highest relevance first.
    pub excerpts: Vec<KnowledgeExcerpt>,
    /// Index pairs into `excerpts` that appear to assert contradictory facts.
    pub conflict_flags: Vec<ConflictFlag>,
    /// Indices of excerpts below the high-confidence threshold, marked for
    /// uncertainty display.
    pub uncertain: Vec<usize>,
    /// True when the character budget dropped at least one excerpt.
    pub truncated: bool,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.excerpts.is_empty()
    }
}

/// Capability implemented by every persistence backend. Writes fan out to all
/// registered storage plugins on every turn; failures are isolated per plugin.
#[async_trait]
pub trait StoragePlugin: Send + Sync {
    /// Identifier used in diagnostics.
    fn name(&self) -> &'static str;

    async fn store(&self, turn: &Turn) -> Result<(), MemoryError>;
}

/// Capability implemented by every knowledge source.
#[async_trait]
pub trait RetrievalPlugin: Send + Sync {
    /// Identifier used in diagnostics.
    fn name(&self) -> &'static str;

    async fn retrieve(&self, query: &QueryContext) -> Result<Vec<KnowledgeExcerpt>, MemoryError>;
}
