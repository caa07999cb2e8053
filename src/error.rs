//! Error taxonomy for the memory core.
//!
//! Failures inside a single plugin are never fatal to the orchestrators — they are
//! converted to an empty contribution plus a logged diagnostic. The only fatal class
//! is [`MemoryError::Config`], raised during startup validation before any turn is
//! processed.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    /// An embedding's length disagrees with the store's fixed dimension.
    /// The write is rejected with no partial state.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The persistence layer cannot be reached. Reads degrade to empty
    /// result sets; writes are logged and dropped.
    #[error("memory store unavailable: {0}")]
    StoreUnavailable(String),

    /// One or more identity documents failed to load. Non-fatal: the
    /// orchestrator proceeds with an empty identity set.
    #[error("identity documents failed to load: {0}")]
    IdentityLoad(String),

    /// A plugin call exceeded its per-call deadline and was treated as an
    /// empty contribution.
    #[error("plugin '{plugin}' timed out after {timeout_ms}ms")]
    PluginTimeout { plugin: String, timeout_ms: u64 },

    /// Generic retrieval-plugin failure, isolated to that plugin.
    #[error("retrieval failed: {0}")]
    Retrieve(String),

    /// Generic storage-plugin failure, isolated to that plugin.
    #[error("storage failed: {0}")]
    Store(String),

    /// Invalid configuration detected at startup. Fatal.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for MemoryError {
    fn from(err: rusqlite::Error) -> Self {
        MemoryError::StoreUnavailable(err.to_string())
    }
}
