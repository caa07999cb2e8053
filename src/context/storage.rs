//! Write path: fan out each new turn to every persistence backend.
//!
//! Writes are unordered and independent — no transactional coupling across
//! plugins. A failed buffer write does not block the vector write and vice
//! versa; each failure is logged for that plugin alone.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::context::StoragePlugin;
use crate::error::MemoryError;
use crate::memory::buffer::ConversationBuffer;
use crate::memory::types::Turn;
use crate::memory::vector::VectorMemoryStore;

// ── Plugin adapters ───────────────────────────────────────────────────────────

/// Appends turns to the recent-conversation ring buffer.
pub struct BufferWriter {
    buffer: Arc<Mutex<ConversationBuffer>>,
}

impl BufferWriter {
    pub fn new(buffer: Arc<Mutex<ConversationBuffer>>) -> Self {
        Self { buffer }
    }
}

#[async_trait]
impl StoragePlugin for BufferWriter {
    fn name(&self) -> &'static str {
        "buffer"
    }

    async fn store(&self, turn: &Turn) -> Result<(), MemoryError> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| MemoryError::Store("buffer lock poisoned".into()))?;
        buffer.append(turn.clone())
    }
}

/// Indexes embedded turns in the vector store. A turn without an embedding is
/// buffered elsewhere but never indexed, so it is skipped here, not an error.
pub struct VectorWriter {
    store: Arc<VectorMemoryStore>,
}

impl VectorWriter {
    pub fn new(store: Arc<VectorMemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl StoragePlugin for VectorWriter {
    fn name(&self) -> &'static str {
        "vector"
    }

    async fn store(&self, turn: &Turn) -> Result<(), MemoryError> {
        match turn.embedding.as_deref() {
            Some(embedding) => self.store.insert(turn, embedding).map(|_| ()),
            None => {
                debug!(id = %turn.id, "turn has no embedding, not indexed");
                Ok(())
            }
        }
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

/// Per-turn acknowledgment of the storage fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageReport {
    pub attempted: usize,
    pub succeeded: usize,
}

impl StorageReport {
    pub fn all_succeeded(&self) -> bool {
        self.attempted == self.succeeded
    }
}

pub struct StorageOrchestrator {
    plugins: Vec<Arc<dyn StoragePlugin>>,
    timeout: Duration,
}

impl StorageOrchestrator {
    pub fn new(plugins: Vec<Arc<dyn StoragePlugin>>, timeout: Duration) -> Self {
        Self { plugins, timeout }
    }

    /// Write the turn through every plugin concurrently. Partial failure is
    /// tolerated and logged; committed sub-writes are never rolled back.
    pub async fn store_all(&self, turn: &Turn) -> StorageReport {
        let calls = self.plugins.iter().map(|plugin| {
            let plugin = Arc::clone(plugin);
            let turn = turn.clone();
            let deadline = self.timeout;
            async move {
                match tokio::time::timeout(deadline, plugin.store(&turn)).await {
                    Ok(Ok(())) => true,
                    Ok(Err(err)) => {
                        warn!(plugin = plugin.name(), error = %err, "storage plugin failed");
                        false
                    }
                    Err(_) => {
                        let err = MemoryError::PluginTimeout {
                            plugin: plugin.name().to_string(),
                            timeout_ms: deadline.as_millis() as u64,
                        };
                        warn!(plugin = plugin.name(), error = %err, "storage plugin timed out");
                        false
                    }
                }
            }
        });

        let outcomes = join_all(calls).await;
        StorageReport {
            attempted: outcomes.len(),
            succeeded: outcomes.into_iter().filter(|ok| *ok).count(),
        }
    }
}
