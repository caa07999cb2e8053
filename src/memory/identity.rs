//! Curated "about me" documents, loaded once and cached.
//!
//! The identity set is small and authoritative — user background, preferences,
//! working style. Loading is all-or-nothing: if any configured document is
//! unreadable the whole load reports [`MemoryError::IdentityLoad`] and the
//! cache is left empty, so retrieval never sees a partial identity.

use std::path::PathBuf;
use std::sync::RwLock;
use tracing::info;

use crate::error::MemoryError;

/// One loaded identity document.
#[derive(Debug, Clone)]
pub struct IdentityDoc {
    pub path: String,
    pub text: String,
}

pub struct IdentityLoader {
    files: Vec<PathBuf>,
    cache: RwLock<Vec<IdentityDoc>>,
}

impl IdentityLoader {
    /// Create a loader and attempt the initial load. The error is returned so
    /// the caller can log it, but the loader itself stays usable with an
    /// empty cache — identity context is an enhancement, not a requirement.
    pub fn new(files: Vec<PathBuf>) -> (Self, Result<(), MemoryError>) {
        let loader = Self {
            files,
            cache: RwLock::new(Vec::new()),
        };
        let result = loader.refresh();
        (loader, result)
    }

    /// Re-read every configured document. Either all load and the cache is
    /// replaced, or none do and the previous cache is kept.
    pub fn refresh(&self) -> Result<(), MemoryError> {
        let mut docs = Vec::with_capacity(self.files.len());
        for path in &self.files {
            let text = std::fs::read_to_string(path).map_err(|e| {
                MemoryError::IdentityLoad(format!("{}: {e}", path.display()))
            })?;
            docs.push(IdentityDoc {
                path: path.display().to_string(),
                text: text.trim().to_string(),
            });
        }

        info!(documents = docs.len(), "identity documents loaded");
        *self.cache.write().expect("identity cache lock") = docs;
        Ok(())
    }

    /// The cached identity set. Empty if loading failed or no files are
    /// configured.
    pub fn documents(&self) -> Vec<IdentityDoc> {
        self.cache.read().expect("identity cache lock").clone()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().expect("identity cache lock").is_empty()
    }
}
