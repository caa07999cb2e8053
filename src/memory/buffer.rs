//! Recent-turn ring buffer — the source of short-term context.
//!
//! Holds the last N turns in insertion order, evicting from the head on
//! overflow. Optionally persisted as a single JSON document rewritten on every
//! append with an atomic temp-file-and-rename, so a crash loses at most the
//! turn being written and never corrupts the file.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::MemoryError;
use crate::memory::types::Turn;

/// On-disk shape of a persisted buffer.
#[derive(Serialize, Deserialize)]
struct BufferSnapshot {
    turns: Vec<Turn>,
    saved_at: String,
}

pub struct ConversationBuffer {
    turns: VecDeque<Turn>,
    capacity: usize,
    /// `None` means memory-only.
    path: Option<PathBuf>,
}

impl ConversationBuffer {
    /// Memory-only buffer. Contents are lost on restart.
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
            path: None,
        }
    }

    /// Disk-backed buffer. Loads any previously persisted turns; a missing
    /// file starts empty, and a corrupt one is discarded with a warning
    /// rather than failing startup.
    pub fn persistent(capacity: usize, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut buffer = Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
            path: Some(path.clone()),
        };

        match load_snapshot(&path) {
            Ok(Some(snapshot)) => {
                let total = snapshot.turns.len();
                // Keep only the newest `capacity` turns
                for turn in snapshot
                    .turns
                    .into_iter()
                    .skip(total.saturating_sub(capacity))
                {
                    buffer.turns.push_back(turn);
                }
                debug!(loaded = buffer.turns.len(), "buffer restored from disk");
            }
            Ok(None) => {}
            Err(err) => {
                warn!(path = %path.display(), error = %err, "discarding unreadable buffer file");
            }
        }

        buffer
    }

    /// Insert at the tail, evicting from the head once over capacity.
    /// O(1) amortized; the optional disk write rewrites the whole window.
    pub fn append(&mut self, turn: Turn) -> Result<(), MemoryError> {
        self.turns.push_back(turn);
        while self.turns.len() > self.capacity {
            self.turns.pop_front();
        }

        if let Some(path) = self.path.clone() {
            self.save(&path)?;
        }
        Ok(())
    }

    /// The last min(k, len) turns in chronological order. Never fails; an
    /// empty buffer yields an empty slice.
    pub fn recent(&self, k: usize) -> Vec<Turn> {
        let skip = self.turns.len().saturating_sub(k);
        self.turns.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every buffered turn and the persisted file, if any.
    pub fn purge(&mut self) -> Result<(), MemoryError> {
        self.turns.clear();
        if let Some(path) = &self.path {
            if path.exists() {
                std::fs::remove_file(path)
                    .map_err(|e| MemoryError::Store(format!("failed to remove buffer file: {e}")))?;
            }
        }
        Ok(())
    }

    /// Write the full window to disk via temp file + rename.
    fn save(&self, path: &Path) -> Result<(), MemoryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MemoryError::Store(format!("failed to create buffer dir: {e}")))?;
        }

        let snapshot = BufferSnapshot {
            turns: self.turns.iter().cloned().collect(),
            saved_at: chrono::Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_string(&snapshot)
            .map_err(|e| MemoryError::Store(format!("failed to encode buffer: {e}")))?;

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| MemoryError::Store(format!("failed to write buffer file: {e}")))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| MemoryError::Store(format!("failed to replace buffer file: {e}")))?;

        Ok(())
    }
}

fn load_snapshot(path: &Path) -> Result<Option<BufferSnapshot>, MemoryError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .map_err(|e| MemoryError::Store(format!("failed to read buffer file: {e}")))?;
    let snapshot = serde_json::from_str(&contents)
        .map_err(|e| MemoryError::Store(format!("buffer file is not valid JSON: {e}")))?;
    Ok(Some(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::Role;

    fn turn(text: &str) -> Turn {
        Turn::new("conv-1", Role::User, text)
    }

    #[test]
    fn append_evicts_oldest_first() {
        let mut buffer = ConversationBuffer::in_memory(3);
        for text in ["A", "B", "C", "D"] {
            buffer.append(turn(text)).unwrap();
        }

        assert_eq!(buffer.len(), 3);
        let recent: Vec<String> = buffer.recent(3).into_iter().map(|t| t.text).collect();
        assert_eq!(recent, vec!["B", "C", "D"]);
    }

    #[test]
    fn recent_returns_min_of_k_capacity_and_len() {
        let mut buffer = ConversationBuffer::in_memory(5);
        buffer.append(turn("one")).unwrap();
        buffer.append(turn("two")).unwrap();

        assert_eq!(buffer.recent(10).len(), 2);
        assert_eq!(buffer.recent(1).len(), 1);
        assert_eq!(buffer.recent(1)[0].text, "two");
        assert!(ConversationBuffer::in_memory(5).recent(3).is_empty());
    }

    #[test]
    fn recent_is_chronological() {
        let mut buffer = ConversationBuffer::in_memory(10);
        for text in ["first", "second", "third"] {
            buffer.append(turn(text)).unwrap();
        }
        let texts: Vec<String> = buffer.recent(2).into_iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["second", "third"]);
    }

    #[test]
    fn persisted_buffer_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffer.json");

        let mut buffer = ConversationBuffer::persistent(3, &path);
        buffer.append(turn("hello")).unwrap();
        buffer.append(turn("world")).unwrap();
        drop(buffer);

        let reopened = ConversationBuffer::persistent(3, &path);
        let texts: Vec<String> = reopened.recent(3).into_iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["hello", "world"]);
    }

    #[test]
    fn reopen_with_smaller_capacity_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffer.json");

        let mut buffer = ConversationBuffer::persistent(5, &path);
        for text in ["A", "B", "C", "D"] {
            buffer.append(turn(text)).unwrap();
        }
        drop(buffer);

        let reopened = ConversationBuffer::persistent(2, &path);
        let texts: Vec<String> = reopened.recent(5).into_iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["C", "D"]);
    }

    #[test]
    fn corrupt_buffer_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffer.json");
        std::fs::write(&path, "{ not json").unwrap();

        let buffer = ConversationBuffer::persistent(3, &path);
        assert!(buffer.is_empty());
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffer.json");

        let mut buffer = ConversationBuffer::persistent(3, &path);
        buffer.append(turn("hello")).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn purge_clears_memory_and_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffer.json");

        let mut buffer = ConversationBuffer::persistent(3, &path);
        buffer.append(turn("hello")).unwrap();
        buffer.purge().unwrap();

        assert!(buffer.is_empty());
        assert!(!path.exists());
    }
}
