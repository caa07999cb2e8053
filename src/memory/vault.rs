//! Keyword search over the user's note vault.
//!
//! The vault is a folder tree of markdown documents. Search is lexical: query
//! terms are matched against document text and scored by term coverage,
//! frequency saturation, and how early the first match appears. Scores land on
//! the same [0, 1] scale as vector similarity so excerpts from both sources
//! rank against each other directly.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A scored excerpt from one vault document.
#[derive(Debug, Clone)]
pub struct VaultHit {
    /// Path relative to the vault root.
    pub path: String,
    /// The matching passage, not the whole document.
    pub excerpt: String,
    pub score: f64,
}

/// Extensions considered part of the searchable corpus.
const DOC_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// Words carrying no topical signal, excluded from query terms.
const STOP_WORDS: &[&str] = &[
    "i", "me", "my", "the", "a", "an", "is", "am", "are", "was", "were", "be",
    "to", "of", "in", "on", "at", "it", "and", "or", "for", "with", "what",
    "who", "how", "do", "does", "you",
];

pub struct VaultSearch {
    root: PathBuf,
    excerpt_chars: usize,
}

impl VaultSearch {
    pub fn new(root: impl Into<PathBuf>, excerpt_chars: usize) -> Self {
        Self {
            root: root.into(),
            excerpt_chars,
        }
    }

    /// Scan the document tree and return up to `top_k` scored excerpts,
    /// highest score first. A missing root or an unreadable file is skipped,
    /// never fatal.
    pub fn search(&self, query_text: &str, top_k: usize) -> Vec<VaultHit> {
        let terms = query_terms(query_text);
        if terms.is_empty() || top_k == 0 {
            return Vec::new();
        }
        if !self.root.exists() {
            debug!(root = %self.root.display(), "vault root does not exist");
            return Vec::new();
        }

        let mut files = Vec::new();
        collect_documents(&self.root, &mut files);

        let mut hits: Vec<VaultHit> = files
            .iter()
            .filter_map(|path| {
                let content = match std::fs::read_to_string(path) {
                    Ok(c) => c,
                    Err(err) => {
                        warn!(file = %path.display(), error = %err, "skipping unreadable vault file");
                        return None;
                    }
                };
                let score = score_document(&content, &terms)?;
                let excerpt = extract_excerpt(&content, &terms, self.excerpt_chars);
                let rel = path
                    .strip_prefix(&self.root)
                    .unwrap_or(path)
                    .display()
                    .to_string();
                Some(VaultHit {
                    path: rel,
                    excerpt,
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        hits
    }
}

/// Recursively gather document files under `dir`. Unreadable directories are
/// skipped with a warning.
fn collect_documents(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "skipping unreadable vault directory");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_documents(&path, out);
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| DOC_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        {
            out.push(path);
        }
    }
}

/// Significant lowercase terms of a query.
fn query_terms(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 1 && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

/// Lexical relevance of one document, or `None` if no term matches.
///
/// coverage: fraction of query terms present. frequency: total occurrences,
/// saturating so verbosity stops paying off. position: earlier first match
/// scores higher. All three combine into [0, 1].
fn score_document(content: &str, terms: &[String]) -> Option<f64> {
    let haystack = content.to_lowercase();

    let mut matched = 0usize;
    let mut total_hits = 0usize;
    let mut first_offset = usize::MAX;
    for term in terms {
        let hits = haystack.matches(term.as_str()).count();
        if hits > 0 {
            matched += 1;
            total_hits += hits;
            if let Some(pos) = haystack.find(term.as_str()) {
                first_offset = first_offset.min(pos);
            }
        }
    }
    if matched == 0 {
        return None;
    }

    let coverage = matched as f64 / terms.len() as f64;
    let frequency = 1.0 - 1.0 / (1.0 + total_hits as f64);
    let position = 1.0 - (first_offset as f64 / haystack.len().max(1) as f64) * 0.5;

    Some(coverage * (0.4 + 0.3 * frequency + 0.3 * position))
}

/// The passage around the first matching line, capped at `max_chars` and
/// always containing the line that matched.
fn extract_excerpt(content: &str, terms: &[String], max_chars: usize) -> String {
    let match_line = content
        .lines()
        .position(|line| {
            let lower = line.to_lowercase();
            terms.iter().any(|t| lower.contains(t.as_str()))
        })
        .unwrap_or(0);

    let mut excerpt = String::new();
    for line in content.lines().skip(match_line) {
        if !excerpt.is_empty() && excerpt.len() + line.len() + 1 > max_chars {
            break;
        }
        if !excerpt.is_empty() {
            excerpt.push('\n');
        }
        excerpt.push_str(line);
    }

    // A single oversized line still gets clipped to the cap
    if excerpt.len() > max_chars {
        let end = excerpt
            .char_indices()
            .take_while(|(i, _)| *i < max_chars)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(max_chars);
        excerpt.truncate(end);
    }
    excerpt
}
