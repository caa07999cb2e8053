//! Best-effort contradiction detection between retrieved excerpts.
//!
//! This is a heuristic classifier, not a proof: false negatives are acceptable,
//! false positives must stay rare. The default detector is rule-based — a
//! topic-overlap gate plus two triggers (negation mismatch, opposition term
//! pairs). The trait keeps the strategy swappable, e.g. for a model-assisted
//! judge, without touching the orchestrator.

use crate::config::ConflictConfig;
use crate::context::KnowledgeExcerpt;

/// Pluggable contradiction judgment between two excerpts.
pub trait ConflictStrategy: Send + Sync {
    fn is_conflicting(&self, a: &KnowledgeExcerpt, b: &KnowledgeExcerpt) -> bool;
}

/// Words ignored when deciding whether two excerpts cover the same topic.
const STOP_WORDS: &[&str] = &[
    "i", "me", "my", "the", "a", "an", "is", "am", "are", "was", "were", "be",
    "to", "of", "in", "on", "at", "it", "and", "or", "for", "with", "that",
    "this", "they", "them",
];

/// Markers of a negated claim. Matched against tokenized terms, so
/// apostrophe-free spellings cover the contracted forms.
const NEGATIONS: &[&str] = &["not", "no", "never", "dont", "doesnt", "isnt", "wont"];

pub struct RuleBasedConflicts {
    min_topic_overlap: usize,
    opposition_pairs: Vec<[String; 2]>,
}

impl RuleBasedConflicts {
    pub fn new(config: &ConflictConfig) -> Self {
        Self {
            min_topic_overlap: config.min_topic_overlap,
            opposition_pairs: config
                .opposition_pairs
                .iter()
                .map(|[a, b]| [a.to_lowercase(), b.to_lowercase()])
                .collect(),
        }
    }
}

impl ConflictStrategy for RuleBasedConflicts {
    fn is_conflicting(&self, a: &KnowledgeExcerpt, b: &KnowledgeExcerpt) -> bool {
        let terms_a = significant_terms(&a.text);
        let terms_b = significant_terms(&b.text);

        // Gate: no shared topic, no conflict — keeps false positives rare.
        let overlap = terms_a.iter().filter(|t| terms_b.contains(*t)).count();
        if overlap < self.min_topic_overlap {
            return false;
        }

        // Trigger 1: one side negates, the other does not.
        if has_negation(&terms_a) != has_negation(&terms_b) {
            return true;
        }

        // Trigger 2: a configured opposition pair splits across the two sides.
        for [left, right] in &self.opposition_pairs {
            let a_left = terms_a.contains(left);
            let a_right = terms_a.contains(right);
            let b_left = terms_b.contains(left);
            let b_right = terms_b.contains(right);
            if (a_left && b_right && !a_right) || (a_right && b_left && !a_left) {
                return true;
            }
        }

        false
    }
}

fn significant_terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| !w.is_empty() && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

fn has_negation(terms: &[String]) -> bool {
    terms.iter().any(|t| NEGATIONS.contains(&t.as_str()))
}
