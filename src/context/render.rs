//! Render a context bundle into the prompt block handed to the model.
//!
//! The orchestrator never renders text; this module is the downstream
//! consumer of its annotations. Excerpts are grouped by source, uncertain ones
//! carry an inline marker, and detected contradictions are spelled out so the
//! model can hedge instead of guessing.

use crate::context::{ContextBundle, SourceKind};
use crate::memory::types::Turn;

/// Phrases that open a user correction of the assistant.
const CORRECTION_OPENERS: &[&str] = &[
    "no",
    "nope",
    "wrong",
    "incorrect",
    "actually",
    "not quite",
    "that's not right",
    "that's wrong",
];

/// Build the memory section of the system prompt from a bundle and the
/// recent-conversation window.
pub fn context_prompt(bundle: &ContextBundle, recent: &[Turn]) -> String {
    let mut out = String::new();

    let identity: Vec<_> = indexed_by_kind(bundle, SourceKind::Identity);
    if !identity.is_empty() {
        out.push_str("## User identity & preferences\n");
        out.push_str("This describes the user you are assisting, not you.\n\n");
        for (idx, excerpt) in &identity {
            push_excerpt(&mut out, bundle, *idx, &excerpt.text);
        }
        out.push('\n');
    }

    if !recent.is_empty() {
        out.push_str("## Recent conversation\n");
        for turn in recent {
            out.push_str(&format!("{}: {}\n", turn.role.as_str().to_uppercase(), turn.text));
        }
        out.push('\n');
    }

    let vault: Vec<_> = indexed_by_kind(bundle, SourceKind::Vault);
    if !vault.is_empty() {
        out.push_str("## Notes & projects\n");
        for (idx, excerpt) in &vault {
            out.push_str(&format!("### {}\n", excerpt.source_path));
            push_excerpt(&mut out, bundle, *idx, &excerpt.text);
        }
        out.push('\n');
    }

    let memory: Vec<_> = indexed_by_kind(bundle, SourceKind::Memory);
    if !memory.is_empty() {
        out.push_str("## Relevant past context\n");
        for (idx, excerpt) in &memory {
            let marker = if bundle.uncertain.contains(idx) {
                " (low confidence)"
            } else {
                ""
            };
            out.push_str(&format!("- {}{marker}\n", excerpt.text));
        }
        out.push('\n');
    }

    for flag in &bundle.conflict_flags {
        let a = &bundle.excerpts[flag.first];
        let b = &bundle.excerpts[flag.second];
        out.push_str(&format!(
            "Note: {} and {} disagree (\"{}\" vs \"{}\"). Prefer the more recent or ask.\n",
            a.source_kind, b.source_kind, a.text, b.text
        ));
    }

    out.trim_end().to_string()
}

fn indexed_by_kind(
    bundle: &ContextBundle,
    kind: SourceKind,
) -> Vec<(usize, &crate::context::KnowledgeExcerpt)> {
    bundle
        .excerpts
        .iter()
        .enumerate()
        .filter(|(_, e)| e.source_kind == kind)
        .collect()
}

fn push_excerpt(out: &mut String, bundle: &ContextBundle, idx: usize, text: &str) {
    out.push_str(text);
    if bundle.uncertain.contains(&idx) {
        out.push_str(" (low confidence)");
    }
    out.push('\n');
}

/// Short citation list for display under a response: which sources fed the
/// bundle, at most two vault files named.
pub fn source_summary(bundle: &ContextBundle) -> String {
    if bundle.is_empty() {
        return String::new();
    }

    let mut lines = vec!["Sources:".to_string()];
    if bundle
        .excerpts
        .iter()
        .any(|e| e.source_kind == SourceKind::Identity)
    {
        lines.push("- your preferences".into());
    }
    for excerpt in bundle
        .excerpts
        .iter()
        .filter(|e| e.source_kind == SourceKind::Vault)
        .take(2)
    {
        lines.push(format!("- vault/{}", excerpt.source_path));
    }
    if bundle
        .excerpts
        .iter()
        .any(|e| e.source_kind == SourceKind::Memory)
    {
        lines.push("- past conversation".into());
    }
    lines.join("\n")
}

/// Whether a user message corrects the assistant's previous answer.
///
/// Matches a correction phrase at the start, or anywhere in a short message.
pub fn is_correction(message: &str) -> bool {
    let lower = message.trim().to_lowercase();
    if CORRECTION_OPENERS.iter().any(|p| opens_with(&lower, p)) {
        return true;
    }
    if lower.split_whitespace().count() <= 5 {
        return CORRECTION_OPENERS.iter().any(|p| lower.contains(p));
    }
    false
}

/// Prefix match on a word boundary, so "no," matches but "nothing" does not.
fn opens_with(message: &str, phrase: &str) -> bool {
    message.strip_prefix(phrase).is_some_and(|rest| {
        rest.chars().next().is_none_or(|c| !c.is_alphanumeric())
    })
}

/// Prefix acknowledging a correction before the updated answer.
pub fn correction_ack() -> &'static str {
    "Got it, I'll update that. "
}
