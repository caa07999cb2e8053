//! Retrieval orchestrator behavior under healthy, failing, and slow plugins.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use engram::config::{ConflictConfig, RetrievalConfig};
use engram::context::retrieval::RetrievalOrchestrator;
use engram::context::{KnowledgeExcerpt, QueryContext, RetrievalPlugin, SourceKind};
use engram::error::MemoryError;

struct FixedSource {
    name: &'static str,
    excerpts: Vec<KnowledgeExcerpt>,
}

#[async_trait]
impl RetrievalPlugin for FixedSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn retrieve(&self, _query: &QueryContext) -> Result<Vec<KnowledgeExcerpt>, MemoryError> {
        Ok(self.excerpts.clone())
    }
}

struct FailingSource;

#[async_trait]
impl RetrievalPlugin for FailingSource {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn retrieve(&self, _query: &QueryContext) -> Result<Vec<KnowledgeExcerpt>, MemoryError> {
        Err(MemoryError::Retrieve("backend exploded".into()))
    }
}

struct SlowSource {
    excerpts: Vec<KnowledgeExcerpt>,
}

#[async_trait]
impl RetrievalPlugin for SlowSource {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn retrieve(&self, _query: &QueryContext) -> Result<Vec<KnowledgeExcerpt>, MemoryError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(self.excerpts.clone())
    }
}

fn excerpt(text: &str, score: f64, kind: SourceKind) -> KnowledgeExcerpt {
    KnowledgeExcerpt {
        source_path: format!("{kind}/{}", text.len()),
        text: text.into(),
        relevance_score: score,
        source_kind: kind,
    }
}

fn query() -> QueryContext {
    QueryContext {
        text: "what do I prefer?".into(),
        embedding: None,
        top_k: 5,
    }
}

fn retrieval_config() -> RetrievalConfig {
    RetrievalConfig {
        plugin_timeout_ms: 200,
        ..Default::default()
    }
}

fn orchestrator(plugins: Vec<Arc<dyn RetrievalPlugin>>) -> RetrievalOrchestrator {
    RetrievalOrchestrator::new(plugins, &retrieval_config(), &ConflictConfig::default())
}

#[tokio::test]
async fn failing_plugin_does_not_poison_the_bundle() {
    let healthy = FixedSource {
        name: "vault",
        excerpts: vec![excerpt("note about coffee", 0.8, SourceKind::Vault)],
    };
    let bundle = orchestrator(vec![Arc::new(healthy), Arc::new(FailingSource)])
        .assemble(&query())
        .await;

    assert_eq!(bundle.excerpts.len(), 1);
    assert_eq!(bundle.excerpts[0].text, "note about coffee");
    assert!(!bundle.truncated);
}

#[tokio::test]
async fn all_plugins_failing_yields_empty_bundle_not_error() {
    let bundle = orchestrator(vec![Arc::new(FailingSource), Arc::new(FailingSource)])
        .assemble(&query())
        .await;

    assert!(bundle.is_empty());
    assert!(bundle.conflict_flags.is_empty());
    assert!(!bundle.truncated);
}

#[tokio::test]
async fn slow_plugin_is_cut_off_without_stalling_others() {
    let fast = FixedSource {
        name: "memory",
        excerpts: vec![excerpt("fast answer", 0.7, SourceKind::Memory)],
    };
    let slow = SlowSource {
        excerpts: vec![excerpt("too late", 0.99, SourceKind::Vault)],
    };

    let started = std::time::Instant::now();
    let bundle = orchestrator(vec![Arc::new(fast), Arc::new(slow)])
        .assemble(&query())
        .await;

    assert_eq!(bundle.excerpts.len(), 1);
    assert_eq!(bundle.excerpts[0].text, "fast answer");
    // Bounded by the per-call timeout, nowhere near the 5s sleep
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn merged_excerpts_rank_by_score_then_source_priority() {
    let memory = FixedSource {
        name: "memory",
        excerpts: vec![
            excerpt("memory at same score", 0.8, SourceKind::Memory),
            excerpt("memory low", 0.2, SourceKind::Memory),
        ],
    };
    let vault = FixedSource {
        name: "vault",
        excerpts: vec![excerpt("vault at same score", 0.8, SourceKind::Vault)],
    };
    let identity = FixedSource {
        name: "identity",
        excerpts: vec![excerpt("identity at same score", 0.8, SourceKind::Identity)],
    };

    let bundle = orchestrator(vec![Arc::new(memory), Arc::new(vault), Arc::new(identity)])
        .assemble(&query())
        .await;

    let texts: Vec<&str> = bundle.excerpts.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(
        texts,
        vec![
            "identity at same score",
            "vault at same score",
            "memory at same score",
            "memory low",
        ]
    );
}

#[tokio::test]
async fn character_budget_drops_lowest_relevance_first() {
    // Five 100-char excerpts against a 200-char budget
    let chunk = "x".repeat(100);
    let excerpts: Vec<KnowledgeExcerpt> = (0..5)
        .map(|i| excerpt(&chunk, 0.9 - i as f64 * 0.1, SourceKind::Memory))
        .collect();
    let scores: Vec<f64> = excerpts.iter().map(|e| e.relevance_score).collect();

    let config = RetrievalConfig {
        context_budget: 200,
        plugin_timeout_ms: 200,
        ..Default::default()
    };
    let source = FixedSource { name: "memory", excerpts };
    let bundle = RetrievalOrchestrator::new(
        vec![Arc::new(source)],
        &config,
        &ConflictConfig::default(),
    )
    .assemble(&query())
    .await;

    assert!(bundle.truncated);
    assert_eq!(bundle.excerpts.len(), 2);
    assert_eq!(bundle.excerpts[0].relevance_score, scores[0]);
    assert_eq!(bundle.excerpts[1].relevance_score, scores[1]);
}

#[tokio::test]
async fn oversized_top_excerpt_is_still_returned() {
    let big = excerpt(&"y".repeat(500), 0.9, SourceKind::Vault);
    let config = RetrievalConfig {
        context_budget: 200,
        plugin_timeout_ms: 200,
        ..Default::default()
    };
    let source = FixedSource { name: "vault", excerpts: vec![big] };
    let bundle = RetrievalOrchestrator::new(
        vec![Arc::new(source)],
        &config,
        &ConflictConfig::default(),
    )
    .assemble(&query())
    .await;

    assert_eq!(bundle.excerpts.len(), 1);
    assert!(!bundle.truncated);
}

#[tokio::test]
async fn low_relevance_excerpts_are_annotated_uncertain() {
    let source = FixedSource {
        name: "memory",
        excerpts: vec![
            excerpt("confident", 0.9, SourceKind::Memory),
            excerpt("shaky", 0.35, SourceKind::Memory),
        ],
    };
    let bundle = orchestrator(vec![Arc::new(source)]).assemble(&query()).await;

    assert_eq!(bundle.uncertain, vec![1]);
    assert_eq!(bundle.excerpts[1].text, "shaky");
}

#[tokio::test]
async fn contradictory_cross_source_pair_is_flagged() {
    let identity = FixedSource {
        name: "identity",
        excerpts: vec![excerpt("user is vegetarian", 1.0, SourceKind::Identity)],
    };
    let vault = FixedSource {
        name: "vault",
        excerpts: vec![excerpt("user loves steak", 0.9, SourceKind::Vault)],
    };

    let bundle = orchestrator(vec![Arc::new(identity), Arc::new(vault)])
        .assemble(&query())
        .await;

    assert_eq!(bundle.conflict_flags.len(), 1);
    let flag = bundle.conflict_flags[0];
    let pair = [
        bundle.excerpts[flag.first].text.as_str(),
        bundle.excerpts[flag.second].text.as_str(),
    ];
    assert!(pair.contains(&"user is vegetarian"));
    assert!(pair.contains(&"user loves steak"));
}

#[tokio::test]
async fn low_scoring_pairs_are_not_conflict_checked() {
    let identity = FixedSource {
        name: "identity",
        excerpts: vec![excerpt("user is vegetarian", 1.0, SourceKind::Identity)],
    };
    // Same contradictory text, but below the conflict threshold
    let vault = FixedSource {
        name: "vault",
        excerpts: vec![excerpt("user loves steak", 0.4, SourceKind::Vault)],
    };

    let bundle = orchestrator(vec![Arc::new(identity), Arc::new(vault)])
        .assemble(&query())
        .await;

    assert!(bundle.conflict_flags.is_empty());
}

#[tokio::test]
async fn conflicts_computed_only_over_returned_excerpts() {
    // The contradictory vault excerpt falls outside the budget
    let identity = FixedSource {
        name: "identity",
        excerpts: vec![excerpt(&format!("user is vegetarian. {}", "z".repeat(180)), 1.0, SourceKind::Identity)],
    };
    let vault = FixedSource {
        name: "vault",
        excerpts: vec![excerpt("user loves steak", 0.9, SourceKind::Vault)],
    };

    let config = RetrievalConfig {
        context_budget: 150,
        plugin_timeout_ms: 200,
        ..Default::default()
    };
    let bundle = RetrievalOrchestrator::new(
        vec![Arc::new(identity), Arc::new(vault)],
        &config,
        &ConflictConfig::default(),
    )
    .assemble(&query())
    .await;

    assert!(bundle.truncated);
    assert_eq!(bundle.excerpts.len(), 1);
    assert!(bundle.conflict_flags.is_empty());
}

#[tokio::test]
async fn same_source_pairs_are_never_conflict_flagged() {
    let vault = FixedSource {
        name: "vault",
        excerpts: vec![
            excerpt("user is vegetarian", 0.9, SourceKind::Vault),
            excerpt("user loves steak", 0.8, SourceKind::Vault),
        ],
    };

    let bundle = orchestrator(vec![Arc::new(vault)]).assemble(&query()).await;
    assert!(bundle.conflict_flags.is_empty());
}
