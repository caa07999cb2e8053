use anyhow::Result;

use crate::config::EngramConfig;
use crate::context::render;
use crate::engine::MemoryEngine;

/// Run a one-off context query from the terminal and print the assembled
/// bundle the way the model would receive it.
pub async fn search(config: EngramConfig, query: &str) -> Result<()> {
    let engine = MemoryEngine::new(config)?;
    let bundle = engine.peek(query).await;

    if bundle.is_empty() {
        println!("No context found.");
        return Ok(());
    }

    println!(
        "Assembled {} excerpt(s){}\n",
        bundle.excerpts.len(),
        if bundle.truncated { " (truncated to budget)" } else { "" }
    );

    for (i, excerpt) in bundle.excerpts.iter().enumerate() {
        let mut markers = String::new();
        if bundle.uncertain.contains(&i) {
            markers.push_str(" [uncertain]");
        }
        if bundle
            .conflict_flags
            .iter()
            .any(|f| f.first == i || f.second == i)
        {
            markers.push_str(" [conflict]");
        }

        let preview = if excerpt.text.chars().count() > 120 {
            let clipped: String = excerpt.text.chars().take(120).collect();
            format!("{clipped}...")
        } else {
            excerpt.text.clone()
        };

        println!(
            "  {}. [{}] {} (score: {:.4}){}",
            i + 1,
            excerpt.source_kind,
            excerpt.source_path,
            excerpt.relevance_score,
            markers,
        );
        println!("     {preview}");
        println!();
    }

    let summary = render::source_summary(&bundle);
    if !summary.is_empty() {
        println!("{summary}");
    }

    Ok(())
}
