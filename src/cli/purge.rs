use anyhow::Result;
use std::io::Write;

use crate::config::{expand_tilde, EngramConfig};
use crate::db;
use crate::memory::buffer::ConversationBuffer;
use crate::memory::vector::{DistanceMetric, VectorMemoryStore};
use std::str::FromStr;

/// Permanently delete every remembered turn — vector index and buffer alike.
/// Prompts for confirmation unless `yes` is set.
pub fn purge(config: &EngramConfig, yes: bool) -> Result<()> {
    if !yes {
        print!("This permanently deletes all remembered turns. Continue? [y/N] ");
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let conn = db::open_database(config.resolved_db_path(), config.storage.dimension)?;
    let metric = DistanceMetric::from_str(&config.storage.metric)?;
    let store = VectorMemoryStore::new(conn, config.storage.dimension, metric);
    let removed = store.purge()?;

    if config.buffer.persist {
        let mut buffer = ConversationBuffer::persistent(
            config.buffer.capacity,
            expand_tilde(&config.buffer.path),
        );
        buffer.purge()?;
    }

    println!("Removed {removed} turn(s).");
    Ok(())
}
