use anyhow::Result;

use crate::config::EngramConfig;
use crate::db;
use crate::memory::vector::{DistanceMetric, VectorMemoryStore};
use std::str::FromStr;

/// Print turn-store statistics without loading the embedding model.
pub fn stats(config: &EngramConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path, config.storage.dimension)?;
    let metric = DistanceMetric::from_str(&config.storage.metric)?;
    let store = VectorMemoryStore::new(conn, config.storage.dimension, metric);

    let stats = store.stats()?;
    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    println!("Turn store: {}", db_path.display());
    println!("  total turns:     {}", stats.total_turns);
    println!("    user:          {}", stats.user_turns);
    println!("    assistant:     {}", stats.assistant_turns);
    println!("  indexed vectors: {}", stats.indexed_turns);
    println!("  db size:         {} bytes", db_size);
    if let (Some(oldest), Some(newest)) = (&stats.oldest, &stats.newest) {
        println!("  span:            {oldest} .. {newest}");
    }

    Ok(())
}
