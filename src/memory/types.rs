//! Turn types — the unit of conversational memory.
//!
//! A [`Turn`] is one message in a conversation. Turns are immutable once written
//! and deleted only by an explicit user-initiated purge. [`MemoryRecord`] is the
//! persisted projection returned from vector-store queries, carrying the
//! query-time similarity score.

use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// UUID v7 (time-sortable) identifier.
    pub id: String,
    /// Conversation thread this turn belongs to.
    pub conversation_id: String,
    pub role: Role,
    pub text: String,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// Set once embedding succeeds; turns whose embedding failed are still
    /// buffered, just never indexed for semantic recall.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Turn {
    /// Create a turn stamped with a fresh UUID v7 and the current time.
    pub fn new(conversation_id: impl Into<String>, role: Role, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            conversation_id: conversation_id.into(),
            role,
            text: text.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Option<Vec<f32>>) -> Self {
        self.embedding = embedding;
        self
    }
}

/// A stored turn as returned from a vector-store query.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryRecord {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub text: String,
    pub created_at: String,
    /// Similarity to the query embedding, in [0, 1]. Computed at query time,
    /// never stored.
    pub similarity: f64,
}
