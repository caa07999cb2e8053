//! Buffer window properties: capacity, ordering, durability.

mod helpers;

use engram::memory::buffer::ConversationBuffer;
use helpers::user_turn;

#[test]
fn capacity_three_keeps_last_three() {
    let mut buffer = ConversationBuffer::in_memory(3);
    for text in ["A", "B", "C", "D"] {
        buffer.append(user_turn("conv", text)).unwrap();
    }

    let texts: Vec<String> = buffer.recent(3).into_iter().map(|t| t.text).collect();
    assert_eq!(texts, vec!["B", "C", "D"]);
}

#[test]
fn recent_returns_min_of_k_capacity_and_appended() {
    // For all N appends with capacity C, recent(k) holds min(k, C, N) turns
    let capacity = 4;
    for appended in 0..7 {
        let mut buffer = ConversationBuffer::in_memory(capacity);
        for i in 0..appended {
            buffer.append(user_turn("conv", &format!("turn {i}"))).unwrap();
        }
        assert!(buffer.len() <= capacity);

        for k in 0..6 {
            let got = buffer.recent(k).len();
            assert_eq!(got, k.min(capacity).min(appended));
        }
    }
}

#[test]
fn order_is_chronological_across_eviction() {
    let mut buffer = ConversationBuffer::in_memory(3);
    for i in 0..10 {
        buffer.append(user_turn("conv", &i.to_string())).unwrap();
    }

    let texts: Vec<String> = buffer.recent(3).into_iter().map(|t| t.text).collect();
    assert_eq!(texts, vec!["7", "8", "9"]);
}

#[test]
fn persisted_window_restores_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("buffer.json");

    {
        let mut buffer = ConversationBuffer::persistent(4, &path);
        for text in ["one", "two", "three"] {
            buffer.append(user_turn("conv", text)).unwrap();
        }
    }

    let restored = ConversationBuffer::persistent(4, &path);
    assert_eq!(restored.len(), 3);
    let texts: Vec<String> = restored.recent(4).into_iter().map(|t| t.text).collect();
    assert_eq!(texts, vec!["one", "two", "three"]);
}

#[test]
fn truncated_file_degrades_to_empty_not_panic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("buffer.json");

    // Simulate a file mangled by something other than our atomic writes
    std::fs::write(&path, r#"{"turns":[{"id":"x""#).unwrap();

    let buffer = ConversationBuffer::persistent(4, &path);
    assert!(buffer.is_empty());
}

#[test]
fn memory_only_buffer_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut buffer = ConversationBuffer::in_memory(4);
    buffer.append(user_turn("conv", "ephemeral")).unwrap();

    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn roles_survive_persistence_round_trip() {
    use engram::memory::types::{Role, Turn};

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("buffer.json");

    {
        let mut buffer = ConversationBuffer::persistent(4, &path);
        buffer.append(Turn::new("conv", Role::User, "question")).unwrap();
        buffer.append(Turn::new("conv", Role::Assistant, "answer")).unwrap();
    }

    let restored = ConversationBuffer::persistent(4, &path);
    let turns = restored.recent(2);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[1].role, Role::Assistant);
}
