//! History store trait: where raw conversation history comes from.
//!
//! The store returns an already-merged message sequence; how it is
//! persisted (database, chat platform, file) is the implementor's concern.

use crate::error::HistoryError;
use crate::message::Message;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Source of stored conversation history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Full stored history of a conversation, oldest first.
    async fn get_full_history(
        &self,
        conversation_id: &str,
    ) -> std::result::Result<Vec<Message>, HistoryError>;
}

/// An in-memory store keyed by conversation id.
/// Useful for testing and sessions where persistence isn't needed.
pub struct InMemoryHistoryStore {
    conversations: Arc<RwLock<HashMap<String, Vec<Message>>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Append a message to a conversation, creating it if needed.
    pub async fn push(&self, conversation_id: &str, message: Message) {
        self.conversations
            .write()
            .await
            .entry(conversation_id.to_string())
            .or_default()
            .push(message);
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn get_full_history(&self, conversation_id: &str) -> Result<Vec<Message>, HistoryError> {
        self.conversations
            .read()
            .await
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| HistoryError::NotFound(conversation_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_and_fetch() {
        let store = InMemoryHistoryStore::new();
        store.push("conv_1", Message::user("hi")).await;
        store.push("conv_1", Message::assistant("hello")).await;

        let history = store.get_full_history("conv_1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].is_user());
    }

    #[tokio::test]
    async fn unknown_conversation_is_not_found() {
        let store = InMemoryHistoryStore::new();
        let err = store.get_full_history("missing").await.unwrap_err();
        assert!(matches!(err, HistoryError::NotFound(_)));
    }
}
