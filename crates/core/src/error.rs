//! Error types for the refwindow domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all refwindow operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Source reduction errors ---
    #[error("Reduction error: {0}")]
    Reduction(#[from] ReductionError),

    // --- History store errors ---
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    // --- Encoder errors ---
    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures while rewriting tool messages during a reduction pass.
///
/// All of these are fatal for the turn: a tool message is never
/// partially rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReductionError {
    #[error("Malformed tool message for call {tool_call_id}: {reason}")]
    MalformedToolMessage { tool_call_id: String, reason: String },

    #[error("Tool message at position {index} has no tool_call_id")]
    MissingToolCallId { index: usize },

    #[error(
        "Registry out of sync for call {tool_call_id}: needs {expected} chunks, registry holds {available}"
    )]
    RegistryOutOfSync {
        tool_call_id: String,
        expected: usize,
        available: usize,
    },
}

#[derive(Debug, Clone, Error)]
pub enum HistoryError {
    #[error("History store failed: {0}")]
    Store(String),

    #[error("Conversation not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Error)]
pub enum EncoderError {
    #[error("Failed to load tokenizer from {path}: {reason}")]
    Load { path: String, reason: String },
}
