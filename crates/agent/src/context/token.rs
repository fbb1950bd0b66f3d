//! Token counting over messages.
//!
//! The encoder is injected; this module only decides *what* gets counted:
//! every textual field of every message, structured content blocks
//! included. Message ids and timestamps never reach the model and are not
//! counted.

use refwindow_core::encoder::{Encoder, HeuristicEncoder};
use refwindow_core::message::Message;
use std::sync::Arc;

/// Default fraction of the input limit held in reserve.
pub const DEFAULT_SAFETY_MARGIN: f64 = 0.1;

/// Token ceiling after reserving `margin` of `input_limit`.
pub fn effective_budget(input_limit: usize, margin: f64) -> usize {
    refwindow_config::effective_budget(input_limit, margin)
}

/// Counts tokens for messages via an injected [`Encoder`]. Cheap to clone.
#[derive(Clone)]
pub struct TokenCounter {
    encoder: Arc<dyn Encoder>,
}

impl TokenCounter {
    pub fn new(encoder: Arc<dyn Encoder>) -> Self {
        Self { encoder }
    }

    /// Counter backed by the ~4 chars/token heuristic.
    pub fn heuristic() -> Self {
        Self::new(Arc::new(HeuristicEncoder::default()))
    }

    /// Tokens in a single string.
    pub fn count_text(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.encoder.token_len(text)
    }

    /// Tokens in one message, summed field by field.
    pub fn count_message(&self, message: &Message) -> usize {
        message
            .text_fields()
            .into_iter()
            .map(|field| self.count_text(field))
            .sum()
    }

    /// Tokens in a message sequence.
    pub fn count(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.count_message(m)).sum()
    }
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter").finish_non_exhaustive()
    }
}
