//! Per-turn entry point: fetch stored history, then compile.
//!
//! Fetching history is the only suspension point here. Compilation itself
//! is synchronous and CPU-bound; the model call stays with the caller.

use crate::context::assembler::UserPlaceholder;
use crate::context::compiler::{CompileInput, CompiledHistory, HistoryCompiler};
use refwindow_core::history::HistoryStore;
use refwindow_core::message::Message;
use refwindow_core::reference::ReferenceRegistry;
use std::sync::Arc;
use tracing::debug;

/// What the enclosing pipeline knows about the turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// Conversation whose stored history is fetched.
    pub conversation_id: String,
    /// System prompt text.
    pub system_text: String,
    /// Placeholder to swap inside the last stored user message.
    pub placeholder: Option<UserPlaceholder>,
}

impl TurnRequest {
    pub fn new(conversation_id: impl Into<String>, system_text: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            system_text: system_text.into(),
            placeholder: None,
        }
    }

    pub fn with_placeholder(mut self, placeholder: UserPlaceholder) -> Self {
        self.placeholder = Some(placeholder);
        self
    }
}

/// Couples a [`HistoryStore`] with a [`HistoryCompiler`].
pub struct TurnCompiler {
    store: Arc<dyn HistoryStore>,
    compiler: HistoryCompiler,
}

impl TurnCompiler {
    pub fn new(store: Arc<dyn HistoryStore>, compiler: HistoryCompiler) -> Self {
        Self { store, compiler }
    }

    pub fn compiler(&self) -> &HistoryCompiler {
        &self.compiler
    }

    /// Fetch the conversation and compile the messages for the next model call.
    ///
    /// The registry is only touched after the fetch completes, and is held
    /// by unique reference for the whole call.
    pub async fn compile_turn(
        &self,
        request: &TurnRequest,
        loop_history: &mut [Message],
        registry: &mut dyn ReferenceRegistry,
    ) -> refwindow_core::Result<CompiledHistory> {
        let db_history = self
            .store
            .get_full_history(&request.conversation_id)
            .await?;
        debug!(
            conversation_id = %request.conversation_id,
            stored = db_history.len(),
            in_turn = loop_history.len(),
            "Fetched stored history"
        );

        let input = CompileInput {
            system_text: &request.system_text,
            db_history: &db_history,
            placeholder: request.placeholder.as_ref(),
        };
        Ok(self.compiler.compile(&input, loop_history, registry)?)
    }
}
