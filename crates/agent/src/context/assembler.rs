//! History assembly: building the ordered message sequence for one call.
//!
//! The compiled sequence is always:
//!
//! | Part | Source | Trim Strategy |
//! |------|--------|---------------|
//! | 1. System | Caller | Never trimmed |
//! | 2. Stored history | [`HistoryStore`](refwindow_core::HistoryStore) | Oldest dropped (token window), then cut to the first user turn |
//! | 3. Loop history | Current turn's assistant/tool messages | Never dropped; tool results shrink via the source reducer |
//!
//! # Determinism
//!
//! Assembly never reorders messages and uses no random or time-dependent
//! logic: identical inputs always produce identical outputs.

use crate::context::token::TokenCounter;
use refwindow_core::message::{ContentBlock, Message, MessageContent, Role};
use tracing::warn;

/// A user turn stored with a raw placeholder that must be swapped for the
/// fully rendered prompt before the model sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPlaceholder {
    /// Text as stored in history.
    pub original_text: String,
    /// Text to send instead.
    pub rendered_text: String,
}

impl UserPlaceholder {
    pub fn new(original_text: impl Into<String>, rendered_text: impl Into<String>) -> Self {
        Self {
            original_text: original_text.into(),
            rendered_text: rendered_text.into(),
        }
    }
}

/// Builds and trims message sequences. Stateless apart from its counter.
#[derive(Debug, Clone)]
pub struct HistoryAssembler {
    counter: TokenCounter,
}

impl HistoryAssembler {
    pub fn new(counter: TokenCounter) -> Self {
        Self { counter }
    }

    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    /// `[system] + db_history + loop_history`, in that order.
    pub fn assemble(system_text: &str, db_history: &[Message], loop_history: &[Message]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(1 + db_history.len() + loop_history.len());
        messages.push(Message::system(system_text));
        messages.extend_from_slice(db_history);
        messages.extend_from_slice(loop_history);
        messages
    }

    /// Swap the placeholder inside the last user message for the rendered text.
    ///
    /// The rendered text is prefixed to whatever remains once the first
    /// occurrence of the original is cut out, so anything appended after
    /// the placeholder (attachment notes, quoted replies) survives. Block
    /// content is edited in its last text block. Without any user message a
    /// new one is appended. Earlier user messages are never touched.
    pub fn replace_placeholder_user_message(
        history: &mut Vec<Message>,
        original_text: &str,
        rendered_text: &str,
    ) {
        let Some(idx) = history.iter().rposition(|m| m.role == Role::User) else {
            history.push(Message::user(rendered_text));
            return;
        };

        match &mut history[idx].content {
            MessageContent::Text(text) => {
                *text = splice(text, original_text, rendered_text);
            }
            MessageContent::Blocks(blocks) => {
                let last_text = blocks.iter_mut().rev().find_map(|block| match block {
                    ContentBlock::Text { text } => Some(text),
                    _ => None,
                });
                match last_text {
                    Some(text) => *text = splice(text, original_text, rendered_text),
                    None => blocks.insert(0, ContentBlock::text(rendered_text)),
                }
            }
        }
    }

    /// Longest suffix of `messages` whose token count fits in `limit`.
    ///
    /// Walks newest-first and stops at the first message that would
    /// overflow; nothing older than that message is considered. May return
    /// an empty list when even the newest message is too large.
    pub fn limit_to_token_window(&self, messages: &[Message], limit: usize) -> Vec<Message> {
        let mut used = 0;
        let mut start = messages.len();
        for (i, msg) in messages.iter().enumerate().rev() {
            let msg_tokens = self.counter.count_message(msg);
            if used + msg_tokens > limit {
                break;
            }
            used += msg_tokens;
            start = i;
        }
        messages[start..].to_vec()
    }

    /// Drop leading non-user messages so the sequence opens on a user turn.
    ///
    /// Window trimming can leave an orphaned tool result or assistant reply
    /// at the front. Returns an empty list when no user message exists.
    pub fn ensure_last_message_is_user(history: &[Message]) -> Vec<Message> {
        history
            .iter()
            .position(|m| m.role == Role::User)
            .map(|start| history[start..].to_vec())
            .unwrap_or_default()
    }

    /// Stored history as it enters assembly: token-windowed, anchored on a
    /// user turn, and with the placeholder swapped in.
    ///
    /// Whenever windowing or anchoring leaves nothing, the single most
    /// recent stored message is used instead. That fallback is the one case
    /// where the result may open on a non-user message, and only when no
    /// placeholder supplies a user turn.
    pub fn prepare_stored_history(
        &self,
        db_history: &[Message],
        window: usize,
        placeholder: Option<&UserPlaceholder>,
    ) -> Vec<Message> {
        let mut history = self.limit_to_token_window(db_history, window);
        if history.is_empty() && !db_history.is_empty() {
            warn!(
                window,
                stored = db_history.len(),
                "Newest stored message exceeds the history window, keeping it alone"
            );
            history = last_message(db_history);
        }

        let mut anchored = Self::ensure_last_message_is_user(&history);
        if anchored.is_empty() && !history.is_empty() {
            warn!(
                kept = history.len(),
                "No user message inside the history window, keeping the latest message"
            );
            anchored = last_message(&history);
        }

        if let Some(p) = placeholder {
            Self::replace_placeholder_user_message(&mut anchored, &p.original_text, &p.rendered_text);
            // The splice may have appended a user turn behind a fallback message.
            let reanchored = Self::ensure_last_message_is_user(&anchored);
            if !reanchored.is_empty() {
                anchored = reanchored;
            }
        }
        anchored
    }
}

fn last_message(messages: &[Message]) -> Vec<Message> {
    messages.last().cloned().into_iter().collect()
}

fn splice(text: &str, original_text: &str, rendered_text: &str) -> String {
    format!("{}{}", rendered_text, text.replacen(original_text, "", 1))
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    // ── Helpers ────────────────────────────────────────────────────────

    fn assembler() -> HistoryAssembler {
        // One token per whitespace-separated word.
        HistoryAssembler::new(TokenCounter::new(Arc::new(|text: &str| {
            text.split_whitespace().count()
        })))
    }

    fn roles(messages: &[Message]) -> Vec<Role> {
        messages.iter().map(|m| m.role).collect()
    }

    fn text_of(message: &Message) -> &str {
        message.content.as_text().unwrap()
    }

    // ── assemble ───────────────────────────────────────────────────────

    #[test]
    fn assemble_concatenates_in_order() {
        let db = vec![Message::user("q1"), Message::assistant("a1")];
        let lp = vec![Message::tool_result("c1", "web_search", "[]")];
        let out = HistoryAssembler::assemble("sys", &db, &lp);
        assert_eq!(
            roles(&out),
            vec![Role::System, Role::User, Role::Assistant, Role::Tool]
        );
        assert_eq!(text_of(&out[0]), "sys");
    }

    // ── placeholder ────────────────────────────────────────────────────

    #[test]
    fn placeholder_in_plain_text_keeps_appended_text() {
        let mut history = vec![Message::user("{{query}}\n[attached: report.pdf]")];
        HistoryAssembler::replace_placeholder_user_message(
            &mut history,
            "{{query}}",
            "Rendered prompt",
        );
        assert_eq!(text_of(&history[0]), "Rendered prompt\n[attached: report.pdf]");
    }

    #[test]
    fn placeholder_only_touches_last_user_message() {
        let mut history = vec![
            Message::user("{{query}}"),
            Message::assistant("ok"),
            Message::user("{{query}}"),
            Message::assistant("sure"),
        ];
        HistoryAssembler::replace_placeholder_user_message(&mut history, "{{query}}", "R");
        assert_eq!(text_of(&history[0]), "{{query}}");
        assert_eq!(text_of(&history[2]), "R");
    }

    #[test]
    fn placeholder_replaces_first_occurrence_only() {
        let mut history = vec![Message::user("X and X")];
        HistoryAssembler::replace_placeholder_user_message(&mut history, "X", "R:");
        assert_eq!(text_of(&history[0]), "R: and X");
    }

    #[test]
    fn placeholder_in_blocks_edits_last_text_block() {
        let mut history = vec![Message::user(vec![
            ContentBlock::text("first"),
            ContentBlock::text("{{q}} tail"),
            ContentBlock::Image {
                url: "u".into(),
                detail: None,
            },
        ])];
        HistoryAssembler::replace_placeholder_user_message(&mut history, "{{q}}", "Rendered");
        match &history[0].content {
            MessageContent::Blocks(blocks) => {
                assert_eq!(blocks[0], ContentBlock::text("first"));
                assert_eq!(blocks[1], ContentBlock::text("Rendered tail"));
            }
            other => panic!("expected blocks, got {other:?}"),
        }
    }

    #[test]
    fn placeholder_in_blocks_without_text_inserts_one() {
        let mut history = vec![Message::user(vec![ContentBlock::Image {
            url: "u".into(),
            detail: None,
        }])];
        HistoryAssembler::replace_placeholder_user_message(&mut history, "{{q}}", "Rendered");
        match &history[0].content {
            MessageContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 2);
                assert_eq!(blocks[0], ContentBlock::text("Rendered"));
            }
            other => panic!("expected blocks, got {other:?}"),
        }
    }

    #[test]
    fn placeholder_without_user_message_appends_one() {
        let mut history = vec![Message::assistant("hello")];
        HistoryAssembler::replace_placeholder_user_message(&mut history, "{{q}}", "Rendered");
        assert_eq!(history.len(), 2);
        assert!(history[1].is_user());
        assert_eq!(text_of(&history[1]), "Rendered");
    }

    // ── token window ───────────────────────────────────────────────────

    #[test]
    fn window_keeps_longest_fitting_suffix() {
        let asm = assembler();
        // each costs 1 (role) + 2 (words) = 3 tokens
        let msgs = vec![
            Message::user("one one"),
            Message::assistant("two two"),
            Message::user("three three"),
        ];
        let out = asm.limit_to_token_window(&msgs, 7);
        assert_eq!(out.len(), 2);
        assert_eq!(text_of(&out[0]), "two two");
        assert_eq!(text_of(&out[1]), "three three");
    }

    #[test]
    fn window_stops_at_first_overflow() {
        let asm = assembler();
        let msgs = vec![
            Message::user("a"),                           // 2
            Message::assistant("b c d e f g h i j k"),    // 11
            Message::user("z"),                           // 2
        ];
        // "a" would fit on its own, but the walk stops at the big message.
        let out = asm.limit_to_token_window(&msgs, 5);
        assert_eq!(out.len(), 1);
        assert_eq!(text_of(&out[0]), "z");
    }

    #[test]
    fn window_can_be_empty() {
        let asm = assembler();
        let msgs = vec![Message::user("far too many words here")];
        assert!(asm.limit_to_token_window(&msgs, 2).is_empty());
    }

    #[test]
    fn window_fits_everything() {
        let asm = assembler();
        let msgs = vec![Message::user("a"), Message::assistant("b")];
        assert_eq!(asm.limit_to_token_window(&msgs, 100).len(), 2);
    }

    // ── user anchor ────────────────────────────────────────────────────

    #[test]
    fn anchor_drops_leading_non_user() {
        let history = vec![
            Message::tool_result("c1", "web_search", "[]"),
            Message::tool_result("c2", "web_search", "[]"),
            Message::user("q"),
            Message::assistant("a"),
        ];
        let out = HistoryAssembler::ensure_last_message_is_user(&history);
        assert_eq!(roles(&out), vec![Role::User, Role::Assistant]);
    }

    #[test]
    fn anchor_without_user_is_empty() {
        let history = vec![Message::assistant("a")];
        assert!(HistoryAssembler::ensure_last_message_is_user(&history).is_empty());
    }

    // ── prepare_stored_history ─────────────────────────────────────────

    #[test]
    fn prepare_falls_back_to_latest_message_when_window_is_empty() {
        let asm = assembler();
        let db = vec![Message::user("q"), Message::user("very long latest question here")];
        let out = asm.prepare_stored_history(&db, 3, None);
        assert_eq!(out.len(), 1);
        assert_eq!(text_of(&out[0]), "very long latest question here");
    }

    #[test]
    fn prepare_falls_back_when_window_has_no_user() {
        let asm = assembler();
        let db = vec![
            Message::user("a very long opening question that will not fit"),
            Message::assistant("x"),
            Message::tool_result("c", "t", "y"),
        ];
        let out = asm.prepare_stored_history(&db, 8, None);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_tool());
    }

    #[test]
    fn prepare_applies_placeholder() {
        let asm = assembler();
        let db = vec![
            Message::assistant("orphan"),
            Message::user("{{q}}"),
        ];
        let placeholder = UserPlaceholder::new("{{q}}", "What is Rust?");
        let out = asm.prepare_stored_history(&db, 100, Some(&placeholder));
        assert_eq!(out.len(), 1);
        assert_eq!(text_of(&out[0]), "What is Rust?");
    }

    #[test]
    fn prepare_fallback_without_placeholder_may_open_on_assistant() {
        let asm = assembler();
        let db = vec![Message::assistant("only a reply")];
        let out = asm.prepare_stored_history(&db, 100, None);
        assert_eq!(roles(&out), vec![Role::Assistant]);
    }

    #[test]
    fn prepare_fallback_with_placeholder_opens_on_user() {
        let asm = assembler();
        let db = vec![
            Message::user("a very long opening question that will not fit"),
            Message::assistant("x"),
        ];
        let placeholder = UserPlaceholder::new("{{q}}", "Follow-up");
        let out = asm.prepare_stored_history(&db, 5, Some(&placeholder));
        assert_eq!(roles(&out), vec![Role::User]);
        assert_eq!(text_of(&out[0]), "Follow-up");
    }

    #[test]
    fn prepare_empty_history_with_placeholder_creates_user_turn() {
        let asm = assembler();
        let placeholder = UserPlaceholder::new("{{q}}", "Hello");
        let out = asm.prepare_stored_history(&[], 100, Some(&placeholder));
        assert_eq!(out.len(), 1);
        assert_eq!(text_of(&out[0]), "Hello");
    }
}
