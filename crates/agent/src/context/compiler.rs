//! History compilation: assemble, count, reduce, repeat.
//!
//! # Algorithm
//!
//! 1. Window the stored history, anchor it on a user turn, splice the
//!    rendered user message over its placeholder
//! 2. Assemble `[system] + stored + loop` and count tokens
//! 3. While over budget and some tool call still holds more than one
//!    chunk: reduce sources at the current overshoot, reassemble, recount
//! 4. Stop early when a pass makes no progress
//!
//! The result is best-effort. When every tool call is down to one chunk
//! and the framing text alone overflows, the oversized history is
//! returned with `within_budget == false`.

use crate::context::assembler::{HistoryAssembler, UserPlaceholder};
use crate::context::reducer::{overshoot, should_reduce, SourceReducer};
use crate::context::token::TokenCounter;
use refwindow_config::ContextConfig;
use refwindow_core::error::ReductionError;
use refwindow_core::message::Message;
use refwindow_core::reference::ReferenceRegistry;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Inputs for compiling one model call.
pub struct CompileInput<'a> {
    /// System prompt text.
    pub system_text: &'a str,
    /// Raw stored history, oldest first.
    pub db_history: &'a [Message],
    /// Placeholder to swap inside the last stored user message.
    pub placeholder: Option<&'a UserPlaceholder>,
}

/// The compiled message sequence plus how it was reached.
#[derive(Debug, Clone)]
pub struct CompiledHistory {
    /// Messages to send to the model.
    pub messages: Vec<Message>,
    /// Compilation metadata.
    pub report: CompilationReport,
}

/// Detailed metadata about one compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilationReport {
    /// Effective token budget.
    pub budget: usize,
    /// Tokens before any reduction.
    pub initial_tokens: usize,
    /// Tokens in the returned messages.
    pub final_tokens: usize,
    /// One entry per reduction pass that ran.
    pub passes: Vec<PassStats>,
    /// Whether the returned messages fit the budget.
    pub within_budget: bool,
    /// Budget utilization percentage.
    pub utilization_pct: f32,
}

/// Statistics for a single reduction pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassStats {
    pub overshoot: f64,
    pub tokens_before: usize,
    pub tokens_after: usize,
    pub chunks_before: usize,
    pub chunks_after: usize,
}

/// Drives the assemble → count → reduce loop for one model call.
#[derive(Debug, Clone)]
pub struct HistoryCompiler {
    config: ContextConfig,
    assembler: HistoryAssembler,
    reducer: SourceReducer,
}

impl HistoryCompiler {
    pub fn new(config: ContextConfig, counter: TokenCounter) -> Self {
        let reducer = SourceReducer::new(&config);
        Self {
            config,
            assembler: HistoryAssembler::new(counter),
            reducer,
        }
    }

    /// Compiler with the ~4 chars/token heuristic encoder.
    pub fn with_heuristic(config: ContextConfig) -> Self {
        Self::new(config, TokenCounter::heuristic())
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Compile the message sequence for one model call.
    ///
    /// Tool messages in `loop_history` and the registry are rewritten in
    /// place so later calls in the same turn start from the reduced state.
    pub fn compile(
        &self,
        input: &CompileInput<'_>,
        loop_history: &mut [Message],
        registry: &mut dyn ReferenceRegistry,
    ) -> Result<CompiledHistory, ReductionError> {
        let counter = self.assembler.counter();
        let budget = self.config.effective_budget();

        let stored = self.assembler.prepare_stored_history(
            input.db_history,
            self.config.history_window(),
            input.placeholder,
        );

        let mut messages = HistoryAssembler::assemble(input.system_text, &stored, loop_history);
        let mut count = counter.count(&messages);
        let initial_tokens = count;
        let mut passes = Vec::new();

        while should_reduce(count, budget, &self.reducer.source_counts(loop_history, registry)) {
            if passes.len() >= self.config.max_reduction_passes {
                warn!(
                    passes = passes.len(),
                    "Reduction pass limit reached, stopping"
                );
                break;
            }

            let prev = count;
            let ratio = overshoot(count, budget);
            let outcome = self.reducer.reduce(loop_history, registry, ratio)?;

            messages = HistoryAssembler::assemble(input.system_text, &stored, loop_history);
            count = counter.count(&messages);

            debug!(
                pass = passes.len() + 1,
                overshoot = ratio,
                divisor = self.reducer.policy().divisor(ratio),
                tokens_before = prev,
                tokens_after = count,
                chunks_before = outcome.chunks_before,
                chunks_after = outcome.chunks_after,
                "Reduction pass"
            );
            passes.push(PassStats {
                overshoot: ratio,
                tokens_before: prev,
                tokens_after: count,
                chunks_before: outcome.chunks_before,
                chunks_after: outcome.chunks_after,
            });

            if count >= prev {
                debug!(tokens = count, "Reduction made no progress, stopping");
                break;
            }
        }

        let within_budget = count <= budget;
        if !within_budget {
            warn!(
                tokens = count,
                budget,
                passes = passes.len(),
                "History still exceeds budget after reduction"
            );
        }
        info!(
            tokens = count,
            budget,
            passes = passes.len(),
            messages = messages.len(),
            "Compiled history"
        );

        let utilization_pct = if budget == 0 {
            100.0
        } else {
            (count as f32 / budget as f32) * 100.0
        };

        Ok(CompiledHistory {
            messages,
            report: CompilationReport {
                budget,
                initial_tokens,
                final_tokens: count,
                passes,
                within_budget,
                utilization_pct,
            },
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use refwindow_core::chunk::Chunk;
    use refwindow_core::message::Role;
    use refwindow_core::payload::ToolPayload;
    use refwindow_core::reference::SourceRegistry;
    use std::sync::Arc;

    const NONE: &str = "No relevant sources found.";

    // ── Helpers ────────────────────────────────────────────────────────

    /// One token per whitespace-separated word.
    fn compiler(input_token_limit: usize) -> HistoryCompiler {
        let config = ContextConfig {
            input_token_limit,
            safety_margin: 0.0,
            ..ContextConfig::default()
        };
        HistoryCompiler::new(
            config,
            TokenCounter::new(Arc::new(|text: &str| text.split_whitespace().count())),
        )
    }

    /// Each chunk is ten words long.
    fn turn(sizes: &[usize]) -> (Vec<Message>, SourceRegistry) {
        let mut registry = SourceRegistry::new();
        let mut messages = Vec::new();
        let mut next = 1;
        for (i, &n) in sizes.iter().enumerate() {
            let id = format!("call_{i}");
            let list: Vec<Chunk> = (0..n)
                .map(|j| Chunk::new(format!("{id}#{j}"), vec!["word"; 10].join(" ")))
                .collect();
            let text = ToolPayload::numbered(next, list.iter().map(|c| c.content.as_str()))
                .encode(NONE)
                .unwrap();
            next += n;
            messages.push(Message::tool_result(&id, "web_search", text));
            registry.register(id, list);
        }
        (messages, registry)
    }

    fn db() -> Vec<Message> {
        vec![Message::user("what is rust"), Message::assistant("a language")]
    }

    fn input<'a>(db: &'a [Message]) -> CompileInput<'a> {
        CompileInput {
            system_text: "you are helpful",
            db_history: db,
            placeholder: None,
        }
    }

    // ── Tests ──────────────────────────────────────────────────────────

    #[test]
    fn under_budget_is_left_alone() {
        let db = db();
        let (mut loop_history, mut registry) = turn(&[3, 2]);
        let before = loop_history.clone();

        let out = compiler(10_000)
            .compile(&input(&db), &mut loop_history, &mut registry)
            .unwrap();

        assert!(out.report.passes.is_empty());
        assert!(out.report.within_budget);
        assert_eq!(out.report.initial_tokens, out.report.final_tokens);
        assert_eq!(out.messages.len(), 1 + 2 + 2);
        for (a, b) in before.iter().zip(&loop_history) {
            assert_eq!(a.content, b.content);
        }
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn first_message_is_system_then_user() {
        let db = vec![
            Message::tool_result("old", "web_search", "[]"),
            Message::user("q"),
        ];
        let (mut loop_history, mut registry) = turn(&[]);
        let out = compiler(10_000)
            .compile(&input(&db), &mut loop_history, &mut registry)
            .unwrap();
        assert_eq!(out.messages[0].role, Role::System);
        assert_eq!(out.messages[1].role, Role::User);
        assert_eq!(out.messages.len(), 2);
    }

    #[test]
    fn over_budget_reduces_until_it_fits() {
        let db = db();
        let (mut loop_history, mut registry) = turn(&[10, 10, 10]);

        let c = compiler(200);
        let out = c
            .compile(&input(&db), &mut loop_history, &mut registry)
            .unwrap();

        assert!(out.report.initial_tokens > 200);
        assert!(!out.report.passes.is_empty());
        assert!(out.report.within_budget, "report: {:?}", out.report);
        assert!(out.report.final_tokens <= 200);

        // Registry and rewritten tool messages agree.
        let cited: usize = loop_history
            .iter()
            .map(|m| match ToolPayload::decode(m.content.as_text().unwrap(), false, NONE).unwrap() {
                ToolPayload::Sources(e) => e.len(),
                _ => 0,
            })
            .sum();
        assert_eq!(cited, registry.len());
    }

    #[test]
    fn passes_strictly_shrink() {
        let db = db();
        let (mut loop_history, mut registry) = turn(&[10; 10]);
        let out = compiler(300)
            .compile(&input(&db), &mut loop_history, &mut registry)
            .unwrap();

        assert!(out.report.passes.len() <= 10);
        for pass in &out.report.passes {
            assert!(pass.chunks_after < pass.chunks_before);
            assert!(pass.tokens_after < pass.tokens_before);
        }
    }

    #[test]
    fn floor_of_one_leaves_best_effort_result() {
        let db = db();
        let (mut loop_history, mut registry) = turn(&[4, 4]);
        let out = compiler(20)
            .compile(&input(&db), &mut loop_history, &mut registry)
            .unwrap();

        assert!(!out.report.within_budget);
        assert_eq!(registry.chunks_of_tool("call_0").len(), 1);
        assert_eq!(registry.chunks_of_tool("call_1").len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn single_chunk_calls_never_trigger_reduction() {
        let db = db();
        let (mut loop_history, mut registry) = turn(&[1, 1, 1]);
        let out = compiler(10)
            .compile(&input(&db), &mut loop_history, &mut registry)
            .unwrap();
        assert!(out.report.passes.is_empty());
        assert!(!out.report.within_budget);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn placeholder_is_rendered_into_output() {
        let db = vec![Message::user("{{q}}")];
        let placeholder = UserPlaceholder::new("{{q}}", "Explain ownership");
        let (mut loop_history, mut registry) = turn(&[]);
        let out = compiler(10_000)
            .compile(
                &CompileInput {
                    system_text: "sys",
                    db_history: &db,
                    placeholder: Some(&placeholder),
                },
                &mut loop_history,
                &mut registry,
            )
            .unwrap();
        assert_eq!(out.messages[1].content.as_text(), Some("Explain ownership"));
    }

    #[test]
    fn malformed_tool_message_aborts_compilation() {
        let db = db();
        let (mut loop_history, mut registry) = turn(&[10, 10]);
        loop_history[1].content = "not json".into();
        let err = compiler(50)
            .compile(&input(&db), &mut loop_history, &mut registry)
            .unwrap_err();
        assert!(matches!(err, ReductionError::MalformedToolMessage { .. }));
    }

    #[test]
    fn pass_limit_is_respected() {
        let db = db();
        let (mut loop_history, mut registry) = turn(&[40]);
        let config = ContextConfig {
            input_token_limit: 20,
            safety_margin: 0.0,
            max_reduction_passes: 1,
            ..ContextConfig::default()
        };
        let c = HistoryCompiler::new(
            config,
            TokenCounter::new(Arc::new(|text: &str| text.split_whitespace().count())),
        );
        let out = c
            .compile(&input(&db), &mut loop_history, &mut registry)
            .unwrap();
        assert_eq!(out.report.passes.len(), 1);
    }
}
