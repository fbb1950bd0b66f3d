//! Source reduction: shrinking retrieved chunks in tool results until the
//! turn fits its token budget.
//!
//! Each pass walks the loop history once, in order. For every tool call it
//! keeps the first `chunks_to_keep` chunks (retrieval order is relevance
//! order), rewrites the tool message with contiguous citation numbers, and
//! finally swaps the reference registry to exactly the retained chunks.
//!
//! Two offsets are threaded through the walk because the registry's
//! pre-reduction list and the new citation numbering live in different
//! index spaces:
//!
//! | Offset | Advances by | Indexes |
//! |--------|-------------|---------|
//! | `chunk_offset` | original chunk count | pre-reduction global chunk list |
//! | `source_offset` | retained chunk count | post-reduction numbering (source `n` = offset + 1) |
//!
//! Retained chunks always come from the call's own list, not from a slice
//! of the global list: tool calls run concurrently, so registration order
//! need not match message order. After a pass the global list follows
//! message order.

use refwindow_config::ContextConfig;
use refwindow_core::chunk::Chunk;
use refwindow_core::error::ReductionError;
use refwindow_core::message::{Message, MessageContent};
use refwindow_core::payload::ToolPayload;
use refwindow_core::reference::ReferenceRegistry;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Whether another reduction pass should run.
///
/// Requires both an over-budget count and at least one tool call that still
/// holds more than one chunk; otherwise a pass could not make progress.
pub fn should_reduce(token_count: usize, budget: usize, tool_source_counts: &[usize]) -> bool {
    let exceeds = token_count > budget;
    let eligible = tool_source_counts.iter().any(|&n| n > 1);
    exceeds && eligible
}

/// `token_count / budget`; above 1.0 means over budget.
pub fn overshoot(token_count: usize, budget: usize) -> f64 {
    if budget == 0 {
        return if token_count == 0 { 1.0 } else { f64::INFINITY };
    }
    token_count as f64 / budget as f64
}

/// Numeric retention policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReductionPolicy {
    /// Applied to the overshoot when the cut is already large.
    pub reduction_margin: f64,
    /// Margined divisor at or above which the margin is used.
    pub aggressive_threshold: f64,
}

impl Default for ReductionPolicy {
    fn default() -> Self {
        Self {
            reduction_margin: 0.9,
            aggressive_threshold: 1.2,
        }
    }
}

impl ReductionPolicy {
    pub fn from_config(config: &ContextConfig) -> Self {
        Self {
            reduction_margin: config.reduction_margin,
            aggressive_threshold: config.aggressive_threshold,
        }
    }

    /// The margin is skipped for marginal overshoot: below the threshold it
    /// could pull the divisor under the point where flooring removes
    /// anything.
    pub fn divisor(&self, overshoot: f64) -> f64 {
        let margined = overshoot * self.reduction_margin;
        if margined >= self.aggressive_threshold {
            margined
        } else {
            overshoot
        }
    }

    /// Chunks a tool call holding `num_sources` keeps at this overshoot.
    ///
    /// Never below 1 when any sources exist and never above `num_sources`.
    pub fn chunks_to_keep(&self, num_sources: usize, overshoot: f64) -> usize {
        if num_sources == 0 {
            return 0;
        }
        let divisor = self.divisor(overshoot);
        if divisor <= 1.0 {
            return num_sources;
        }
        let keep = (num_sources as f64 / divisor).floor() as usize;
        keep.clamp(1, num_sources)
    }
}

/// Counters threaded across tool messages during one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReductionPassState {
    /// Position in the pre-reduction global chunk list.
    pub chunk_offset: usize,
    /// Position in the post-reduction global chunk list.
    pub source_offset: usize,
}

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReductionOutcome {
    /// Chunks held by tool calls before the pass.
    pub chunks_before: usize,
    /// Chunks retained after the pass.
    pub chunks_after: usize,
    /// Tool calls whose chunk list shrank.
    pub calls_reduced: usize,
    /// Tool messages whose text changed (shrunk or renumbered).
    pub messages_rewritten: usize,
}

/// Rewrites tool messages and resynchronizes the registry.
#[derive(Debug, Clone)]
pub struct SourceReducer {
    policy: ReductionPolicy,
    no_sources_text: String,
    structured_tools: Vec<String>,
}

impl SourceReducer {
    pub fn new(config: &ContextConfig) -> Self {
        Self {
            policy: ReductionPolicy::from_config(config),
            no_sources_text: config.no_sources_text.clone(),
            structured_tools: config.structured_tools.clone(),
        }
    }

    pub fn policy(&self) -> &ReductionPolicy {
        &self.policy
    }

    fn is_structured(&self, message: &Message) -> bool {
        message
            .name
            .as_deref()
            .is_some_and(|name| self.structured_tools.iter().any(|t| t == name))
    }

    /// Per-tool-message chunk counts that can still be reduced.
    ///
    /// Structured tools hold a single payload and report zero.
    pub fn source_counts(
        &self,
        loop_history: &[Message],
        registry: &dyn ReferenceRegistry,
    ) -> Vec<usize> {
        loop_history
            .iter()
            .filter(|m| m.is_tool() && !self.is_structured(m))
            .map(|m| {
                m.tool_call_id
                    .as_deref()
                    .map(|id| registry.chunks_of_tool(id).len())
                    .unwrap_or(0)
            })
            .collect()
    }

    /// Run one reduction pass at the given overshoot.
    ///
    /// Either every tool message and the registry are updated, or (on
    /// error) nothing is.
    pub fn reduce(
        &self,
        loop_history: &mut [Message],
        registry: &mut dyn ReferenceRegistry,
        overshoot: f64,
    ) -> Result<ReductionOutcome, ReductionError> {
        let original = registry.chunks();
        let mut state = ReductionPassState::default();
        let mut outcome = ReductionOutcome::default();

        let mut rewrites: Vec<(usize, String)> = Vec::new();
        let mut shrunk_calls: Vec<(String, Vec<Chunk>)> = Vec::new();
        let mut retained: Vec<Chunk> = Vec::with_capacity(original.len());
        // Chunk id → occurrences owned by visited tool calls.
        let mut claimed: HashMap<String, usize> = HashMap::new();

        for (index, message) in loop_history.iter().enumerate() {
            if !message.is_tool() {
                continue;
            }
            let tool_call_id = message
                .tool_call_id
                .as_deref()
                .ok_or(ReductionError::MissingToolCallId { index })?;

            let call_chunks = registry.chunks_of_tool(tool_call_id);
            let num_sources = call_chunks.len();
            let end = state.chunk_offset + num_sources;
            if end > original.len() {
                return Err(ReductionError::RegistryOutOfSync {
                    tool_call_id: tool_call_id.to_string(),
                    expected: end,
                    available: original.len(),
                });
            }

            let payload = self.decode(message, tool_call_id)?;
            let first_number = state.source_offset + 1;

            let (keep, rewritten) = match payload {
                ToolPayload::Structured { .. } if num_sources == 0 => {
                    return Err(ReductionError::RegistryOutOfSync {
                        tool_call_id: tool_call_id.to_string(),
                        expected: 1,
                        available: 0,
                    });
                }
                ToolPayload::Sources(entries) if num_sources == 0 && !entries.is_empty() => {
                    return Err(ReductionError::RegistryOutOfSync {
                        tool_call_id: tool_call_id.to_string(),
                        expected: entries.len(),
                        available: 0,
                    });
                }
                ToolPayload::Structured {
                    source_number,
                    result,
                } => {
                    let rewritten = (source_number != first_number).then(|| {
                        ToolPayload::Structured {
                            source_number: first_number,
                            result,
                        }
                    });
                    (num_sources, rewritten)
                }
                ToolPayload::NoSources | ToolPayload::Sources(_) if num_sources == 0 => (0, None),
                ToolPayload::NoSources => {
                    // Registered chunks but a sentinel body: rebuild from the registry.
                    let keep = self.policy.chunks_to_keep(num_sources, overshoot);
                    (keep, Some(numbered(first_number, &call_chunks[..keep])))
                }
                ToolPayload::Sources(entries) => {
                    let keep = self.policy.chunks_to_keep(num_sources, overshoot);
                    let renumbered = entries.first().map(|e| e.source_number) != Some(first_number);
                    let rewritten = (keep < num_sources || renumbered || entries.len() != keep)
                        .then(|| numbered(first_number, &call_chunks[..keep]));
                    (keep, rewritten)
                }
            };

            if let Some(payload) = rewritten {
                let text = payload.encode(&self.no_sources_text).map_err(|e| {
                    ReductionError::MalformedToolMessage {
                        tool_call_id: tool_call_id.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                rewrites.push((index, text));
            }
            if keep < num_sources {
                debug!(
                    tool_call_id,
                    from = num_sources,
                    to = keep,
                    first_source = first_number,
                    "Reduced tool sources"
                );
                shrunk_calls.push((tool_call_id.to_string(), call_chunks[..keep].to_vec()));
                outcome.calls_reduced += 1;
            }

            for chunk in &call_chunks {
                *claimed.entry(chunk.id.clone()).or_default() += 1;
            }
            retained.extend_from_slice(&call_chunks[..keep]);
            outcome.chunks_before += num_sources;
            outcome.chunks_after += keep;
            state.chunk_offset = end;
            state.source_offset += keep;
        }

        let unclaimed: Vec<Chunk> = original
            .iter()
            .filter(|chunk| match claimed.get_mut(&chunk.id) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    false
                }
                _ => true,
            })
            .cloned()
            .collect();
        if !unclaimed.is_empty() {
            warn!(
                unvisited = unclaimed.len(),
                "Registry holds chunks for tool calls outside the loop history, keeping them last"
            );
            retained.extend(unclaimed);
        }

        // Commit: messages, per-call lists, then one global swap.
        outcome.messages_rewritten = rewrites.len();
        for (index, text) in rewrites {
            loop_history[index].content = MessageContent::Text(text);
        }
        for (tool_call_id, chunks) in shrunk_calls {
            registry.replace_chunks_of_tool(&tool_call_id, chunks);
        }
        registry.replace(retained);

        Ok(outcome)
    }

    fn decode(&self, message: &Message, tool_call_id: &str) -> Result<ToolPayload, ReductionError> {
        let malformed = |reason: String| ReductionError::MalformedToolMessage {
            tool_call_id: tool_call_id.to_string(),
            reason,
        };
        let text = match &message.content {
            MessageContent::Text(text) => text,
            MessageContent::Blocks(_) => {
                return Err(malformed("tool result must be text, found content blocks".into()));
            }
        };
        ToolPayload::decode(text, self.is_structured(message), &self.no_sources_text)
            .map_err(malformed)
    }
}

fn numbered(first_number: usize, chunks: &[Chunk]) -> ToolPayload {
    if chunks.is_empty() {
        return ToolPayload::NoSources;
    }
    ToolPayload::numbered(first_number, chunks.iter().map(|c| c.content.as_str()))
}
