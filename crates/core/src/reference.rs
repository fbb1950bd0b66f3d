//! Reference registry: the per-turn record of retrieved chunks.
//!
//! The registry keeps two views that must agree:
//! - per tool call: the ordered chunks that call produced
//! - global: every registered chunk in registration order, which defines
//!   the citation numbering (chunk at index `i` is source `i + 1`)
//!
//! Only two writers exist for a turn: the tool-execution layer (appends via
//! [`SourceRegistry::register`]) and the source reducer (full-list swaps).
//! Callers hold it by `&mut`, so no reader can observe a half-applied pass.

use crate::chunk::Chunk;
use std::collections::HashMap;

/// Narrow read/replace surface used by history compilation.
pub trait ReferenceRegistry: Send {
    /// Chunks produced by one tool call, in retrieval order.
    /// Unknown ids yield an empty list.
    fn chunks_of_tool(&self, tool_call_id: &str) -> Vec<Chunk>;

    /// All chunks, in registration order.
    fn chunks(&self) -> Vec<Chunk>;

    /// Per-tool-call chunk lists, in registration order of the tool calls.
    fn chunks_of_all_tools(&self) -> Vec<Vec<Chunk>>;

    /// Replace the global chunk list.
    fn replace(&mut self, chunks: Vec<Chunk>);

    /// Replace one tool call's chunk list.
    fn replace_chunks_of_tool(&mut self, tool_call_id: &str, chunks: Vec<Chunk>);
}

/// In-memory registry for one agent turn.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    /// Tool call ids in registration order.
    order: Vec<String>,
    by_tool: HashMap<String, Vec<Chunk>>,
    global: Vec<Chunk>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the chunks a tool call produced.
    ///
    /// Registering the same call again appends to its list.
    pub fn register(&mut self, tool_call_id: impl Into<String>, chunks: Vec<Chunk>) {
        let tool_call_id = tool_call_id.into();
        if !self.by_tool.contains_key(&tool_call_id) {
            self.order.push(tool_call_id.clone());
        }
        self.global.extend(chunks.iter().cloned());
        self.by_tool.entry(tool_call_id).or_default().extend(chunks);
    }

    /// Number of chunks in the global list.
    pub fn len(&self) -> usize {
        self.global.len()
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty()
    }

    /// Citation number of a chunk in the global list, if registered.
    pub fn source_number_of(&self, chunk_id: &str) -> Option<usize> {
        self.global
            .iter()
            .position(|c| c.id == chunk_id)
            .map(|i| i + 1)
    }
}

impl ReferenceRegistry for SourceRegistry {
    fn chunks_of_tool(&self, tool_call_id: &str) -> Vec<Chunk> {
        self.by_tool.get(tool_call_id).cloned().unwrap_or_default()
    }

    fn chunks(&self) -> Vec<Chunk> {
        self.global.clone()
    }

    fn chunks_of_all_tools(&self) -> Vec<Vec<Chunk>> {
        self.order
            .iter()
            .map(|id| self.by_tool.get(id).cloned().unwrap_or_default())
            .collect()
    }

    fn replace(&mut self, chunks: Vec<Chunk>) {
        self.global = chunks;
    }

    fn replace_chunks_of_tool(&mut self, tool_call_id: &str, chunks: Vec<Chunk>) {
        if !self.by_tool.contains_key(tool_call_id) {
            self.order.push(tool_call_id.to_string());
        }
        self.by_tool.insert(tool_call_id.to_string(), chunks);
    }
}
