//! Retrieved source chunks.

use serde::{Deserialize, Serialize};

/// An atomic retrieved unit of source text, used for grounding and citation.
///
/// A chunk must be registered in the reference registry before any
/// rendered text may cite it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable chunk identifier (document id + chunk index, URL hash, ...).
    pub id: String,

    /// The text content of this chunk.
    pub content: String,

    /// Human-readable source label (filename, URL, etc.).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Rank within the retrieval that produced it (0 = most relevant).
    #[serde(default)]
    pub position: usize,
}

impl Chunk {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            source: None,
            position: 0,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_position(mut self, position: usize) -> Self {
        self.position = position;
        self
    }
}
