//! # refwindow Core
//!
//! Domain types, traits, and error definitions for refwindow, the
//! token-bounded history compiler for LLM agent turns.
//! This crate has **no algorithmic logic**; it defines the domain model
//! that the citation and agent crates work against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`Encoder`] turns text into a token count (model-specific, injected)
//! - [`ReferenceRegistry`] holds the per-turn retrieved chunks
//! - [`HistoryStore`] yields the raw stored conversation
//!
//! In-memory implementations live next to the traits so tests and
//! ephemeral sessions need nothing else.

pub mod chunk;
pub mod encoder;
pub mod error;
pub mod history;
pub mod message;
pub mod payload;
pub mod reference;

// Re-export key types at crate root for ergonomics
pub use chunk::Chunk;
pub use encoder::{Encoder, HeuristicEncoder};
pub use error::{EncoderError, Error, HistoryError, ReductionError, Result};
pub use history::{HistoryStore, InMemoryHistoryStore};
pub use message::{ContentBlock, Message, MessageContent, MessageToolCall, Role};
pub use payload::{SourceEntry, ToolPayload};
pub use reference::{ReferenceRegistry, SourceRegistry};

#[cfg(feature = "hf-tokenizer")]
pub use encoder::HfTokenizerEncoder;
