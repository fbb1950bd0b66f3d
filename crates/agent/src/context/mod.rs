//! Token-bounded history compilation.
//!
//! Builds the message sequence for each model call of an agent turn and
//! keeps it under the model's input budget by shrinking retrieved sources
//! in tool results, while citation numbers stay consistent with the
//! reference registry.
//!
//! # Components (leaves first)
//!
//! | Module | Role |
//! |--------|------|
//! | [`token`] | Token counts over messages via an injected encoder |
//! | [`assembler`] | Ordering, token windowing, user anchoring, placeholder splice |
//! | [`reducer`] | Per-tool-call retention policy and message/registry rewrite |
//! | [`compiler`] | The assemble → count → reduce convergence loop |

pub mod assembler;
pub mod compiler;
pub mod reducer;
pub mod token;

pub use assembler::{HistoryAssembler, UserPlaceholder};
pub use compiler::{CompilationReport, CompileInput, CompiledHistory, HistoryCompiler, PassStats};
pub use reducer::{
    overshoot, should_reduce, ReductionOutcome, ReductionPassState, ReductionPolicy, SourceReducer,
};
pub use token::{effective_budget, TokenCounter, DEFAULT_SAFETY_MARGIN};
