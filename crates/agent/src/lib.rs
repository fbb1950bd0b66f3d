//! History compilation for refwindow agent turns.
//!
//! Every model call in an agent turn goes through the same steps:
//!
//! 1. **Fetch** stored history for the conversation
//! 2. **Window** it to a token budget and anchor it on a user turn
//! 3. **Assemble** `[system] + stored + in-turn messages`
//! 4. **Count** tokens with the model's encoder
//! 5. **Reduce** retrieved sources in tool results while over budget,
//!    rewriting citation numbers and the reference registry together
//!
//! The loop stops when the history fits or no further progress is possible.

pub mod context;
pub mod turn;

pub use context::{
    CompilationReport, CompileInput, CompiledHistory, HistoryAssembler, HistoryCompiler,
    PassStats, ReductionOutcome, ReductionPolicy, SourceReducer, TokenCounter, UserPlaceholder,
};
pub use turn::{TurnCompiler, TurnRequest};
