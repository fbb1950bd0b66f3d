//! Citation marker utilities.
//!
//! Pure text functions over rendered prose that cites sources with inline
//! markers such as `<sup>3</sup>`. Markers tolerate interior whitespace
//! (`<sup> 3 </sup>` is the same citation).
//!
//! # Example
//!
//! ```
//! use refwindow_citations::{get_all_ref_numbers, replace_ref_number};
//!
//! let text = "Rust has no GC<sup>2</sup> and is fast<sup> 1 </sup>.";
//! assert_eq!(get_all_ref_numbers(text), vec![1, 2]);
//! assert_eq!(
//!     replace_ref_number(text, 2, 9),
//!     "Rust has no GC<sup>9</sup> and is fast<sup> 1 </sup>."
//! );
//! ```

pub mod markers;
pub mod substitute;

pub use markers::{
    collapse_marker_whitespace, get_all_ref_numbers, max_ref_number, ref_marker,
    remap_ref_numbers, remove_ref_number, replace_ref_number, replace_ref_number_with,
    strip_ref_markers,
};
pub use substitute::{batch_substitute, Matcher, Substitution};

/// Errors from citation text processing.
#[derive(Debug, thiserror::Error)]
pub enum CitationError {
    #[error("Invalid substitution pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}
