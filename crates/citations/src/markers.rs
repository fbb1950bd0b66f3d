//! Extract, renumber, and remove `<sup>N</sup>` citation markers.

use crate::substitute::{batch_substitute, Matcher, Substitution};
use regex_lite::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// A citation marker, whitespace-tolerant inside the tags. Group 1 is the number.
pub(crate) static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<sup>\s*(\d+)\s*</sup>").expect("marker pattern is valid"));

static MARKER_GAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</sup>\s+<sup>").expect("gap pattern is valid"));

/// Canonical marker for source `number`.
pub fn ref_marker(number: usize) -> String {
    format!("<sup>{number}</sup>")
}

/// Every cited number, de-duplicated and ascending.
pub fn get_all_ref_numbers(text: &str) -> Vec<usize> {
    MARKER
        .captures_iter(text)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<usize>().ok())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Highest cited number, or `None` when the text cites nothing.
pub fn max_ref_number(text: &str) -> Option<usize> {
    MARKER
        .captures_iter(text)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<usize>().ok())
        .max()
}

/// Renumber every marker citing `from` to cite `to`. Other markers are untouched.
pub fn replace_ref_number(text: &str, from: usize, to: usize) -> String {
    replace_ref_number_with(text, from, &ref_marker(to))
}

/// Replace every marker citing `number` with a literal string.
pub fn replace_ref_number_with(text: &str, number: usize, replacement: &str) -> String {
    batch_substitute(
        text,
        &[Substitution::new(Matcher::RefNumber(number), replacement)],
    )
}

/// Apply many renumberings at once. `(1, 2), (2, 1)` swaps the two
/// citations instead of collapsing both onto 1.
pub fn remap_ref_numbers(text: &str, mapping: &[(usize, usize)]) -> String {
    let substitutions: Vec<Substitution> = mapping
        .iter()
        .map(|&(from, to)| Substitution::new(Matcher::RefNumber(from), ref_marker(to)))
        .collect();
    batch_substitute(text, &substitutions)
}

/// Remove every marker citing `number`.
///
/// Whitespace is dropped only where a removal left two markers adjacent, or
/// where it would double up with the prose that follows. Markers that were
/// already neighbours keep their spacing, and text without the number comes
/// back unchanged.
pub fn remove_ref_number(text: &str, number: usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    // Whitespace after the last kept marker, held while removed markers follow it.
    let mut held = String::new();
    let mut after_kept = false;
    let mut removed_since_kept = false;

    for caps in MARKER.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let between = &text[last..whole.start()];
        let gap = after_kept && between.trim().is_empty();
        let cited = caps.get(1).and_then(|m| m.as_str().parse::<usize>().ok());

        if cited == Some(number) {
            if gap {
                held.push_str(between);
                removed_since_kept = true;
            } else {
                flush_held(&mut out, &mut held, between);
                out.push_str(between);
                after_kept = false;
                removed_since_kept = false;
            }
        } else {
            if gap && removed_since_kept {
                held.clear();
            } else {
                flush_held(&mut out, &mut held, between);
                out.push_str(between);
            }
            out.push_str(whole.as_str());
            after_kept = true;
            removed_since_kept = false;
        }
        last = whole.end();
    }

    let rest = &text[last..];
    flush_held(&mut out, &mut held, rest);
    out.push_str(rest);
    out
}

fn flush_held(out: &mut String, held: &mut String, next: &str) {
    if !next.starts_with(char::is_whitespace) {
        out.push_str(held);
    }
    held.clear();
}

/// Remove every citation marker.
pub fn strip_ref_markers(text: &str) -> String {
    MARKER.replace_all(text, "").into_owned()
}

/// Drop whitespace sitting between two adjacent markers.
pub fn collapse_marker_whitespace(text: &str) -> String {
    MARKER_GAP.replace_all(text, "</sup><sup>").into_owned()
}
