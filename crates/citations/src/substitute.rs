//! Ordered batch substitution without cascading.
//!
//! Substitutions run in order, and text produced by an earlier
//! substitution is never matched by a later one. Phase one splits the
//! text into raw segments and placeholder tokens (one token per match,
//! tagged with the substitution that produced it). Later matchers only see
//! raw segments. Phase two swaps every token for its literal replacement.
//!
//! Because tokens are enum variants rather than sentinel strings, they
//! cannot collide with anything in the input. A later pattern also cannot
//! match across an earlier replacement.

use crate::markers::MARKER;
use crate::CitationError;
use regex_lite::Regex;
use std::ops::Range;

/// What a substitution matches.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// An arbitrary regular expression.
    Pattern(Regex),
    /// Every citation marker carrying this number, whitespace-tolerant.
    RefNumber(usize),
}

impl Matcher {
    /// Compile a regular expression matcher.
    pub fn pattern(pattern: &str) -> Result<Self, CitationError> {
        Regex::new(pattern)
            .map(Self::Pattern)
            .map_err(|e| CitationError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    fn spans(&self, text: &str) -> Vec<Range<usize>> {
        match self {
            Self::Pattern(re) => re.find_iter(text).map(|m| m.start()..m.end()).collect(),
            Self::RefNumber(number) => MARKER
                .captures_iter(text)
                .filter(|caps| {
                    caps.get(1)
                        .and_then(|m| m.as_str().parse::<usize>().ok())
                        == Some(*number)
                })
                .filter_map(|caps| caps.get(0))
                .map(|m| m.start()..m.end())
                .collect(),
        }
    }
}

/// One (matcher, literal replacement) pair.
#[derive(Debug, Clone)]
pub struct Substitution {
    pub matcher: Matcher,
    pub replacement: String,
}

impl Substitution {
    pub fn new(matcher: Matcher, replacement: impl Into<String>) -> Self {
        Self {
            matcher,
            replacement: replacement.into(),
        }
    }

    /// Substitution from a regular expression source.
    pub fn pattern(pattern: &str, replacement: impl Into<String>) -> Result<Self, CitationError> {
        Ok(Self::new(Matcher::pattern(pattern)?, replacement))
    }
}

enum Segment {
    Raw(String),
    Token(usize),
}

/// Apply `substitutions` in order. Replacements are literal (no `$1`
/// expansion) and are never re-matched by later substitutions.
pub fn batch_substitute(text: &str, substitutions: &[Substitution]) -> String {
    let mut segments = vec![Segment::Raw(text.to_string())];

    for (idx, substitution) in substitutions.iter().enumerate() {
        let mut next = Vec::with_capacity(segments.len());
        for segment in segments {
            let raw = match segment {
                Segment::Raw(raw) => raw,
                token => {
                    next.push(token);
                    continue;
                }
            };
            let mut last = 0;
            for span in substitution.matcher.spans(&raw) {
                if span.start > last {
                    next.push(Segment::Raw(raw[last..span.start].to_string()));
                }
                next.push(Segment::Token(idx));
                last = span.end;
            }
            if last < raw.len() {
                next.push(Segment::Raw(raw[last..].to_string()));
            }
        }
        segments = next;
    }

    segments
        .iter()
        .map(|segment| match segment {
            Segment::Raw(raw) => raw.as_str(),
            Segment::Token(idx) => substitutions[*idx].replacement.as_str(),
        })
        .collect()
}
