//! Tool-result wire format.
//!
//! A retrieval tool's message text is one of:
//!
//! | Form | Text |
//! |------|------|
//! | No sources | the configured sentinel, verbatim |
//! | Source list | `[{"source_number": 1, "content": "..."}, ...]` |
//! | Structured result | `{"source_number": 1, "result": <any JSON>}` (structured tools only) |
//!
//! Source numbers are the citation numbers the model sees. They are
//! 1-based and contiguous across all tool calls of a turn.

use serde::{Deserialize, Serialize};

/// One numbered source inside a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub source_number: usize,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StructuredEnvelope {
    source_number: usize,
    result: serde_json::Value,
}

/// The decoded content of a tool message.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolPayload {
    /// The tool found nothing (sentinel text).
    NoSources,
    /// An ordered list of numbered sources.
    Sources(Vec<SourceEntry>),
    /// A single structured payload with one leading source number.
    Structured {
        source_number: usize,
        result: serde_json::Value,
    },
}

impl ToolPayload {
    /// Decode a tool message body.
    ///
    /// `structured` says whether the producing tool returns a single
    /// structured payload rather than a chunk list. Returns a reason string
    /// when the text fits none of the forms.
    pub fn decode(text: &str, structured: bool, no_sources_text: &str) -> Result<Self, String> {
        if text.trim() == no_sources_text.trim() {
            return Ok(Self::NoSources);
        }
        if structured {
            let envelope: StructuredEnvelope = serde_json::from_str(text)
                .map_err(|e| format!("expected a structured result object: {e}"))?;
            return Ok(Self::Structured {
                source_number: envelope.source_number,
                result: envelope.result,
            });
        }
        serde_json::from_str::<Vec<SourceEntry>>(text)
            .map(Self::Sources)
            .map_err(|e| format!("expected a JSON array of sources: {e}"))
    }

    /// Render a list of source texts numbered from `first_number`.
    pub fn numbered<'a>(first_number: usize, contents: impl IntoIterator<Item = &'a str>) -> Self {
        Self::Sources(
            contents
                .into_iter()
                .enumerate()
                .map(|(i, content)| SourceEntry {
                    source_number: first_number + i,
                    content: content.to_string(),
                })
                .collect(),
        )
    }

    /// Encode back into message text.
    pub fn encode(&self, no_sources_text: &str) -> Result<String, serde_json::Error> {
        match self {
            Self::NoSources => Ok(no_sources_text.to_string()),
            Self::Sources(entries) => serde_json::to_string(entries),
            Self::Structured {
                source_number,
                result,
            } => serde_json::to_string(&StructuredEnvelope {
                source_number: *source_number,
                result: result.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: &str = "No relevant sources found.";

    #[test]
    fn decodes_sentinel() {
        assert_eq!(
            ToolPayload::decode(NONE, false, NONE).unwrap(),
            ToolPayload::NoSources
        );
    }

    #[test]
    fn decodes_source_list() {
        let text = r#"[{"source_number":3,"content":"a"},{"source_number":4,"content":"b"}]"#;
        match ToolPayload::decode(text, false, NONE).unwrap() {
            ToolPayload::Sources(entries) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].source_number, 3);
                assert_eq!(entries[1].content, "b");
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn decodes_structured_result() {
        let text = r#"{"source_number":2,"result":{"rows":[[1,2]]}}"#;
        let payload = ToolPayload::decode(text, true, NONE).unwrap();
        assert_eq!(
            payload,
            ToolPayload::Structured {
                source_number: 2,
                result: serde_json::json!({"rows": [[1, 2]]}),
            }
        );
    }

    #[test]
    fn structured_text_is_malformed_for_chunk_tools() {
        let text = r#"{"source_number":2,"result":[]}"#;
        let err = ToolPayload::decode(text, false, NONE).unwrap_err();
        assert!(err.contains("JSON array"));
    }

    #[test]
    fn free_text_is_malformed() {
        assert!(ToolPayload::decode("oops, the tool crashed", false, NONE).is_err());
        assert!(ToolPayload::decode("oops", true, NONE).is_err());
    }

    #[test]
    fn numbered_starts_at_first_number() {
        let payload = ToolPayload::numbered(5, ["x", "y"]);
        let text = payload.encode(NONE).unwrap();
        assert_eq!(
            text,
            r#"[{"source_number":5,"content":"x"},{"source_number":6,"content":"y"}]"#
        );
    }

    #[test]
    fn no_sources_encodes_to_sentinel() {
        assert_eq!(ToolPayload::NoSources.encode(NONE).unwrap(), NONE);
    }
}
