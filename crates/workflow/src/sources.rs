//! Source references for displaying where an answer came from.

use crate::state::{meta, Passage};
use serde::Serialize;
use std::collections::HashSet;

const SNIPPET_LEN: usize = 150;

/// A deduplicated reference to one passage's origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRef {
    pub source: String,
    pub location: Option<String>,
    pub snippet: String,
}

/// Map passages to source references, dropping duplicate (source, location)
/// pairs and keeping first-seen order.
pub fn source_refs(passages: &[Passage]) -> Vec<SourceRef> {
    let mut seen = HashSet::new();
    let mut refs = Vec::new();

    for passage in passages {
        let source = passage.source().unwrap_or("unknown").to_string();
        let location = passage
            .metadata
            .get(meta::POSITION)
            .map(|p| format!("chunk {}", p))
            .or_else(|| passage.origin().map(str::to_string));

        if seen.insert((source.clone(), location.clone())) {
            refs.push(SourceRef {
                source,
                location,
                snippet: truncate_snippet(&passage.content, SNIPPET_LEN),
            });
        }
    }

    refs
}

/// Shorten text to at most `max_chars` characters, preferring a word
/// boundary, and mark the cut with "...".
pub fn truncate_snippet(text: &str, max_chars: usize) -> String {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.chars().count() <= max_chars {
        return text;
    }

    let cut = text
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let truncated = &text[..cut];

    match truncated.rfind(' ') {
        Some(space) if space > 0 => format!("{}...", &truncated[..space]),
        _ => format!("{}...", truncated),
    }
}
