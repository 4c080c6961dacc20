//! Character-based text chunking with overlap.

use crate::types::ChunkCandidate;
use ragent_core::{AppError, AppResult};
use text_splitter::{ChunkConfig, TextSplitter};

/// Chunk text into overlapping segments of at most `chunk_size` characters.
///
/// Splits prefer semantic boundaries (paragraphs, sentences, words) and fall
/// back to characters. Every candidate records its byte offsets and `source`.
pub fn chunk_text(
    source_id: &str,
    source_path: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> AppResult<Vec<ChunkCandidate>> {
    if text.trim().is_empty() {
        return Ok(vec![]);
    }

    let config = ChunkConfig::new(chunk_size)
        .with_overlap(overlap)
        .map_err(|e| AppError::Knowledge(format!("Invalid chunk configuration: {}", e)))?;
    let splitter = TextSplitter::new(config);

    let chunks: Vec<ChunkCandidate> = splitter
        .chunk_indices(text)
        .filter(|(_, chunk)| !chunk.trim().is_empty())
        .enumerate()
        .map(|(position, (offset, chunk))| ChunkCandidate {
            source_id: source_id.to_string(),
            position: position as u32,
            text: chunk.to_string(),
            metadata: serde_json::json!({
                "source": source_path,
                "start": offset,
                "end": offset + chunk.len(),
            }),
        })
        .collect();

    tracing::debug!(
        "Chunked text into {} chunks (size: {}, overlap: {})",
        chunks.len(),
        chunk_size,
        overlap
    );

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_text_basic() {
        let text = "Rust is fast. ".repeat(100);
        let chunks = chunk_text("test-source", "a.md", &text, 200, 50).unwrap();

        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].position, 0);
        assert_eq!(chunks[1].position, 1);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 200));
        assert_eq!(chunks[0].metadata["source"], "a.md");
    }

    #[test]
    fn test_chunk_text_short_input_single_chunk() {
        let chunks = chunk_text("s", "a.txt", "Paris is the capital of France.", 1000, 200).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Paris is the capital of France.");
        assert_eq!(chunks[0].metadata["start"], 0);
    }

    #[test]
    fn test_chunk_text_empty() {
        let chunks = chunk_text("test-source", "a.txt", "  \n ", 100, 10).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_chunk_text_rejects_overlap_not_smaller_than_size() {
        let result = chunk_text("s", "a.txt", "some text", 100, 100);
        assert!(matches!(result, Err(AppError::Knowledge(_))));
    }

    #[test]
    fn test_chunk_text_utf8() {
        let text = "Gamedex é um aplicativo 🎮 com acentuação: ã, õ, ç. ".repeat(50);
        let chunks = chunk_text("s", "pt.txt", &text, 120, 20).unwrap();
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            let start = chunk.metadata["start"].as_u64().unwrap() as usize;
            let end = chunk.metadata["end"].as_u64().unwrap() as usize;
            assert_eq!(&text[start..end], chunk.text);
        }
    }
}
