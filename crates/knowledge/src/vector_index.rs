//! Vector index abstraction for knowledge chunks.

use crate::types::{KnowledgeChunk, KnowledgeSource};
use ragent_core::AppResult;

/// Trait for vector index backends.
///
/// Methods take `&self` so one index can be shared across concurrent
/// searches; implementations synchronize internally.
pub trait VectorIndex: Send + Sync {
    /// Insert or replace a source record.
    fn upsert_source(&self, source: &KnowledgeSource) -> AppResult<()>;

    /// Insert or update a chunk with its embedding.
    fn upsert_chunk(&self, chunk: &KnowledgeChunk) -> AppResult<()>;

    /// Search for the top-k most similar chunks to the query embedding.
    ///
    /// Returns chunks ordered by descending cosine similarity.
    fn search(&self, query_embedding: &[f32], top_k: usize)
        -> AppResult<Vec<(KnowledgeChunk, f32)>>;

    /// Returns (sources_count, chunks_count).
    fn stats(&self) -> AppResult<(u32, u32)>;

    /// Remove every chunk and source.
    fn reset(&self) -> AppResult<()>;
}
