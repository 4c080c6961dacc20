//! Context store backed by a local knowledge base index.

use crate::state::{meta, Passage};
use crate::store::ContextStore;
use ragent_core::{AppError, AppResult};
use ragent_knowledge::{EmbeddingProvider, KnowledgeChunk, VectorIndex};
use std::sync::Arc;

pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_MIN_SCORE: f32 = 0.3;

/// Embeds the query and runs cosine top-k over a [`VectorIndex`].
pub struct IndexContextStore {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    top_k: usize,
    min_score: f32,
}

impl IndexContextStore {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            index,
            embedder,
            top_k: DEFAULT_TOP_K,
            min_score: DEFAULT_MIN_SCORE,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }
}

fn to_passage(chunk: KnowledgeChunk, score: f32) -> Passage {
    let source = chunk
        .source_path()
        .map(str::to_string)
        .unwrap_or_else(|| chunk.source_id.clone());

    Passage::new(chunk.text)
        .with_meta(meta::SOURCE, source)
        .with_meta(meta::POSITION, chunk.position.to_string())
        .with_meta(meta::SCORE, format!("{:.3}", score))
        .with_meta(meta::ORIGIN, meta::ORIGIN_INDEX)
}

#[async_trait::async_trait]
impl ContextStore for IndexContextStore {
    fn name(&self) -> &str {
        "index"
    }

    async fn search(&self, query: &str) -> AppResult<Vec<Passage>> {
        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| AppError::Retrieval(format!("Failed to embed query: {}", e)))?;

        let index = Arc::clone(&self.index);
        let top_k = self.top_k;
        let results = tokio::task::spawn_blocking(move || index.search(&embedding, top_k))
            .await
            .map_err(|e| AppError::Retrieval(format!("Index search task failed: {}", e)))?
            .map_err(|e| AppError::Retrieval(e.to_string()))?;

        let scores: Vec<f32> = results.iter().map(|(_, s)| *s).collect();
        tracing::debug!(?scores, min_score = self.min_score, "Index search scores");

        Ok(results
            .into_iter()
            .filter(|(_, score)| *score >= self.min_score)
            .map(|(chunk, score)| to_passage(chunk, score))
            .collect())
    }
}
