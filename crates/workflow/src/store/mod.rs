//! Context stores: where passages come from.

pub mod index;
pub mod web;

pub use index::IndexContextStore;
pub use web::WebSearchStore;

use crate::state::Passage;
use ragent_core::AppResult;

/// Similarity search over some corpus.
///
/// Implementations apply their own `top_k` and `min_score`; passages below
/// the threshold are never returned. An empty result is not an error.
/// Faults surface as `AppError::Retrieval` and are not retried here.
#[async_trait::async_trait]
pub trait ContextStore: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str) -> AppResult<Vec<Passage>>;
}
