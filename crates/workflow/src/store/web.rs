//! Web search context store (Tavily-compatible API).

use crate::state::{meta, Passage};
use crate::store::ContextStore;
use ragent_core::{AppError, AppResult};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: Option<String>,
    url: String,
    content: String,
    #[serde(default)]
    score: Option<f32>,
}

/// Broad search against a web search API.
pub struct WebSearchStore {
    base_url: String,
    api_key: String,
    max_results: usize,
    client: reqwest::Client,
}

impl WebSearchStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, max_results: usize) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            max_results,
            client: reqwest::Client::new(),
        }
    }

    fn search_url(&self) -> String {
        format!("{}/search", self.base_url)
    }
}

#[async_trait::async_trait]
impl ContextStore for WebSearchStore {
    fn name(&self) -> &str {
        "web"
    }

    async fn search(&self, query: &str) -> AppResult<Vec<Passage>> {
        tracing::debug!(max_results = self.max_results, "Sending web search request");

        let body = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": self.max_results,
            "search_depth": "basic",
        });

        let response = self
            .client
            .post(self.search_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Retrieval(format!("Failed to reach web search: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Retrieval(format!(
                "Web search error ({}): {}",
                status, error_text
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| AppError::Retrieval(format!("Failed to parse web search response: {}", e)))?;

        Ok(parsed
            .results
            .into_iter()
            .filter(|r| !r.content.trim().is_empty())
            .take(self.max_results)
            .map(|r| {
                let mut passage = Passage::new(r.content)
                    .with_meta(meta::SOURCE, r.url)
                    .with_meta(meta::ORIGIN, meta::ORIGIN_WEB);
                if let Some(title) = r.title {
                    passage = passage.with_meta(meta::TITLE, title);
                }
                if let Some(score) = r.score {
                    passage = passage.with_meta(meta::SCORE, format!("{:.3}", score));
                }
                passage
            })
            .collect())
    }
}
