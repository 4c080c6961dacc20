//! Assemble a [`Workflow`] from application configuration.

use crate::condenser::LlmQuestionCondenser;
use crate::controller::{Workflow, WorkflowOptions};
use crate::generator::LlmAnswerGenerator;
use crate::grader::LlmRelevanceGrader;
use crate::prompted::PromptedLlm;
use crate::rewriter::LlmQueryRewriter;
use crate::store::{ContextStore, IndexContextStore, WebSearchStore};
use ragent_core::config::{BroadSearch, ProviderConfig};
use ragent_core::{AppConfig, AppError, AppResult};
use ragent_knowledge::{EmbeddingConfig, SqliteIndex};
use ragent_llm::{create_client, LlmClient, OllamaClient};
use ragent_prompt::load_prompt;
use std::sync::Arc;
use std::time::Duration;

pub const GRADE_PROMPT: &str = "grade.document";
pub const REWRITE_PROMPT: &str = "rewrite.query";
pub const ANSWER_PROMPT: &str = "answer.context";
pub const CONDENSE_PROMPT: &str = "condense.question";

/// Build the LLM client for the configured provider.
pub fn build_llm_client(config: &AppConfig) -> AppResult<Arc<dyn LlmClient>> {
    if let Some(ProviderConfig::Ollama {
        endpoint,
        timeout: Some(secs),
        ..
    }) = config.get_provider_config(&config.provider)
    {
        if config.provider == "ollama" {
            let client = OllamaClient::with_base_url(endpoint.as_str())
                .with_timeout(Duration::from_secs(*secs));
            return Ok(Arc::new(client));
        }
    }

    let api_key = config.resolve_api_key(&config.provider);
    create_client(&config.provider, config.provider_endpoint(), api_key.as_deref())
        .map_err(AppError::Config)
}

/// Open the configured knowledge base and check it was built with the
/// configured embedding backend.
fn build_index_store(config: &AppConfig) -> AppResult<IndexContextStore> {
    let base = &config.retrieval.knowledge_base;
    let embedding_config = EmbeddingConfig::from(&config.embedding);

    if let Some(base_config) = ragent_knowledge::config::load_config(&config.workspace, base)? {
        EmbeddingConfig::from_base(&base_config)
            .validate_consistency(&embedding_config)
            .map_err(|e| {
                AppError::Config(format!(
                    "Knowledge base '{}' does not match the configured embeddings: {}",
                    base, e
                ))
            })?;
    }

    let index: SqliteIndex = ragent_knowledge::open_index(&config.workspace, base)
        .map_err(|e| AppError::Config(e.to_string()))?;

    let api_key = config.resolve_api_key(&embedding_config.provider);
    let embedder = ragent_knowledge::create_provider(&embedding_config, api_key.as_deref())?;

    Ok(IndexContextStore::new(Arc::new(index), embedder)
        .with_top_k(config.retrieval.top_k)
        .with_min_score(config.retrieval.min_score))
}

fn build_broad_store(
    config: &AppConfig,
    primary: &Arc<dyn ContextStore>,
) -> AppResult<Arc<dyn ContextStore>> {
    match config.workflow.broad_search {
        BroadSearch::Index => Ok(Arc::clone(primary)),
        BroadSearch::Web => {
            let settings = &config.workflow.web_search;
            let api_key = config.resolve_web_search_key().ok_or_else(|| {
                AppError::Config(format!(
                    "Web search requires an API key in ${}",
                    settings.api_key_env
                ))
            })?;
            Ok(Arc::new(WebSearchStore::new(
                settings.endpoint.as_str(),
                api_key,
                settings.max_results,
            )))
        }
    }
}

/// Build a ready-to-run workflow. Every failure here is a configuration
/// error and should stop the process before any request is served.
pub fn build_workflow(config: &AppConfig) -> AppResult<Workflow> {
    let client = build_llm_client(config)?;
    let prompted = |id: &str| -> AppResult<PromptedLlm> {
        let prompt = load_prompt(&config.workspace, id)?;
        Ok(PromptedLlm::new(Arc::clone(&client), config.model.clone(), prompt))
    };

    let primary: Arc<dyn ContextStore> = Arc::new(build_index_store(config)?);
    let broad = build_broad_store(config, &primary)?;

    let mut workflow = Workflow::new(
        primary,
        Arc::new(LlmRelevanceGrader::new(prompted(GRADE_PROMPT)?)),
        Arc::new(LlmQueryRewriter::new(prompted(REWRITE_PROMPT)?)),
        Arc::new(LlmAnswerGenerator::new(prompted(ANSWER_PROMPT)?)),
    )
    .with_broad_store(broad)
    .with_options(WorkflowOptions {
        grading_concurrency: config.workflow.grading_concurrency,
        deadline: config.workflow.deadline_secs.map(Duration::from_secs),
    });

    if config.workflow.condense_question {
        workflow = workflow.with_condenser(Arc::new(LlmQuestionCondenser::new(prompted(
            CONDENSE_PROMPT,
        )?)));
    }

    tracing::debug!(
        provider = %config.provider,
        model = %config.model,
        base = %config.retrieval.knowledge_base,
        broad_search = ?config.workflow.broad_search,
        "Workflow assembled"
    );

    Ok(workflow)
}
