//! Knowledge command handler.
//!
//! Builds and inspects the local knowledge bases the workflow searches.

use clap::{Args, Subcommand};
use ragent_core::{config::AppConfig, AppError, AppResult};
use ragent_knowledge::{create_provider, EmbeddingConfig, LearnOptions};
use std::path::PathBuf;

/// Knowledge base management
#[derive(Args, Debug)]
pub struct KnowledgeCommand {
    #[command(subcommand)]
    pub action: KnowledgeAction,
}

#[derive(Subcommand, Debug)]
pub enum KnowledgeAction {
    /// Index files into a knowledge base
    Learn(KnowledgeLearnCommand),
    /// Remove everything from a knowledge base
    Clean(KnowledgeCleanCommand),
    /// Show knowledge base statistics
    Stats(KnowledgeStatsCommand),
}

fn base_or_default(base: &Option<String>, config: &AppConfig) -> String {
    base.clone()
        .unwrap_or_else(|| config.retrieval.knowledge_base.clone())
}

fn to_pretty_json(value: &serde_json::Value) -> AppResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| AppError::Serialization(e.to_string()))
}

/// Index files into a knowledge base
#[derive(Args, Debug)]
pub struct KnowledgeLearnCommand {
    /// Knowledge base name (default: retrieval.knowledgeBase)
    pub base: Option<String>,

    /// Files or directories to learn from
    #[arg(long, required = true)]
    pub path: Vec<PathBuf>,

    /// Only index paths containing one of these substrings
    #[arg(long)]
    pub include: Vec<String>,

    /// Skip paths containing one of these substrings
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Reset the base before learning (required to switch embedding model)
    #[arg(long)]
    pub reset: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl KnowledgeLearnCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let base = base_or_default(&self.base, config);
        tracing::info!("Executing knowledge learn command for base '{}'", base);

        let embedding_config = EmbeddingConfig::from(&config.embedding);
        let api_key = config.resolve_api_key(&embedding_config.provider);
        let embedder = create_provider(&embedding_config, api_key.as_deref())?;

        let options = LearnOptions {
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            reset: self.reset,
            ..LearnOptions::new(base.clone(), self.path.clone())
        };

        let stats = ragent_knowledge::learn(&config.workspace, options, embedder.as_ref()).await?;

        if self.json {
            let output = serde_json::json!({
                "base": base,
                "sourcesCount": stats.sources_count,
                "skippedCount": stats.skipped_count,
                "chunksCount": stats.chunks_count,
                "bytesProcessed": stats.bytes_processed,
                "durationSecs": stats.duration_secs,
            });
            println!("{}", to_pretty_json(&output)?);
        } else {
            println!(
                "Learned {} sources ({} unchanged, {} chunks, {} bytes) in {:.2}s",
                stats.sources_count,
                stats.skipped_count,
                stats.chunks_count,
                stats.bytes_processed,
                stats.duration_secs
            );
        }

        Ok(())
    }
}

/// Remove everything from a knowledge base
#[derive(Args, Debug)]
pub struct KnowledgeCleanCommand {
    /// Knowledge base name (default: retrieval.knowledgeBase)
    pub base: Option<String>,
}

impl KnowledgeCleanCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let base = base_or_default(&self.base, config);
        tracing::info!("Executing knowledge clean command for base '{}'", base);

        ragent_knowledge::clean(&config.workspace, &base)?;

        println!("Knowledge base '{}' cleaned", base);

        Ok(())
    }
}

/// Show knowledge base stats
#[derive(Args, Debug)]
pub struct KnowledgeStatsCommand {
    /// Knowledge base name (default: retrieval.knowledgeBase)
    pub base: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl KnowledgeStatsCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let base = base_or_default(&self.base, config);
        tracing::info!("Executing knowledge stats command for base '{}'", base);

        let stats = ragent_knowledge::stats(&config.workspace, &base)?;

        if self.json {
            let output = serde_json::json!({
                "base": stats.base_name,
                "sourcesCount": stats.sources_count,
                "chunksCount": stats.chunks_count,
                "dbSizeBytes": stats.db_size_bytes,
                "lastLearnAt": stats.last_learn_at,
            });
            println!("{}", to_pretty_json(&output)?);
        } else {
            println!("Knowledge base: {}", stats.base_name);
            println!("  Sources: {}", stats.sources_count);
            println!("  Chunks: {}", stats.chunks_count);
            println!("  DB size: {} bytes", stats.db_size_bytes);
            if let Some(last_learn) = stats.last_learn_at {
                println!("  Last learn: {}", last_learn);
            }
        }

        Ok(())
    }
}

impl KnowledgeCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        match &self.action {
            KnowledgeAction::Learn(cmd) => cmd.execute(config).await,
            KnowledgeAction::Clean(cmd) => cmd.execute(config),
            KnowledgeAction::Stats(cmd) => cmd.execute(config),
        }
    }
}
