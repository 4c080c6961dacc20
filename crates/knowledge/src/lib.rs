//! Knowledge base management.
//!
//! Local-first indexing: files are parsed, chunked, embedded and stored in a
//! per-base SQLite index that the workflow's context store searches.

pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod parser;
pub mod types;
pub mod vector_index;


// Re-export commonly used types
pub use embeddings::{create_provider, EmbeddingConfig, EmbeddingProvider};
pub use index::SqliteIndex;
pub use types::{
    BaseStats, KnowledgeBaseConfig, KnowledgeChunk, KnowledgeSource, LearnOptions, LearnStats,
};
pub use vector_index::VectorIndex;

use chrono::Utc;
use ragent_core::{AppError, AppResult};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

/// Outcome of processing one file during `learn`.
enum FileOutcome {
    Indexed { chunks: u32, bytes: u64 },
    Unchanged,
}

/// Learn from sources and populate the knowledge base.
///
/// Files whose SHA-256 matches the stored source are skipped; changed files
/// replace their previous chunks. A file that fails to parse or embed is
/// logged and skipped.
pub async fn learn(
    workspace: &Path,
    options: LearnOptions,
    embedder: &dyn EmbeddingProvider,
) -> AppResult<LearnStats> {
    let start = Instant::now();

    tracing::info!("Starting learn operation for base '{}'", options.base_name);

    let base_config = prepare_base_config(workspace, &options, embedder)?;

    let index_path = config::get_index_path(workspace, &options.base_name);
    let index = SqliteIndex::open(&index_path)?;

    if options.reset {
        tracing::info!("Resetting knowledge base '{}'", options.base_name);
        index.reset()?;
    }

    let mut stats = LearnStats::default();

    for file in collect_files(&options) {
        match process_file(&index, embedder, &base_config, &file).await {
            Ok(FileOutcome::Indexed { chunks, bytes }) => {
                stats.sources_count += 1;
                stats.chunks_count += chunks;
                stats.bytes_processed += bytes;
            }
            Ok(FileOutcome::Unchanged) => {
                tracing::debug!("Skipping unchanged file: {:?}", file);
                stats.skipped_count += 1;
            }
            Err(e) => tracing::warn!("Skipping {:?}: {}", file, e),
        }
    }

    config::save_config(workspace, &base_config)?;

    stats.duration_secs = start.elapsed().as_secs_f64();

    tracing::info!(
        "Learn operation completed: {} sources ({} unchanged), {} chunks, {} bytes in {:.2}s",
        stats.sources_count,
        stats.skipped_count,
        stats.chunks_count,
        stats.bytes_processed,
        stats.duration_secs
    );

    Ok(stats)
}

/// Resolve the base config, refusing to mix embedding models in one index.
fn prepare_base_config(
    workspace: &Path,
    options: &LearnOptions,
    embedder: &dyn EmbeddingProvider,
) -> AppResult<KnowledgeBaseConfig> {
    let wanted = EmbeddingConfig {
        provider: embedder.provider_name().to_string(),
        model: embedder.model_name().to_string(),
        dimensions: embedder.dimensions(),
        endpoint: None,
    };

    match config::load_config(workspace, &options.base_name)? {
        Some(existing) if !options.reset => {
            EmbeddingConfig::from_base(&existing)
                .validate_consistency(&wanted)
                .map_err(|e| {
                    AppError::Knowledge(format!(
                        "Knowledge base '{}' was built with a different embedding model ({}). Re-run with --reset.",
                        options.base_name, e
                    ))
                })?;
            Ok(existing)
        }
        existing => Ok(KnowledgeBaseConfig {
            name: options.base_name.clone(),
            provider: wanted.provider,
            model: wanted.model,
            embedding_dim: wanted.dimensions as u32,
            ..existing.unwrap_or_default()
        }),
    }
}

/// Expand the requested paths into the files to index.
fn collect_files(options: &LearnOptions) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in &options.paths {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            let entries = WalkDir::new(path)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
                .filter_map(|e| e.ok());

            for entry in entries {
                if entry.file_type().is_file() && should_include(entry.path(), options) {
                    files.push(entry.into_path());
                }
            }
        } else {
            tracing::warn!("Path does not exist: {:?}", path);
        }
    }

    files
}

/// Check if a file should be included based on patterns.
fn should_include(path: &Path, options: &LearnOptions) -> bool {
    let path_str = path.to_string_lossy();

    if options.exclude.iter().any(|p| path_str.contains(p.as_str())) {
        return false;
    }

    options.include.is_empty() || options.include.iter().any(|p| path_str.contains(p.as_str()))
}

async fn process_file(
    index: &SqliteIndex,
    embedder: &dyn EmbeddingProvider,
    base_config: &KnowledgeBaseConfig,
    path: &Path,
) -> AppResult<FileOutcome> {
    let raw = std::fs::read(path)?;
    let content_hash = format!("{:x}", Sha256::digest(&raw));
    let path_key = path.to_string_lossy().to_string();

    let previous = match index.find_source(&path_key)? {
        Some((_, stored_hash)) if stored_hash == content_hash => {
            return Ok(FileOutcome::Unchanged);
        }
        Some((source_id, _)) => Some(source_id),
        None => None,
    };

    let parsed = parser::parse_contents(path, &raw)?;

    let source_id = uuid::Uuid::new_v4().to_string();
    let candidates = chunker::chunk_text(
        &source_id,
        &path_key,
        &parsed.text,
        base_config.chunk_size as usize,
        base_config.chunk_overlap as usize,
    )?;

    let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
    let embeddings = embedder.embed_batch(&texts).await?;
    if embeddings.len() != candidates.len() {
        return Err(AppError::Knowledge(format!(
            "Embedding provider returned {} vectors for {} chunks",
            embeddings.len(),
            candidates.len()
        )));
    }

    let source = KnowledgeSource {
        id: source_id,
        path: path_key,
        content_type: parsed.content_type.as_str().to_string(),
        content_hash,
        learned_at: Utc::now(),
        size_bytes: raw.len() as u64,
    };

    let chunks: Vec<KnowledgeChunk> = candidates
        .into_iter()
        .zip(embeddings)
        .map(|(candidate, embedding)| KnowledgeChunk {
            id: uuid::Uuid::new_v4().to_string(),
            source_id: candidate.source_id,
            position: candidate.position,
            text: candidate.text,
            embedding: Some(embedding),
            metadata: candidate.metadata,
        })
        .collect();

    // The previous version stays searchable until the new one is committed.
    index.replace_source(previous.as_deref(), &source, &chunks)?;

    match previous {
        Some(old_id) => tracing::debug!(
            "Replaced source {} for {:?}: {} chunks",
            old_id,
            path,
            chunks.len()
        ),
        None => tracing::debug!("Indexed {:?}: {} chunks", path, chunks.len()),
    }

    Ok(FileOutcome::Indexed {
        chunks: chunks.len() as u32,
        bytes: raw.len() as u64,
    })
}

/// Open the index of an existing base for querying.
pub fn open_index(workspace: &Path, base_name: &str) -> AppResult<SqliteIndex> {
    let index_path = config::get_index_path(workspace, base_name);
    SqliteIndex::open_existing(&index_path).map_err(|_| {
        AppError::Knowledge(format!(
            "Knowledge base '{}' has no index. Run 'ragent knowledge learn {}' first.",
            base_name, base_name
        ))
    })
}

/// Clean (reset) a knowledge base.
pub fn clean(workspace: &Path, base_name: &str) -> AppResult<()> {
    tracing::info!("Cleaning knowledge base '{}'", base_name);

    let index = open_index(workspace, base_name)?;
    index.reset()?;

    tracing::info!("Knowledge base '{}' cleaned", base_name);
    Ok(())
}

/// Get statistics for a knowledge base.
pub fn stats(workspace: &Path, base_name: &str) -> AppResult<BaseStats> {
    let index = open_index(workspace, base_name)?;
    let (sources_count, chunks_count) = index.stats()?;

    let db_size_bytes = std::fs::metadata(index.path())
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(BaseStats {
        base_name: base_name.to_string(),
        sources_count,
        chunks_count,
        db_size_bytes,
        last_learn_at: index.last_learned_at()?,
    })
}
