//! Configuration management for ragent.
//!
//! Configuration is merged from several sources, later ones winning:
//! - Built-in defaults
//! - Config file (`.ragent/config.yaml` or `RAGENT_CONFIG`)
//! - Environment variables
//! - Command-line flags
//!
//! The result is validated once at startup and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Providers that can serve completions.
pub const KNOWN_PROVIDERS: [&str; 2] = ["ollama", "openai"];

/// Providers that can serve embeddings.
pub const KNOWN_EMBEDDING_PROVIDERS: [&str; 3] = ["trigram", "ollama", "openai"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .ragent/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Completion provider ("ollama", "openai")
    pub provider: String,

    /// Completion model identifier
    pub model: String,

    /// Explicit API key (overrides provider-specific env vars)
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Emit JSON log lines
    pub log_json: bool,

    /// LLM provider configurations
    pub llm: Option<LlmConfig>,

    /// Embedding backend used for indexing and query embedding
    pub embedding: EmbeddingSettings,

    /// Retrieval knobs for the context store
    pub retrieval: RetrievalSettings,

    /// Workflow controller knobs
    pub workflow: WorkflowSettings,
}

/// LLM configuration from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    OpenAI {
        #[serde(rename = "apiKeyEnv")]
        api_key_env: String,
        model: String,
        endpoint: Option<String>,
        #[serde(rename = "organizationEnv")]
        organization_env: Option<String>,
    },
    Ollama {
        endpoint: String,
        model: String,
        timeout: Option<u64>,
    },
}

impl ProviderConfig {
    /// Model configured for this provider.
    pub fn model(&self) -> &str {
        match self {
            ProviderConfig::OpenAI { model, .. } | ProviderConfig::Ollama { model, .. } => model,
        }
    }

    /// Endpoint override, if any.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            ProviderConfig::OpenAI { endpoint, .. } => endpoint.as_deref(),
            ProviderConfig::Ollama { endpoint, .. } => Some(endpoint.as_str()),
        }
    }
}

/// Embedding backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    /// "trigram" (offline), "ollama" or "openai"
    pub provider: String,

    /// Embedding model identifier
    pub model: String,

    /// Vector dimensions produced by the model
    pub dimensions: usize,

    /// Endpoint override for HTTP providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            endpoint: None,
        }
    }
}

/// Context store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalSettings {
    /// Knowledge base queried by the primary store
    #[serde(rename = "knowledgeBase")]
    pub knowledge_base: String,

    /// Maximum passages returned per search
    #[serde(rename = "topK")]
    pub top_k: usize,

    /// Passages scoring below this are never returned
    #[serde(rename = "minScore")]
    pub min_score: f32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            knowledge_base: "default".to_string(),
            top_k: 3,
            min_score: 0.3,
        }
    }
}

/// Where the broadening step searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadSearch {
    /// Re-query the primary index with the rewritten question
    Index,
    /// Query a web search API with the rewritten question
    Web,
}

pub const DEFAULT_WEB_SEARCH_ENDPOINT: &str = "https://api.tavily.com";

/// Web search API settings for the broadening step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchSettings {
    pub endpoint: String,

    #[serde(rename = "apiKeyEnv")]
    pub api_key_env: String,

    #[serde(rename = "maxResults")]
    pub max_results: usize,
}

impl Default for WebSearchSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_WEB_SEARCH_ENDPOINT.to_string(),
            api_key_env: "TAVILY_API_KEY".to_string(),
            max_results: 3,
        }
    }
}

/// Workflow controller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSettings {
    /// Upper bound on passages graded at the same time
    #[serde(rename = "gradingConcurrency")]
    pub grading_concurrency: usize,

    /// Per-request budget; on expiry the workflow jumps to generation
    #[serde(rename = "deadlineSecs", default, skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,

    #[serde(rename = "broadSearch")]
    pub broad_search: BroadSearch,

    #[serde(rename = "webSearch", default)]
    pub web_search: WebSearchSettings,

    /// Rewrite follow-up questions into standalone ones before retrieval
    #[serde(rename = "condenseQuestion", default)]
    pub condense_question: bool,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            grading_concurrency: 4,
            deadline_secs: None,
            broad_search: BroadSearch::Index,
            web_search: WebSearchSettings::default(),
            condense_question: false,
        }
    }
}

/// Full configuration file structure. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    llm: Option<LlmConfig>,
    embedding: Option<EmbeddingSettings>,
    retrieval: Option<PartialRetrieval>,
    workflow: Option<PartialWorkflow>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PartialRetrieval {
    #[serde(rename = "knowledgeBase")]
    knowledge_base: Option<String>,
    #[serde(rename = "topK")]
    top_k: Option<usize>,
    #[serde(rename = "minScore")]
    min_score: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PartialWorkflow {
    #[serde(rename = "gradingConcurrency")]
    grading_concurrency: Option<usize>,
    #[serde(rename = "deadlineSecs")]
    deadline_secs: Option<u64>,
    #[serde(rename = "broadSearch")]
    broad_search: Option<BroadSearch>,
    #[serde(rename = "webSearch")]
    web_search: Option<WebSearchSettings>,
    #[serde(rename = "condenseQuestion")]
    condense_question: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            api_key: None,
            log_level: None,
            verbose: false,
            no_color: false,
            log_json: false,
            llm: None,
            embedding: EmbeddingSettings::default(),
            retrieval: RetrievalSettings::default(),
            workflow: WorkflowSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the YAML file and environment variables.
    ///
    /// Environment variables:
    /// - `RAGENT_WORKSPACE`: Override workspace path
    /// - `RAGENT_CONFIG`: Path to config file
    /// - `RAGENT_PROVIDER`, `RAGENT_MODEL`: Completion backend
    /// - `RAGENT_EMBED_PROVIDER`, `RAGENT_EMBED_MODEL`: Embedding backend
    /// - `RAGENT_API_KEY`: API key
    /// - `RAGENT_KNOWLEDGE_BASE`, `RAGENT_TOP_K`, `RAGENT_MIN_SCORE`: Retrieval
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use ragent_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_from(None, None)
    }

    /// Like [`AppConfig::load`], with an explicit workspace and config file
    /// (typically from CLI flags) taking precedence over the environment.
    pub fn load_from(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        let workspace =
            workspace.or_else(|| std::env::var("RAGENT_WORKSPACE").ok().map(PathBuf::from));
        if let Some(workspace) = workspace {
            config.workspace = workspace;
        }

        config.config_file =
            config_file.or_else(|| std::env::var("RAGENT_CONFIG").ok().map(PathBuf::from));

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.workspace.join(".ragent/config.yaml"));

        if config_path.exists() {
            tracing::debug!(path = ?config_path, "Loading config file");
            config = config.merge_yaml(&config_path)?;
        }

        config.apply_env()?;

        Ok(config)
    }

    /// Environment variables override YAML config.
    fn apply_env(&mut self) -> AppResult<()> {
        if let Ok(provider) = std::env::var("RAGENT_PROVIDER") {
            self.provider = provider;
        }

        if let Ok(model) = std::env::var("RAGENT_MODEL") {
            self.model = model;
        }

        if let Ok(provider) = std::env::var("RAGENT_EMBED_PROVIDER") {
            self.embedding.provider = provider;
        }

        if let Ok(model) = std::env::var("RAGENT_EMBED_MODEL") {
            self.embedding.model = model;
        }

        if let Ok(base) = std::env::var("RAGENT_KNOWLEDGE_BASE") {
            self.retrieval.knowledge_base = base;
        }

        if let Ok(top_k) = std::env::var("RAGENT_TOP_K") {
            self.retrieval.top_k = top_k.parse().map_err(|_| {
                AppError::Config(format!("RAGENT_TOP_K must be a positive integer, got '{}'", top_k))
            })?;
        }

        if let Ok(min_score) = std::env::var("RAGENT_MIN_SCORE") {
            self.retrieval.min_score = min_score.parse().map_err(|_| {
                AppError::Config(format!("RAGENT_MIN_SCORE must be a number, got '{}'", min_score))
            })?;
        }

        if let Ok(key) = std::env::var("RAGENT_API_KEY") {
            self.api_key = Some(key);
        }

        if self.log_level.is_none() {
            self.log_level = std::env::var("RUST_LOG").ok();
        }

        if std::env::var("NO_COLOR").is_ok() {
            self.no_color = true;
        }

        Ok(())
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        Ok(self.clone().merge_file(config_file))
    }

    fn merge_file(mut self, file: ConfigFile) -> Self {
        if let Some(path) = file.workspace.and_then(|ws| ws.path) {
            self.workspace = PathBuf::from(path);
        }

        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                self.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                self.no_color = !color;
            }
            if let Some(json) = logging.json {
                self.log_json = json;
            }
        }

        if let Some(llm) = file.llm {
            self.provider = llm.active_provider.clone();
            if let Some(provider_config) = llm.providers.get(&llm.active_provider) {
                self.model = provider_config.model().to_string();
            }
            self.llm = Some(llm);
        }

        if let Some(embedding) = file.embedding {
            self.embedding = embedding;
        }

        if let Some(retrieval) = file.retrieval {
            if let Some(base) = retrieval.knowledge_base {
                self.retrieval.knowledge_base = base;
            }
            if let Some(top_k) = retrieval.top_k {
                self.retrieval.top_k = top_k;
            }
            if let Some(min_score) = retrieval.min_score {
                self.retrieval.min_score = min_score;
            }
        }

        if let Some(workflow) = file.workflow {
            if let Some(concurrency) = workflow.grading_concurrency {
                self.workflow.grading_concurrency = concurrency;
            }
            if workflow.deadline_secs.is_some() {
                self.workflow.deadline_secs = workflow.deadline_secs;
            }
            if let Some(broad) = workflow.broad_search {
                self.workflow.broad_search = broad;
            }
            if let Some(web) = workflow.web_search {
                self.workflow.web_search = web;
            }
            if let Some(condense) = workflow.condense_question {
                self.workflow.condense_question = condense;
            }
        }

        self
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
        log_json: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        if log_json {
            self.log_json = true;
        }

        self
    }

    /// Get the path to the .ragent directory.
    pub fn ragent_dir(&self) -> PathBuf {
        self.workspace.join(".ragent")
    }

    /// Ensure the .ragent directory exists.
    pub fn ensure_ragent_dir(&self) -> AppResult<()> {
        let dir = self.ragent_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create .ragent directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Get a provider's configuration block, if the file defined one.
    pub fn get_provider_config(&self, provider: &str) -> Option<&ProviderConfig> {
        self.llm.as_ref().and_then(|llm| llm.providers.get(provider))
    }

    /// Endpoint override for the active completion provider.
    pub fn provider_endpoint(&self) -> Option<&str> {
        self.get_provider_config(&self.provider)
            .and_then(ProviderConfig::endpoint)
    }

    /// Resolve the API key for a provider.
    ///
    /// `RAGENT_API_KEY` wins, then the provider's `apiKeyEnv`, then
    /// `OPENAI_API_KEY` for the openai provider.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        if let Some(ProviderConfig::OpenAI { api_key_env, .. }) = self.get_provider_config(provider)
        {
            if let Ok(key) = std::env::var(api_key_env) {
                return Some(key);
            }
        }

        if provider == "openai" {
            return std::env::var("OPENAI_API_KEY").ok();
        }

        None
    }

    /// Resolve the web search API key from its configured env var.
    pub fn resolve_web_search_key(&self) -> Option<String> {
        std::env::var(&self.workflow.web_search.api_key_env).ok()
    }

    /// Validate the configuration. Any error here is fatal before serving.
    pub fn validate(&self) -> AppResult<()> {
        if !KNOWN_PROVIDERS.contains(&self.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if self.model.trim().is_empty() {
            return Err(AppError::Config("Model identifier is missing".to_string()));
        }

        if !KNOWN_EMBEDDING_PROVIDERS.contains(&self.embedding.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embedding.provider,
                KNOWN_EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        if self.embedding.model.trim().is_empty() {
            return Err(AppError::Config(
                "Embedding model identifier is missing".to_string(),
            ));
        }

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "Embedding dimensions must be greater than zero".to_string(),
            ));
        }

        if self.retrieval.knowledge_base.trim().is_empty() {
            return Err(AppError::Config("Knowledge base name is missing".to_string()));
        }

        if self.retrieval.top_k == 0 {
            return Err(AppError::Config("topK must be at least 1".to_string()));
        }

        if !(0.0..=1.0).contains(&self.retrieval.min_score) {
            return Err(AppError::Config(format!(
                "minScore must be within [0, 1], got {}",
                self.retrieval.min_score
            )));
        }

        if self.workflow.grading_concurrency == 0 {
            return Err(AppError::Config(
                "gradingConcurrency must be at least 1".to_string(),
            ));
        }

        if self.workflow.deadline_secs == Some(0) {
            return Err(AppError::Config(
                "deadlineSecs must be greater than zero when set".to_string(),
            ));
        }

        let needs_openai_key = self.provider == "openai" || self.embedding.provider == "openai";
        if needs_openai_key && self.resolve_api_key("openai").is_none() {
            return Err(AppError::Config(
                "The openai provider requires an API key (RAGENT_API_KEY, apiKeyEnv or OPENAI_API_KEY)"
                    .to_string(),
            ));
        }

        if self.workflow.broad_search == BroadSearch::Web && self.resolve_web_search_key().is_none()
        {
            return Err(AppError::Config(format!(
                "Web broadening requires an API key in environment variable: {}",
                self.workflow.web_search.api_key_env
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.retrieval.top_k, 3);
        assert!((config.retrieval.min_score - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.workflow.broad_search, BroadSearch::Index);
        assert!(!config.workflow.condense_question);
        assert_eq!(
            config.workflow.web_search.endpoint,
            DEFAULT_WEB_SEARCH_ENDPOINT
        );
        assert!(!config.verbose);
    }

    #[test]
    fn test_ragent_dir() {
        let config = AppConfig::default();
        assert!(config.ragent_dir().ends_with(".ragent"));
    }

    #[test]
    fn test_with_overrides() {
        let overridden = AppConfig::default().with_overrides(
            None,
            None,
            Some("openai".to_string()),
            Some("gpt-4o-mini".to_string()),
            None,
            true,
            false,
            true,
        );

        assert_eq!(overridden.provider, "openai");
        assert_eq!(overridden.model, "gpt-4o-mini");
        assert!(overridden.verbose);
        assert!(overridden.log_json);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_merge_yaml_sections() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
llm:
  activeProvider: ollama
  providers:
    ollama:
      endpoint: http://localhost:9999
      model: mistral
embedding:
  provider: ollama
  model: nomic-embed-text
  dimensions: 768
retrieval:
  knowledgeBase: handbook
  topK: 5
workflow:
  deadlineSecs: 20
  broadSearch: web
logging:
  color: false
  json: true
"#,
        )
        .unwrap();

        let config = AppConfig::default().merge_yaml(&path).unwrap();
        assert_eq!(config.model, "mistral");
        assert_eq!(config.provider_endpoint(), Some("http://localhost:9999"));
        assert_eq!(config.embedding.dimensions, 768);
        assert_eq!(config.retrieval.knowledge_base, "handbook");
        assert_eq!(config.retrieval.top_k, 5);
        // Unset keys keep their defaults
        assert!((config.retrieval.min_score - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.workflow.deadline_secs, Some(20));
        assert_eq!(config.workflow.broad_search, BroadSearch::Web);
        assert_eq!(config.workflow.grading_concurrency, 4);
        assert!(config.no_color);
        assert!(config.log_json);
    }

    #[test]
    fn test_merge_yaml_invalid() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(&path, "retrieval:\n  topK: lots").unwrap();

        let result = AppConfig::default().merge_yaml(&path);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = AppConfig::default();
        config.provider = "unknown".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_defaults_ok() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_missing_model() {
        let mut config = AppConfig::default();
        config.model = " ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Model identifier"));
    }

    #[test]
    fn test_validate_retrieval_bounds() {
        let mut config = AppConfig::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.retrieval.min_score = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_openai_with_explicit_key() {
        let mut config = AppConfig::default();
        config.provider = "openai".to_string();
        config.model = "gpt-4o-mini".to_string();
        config.api_key = Some("sk-test".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_explicit_workspace() {
        let temp = TempDir::new().unwrap();
        let ragent = temp.path().join(".ragent");
        std::fs::create_dir_all(&ragent).unwrap();
        std::fs::write(
            ragent.join("config.yaml"),
            "workflow:\n  gradingConcurrency: 7\n  condenseQuestion: true\n",
        )
        .unwrap();

        let config = AppConfig::load_from(Some(temp.path().to_path_buf()), None).unwrap();
        assert_eq!(config.workspace, temp.path());
        assert_eq!(config.workflow.grading_concurrency, 7);
        assert!(config.workflow.condense_question);
    }

    #[test]
    fn test_load_from_missing_workspace() {
        let result = AppConfig::load_from(Some(PathBuf::from("/nonexistent/ragent/ws")), None);
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
