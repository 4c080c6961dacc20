//! Ask command handler.
//!
//! Runs the workflow once. With `--history` the conversation is read from
//! and written back to a JSON file, so successive invocations share it.

use super::output;
use clap::Args;
use ragent_core::{config::AppConfig, AppError, AppResult};
use ragent_workflow::{build_workflow, ChatHistory};
use std::path::{Path, PathBuf};

/// Answer one question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Conversation history file (JSON); created if missing, updated after answering
    #[arg(long)]
    pub history: Option<PathBuf>,

    /// Knowledge base to search (default: retrieval.knowledgeBase)
    #[arg(short, long)]
    pub knowledge_base: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");

        let question = self.read_question()?;

        let mut config = config.clone();
        if let Some(ref base) = self.knowledge_base {
            config.retrieval.knowledge_base = base.clone();
        }

        let workflow = build_workflow(&config)?;

        let history = match self.history {
            Some(ref path) => load_history(path)?,
            None => ChatHistory::new(),
        };

        let turn = workflow.answer_turn(&question, &history).await?;
        output::log_run(&turn.path, &turn.degradations);

        if let Some(ref path) = self.history {
            save_history(path, &turn.history)?;
        }

        if self.json {
            output::print_json(
                &question,
                &turn.answer,
                &turn.documents,
                &turn.path,
                &turn.degradations,
            )
        } else {
            output::print_answer(&turn.answer, &turn.documents);
            Ok(())
        }
    }

    fn read_question(&self) -> AppResult<String> {
        let question = match (&self.question, &self.file) {
            (Some(question), _) => question.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)?,
            (None, None) => {
                return Err(AppError::Config("No question provided".to_string()));
            }
        };

        let question = question.trim().to_string();
        if question.is_empty() {
            return Err(AppError::Config("Question is empty".to_string()));
        }
        Ok(question)
    }
}

/// Read a history file; a missing file is an empty conversation.
pub fn load_history(path: &Path) -> AppResult<ChatHistory> {
    if !path.exists() {
        return Ok(ChatHistory::new());
    }

    let contents = std::fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(ChatHistory::new());
    }

    let history: ChatHistory = serde_json::from_str(&contents)?;
    tracing::debug!("Loaded {} turns from {:?}", history.len(), path);
    Ok(history)
}

pub fn save_history(path: &Path, history: &ChatHistory) -> AppResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(history)?;
    std::fs::write(path, json)?;
    Ok(())
}
