//! Chat command handler: a terminal REPL over the workflow.
//!
//! History lives in memory for the session. A failed turn is reported and
//! leaves the history as it was.

use super::{ask, output};
use clap::Args;
use ragent_core::{config::AppConfig, AppResult};
use ragent_workflow::{build_workflow, ChatHistory};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Interactive multi-turn session
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Knowledge base to search (default: retrieval.knowledgeBase)
    #[arg(short, long)]
    pub knowledge_base: Option<String>,

    /// Start from (and save the session to) this history file
    #[arg(long)]
    pub history: Option<PathBuf>,
}

enum Input {
    Question(String),
    Reset,
    Exit,
    Empty,
}

fn parse_input(line: &str) -> Input {
    match line.trim() {
        "" => Input::Empty,
        "/exit" | "/quit" => Input::Exit,
        "/reset" => Input::Reset,
        question => Input::Question(question.to_string()),
    }
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Starting chat session");

        let mut config = config.clone();
        if let Some(ref base) = self.knowledge_base {
            config.retrieval.knowledge_base = base.clone();
        }

        let workflow = build_workflow(&config)?;
        let mut history = match self.history {
            Some(ref path) => ask::load_history(path)?,
            None => ChatHistory::new(),
        };

        eprintln!(
            "Knowledge base '{}'. Type /reset to clear history, /exit to quit.",
            config.retrieval.knowledge_base
        );

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("> ");
            std::io::stdout().flush().ok();

            let Some(line) = lines.next_line().await? else {
                break;
            };

            match parse_input(&line) {
                Input::Empty => continue,
                Input::Exit => break,
                Input::Reset => {
                    history = ChatHistory::new();
                    eprintln!("History cleared.");
                }
                Input::Question(question) => match workflow.answer_turn(&question, &history).await {
                    Ok(turn) => {
                        output::log_run(&turn.path, &turn.degradations);
                        output::print_answer(&turn.answer, &turn.documents);
                        println!();
                        history = turn.history;
                    }
                    Err(e) => {
                        tracing::error!("Turn failed: {}", e);
                        eprintln!("Error: {}", e);
                    }
                },
            }
        }

        if let Some(ref path) = self.history {
            ask::save_history(path, &history)?;
        }

        tracing::info!("Chat session ended after {} turns", history.len() / 2);
        Ok(())
    }
}
