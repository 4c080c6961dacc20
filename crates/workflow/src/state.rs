//! Workflow state and the values threaded through it.
//!
//! A [`WorkflowState`] is created per request and only ever changed by
//! merging the [`StateUpdate`] a step returns.

use ragent_llm::ChatMessage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Provenance attached to a passage or recorded on a user turn.
pub type Metadata = BTreeMap<String, String>;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Metadata of the passages an answer drew on, kept on the user turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Metadata>>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sources: None,
        }
    }
}

/// Append-only conversation history.
///
/// Extension returns a new history; an existing value is never modified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatHistory {
    turns: Vec<Turn>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// A new history with one user/assistant exchange appended.
    pub fn with_exchange(
        &self,
        question: impl Into<String>,
        answer: impl Into<String>,
        sources: Vec<Metadata>,
    ) -> Self {
        let mut turns = Vec::with_capacity(self.turns.len() + 2);
        turns.extend(self.turns.iter().cloned());
        turns.push(Turn {
            sources: Some(sources),
            ..Turn::user(question)
        });
        turns.push(Turn::assistant(answer));
        Self { turns }
    }

    /// Turns as chat messages for an LLM request. Source metadata is dropped.
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .map(|turn| match turn.role {
                Role::User => ChatMessage::user(turn.content.clone()),
                Role::Assistant => ChatMessage::assistant(turn.content.clone()),
                Role::System => ChatMessage::system(turn.content.clone()),
            })
            .collect()
    }
}

/// Metadata keys shared by stores and the controller.
pub mod meta {
    pub const SOURCE: &str = "source";
    pub const POSITION: &str = "position";
    pub const SCORE: &str = "score";
    pub const ORIGIN: &str = "origin";
    pub const TITLE: &str = "title";

    pub const ORIGIN_INDEX: &str = "index";
    pub const ORIGIN_WEB: &str = "web";
    pub const ORIGIN_BROADENED: &str = "broadened";
}

/// A retrieved unit of text plus its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Passage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get(meta::SOURCE).map(String::as_str)
    }

    pub fn origin(&self) -> Option<&str> {
        self.metadata.get(meta::ORIGIN).map(String::as_str)
    }

    /// Fold broad-search results into one passage.
    ///
    /// Contents are joined with blank lines; `source` lists the distinct
    /// sources in first-seen order. Returns `None` for an empty input.
    pub fn combine_broadened(passages: &[Passage]) -> Option<Passage> {
        if passages.is_empty() {
            return None;
        }

        let content = passages
            .iter()
            .map(|p| p.content.trim())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut sources: Vec<&str> = Vec::new();
        for source in passages.iter().filter_map(Passage::source) {
            if !sources.contains(&source) {
                sources.push(source);
            }
        }

        let mut combined = Passage::new(content)
            .with_meta(meta::ORIGIN, meta::ORIGIN_BROADENED)
            .with_meta("passages", passages.len().to_string());
        if !sources.is_empty() {
            combined = combined.with_meta(meta::SOURCE, sources.join(", "));
        }

        Some(combined)
    }
}

/// Immutable input to one workflow run.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub question: String,
    pub chat_history: ChatHistory,
}

impl Request {
    pub fn new(question: impl Into<String>, chat_history: ChatHistory) -> Self {
        Self {
            question: question.into(),
            chat_history,
        }
    }
}

/// The record every step reads and the controller updates.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowState {
    /// Current working question, possibly rewritten
    pub question: String,
    /// Most-relevant-first; broadened results appended at the end
    pub documents: Vec<Passage>,
    /// Set by grading, read by the router
    pub needs_broader_search: bool,
    /// Populated only by the terminal step
    pub generation: Option<String>,
    pub chat_history: ChatHistory,
}

impl WorkflowState {
    pub fn from_request(request: Request) -> Self {
        Self {
            question: request.question,
            documents: Vec::new(),
            needs_broader_search: false,
            generation: None,
            chat_history: request.chat_history,
        }
    }

    /// Overlay the fields a step wrote.
    pub fn merge(self, update: StateUpdate) -> Self {
        Self {
            question: update.question.unwrap_or(self.question),
            documents: update.documents.unwrap_or(self.documents),
            needs_broader_search: update
                .needs_broader_search
                .unwrap_or(self.needs_broader_search),
            generation: update.generation.or(self.generation),
            chat_history: self.chat_history,
        }
    }
}

/// The fields one step writes. `None` leaves the state value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub question: Option<String>,
    pub documents: Option<Vec<Passage>>,
    pub needs_broader_search: Option<bool>,
    pub generation: Option<String>,
}

impl StateUpdate {
    pub fn question(question: impl Into<String>) -> Self {
        Self {
            question: Some(question.into()),
            ..Default::default()
        }
    }

    pub fn documents(documents: Vec<Passage>) -> Self {
        Self {
            documents: Some(documents),
            ..Default::default()
        }
    }

    pub fn generation(answer: impl Into<String>) -> Self {
        Self {
            generation: Some(answer.into()),
            ..Default::default()
        }
    }
}

/// Workflow steps, in the order they can be visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    Retrieve,
    Grade,
    Rewrite,
    BroadenSearch,
    Generate,
    Done,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Retrieve => "retrieve",
            Step::Grade => "grade",
            Step::Rewrite => "rewrite",
            Step::BroadenSearch => "broaden_search",
            Step::Generate => "generate",
            Step::Done => "done",
        };
        f.write_str(name)
    }
}
