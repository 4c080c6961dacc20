//! Agentic retrieval-augmented question answering.
//!
//! A [`Workflow`] retrieves passages for a question, grades each for
//! relevance, and either answers from the relevant ones or rewrites the
//! question and broadens the search once before answering.
//!
//! # Example
//! ```no_run
//! use ragent_core::AppConfig;
//! use ragent_workflow::{build_workflow, ChatHistory};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load()?;
//! let workflow = build_workflow(&config)?;
//!
//! let turn = workflow
//!     .answer_turn("What is the capital of France?", &ChatHistory::new())
//!     .await?;
//! println!("{}", turn.answer);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod condenser;
pub mod controller;
pub mod generator;
pub mod grader;
pub mod prompted;
pub mod rewriter;
pub mod sources;
pub mod state;
pub mod store;

#[cfg(test)]
mod tests;

pub use builder::build_workflow;
pub use condenser::{LlmQuestionCondenser, QuestionCondenser};
pub use controller::{
    route, Degradation, TurnResult, Workflow, WorkflowOptions, WorkflowOutcome,
};
pub use generator::{is_dont_know, AnswerGenerator, Generation, LlmAnswerGenerator, DONT_KNOW_ANSWER};
pub use grader::{LlmRelevanceGrader, RelevanceGrader, RelevanceVerdict};
pub use prompted::PromptedLlm;
pub use rewriter::{LlmQueryRewriter, QueryRewriter};
pub use sources::{source_refs, SourceRef};
pub use state::{ChatHistory, Metadata, Passage, Request, Role, StateUpdate, Step, Turn, WorkflowState};
pub use store::{ContextStore, IndexContextStore, WebSearchStore};
