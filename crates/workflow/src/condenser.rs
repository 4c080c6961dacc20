//! Follow-up question condensation.

use crate::prompted::PromptedLlm;
use crate::state::ChatHistory;
use ragent_core::{AppError, AppResult};

/// Turns a follow-up that leans on earlier turns into a standalone question.
#[async_trait::async_trait]
pub trait QuestionCondenser: Send + Sync {
    async fn condense(&self, question: &str, history: &ChatHistory) -> AppResult<String>;
}

/// Condenses with the `condense.question` prompt.
pub struct LlmQuestionCondenser {
    llm: PromptedLlm,
}

impl LlmQuestionCondenser {
    pub fn new(llm: PromptedLlm) -> Self {
        Self { llm }
    }
}

#[async_trait::async_trait]
impl QuestionCondenser for LlmQuestionCondenser {
    async fn condense(&self, question: &str, history: &ChatHistory) -> AppResult<String> {
        let reply = self
            .llm
            .complete(&[("question", question)], history.to_messages())
            .await
            .map_err(|e| AppError::Rewrite(e.to_string()))?;

        let standalone = reply.trim();
        if standalone.is_empty() {
            return Err(AppError::Rewrite("Model returned an empty question".to_string()));
        }
        Ok(standalone.to_string())
    }
}
