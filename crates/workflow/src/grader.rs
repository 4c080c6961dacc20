//! Relevance grading of retrieved passages.

use crate::prompted::PromptedLlm;
use crate::state::Passage;
use ragent_core::{AppError, AppResult};
use serde::Deserialize;

/// Binary relevance judgment for one passage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelevanceVerdict {
    Relevant,
    NotRelevant,
}

impl RelevanceVerdict {
    pub fn is_relevant(self) -> bool {
        self == RelevanceVerdict::Relevant
    }
}

/// Judges whether a passage is relevant to a question.
///
/// Grading is independent per passage; the controller may run several
/// calls concurrently.
#[async_trait::async_trait]
pub trait RelevanceGrader: Send + Sync {
    async fn grade(&self, question: &str, passage: &Passage) -> AppResult<RelevanceVerdict>;
}

/// Grades with the `grade.document` prompt at temperature 0.
pub struct LlmRelevanceGrader {
    llm: PromptedLlm,
}

impl LlmRelevanceGrader {
    pub fn new(llm: PromptedLlm) -> Self {
        Self { llm }
    }
}

#[async_trait::async_trait]
impl RelevanceGrader for LlmRelevanceGrader {
    async fn grade(&self, question: &str, passage: &Passage) -> AppResult<RelevanceVerdict> {
        let reply = self
            .llm
            .complete(
                &[("question", question), ("document", &passage.content)],
                Vec::new(),
            )
            .await
            .map_err(|e| AppError::Grading(e.to_string()))?;

        let verdict = parse_verdict(&reply);
        tracing::debug!(?verdict, reply = %reply.trim(), "Graded passage");
        Ok(verdict)
    }
}

#[derive(Deserialize)]
struct GradeReply {
    binary_score: String,
}

/// Interpret a grader reply.
///
/// Accepts `{"binary_score": "yes"|"no"}`, optionally inside a code fence,
/// or a bare yes/no. Anything else is treated as not relevant.
pub fn parse_verdict(reply: &str) -> RelevanceVerdict {
    let body = strip_code_fence(reply.trim());

    let answer = match serde_json::from_str::<GradeReply>(body) {
        Ok(parsed) => parsed.binary_score,
        Err(_) => body.to_string(),
    };

    let normalized = answer
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();

    if normalized == "yes" {
        RelevanceVerdict::Relevant
    } else {
        RelevanceVerdict::NotRelevant
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json") on the opening fence
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim_end().trim_end_matches("```").trim()
}
