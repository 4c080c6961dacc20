//! Grounded answer generation.

use crate::prompted::PromptedLlm;
use crate::state::{ChatHistory, Passage};
use ragent_core::{AppError, AppResult};

/// The fixed reply when the context cannot support an answer.
pub const DONT_KNOW_ANSWER: &str =
    "I don't know the answer to that based on the available context.";

/// Whether an answer is an explicit admission of not knowing.
pub fn is_dont_know(answer: &str) -> bool {
    let lower = answer.to_lowercase().replace('\u{2019}', "'");
    lower.contains("don't know") || lower.contains("do not know")
}

/// An answer plus the passages it was generated from.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub answer: String,
    pub used_passages: Vec<Passage>,
}

/// Produces a concise answer grounded only in the given passages.
///
/// With no passages, implementations must return an explicit "don't know"
/// rather than an invented answer. Failure here is fatal to the run.
#[async_trait::async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(
        &self,
        question: &str,
        history: &ChatHistory,
        passages: &[Passage],
    ) -> AppResult<Generation>;
}

/// Generates with the `answer.context` prompt, passing prior turns as chat
/// messages.
pub struct LlmAnswerGenerator {
    llm: PromptedLlm,
}

impl LlmAnswerGenerator {
    pub fn new(llm: PromptedLlm) -> Self {
        Self { llm }
    }
}

#[async_trait::async_trait]
impl AnswerGenerator for LlmAnswerGenerator {
    async fn generate(
        &self,
        question: &str,
        history: &ChatHistory,
        passages: &[Passage],
    ) -> AppResult<Generation> {
        if passages.is_empty() {
            tracing::info!("No context passages, answering with don't-know");
            return Ok(Generation {
                answer: DONT_KNOW_ANSWER.to_string(),
                used_passages: Vec::new(),
            });
        }

        let context = build_context(passages);
        let reply = self
            .llm
            .complete(
                &[("question", question), ("context", &context)],
                history.to_messages(),
            )
            .await
            .map_err(|e| AppError::Generation(e.to_string()))?;

        let answer = reply.trim();
        let answer = if answer.is_empty() {
            DONT_KNOW_ANSWER.to_string()
        } else {
            answer.to_string()
        };

        Ok(Generation {
            answer,
            used_passages: passages.to_vec(),
        })
    }
}

/// Number passages and join them into one context block.
pub fn build_context(passages: &[Passage]) -> String {
    passages
        .iter()
        .enumerate()
        .map(|(i, passage)| match passage.source() {
            Some(source) => format!("[{}] ({})\n{}", i + 1, source, passage.content.trim()),
            None => format!("[{}]\n{}", i + 1, passage.content.trim()),
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::meta;
    use crate::tests::fakes::{builtin_prompt, ScriptedLlm};
    use ragent_llm::{ChatMessage, ChatRole};
    use std::sync::Arc;

    #[test]
    fn test_is_dont_know() {
        assert!(is_dont_know(DONT_KNOW_ANSWER));
        assert!(is_dont_know("I do not know."));
        assert!(is_dont_know("Sorry, I DON\u{2019}T KNOW"));
        assert!(!is_dont_know("Paris is the capital of France."));
    }

    #[test]
    fn test_build_context_numbers_passages() {
        let passages = vec![
            Passage::new("alpha").with_meta(meta::SOURCE, "a.md"),
            Passage::new("beta"),
        ];
        assert_eq!(build_context(&passages), "[1] (a.md)\nalpha\n\n---\n\n[2]\nbeta");
    }

    #[tokio::test]
    async fn test_no_passages_skips_llm() {
        let llm = Arc::new(ScriptedLlm::new(|_| Ok("invented".to_string())));
        let generator =
            LlmAnswerGenerator::new(PromptedLlm::new(llm.clone(), "m", builtin_prompt("answer.context")));

        let generation = generator.generate("q", &ChatHistory::new(), &[]).await.unwrap();
        assert_eq!(generation.answer, DONT_KNOW_ANSWER);
        assert!(generation.used_passages.is_empty());
        assert!(llm.requests().is_empty());
    }

    #[tokio::test]
    async fn test_context_and_history_reach_the_model() {
        let llm = Arc::new(ScriptedLlm::new(|_| Ok(" Paris. ".to_string())));
        let generator =
            LlmAnswerGenerator::new(PromptedLlm::new(llm.clone(), "m", builtin_prompt("answer.context")));
        let history = ChatHistory::new().with_exchange("Hi", "Hello!", vec![]);
        let passages = vec![Passage::new("Paris is the capital of France.")];

        let generation = generator
            .generate("Capital of France?", &history, &passages)
            .await
            .unwrap();
        assert_eq!(generation.answer, "Paris.");
        assert_eq!(generation.used_passages, passages);

        let request = &llm.requests()[0];
        assert_eq!(request.prompt, "Capital of France?");
        assert!(request
            .system
            .as_deref()
            .unwrap()
            .contains("Paris is the capital of France."));
        assert_eq!(request.history, vec![ChatMessage::user("Hi"), ChatMessage::assistant("Hello!")]);
        assert_eq!(request.to_messages()[0].role, ChatRole::System);
    }

    #[tokio::test]
    async fn test_llm_failure_is_generation_error() {
        let llm = Arc::new(ScriptedLlm::new(|_| Err(AppError::Llm("down".to_string()))));
        let generator =
            LlmAnswerGenerator::new(PromptedLlm::new(llm, "m", builtin_prompt("answer.context")));

        let err = generator
            .generate("q", &ChatHistory::new(), &[Passage::new("p")])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Generation(_)));
    }
}
