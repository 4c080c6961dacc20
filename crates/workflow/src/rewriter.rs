//! Query rewriting for a second retrieval attempt.

use crate::prompted::PromptedLlm;
use ragent_core::{AppError, AppResult};

/// Produces a search-optimized reformulation of a question.
///
/// The result must be a question, never an answer.
#[async_trait::async_trait]
pub trait QueryRewriter: Send + Sync {
    async fn rewrite(&self, question: &str) -> AppResult<String>;
}

/// Rewrites with the `rewrite.query` prompt at temperature 0.
pub struct LlmQueryRewriter {
    llm: PromptedLlm,
}

impl LlmQueryRewriter {
    pub fn new(llm: PromptedLlm) -> Self {
        Self { llm }
    }
}

#[async_trait::async_trait]
impl QueryRewriter for LlmQueryRewriter {
    async fn rewrite(&self, question: &str) -> AppResult<String> {
        let reply = self
            .llm
            .complete(&[("question", question)], Vec::new())
            .await
            .map_err(|e| AppError::Rewrite(e.to_string()))?;

        let rewritten = clean_rewrite(&reply);
        if rewritten.is_empty() {
            return Err(AppError::Rewrite("Model returned an empty rewrite".to_string()));
        }

        tracing::debug!(original = %question, rewritten = %rewritten, "Rewrote question");
        Ok(rewritten)
    }
}

const LABELS: &[&str] = &["improved question:", "rewritten question:", "question:"];

/// First non-empty line of a reply, minus labels and wrapping quotes.
pub fn clean_rewrite(reply: &str) -> String {
    let line = reply
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");

    let lower = line.to_lowercase();
    let unlabeled = LABELS
        .iter()
        .find(|label| lower.starts_with(*label))
        .and_then(|label| line.get(label.len()..))
        .unwrap_or(line)
        .trim();

    unlabeled
        .trim_matches(|c| matches!(c, '"' | '\'' | '`' | '\u{201c}' | '\u{201d}'))
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fakes::{builtin_prompt, ScriptedLlm};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_clean_rewrite() {
        assert_eq!(clean_rewrite("What is ownership in Rust?"), "What is ownership in Rust?");
        assert_eq!(
            clean_rewrite("Improved question: \"How does Rust ownership work?\""),
            "How does Rust ownership work?"
        );
        assert_eq!(clean_rewrite("\n\n  'quoted'  \nextra"), "quoted");
        assert_eq!(clean_rewrite("   "), "");
    }

    #[tokio::test]
    async fn test_rewrite_uses_prompt() {
        let llm = Arc::new(ScriptedLlm::new(|_| {
            Ok("Improved question: Which city is the capital of France?".to_string())
        }));
        let rewriter =
            LlmQueryRewriter::new(PromptedLlm::new(llm.clone(), "m", builtin_prompt("rewrite.query")));

        let rewritten = rewriter.rewrite("france capital").await.unwrap();
        assert_eq!(rewritten, "Which city is the capital of France?");
        assert!(llm.requests()[0].prompt.contains("france capital"));
    }

    #[tokio::test]
    async fn test_empty_rewrite_is_error() {
        let llm = Arc::new(ScriptedLlm::new(|_| Ok("\"\"".to_string())));
        let rewriter =
            LlmQueryRewriter::new(PromptedLlm::new(llm, "m", builtin_prompt("rewrite.query")));

        let err = rewriter.rewrite("q").await.unwrap_err();
        assert!(matches!(err, AppError::Rewrite(_)));
    }

    #[tokio::test]
    async fn test_repeated_rewrites_stay_questions() {
        let calls = AtomicUsize::new(0);
        let llm = Arc::new(ScriptedLlm::new(move |_| {
            let reply = match calls.fetch_add(1, Ordering::SeqCst) {
                0 => "Improved question: Which city is the capital of France?",
                _ => "\"What is the name of the French capital city?\"",
            };
            Ok(reply.to_string())
        }));
        let rewriter =
            LlmQueryRewriter::new(PromptedLlm::new(llm.clone(), "m", builtin_prompt("rewrite.query")));

        let answer = "Paris";
        let first = rewriter.rewrite("france capital").await.unwrap();
        let second = rewriter.rewrite("france capital").await.unwrap();

        for rewritten in [&first, &second] {
            assert!(!rewritten.is_empty());
            assert_ne!(rewritten.as_str(), answer);
            assert!(!rewritten.contains(answer));
            assert!(rewritten.ends_with('?'));
        }

        let requests = llm.requests();
        assert_eq!(requests.len(), 2);
        for request in &requests {
            assert!(request.system.as_deref().unwrap().contains("Never answer the question"));
            assert!(request.prompt.contains("france capital"));
            assert_eq!(request.temperature, Some(0.0));
        }
    }
}
