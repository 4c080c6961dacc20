//! The workflow wired to a learned knowledge base and LLM-backed
//! collaborators, with a scripted model standing in for the provider.

use super::fakes::{builtin_prompt, ScriptedLlm};
use crate::builder::build_workflow;
use crate::controller::Workflow;
use crate::generator::{LlmAnswerGenerator, DONT_KNOW_ANSWER};
use crate::grader::LlmRelevanceGrader;
use crate::prompted::PromptedLlm;
use crate::rewriter::LlmQueryRewriter;
use crate::state::{meta, ChatHistory, Request, Step};
use crate::store::IndexContextStore;
use ragent_core::{AppConfig, AppError};
use ragent_knowledge::embeddings::providers::TrigramProvider;
use ragent_knowledge::{learn, open_index, LearnOptions};
use ragent_llm::LlmRequest;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn system_of(request: &LlmRequest) -> &str {
    request.system.as_deref().unwrap_or("")
}

/// Grades "yes" only for passages mentioning Paris; answers from context.
fn scripted_model() -> ScriptedLlm {
    ScriptedLlm::new(|request| {
        let system = system_of(request);
        if system.contains("grade whether") {
            let verdict = if request.prompt.contains("Paris") { "yes" } else { "no" };
            Ok(format!("```json\n{{\"binary_score\": \"{}\"}}\n```", verdict))
        } else if system.contains("rewrite questions") {
            Ok("Improved question: What is the capital city of France?".to_string())
        } else if system.contains("Paris") {
            Ok("Paris is the capital of France.".to_string())
        } else {
            Ok("I don't know.".to_string())
        }
    })
}

async fn learned_workspace() -> TempDir {
    let temp = TempDir::new().unwrap();
    let docs = temp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(docs.join("france.md"), "# France\n\nParis is the capital of France.").unwrap();
    fs::write(docs.join("baking.txt"), "Sourdough bread needs a mature starter.").unwrap();

    learn(
        temp.path(),
        LearnOptions::new("default", vec![docs]),
        &TrigramProvider::new(384),
    )
    .await
    .unwrap();

    temp
}

fn index_store(temp: &TempDir) -> IndexContextStore {
    let index = open_index(temp.path(), "default").unwrap();
    IndexContextStore::new(Arc::new(index), Arc::new(TrigramProvider::new(384)))
}

fn workflow_over(temp: &TempDir, llm: Arc<ScriptedLlm>) -> Workflow {
    workflow_with_store(index_store(temp), llm)
}

fn workflow_with_store(store: IndexContextStore, llm: Arc<ScriptedLlm>) -> Workflow {
    let prompted = |id: &str| PromptedLlm::new(llm.clone(), "test-model", builtin_prompt(id));

    Workflow::new(
        Arc::new(store),
        Arc::new(LlmRelevanceGrader::new(prompted("grade.document"))),
        Arc::new(LlmQueryRewriter::new(prompted("rewrite.query"))),
        Arc::new(LlmAnswerGenerator::new(prompted("answer.context"))),
    )
}

#[tokio::test]
async fn test_answers_from_learned_documents() {
    let temp = learned_workspace().await;
    let llm = Arc::new(scripted_model());
    let workflow = workflow_over(&temp, llm.clone());

    let outcome = workflow
        .run(Request::new("What is the capital of France?", ChatHistory::new()))
        .await
        .unwrap();

    assert_eq!(outcome.path, vec![Step::Retrieve, Step::Grade, Step::Generate, Step::Done]);
    assert!(outcome.answer.contains("Paris"));
    assert!(outcome.documents[0].source().unwrap().ends_with("france.md"));
    assert!(llm.requests().iter().all(|r| r.model == "test-model"));
}

#[tokio::test]
async fn test_irrelevant_hit_triggers_rewrite_and_broadening() {
    let temp = learned_workspace().await;
    let store = index_store(&temp).with_min_score(0.0);
    let workflow = workflow_with_store(store, Arc::new(scripted_model()));

    let outcome = workflow
        .run(Request::new("xyzzy123 unrelated token", ChatHistory::new()))
        .await
        .unwrap();

    assert_eq!(
        outcome.path,
        vec![
            Step::Retrieve,
            Step::Grade,
            Step::Rewrite,
            Step::BroadenSearch,
            Step::Generate,
            Step::Done
        ]
    );
    assert_eq!(outcome.question, "What is the capital city of France?");
    assert_eq!(outcome.answer, "Paris is the capital of France.");
    assert_eq!(outcome.documents.len(), 2);
    assert!(outcome.documents[0].source().unwrap().ends_with("france.md"));
    assert_eq!(outcome.documents[1].origin(), Some(meta::ORIGIN_BROADENED));
    assert!(outcome.degradations.is_empty());
}

#[tokio::test]
async fn test_no_context_answer_skips_model() {
    let temp = learned_workspace().await;
    let llm = Arc::new(ScriptedLlm::new(|request| {
        if system_of(request).contains("rewrite questions") {
            Ok("zzqv?".to_string())
        } else {
            Ok("no".to_string())
        }
    }));
    let workflow = workflow_over(&temp, llm.clone());

    let outcome = workflow
        .run(Request::new("qqqzzz vvvwww", ChatHistory::new()))
        .await
        .unwrap();

    assert_eq!(outcome.answer, DONT_KNOW_ANSWER);
    assert!(llm
        .requests()
        .iter()
        .all(|r| !system_of(r).contains("answer questions")));
}

#[tokio::test]
async fn test_build_workflow_from_config() {
    let temp = learned_workspace().await;
    let config = AppConfig {
        workspace: temp.path().to_path_buf(),
        ..AppConfig::default()
    };

    let workflow = build_workflow(&config).unwrap();
    assert_eq!(workflow.options().grading_concurrency, 4);
    assert!(workflow.options().deadline.is_none());
}

#[tokio::test]
async fn test_build_workflow_requires_index() {
    let temp = TempDir::new().unwrap();
    let config = AppConfig {
        workspace: temp.path().to_path_buf(),
        ..AppConfig::default()
    };

    match build_workflow(&config) {
        Err(AppError::Config(msg)) => assert!(msg.contains("has no index")),
        Err(other) => panic!("Expected config error, got {other}"),
        Ok(_) => panic!("Expected config error for missing index"),
    }
}

#[tokio::test]
async fn test_build_workflow_rejects_embedding_mismatch() {
    let temp = learned_workspace().await;
    let mut config = AppConfig {
        workspace: temp.path().to_path_buf(),
        ..AppConfig::default()
    };
    config.embedding.dimensions = 768;

    assert!(matches!(build_workflow(&config), Err(AppError::Config(_))));
}
