use super::fakes::{passage, EchoGenerator, FixedRewriter, KeywordGrader, ScriptedStore};
use crate::controller::{Degradation, Workflow};
use crate::generator::{is_dont_know, DONT_KNOW_ANSWER};
use crate::state::{meta, ChatHistory, Request, Step};
use ragent_core::AppError;
use std::sync::Arc;

fn request(question: &str) -> Request {
    Request::new(question, ChatHistory::new())
}

#[tokio::test]
async fn test_relevant_passage_goes_straight_to_generation() {
    let primary = Arc::new(ScriptedStore::new(
        "index",
        vec![Ok(vec![passage("Paris is the capital of France.", "france.md")])],
    ));
    let rewriter = Arc::new(FixedRewriter::returning("unused"));
    let generator = Arc::new(EchoGenerator::default());

    let workflow = Workflow::new(
        primary.clone(),
        Arc::new(KeywordGrader::new("paris")),
        rewriter.clone(),
        generator.clone(),
    );

    let outcome = workflow
        .run(request("What is the capital of France?"))
        .await
        .unwrap();

    assert!(outcome.answer.contains("Paris"));
    assert_eq!(outcome.path, vec![Step::Retrieve, Step::Grade, Step::Generate, Step::Done]);
    assert!(rewriter.inputs().is_empty());
    assert_eq!(primary.queries().len(), 1);
    assert_eq!(outcome.documents.len(), 1);
    assert!(outcome.degradations.is_empty());
}

#[tokio::test]
async fn test_empty_retrieval_rewrites_and_broadens() {
    let primary = Arc::new(ScriptedStore::new(
        "index",
        vec![
            Ok(vec![]),
            Ok(vec![
                passage("Xyzzy is a magic word from Colossal Cave.", "games.md"),
                passage("It teleports the player.", "cave.md"),
            ]),
        ],
    ));
    let rewriter = Arc::new(FixedRewriter::returning("What does the word xyzzy mean?"));
    let generator = Arc::new(EchoGenerator::default());

    let workflow = Workflow::new(
        primary.clone(),
        Arc::new(KeywordGrader::new("xyzzy")),
        rewriter.clone(),
        generator.clone(),
    );

    let outcome = workflow.run(request("xyzzy123 unrelated token")).await.unwrap();

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
    assert_eq!(rewriter.inputs(), vec!["xyzzy123 unrelated token".to_string()]);
    assert_eq!(
        primary.queries(),
        vec![
            "xyzzy123 unrelated token".to_string(),
            "What does the word xyzzy mean?".to_string()
        ]
    );
    assert_eq!(outcome.question, "What does the word xyzzy mean?");
    assert_eq!(outcome.original_question, "xyzzy123 unrelated token");

    let seen = generator.seen();
    assert_eq!(seen.len(), 1);
    let passages = &seen[0].2;
    assert_eq!(passages.len(), 1);
    assert_eq!(passages[0].origin(), Some(meta::ORIGIN_BROADENED));
    assert_eq!(passages[0].source(), Some("games.md, cave.md"));
    assert!(passages[0].content.contains("Colossal Cave.\n\nIt teleports"));
}

#[tokio::test]
async fn test_retrieval_failure_degrades_and_broadens() {
    let primary = Arc::new(ScriptedStore::new(
        "index",
        vec![Err(AppError::Retrieval("connection refused".to_string())), Ok(vec![])],
    ));
    let grader = Arc::new(KeywordGrader::new("anything"));
    let generator = Arc::new(EchoGenerator::default());

    let workflow = Workflow::new(
        primary,
        grader.clone(),
        Arc::new(FixedRewriter::returning("a better question")),
        generator.clone(),
    );

    let outcome = workflow.run(request("anything at all?")).await.unwrap();

    assert_eq!(grader.calls(), 0);
    assert!(outcome.path.contains(&Step::Rewrite));
    assert!(outcome.path.contains(&Step::BroadenSearch));
    assert!(matches!(outcome.degradations[0], Degradation::Retrieval(ref m) if m.contains("connection refused")));
    assert_eq!(outcome.answer, DONT_KNOW_ANSWER);
    assert!(is_dont_know(&outcome.answer));
}

#[tokio::test]
async fn test_generation_failure_is_fatal() {
    let primary = Arc::new(ScriptedStore::new(
        "index",
        vec![Ok(vec![passage("Paris is the capital of France.", "france.md")])],
    ));

    let workflow = Workflow::new(
        primary,
        Arc::new(KeywordGrader::new("paris")),
        Arc::new(FixedRewriter::returning("unused")),
        Arc::new(EchoGenerator::failing()),
    );

    let err = workflow
        .run(request("What is the capital of France?"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Generation(_)));
    assert!(err.to_string().contains("model unavailable"));
}

#[tokio::test]
async fn test_empty_question_is_rejected() {
    let primary = Arc::new(ScriptedStore::new("index", vec![]));
    let workflow = Workflow::new(
        primary.clone(),
        Arc::new(KeywordGrader::new("x")),
        Arc::new(FixedRewriter::returning("x")),
        Arc::new(EchoGenerator::default()),
    );

    assert!(workflow.run(request("   ")).await.is_err());
    assert!(primary.queries().is_empty());
}
