//! Scripted collaborators for workflow tests.

use crate::generator::{AnswerGenerator, Generation, DONT_KNOW_ANSWER};
use crate::grader::{RelevanceGrader, RelevanceVerdict};
use crate::rewriter::QueryRewriter;
use crate::state::{meta, ChatHistory, Passage};
use crate::store::ContextStore;
use ragent_core::{AppError, AppResult};
use ragent_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use ragent_prompt::PromptDefinition;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn builtin_prompt(id: &str) -> PromptDefinition {
    ragent_prompt::load_prompt(Path::new("/nonexistent/ragent-test-workspace"), id).unwrap()
}

pub fn passage(content: &str, source: &str) -> Passage {
    Passage::new(content)
        .with_meta(meta::SOURCE, source)
        .with_meta(meta::ORIGIN, meta::ORIGIN_INDEX)
}

type Reply = Box<dyn Fn(&LlmRequest) -> AppResult<String> + Send + Sync>;

/// LLM client answering from a closure and recording every request.
pub struct ScriptedLlm {
    reply: Reply,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new(reply: impl Fn(&LlmRequest) -> AppResult<String> + Send + Sync + 'static) -> Self {
        Self {
            reply: Box::new(reply),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let content = (self.reply)(request)?;
        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::default(),
        })
    }
}

/// Store that replays one scripted result per call and records queries.
pub struct ScriptedStore {
    name: String,
    results: Mutex<VecDeque<AppResult<Vec<Passage>>>>,
    queries: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedStore {
    pub fn new(name: &str, results: Vec<AppResult<Vec<Passage>>>) -> Self {
        Self {
            name: name.to_string(),
            results: Mutex::new(results.into()),
            queries: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ContextStore for ScriptedStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str) -> AppResult<Vec<Passage>> {
        self.queries.lock().unwrap().push(query.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.results.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Grader that marks a passage relevant when its content contains a
/// keyword. Passages containing "FAIL" produce an error; "SLOW" ones take
/// longer to grade and "STALL" ones take far longer.
pub struct KeywordGrader {
    keyword: String,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl KeywordGrader {
    pub fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_lowercase(),
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RelevanceGrader for KeywordGrader {
    async fn grade(&self, _question: &str, passage: &Passage) -> AppResult<RelevanceVerdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if passage.content.contains("SLOW") {
            tokio::time::sleep(Duration::from_millis(60)).await;
        }
        if passage.content.contains("STALL") {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if passage.content.contains("FAIL") {
            return Err(AppError::Grading("unparseable grader output".to_string()));
        }

        if passage.content.to_lowercase().contains(&self.keyword) {
            Ok(RelevanceVerdict::Relevant)
        } else {
            Ok(RelevanceVerdict::NotRelevant)
        }
    }
}

/// Rewriter returning a fixed result and recording its inputs.
pub struct FixedRewriter {
    result: Box<dyn Fn() -> AppResult<String> + Send + Sync>,
    inputs: Mutex<Vec<String>>,
}

impl FixedRewriter {
    pub fn returning(rewritten: &str) -> Self {
        let rewritten = rewritten.to_string();
        Self {
            result: Box::new(move || Ok(rewritten.clone())),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: Box::new(|| Err(AppError::Rewrite("rewriter unavailable".to_string()))),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl QueryRewriter for FixedRewriter {
    async fn rewrite(&self, question: &str) -> AppResult<String> {
        self.inputs.lock().unwrap().push(question.to_string());
        (self.result)()
    }
}

/// Generator that answers with the first line of each passage, or the
/// don't-know reply without passages. Records what it was given.
#[derive(Default)]
pub struct EchoGenerator {
    fail: bool,
    seen: Mutex<Vec<(String, usize, Vec<Passage>)>>,
}

impl EchoGenerator {
    pub fn failing() -> Self {
        Self {
            fail: true,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// `(question, history length, passages)` per call
    pub fn seen(&self) -> Vec<(String, usize, Vec<Passage>)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AnswerGenerator for EchoGenerator {
    async fn generate(
        &self,
        question: &str,
        history: &ChatHistory,
        passages: &[Passage],
    ) -> AppResult<Generation> {
        self.seen
            .lock()
            .unwrap()
            .push((question.to_string(), history.len(), passages.to_vec()));

        if self.fail {
            return Err(AppError::Llm("model unavailable".to_string()));
        }

        if passages.is_empty() {
            return Ok(Generation {
                answer: DONT_KNOW_ANSWER.to_string(),
                used_passages: Vec::new(),
            });
        }

        let answer = passages
            .iter()
            .filter_map(|p| p.content.lines().next())
            .collect::<Vec<_>>()
            .join(" ");

        Ok(Generation {
            answer,
            used_passages: passages.to_vec(),
        })
    }
}
