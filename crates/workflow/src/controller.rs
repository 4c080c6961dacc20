//! The workflow controller.
//!
//! Drives one request through
//! `Retrieve -> Grade -> (Rewrite -> BroadenSearch ->)? Generate -> Done`.
//! Every step runs exactly once per request and only `Generate` can fail
//! the run; other step failures are absorbed and recorded as
//! [`Degradation`]s.

use crate::condenser::QuestionCondenser;
use crate::generator::AnswerGenerator;
use crate::grader::{RelevanceGrader, RelevanceVerdict};
use crate::rewriter::QueryRewriter;
use crate::state::{ChatHistory, Metadata, Passage, Request, StateUpdate, Step, WorkflowState};
use crate::store::ContextStore;
use futures::stream::{self, StreamExt};
use ragent_core::{AppError, AppResult};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::Instrument;

pub const DEFAULT_GRADING_CONCURRENCY: usize = 4;

/// Pick the branch after grading.
pub fn route(state: &WorkflowState) -> Step {
    if state.needs_broader_search {
        Step::Rewrite
    } else {
        Step::Generate
    }
}

/// A step failure the run absorbed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Degradation {
    /// Question condensation failed; the question was used as asked
    Condense(String),
    /// Primary retrieval failed; treated as no documents
    Retrieval(String),
    /// Grading of the passage at this index failed; treated as not relevant
    Grading { index: usize, reason: String },
    /// Rewrite failed or was empty; the question was kept
    Rewrite(String),
    /// Broad search failed; no documents were added
    BroadenSearch(String),
    /// The deadline expired during this step; the run skipped to Generate
    Deadline(Step),
}

#[derive(Debug, Clone)]
pub struct WorkflowOptions {
    /// Maximum in-flight grading calls
    pub grading_concurrency: usize,
    /// Budget for the steps before Generate
    pub deadline: Option<Duration>,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            grading_concurrency: DEFAULT_GRADING_CONCURRENCY,
            deadline: None,
        }
    }
}

/// Final result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowOutcome {
    /// Working question at generation time
    pub question: String,
    pub original_question: String,
    pub answer: String,
    /// Passages the answer was generated from
    pub documents: Vec<Passage>,
    /// Steps visited, in order, ending with `Done`
    pub path: Vec<Step>,
    pub degradations: Vec<Degradation>,
}

/// Result of one conversational turn.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub answer: String,
    pub documents: Vec<Passage>,
    /// The input history extended with this exchange
    pub history: ChatHistory,
    pub path: Vec<Step>,
    pub degradations: Vec<Degradation>,
}

/// A step's state changes plus anything it had to absorb.
type StepOutput = (StateUpdate, Vec<Degradation>);

/// Agentic RAG controller.
///
/// Collaborators are shared; a single `Workflow` can serve concurrent
/// requests since all per-request data lives in [`WorkflowState`].
#[derive(Clone)]
pub struct Workflow {
    primary: Arc<dyn ContextStore>,
    broad: Arc<dyn ContextStore>,
    grader: Arc<dyn RelevanceGrader>,
    rewriter: Arc<dyn QueryRewriter>,
    generator: Arc<dyn AnswerGenerator>,
    condenser: Option<Arc<dyn QuestionCondenser>>,
    options: WorkflowOptions,
}

impl Workflow {
    /// Broad search defaults to the primary store.
    pub fn new(
        primary: Arc<dyn ContextStore>,
        grader: Arc<dyn RelevanceGrader>,
        rewriter: Arc<dyn QueryRewriter>,
        generator: Arc<dyn AnswerGenerator>,
    ) -> Self {
        Self {
            broad: Arc::clone(&primary),
            primary,
            grader,
            rewriter,
            generator,
            condenser: None,
            options: WorkflowOptions::default(),
        }
    }

    pub fn with_broad_store(mut self, broad: Arc<dyn ContextStore>) -> Self {
        self.broad = broad;
        self
    }

    pub fn with_condenser(mut self, condenser: Arc<dyn QuestionCondenser>) -> Self {
        self.condenser = Some(condenser);
        self
    }

    pub fn with_options(mut self, options: WorkflowOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &WorkflowOptions {
        &self.options
    }

    /// Run one request to completion.
    ///
    /// # Errors
    /// `AppError::Generation` if the answer cannot be produced. An empty
    /// question is rejected before any step runs.
    pub async fn run(&self, request: Request) -> AppResult<WorkflowOutcome> {
        if request.question.trim().is_empty() {
            return Err(AppError::Other("Question cannot be empty".to_string()));
        }

        let span = tracing::info_span!(
            "workflow",
            history_turns = request.chat_history.len(),
            primary = self.primary.name(),
            broad = self.broad.name(),
        );
        self.drive(request).instrument(span).await
    }

    /// Answer a question in a conversation and return the extended history.
    ///
    /// The recorded user turn holds the question as asked, with the
    /// metadata of the passages the answer used.
    pub async fn answer_turn(&self, question: &str, history: &ChatHistory) -> AppResult<TurnResult> {
        let outcome = self.run(Request::new(question, history.clone())).await?;

        let sources: Vec<Metadata> = outcome
            .documents
            .iter()
            .map(|p| p.metadata.clone())
            .collect();
        let history = history.with_exchange(&outcome.original_question, &outcome.answer, sources);

        Ok(TurnResult {
            answer: outcome.answer,
            documents: outcome.documents,
            history,
            path: outcome.path,
            degradations: outcome.degradations,
        })
    }

    async fn drive(&self, request: Request) -> AppResult<WorkflowOutcome> {
        let started = Instant::now();
        let deadline = self.options.deadline.map(|budget| started + budget);
        let original_question = request.question.clone();

        let mut state = WorkflowState::from_request(request);
        let mut path = Vec::new();
        let mut degradations = Vec::new();

        if let Some(condenser) = self.condenser.as_ref() {
            if !state.chat_history.is_empty() {
                let condensed =
                    within(deadline, condenser.condense(&state.question, &state.chat_history)).await;
                match condensed {
                    Some(Ok(standalone)) => {
                        tracing::debug!(standalone = %standalone, "Condensed follow-up question");
                        state = state.merge(StateUpdate::question(standalone));
                    }
                    Some(Err(e)) => {
                        tracing::warn!("Question condensation failed: {}", e);
                        degradations.push(Degradation::Condense(e.to_string()));
                    }
                    None => {
                        tracing::warn!("Deadline expired while condensing the question");
                        degradations.push(Degradation::Condense("deadline expired".to_string()));
                    }
                }
            }
        }

        let mut step = Step::Retrieve;
        let mut answer = None;
        let mut used = Vec::new();

        loop {
            path.push(step);
            tracing::debug!(%step, "Entering step");

            let next = match step {
                Step::Done => break,
                Step::Generate => {
                    let generation = self
                        .generator
                        .generate(&state.question, &state.chat_history, &state.documents)
                        .await
                        .map_err(|e| match e {
                            AppError::Generation(_) => e,
                            other => AppError::Generation(other.to_string()),
                        })?;
                    state = state.merge(StateUpdate::generation(generation.answer.clone()));
                    answer = Some(generation.answer);
                    used = generation.used_passages;
                    Step::Done
                }
                Step::Grade => {
                    let (update, absorbed) = self.grade(&state, deadline).await;
                    let expired = absorbed.contains(&Degradation::Deadline(Step::Grade));
                    state = state.merge(update);
                    degradations.extend(absorbed);
                    if expired {
                        Step::Generate
                    } else {
                        route(&state)
                    }
                }
                bounded => {
                    let output = within(deadline, self.run_step(bounded, &state)).await;
                    match output {
                        Some((update, absorbed)) => {
                            state = state.merge(update);
                            degradations.extend(absorbed);
                            match bounded {
                                Step::Retrieve => Step::Grade,
                                Step::Rewrite => Step::BroadenSearch,
                                _ => Step::Generate,
                            }
                        }
                        None => {
                            tracing::warn!(%bounded, "Deadline expired, skipping to generation");
                            degradations.push(Degradation::Deadline(bounded));
                            Step::Generate
                        }
                    }
                }
            };

            step = next;
        }

        let answer = answer.ok_or_else(|| AppError::Generation("No answer produced".to_string()))?;

        tracing::info!(
            path = ?path,
            documents = used.len(),
            degradations = degradations.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Workflow completed"
        );

        Ok(WorkflowOutcome {
            question: state.question,
            original_question,
            answer,
            documents: used,
            path,
            degradations,
        })
    }

    async fn run_step(&self, step: Step, state: &WorkflowState) -> StepOutput {
        match step {
            Step::Retrieve => self.retrieve(state).await,
            Step::Rewrite => self.rewrite(state).await,
            Step::BroadenSearch => self.broaden(state).await,
            // Grading tracks the deadline itself; the rest are terminal.
            Step::Grade | Step::Generate | Step::Done => (StateUpdate::default(), Vec::new()),
        }
    }

    async fn retrieve(&self, state: &WorkflowState) -> StepOutput {
        match self.primary.search(&state.question).await {
            Ok(documents) => {
                tracing::info!(count = documents.len(), "Retrieved passages");
                (StateUpdate::documents(documents), Vec::new())
            }
            Err(e) => {
                tracing::warn!("Retrieval failed, continuing without documents: {}", e);
                (
                    StateUpdate::documents(Vec::new()),
                    vec![Degradation::Retrieval(e.to_string())],
                )
            }
        }
    }

    /// Grade all passages with bounded concurrency, keeping retrieval order.
    ///
    /// Verdicts are recorded as they arrive. If the deadline cuts grading
    /// short, passages already judged relevant are kept and ungraded ones
    /// are dropped as not relevant.
    async fn grade(&self, state: &WorkflowState, deadline: Option<Instant>) -> StepOutput {
        let question = state.question.as_str();
        let limit = self.options.grading_concurrency.max(1);

        let mut verdicts: Vec<Option<AppResult<RelevanceVerdict>>> =
            state.documents.iter().map(|_| None).collect();

        let mut graded = std::pin::pin!(stream::iter(state.documents.iter().enumerate())
            .map(|(index, passage)| async move {
                (index, self.grader.grade(question, passage).await)
            })
            .buffer_unordered(limit));

        let finished = within(deadline, async {
            while let Some((index, verdict)) = graded.next().await {
                verdicts[index] = Some(verdict);
            }
        })
        .await
        .is_some();

        let mut kept = Vec::new();
        let mut degradations = Vec::new();
        let mut any_irrelevant = false;
        let mut ungraded = 0usize;

        for (index, (verdict, passage)) in verdicts.into_iter().zip(&state.documents).enumerate() {
            match verdict {
                Some(Ok(verdict)) if verdict.is_relevant() => kept.push(passage.clone()),
                Some(Ok(_)) => any_irrelevant = true,
                Some(Err(e)) => {
                    tracing::warn!(index, "Grading failed, treating passage as not relevant: {}", e);
                    degradations.push(Degradation::Grading {
                        index,
                        reason: e.to_string(),
                    });
                    any_irrelevant = true;
                }
                None => {
                    ungraded += 1;
                    any_irrelevant = true;
                }
            }
        }

        if !finished {
            tracing::warn!(
                ungraded,
                "Deadline expired during grading, dropping ungraded passages"
            );
            degradations.push(Degradation::Deadline(Step::Grade));
        }

        let needs_broader_search = state.documents.is_empty() || any_irrelevant;
        tracing::info!(
            retrieved = state.documents.len(),
            relevant = kept.len(),
            needs_broader_search,
            "Graded passages"
        );

        let update = StateUpdate {
            documents: Some(kept),
            needs_broader_search: Some(needs_broader_search),
            ..Default::default()
        };
        (update, degradations)
    }

    async fn rewrite(&self, state: &WorkflowState) -> StepOutput {
        match self.rewriter.rewrite(&state.question).await {
            Ok(rewritten) if !rewritten.trim().is_empty() => {
                tracing::info!(rewritten = %rewritten, "Rewrote question");
                (StateUpdate::question(rewritten.trim()), Vec::new())
            }
            Ok(_) => {
                tracing::warn!("Rewrite was empty, keeping the question");
                (
                    StateUpdate::default(),
                    vec![Degradation::Rewrite("empty rewrite".to_string())],
                )
            }
            Err(e) => {
                tracing::warn!("Rewrite failed, keeping the question: {}", e);
                (StateUpdate::default(), vec![Degradation::Rewrite(e.to_string())])
            }
        }
    }

    async fn broaden(&self, state: &WorkflowState) -> StepOutput {
        match self.broad.search(&state.question).await {
            Ok(results) => match Passage::combine_broadened(&results) {
                Some(combined) => {
                    tracing::info!(results = results.len(), "Broad search added context");
                    let mut documents = state.documents.clone();
                    documents.push(combined);
                    (StateUpdate::documents(documents), Vec::new())
                }
                None => {
                    tracing::info!("Broad search returned nothing");
                    (StateUpdate::default(), Vec::new())
                }
            },
            Err(e) => {
                tracing::warn!("Broad search failed: {}", e);
                (
                    StateUpdate::default(),
                    vec![Degradation::BroadenSearch(e.to_string())],
                )
            }
        }
    }
}

/// Await `future` unless the deadline passes first.
async fn within<F: Future>(deadline: Option<Instant>, future: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, future).await.ok(),
        None => Some(future.await),
    }
}
