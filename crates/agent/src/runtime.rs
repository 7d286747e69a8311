use std::sync::Arc;
use std::time::Instant;

use estoque_core::config::{AgentConfig, AppConfig};
use estoque_core::errors::DomainError;
use estoque_core::{
    PromptBuilder, PromptTemplate, Question, RequestEvent, RequestFlow, RequestState,
};
use estoque_db::{InventoryStore, QueryResult};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::executor::{AgentExecutor, AgentOutcome, ExecutionLimits};
use crate::fallback::FallbackQuery;
use crate::guardrails::{ResponseSanitizer, SanitizedAnswer, EMPTY_ANSWER_MESSAGE};
use crate::llm::{HttpLlmClient, LlmClient, LlmError};
use crate::prompt_hub::{load_react_prompt, HubError, PromptSource};
use crate::tools::sql_toolkit;

pub const MISSING_QUESTION_MESSAGE: &str = "Por favor, insira uma pergunta.";

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    PromptAsset(#[from] HubError),
    #[error(transparent)]
    Prompt(#[from] DomainError),
}

/// What the user gets to see for one question.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestOutcome {
    /// Sanitized agent answer, rendered as markdown.
    Answer { text: String },
    /// The agent answered but nothing survived sanitizing.
    Unclear { message: String },
    /// No question was given; the agent was never called.
    Warning { message: String },
    /// Raw rows from the fallback query, shown without any synthesis.
    FallbackRows { query: String, rows: String, result: QueryResult, agent_error: String },
    Error { message: String },
}

impl RequestOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Answer { .. } => "answer",
            Self::Unclear { .. } => "unclear",
            Self::Warning { .. } => "warning",
            Self::FallbackRows { .. } => "fallback_rows",
            Self::Error { .. } => "error",
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Answer { text } => text,
            Self::FallbackRows { rows, .. } => rows,
            Self::Unclear { message } | Self::Warning { message } | Self::Error { message } => {
                message
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RequestReport {
    pub correlation_id: String,
    pub outcome: RequestOutcome,
    pub elapsed_ms: u64,
    pub agent_steps: usize,
    pub path: Vec<RequestState>,
}

impl RequestReport {
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_ms as f64 / 1000.0
    }
}

/// Request handling context. Owns every handle a request needs; nothing is global.
pub struct AgentRuntime {
    prompt_builder: PromptBuilder,
    executor: AgentExecutor,
    store: Arc<dyn InventoryStore>,
    sanitizer: ResponseSanitizer,
    fallback_enabled: bool,
}

impl AgentRuntime {
    pub fn new(
        prompt_builder: PromptBuilder,
        executor: AgentExecutor,
        store: Arc<dyn InventoryStore>,
        sanitizer: ResponseSanitizer,
        fallback_enabled: bool,
    ) -> Self {
        Self { prompt_builder, executor, store, sanitizer, fallback_enabled }
    }

    /// Builds the HTTP model client and loads the reasoning prompt from config.
    pub async fn assemble(
        config: &AppConfig,
        store: Arc<dyn InventoryStore>,
    ) -> Result<Self, AssembleError> {
        let llm: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::from_config(&config.llm)?);
        let source = PromptSource::from_url(config.agent.react_prompt_url.as_deref());
        let react_prompt = load_react_prompt(&source, config.llm.timeout()).await?;
        Ok(Self::from_parts(&config.agent, llm, store, react_prompt)?)
    }

    pub fn from_parts(
        config: &AgentConfig,
        llm: Arc<dyn LlmClient>,
        store: Arc<dyn InventoryStore>,
        react_prompt: PromptTemplate,
    ) -> Result<Self, DomainError> {
        let tools = sql_toolkit(store.clone(), llm.clone());
        let executor = AgentExecutor::new(llm, tools, react_prompt, ExecutionLimits::from(config));
        Ok(Self::new(
            PromptBuilder::inventory()?,
            executor,
            store,
            ResponseSanitizer::default(),
            config.fallback_enabled,
        ))
    }

    pub fn limits(&self) -> ExecutionLimits {
        self.executor.limits()
    }

    pub fn fallback_enabled(&self) -> bool {
        self.fallback_enabled
    }

    /// Runs one question to a terminal state. Never fails: every error ends up
    /// in the returned outcome.
    pub async fn handle(&self, raw_question: &str) -> RequestReport {
        let correlation_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let mut request = Request { flow: RequestFlow::new(), correlation_id: &correlation_id };

        let (outcome, agent_steps) = self.run(raw_question, &mut request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            event_name = "request.completed",
            correlation_id = %correlation_id,
            outcome = outcome.kind(),
            state = ?request.flow.state(),
            agent_steps,
            elapsed_ms,
            "request completed"
        );

        let path = request.flow.path();
        RequestReport { correlation_id, outcome, elapsed_ms, agent_steps, path }
    }

    async fn run(&self, raw_question: &str, request: &mut Request<'_>) -> (RequestOutcome, usize) {
        let question = match Question::parse(raw_question) {
            Ok(question) => question,
            Err(_) => {
                request.advance(RequestEvent::QuestionMissing);
                let message = MISSING_QUESTION_MESSAGE.to_string();
                return (RequestOutcome::Warning { message }, 0);
            }
        };

        request.advance(RequestEvent::QuestionAccepted);
        request.advance(RequestEvent::AgentStarted);
        info!(
            event_name = "agent.invoke.started",
            correlation_id = %request.correlation_id,
            question_chars = question.as_str().chars().count(),
            "agent invocation started"
        );

        let outcome: AgentOutcome = match self.prompt_builder.build(&question) {
            Ok(prompt) => self.executor.invoke(&prompt).await.into(),
            Err(error) => AgentOutcome::Failure(error.into()),
        };

        match outcome {
            AgentOutcome::Success(result) => {
                request.advance(RequestEvent::AgentCompleted);
                let sanitized = self.sanitizer.sanitize(&result.output);
                request.advance(RequestEvent::AnswerSanitized);
                request.advance(RequestEvent::AnswerRendered);

                let outcome = match sanitized {
                    SanitizedAnswer::Clean(text) => RequestOutcome::Answer { text },
                    SanitizedAnswer::Empty => {
                        RequestOutcome::Unclear { message: EMPTY_ANSWER_MESSAGE.to_string() }
                    }
                };
                (outcome, result.intermediate_steps.len())
            }
            AgentOutcome::Failure(agent_error) => {
                request.advance(RequestEvent::AgentRaised);
                warn!(
                    event_name = "agent.invoke.failed",
                    correlation_id = %request.correlation_id,
                    error = %agent_error,
                    fallback_enabled = self.fallback_enabled,
                    "agent invocation failed"
                );

                if !self.fallback_enabled {
                    request.advance(RequestEvent::FallbackSkipped);
                    return (RequestOutcome::Error { message: format!("Erro: {agent_error}") }, 0);
                }

                (self.run_fallback(&question, agent_error.to_string(), request).await, 0)
            }
        }
    }

    async fn run_fallback(
        &self,
        question: &Question,
        agent_error: String,
        request: &mut Request<'_>,
    ) -> RequestOutcome {
        request.advance(RequestEvent::FallbackStarted);
        let query = FallbackQuery::select(question);

        match self.store.run(query.sql()).await {
            Ok(result) => {
                request.advance(RequestEvent::FallbackCompleted);
                request.advance(RequestEvent::RowsRendered);
                info!(
                    event_name = "fallback.query.completed",
                    correlation_id = %request.correlation_id,
                    query = ?query,
                    rows = result.rows.len(),
                    "fallback query answered"
                );
                RequestOutcome::FallbackRows {
                    query: query.sql().to_string(),
                    rows: result.to_string(),
                    result,
                    agent_error,
                }
            }
            Err(store_error) => {
                request.advance(RequestEvent::FallbackRaised);
                request.advance(RequestEvent::ErrorRendered);
                error!(
                    event_name = "fallback.query.failed",
                    correlation_id = %request.correlation_id,
                    query = ?query,
                    error = %store_error,
                    "fallback query failed"
                );
                RequestOutcome::Error { message: format!("Erro: {store_error}") }
            }
        }
    }
}

struct Request<'a> {
    flow: RequestFlow,
    correlation_id: &'a str,
}

impl Request<'_> {
    fn advance(&mut self, event: RequestEvent) {
        if let Err(transition_error) = self.flow.apply(event) {
            error!(
                event_name = "request.flow.invalid_transition",
                correlation_id = %self.correlation_id,
                error = %transition_error,
                "request flow rejected a transition"
            );
        }
    }
}
