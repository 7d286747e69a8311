use std::sync::Arc;
use std::time::{Duration, Instant};

use estoque_core::config::AgentConfig;
use estoque_core::errors::DomainError;
use estoque_core::{PromptTemplate, RenderedPrompt};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::llm::{LlmClient, LlmError};
use crate::react::{parse_react_output, AgentAction, AgentDecision, OutputParseError};
use crate::tools::ToolRegistry;

pub const OBSERVATION_STOP: &str = "\nObservation";
pub const STOPPED_OUTPUT: &str = "Agent stopped due to iteration limit or time limit.";
const PARSE_ERROR_TOOL: &str = "_Exception";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// `None` means no iteration cap.
    pub max_iterations: Option<u32>,
    /// `None` means no wall-clock cap.
    pub max_execution_time: Option<Duration>,
    pub handle_parsing_errors: bool,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_iterations: Some(10),
            max_execution_time: Some(Duration::from_secs(120)),
            handle_parsing_errors: true,
        }
    }
}

impl From<&AgentConfig> for ExecutionLimits {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            max_execution_time: config.max_execution_time(),
            handle_parsing_errors: config.handle_parsing_errors,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AgentStep {
    pub action: AgentAction,
    pub observation: String,
}

/// Final answer plus the reasoning trace that led to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AgentResult {
    pub output: String,
    pub intermediate_steps: Vec<AgentStep>,
}

impl AgentResult {
    pub fn stopped_by_budget(&self) -> bool {
        self.output == STOPPED_OUTPUT
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    OutputParse(#[from] OutputParseError),
    #[error("could not render agent prompt: {0}")]
    Prompt(#[from] DomainError),
}

#[derive(Debug)]
pub enum AgentOutcome {
    Success(AgentResult),
    Failure(AgentError),
}

impl From<Result<AgentResult, AgentError>> for AgentOutcome {
    fn from(result: Result<AgentResult, AgentError>) -> Self {
        match result {
            Ok(result) => Self::Success(result),
            Err(error) => Self::Failure(error),
        }
    }
}

pub struct AgentExecutor {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    prompt: PromptTemplate,
    limits: ExecutionLimits,
}

impl AgentExecutor {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: ToolRegistry,
        prompt: PromptTemplate,
        limits: ExecutionLimits,
    ) -> Self {
        Self { llm, tools, prompt, limits }
    }

    pub fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub async fn invoke(&self, input: &RenderedPrompt) -> Result<AgentResult, AgentError> {
        let started = Instant::now();
        let tool_descriptions = self.tools.render_descriptions();
        let tool_names = self.tools.names().join(", ");
        let mut steps: Vec<AgentStep> = Vec::new();
        let mut iterations = 0u32;

        while self.should_continue(iterations, started.elapsed()) {
            let scratchpad = render_scratchpad(&steps);
            let prompt = self.prompt.format([
                ("tools", tool_descriptions.as_str()),
                ("tool_names", tool_names.as_str()),
                ("input", input.as_str()),
                ("agent_scratchpad", scratchpad.as_str()),
            ])?;

            let call = self.llm.complete(&prompt, &[OBSERVATION_STOP]);
            let completion = match self.remaining(started.elapsed()) {
                Some(remaining) => match tokio::time::timeout(remaining, call).await {
                    Ok(completion) => completion?,
                    Err(_) => break,
                },
                None => call.await?,
            };

            let step = match parse_react_output(&completion) {
                Ok(AgentDecision::Finish(finish)) => {
                    info!(
                        event_name = "agent.loop.finished",
                        iterations,
                        steps = steps.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "agent produced a final answer"
                    );
                    return Ok(AgentResult { output: finish.output, intermediate_steps: steps });
                }
                Ok(AgentDecision::Action(action)) => {
                    let observation = self.run_tool(&action).await;
                    AgentStep { action, observation }
                }
                Err(error) if self.limits.handle_parsing_errors => {
                    warn!(
                        event_name = "agent.loop.parse_error",
                        iterations,
                        error = %error,
                        "model output could not be parsed, feeding the error back"
                    );
                    AgentStep {
                        observation: error.feedback().to_string(),
                        action: AgentAction {
                            tool: PARSE_ERROR_TOOL.to_string(),
                            tool_input: error.feedback().to_string(),
                            log: error.llm_output,
                        },
                    }
                }
                Err(error) => return Err(error.into()),
            };

            steps.push(step);
            iterations += 1;
        }

        warn!(
            event_name = "agent.loop.budget_exhausted",
            iterations,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "agent stopped before producing a final answer"
        );
        Ok(AgentResult { output: STOPPED_OUTPUT.to_string(), intermediate_steps: steps })
    }

    fn should_continue(&self, iterations: u32, elapsed: Duration) -> bool {
        let under_iterations = self.limits.max_iterations.map_or(true, |max| iterations < max);
        let under_time = self.limits.max_execution_time.map_or(true, |max| elapsed < max);
        under_iterations && under_time
    }

    fn remaining(&self, elapsed: Duration) -> Option<Duration> {
        self.limits.max_execution_time.map(|max| max.saturating_sub(elapsed))
    }

    async fn run_tool(&self, action: &AgentAction) -> String {
        let Some(tool) = self.tools.get(&action.tool) else {
            debug!(
                event_name = "agent.tool.unknown",
                tool = %action.tool,
                "unknown tool requested"
            );
            return format!(
                "{} is not a valid tool, try one of [{}].",
                action.tool,
                self.tools.names().join(", ")
            );
        };

        match tool.execute(&action.tool_input).await {
            Ok(observation) => {
                debug!(
                    event_name = "agent.tool.completed",
                    tool = tool.name(),
                    chars = observation.len(),
                    "tool call completed"
                );
                observation
            }
            Err(error) => {
                debug!(
                    event_name = "agent.tool.failed",
                    tool = tool.name(),
                    error = %error,
                    "tool call failed"
                );
                format!("Error: {error}")
            }
        }
    }
}

/// Previous steps as the model wrote them, each followed by its observation.
pub fn render_scratchpad(steps: &[AgentStep]) -> String {
    let mut scratchpad = String::new();
    for step in steps {
        scratchpad.push_str(&step.action.log);
        scratchpad.push_str("\nObservation: ");
        scratchpad.push_str(&step.observation);
        scratchpad.push_str("\nThought: ");
    }
    scratchpad
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use estoque_core::{PromptTemplate, RenderedPrompt};
    use estoque_db::{InMemoryInventoryStore, QueryResult, SqlValue};

    use super::{AgentError, AgentExecutor, ExecutionLimits, STOPPED_OUTPUT};
    use crate::llm::ScriptedLlmClient;
    use crate::prompt_hub::REACT_TEMPLATE;
    use crate::react::MISSING_ACTION_AFTER_THOUGHT;
    use crate::tools::sql_toolkit;

    fn store() -> Arc<InMemoryInventoryStore> {
        Arc::new(InMemoryInventoryStore::new().with_result(
            "SELECT COUNT(*) FROM produtos",
            QueryResult::new(vec!["COUNT(*)".into()], vec![vec![SqlValue::Integer(7)]]),
        ))
    }

    fn executor(llm: Arc<ScriptedLlmClient>, limits: ExecutionLimits) -> AgentExecutor {
        let template = PromptTemplate::from_template(REACT_TEMPLATE).expect("template");
        AgentExecutor::new(llm.clone(), sql_toolkit(store(), llm), template, limits)
    }

    fn input() -> RenderedPrompt {
        RenderedPrompt::new("Quantos produtos existem?")
    }

    #[tokio::test]
    async fn tool_observation_feeds_the_next_prompt() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .with_reply(
                    " Preciso contar.\nAction: sql_db_query\nAction Input: SELECT COUNT(*) FROM produtos",
                )
                .with_reply(" I now know the final answer\nFinal Answer: Existem 7 produtos."),
        );
        let result =
            executor(llm.clone(), ExecutionLimits::default()).invoke(&input()).await.expect("ok");

        assert_eq!(result.output, "Existem 7 produtos.");
        assert_eq!(result.intermediate_steps.len(), 1);
        assert_eq!(result.intermediate_steps[0].observation, "[(7,)]");

        let prompts = llm.prompts().await;
        assert!(prompts[0].contains("Question: Quantos produtos existem?"));
        assert!(prompts[0].ends_with("Thought:"));
        assert!(prompts[1].ends_with("\nObservation: [(7,)]\nThought: "));
    }

    #[tokio::test]
    async fn unknown_tools_and_tool_errors_become_observations() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .with_reply("Action: sql_db_magic\nAction Input: x")
                .with_reply("Action: sql_db_query\nAction Input: SELECT * FROM clientes")
                .with_reply("Final Answer: Não encontrei clientes."),
        );
        let result =
            executor(llm, ExecutionLimits::default()).invoke(&input()).await.expect("ok");

        let observations = result
            .intermediate_steps
            .iter()
            .map(|step| step.observation.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            observations[0],
            "sql_db_magic is not a valid tool, try one of [sql_db_query, sql_db_schema, \
             sql_db_list_tables, sql_db_query_checker]."
        );
        assert!(observations[1].starts_with("Error: "));
    }

    #[tokio::test]
    async fn parse_errors_are_retried_when_tolerated() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .with_reply("Acho que são sete.")
                .with_reply("Final Answer: São sete."),
        );
        let result =
            executor(llm.clone(), ExecutionLimits::default()).invoke(&input()).await.expect("ok");

        assert_eq!(result.output, "São sete.");
        assert_eq!(result.intermediate_steps[0].action.tool, "_Exception");
        let prompts = llm.prompts().await;
        assert!(prompts[1].contains("Acho que são sete.\nObservation: Invalid Format"));
    }

    #[tokio::test]
    async fn empty_completion_is_fed_back_as_a_parse_error() {
        let llm = Arc::new(ScriptedLlmClient::new().with_reply("").with_reply("Final Answer: ok"));
        let result =
            executor(llm.clone(), ExecutionLimits::default()).invoke(&input()).await.expect("ok");

        assert_eq!(result.output, "ok");
        assert_eq!(result.intermediate_steps.len(), 1);
        assert_eq!(result.intermediate_steps[0].action.tool, "_Exception");
        assert_eq!(result.intermediate_steps[0].observation, MISSING_ACTION_AFTER_THOUGHT);
        assert_eq!(llm.calls().await, 2);
    }

    #[tokio::test]
    async fn parse_errors_fail_the_run_when_not_tolerated() {
        let llm = Arc::new(ScriptedLlmClient::new().with_reply("Acho que são sete."));
        let limits = ExecutionLimits { handle_parsing_errors: false, ..ExecutionLimits::default() };

        let error = executor(llm, limits).invoke(&input()).await.expect_err("should fail");
        assert!(matches!(error, AgentError::OutputParse(_)));
    }

    #[tokio::test]
    async fn iteration_budget_returns_the_stopped_message() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .with_reply("Action: sql_db_list_tables\nAction Input: ")
                .with_reply("Action: sql_db_list_tables\nAction Input: ")
                .with_reply("Final Answer: tarde demais"),
        );
        let limits = ExecutionLimits { max_iterations: Some(2), ..ExecutionLimits::default() };

        let result = executor(llm.clone(), limits).invoke(&input()).await.expect("ok");
        assert_eq!(result.output, STOPPED_OUTPUT);
        assert!(result.stopped_by_budget());
        assert_eq!(result.intermediate_steps.len(), 2);
        assert_eq!(llm.calls().await, 2);
    }

    #[tokio::test]
    async fn wall_clock_budget_interrupts_a_slow_model() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .with_reply("Final Answer: lento")
                .with_delay(Duration::from_millis(500)),
        );
        let limits = ExecutionLimits {
            max_execution_time: Some(Duration::from_millis(50)),
            ..ExecutionLimits::default()
        };

        let result = executor(llm, limits).invoke(&input()).await.expect("ok");
        assert_eq!(result.output, STOPPED_OUTPUT);
    }

    #[tokio::test]
    async fn llm_failure_raises() {
        let llm = Arc::new(ScriptedLlmClient::new().with_failure("rate limited"));
        let error =
            executor(llm, ExecutionLimits::default()).invoke(&input()).await.expect_err("raises");
        assert!(matches!(error, AgentError::Llm(_)));
    }
}
