//! Query agent for inventory questions.
//!
//! A request flows through:
//! 1. **Prompt** (`estoque_core::prompt`) - the question is placed into the inventory template
//! 2. **Reasoning loop** (`executor`) - the model alternates SQL tool calls (`tools`) and
//!    observations until it emits a final answer or runs out of budget
//! 3. **Sanitizing** (`guardrails`) - sentences leaking execution chatter are dropped
//! 4. **Fallback** (`fallback`) - when the loop raises, a keyword-chosen query runs directly
//!
//! `runtime::AgentRuntime` ties these together and owns the model and store handles.
//!
//! The model never touches the database directly: every statement goes through
//! the toolkit, and its text is shown to users only after sanitizing.

pub mod executor;
pub mod fallback;
pub mod guardrails;
pub mod llm;
pub mod prompt_hub;
pub mod react;
pub mod runtime;
pub mod tools;

pub use executor::{AgentExecutor, AgentOutcome, AgentResult, ExecutionLimits};
pub use guardrails::ResponseSanitizer;
pub use llm::{HttpLlmClient, LlmClient, ScriptedLlmClient};
pub use runtime::{AgentRuntime, RequestOutcome, RequestReport};
