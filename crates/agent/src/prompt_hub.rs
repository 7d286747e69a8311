//! The reasoning-loop prompt, either the bundled ReAct template or one fetched
//! at startup. A remote template that cannot be fetched stops the process.

use std::time::Duration;

use estoque_core::errors::DomainError;
use estoque_core::PromptTemplate;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

pub const REACT_VARIABLES: [&str; 4] = ["tools", "tool_names", "input", "agent_scratchpad"];

pub const REACT_TEMPLATE: &str = "Answer the following questions as best you can. You have access to the following tools:

{tools}

Use the following format:

Question: the input question you must answer
Thought: you should always think about what to do
Action: the action to take, should be one of [{tool_names}]
Action Input: the input to the action
Observation: the result of the action
... (this Thought/Action/Action Input/Observation can repeat N times)
Thought: I now know the final answer
Final Answer: the final answer to the original input question

Begin!

Question: {input}
Thought:{agent_scratchpad}";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromptSource {
    Builtin,
    Remote(String),
}

impl PromptSource {
    pub fn from_url(url: Option<&str>) -> Self {
        match url.map(str::trim).filter(|url| !url.is_empty()) {
            Some(url) => Self::Remote(url.to_string()),
            None => Self::Builtin,
        }
    }

    pub fn describe(&self) -> &str {
        match self {
            Self::Builtin => "builtin",
            Self::Remote(url) => url,
        }
    }
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error("could not fetch prompt template from `{url}`: {source}")]
    Fetch { url: String, source: reqwest::Error },
    #[error("prompt template endpoint `{url}` answered HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("prompt template payload has no template text")]
    MissingTemplate,
    #[error("prompt template is missing the `{{{0}}}` variable")]
    MissingVariable(&'static str),
    #[error(transparent)]
    Template(#[from] DomainError),
}

pub async fn load_react_prompt(
    source: &PromptSource,
    timeout: Duration,
) -> Result<PromptTemplate, HubError> {
    let template = match source {
        PromptSource::Builtin => PromptTemplate::from_template(REACT_TEMPLATE)?,
        PromptSource::Remote(url) => {
            let body = fetch(url, timeout).await?;
            parse_prompt_body(&body)?
        }
    };

    info!(
        event_name = "agent.prompt.loaded",
        source = source.describe(),
        variables = ?template.input_variables(),
        "react prompt loaded"
    );
    Ok(template)
}

async fn fetch(url: &str, timeout: Duration) -> Result<String, HubError> {
    let fetch_error = |source| HubError::Fetch { url: url.to_string(), source };
    let client = reqwest::Client::builder().timeout(timeout).build().map_err(fetch_error)?;
    let response = client.get(url).send().await.map_err(fetch_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(HubError::Status { url: url.to_string(), status: status.as_u16() });
    }
    response.text().await.map_err(fetch_error)
}

/// Accepts plain template text, `{"template": ...}`, or a serialized prompt
/// manifest carrying the template under `manifest.kwargs.template`.
pub fn parse_prompt_body(body: &str) -> Result<PromptTemplate, HubError> {
    let text = match serde_json::from_str::<Value>(body) {
        Ok(value @ Value::Object(_)) => extract_template(&value)
            .map(str::to_string)
            .ok_or(HubError::MissingTemplate)?,
        _ => body.to_string(),
    };
    if text.trim().is_empty() {
        return Err(HubError::MissingTemplate);
    }

    let template = PromptTemplate::from_template(&text)?;
    for variable in REACT_VARIABLES {
        if !template.input_variables().iter().any(|name| name == variable) {
            return Err(HubError::MissingVariable(variable));
        }
    }
    Ok(template)
}

fn extract_template(value: &Value) -> Option<&str> {
    value
        .get("template")
        .or_else(|| value.pointer("/manifest/kwargs/template"))
        .or_else(|| value.pointer("/kwargs/template"))
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{
        load_react_prompt, parse_prompt_body, HubError, PromptSource, REACT_TEMPLATE,
        REACT_VARIABLES,
    };

    #[tokio::test]
    async fn builtin_template_exposes_the_react_variables() {
        let template = load_react_prompt(&PromptSource::Builtin, Duration::from_secs(1))
            .await
            .expect("builtin template");
        for variable in REACT_VARIABLES {
            assert!(template.input_variables().iter().any(|name| name == variable));
        }
    }

    #[test]
    fn json_payloads_are_unwrapped() {
        let wrapped = serde_json::json!({ "template": REACT_TEMPLATE }).to_string();
        assert!(parse_prompt_body(&wrapped).is_ok());

        let manifest =
            serde_json::json!({ "manifest": { "kwargs": { "template": REACT_TEMPLATE } } })
                .to_string();
        assert!(parse_prompt_body(&manifest).is_ok());

        assert!(matches!(
            parse_prompt_body(r#"{"other": 1}"#),
            Err(HubError::MissingTemplate)
        ));
    }

    #[test]
    fn templates_without_scratchpad_are_rejected() {
        let error = parse_prompt_body("Tools: {tools} [{tool_names}]\nQuestion: {input}")
            .expect_err("scratchpad missing");
        assert!(matches!(error, HubError::MissingVariable("agent_scratchpad")));
    }

    #[tokio::test]
    async fn unreachable_remote_template_is_fatal() {
        let source = PromptSource::from_url(Some("http://127.0.0.1:9/react"));
        assert_eq!(source, PromptSource::Remote("http://127.0.0.1:9/react".to_string()));

        let error = load_react_prompt(&source, Duration::from_millis(500))
            .await
            .expect_err("nothing listens on the discard port");
        assert!(matches!(error, HubError::Fetch { .. }));
    }

    #[test]
    fn blank_url_means_builtin() {
        assert_eq!(PromptSource::from_url(Some("  ")), PromptSource::Builtin);
        assert_eq!(PromptSource::from_url(None).describe(), "builtin");
    }
}
