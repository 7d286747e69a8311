use std::env;
use std::fs;
use std::path::Path;

use estoque_core::config::{resolve_config_path, AppConfig, LoadOptions, BUILTIN_PROMPT};
use toml::Value;

use crate::commands::CommandResult;

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|value| value.to_string()).unwrap_or_else(|| "<unset>".to_string())
}

type Entry = (&'static str, String, &'static [&'static str]);

fn row(key: &'static str, value: String, env_keys: &'static [&'static str]) -> Entry {
    (key, value, env_keys)
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let origin = Origin { doc: config_file_doc.as_ref(), path: config_file_path.as_deref() };

    let api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    let entries = vec![
        row("database.url", config.database.url.clone(), &["ESTOQUE_DATABASE_URL"]),
        row(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["ESTOQUE_DATABASE_MAX_CONNECTIONS"],
        ),
        row(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["ESTOQUE_DATABASE_TIMEOUT_SECS"],
        ),
        row("llm.provider", config.llm.provider.as_str().to_string(), &["ESTOQUE_LLM_PROVIDER"]),
        row("llm.model", config.llm.model.clone(), &["ESTOQUE_LLM_MODEL"]),
        row("llm.base_url", config.llm.effective_base_url().to_string(), &["ESTOQUE_LLM_BASE_URL"]),
        row(
            "llm.api_key",
            api_key.to_string(),
            &["ESTOQUE_LLM_API_KEY", "GROQ_API_KEY", "OPENAI_API_KEY", "ANTHROPIC_API_KEY"],
        ),
        row("llm.temperature", config.llm.temperature.to_string(), &["ESTOQUE_LLM_TEMPERATURE"]),
        row("llm.max_tokens", config.llm.max_tokens.to_string(), &["ESTOQUE_LLM_MAX_TOKENS"]),
        row("llm.timeout_secs", config.llm.timeout_secs.to_string(), &["ESTOQUE_LLM_TIMEOUT_SECS"]),
        row("llm.max_retries", config.llm.max_retries.to_string(), &["ESTOQUE_LLM_MAX_RETRIES"]),
        row(
            "agent.max_iterations",
            optional(config.agent.max_iterations),
            &["ESTOQUE_AGENT_MAX_ITERATIONS"],
        ),
        row(
            "agent.max_execution_secs",
            optional(config.agent.max_execution_secs),
            &["ESTOQUE_AGENT_MAX_EXECUTION_SECS"],
        ),
        row(
            "agent.handle_parsing_errors",
            config.agent.handle_parsing_errors.to_string(),
            &["ESTOQUE_AGENT_HANDLE_PARSING_ERRORS"],
        ),
        row(
            "agent.fallback_enabled",
            config.agent.fallback_enabled.to_string(),
            &["ESTOQUE_AGENT_FALLBACK_ENABLED"],
        ),
        row(
            "agent.react_prompt_url",
            config.agent.react_prompt_url.clone().unwrap_or_else(|| BUILTIN_PROMPT.to_string()),
            &["ESTOQUE_AGENT_REACT_PROMPT_URL"],
        ),
        row(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["ESTOQUE_SERVER_BIND_ADDRESS"],
        ),
        row("server.port", config.server.port.to_string(), &["ESTOQUE_SERVER_PORT"]),
        row(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["ESTOQUE_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        row(
            "logging.level",
            config.logging.level.clone(),
            &["ESTOQUE_LOGGING_LEVEL", "ESTOQUE_LOG_LEVEL"],
        ),
        row(
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            &["ESTOQUE_LOGGING_FORMAT", "ESTOQUE_LOG_FORMAT"],
        ),
    ];

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        entries
            .into_iter()
            .map(|(key, value, env_keys)| render_line(key, &value, origin.source(key, env_keys))),
    );

    CommandResult::raw(0, lines.join("\n"))
}

struct Origin<'a> {
    doc: Option<&'a Value>,
    path: Option<&'a Path>,
}

impl Origin<'_> {
    fn source(&self, key_path: &str, env_keys: &[&str]) -> String {
        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
