use std::sync::Arc;

use estoque_agent::{AgentRuntime, RequestOutcome, RequestReport};
use estoque_db::{connect_with_settings, InventoryStore, SqlInventoryStore};

use crate::commands::{command_runtime, load_config, CommandResult};

/// Runs one question through the same pipeline the chat page uses.
pub fn run(question: &str, json_output: bool) -> CommandResult {
    let config = match load_config("ask") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match command_runtime("ask") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let store: Arc<dyn InventoryStore> = Arc::new(SqlInventoryStore::new(pool.clone()));
        let report = match AgentRuntime::assemble(&config, store).await {
            Ok(agent) => Ok(agent.handle(question).await),
            Err(error) => Err(("agent_assembly", error.to_string(), 5u8)),
        };
        pool.close().await;
        report
    });

    match result {
        Ok(report) => {
            let exit_code = if report.outcome.kind() == "error" { 1 } else { 0 };
            if json_output {
                let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
                    format!("{{\"error\":\"report serialization failed: {error}\"}}")
                });
                CommandResult::raw(exit_code, output)
            } else {
                CommandResult::raw(exit_code, render_human(&report))
            }
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("ask", error_class, message, exit_code)
        }
    }
}

fn render_human(report: &RequestReport) -> String {
    let body = match &report.outcome {
        RequestOutcome::Answer { text } => text.clone(),
        RequestOutcome::Unclear { message } | RequestOutcome::Warning { message } => {
            format!("aviso: {message}")
        }
        RequestOutcome::FallbackRows { query, rows, .. } => {
            format!("consulta direta `{query}`:\n{rows}")
        }
        RequestOutcome::Error { message } => message.clone(),
    };

    format!(
        "{body}\n\n[{}] {:.2}s, {} agent steps, id {}",
        report.outcome.kind(),
        report.elapsed_secs(),
        report.agent_steps,
        report.correlation_id
    )
}
