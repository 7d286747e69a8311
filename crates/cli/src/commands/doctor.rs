use estoque_agent::prompt_hub::{load_react_prompt, PromptSource};
use estoque_core::config::{AppConfig, LoadOptions};
use estoque_db::{connect_with_settings, InventoryStore, SqlInventoryStore};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const DATABASE_CHECKS: [&str; 2] = ["database_connectivity", "inventory_schema"];

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult::raw(exit_code, output);
    }

    CommandResult::raw(exit_code, render_human(&report))
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.push(check_llm_credentials(&config));
            checks.extend(run_async_checks(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            let reason = "configuration did not load";
            checks.push(DoctorCheck::skipped("llm_credentials", reason));
            for name in DATABASE_CHECKS {
                checks.push(DoctorCheck::skipped(name, reason));
            }
            checks.push(DoctorCheck::skipped("prompt_asset", reason));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_credentials(config: &AppConfig) -> DoctorCheck {
    let provider = config.llm.provider;
    if !provider.requires_api_key() {
        return DoctorCheck::pass(
            "llm_credentials",
            format!("{} needs no api key ({})", provider.as_str(), config.llm.effective_base_url()),
        );
    }
    // Validation already rejected a missing key for hosted providers.
    DoctorCheck::pass(
        "llm_credentials",
        format!("api key present for {} model `{}`", provider.as_str(), config.llm.model),
    )
}

fn run_async_checks(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let details = format!("failed to initialize async runtime: {error}");
            let mut checks = DATABASE_CHECKS
                .iter()
                .map(|&name| DoctorCheck::fail(name, details.clone()))
                .collect::<Vec<_>>();
            checks.push(DoctorCheck::fail("prompt_asset", details));
            return checks;
        }
    };

    runtime.block_on(async {
        let mut checks = check_database(config).await;
        checks.push(check_prompt_asset(config).await);
        checks
    })
}

async fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let pool = match connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    {
        Ok(pool) => pool,
        Err(error) => {
            return vec![
                DoctorCheck::fail(
                    "database_connectivity",
                    format!("failed to connect to database: {error}"),
                ),
                DoctorCheck::skipped("inventory_schema", "the database is unreachable"),
            ];
        }
    };

    let store = SqlInventoryStore::new(pool.clone());
    let connectivity = match store.ping().await {
        Ok(()) => DoctorCheck::pass(
            "database_connectivity",
            format!("connected using `{}`", config.database.url),
        ),
        Err(error) => DoctorCheck::fail("database_connectivity", error.to_string()),
    };

    let schema = match store.list_tables().await {
        Ok(tables) if tables.is_empty() => DoctorCheck::fail(
            "inventory_schema",
            "database has no tables; run `estoque seed` for a demo catalog",
        ),
        Ok(tables) => {
            DoctorCheck::pass("inventory_schema", format!("tables: {}", tables.join(", ")))
        }
        Err(error) => DoctorCheck::fail("inventory_schema", error.to_string()),
    };

    pool.close().await;
    vec![connectivity, schema]
}

async fn check_prompt_asset(config: &AppConfig) -> DoctorCheck {
    let source = PromptSource::from_url(config.agent.react_prompt_url.as_deref());
    match load_react_prompt(&source, config.llm.timeout()).await {
        Ok(template) => DoctorCheck::pass(
            "prompt_asset",
            format!(
                "{} prompt with variables {}",
                source.describe(),
                template.input_variables().join(", ")
            ),
        ),
        Err(error) => DoctorCheck::fail("prompt_asset", error.to_string()),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
