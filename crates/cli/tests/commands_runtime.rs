use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use estoque_cli::commands::{ask, config, doctor, seed};
use serde_json::Value;

// Nothing listens on the discard port, so every model call fails fast.
const UNREACHABLE_MODEL: &str = "http://127.0.0.1:9/v1";

#[test]
fn seed_creates_the_demo_catalog_in_a_fresh_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    with_env(&offline_env(dir.path()), || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected seed success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("7 new of 7 demo products, 7 rows in table"), "{message}");
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    with_env(&offline_env(dir.path()), || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        let payload = parse_payload(&second.output);
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("0 new of 7 demo products, 7 rows in table"), "{message}");
    });
}

#[test]
fn seed_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("ESTOQUE_DATABASE_URL", "postgres://localhost/estoque")], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn ask_falls_back_to_raw_rows_when_the_model_is_unreachable() {
    let dir = tempfile::tempdir().expect("tempdir");
    with_env(&offline_env(dir.path()), || {
        assert_eq!(seed::run().exit_code, 0);

        let result = ask::run("Qual produto vende mais?", true);
        assert_eq!(result.exit_code, 0, "fallback rows are a successful outcome");

        let report = parse_payload(&result.output);
        assert_eq!(report["outcome"]["kind"], "fallback_rows");
        assert_eq!(
            report["outcome"]["query"],
            "SELECT * FROM produtos ORDER BY vendas DESC LIMIT 5"
        );
        let rows = report["outcome"]["rows"].as_str().unwrap_or_default();
        assert!(rows.starts_with("[(6, 'Marca-texto'"), "{rows}");
        assert_eq!(report["path"].as_array().map(Vec::len), Some(7));
    });
}

#[test]
fn ask_with_empty_question_only_warns() {
    let dir = tempfile::tempdir().expect("tempdir");
    with_env(&offline_env(dir.path()), || {
        assert_eq!(seed::run().exit_code, 0);

        let result = ask::run("", false);
        assert_eq!(result.exit_code, 0);
        assert!(result.output.starts_with("aviso: Por favor, insira uma pergunta."));
        assert!(result.output.contains("[warning]"));
    });
}

#[test]
fn ask_surfaces_agent_error_when_fallback_is_disabled() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut vars = offline_env(dir.path());
    vars.push(("ESTOQUE_AGENT_FALLBACK_ENABLED", "false".to_string()));
    with_env(&vars, || {
        assert_eq!(seed::run().exit_code, 0);

        let result = ask::run("Qual produto vende mais?", true);
        assert_eq!(result.exit_code, 1);
        let report = parse_payload(&result.output);
        assert_eq!(report["outcome"]["kind"], "error");
        assert!(report["outcome"]["message"].as_str().unwrap_or_default().starts_with("Erro: "));
    });
}

#[test]
fn ask_requires_an_existing_database_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    with_env(&offline_env(dir.path()), || {
        let result = ask::run("Qual produto vende mais?", true);
        assert_eq!(result.exit_code, 4);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "ask");
        assert_eq!(payload["error_class"], "db_connectivity");
    });
}

#[test]
fn doctor_passes_against_a_seeded_catalog() {
    let dir = tempfile::tempdir().expect("tempdir");
    with_env(&offline_env(dir.path()), || {
        let before = doctor::run(true);
        assert_eq!(before.exit_code, 1, "missing database file should fail doctor");

        assert_eq!(seed::run().exit_code, 0);
        let after = doctor::run(true);
        assert_eq!(after.exit_code, 0, "{}", after.output);

        let report = parse_payload(&after.output);
        assert_eq!(report["overall_status"], "pass");
        let names = report["checks"]
            .as_array()
            .map(|checks| checks.iter().map(|check| check["name"].clone()).collect::<Vec<_>>())
            .unwrap_or_default();
        assert_eq!(
            names,
            vec![
                "config_validation",
                "llm_credentials",
                "database_connectivity",
                "inventory_schema",
                "prompt_asset"
            ]
        );
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[("ESTOQUE_LLM_PROVIDER", "groq")], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [fail] config_validation: "));
        assert!(result.output.contains("- [skip] prompt_asset: "));
    });
}

#[test]
fn config_attributes_values_to_their_source() {
    with_env(&[("ESTOQUE_LLM_MODEL", "llama3-70b-8192"), ("GROQ_API_KEY", "gsk-test")], || {
        let result = config::run();
        assert_eq!(result.exit_code, 0);
        assert!(result
            .output
            .contains("- llm.model = llama3-70b-8192 (source: env (ESTOQUE_LLM_MODEL))"));
        assert!(result.output.contains("- llm.api_key = <redacted> (source: env (GROQ_API_KEY))"));
        assert!(result.output.contains("- server.port = 8501 (source: default)"));
        assert!(result.output.contains(
            "- agent.react_prompt_url = https://api.hub.langchain.com/commits/hwchase17/react/latest"
        ));
        assert!(!result.output.contains("gsk-test"));
    });
}

fn offline_env(dir: &Path) -> Vec<(&'static str, String)> {
    vec![
        ("ESTOQUE_DATABASE_URL", format!("sqlite://{}", dir.join("estoque.db").display())),
        ("ESTOQUE_DATABASE_MAX_CONNECTIONS", "1".to_string()),
        ("ESTOQUE_LLM_PROVIDER", "ollama".to_string()),
        ("ESTOQUE_LLM_BASE_URL", UNREACHABLE_MODEL.to_string()),
        ("ESTOQUE_LLM_MAX_RETRIES", "0".to_string()),
        ("ESTOQUE_AGENT_REACT_PROMPT_URL", "builtin".to_string()),
    ]
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env<V: AsRef<str>>(vars: &[(&str, V)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "ESTOQUE_DATABASE_URL",
        "ESTOQUE_DATABASE_MAX_CONNECTIONS",
        "ESTOQUE_DATABASE_TIMEOUT_SECS",
        "ESTOQUE_LLM_PROVIDER",
        "ESTOQUE_LLM_API_KEY",
        "ESTOQUE_LLM_BASE_URL",
        "ESTOQUE_LLM_MODEL",
        "ESTOQUE_LLM_TEMPERATURE",
        "ESTOQUE_LLM_MAX_TOKENS",
        "ESTOQUE_LLM_TIMEOUT_SECS",
        "ESTOQUE_LLM_MAX_RETRIES",
        "ESTOQUE_AGENT_MAX_ITERATIONS",
        "ESTOQUE_AGENT_MAX_EXECUTION_SECS",
        "ESTOQUE_AGENT_HANDLE_PARSING_ERRORS",
        "ESTOQUE_AGENT_FALLBACK_ENABLED",
        "ESTOQUE_AGENT_REACT_PROMPT_URL",
        "ESTOQUE_SERVER_BIND_ADDRESS",
        "ESTOQUE_SERVER_PORT",
        "ESTOQUE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "ESTOQUE_LOGGING_LEVEL",
        "ESTOQUE_LOGGING_FORMAT",
        "ESTOQUE_LOG_LEVEL",
        "ESTOQUE_LOG_FORMAT",
        "GROQ_API_KEY",
        "OPENAI_API_KEY",
        "ANTHROPIC_API_KEY",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value.as_ref());
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
