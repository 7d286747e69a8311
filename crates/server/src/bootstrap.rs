use std::sync::Arc;

use estoque_agent::runtime::AssembleError;
use estoque_agent::AgentRuntime;
use estoque_core::config::{AppConfig, ConfigError};
use estoque_db::{connect_with_settings, DbPool, InventoryStore, SqlInventoryStore, StoreError};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub store: Arc<dyn InventoryStore>,
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database is unreachable: {0}")]
    DatabaseUnreachable(#[source] StoreError),
    #[error("agent assembly failed: {0}")]
    Assemble(#[from] AssembleError),
}

/// Connects, probes and assembles the agent. Nothing is served until all three succeed.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        provider = config.llm.provider.as_str(),
        model = %config.llm.model,
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;

    let store: Arc<dyn InventoryStore> = Arc::new(SqlInventoryStore::new(db_pool.clone()));
    store.ping().await.map_err(BootstrapError::DatabaseUnreachable)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    let runtime = AgentRuntime::assemble(&config, store.clone()).await?;
    info!(
        event_name = "system.bootstrap.agent_ready",
        correlation_id = "bootstrap",
        max_iterations = ?config.agent.max_iterations,
        max_execution_secs = ?config.agent.max_execution_secs,
        fallback_enabled = config.agent.fallback_enabled,
        "agent runtime assembled"
    );

    Ok(Application { config, db_pool, store, runtime: Arc::new(runtime) })
}

#[cfg(test)]
mod tests {
    use estoque_core::config::{AppConfig, ConfigOverrides, LoadOptions, BUILTIN_PROMPT};

    use crate::bootstrap::{bootstrap_with_config, Application, BootstrapError};

    async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        bootstrap_with_config(AppConfig::load(options)?).await
    }

    fn options(database_url: &str, api_key: Option<&str>) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                llm_api_key: api_key.map(str::to_string),
                react_prompt_url: Some(BUILTIN_PROMPT.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_assembles_with_builtin_prompt() {
        let app = bootstrap(options("sqlite::memory:", Some("gsk-test")))
            .await
            .expect("bootstrap should succeed with valid overrides");

        assert_eq!(app.runtime.limits().max_iterations, Some(10));
        assert!(app.runtime.fallback_enabled());
        app.store.ping().await.expect("store should answer");

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_unreachable_prompt_asset() {
        let mut options = options("sqlite::memory:", Some("gsk-test"));
        options.overrides.react_prompt_url = Some("http://127.0.0.1:9/react".to_string());

        let result = bootstrap(options).await;
        assert!(matches!(result, Err(BootstrapError::Assemble(_))));
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_missing_database_directory() {
        let result =
            bootstrap(options("sqlite:///nonexistent-dir/estoque.db", Some("gsk-test"))).await;
        assert!(matches!(result, Err(BootstrapError::DatabaseConnect(_))));
    }
}
