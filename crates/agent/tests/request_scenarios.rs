use std::sync::Arc;

use estoque_agent::prompt_hub::{load_react_prompt, PromptSource};
use estoque_agent::{AgentRuntime, RequestOutcome, ScriptedLlmClient};
use estoque_core::config::AppConfig;
use estoque_core::RequestState;
use estoque_db::{connect_with_settings, DemoInventory, SqlInventoryStore};

type ScenarioResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

async fn demo_store() -> ScenarioResult<Arc<SqlInventoryStore>> {
    let pool = connect_with_settings("sqlite::memory:", 1, 5)
        .await
        .map_err(|error| format!("connect: {error}"))?;
    DemoInventory::load(&pool).await.map_err(|error| format!("seed: {error}"))?;
    Ok(Arc::new(SqlInventoryStore::new(pool)))
}

async fn runtime(llm: Arc<ScriptedLlmClient>) -> ScenarioResult<AgentRuntime> {
    let config = AppConfig::default();
    let template = load_react_prompt(&PromptSource::Builtin, config.llm.timeout())
        .await
        .map_err(|error| error.to_string())?;
    AgentRuntime::from_parts(&config.agent, llm, demo_store().await?, template)
        .map_err(|error| error.to_string())
}

#[tokio::test]
async fn agent_reads_the_real_catalog_before_answering() -> ScenarioResult {
    let llm = Arc::new(
        ScriptedLlmClient::new()
            .with_reply(" Vou listar as tabelas.\nAction: sql_db_list_tables\nAction Input: ")
            .with_reply(" Vejo a tabela produtos.\nAction: sql_db_schema\nAction Input: produtos")
            .with_reply(
                " Agora consulto.\nAction: sql_db_query\nAction Input: SELECT nome FROM produtos \
                 ORDER BY vendas DESC LIMIT 1",
            )
            .with_reply(
                " I now know the final answer\nFinal Answer: The query was executed. O produto \
                 mais vendido é a Marca-texto",
            ),
    );
    let report = runtime(llm.clone()).await?.handle("Qual produto vende mais?").await;

    require!(
        report.outcome
            == RequestOutcome::Answer { text: "O produto mais vendido é a Marca-texto.".into() },
        "unexpected outcome {:?}",
        report.outcome
    );
    require!(report.agent_steps == 3);

    let prompts = llm.prompts().await;
    require!(prompts.len() == 4);
    require!(prompts[1].contains("Observation: produtos\nThought: "));
    require!(prompts[2].contains("3 rows from produtos table:"));
    require!(prompts[3].contains("Observation: [('Marca-texto',)]"));
    Ok(())
}

#[tokio::test]
async fn failing_model_falls_back_to_in_stock_rows() -> ScenarioResult {
    let llm = Arc::new(ScriptedLlmClient::new().with_failure("503 from provider"));
    let report = runtime(llm).await?.handle("O que tem em ESTOQUE?").await;

    let RequestOutcome::FallbackRows { query, result, .. } = &report.outcome else {
        return Err(format!("expected fallback rows, got {:?}", report.outcome));
    };
    require!(query == "SELECT * FROM produtos WHERE quantidade > 0 LIMIT 10");
    require!(result.rows.len() == DemoInventory::product_count() - 2);
    require!(report.path.last() == Some(&RequestState::Displayed));
    Ok(())
}

#[tokio::test]
async fn endless_tool_use_hits_the_iteration_budget() -> ScenarioResult {
    let mut llm = ScriptedLlmClient::new();
    for _ in 0..12 {
        llm = llm.with_reply("Action: sql_db_list_tables\nAction Input: ");
    }
    let llm = Arc::new(llm);
    let report = runtime(llm.clone()).await?.handle("Liste tudo").await;

    require!(
        report.outcome.text() == "Agent stopped due to iteration limit or time limit.",
        "unexpected outcome {:?}",
        report.outcome
    );
    require!(llm.calls().await == 10);
    require!(report.agent_steps == 10);
    Ok(())
}
