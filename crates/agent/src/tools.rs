use std::sync::Arc;

use async_trait::async_trait;
use estoque_core::errors::DomainError;
use estoque_core::PromptTemplate;
use estoque_db::{InventoryStore, StoreError};
use thiserror::Error;

use crate::llm::{LlmClient, LlmError};

pub const QUERY_TOOL: &str = "sql_db_query";
pub const SCHEMA_TOOL: &str = "sql_db_schema";
pub const LIST_TABLES_TOOL: &str = "sql_db_list_tables";
pub const QUERY_CHECKER_TOOL: &str = "sql_db_query_checker";

const QUERY_CHECKER_TEMPLATE: &str = "
{query}
Double check the {dialect} query above for common mistakes, including:
- Using NOT IN with NULL values
- Using UNION when UNION ALL should have been used
- Using BETWEEN for exclusive ranges
- Data type mismatch in predicates
- Properly quoting identifiers
- Using the correct number of arguments for functions
- Casting to the correct data type
- Using the proper columns for joins

If there are any of the above mistakes, rewrite the query. If there are no mistakes, just reproduce the original query.

Output the final SQL query only.

SQL Query: ";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Llm(#[from] LlmError),
    #[error("{0}")]
    Prompt(#[from] DomainError),
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn execute(&self, input: &str) -> Result<String, ToolError>;
}

/// Tools in registration order; the order is what the model sees in its prompt.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.retain(|existing| existing.name() != tool.name());
        self.tools.push(Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    /// One `name: description` line per tool.
    pub fn render_descriptions(&self) -> String {
        self.tools
            .iter()
            .map(|tool| format!("{}: {}", tool.name(), tool.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// The four SQL tools the query agent works with.
pub fn sql_toolkit(store: Arc<dyn InventoryStore>, llm: Arc<dyn LlmClient>) -> ToolRegistry {
    let mut registry = ToolRegistry::default();
    registry.register(QuerySqlTool { store: store.clone() });
    registry.register(SchemaSqlTool { store: store.clone() });
    registry.register(ListTablesSqlTool { store: store.clone() });
    registry.register(QueryCheckerTool { dialect: store.dialect(), llm });
    registry
}

pub struct QuerySqlTool {
    store: Arc<dyn InventoryStore>,
}

#[async_trait]
impl Tool for QuerySqlTool {
    fn name(&self) -> &'static str {
        QUERY_TOOL
    }

    fn description(&self) -> &'static str {
        "Input to this tool is a detailed and correct SQL query, output is a result from the \
         database. If the query is not correct, an error message will be returned. If an error \
         is returned, rewrite the query, check the query, and try again. If you encounter an \
         issue with Unknown column 'xxxx' in 'field list', use sql_db_schema to query the \
         correct table fields."
    }

    async fn execute(&self, input: &str) -> Result<String, ToolError> {
        let result = self.store.run(clean_sql(input)).await?;
        Ok(result.to_string())
    }
}

pub struct SchemaSqlTool {
    store: Arc<dyn InventoryStore>,
}

#[async_trait]
impl Tool for SchemaSqlTool {
    fn name(&self) -> &'static str {
        SCHEMA_TOOL
    }

    fn description(&self) -> &'static str {
        "Input to this tool is a comma-separated list of tables, output is the schema and sample \
         rows for those tables. Be sure that the tables actually exist by calling \
         sql_db_list_tables first! Example Input: table1, table2, table3"
    }

    async fn execute(&self, input: &str) -> Result<String, ToolError> {
        let tables = input
            .split(',')
            .map(|table| table.trim().trim_matches(|ch: char| ch == '"' || ch == '\'' || ch == '`'))
            .filter(|table| !table.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();
        Ok(self.store.table_info(&tables).await?)
    }
}

pub struct ListTablesSqlTool {
    store: Arc<dyn InventoryStore>,
}

#[async_trait]
impl Tool for ListTablesSqlTool {
    fn name(&self) -> &'static str {
        LIST_TABLES_TOOL
    }

    fn description(&self) -> &'static str {
        "Input is an empty string, output is a comma-separated list of tables in the database."
    }

    async fn execute(&self, _input: &str) -> Result<String, ToolError> {
        Ok(self.store.list_tables().await?.join(", "))
    }
}

/// Asks the model to proofread a query before it is executed.
pub struct QueryCheckerTool {
    dialect: &'static str,
    llm: Arc<dyn LlmClient>,
}

#[async_trait]
impl Tool for QueryCheckerTool {
    fn name(&self) -> &'static str {
        QUERY_CHECKER_TOOL
    }

    fn description(&self) -> &'static str {
        "Use this tool to double check if your query is correct before executing it. Always use \
         this tool before executing a query with sql_db_query!"
    }

    async fn execute(&self, input: &str) -> Result<String, ToolError> {
        let template = PromptTemplate::from_template(QUERY_CHECKER_TEMPLATE)?;
        let prompt = template.format([("query", input), ("dialect", self.dialect)])?;
        let checked = self.llm.complete(&prompt, &[]).await?;
        Ok(checked.trim().to_string())
    }
}

/// Models often wrap SQL in markdown fences; the database would reject them.
fn clean_sql(input: &str) -> &str {
    let trimmed = input.trim();
    let unfenced = trimmed
        .strip_prefix("```sql")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    unfenced.trim()
}
