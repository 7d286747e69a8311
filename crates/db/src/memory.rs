use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::inventory::InventoryStore;
use crate::result::QueryResult;
use crate::StoreError;

/// Scripted store for tests: answers known SQL text and records every query it sees.
#[derive(Default)]
pub struct InMemoryInventoryStore {
    tables: Vec<(String, String)>,
    results: RwLock<HashMap<String, Result<QueryResult, String>>>,
    executed: RwLock<Vec<String>>,
    unavailable: Option<String>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: impl Into<String>, info: impl Into<String>) -> Self {
        self.tables.push((name.into(), info.into()));
        self
    }

    pub fn with_result(mut self, sql: &str, result: QueryResult) -> Self {
        self.results.get_mut().insert(normalize(sql), Ok(result));
        self
    }

    /// `sql` fails with `message` while other scripted queries keep working.
    pub fn with_failure(mut self, sql: &str, message: impl Into<String>) -> Self {
        self.results.get_mut().insert(normalize(sql), Err(message.into()));
        self
    }

    /// Every call fails, as if the database file had gone away.
    pub fn unavailable(mut self, message: impl Into<String>) -> Self {
        self.unavailable = Some(message.into());
        self
    }

    pub async fn executed(&self) -> Vec<String> {
        self.executed.read().await.clone()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        match &self.unavailable {
            Some(message) => Err(StoreError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    fn dialect(&self) -> &'static str {
        "sqlite"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }

    async fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        self.check_available()?;
        Ok(self.tables.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn table_info(&self, tables: &[String]) -> Result<String, StoreError> {
        self.check_available()?;
        let missing = tables
            .iter()
            .filter(|requested| !self.tables.iter().any(|(name, _)| name == *requested))
            .cloned()
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(StoreError::UnknownTables(missing));
        }

        let sections = self
            .tables
            .iter()
            .filter(|(name, _)| tables.is_empty() || tables.contains(name))
            .map(|(_, info)| info.clone())
            .collect::<Vec<_>>();
        Ok(sections.join("\n\n"))
    }

    async fn run(&self, sql: &str) -> Result<QueryResult, StoreError> {
        self.executed.write().await.push(sql.to_string());
        self.check_available()?;

        match self.results.read().await.get(&normalize(sql)) {
            Some(Ok(result)) => Ok(result.clone()),
            Some(Err(message)) => Err(StoreError::Unavailable(message.clone())),
            None => Err(StoreError::Unavailable(format!("no scripted result for `{sql}`"))),
        }
    }
}

fn normalize(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::InMemoryInventoryStore;
    use crate::inventory::InventoryStore;
    use crate::result::{QueryResult, SqlValue};
    use crate::StoreError;

    #[tokio::test]
    async fn scripted_results_ignore_whitespace_differences() {
        let store = InMemoryInventoryStore::new().with_result(
            "SELECT COUNT(*) FROM produtos",
            QueryResult::new(vec!["n".into()], vec![vec![SqlValue::Integer(7)]]),
        );

        let result = store.run("SELECT  COUNT(*)\nFROM produtos").await.expect("scripted");
        assert_eq!(result.to_string(), "[(7,)]");
        assert_eq!(store.executed().await, vec!["SELECT  COUNT(*)\nFROM produtos".to_string()]);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = InMemoryInventoryStore::new()
            .with_table("produtos", "CREATE TABLE produtos (id INTEGER)")
            .unavailable("disk gone");

        assert!(matches!(store.ping().await, Err(StoreError::Unavailable(_))));
        assert!(store.list_tables().await.is_err());
        assert!(store.run("SELECT 1").await.is_err());
        assert_eq!(store.executed().await.len(), 1);
    }
}
