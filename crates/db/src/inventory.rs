use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

use crate::result::{QueryResult, SqlValue};
use crate::{DbPool, StoreError};

const SAMPLE_ROWS: usize = 3;

/// SQL execution primitives exposed to the query agent.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    fn dialect(&self) -> &'static str;

    async fn ping(&self) -> Result<(), StoreError>;

    async fn list_tables(&self) -> Result<Vec<String>, StoreError>;

    /// Schema plus a few sample rows for each table; an empty slice means all tables.
    async fn table_info(&self, tables: &[String]) -> Result<String, StoreError>;

    async fn run(&self, sql: &str) -> Result<QueryResult, StoreError>;
}

#[derive(Clone)]
pub struct SqlInventoryStore {
    pool: DbPool,
}

impl SqlInventoryStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn describe_table(&self, table: &str) -> Result<String, StoreError> {
        let create_sql: Option<String> =
            sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1")
                .bind(table)
                .fetch_optional(&self.pool)
                .await?;

        let pragma = format!("SELECT name FROM pragma_table_info({})", quote_literal(table));
        let columns: Vec<String> = sqlx::query_scalar(&pragma).fetch_all(&self.pool).await?;

        let sample = self
            .run(&format!("SELECT * FROM {} LIMIT {SAMPLE_ROWS}", quote_identifier(table)))
            .await?;

        let mut section = create_sql.unwrap_or_default().trim().to_string();
        section.push_str(&format!("\n\n/*\n{SAMPLE_ROWS} rows from {table} table:\n"));
        section.push_str(&columns.join("\t"));
        for row in &sample.rows {
            section.push('\n');
            let cells = row.iter().map(sample_cell).collect::<Vec<_>>();
            section.push_str(&cells.join("\t"));
        }
        section.push_str("\n*/");

        Ok(section)
    }
}

#[async_trait]
impl InventoryStore for SqlInventoryStore {
    fn dialect(&self) -> &'static str {
        "sqlite"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        let tables = sqlx::query_scalar(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(tables)
    }

    async fn table_info(&self, tables: &[String]) -> Result<String, StoreError> {
        let available = self.list_tables().await?;
        let requested = if tables.is_empty() { available.clone() } else { tables.to_vec() };

        let missing = requested
            .iter()
            .filter(|table| !available.contains(table))
            .cloned()
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(StoreError::UnknownTables(missing));
        }

        let mut sections = Vec::with_capacity(requested.len());
        for table in &requested {
            sections.push(self.describe_table(table).await?);
        }
        Ok(sections.join("\n\n"))
    }

    async fn run(&self, sql: &str) -> Result<QueryResult, StoreError> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;

        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|column| column.name().to_string()).collect())
            .unwrap_or_default();

        let mut decoded = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut cells = Vec::with_capacity(row.len());
            for index in 0..row.len() {
                cells.push(decode_cell(row, index)?);
            }
            decoded.push(cells);
        }

        Ok(QueryResult::new(columns, decoded))
    }
}

fn decode_cell(row: &SqliteRow, index: usize) -> Result<SqlValue, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }

    let storage_class = raw.type_info().name().to_ascii_uppercase();
    let value = match storage_class.as_str() {
        "INTEGER" => SqlValue::Integer(row.try_get(index)?),
        "REAL" => SqlValue::Real(row.try_get(index)?),
        "BLOB" => SqlValue::Blob(row.try_get(index)?),
        _ => SqlValue::Text(row.try_get(index)?),
    };
    Ok(value)
}

fn sample_cell(value: &SqlValue) -> String {
    match value {
        SqlValue::Text(text) => text.clone(),
        other => other.to_string(),
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
