use crate::connection::DbPool;
use crate::StoreError;

/// Demo `produtos` catalog used by `estoque seed` and the test suites.
///
/// Only used to stand up a sample store; the assistant never creates or
/// migrates schema on its own.
pub struct DemoInventory;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub table: &'static str,
    pub inserted: u64,
    pub total: i64,
}

// (nome, categoria, quantidade, preco, vendas)
const DEMO_PRODUCTS: &[(&str, &str, i64, f64, i64)] = &[
    ("Caneta azul", "papelaria", 120, 2.5, 340),
    ("Caderno universitário", "papelaria", 45, 18.9, 210),
    ("Mochila escolar", "acessórios", 0, 129.0, 95),
    ("Garrafa térmica", "utilidades", 18, 54.9, 160),
    ("Calculadora científica", "eletrônicos", 7, 89.9, 60),
    ("Marca-texto", "papelaria", 200, 4.2, 410),
    ("Fone de ouvido", "eletrônicos", 0, 79.0, 130),
];

impl DemoInventory {
    pub const TABLE: &'static str = "produtos";

    const DDL: &'static str = "CREATE TABLE IF NOT EXISTS produtos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    nome TEXT NOT NULL UNIQUE,
    categoria TEXT NOT NULL,
    quantidade INTEGER NOT NULL DEFAULT 0,
    preco REAL NOT NULL,
    vendas INTEGER NOT NULL DEFAULT 0
)";

    /// Creates the table if needed and inserts any missing demo products.
    /// Running it twice leaves the table unchanged.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, StoreError> {
        let mut tx = pool.begin().await?;
        sqlx::query(Self::DDL).execute(&mut *tx).await?;

        let mut inserted = 0;
        for (nome, categoria, quantidade, preco, vendas) in DEMO_PRODUCTS {
            let outcome = sqlx::query(
                "INSERT OR IGNORE INTO produtos (nome, categoria, quantidade, preco, vendas) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(*nome)
            .bind(*categoria)
            .bind(*quantidade)
            .bind(*preco)
            .bind(*vendas)
            .execute(&mut *tx)
            .await?;
            inserted += outcome.rows_affected();
        }
        tx.commit().await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM produtos").fetch_one(pool).await?;

        Ok(SeedResult { table: Self::TABLE, inserted, total })
    }

    pub fn product_count() -> usize {
        DEMO_PRODUCTS.len()
    }
}
