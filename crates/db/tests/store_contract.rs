use estoque_db::{
    connect_with_settings, DemoInventory, InventoryStore, SqlInventoryStore, SqlValue, StoreError,
};

type StoreContractResult<T = ()> = Result<T, String>;

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

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
}

async fn file_store(dir: &tempfile::TempDir) -> StoreContractResult<SqlInventoryStore> {
    let path = dir.path().join("estoque.db");
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let pool = connect_with_settings(&url, 2, 5).await.map_err(|error| error.to_string())?;
    DemoInventory::load(&pool).await.map_err(|error| error.to_string())?;
    Ok(SqlInventoryStore::new(pool))
}

#[tokio::test]
async fn fallback_queries_run_against_the_demo_catalog() -> StoreContractResult {
    let dir = tempfile::tempdir().map_err(|error| error.to_string())?;
    let store = file_store(&dir).await?;

    let best_sellers = store
        .run("SELECT * FROM produtos ORDER BY vendas DESC LIMIT 5")
        .await
        .map_err(|error| error.to_string())?;
    require_eq!(best_sellers.rows.len(), 5);
    require_eq!(
        best_sellers.columns,
        vec!["id", "nome", "categoria", "quantidade", "preco", "vendas"]
    );
    require!(
        matches!(&best_sellers.rows[0][1], SqlValue::Text(name) if name == "Marca-texto"),
        "best seller should come first, got {:?}",
        best_sellers.rows[0]
    );

    let in_stock = store
        .run("SELECT * FROM produtos WHERE quantidade > 0 LIMIT 10")
        .await
        .map_err(|error| error.to_string())?;
    require!(in_stock.rows.iter().all(|row| !matches!(row[3], SqlValue::Integer(0))));
    require_eq!(in_stock.rows.len(), DemoInventory::product_count() - 2);

    Ok(())
}

#[tokio::test]
async fn data_survives_reopening_the_file() -> StoreContractResult {
    let dir = tempfile::tempdir().map_err(|error| error.to_string())?;
    let first = file_store(&dir).await?;
    first.pool().close().await;

    let reopened = file_store(&dir).await?;
    let count = reopened
        .run("SELECT COUNT(*) FROM produtos")
        .await
        .map_err(|error| error.to_string())?;
    require_eq!(count.to_string(), format!("[({},)]", DemoInventory::product_count()));

    Ok(())
}

#[tokio::test]
async fn write_statements_are_not_filtered_by_the_store() -> StoreContractResult {
    let dir = tempfile::tempdir().map_err(|error| error.to_string())?;
    let store = file_store(&dir).await?;

    let result = store
        .run("UPDATE produtos SET quantidade = quantidade + 1 WHERE id = 1")
        .await
        .map_err(|error| error.to_string())?;
    require!(result.is_empty());

    let error = store.run("SELEC nada").await;
    require!(matches!(error, Err(StoreError::Database(_))));

    Ok(())
}
