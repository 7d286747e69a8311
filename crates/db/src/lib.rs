//! Access to the pre-existing inventory database.
//!
//! The agent only sees the [`InventoryStore`] trait, so request handling can run
//! against the sqlx-backed store or the scripted in-memory fake.

pub mod connection;
pub mod fixtures;
pub mod inventory;
pub mod memory;
pub mod result;

use thiserror::Error;

pub use connection::{connect_with_settings, DbPool};
pub use fixtures::{DemoInventory, SeedResult};
pub use inventory::{InventoryStore, SqlInventoryStore};
pub use memory::InMemoryInventoryStore;
pub use result::{QueryResult, SqlValue};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("table_names {0:?} not found in database")]
    UnknownTables(Vec<String>),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
