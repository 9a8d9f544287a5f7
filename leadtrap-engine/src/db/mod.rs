//! Database access for the engine
//!
//! The store is the single source of truth for "already purchased" status;
//! every component reads and writes through these modules.

pub mod batches;
pub mod campaigns;
pub mod leads;
pub mod messages;

use leadtrap_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize the database connection pool and schema
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    leadtrap_common::db::init::init_database(db_path).await
}

/// Build a `?,?,?` placeholder list for a dynamic IN clause
pub(crate) fn placeholders(count: usize) -> String {
    std::iter::repeat("?")
        .take(count)
        .collect::<Vec<_>>()
        .join(", ")
}
