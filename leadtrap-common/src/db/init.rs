//! Database initialization
//!
//! Opens (or creates) the SQLite database and creates all leadtrap tables.
//! Table creation is idempotent so every startup path can call it safely.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL mode: the dispatcher and the inbound attributor both write and
    // can run concurrently
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_tables(&pool).await?;

    Ok(pool)
}

/// Create all leadtrap tables (idempotent, safe to call multiple times)
pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    create_leads_table(pool).await?;
    create_search_batches_table(pool).await?;
    create_batch_leads_table(pool).await?;
    create_campaigns_table(pool).await?;
    create_campaign_leads_table(pool).await?;
    create_messages_table(pool).await?;
    Ok(())
}

/// Leads: one row per external identifier, upsert-only, never duplicated
pub async fn create_leads_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS leads (
            radar_id TEXT PRIMARY KEY,
            address TEXT,
            city TEXT,
            state TEXT,
            zip_code TEXT,
            beds INTEGER,
            baths REAL,
            sq_ft INTEGER,
            year_built INTEGER,
            estimated_value INTEGER,
            estimated_equity INTEGER,
            owner_name TEXT,
            phone_numbers TEXT NOT NULL DEFAULT '[]',
            email_addresses TEXT NOT NULL DEFAULT '[]',
            raw_data TEXT,
            purchased INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Search batches: one receipt per scan-or-enrich invocation
pub async fn create_search_batches_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS search_batches (
            id TEXT PRIMARY KEY,
            state TEXT NOT NULL,
            city TEXT,
            strategy TEXT NOT NULL,
            total_found INTEGER NOT NULL DEFAULT 0,
            saved_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Batch-to-lead links; UNIQUE pair keeps the link idempotent
pub async fn create_batch_leads_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS batch_leads (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            batch_id TEXT NOT NULL REFERENCES search_batches(id) ON DELETE CASCADE,
            lead_id TEXT NOT NULL REFERENCES leads(radar_id),
            UNIQUE(batch_id, lead_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_campaigns_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS campaigns (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            template_body TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'processing',
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Campaign roster: one entry per (campaign, lead) pair
pub async fn create_campaign_leads_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS campaign_leads (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            campaign_id TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
            lead_id TEXT NOT NULL REFERENCES leads(radar_id),
            status TEXT NOT NULL DEFAULT 'queued',
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(campaign_id, lead_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Messages: append-only send/receive log. The UNIQUE provider id is what
/// makes redelivered inbound notifications a no-op.
pub async fn create_messages_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            campaign_id TEXT REFERENCES campaigns(id) ON DELETE CASCADE,
            lead_id TEXT NOT NULL REFERENCES leads(radar_id),
            direction TEXT NOT NULL,
            body TEXT NOT NULL,
            status TEXT NOT NULL,
            provider_message_id TEXT UNIQUE,
            to_phone TEXT,
            cost REAL,
            error_reason TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_tables_is_idempotent() {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");

        create_tables(&pool).await.expect("first create failed");
        create_tables(&pool).await.expect("second create failed");

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leads")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
