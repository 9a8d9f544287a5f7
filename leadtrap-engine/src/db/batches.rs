//! Search batch receipts
//!
//! One receipt per scan-or-enrich invocation: criteria, total discovered
//! and total newly saved. The saved count is written exactly once at the
//! end of an enrichment run.

use crate::criteria::SearchCriteria;
use leadtrap_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SearchBatch {
    pub id: Uuid,
    pub state: String,
    pub city: Option<String>,
    pub strategy: String,
    pub total_found: i64,
    pub saved_count: i64,
}

/// Create a batch receipt for one invocation
pub async fn create_batch(
    pool: &SqlitePool,
    criteria: &SearchCriteria,
    total_found: i64,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO search_batches (id, state, city, strategy, total_found, saved_count)
        VALUES (?, ?, ?, ?, ?, 0)
        "#,
    )
    .bind(id.to_string())
    .bind(&criteria.state)
    .bind(&criteria.city)
    .bind(&criteria.strategy)
    .bind(total_found)
    .execute(pool)
    .await?;

    Ok(id)
}

/// Record the final saved count for a batch (called once, at the end)
pub async fn set_saved_count(pool: &SqlitePool, batch_id: Uuid, saved_count: i64) -> Result<()> {
    sqlx::query("UPDATE search_batches SET saved_count = ? WHERE id = ?")
        .bind(saved_count)
        .bind(batch_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Link a lead to the batch it was saved under. Idempotent: a duplicate
/// (batch, lead) pair is silently ignored.
pub async fn link_lead_to_batch(pool: &SqlitePool, batch_id: Uuid, lead_id: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO batch_leads (batch_id, lead_id) VALUES (?, ?)")
        .bind(batch_id.to_string())
        .bind(lead_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn load_batch(pool: &SqlitePool, batch_id: Uuid) -> Result<Option<SearchBatch>> {
    let row = sqlx::query(
        "SELECT id, state, city, strategy, total_found, saved_count \
         FROM search_batches WHERE id = ?",
    )
    .bind(batch_id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let id_str: String = row.get("id");
            Ok(Some(SearchBatch {
                id: Uuid::parse_str(&id_str)
                    .map_err(|e| leadtrap_common::Error::Validation(format!("Bad batch id: {}", e)))?,
                state: row.get("state"),
                city: row.get("city"),
                strategy: row.get("strategy"),
                total_found: row.get("total_found"),
                saved_count: row.get("saved_count"),
            }))
        }
        None => Ok(None),
    }
}
