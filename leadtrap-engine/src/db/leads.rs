//! Lead persistence
//!
//! One row per external identifier. Enrichment upserts in place; a lead is
//! never duplicated and never deleted by the engine.

use leadtrap_common::Result;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;

/// A property/owner record held in the local store
#[derive(Debug, Clone, Default)]
pub struct Lead {
    pub radar_id: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub beds: Option<i64>,
    pub baths: Option<f64>,
    pub sq_ft: Option<i64>,
    pub year_built: Option<i64>,
    pub estimated_value: Option<i64>,
    pub estimated_equity: Option<i64>,
    pub owner_name: Option<String>,
    /// Normalized phone values (E.164-ish), first entry is the dial target
    pub phone_numbers: Vec<String>,
    pub email_addresses: Vec<String>,
    /// Raw provider payload snapshot
    pub raw_data: Option<Value>,
    pub purchased: bool,
}

impl Lead {
    /// Minimal stub keyed only by identifier, used when the provider has
    /// no full record for an id being enriched
    pub fn stub(radar_id: impl Into<String>) -> Self {
        Lead {
            radar_id: radar_id.into(),
            ..Default::default()
        }
    }
}

fn row_to_lead(row: &sqlx::sqlite::SqliteRow) -> Result<Lead> {
    let phones: String = row.get("phone_numbers");
    let emails: String = row.get("email_addresses");
    let raw: Option<String> = row.get("raw_data");

    Ok(Lead {
        radar_id: row.get("radar_id"),
        address: row.get("address"),
        city: row.get("city"),
        state: row.get("state"),
        zip_code: row.get("zip_code"),
        beds: row.get("beds"),
        baths: row.get("baths"),
        sq_ft: row.get("sq_ft"),
        year_built: row.get("year_built"),
        estimated_value: row.get("estimated_value"),
        estimated_equity: row.get("estimated_equity"),
        owner_name: row.get("owner_name"),
        phone_numbers: serde_json::from_str(&phones).unwrap_or_default(),
        email_addresses: serde_json::from_str(&emails).unwrap_or_default(),
        raw_data: raw.and_then(|s| serde_json::from_str(&s).ok()),
        purchased: row.get::<i64, _>("purchased") != 0,
    })
}

const LEAD_COLUMNS: &str = "radar_id, address, city, state, zip_code, beds, baths, sq_ft, \
     year_built, estimated_value, estimated_equity, owner_name, \
     phone_numbers, email_addresses, raw_data, purchased";

/// Upsert a lead: insert on first enrichment, update in place afterwards
pub async fn upsert_lead(pool: &SqlitePool, lead: &Lead) -> Result<()> {
    let phones = serde_json::to_string(&lead.phone_numbers).unwrap_or_else(|_| "[]".to_string());
    let emails =
        serde_json::to_string(&lead.email_addresses).unwrap_or_else(|_| "[]".to_string());
    let raw = lead.raw_data.as_ref().map(|v| v.to_string());

    sqlx::query(
        r#"
        INSERT INTO leads (radar_id, address, city, state, zip_code, beds, baths, sq_ft,
                           year_built, estimated_value, estimated_equity, owner_name,
                           phone_numbers, email_addresses, raw_data, purchased,
                           created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        ON CONFLICT(radar_id) DO UPDATE SET
            address = excluded.address,
            city = excluded.city,
            state = excluded.state,
            zip_code = excluded.zip_code,
            beds = excluded.beds,
            baths = excluded.baths,
            sq_ft = excluded.sq_ft,
            year_built = excluded.year_built,
            estimated_value = excluded.estimated_value,
            estimated_equity = excluded.estimated_equity,
            owner_name = excluded.owner_name,
            phone_numbers = excluded.phone_numbers,
            email_addresses = excluded.email_addresses,
            raw_data = excluded.raw_data,
            purchased = excluded.purchased,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&lead.radar_id)
    .bind(&lead.address)
    .bind(&lead.city)
    .bind(&lead.state)
    .bind(&lead.zip_code)
    .bind(lead.beds)
    .bind(lead.baths)
    .bind(lead.sq_ft)
    .bind(lead.year_built)
    .bind(lead.estimated_value)
    .bind(lead.estimated_equity)
    .bind(&lead.owner_name)
    .bind(phones)
    .bind(emails)
    .bind(raw)
    .bind(lead.purchased as i64)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load one lead by identifier
pub async fn load_lead(pool: &SqlitePool, radar_id: &str) -> Result<Option<Lead>> {
    let sql = format!("SELECT {} FROM leads WHERE radar_id = ?", LEAD_COLUMNS);
    let row = sqlx::query(&sql).bind(radar_id).fetch_optional(pool).await?;
    match row {
        Some(row) => Ok(Some(row_to_lead(&row)?)),
        None => Ok(None),
    }
}

pub async fn lead_exists(pool: &SqlitePool, radar_id: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leads WHERE radar_id = ?")
        .bind(radar_id)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Identifiers from `ids` already marked purchased in the store.
///
/// This is the scan partition: members in this set are "owned" and are never
/// re-fetched from the provider.
pub async fn purchased_ids(pool: &SqlitePool, ids: &[String]) -> Result<HashSet<String>> {
    if ids.is_empty() {
        return Ok(HashSet::new());
    }

    let sql = format!(
        "SELECT radar_id FROM leads WHERE purchased = 1 AND radar_id IN ({})",
        super::placeholders(ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id);
    }

    let rows = query.fetch_all(pool).await?;
    Ok(rows.iter().map(|row| row.get("radar_id")).collect())
}

/// Load full lead records for a set of identifiers
pub async fn load_leads(pool: &SqlitePool, ids: &[String]) -> Result<Vec<Lead>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {} FROM leads WHERE radar_id IN ({}) ORDER BY radar_id",
        LEAD_COLUMNS,
        super::placeholders(ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id);
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(row_to_lead).collect()
}

/// Leads whose stored phone list contains `phone` as an exact value.
///
/// Matching walks the JSON array element by element; substring matching
/// over the serialized blob would false-positive when one number is a
/// prefix of another or formatting differs.
pub async fn find_leads_by_phone(pool: &SqlitePool, phone: &str) -> Result<Vec<Lead>> {
    let sql = format!(
        "SELECT DISTINCT {} FROM leads, json_each(leads.phone_numbers) \
         WHERE json_each.value = ? ORDER BY leads.radar_id",
        LEAD_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(phone).fetch_all(pool).await?;
    rows.iter().map(row_to_lead).collect()
}
