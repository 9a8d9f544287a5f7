//! Append-only message log
//!
//! Rows are never mutated after creation. The UNIQUE constraint on
//! `provider_message_id` is what makes redelivered inbound notifications
//! exactly-once: the second insert is ignored and reported as a duplicate.

use chrono::{DateTime, Utc};
use leadtrap_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Message direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Outbound => "outbound",
            Direction::Inbound => "inbound",
        }
    }
}

/// One append-only message log row
#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub lead_id: String,
    pub direction: Direction,
    pub body: String,
    pub status: String,
    pub provider_message_id: Option<String>,
    pub to_phone: Option<String>,
    pub cost: Option<f64>,
    pub error_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// New message row timestamped now
    pub fn new(
        campaign_id: Option<Uuid>,
        lead_id: impl Into<String>,
        direction: Direction,
        body: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Message {
            id: Uuid::new_v4(),
            campaign_id,
            lead_id: lead_id.into(),
            direction,
            body: body.into(),
            status: status.into(),
            provider_message_id: None,
            to_phone: None,
            cost: None,
            error_reason: None,
            created_at: Utc::now(),
        }
    }
}

/// Append a message row. Returns `false` when a row with the same
/// `provider_message_id` already exists (duplicate delivery, no-op).
pub async fn append_message(pool: &SqlitePool, message: &Message) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO messages
            (id, campaign_id, lead_id, direction, body, status,
             provider_message_id, to_phone, cost, error_reason, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(message.id.to_string())
    .bind(message.campaign_id.map(|id| id.to_string()))
    .bind(&message.lead_id)
    .bind(message.direction.as_str())
    .bind(&message.body)
    .bind(&message.status)
    .bind(&message.provider_message_id)
    .bind(&message.to_phone)
    .bind(message.cost)
    .bind(&message.error_reason)
    .bind(message.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Whether a provider message id has already been recorded
pub async fn provider_message_exists(pool: &SqlitePool, provider_message_id: &str) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE provider_message_id = ?")
            .bind(provider_message_id)
            .fetch_one(pool)
            .await?;
    Ok(count > 0)
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message> {
    let id_str: String = row.get("id");
    let campaign_str: Option<String> = row.get("campaign_id");
    let created_str: String = row.get("created_at");
    let direction_str: String = row.get("direction");

    let direction = match direction_str.as_str() {
        "outbound" => Direction::Outbound,
        "inbound" => Direction::Inbound,
        other => {
            return Err(Error::Validation(format!(
                "Unknown message direction: {}",
                other
            )))
        }
    };

    Ok(Message {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| Error::Validation(format!("Bad message id: {}", e)))?,
        campaign_id: match campaign_str {
            Some(s) => Some(
                Uuid::parse_str(&s)
                    .map_err(|e| Error::Validation(format!("Bad campaign id: {}", e)))?,
            ),
            None => None,
        },
        lead_id: row.get("lead_id"),
        direction,
        body: row.get("body"),
        status: row.get("status"),
        provider_message_id: row.get("provider_message_id"),
        to_phone: row.get("to_phone"),
        cost: row.get("cost"),
        error_reason: row.get("error_reason"),
        created_at: DateTime::parse_from_rfc3339(&created_str)
            .map_err(|e| Error::Validation(format!("Bad message timestamp: {}", e)))?
            .with_timezone(&Utc),
    })
}

/// Latest outbound message across a set of leads; the attribution target
/// for an inbound reply when conversation history exists
pub async fn find_latest_outbound_by_leads(
    pool: &SqlitePool,
    lead_ids: &[String],
) -> Result<Option<Message>> {
    if lead_ids.is_empty() {
        return Ok(None);
    }

    let sql = format!(
        "SELECT id, campaign_id, lead_id, direction, body, status, \
                provider_message_id, to_phone, cost, error_reason, created_at \
         FROM messages \
         WHERE direction = 'outbound' AND lead_id IN ({}) \
         ORDER BY created_at DESC, rowid DESC LIMIT 1",
        super::placeholders(lead_ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in lead_ids {
        query = query.bind(id);
    }

    let row = query.fetch_optional(pool).await?;
    match row {
        Some(row) => Ok(Some(row_to_message(&row)?)),
        None => Ok(None),
    }
}

/// Count messages recorded for a campaign (success and failure both logged)
pub async fn count_campaign_messages(pool: &SqlitePool, campaign_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE campaign_id = ?")
        .bind(campaign_id.to_string())
        .fetch_one(pool)
        .await?;
    Ok(count)
}
