//! Campaigns and the per-campaign roster
//!
//! Roster rows are mutated only through the conditional update below, so a
//! dispatch attempt and an inbound reply racing on the same (campaign, lead)
//! pair cannot silently overwrite each other.

use leadtrap_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Campaign lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignStatus {
    Processing,
    Completed,
    Archived,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Processing => "processing",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Archived => "archived",
        }
    }
}

/// Status of a lead within one campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterStatus {
    Queued,
    Sent,
    Failed,
    Replied,
    Stopped,
}

impl RosterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RosterStatus::Queued => "queued",
            RosterStatus::Sent => "sent",
            RosterStatus::Failed => "failed",
            RosterStatus::Replied => "replied",
            RosterStatus::Stopped => "stopped",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(RosterStatus::Queued),
            "sent" => Ok(RosterStatus::Sent),
            "failed" => Ok(RosterStatus::Failed),
            "replied" => Ok(RosterStatus::Replied),
            "stopped" => Ok(RosterStatus::Stopped),
            other => Err(Error::Validation(format!("Unknown roster status: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub template_body: String,
    pub status: String,
}

/// One (campaign, lead) roster row
#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub campaign_id: Uuid,
    pub lead_id: String,
    pub status: RosterStatus,
}

/// Create a campaign in `processing` state
pub async fn create_campaign(
    pool: &SqlitePool,
    name: &str,
    template_body: &str,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO campaigns (id, name, template_body, status)
        VALUES (?, ?, ?, 'processing')
        "#,
    )
    .bind(id.to_string())
    .bind(name)
    .bind(template_body)
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn load_campaign(pool: &SqlitePool, campaign_id: Uuid) -> Result<Option<Campaign>> {
    let row = sqlx::query("SELECT id, name, template_body, status FROM campaigns WHERE id = ?")
        .bind(campaign_id.to_string())
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => Ok(Some(Campaign {
            id: campaign_id,
            name: row.get("name"),
            template_body: row.get("template_body"),
            status: row.get("status"),
        })),
        None => Ok(None),
    }
}

pub async fn set_campaign_status(
    pool: &SqlitePool,
    campaign_id: Uuid,
    status: CampaignStatus,
) -> Result<()> {
    sqlx::query("UPDATE campaigns SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(campaign_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Create queued roster entries for the given leads. One entry per
/// (campaign, lead) pair; re-adding a lead is a no-op.
pub async fn create_roster_entries(
    pool: &SqlitePool,
    campaign_id: Uuid,
    lead_ids: &[String],
) -> Result<usize> {
    let mut created = 0;
    for lead_id in lead_ids {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO campaign_leads (campaign_id, lead_id, status) \
             VALUES (?, ?, 'queued')",
        )
        .bind(campaign_id.to_string())
        .bind(lead_id)
        .execute(pool)
        .await?;
        created += result.rows_affected() as usize;
    }
    Ok(created)
}

/// All queued roster entries for a campaign, in creation order
pub async fn queued_entries(pool: &SqlitePool, campaign_id: Uuid) -> Result<Vec<RosterEntry>> {
    let rows = sqlx::query(
        "SELECT lead_id, status FROM campaign_leads \
         WHERE campaign_id = ? AND status = 'queued' ORDER BY id",
    )
    .bind(campaign_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(RosterEntry {
                campaign_id,
                lead_id: row.get("lead_id"),
                status: RosterStatus::parse(row.get("status"))?,
            })
        })
        .collect()
}

/// Conditionally transition a roster row: the status is set only if the
/// current status equals `expected`. Returns whether the row moved.
///
/// This is the serialization point for concurrent dispatch and inbound
/// writers; a `sent` write cannot clobber a `replied` row and vice versa.
pub async fn set_roster_status(
    pool: &SqlitePool,
    campaign_id: Uuid,
    lead_id: &str,
    expected: RosterStatus,
    new_status: RosterStatus,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE campaign_leads SET status = ? \
         WHERE campaign_id = ? AND lead_id = ? AND status = ?",
    )
    .bind(new_status.as_str())
    .bind(campaign_id.to_string())
    .bind(lead_id)
    .bind(expected.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn roster_status(
    pool: &SqlitePool,
    campaign_id: Uuid,
    lead_id: &str,
) -> Result<Option<RosterStatus>> {
    let row = sqlx::query(
        "SELECT status FROM campaign_leads WHERE campaign_id = ? AND lead_id = ?",
    )
    .bind(campaign_id.to_string())
    .bind(lead_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(RosterStatus::parse(row.get("status"))?)),
        None => Ok(None),
    }
}

/// Most recently created roster entry among the given leads, used as the
/// attribution fallback when no outbound history exists
pub async fn find_latest_roster_entry_by_leads(
    pool: &SqlitePool,
    lead_ids: &[String],
) -> Result<Option<RosterEntry>> {
    if lead_ids.is_empty() {
        return Ok(None);
    }

    let sql = format!(
        "SELECT campaign_id, lead_id, status FROM campaign_leads \
         WHERE lead_id IN ({}) ORDER BY created_at DESC, id DESC LIMIT 1",
        super::placeholders(lead_ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in lead_ids {
        query = query.bind(id);
    }

    let row = query.fetch_optional(pool).await?;
    match row {
        Some(row) => {
            let campaign_str: String = row.get("campaign_id");
            Ok(Some(RosterEntry {
                campaign_id: Uuid::parse_str(&campaign_str)
                    .map_err(|e| Error::Validation(format!("Bad campaign id: {}", e)))?,
                lead_id: row.get("lead_id"),
                status: RosterStatus::parse(row.get("status"))?,
            }))
        }
        None => Ok(None),
    }
}
