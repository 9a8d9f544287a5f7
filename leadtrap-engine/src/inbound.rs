//! Inbound reply attribution
//!
//! Maps an inbound SMS to the lead and campaign it logically belongs to.
//! Phone numbers are not unique across leads, so attribution prefers the
//! most recent outbound conversation, then the most recent roster entry,
//! then the first matching lead with no campaign context. Redelivered
//! notifications are exactly-once via the provider message id.

use crate::contacts::normalize_phone;
use crate::db;
use crate::db::campaigns::RosterStatus;
use crate::db::messages::{Direction, Message};
use leadtrap_common::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

/// Record one inbound reply, invoked once per provider notification.
///
/// Signature authenticity is the webhook layer's concern; by the time this
/// runs the notification is trusted. Duplicate deliveries are silently
/// ignored.
pub async fn attribute(
    pool: &SqlitePool,
    raw_from: &str,
    body: &str,
    provider_message_id: &str,
) -> Result<()> {
    // Idempotency guard: a provider id we have seen is a no-op
    if db::messages::provider_message_exists(pool, provider_message_id).await? {
        info!(
            provider_message_id = %provider_message_id,
            "Duplicate inbound delivery ignored"
        );
        return Ok(());
    }

    let from = normalize_phone(raw_from);

    // Exact match on normalized values; substring matching over the stored
    // blob would misattribute numbers that contain each other
    let candidates = db::leads::find_leads_by_phone(pool, &from).await?;
    if candidates.is_empty() {
        warn!(from = %from, "Inbound SMS from unknown number, dropping");
        return Ok(());
    }

    let candidate_ids: Vec<String> = candidates.iter().map(|l| l.radar_id.clone()).collect();

    // Most recent outbound conversation wins
    let (target_lead_id, campaign_id): (String, Option<Uuid>) =
        match db::messages::find_latest_outbound_by_leads(pool, &candidate_ids).await? {
            Some(last_outbound) => (last_outbound.lead_id, last_outbound.campaign_id),
            None => {
                // No history: fall back to the most recently created roster
                // entry, then to the first candidate with no campaign
                match db::campaigns::find_latest_roster_entry_by_leads(pool, &candidate_ids)
                    .await?
                {
                    Some(entry) => (entry.lead_id, Some(entry.campaign_id)),
                    None => (candidate_ids[0].clone(), None),
                }
            }
        };

    let mut message = Message::new(
        campaign_id,
        &target_lead_id,
        Direction::Inbound,
        body,
        "received",
    );
    message.provider_message_id = Some(provider_message_id.to_string());
    message.to_phone = Some(from.clone());

    // The unique provider id closes the race between the guard above and
    // a concurrent delivery of the same notification
    let inserted = db::messages::append_message(pool, &message).await?;
    if !inserted {
        info!(
            provider_message_id = %provider_message_id,
            "Duplicate inbound delivery ignored (lost insert race)"
        );
        return Ok(());
    }

    if let Some(campaign_id) = campaign_id {
        // sent -> replied is the only legal reply transition; a row in any
        // other state is left untouched
        let moved = db::campaigns::set_roster_status(
            pool,
            campaign_id,
            &target_lead_id,
            RosterStatus::Sent,
            RosterStatus::Replied,
        )
        .await?;
        if !moved {
            info!(
                campaign_id = %campaign_id,
                lead_id = %target_lead_id,
                "Roster entry not in sent state, reply recorded without transition"
            );
        }
    }

    info!(
        from = %from,
        lead_id = %target_lead_id,
        campaign_id = ?campaign_id,
        "Inbound SMS attributed"
    );
    Ok(())
}
