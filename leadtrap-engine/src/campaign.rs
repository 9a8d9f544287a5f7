//! Campaign creation and dispatch
//!
//! Drives queued roster entries through templated sends, one at a time,
//! with a fixed delay between sends. The delay is a mitigation against
//! carrier-level filtering of bursty traffic, not a performance knob.
//! Failures are per-entry; the dispatcher always finishes the batch.

use crate::clients::MessagingProvider;
use crate::db;
use crate::db::campaigns::{CampaignStatus, RosterStatus};
use crate::db::leads::Lead;
use crate::db::messages::{Direction, Message};
use leadtrap_common::{Error, Result};
use sqlx::SqlitePool;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

/// Mandatory delay between consecutive sends
pub const INTER_SEND_DELAY: Duration = Duration::from_millis(1000);

/// Fallbacks for template placeholders
const FALLBACK_NAME: &str = "Homeowner";
const FALLBACK_ADDRESS: &str = "your property";
const FALLBACK_CITY: &str = "your area";

/// Result of one dispatch run
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub sent: usize,
    pub failed: usize,
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render the campaign template for a lead.
///
/// `{name}` gets the first token of the owner name ("JAMES FENNER" ->
/// "James"), `{address}` the street portion before the first comma, and
/// `{city}` the stored city; each falls back to a generic literal.
pub fn render_template(template: &str, lead: &Lead) -> String {
    let first_name = lead
        .owner_name
        .as_deref()
        .and_then(|name| name.split_whitespace().next())
        .map(title_case)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_NAME.to_string());

    let address = lead
        .address
        .as_deref()
        .map(|a| title_case(a.split(',').next().unwrap_or(a)))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_ADDRESS.to_string());

    let city = lead
        .city
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_CITY.to_string());

    template
        .replace("{name}", &first_name)
        .replace("{address}", &address)
        .replace("{city}", &city)
}

/// Create a campaign and queue the given leads on its roster.
///
/// Unknown identifiers are skipped; when none of the ids exist the call
/// fails with `NotFound` and no campaign is created.
pub async fn create_campaign_with_roster(
    pool: &SqlitePool,
    name: &str,
    template_body: &str,
    lead_ids: &[String],
) -> Result<(Uuid, usize)> {
    let known = db::leads::load_leads(pool, lead_ids).await?;
    if known.is_empty() {
        return Err(Error::NotFound(
            "No known leads match the provided identifiers".to_string(),
        ));
    }

    let campaign_id = db::campaigns::create_campaign(pool, name, template_body).await?;
    let known_ids: Vec<String> = known.into_iter().map(|l| l.radar_id).collect();
    let queued = db::campaigns::create_roster_entries(pool, campaign_id, &known_ids).await?;

    info!(campaign_id = %campaign_id, queued, "Campaign created");
    Ok((campaign_id, queued))
}

/// One dispatch attempt for one roster entry. Returns the message row to
/// log and whether the dispatch succeeded.
async fn attempt_send(
    messaging: &dyn MessagingProvider,
    campaign_id: Uuid,
    lead: &Lead,
    body: String,
) -> (Message, bool) {
    // Outbound number is deterministic: first stored phone value
    let to_phone = match lead.phone_numbers.first() {
        Some(phone) => phone.clone(),
        None => {
            // Local failure, no provider call made
            let mut message = Message::new(
                Some(campaign_id),
                &lead.radar_id,
                Direction::Outbound,
                body,
                "failed",
            );
            message.error_reason = Some("no phone number".to_string());
            return (message, false);
        }
    };

    match messaging.send(&to_phone, &body).await {
        Ok(receipt) => {
            // "queued for delivery" from the provider counts as success
            let mut message = Message::new(
                Some(campaign_id),
                &lead.radar_id,
                Direction::Outbound,
                body,
                receipt.status,
            );
            message.provider_message_id = Some(receipt.provider_message_id);
            message.to_phone = Some(to_phone);
            message.cost = receipt.cost;
            (message, true)
        }
        Err(e) => {
            let mut message = Message::new(
                Some(campaign_id),
                &lead.radar_id,
                Direction::Outbound,
                body,
                "failed",
            );
            message.to_phone = Some(to_phone);
            message.error_reason = Some(e.to_string());
            (message, false)
        }
    }
}

/// Process every queued roster entry for a campaign sequentially.
pub async fn dispatch_campaign(
    pool: &SqlitePool,
    messaging: &dyn MessagingProvider,
    campaign_id: Uuid,
) -> Result<DispatchOutcome> {
    dispatch_campaign_with_delay(pool, messaging, campaign_id, INTER_SEND_DELAY).await
}

/// Dispatch with an explicit inter-send delay (tests pass zero).
pub async fn dispatch_campaign_with_delay(
    pool: &SqlitePool,
    messaging: &dyn MessagingProvider,
    campaign_id: Uuid,
    delay: Duration,
) -> Result<DispatchOutcome> {
    let campaign = db::campaigns::load_campaign(pool, campaign_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Campaign {} not found", campaign_id)))?;

    let entries = db::campaigns::queued_entries(pool, campaign_id).await?;
    info!(
        campaign_id = %campaign_id,
        campaign = %campaign.name,
        queued = entries.len(),
        "Starting campaign dispatch"
    );

    let mut outcome = DispatchOutcome::default();

    for (idx, entry) in entries.iter().enumerate() {
        let lead = match db::leads::load_lead(pool, &entry.lead_id).await? {
            Some(lead) => lead,
            None => {
                // Roster references a lead the store no longer has
                warn!(
                    campaign_id = %campaign_id,
                    lead_id = %entry.lead_id,
                    "Roster entry references unknown lead, marking failed"
                );
                let mut message = Message::new(
                    Some(campaign_id),
                    &entry.lead_id,
                    Direction::Outbound,
                    campaign.template_body.clone(),
                    "failed",
                );
                message.error_reason = Some("lead not found".to_string());
                db::messages::append_message(pool, &message).await?;
                db::campaigns::set_roster_status(
                    pool,
                    campaign_id,
                    &entry.lead_id,
                    RosterStatus::Queued,
                    RosterStatus::Failed,
                )
                .await?;
                outcome.failed += 1;
                continue;
            }
        };

        let body = render_template(&campaign.template_body, &lead);
        let (message, success) = attempt_send(messaging, campaign_id, &lead, body).await;

        // The log row is appended whether the attempt succeeded or not
        db::messages::append_message(pool, &message).await?;

        let new_status = if success {
            outcome.sent += 1;
            RosterStatus::Sent
        } else {
            outcome.failed += 1;
            warn!(
                campaign_id = %campaign_id,
                lead_id = %lead.radar_id,
                error = ?message.error_reason,
                "Dispatch attempt failed"
            );
            RosterStatus::Failed
        };

        // Conditional write: a reply or stop that raced in wins
        let moved = db::campaigns::set_roster_status(
            pool,
            campaign_id,
            &lead.radar_id,
            RosterStatus::Queued,
            new_status,
        )
        .await?;
        if !moved {
            warn!(
                campaign_id = %campaign_id,
                lead_id = %lead.radar_id,
                "Roster entry moved concurrently, leaving its status untouched"
            );
        }

        // Carrier-filter mitigation, applied between entries
        if idx + 1 < entries.len() && !delay.is_zero() {
            sleep(delay).await;
        }
    }

    db::campaigns::set_campaign_status(pool, campaign_id, CampaignStatus::Completed).await?;

    info!(
        campaign_id = %campaign_id,
        sent = outcome.sent,
        failed = outcome.failed,
        "Campaign dispatch complete"
    );
    Ok(outcome)
}

/// Send a single immediate message to a lead, outside the dispatch loop.
///
/// Surfaces `NotFound` for an unknown lead and `Validation` when the lead
/// has no phone number; the attempt is logged either way once a body has a
/// target.
pub async fn send_one_off(
    pool: &SqlitePool,
    messaging: &dyn MessagingProvider,
    campaign_id: Option<Uuid>,
    lead_id: &str,
    body: &str,
) -> Result<Message> {
    let lead = db::leads::load_lead(pool, lead_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Lead {} not found", lead_id)))?;

    let to_phone = lead
        .phone_numbers
        .first()
        .cloned()
        .ok_or_else(|| Error::Validation("Lead has no phone number".to_string()))?;

    let mut message = match messaging.send(&to_phone, body).await {
        Ok(receipt) => {
            let mut message = Message::new(
                campaign_id,
                lead_id,
                Direction::Outbound,
                body,
                receipt.status,
            );
            message.provider_message_id = Some(receipt.provider_message_id);
            message.cost = receipt.cost;
            message
        }
        Err(e) => {
            let mut message =
                Message::new(campaign_id, lead_id, Direction::Outbound, body, "failed");
            message.error_reason = Some(e.to_string());
            message
        }
    };
    message.to_phone = Some(to_phone);

    db::messages::append_message(pool, &message).await?;

    if let Some(campaign_id) = campaign_id {
        if message.error_reason.is_none() {
            db::campaigns::set_roster_status(
                pool,
                campaign_id,
                lead_id,
                RosterStatus::Queued,
                RosterStatus::Sent,
            )
            .await?;
        }
    }

    Ok(message)
}
