//! Scan reconciliation
//!
//! Partitions the current watch-set membership into identifiers the store
//! already owns and identifiers that are new, without spending money.
//! Owned records are assembled strictly from the local store; new members
//! get a lightweight preview with no contact fields.

use crate::clients::{ExternalDataClient, MemberSummary};
use crate::criteria::SearchCriteria;
use crate::db;
use crate::db::leads::Lead;
use leadtrap_common::{Error, Result};
use sqlx::SqlitePool;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Retry attempts for idempotent provider reads
const READ_RETRIES: u32 = 3;

/// Initial backoff between retries; doubles per attempt
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Preview of a not-yet-purchased member. Contact fields are never
/// populated at this stage.
#[derive(Debug, Clone)]
pub struct LeadPreview {
    pub radar_id: String,
    pub address: String,
    pub owner_label: String,
    /// Equity is unknown until enrichment; always zero here
    pub estimated_equity: i64,
}

impl LeadPreview {
    fn from_member(member: &MemberSummary) -> Self {
        LeadPreview {
            radar_id: member.radar_id.clone(),
            address: member
                .address
                .clone()
                .unwrap_or_else(|| "Unknown Address".to_string()),
            owner_label: member
                .owner_label
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            estimated_equity: 0,
        }
    }
}

/// Result of one scan invocation
#[derive(Debug)]
pub struct ScanSummary {
    pub new_previews: Vec<LeadPreview>,
    pub owned_full: Vec<Lead>,
    pub total_found: usize,
}

/// Retry an idempotent provider read with exponential backoff.
///
/// Only `Provider` errors are retried; anything else is terminal.
async fn with_read_retry<T, F, Fut>(operation_name: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = RETRY_BACKOFF;
    let mut last_err = None;

    for attempt in 1..=READ_RETRIES {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < READ_RETRIES => {
                warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Provider read failed, retrying"
                );
                sleep(backoff).await;
                backoff *= 2;
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_err.unwrap_or_else(|| Error::Provider(format!("{} failed", operation_name))))
}

/// Resolve the watch set for `criteria` by logical name, creating it when
/// absent. The listing is re-checked before every creation attempt so a
/// duplicate creation under load cannot produce two sets with the same
/// logical name; creation itself is retried with backoff while the
/// provider is still materializing a just-created set.
pub async fn find_or_create_watch_set(
    client: &dyn ExternalDataClient,
    criteria: &SearchCriteria,
) -> Result<String> {
    let name = criteria.watch_set_name();
    let mut backoff = RETRY_BACKOFF;

    for attempt in 1..=READ_RETRIES {
        let sets = with_read_retry("list_watch_sets", || client.list_watch_sets()).await?;
        if let Some(existing) = sets.iter().find(|s| s.name == name) {
            info!(watch_set = %name, id = %existing.id, "Found existing watch set");
            return Ok(existing.id.clone());
        }

        info!(watch_set = %name, "Watch set not found, creating");
        match client
            .create_watch_set(&name, &criteria.provider_criteria())
            .await
        {
            Ok(id) => return Ok(id),
            Err(err) if err.is_retryable() && attempt < READ_RETRIES => {
                warn!(
                    watch_set = %name,
                    attempt,
                    error = %err,
                    "Watch set creation failed, re-checking and retrying"
                );
                sleep(backoff).await;
                backoff *= 2;
            }
            Err(err) => return Err(err),
        }
    }

    // Terminal: no partial summary is produced
    Err(Error::Provider(format!(
        "Could not resolve or create watch set '{}' after {} attempts",
        name, READ_RETRIES
    )))
}

/// Run one scan: resolve the watch set, pull current members and partition
/// them against the local store. No per-item purchase occurs anywhere in
/// this path.
pub async fn scan(
    pool: &SqlitePool,
    client: &dyn ExternalDataClient,
    criteria: &SearchCriteria,
) -> Result<ScanSummary> {
    let watch_set_id = find_or_create_watch_set(client, criteria).await?;

    let members =
        with_read_retry("list_members", || client.list_members(&watch_set_id)).await?;
    let total_found = members.len();

    let all_ids: Vec<String> = members.iter().map(|m| m.radar_id.clone()).collect();
    let owned_set = db::leads::purchased_ids(pool, &all_ids).await?;

    let owned_ids: Vec<String> = all_ids
        .iter()
        .filter(|id| owned_set.contains(*id))
        .cloned()
        .collect();

    // Owned records come from the local store only; re-fetching from the
    // provider during a scan would incur cost
    let owned_full = db::leads::load_leads(pool, &owned_ids).await?;

    let new_previews: Vec<LeadPreview> = members
        .iter()
        .filter(|m| !owned_set.contains(&m.radar_id))
        .map(LeadPreview::from_member)
        .collect();

    // Receipt for this invocation; a scan never saves leads
    let batch_id = db::batches::create_batch(pool, criteria, total_found as i64).await?;

    info!(
        watch_set_id = %watch_set_id,
        batch_id = %batch_id,
        total_found,
        owned = owned_full.len(),
        new = new_previews.len(),
        "Scan complete"
    );

    Ok(ScanSummary {
        new_previews,
        owned_full,
        total_found,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{Person, WatchSet};
    use crate::contacts::{ContactKind, ContactRecord};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyClient {
        create_failures: AtomicU32,
    }

    #[async_trait]
    impl ExternalDataClient for FlakyClient {
        async fn list_watch_sets(&self) -> Result<Vec<WatchSet>> {
            Ok(vec![])
        }

        async fn create_watch_set(&self, _name: &str, _criteria: &Value) -> Result<String> {
            if self.create_failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                n.checked_sub(1)
            })
            .is_ok()
            {
                return Err(Error::Provider("list still materializing".into()));
            }
            Ok("L42".to_string())
        }

        async fn list_members(&self, _watch_set_id: &str) -> Result<Vec<MemberSummary>> {
            Ok(vec![])
        }

        async fn get_record(&self, _radar_id: &str) -> Result<Option<Value>> {
            Ok(None)
        }

        async fn get_contacts(&self, _radar_id: &str) -> Result<Vec<Person>> {
            Ok(vec![])
        }

        async fn unlock_field(
            &self,
            _person_key: &str,
            _kind: ContactKind,
        ) -> Result<Vec<ContactRecord>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn creation_retries_while_provider_materializes() {
        let client = FlakyClient {
            create_failures: AtomicU32::new(1),
        };
        let criteria = SearchCriteria::new("VA", Some("RICHMOND".into()), "pre_foreclosure");

        let id = find_or_create_watch_set(&client, &criteria).await.unwrap();
        assert_eq!(id, "L42");
    }

    #[tokio::test]
    async fn creation_gives_up_after_retries() {
        let client = FlakyClient {
            create_failures: AtomicU32::new(10),
        };
        let criteria = SearchCriteria::new("VA", None, "vacant");

        let result = find_or_create_watch_set(&client, &criteria).await;
        assert!(matches!(result, Err(Error::Provider(_))));
    }

    #[test]
    fn preview_fills_placeholders() {
        let member = MemberSummary {
            radar_id: "P9".into(),
            address: None,
            owner_label: None,
        };
        let preview = LeadPreview::from_member(&member);
        assert_eq!(preview.address, "Unknown Address");
        assert_eq!(preview.owner_label, "Unknown");
        assert_eq!(preview.estimated_equity, 0);
    }
}
