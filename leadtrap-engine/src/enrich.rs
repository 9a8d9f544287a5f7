//! Enrichment orchestration
//!
//! Purchases full records for a selected set of identifiers, one at a time.
//! Each identifier is isolated: a single failure is logged and skipped, it
//! never aborts the rest of the batch. Enrichment runs sequentially on
//! purpose; every unit has a real monetary cost and racing the unlock
//! decision risks paying twice for the same field.

use crate::clients::{ExternalDataClient, Person};
use crate::contacts::{needs_unlock, normalize_contact_items, normalize_phone, ContactKind};
use crate::criteria::SearchCriteria;
use crate::db;
use crate::db::leads::Lead;
use leadtrap_common::Result;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of one enrichment invocation
#[derive(Debug)]
pub struct EnrichOutcome {
    /// Identifiers that were upserted successfully
    pub saved_count: usize,
    /// Identifiers that failed and were skipped
    pub failed_count: usize,
    pub batch_id: Uuid,
}

/// First non-empty string under any of `keys`
fn record_str(record: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| record.get(k))
        .filter_map(|v| v.as_str())
        .find(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// First integer under any of `keys` (provider sometimes sends numbers as strings)
fn record_i64(record: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().filter_map(|k| record.get(k)).find_map(|v| {
        v.as_i64()
            .or_else(|| v.as_str().and_then(|s| s.parse::<i64>().ok()))
    })
}

fn record_f64(record: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().filter_map(|k| record.get(k)).find_map(|v| {
        v.as_f64()
            .or_else(|| v.as_str().and_then(|s| s.parse::<f64>().ok()))
    })
}

/// Select the primary contact: provider-flagged primary first, else the
/// first person returned
fn select_primary(persons: &[Person]) -> Option<&Person> {
    persons
        .iter()
        .find(|p| p.is_primary)
        .or_else(|| persons.first())
}

/// Resolve the stored values for one contact field of one person.
///
/// The store is checked first: a field that already holds values is never
/// unlocked again, regardless of what the provider's contact payload says.
/// The unlock call is the only spend operation and is never retried.
async fn resolve_field_values(
    client: &dyn ExternalDataClient,
    existing: Option<&Lead>,
    person: &Person,
    kind: ContactKind,
) -> Result<Vec<String>> {
    let stored = existing.map(|lead| match kind {
        ContactKind::Phone => &lead.phone_numbers,
        ContactKind::Email => &lead.email_addresses,
    });
    if let Some(values) = stored.filter(|v| !v.is_empty()) {
        return Ok(values.clone());
    }

    let mut records = normalize_contact_items(kind, person.contact_items(kind));

    if needs_unlock(&records) {
        match person.person_key.as_deref() {
            Some(person_key) => {
                info!(
                    person_key = %person_key,
                    field = kind.provider_field(),
                    "Unlocking contact field"
                );
                records = client.unlock_field(person_key, kind).await?;
            }
            None => {
                warn!(
                    field = kind.provider_field(),
                    "Locked field but person has no key; skipping unlock"
                );
            }
        }
    }

    let values = records
        .into_iter()
        .filter_map(|r| r.value)
        .map(|v| match kind {
            ContactKind::Phone => normalize_phone(&v),
            ContactKind::Email => v,
        })
        .collect();

    Ok(values)
}

/// Enrich one identifier: fetch the record and contacts, unlock fields only
/// when required, and upsert the lead marked purchased.
async fn enrich_one(
    pool: &SqlitePool,
    client: &dyn ExternalDataClient,
    radar_id: &str,
) -> Result<()> {
    // A missing record is not fatal; continue with a stub keyed by id
    let record = client.get_record(radar_id).await?;
    if record.is_none() {
        warn!(radar_id = %radar_id, "No property record from provider, saving stub");
    }

    // Contact metadata; this call never causes a purchase
    let persons = client.get_contacts(radar_id).await?;
    let primary = select_primary(&persons);

    let existing = db::leads::load_lead(pool, radar_id).await?;

    let mut lead = match &record {
        Some(record) => Lead {
            radar_id: radar_id.to_string(),
            address: record_str(record, &["Address"]),
            city: record_str(record, &["City"]),
            state: record_str(record, &["State"]),
            zip_code: record_str(record, &["Zip", "ZipFive"]),
            beds: record_i64(record, &["Beds"]),
            baths: record_f64(record, &["Baths"]),
            sq_ft: record_i64(record, &["SqFt"]),
            year_built: record_i64(record, &["Year", "YearBuilt"]),
            estimated_value: record_i64(record, &["AVM"]),
            estimated_equity: record_i64(record, &["Equity", "AvailableEquity"]),
            raw_data: Some(record.clone()),
            ..Default::default()
        },
        None => Lead::stub(radar_id),
    };

    if let Some(person) = primary {
        let name = person.owner_name();
        if !name.is_empty() {
            lead.owner_name = Some(name);
        }
        lead.phone_numbers =
            resolve_field_values(client, existing.as_ref(), person, ContactKind::Phone).await?;
        lead.email_addresses =
            resolve_field_values(client, existing.as_ref(), person, ContactKind::Email).await?;
    } else if let Some(existing) = &existing {
        // No contact metadata this time; keep what the store already holds
        lead.owner_name = existing.owner_name.clone();
        lead.phone_numbers = existing.phone_numbers.clone();
        lead.email_addresses = existing.email_addresses.clone();
    }

    // Enrichment is a purchase event regardless of whether any field
    // required an unlock call
    lead.purchased = true;

    db::leads::upsert_lead(pool, &lead).await?;
    Ok(())
}

/// Enrich the selected identifiers under one batch receipt.
pub async fn enrich(
    pool: &SqlitePool,
    client: &dyn ExternalDataClient,
    ids: &[String],
    criteria: &SearchCriteria,
) -> Result<EnrichOutcome> {
    let batch_id = db::batches::create_batch(pool, criteria, ids.len() as i64).await?;

    let mut saved_count = 0;
    let mut failed_count = 0;

    for (idx, radar_id) in ids.iter().enumerate() {
        info!(
            radar_id = %radar_id,
            progress = format!("{}/{}", idx + 1, ids.len()),
            "Enriching lead"
        );

        match enrich_one(pool, client, radar_id).await {
            Ok(()) => {
                saved_count += 1;
                if let Err(e) = db::batches::link_lead_to_batch(pool, batch_id, radar_id).await {
                    warn!(
                        radar_id = %radar_id,
                        batch_id = %batch_id,
                        error = %e,
                        "Failed to link lead to batch (non-fatal, continuing)"
                    );
                }
            }
            Err(e) => {
                failed_count += 1;
                warn!(
                    radar_id = %radar_id,
                    error = %e,
                    "Enrichment failed for lead (non-fatal, continuing)"
                );
            }
        }
    }

    // The receipt's result count is written exactly once, at the end
    db::batches::set_saved_count(pool, batch_id, saved_count as i64).await?;

    info!(
        batch_id = %batch_id,
        saved = saved_count,
        failed = failed_count,
        "Enrichment complete"
    );

    Ok(EnrichOutcome {
        saved_count,
        failed_count,
        batch_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{MemberSummary, WatchSet};
    use crate::contacts::ContactRecord;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Mock provider with scripted records/contacts and an unlock counter
    #[derive(Default)]
    struct MockProvider {
        records: Mutex<HashMap<String, Value>>,
        persons: Mutex<HashMap<String, Vec<Person>>>,
        unlock_results: Mutex<HashMap<String, Vec<ContactRecord>>>,
        unlock_calls: AtomicU32,
        fail_record_for: Option<String>,
    }

    #[async_trait]
    impl ExternalDataClient for MockProvider {
        async fn list_watch_sets(&self) -> Result<Vec<WatchSet>> {
            Ok(vec![])
        }

        async fn create_watch_set(&self, _name: &str, _criteria: &Value) -> Result<String> {
            Ok("L1".into())
        }

        async fn list_members(&self, _watch_set_id: &str) -> Result<Vec<MemberSummary>> {
            Ok(vec![])
        }

        async fn get_record(&self, radar_id: &str) -> Result<Option<Value>> {
            if self.fail_record_for.as_deref() == Some(radar_id) {
                return Err(leadtrap_common::Error::Provider("boom".into()));
            }
            Ok(self.records.lock().unwrap().get(radar_id).cloned())
        }

        async fn get_contacts(&self, radar_id: &str) -> Result<Vec<Person>> {
            Ok(self
                .persons
                .lock()
                .unwrap()
                .get(radar_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn unlock_field(
            &self,
            person_key: &str,
            _kind: ContactKind,
        ) -> Result<Vec<ContactRecord>> {
            self.unlock_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .unlock_results
                .lock()
                .unwrap()
                .get(person_key)
                .cloned()
                .unwrap_or_default())
        }
    }

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        leadtrap_common::db::init::create_tables(&pool).await.unwrap();
        pool
    }

    fn criteria() -> SearchCriteria {
        SearchCriteria::new("VA", Some("RICHMOND".into()), "pre_foreclosure")
    }

    fn locked_phone_person(key: &str) -> Person {
        Person {
            person_key: Some(key.to_string()),
            first_name: Some("James".into()),
            last_name: Some("Fenner".into()),
            is_primary: true,
            phone_items: vec![json!({ "href": "/purchase/1", "value": null })],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn locked_phone_is_unlocked_once_then_never_again() {
        let pool = test_pool().await;
        let provider = MockProvider::default();
        provider
            .records
            .lock()
            .unwrap()
            .insert("P1".into(), json!({ "RadarID": "P1", "Address": "1 Elm St" }));
        provider
            .persons
            .lock()
            .unwrap()
            .insert("P1".into(), vec![locked_phone_person("PK1")]);
        provider.unlock_results.lock().unwrap().insert(
            "PK1".into(),
            vec![ContactRecord::unlocked(ContactKind::Phone, "+15551234567")],
        );

        let outcome = enrich(&pool, &provider, &["P1".to_string()], &criteria())
            .await
            .unwrap();
        assert_eq!(outcome.saved_count, 1);
        assert_eq!(provider.unlock_calls.load(Ordering::SeqCst), 1);

        let lead = db::leads::load_lead(&pool, "P1").await.unwrap().unwrap();
        assert_eq!(lead.phone_numbers, vec!["+15551234567".to_string()]);
        assert!(lead.purchased);

        // Second enrichment of the same identifier: store already holds the
        // phone, no second unlock call
        let outcome = enrich(&pool, &provider, &["P1".to_string()], &criteria())
            .await
            .unwrap();
        assert_eq!(outcome.saved_count, 1);
        assert_eq!(provider.unlock_calls.load(Ordering::SeqCst), 1);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leads")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn already_unlocked_value_never_purchases() {
        let pool = test_pool().await;
        let provider = MockProvider::default();
        provider
            .records
            .lock()
            .unwrap()
            .insert("P2".into(), json!({ "RadarID": "P2" }));
        provider.persons.lock().unwrap().insert(
            "P2".into(),
            vec![Person {
                person_key: Some("PK2".into()),
                is_primary: true,
                phone_items: vec![
                    json!({ "href": "/purchase/2" }),
                    json!({ "Value": "555-123-4567" }),
                ],
                ..Default::default()
            }],
        );

        enrich(&pool, &provider, &["P2".to_string()], &criteria())
            .await
            .unwrap();

        assert_eq!(provider.unlock_calls.load(Ordering::SeqCst), 0);
        let lead = db::leads::load_lead(&pool, "P2").await.unwrap().unwrap();
        assert_eq!(lead.phone_numbers, vec!["+15551234567".to_string()]);
    }

    #[tokio::test]
    async fn per_item_failure_does_not_abort_batch() {
        let pool = test_pool().await;
        let provider = MockProvider {
            fail_record_for: Some("BAD".into()),
            ..Default::default()
        };
        provider
            .records
            .lock()
            .unwrap()
            .insert("P3".into(), json!({ "RadarID": "P3" }));

        let ids = vec!["BAD".to_string(), "P3".to_string()];
        let outcome = enrich(&pool, &provider, &ids, &criteria()).await.unwrap();

        assert_eq!(outcome.saved_count, 1);
        assert_eq!(outcome.failed_count, 1);

        let batch = db::batches::load_batch(&pool, outcome.batch_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.saved_count, 1);
        assert_eq!(batch.total_found, 2);
    }

    #[tokio::test]
    async fn missing_record_saves_stub_marked_purchased() {
        let pool = test_pool().await;
        let provider = MockProvider::default();

        let outcome = enrich(&pool, &provider, &["GHOST".to_string()], &criteria())
            .await
            .unwrap();
        assert_eq!(outcome.saved_count, 1);

        let lead = db::leads::load_lead(&pool, "GHOST").await.unwrap().unwrap();
        assert!(lead.purchased);
        assert!(lead.address.is_none());
    }
}
