//! End-to-end pipeline tests against in-memory SQLite and mock providers:
//! scan partitioning, enrichment purchases, campaign dispatch, and inbound
//! attribution working together.

use async_trait::async_trait;
use leadtrap_common::{Error, Result};
use leadtrap_engine::campaign;
use leadtrap_engine::clients::{
    ExternalDataClient, MemberSummary, MessagingProvider, Person, SendReceipt, WatchSet,
};
use leadtrap_engine::contacts::{ContactKind, ContactRecord};
use leadtrap_engine::criteria::SearchCriteria;
use leadtrap_engine::db;
use leadtrap_engine::db::campaigns::RosterStatus;
use leadtrap_engine::db::leads::Lead;
use leadtrap_engine::{enrich, inbound, scan};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

async fn test_pool() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    leadtrap_common::db::init::create_tables(&pool)
        .await
        .expect("Failed to create tables");
    pool
}

fn criteria() -> SearchCriteria {
    SearchCriteria::new("VA", Some("RICHMOND".into()), "pre_foreclosure")
}

/// Scripted data provider: a single watch set with fixed members
#[derive(Default)]
struct ScriptedProvider {
    members: Vec<MemberSummary>,
    records: Mutex<HashMap<String, Value>>,
    persons: Mutex<HashMap<String, Vec<Person>>>,
    unlock_results: Mutex<HashMap<String, Vec<ContactRecord>>>,
    unlock_calls: AtomicU32,
}

#[async_trait]
impl ExternalDataClient for ScriptedProvider {
    async fn list_watch_sets(&self) -> Result<Vec<WatchSet>> {
        Ok(vec![WatchSet {
            id: "WS1".into(),
            name: "Auto_Monitor_RICHMOND_pre_foreclosure".into(),
        }])
    }

    async fn create_watch_set(&self, _name: &str, _criteria: &Value) -> Result<String> {
        Ok("WS1".into())
    }

    async fn list_members(&self, _watch_set_id: &str) -> Result<Vec<MemberSummary>> {
        Ok(self.members.clone())
    }

    async fn get_record(&self, radar_id: &str) -> Result<Option<Value>> {
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

fn member(id: &str) -> MemberSummary {
    MemberSummary {
        radar_id: id.to_string(),
        address: Some(format!("{} Main St", id)),
        owner_label: Some("OWNER".into()),
    }
}

/// Messaging mock that succeeds with sequential message ids
#[derive(Default)]
struct RecordingMessenger {
    sends: Mutex<Vec<(String, String)>>,
    fail_numbers: Vec<String>,
}

#[async_trait]
impl MessagingProvider for RecordingMessenger {
    async fn send(&self, to_number: &str, body: &str) -> Result<SendReceipt> {
        if self.fail_numbers.iter().any(|n| n == to_number) {
            return Err(Error::Provider("unsubscribed recipient".into()));
        }
        let mut sends = self.sends.lock().unwrap();
        sends.push((to_number.to_string(), body.to_string()));
        Ok(SendReceipt {
            provider_message_id: format!("SM{}", sends.len()),
            status: "queued".into(),
            cost: Some(0.0079),
        })
    }
}

#[tokio::test]
async fn on_disk_pool_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("leadtrap.db");

    {
        let pool = db::init_database_pool(&db_path).await.unwrap();
        db::leads::upsert_lead(&pool, &Lead::stub("P1")).await.unwrap();
        pool.close().await;
    }

    let pool = db::init_database_pool(&db_path).await.unwrap();
    assert!(db::leads::lead_exists(&pool, "P1").await.unwrap());
}

#[tokio::test]
async fn scan_partitions_owned_and_new_without_contacts() {
    let pool = test_pool().await;

    // Store already owns two of the five members
    for id in ["P1", "P2"] {
        let mut lead = Lead::stub(id);
        lead.purchased = true;
        lead.address = Some(format!("{} Main St", id));
        db::leads::upsert_lead(&pool, &lead).await.unwrap();
    }

    let provider = ScriptedProvider {
        members: ["P1", "P2", "P3", "P4", "P5"].iter().copied().map(member).collect(),
        ..Default::default()
    };

    let summary = scan::scan(&pool, &provider, &criteria()).await.unwrap();

    assert_eq!(summary.total_found, 5);
    assert_eq!(summary.owned_full.len(), 2);
    assert_eq!(summary.new_previews.len(), 3);

    // Purchased identifiers never appear among the new previews
    for preview in &summary.new_previews {
        assert!(!["P1", "P2"].contains(&preview.radar_id.as_str()));
        assert_eq!(preview.estimated_equity, 0);
    }

    // No unlock call anywhere in a scan
    assert_eq!(provider.unlock_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn enrich_then_dispatch_then_reply() {
    let pool = test_pool().await;

    let provider = ScriptedProvider::default();
    provider.records.lock().unwrap().insert(
        "P7".into(),
        json!({
            "RadarID": "P7",
            "Address": "700 OAK AVE, RICHMOND, VA",
            "City": "RICHMOND",
            "State": "VA",
            "AVM": 310000,
            "Equity": 120000
        }),
    );
    provider.persons.lock().unwrap().insert(
        "P7".into(),
        vec![Person {
            person_key: Some("PK7".into()),
            first_name: Some("DANA".into()),
            last_name: Some("WELLS".into()),
            is_primary: true,
            phone_items: vec![json!({ "href": "/purchase/7" })],
            ..Default::default()
        }],
    );
    provider.unlock_results.lock().unwrap().insert(
        "PK7".into(),
        vec![ContactRecord::unlocked(ContactKind::Phone, "+15559990000")],
    );

    // Enrich: one unlock, lead saved purchased
    let outcome = enrich::enrich(&pool, &provider, &["P7".to_string()], &criteria())
        .await
        .unwrap();
    assert_eq!(outcome.saved_count, 1);
    assert_eq!(provider.unlock_calls.load(Ordering::SeqCst), 1);

    let batch = db::batches::load_batch(&pool, outcome.batch_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch.total_found, 1);
    assert_eq!(batch.saved_count, 1);

    // Campaign over the enriched lead
    let (campaign_id, queued) = campaign::create_campaign_with_roster(
        &pool,
        "Oak Ave outreach",
        "Hi {name}, interested in selling {address} in {city}?",
        &["P7".to_string()],
    )
    .await
    .unwrap();
    assert_eq!(queued, 1);

    let messenger = RecordingMessenger::default();
    let dispatch = campaign::dispatch_campaign_with_delay(
        &pool,
        &messenger,
        campaign_id,
        Duration::ZERO,
    )
    .await
    .unwrap();
    assert_eq!(dispatch.sent, 1);
    assert_eq!(dispatch.failed, 0);

    {
        let sends = messenger.sends.lock().unwrap();
        assert_eq!(sends[0].0, "+15559990000");
        assert_eq!(
            sends[0].1,
            "Hi Dana, interested in selling 700 Oak Ave in RICHMOND?"
        );
    }

    assert_eq!(
        db::campaigns::roster_status(&pool, campaign_id, "P7")
            .await
            .unwrap(),
        Some(RosterStatus::Sent)
    );

    // Inbound reply from the unlocked number attributes to this campaign
    inbound::attribute(&pool, "(555) 999-0000", "Yes, call me", "SMIN1")
        .await
        .unwrap();

    assert_eq!(
        db::campaigns::roster_status(&pool, campaign_id, "P7")
            .await
            .unwrap(),
        Some(RosterStatus::Replied)
    );

    let inbound_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM messages WHERE direction = 'inbound' AND campaign_id = ?",
    )
    .bind(campaign_id.to_string())
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(inbound_count, 1);
}

#[tokio::test]
async fn dispatch_continues_past_missing_phone() {
    let pool = test_pool().await;

    // One lead without any phone, one with
    let no_phone = Lead {
        radar_id: "NP".into(),
        owner_name: Some("ALEX REED".into()),
        purchased: true,
        ..Default::default()
    };
    db::leads::upsert_lead(&pool, &no_phone).await.unwrap();

    let mut with_phone = Lead::stub("WP");
    with_phone.purchased = true;
    with_phone.phone_numbers = vec!["+15551112222".into()];
    db::leads::upsert_lead(&pool, &with_phone).await.unwrap();

    let (campaign_id, _) = campaign::create_campaign_with_roster(
        &pool,
        "Mixed",
        "Hi {name}",
        &["NP".to_string(), "WP".to_string()],
    )
    .await
    .unwrap();

    let messenger = RecordingMessenger::default();
    let outcome = campaign::dispatch_campaign_with_delay(
        &pool,
        &messenger,
        campaign_id,
        Duration::ZERO,
    )
    .await
    .unwrap();

    // The local failure did not stop the batch
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.sent, 1);

    let (status, reason): (String, Option<String>) = sqlx::query_as(
        "SELECT status, error_reason FROM messages WHERE lead_id = 'NP'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(status, "failed");
    assert_eq!(reason.as_deref(), Some("no phone number"));

    assert_eq!(
        db::campaigns::roster_status(&pool, campaign_id, "NP")
            .await
            .unwrap(),
        Some(RosterStatus::Failed)
    );
    assert_eq!(
        db::campaigns::roster_status(&pool, campaign_id, "WP")
            .await
            .unwrap(),
        Some(RosterStatus::Sent)
    );

    // No provider call was made for the phoneless lead
    assert_eq!(messenger.sends.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn provider_failure_is_logged_and_counted() {
    let pool = test_pool().await;

    let mut lead = Lead::stub("LX");
    lead.purchased = true;
    lead.phone_numbers = vec!["+15553334444".into()];
    db::leads::upsert_lead(&pool, &lead).await.unwrap();

    let (campaign_id, _) = campaign::create_campaign_with_roster(
        &pool,
        "Failing",
        "Hi {name}",
        &["LX".to_string()],
    )
    .await
    .unwrap();

    let messenger = RecordingMessenger {
        fail_numbers: vec!["+15553334444".into()],
        ..Default::default()
    };
    let outcome = campaign::dispatch_campaign_with_delay(
        &pool,
        &messenger,
        campaign_id,
        Duration::ZERO,
    )
    .await
    .unwrap();

    assert_eq!(outcome.sent, 0);
    assert_eq!(outcome.failed, 1);

    let reason: Option<String> =
        sqlx::query_scalar("SELECT error_reason FROM messages WHERE lead_id = 'LX'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(reason.unwrap().contains("unsubscribed recipient"));
}

#[tokio::test]
async fn one_off_send_is_logged_outside_any_campaign() {
    let pool = test_pool().await;

    let mut lead = Lead::stub("LO");
    lead.purchased = true;
    lead.phone_numbers = vec!["+15558889999".into()];
    db::leads::upsert_lead(&pool, &lead).await.unwrap();

    let messenger = RecordingMessenger::default();
    let message = campaign::send_one_off(&pool, &messenger, None, "LO", "Quick question")
        .await
        .unwrap();

    assert_eq!(message.status, "queued");
    assert!(message.campaign_id.is_none());
    assert_eq!(message.to_phone.as_deref(), Some("+15558889999"));

    // Unknown lead surfaces NotFound without touching the provider
    let err = campaign::send_one_off(&pool, &messenger, None, "missing", "hi")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(messenger.sends.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn campaign_marked_completed_after_dispatch() {
    let pool = test_pool().await;

    let mut lead = Lead::stub("LC");
    lead.purchased = true;
    lead.phone_numbers = vec!["+15556667777".into()];
    db::leads::upsert_lead(&pool, &lead).await.unwrap();

    let (campaign_id, _) = campaign::create_campaign_with_roster(
        &pool,
        "Done",
        "Hi {name}",
        &["LC".to_string()],
    )
    .await
    .unwrap();

    let messenger = RecordingMessenger::default();
    campaign::dispatch_campaign_with_delay(&pool, &messenger, campaign_id, Duration::ZERO)
        .await
        .unwrap();

    let campaign = db::campaigns::load_campaign(&pool, campaign_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(campaign.status, "completed");
}
