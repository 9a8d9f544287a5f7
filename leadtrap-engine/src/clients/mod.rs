//! Provider client seams
//!
//! The engine consumes the data provider and the messaging provider through
//! these traits only; tests substitute in-process implementations and the
//! binary wires up the HTTP clients in `radar` and `sms`.

pub mod radar;
pub mod sms;

use crate::contacts::{ContactKind, ContactRecord};
use async_trait::async_trait;
use leadtrap_common::Result;
use serde_json::Value;

/// A named persistent watch set held by the data provider
#[derive(Debug, Clone)]
pub struct WatchSet {
    pub id: String,
    pub name: String,
}

/// One member of a watch set, as surfaced by the membership listing.
///
/// The listing is free of charge and carries overview columns only; contact
/// fields are never present here.
#[derive(Debug, Clone)]
pub struct MemberSummary {
    pub radar_id: String,
    pub address: Option<String>,
    pub owner_label: Option<String>,
}

/// One person associated with a property, as returned by the provider.
///
/// Contact items stay loosely typed here; `contacts::normalize_contact_items`
/// turns them into canonical records at the decision point.
#[derive(Debug, Clone, Default)]
pub struct Person {
    pub person_key: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub entity_name: Option<String>,
    pub is_primary: bool,
    pub phone_items: Vec<Value>,
    pub email_items: Vec<Value>,
}

impl Person {
    /// Display name: entity name when present, else "First Last"
    pub fn owner_name(&self) -> String {
        if let Some(entity) = self.entity_name.as_deref().filter(|s| !s.is_empty()) {
            return entity.to_string();
        }
        let full = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        full.trim().to_string()
    }

    pub fn contact_items(&self, kind: ContactKind) -> &[Value] {
        match kind {
            ContactKind::Phone => &self.phone_items,
            ContactKind::Email => &self.email_items,
        }
    }
}

/// Metered property-data provider
///
/// `list_watch_sets`, `create_watch_set`, `list_members`, `get_record` and
/// `get_contacts` never incur a per-record charge; `unlock_field` is the
/// only spend operation and is never retried.
#[async_trait]
pub trait ExternalDataClient: Send + Sync {
    /// List all watch sets held with the provider (id + logical name)
    async fn list_watch_sets(&self) -> Result<Vec<WatchSet>>;

    /// Create a new monitored watch set; returns its id
    async fn create_watch_set(&self, name: &str, criteria: &Value) -> Result<String>;

    /// Current members of a watch set, without purchasing
    async fn list_members(&self, watch_set_id: &str) -> Result<Vec<MemberSummary>>;

    /// Full property record, or `None` when the provider has nothing
    async fn get_record(&self, radar_id: &str) -> Result<Option<Value>>;

    /// People associated with a property; never causes a purchase
    async fn get_contacts(&self, radar_id: &str) -> Result<Vec<Person>>;

    /// Metered unlock of one contact field for one person.
    /// Returns the revealed records, normalized.
    async fn unlock_field(&self, person_key: &str, kind: ContactKind)
        -> Result<Vec<ContactRecord>>;
}

/// Provider acknowledgment for one outbound send
#[derive(Debug, Clone)]
pub struct SendReceipt {
    pub provider_message_id: String,
    /// Provider-reported status; "queued" counts as dispatch success
    pub status: String,
    pub cost: Option<f64>,
}

/// Outbound SMS provider
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    /// Send one message. Errors surface as `Provider` (upstream failure)
    /// or `Validation` (provider unconfigured); never retried.
    async fn send(&self, to_number: &str, body: &str) -> Result<SendReceipt>;
}
