//! PropertyRadar-style HTTP client for the metered data provider
//!
//! Every call is a blocking I/O boundary with a bounded timeout. Unlock
//! calls are paced to avoid hammering the purchase endpoint; reads are not
//! paced (the provider does not meter them).

use crate::clients::{ExternalDataClient, MemberSummary, Person, WatchSet};
use crate::contacts::{normalize_contact_items, ContactKind, ContactRecord};
use async_trait::async_trait;
use leadtrap_common::{Error, Result};
use reqwest::{header, Client};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Data provider API base URL
const RADAR_API_URL: &str = "https://api.propertyradar.com/v1";

/// Default timeout for provider API requests
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Minimum interval between unlock (purchase) calls
const UNLOCK_INTERVAL: Duration = Duration::from_millis(500);

/// HTTP client for the property-data provider
pub struct RadarClient {
    http_client: Client,
    base_url: String,
    /// Last unlock request time, for pacing spend calls
    unlock_pacer: Arc<Mutex<Option<Instant>>>,
}

impl RadarClient {
    /// Create a client authenticated with the provider bearer token
    pub fn new(api_token: &str) -> Result<Self> {
        Self::with_base_url(api_token, RADAR_API_URL)
    }

    /// Create a client against a non-default base URL (used by tests)
    pub fn with_base_url(api_token: &str, base_url: &str) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", api_token))
            .map_err(|e| Error::Config(format!("Invalid provider token: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);

        let http_client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(RadarClient {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            unlock_pacer: Arc::new(Mutex::new(None)),
        })
    }

    /// Sleep if necessary to keep unlock calls at most one per interval
    async fn pace_unlock(&self) {
        let mut last_request = self.unlock_pacer.lock().await;
        if let Some(last_time) = *last_request {
            let elapsed = last_time.elapsed();
            if elapsed < UNLOCK_INTERVAL {
                let wait = UNLOCK_INTERVAL - elapsed;
                debug!(sleep_ms = wait.as_millis(), "Pacing unlock request");
                sleep(wait).await;
            }
        }
        *last_request = Some(Instant::now());
    }

    /// Execute a request and decode the JSON body, mapping transport and
    /// non-success statuses to `Provider` errors.
    async fn fetch_json(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Data provider request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "Data provider returned {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Failed to parse provider response: {}", e)))
    }

    fn parse_person(value: &Value) -> Person {
        let as_items = |v: Option<&Value>| -> Vec<Value> {
            v.and_then(|v| v.as_array()).cloned().unwrap_or_default()
        };

        Person {
            person_key: value
                .get("PersonKey")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            first_name: value
                .get("FirstName")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            last_name: value
                .get("LastName")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            entity_name: value
                .get("EntityName")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            // Provider sends 0/1, occasionally a bool
            is_primary: value
                .get("isPrimaryContact")
                .map(|v| v.as_i64().unwrap_or(0) != 0 || v.as_bool().unwrap_or(false))
                .unwrap_or(false),
            phone_items: as_items(value.get("Phone")),
            email_items: as_items(value.get("Email")),
        }
    }
}

#[async_trait]
impl ExternalDataClient for RadarClient {
    async fn list_watch_sets(&self) -> Result<Vec<WatchSet>> {
        let url = format!("{}/lists", self.base_url);
        let body = self.fetch_json(self.http_client.get(&url)).await?;

        let results = body
            .get("results")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let sets = results
            .iter()
            .filter_map(|item| {
                let id = item.get("ListID")?;
                let id = match id {
                    Value::Number(n) => n.to_string(),
                    Value::String(s) => s.clone(),
                    _ => return None,
                };
                let name = item.get("ListName")?.as_str()?.to_string();
                Some(WatchSet { id, name })
            })
            .collect();

        Ok(sets)
    }

    async fn create_watch_set(&self, name: &str, criteria: &Value) -> Result<String> {
        let url = format!("{}/lists", self.base_url);
        let payload = json!({
            "ListName": name,
            "ListType": "dynamic",
            "isMonitored": 1,
            "Criteria": criteria,
        });

        debug!(name = %name, "Creating watch set");
        let body = self
            .fetch_json(self.http_client.post(&url).json(&payload))
            .await?;

        match body.get("ListID") {
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            _ => Err(Error::Provider(
                "Watch set creation returned no ListID".to_string(),
            )),
        }
    }

    async fn list_members(&self, watch_set_id: &str) -> Result<Vec<MemberSummary>> {
        let url = format!("{}/lists/{}/items", self.base_url, watch_set_id);
        let body = self.fetch_json(self.http_client.get(&url)).await?;

        let results = body
            .get("results")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(results
            .iter()
            .filter_map(|item| {
                let radar_id = item.get("RadarID")?.as_str()?.to_string();
                Some(MemberSummary {
                    radar_id,
                    address: item
                        .get("Address")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string()),
                    owner_label: item
                        .get("Owner")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string()),
                })
            })
            .collect())
    }

    async fn get_record(&self, radar_id: &str) -> Result<Option<Value>> {
        let url = format!("{}/properties/{}", self.base_url, radar_id);
        let request = self
            .http_client
            .get(&url)
            .query(&[("Fields", "Overview"), ("Purchase", "0")]);

        let response = request
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Data provider request failed: {}", e)))?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "Data provider returned {}: {}",
                status, body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Failed to parse provider response: {}", e)))?;

        // Single-record endpoints still wrap the payload in 'results'
        let record = body
            .get("results")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .cloned()
            .or(Some(body));

        Ok(record.filter(|v| v.is_object()))
    }

    async fn get_contacts(&self, radar_id: &str) -> Result<Vec<Person>> {
        let url = format!("{}/properties/{}/persons", self.base_url, radar_id);
        let body = self.fetch_json(self.http_client.get(&url)).await?;

        let results = body
            .get("results")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(results.iter().map(Self::parse_person).collect())
    }

    async fn unlock_field(
        &self,
        person_key: &str,
        kind: ContactKind,
    ) -> Result<Vec<ContactRecord>> {
        // Spend operation: paced, never retried
        self.pace_unlock().await;

        let url = format!(
            "{}/persons/{}/{}",
            self.base_url,
            person_key,
            kind.provider_field()
        );
        debug!(person_key = %person_key, field = kind.provider_field(), "Unlocking contact field");

        let body = self
            .fetch_json(self.http_client.post(&url).query(&[("Purchase", "1")]))
            .await?;

        let items = body
            .get("results")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(normalize_contact_items(kind, &items))
    }
}
