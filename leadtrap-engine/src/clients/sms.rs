//! Twilio-style HTTP client for the messaging provider
//!
//! When credentials are missing the client stays in a disabled state and
//! every send attempt returns a `Validation` error; the engine records the
//! attempt as a failed message instead of crashing.

use crate::clients::{MessagingProvider, SendReceipt};
use crate::contacts::normalize_phone;
use async_trait::async_trait;
use leadtrap_common::config::MessagingConfig;
use leadtrap_common::{Error, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Messaging provider API base URL
const TWILIO_API_URL: &str = "https://api.twilio.com/2010-04-01";

/// Default timeout for send requests
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Outbound SMS client
pub struct TwilioClient {
    http_client: Client,
    base_url: String,
    /// `None` when credentials were not configured
    config: Option<MessagingConfig>,
}

#[derive(Debug, Deserialize)]
struct TwilioMessageResponse {
    sid: String,
    status: String,
    price: Option<String>,
}

impl TwilioClient {
    pub fn new(config: Option<MessagingConfig>) -> Result<Self> {
        Self::with_base_url(config, TWILIO_API_URL)
    }

    pub fn with_base_url(config: Option<MessagingConfig>, base_url: &str) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(TwilioClient {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            config,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_some()
    }
}

#[async_trait]
impl MessagingProvider for TwilioClient {
    async fn send(&self, to_number: &str, body: &str) -> Result<SendReceipt> {
        let config = self.config.as_ref().ok_or_else(|| {
            Error::Validation("Messaging provider not configured".to_string())
        })?;

        let to = normalize_phone(to_number);
        let url = format!(
            "{}/Accounts/{}/Messages.json",
            self.base_url, config.account_sid
        );

        debug!(to = %to, "Sending SMS");

        let response = self
            .http_client
            .post(&url)
            .basic_auth(&config.account_sid, Some(&config.auth_token))
            .form(&[
                ("To", to.as_str()),
                ("From", config.from_number.as_str()),
                ("Body", body),
            ])
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Messaging provider request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            // Common causes: unsubscribed recipient, invalid number, landline
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "Messaging provider returned {}: {}",
                status, text
            )));
        }

        let message: TwilioMessageResponse = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Failed to parse send response: {}", e)))?;

        Ok(SendReceipt {
            provider_message_id: message.sid,
            status: message.status,
            cost: message.price.and_then(|p| p.parse::<f64>().ok()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_client_returns_validation_error() {
        let client = TwilioClient::new(None).unwrap();
        assert!(!client.is_enabled());

        let result = client.send("+15551234567", "hello").await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
