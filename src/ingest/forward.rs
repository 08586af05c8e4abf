// src/ingest/forward.rs
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;
use crate::ingest::types::NormalizedItem;

/// When an id counts as done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Mark seen only after confirmed delivery; failures are retried next cycle.
    #[default]
    AtLeastOnce,
    /// Mark seen after any attempt; failed items are dropped.
    AtMostOnce,
}

/// JSON body the backend expects. Field names are the integration contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryPayload {
    pub title: String,
    pub link: String,
    #[serde(rename = "pubDate")]
    pub pub_date: String,
    pub text: String,
}

impl From<&NormalizedItem> for DeliveryPayload {
    fn from(it: &NormalizedItem) -> Self {
        Self {
            title: it.title.clone(),
            link: it.id.clone(),
            pub_date: it.published_at.clone(),
            text: it.body.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Forwarder {
    endpoint: String,
    client: Client,
    accept_any_status: bool,
}

impl Forwarder {
    pub fn new(endpoint: impl Into<String>, client: Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            client,
            accept_any_status: false,
        }
    }

    /// Treat every HTTP response as delivered, whatever its status.
    pub fn with_accept_any_status(mut self, yes: bool) -> Self {
        self.accept_any_status = yes;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn deliver(&self, item: &NormalizedItem) -> Result<StatusCode, DeliveryError> {
        let payload = DeliveryPayload::from(item);
        // .json() sets Content-Type: application/json
        let rsp = self.client.post(&self.endpoint).json(&payload).send().await?;
        let status = rsp.status();

        tracing::info!(
            source = %item.source,
            link = %payload.link,
            status = status.as_u16(),
            reason = status.canonical_reason().unwrap_or(""),
            "item posted to backend"
        );

        if status.is_success() || self.accept_any_status {
            Ok(status)
        } else {
            Err(DeliveryError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}
