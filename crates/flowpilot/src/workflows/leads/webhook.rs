use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::domain::{AnswerMap, CompanyId, FormId, Lead, LeadId, LeadStatus};
use crate::config::AutomationConfig;

const USER_AGENT: &str = concat!("flowpilot/", env!("CARGO_PKG_VERSION"));

/// JSON body posted to tenant integrations for each new lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub lead_id: LeadId,
    pub company_id: CompanyId,
    pub form_id: FormId,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub score: Option<u8>,
    pub status: LeadStatus,
    pub source: String,
    pub answers: AnswerMap,
    pub dashboard_url: String,
    pub submitted_at: DateTime<Utc>,
}

impl WebhookPayload {
    pub fn from_lead(lead: &Lead, status: LeadStatus, dashboard_url: String) -> Self {
        Self {
            lead_id: lead.id.clone(),
            company_id: lead.company_id.clone(),
            form_id: lead.form_id.clone(),
            customer_name: lead.contact.name.clone(),
            customer_email: lead.contact.email.clone(),
            customer_phone: lead.contact.phone.clone(),
            score: lead.score,
            status,
            source: lead.source.clone(),
            answers: lead.answers.clone(),
            dashboard_url,
            submitted_at: lead.created_at,
        }
    }
}

/// Fire-and-forget delivery seam. `publish` returns once the delivery is handed off;
/// the outcome of the HTTP call is only logged.
pub trait WebhookPublisher: Send + Sync {
    fn publish(&self, url: &str, payload: WebhookPayload) -> Result<(), WebhookError>;
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("unable to build webhook client: {0}")]
    Client(String),
    #[error("no async runtime available to deliver webhook")]
    NoRuntime,
    #[error("webhook transport failed: {0}")]
    Transport(String),
}

/// Posts payloads with reqwest on a spawned task, bounded by the configured timeout.
#[derive(Debug, Clone)]
pub struct HttpWebhookPublisher {
    client: reqwest::Client,
    secret: Option<String>,
}

impl HttpWebhookPublisher {
    pub fn new(timeout: Duration, secret: Option<String>) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|err| WebhookError::Client(err.to_string()))?;

        Ok(Self { client, secret })
    }

    pub fn from_config(config: &AutomationConfig) -> Result<Self, WebhookError> {
        Self::new(config.webhook_timeout, config.webhook_secret.clone())
    }
}

impl WebhookPublisher for HttpWebhookPublisher {
    fn publish(&self, url: &str, payload: WebhookPayload) -> Result<(), WebhookError> {
        let handle = Handle::try_current().map_err(|_| WebhookError::NoRuntime)?;

        let mut request = self.client.post(url).json(&payload);
        if let Some(secret) = &self.secret {
            request = request.bearer_auth(secret);
        }

        let url = url.to_string();
        let lead_id = payload.lead_id;
        handle.spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(%lead_id, %url, status = %response.status(), "webhook delivered");
                }
                Ok(response) => {
                    warn!(%lead_id, %url, status = %response.status(), "webhook rejected");
                }
                Err(err) => {
                    warn!(%lead_id, %url, error = %err, "webhook delivery failed");
                }
            }
        });

        Ok(())
    }
}
