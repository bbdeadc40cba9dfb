//! HTTP webhook action handler.
//!
//! Each fired rule becomes one JSON request:
//!
//! ```json
//! {"tenant": "acme", "rule_id": "too-hot", "fired_at": "2024-05-01T12:00:00Z",
//!  "source_id": "42", "arrival_ms": 1714564800000, "reading": {"temp": 30}}
//! ```

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use vigil_core::{ActionRequest, Reading, RuleId, SourceId};

use crate::traits::{ActionError, ActionHandler};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Body sent for each fired rule.
#[derive(Debug, Serialize)]
struct FiredRulePayload<'a> {
    tenant: &'a str,
    rule_id: &'a RuleId,
    fired_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_id: Option<&'a SourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    arrival_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reading: Option<&'a Reading>,
}

impl<'a> From<&'a ActionRequest> for FiredRulePayload<'a> {
    fn from(request: &'a ActionRequest) -> Self {
        let trigger = request.trigger.as_ref();
        Self {
            tenant: &request.tenant_id,
            rule_id: &request.record.rule_id,
            fired_at: request.record.fired_at,
            source_id: trigger.map(|t| &t.source_id),
            arrival_ms: trigger.map(|t| t.arrival_millis),
            reading: trigger.map(|t| &t.reading),
        }
    }
}

/// Sends fired rules to an HTTP endpoint.
///
/// `${VAR}` references in the URL and header values are expanded from the
/// environment when the handler is built, so secrets stay out of config.
#[derive(Debug)]
pub struct WebhookActionHandler {
    url: String,
    method: reqwest::Method,
    headers: HashMap<String, String>,
    client: reqwest::Client,
}

impl WebhookActionHandler {
    /// `method` defaults to `POST`.
    pub fn new(
        url: &str,
        method: Option<reqwest::Method>,
        headers: &HashMap<String, String>,
    ) -> Result<Self, ActionError> {
        let headers = headers
            .iter()
            .map(|(name, value)| Ok((name.clone(), expand_env(value)?)))
            .collect::<Result<HashMap<_, _>, ActionError>>()?;

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ActionError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: expand_env(url)?,
            method: method.unwrap_or(reqwest::Method::POST),
            headers,
            client,
        })
    }

    /// Build from plain config values. `method` is case-insensitive.
    pub fn from_config(
        url: String,
        method: Option<String>,
        headers: Option<HashMap<String, String>>,
    ) -> Result<Self, ActionError> {
        let method = method
            .map(|m| {
                m.to_uppercase()
                    .parse::<reqwest::Method>()
                    .map_err(|_| ActionError::Config(format!("invalid HTTP method: {m}")))
            })
            .transpose()?;

        Self::new(&url, method, &headers.unwrap_or_default())
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl ActionHandler for WebhookActionHandler {
    async fn execute(&self, request: &ActionRequest) -> Result<(), ActionError> {
        let payload = FiredRulePayload::from(request);
        let http = self
            .headers
            .iter()
            .fold(self.client.request(self.method.clone(), &self.url), |http, (name, value)| {
                http.header(name.as_str(), value.as_str())
            })
            .json(&payload);

        let response = http.send().await?;
        let status = response.status();
        if status.is_success() {
            tracing::debug!(url = %self.url, rule_id = %request.record.rule_id, %status, "webhook delivered");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ActionError::Delivery(format!("{} answered {status}: {body}", self.url)))
    }

    fn handler_name(&self) -> &str {
        "webhook"
    }
}

/// Expand `${VAR}` references from the environment.
fn expand_env(input: &str) -> Result<String, ActionError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| ActionError::Config(format!("unclosed ${{...}} in {input:?}")))?;
        let name = &after[..end];
        let value = std::env::var(name)
            .map_err(|_| ActionError::Config(format!("environment variable {name} is not set")))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    Ok(out)
}
