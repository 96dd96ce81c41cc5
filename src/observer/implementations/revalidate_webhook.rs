use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

use crate::observer::error::ObserverError;
use crate::observer::traits::{View, ViewObserver};

/// Posts stale view paths to the presentation layer's revalidation endpoint
pub struct RevalidateWebhook {
    client: reqwest::Client,
    endpoint: Url,
    secret: Option<String>,
    timeout: Duration,
}

impl RevalidateWebhook {
    pub const SECRET_HEADER: &'static str = "x-revalidate-secret";

    pub fn new(endpoint: &str, secret: Option<String>, timeout_ms: u64) -> Result<Self, ObserverError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ObserverError::ConfigError(format!("invalid revalidation URL '{}': {}", endpoint, e)))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ObserverError::ConfigError(format!(
                "revalidation URL must be http(s), got '{}'",
                endpoint.scheme()
            )));
        }

        let timeout = Duration::from_millis(timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ObserverError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            secret,
            timeout,
        })
    }

    fn payload(views: &[View]) -> Value {
        let paths: Vec<String> = views.iter().map(View::path).collect();
        json!({ "paths": paths })
    }
}

#[async_trait]
impl ViewObserver for RevalidateWebhook {
    fn name(&self) -> &'static str {
        "revalidate_webhook"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn invalidate(&self, views: &[View]) -> Result<(), ObserverError> {
        let mut request = self.client.post(self.endpoint.clone()).json(&Self::payload(views));
        if let Some(secret) = &self.secret {
            request = request.header(Self::SECRET_HEADER, secret);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ObserverError::Rejected { status: status.as_u16() });
        }
        Ok(())
    }
}
