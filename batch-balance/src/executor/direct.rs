//! Balance adjustment through the page endpoint
//!
//! `POST {base}/page.php?sid=factionsGiveMoney&rfcv={token}` with
//! `{"option":"addToBalance","receiver":15,"amount":120}`; the page answers
//! `{"success":true}` when the adjustment went through.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{StepContext, StepExecutor};
use crate::errors::StepFailure;
use crate::types::{AssetType, BatchEntry};

pub const DEFAULT_BASE_URL: &str = "https://www.torn.com";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct DirectConfig {
    pub base_url: String,
    /// Anti-forgery token (the `rfc_v` cookie value)
    pub rfcv: String,
    /// Raw `Cookie` header for an authenticated session, if the client has no cookie store
    pub cookie: Option<String>,
    pub timeout: Duration,
}

impl Default for DirectConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            rfcv: String::new(),
            cookie: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl DirectConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_rfcv(mut self, rfcv: impl Into<String>) -> Self {
        self.rfcv = rfcv.into();
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self, asset: AssetType) -> String {
        format!(
            "{}/page.php?sid={}&rfcv={}",
            self.base_url.trim_end_matches('/'),
            asset.page_sid(),
            self.rfcv
        )
    }
}

#[derive(Debug, Serialize)]
struct AdjustmentRequest<'a> {
    option: &'a str,
    receiver: u64,
    amount: i64,
}

pub struct DirectExecutor {
    client: reqwest::Client,
    config: DirectConfig,
}

impl DirectExecutor {
    pub fn new(config: DirectConfig) -> Result<Self, StepFailure> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StepFailure::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Use a preconfigured client, e.g. one sharing a cookie store with a login flow.
    pub fn with_client(client: reqwest::Client, config: DirectConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &DirectConfig {
        &self.config
    }
}

#[async_trait]
impl StepExecutor for DirectExecutor {
    async fn apply_step(&self, entry: &BatchEntry, ctx: &StepContext) -> Result<(), StepFailure> {
        let receiver = entry
            .target_id
            .parse::<u64>()
            .map_err(|_| StepFailure::InvalidReceiver(entry.target_id.clone()))?;
        let body = AdjustmentRequest {
            option: ctx.action_type.request_option(),
            receiver,
            amount: entry.amount,
        };
        let url = self.config.endpoint(ctx.asset_type);
        info!("{}", ctx.waiting_prompt(entry));
        debug!(%url, ?body, "Sending adjustment request");

        let mut request = self
            .client
            .post(&url)
            .header("x-requested-with", "XMLHttpRequest")
            .json(&body);
        if let Some(cookie) = &self.config.cookie {
            request = request.header(reqwest::header::COOKIE, cookie);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                StepFailure::Timeout(format!(
                    "no response within {:?}: {e}",
                    self.config.timeout
                ))
            } else {
                StepFailure::Network(e.to_string())
            }
        })?;

        let status = response.status();
        let raw = response.text().await.map_err(|e| {
            if e.is_timeout() {
                StepFailure::Timeout(e.to_string())
            } else {
                StepFailure::Network(e.to_string())
            }
        })?;

        if !status.is_success() {
            error!(status = status.as_u16(), body = %raw, "Adjustment request failed");
            return Err(StepFailure::HttpStatus {
                status: status.as_u16(),
                body: raw,
            });
        }

        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(json) if json.get("success") == Some(&serde_json::Value::Bool(true)) => {
                debug!(target_id = %entry.target_id, "Adjustment acknowledged");
                Ok(())
            }
            _ => {
                error!(body = %raw, "Unexpected adjustment response");
                Err(StepFailure::UnexpectedResponse(raw))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        let config = DirectConfig::default()
            .with_base_url("http://127.0.0.1:8080/")
            .with_rfcv("abc");
        assert_eq!(
            config.endpoint(AssetType::Money),
            "http://127.0.0.1:8080/page.php?sid=factionsGiveMoney&rfcv=abc"
        );
        assert_eq!(
            config.endpoint(AssetType::Points),
            "http://127.0.0.1:8080/page.php?sid=factionsGivePoints&rfcv=abc"
        );
    }

    #[test]
    fn test_request_body_shape() {
        let body = AdjustmentRequest {
            option: "giveMoney",
            receiver: 1617955,
            amount: 250,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"option": "giveMoney", "receiver": 1617955, "amount": 250})
        );
    }
}
