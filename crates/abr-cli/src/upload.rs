use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct SetDayRequest<'a> {
    day: &'a str,
    count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    right_count: Option<u64>,
}

/// Pushes one day's counts to a remote collector.
///
/// The collector stores the values as-is for that day, so re-sending a day
/// replaces it rather than adding to it.
pub struct UploadClient {
    endpoint: String,
    secret: Option<String>,
    client: reqwest::Client,
}

impl UploadClient {
    pub fn new(base_url: &str, secret: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            endpoint: format!("{}/api/set", base_url.trim_end_matches('/')),
            secret,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns `true` only on HTTP 200. Every failure is logged and
    /// swallowed.
    pub async fn upload(&self, day: &str, count: u64, right_count: Option<u64>) -> bool {
        let body = SetDayRequest {
            day,
            count,
            secret: self.secret.as_deref(),
            right_count,
        };

        match self.client.post(&self.endpoint).json(&body).send().await {
            Ok(response) if response.status() == StatusCode::OK => {
                debug!(day, count, ?right_count, "uploaded day");
                true
            }
            Ok(response) => {
                warn!(day, status = %response.status(), "API error");
                false
            }
            Err(err) => {
                warn!(day, error = %err, "API error");
                false
            }
        }
    }
}
