//! Posting endpoint client.
//!
//! One POST per published update. The endpoint is not idempotent: a
//! successful call creates a visible post, so the pipeline calls `send` at
//! most once per receipt and never to "retry" a send that already answered.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::EndpointSettings;
use crate::types::{Pair, PostReceipt};

/// The non-idempotent posting side of the pipeline.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PostingEndpoint: Send + Sync {
    /// Publish `text` for `pair`. A returned receipt means the post is live.
    async fn send(&self, pair: &Pair, text: &str) -> Result<PostReceipt>;
}

/// Success body: `{"data": {"id": "..."}}`.
#[derive(Debug, Deserialize)]
struct SendResponse {
    data: SendData,
}

#[derive(Debug, Deserialize)]
struct SendData {
    id: String,
}

/// Turn a raw endpoint response into a receipt. Any non-2xx status is a
/// send failure regardless of the body.
fn receipt_from(status: reqwest::StatusCode, body: &str) -> Result<PostReceipt> {
    if !status.is_success() {
        bail!("posting endpoint returned {status}: {body}");
    }
    let parsed: SendResponse =
        serde_json::from_str(body).context("Failed to parse the posting endpoint response")?;
    if parsed.data.id.is_empty() {
        bail!("posting endpoint returned an empty post id");
    }
    Ok(PostReceipt(parsed.data.id))
}

/// HTTP JSON client for the posting endpoint.
pub struct HttpEndpoint {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpEndpoint {
    pub fn new(settings: &EndpointSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout))
            .build()
            .context("Failed to build posting endpoint client")?;
        Ok(Self {
            client,
            url: settings.url.clone(),
            token: settings.token.clone(),
        })
    }
}

#[async_trait]
impl PostingEndpoint for HttpEndpoint {
    async fn send(&self, pair: &Pair, text: &str) -> Result<PostReceipt> {
        let mut request = self.client.post(&self.url).json(&json!({ "text": text }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .context("Failed to reach the posting endpoint")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read the posting endpoint response")?;
        let receipt = receipt_from(status, &body)?;

        debug!(pair = %pair, receipt = %receipt, "post accepted by endpoint");
        Ok(receipt)
    }
}

/// Dry-run stand-in: logs the would-be post and mints a synthetic receipt so
/// the rest of the cycle can run unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreviewEndpoint;

#[async_trait]
impl PostingEndpoint for PreviewEndpoint {
    async fn send(&self, pair: &Pair, text: &str) -> Result<PostReceipt> {
        info!(pair = %pair, text, "dry run: would post");
        Ok(PostReceipt(format!("preview-{}", Uuid::new_v4())))
    }
}
