//! Firebase Realtime Database REST client
//!
//! Layout under the root path (`cement_plant_data` by default):
//!   current   - overwritten each tick
//!   history   - push list, keys are Firebase push ids (chronological)
//!   metadata  - overwritten each tick

use super::{HistoryEntry, TelemetryStore};
use crate::models::{NormalizedRecord, StreamMetadata};
use anyhow::{anyhow, Context, Result};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_ROOT_PATH: &str = "cement_plant_data";

#[derive(Clone)]
pub struct FirebaseStore {
    client: Client,
    base_url: String,
    root_path: String,
    auth_token: Option<String>,
}

impl std::fmt::Debug for FirebaseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseStore")
            .field("base_url", &self.base_url)
            .field("root_path", &self.root_path)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Response body of a POST (push) request
#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

impl FirebaseStore {
    pub fn new(database_url: &str, auth_token: Option<String>) -> Result<Self> {
        let base_url = database_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(anyhow!("Invalid Firebase database url: {}", database_url));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(4)
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .context("Failed to build Firebase HTTP client")?;

        Ok(Self {
            client,
            base_url,
            root_path: DEFAULT_ROOT_PATH.to_string(),
            auth_token: auth_token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn with_root_path(mut self, root_path: impl Into<String>) -> Self {
        self.root_path = root_path.into().trim_matches('/').to_string();
        self
    }

    #[inline]
    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}.json", self.base_url, self.root_path, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.client.request(method, self.url(path));
        match &self.auth_token {
            Some(token) => req.query(&[("auth", token.as_str())]),
            None => req,
        }
    }

    async fn check(resp: Response, what: &str) -> Result<Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        Err(status_error(what, status, &text))
    }
}

fn status_error(what: &str, status: StatusCode, body: &str) -> anyhow::Error {
    anyhow!("{} {}: {}", what, status, body.trim())
}

/// Push id from a POST response (`{"name": "-N..."}`)
fn parse_push(body: &str) -> Result<String> {
    let push: PushResponse =
        serde_json::from_str(body).context("Failed to parse push response")?;
    Ok(push.name)
}

/// History listing from a GET response. An empty list comes back as `null`.
fn parse_listing(body: &str) -> Result<Vec<HistoryEntry>> {
    let listing: Option<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_str(body).context("Failed to parse history listing")?;

    // serde_json::Map is key-ordered, and push ids sort chronologically.
    Ok(listing
        .unwrap_or_default()
        .into_iter()
        .map(|(id, record)| HistoryEntry { id, record })
        .collect())
}

#[async_trait::async_trait]
impl TelemetryStore for FirebaseStore {
    async fn set_current(&self, record: &NormalizedRecord) -> Result<()> {
        let resp = self
            .request(Method::PUT, "current")
            .json(record)
            .send()
            .await
            .context("PUT current failed")?;
        Self::check(resp, "PUT current").await?;
        Ok(())
    }

    async fn append_history(&self, record: &NormalizedRecord) -> Result<String> {
        let resp = self
            .request(Method::POST, "history")
            .json(record)
            .send()
            .await
            .context("POST history failed")?;
        let body = Self::check(resp, "POST history")
            .await?
            .text()
            .await
            .context("Failed to read push response")?;
        parse_push(&body)
    }

    async fn list_history(&self) -> Result<Vec<HistoryEntry>> {
        let resp = self
            .request(Method::GET, "history")
            .send()
            .await
            .context("GET history failed")?;

        let body = Self::check(resp, "GET history")
            .await?
            .text()
            .await
            .context("Failed to read history listing")?;
        parse_listing(&body)
    }

    async fn delete_history(&self, id: &str) -> Result<()> {
        let path = format!("history/{}", id);
        let resp = self
            .request(Method::DELETE, &path)
            .send()
            .await
            .with_context(|| format!("DELETE {} failed", path))?;
        Self::check(resp, &format!("DELETE {}", path)).await?;
        Ok(())
    }

    async fn set_metadata(&self, metadata: &StreamMetadata) -> Result<()> {
        let resp = self
            .request(Method::PUT, "metadata")
            .json(metadata)
            .send()
            .await
            .context("PUT metadata failed")?;
        Self::check(resp, "PUT metadata").await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "firebase"
    }
}
