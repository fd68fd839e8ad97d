//! HTTP transport used by the upstream client.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use tracing::debug;

/// Details of the request that asked for page view data, forwarded
/// upstream for attribution only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginalRequest {
  pub ip: Option<String>,
  pub user_agent: Option<String>,
}

/// A completed HTTP exchange, whatever its status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
  pub status: u16,
  pub body: String,
}

impl HttpResponse {
  pub fn new(status: u16, body: impl Into<String>) -> Self {
    Self {
      status,
      body: body.into(),
    }
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// GET capability. `Err` means no response was received at all
/// (connection failure, timeout); any status code is an `Ok`.
#[async_trait]
pub trait HttpFetch: Send + Sync {
  async fn get(
    &self,
    url: &str,
    timeout: Duration,
    original_request: Option<&OriginalRequest>,
  ) -> Result<HttpResponse>;
}

/// [`HttpFetch`] backed by reqwest.
#[derive(Clone)]
pub struct ReqwestFetcher {
  client: reqwest::Client,
}

impl ReqwestFetcher {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("pvi/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
  async fn get(
    &self,
    url: &str,
    timeout: Duration,
    original_request: Option<&OriginalRequest>,
  ) -> Result<HttpResponse> {
    let mut request = self.client.get(url).timeout(timeout);
    if let Some(original) = original_request {
      if let Some(ip) = &original.ip {
        request = request.header("X-Forwarded-For", ip);
      }
      if let Some(user_agent) = &original.user_agent {
        request = request.header("X-Original-User-Agent", user_agent);
      }
    }

    debug!(%url, "sending HTTP request");
    let response = request
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", url, e))?;

    let status = response.status().as_u16();
    debug!(%url, status, "received HTTP response");
    let body = response
      .text()
      .await
      .map_err(|e| eyre!("Failed to read response body from {}: {}", url, e))?;

    Ok(HttpResponse { status, body })
  }
}
