//! [`BrokerForwarder`]: the next handler in production, an HTTP hop to the
//! service broker over `reqwest`.

use std::time::Duration;

use axum::http::{HeaderMap, header};
use reqwest::Client as ReqwestClient;

use crate::message::{Handler, OsbRequest, OsbResponse};

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("HTTP request to {url} failed: {source}")]
    Request {
        url: String,
        source: reqwest::Error,
    },

    #[error("Failed to read broker response from {url}: {source}")]
    Body {
        url: String,
        source: reqwest::Error,
    },
}

/// Drops the headers that describe one connection and must not be copied to the next.
fn without_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut headers = headers.clone();
    for name in [
        header::HOST,
        header::CONTENT_LENGTH,
        header::CONNECTION,
        header::TRANSFER_ENCODING,
    ] {
        headers.remove(name);
    }
    headers
}

#[derive(Clone)]
pub struct BrokerForwarder {
    client: ReqwestClient,
    base_url: String,
}

impl BrokerForwarder {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = ReqwestClient::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: ReqwestClient, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Handler for BrokerForwarder {
    type Error = ForwardError;

    /// One attempt, no retry. Any status the broker answers is an `Ok`.
    async fn handle(&self, request: OsbRequest) -> Result<OsbResponse, ForwardError> {
        let url = format!("{}{}", self.base_url, request.url());

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(without_hop_by_hop(&request.headers));
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let upstream = builder.send().await.map_err(|source| ForwardError::Request {
            url: url.clone(),
            source,
        })?;

        let status = upstream.status();
        let headers = without_hop_by_hop(upstream.headers());
        let body = upstream
            .bytes()
            .await
            .map_err(|source| ForwardError::Body { url, source })?;

        tracing::debug!(status = %status, bytes = body.len(), "Broker answered");
        Ok(OsbResponse {
            status,
            headers,
            body,
        })
    }
}
