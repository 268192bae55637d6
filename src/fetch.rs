//! Network fetching for the base-URL navigation path.
//!
//! When a request overrides the base URL, the session fetches the document
//! itself and hands the bytes to the engine instead of letting the engine
//! navigate. This module holds the fetcher contract and the default
//! reqwest-backed adapter.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;

/// A fetched document body plus the response metadata the engine needs.
#[derive(Debug, Clone)]
pub struct FetchedResource {
    pub bytes: Vec<u8>,
    /// Content-Type header value, empty when the server sent none
    pub content_type: String,
    /// HTTP status code; carried through but not interpreted by the session
    pub status: u16,
}

/// Capability contract for performing the base-URL-override fetch.
#[async_trait]
pub trait NetworkFetcher {
    async fn fetch(
        &self,
        url: &str,
        method: &str,
        headers: &HashMap<String, String>,
        body: Option<&[u8]>,
    ) -> Result<FetchedResource>;
}

/// Default [`NetworkFetcher`] backed by a reqwest client.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Fetch(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client, e.g. one with custom timeouts or proxies.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NetworkFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        method: &str,
        headers: &HashMap<String, String>,
        body: Option<&[u8]>,
    ) -> Result<FetchedResource> {
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|e| Error::Fetch(format!("invalid method {:?}: {}", method, e)))?;

        let mut builder = self.client.request(method, url);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = body {
            builder = builder.body(body.to_vec());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("failed to fetch {}: {}", url, e)))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Fetch(format!("failed to read response body: {}", e)))?;

        Ok(FetchedResource {
            bytes: bytes.to_vec(),
            content_type,
            status,
        })
    }
}
