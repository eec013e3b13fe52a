//! Origin fetch collaborator.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::cache::Headers;
use crate::error::Result;

// == Origin Response ==
/// A response from the origin, status unchecked.
#[derive(Debug, Clone, PartialEq)]
pub struct OriginResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Bytes,
}

impl OriginResponse {
    /// A 200 response with the given content type.
    pub fn ok(content_type: &str, body: impl Into<Bytes>) -> Self {
        let mut headers = Headers::new();
        headers.insert("Content-Type".to_string(), vec![content_type.to_string()]);
        Self {
            status: 200,
            headers,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// == Origin Trait ==
/// Source of truth for everything the content cache stores.
#[async_trait]
pub trait Origin: Send + Sync + 'static {
    /// Fetches `path` from the origin. Non-success statuses are returned, not
    /// turned into errors; transport failures are errors.
    async fn fetch(&self, path: &str) -> Result<OriginResponse>;
}

// == HTTP Origin ==
/// Origin reached over HTTP(S): `GET <base_url><path>`.
#[derive(Debug, Clone)]
pub struct HttpOrigin {
    client: reqwest::Client,
    base_url: String,
}

impl HttpOrigin {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Origin for HttpOrigin {
    async fn fetch(&self, path: &str) -> Result<OriginResponse> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "fetching from origin");

        let response = self.client.get(&url).send().await?;
        let status = response.status().as_u16();

        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers
                    .entry(name.as_str().to_string())
                    .or_default()
                    .push(value.to_string());
            }
        }

        let body = response.bytes().await?;
        Ok(OriginResponse {
            status,
            headers,
            body,
        })
    }
}
