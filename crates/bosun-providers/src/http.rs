//! HTTP metadata provider

use crate::provider::{parse_options, Provider, ProviderContext};
use async_trait::async_trait;
use bosun_core::{Error, MetadataDocument, Result, SourceTarget};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Request settings shared by HTTP-based providers
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpSettings {
    /// Bearer token
    #[serde(default)]
    pub token: Option<String>,

    /// Extra request headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Per-request timeout
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl HttpSettings {
    pub(crate) fn apply(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        request
    }

    /// GET a URL and return the body of a successful response
    pub(crate) async fn get_bytes(
        &self,
        provider: &str,
        client: &reqwest::Client,
        url: &str,
    ) -> Result<Vec<u8>> {
        let response = self
            .apply(client.get(url))
            .send()
            .await
            .map_err(|e| Error::provider(provider, format!("Failed to fetch {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::provider(
                provider,
                format!("HTTP request failed with status {}: {}", response.status(), url),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::provider(provider, format!("Failed to read response body: {e}")))?;

        Ok(body.to_vec())
    }
}

/// Fetches JSON metadata documents over HTTP
#[derive(Debug)]
pub struct HttpMetadataProvider {
    client: reqwest::Client,
    settings: HttpSettings,
}

impl HttpMetadataProvider {
    /// Type selector
    pub const KIND: &'static str = "http";

    /// Create from provider options (`token`, `headers`, `timeout`)
    pub fn from_options(ctx: &ProviderContext, options: Map<String, Value>) -> Result<Self> {
        Ok(Self::new(ctx, parse_options(Self::KIND, options)?))
    }

    /// Create with explicit settings
    pub fn new(ctx: &ProviderContext, settings: HttpSettings) -> Self {
        Self {
            client: ctx.client().clone(),
            settings,
        }
    }
}

#[async_trait]
impl Provider for HttpMetadataProvider {
    fn name(&self) -> &str {
        Self::KIND
    }

    async fn get_metadata(&self, target: &SourceTarget) -> Result<MetadataDocument> {
        let url = &target.source;

        debug!(url = %url, "Fetching plugin metadata");

        let body = self.settings.get_bytes(Self::KIND, &self.client, url).await?;

        let document: MetadataDocument = serde_json::from_slice(&body).map_err(|e| {
            Error::provider(Self::KIND, format!("Failed to parse metadata JSON from {url}: {e}"))
        })?;

        info!(
            url = %url,
            version = %document.version(),
            size_bytes = body.len(),
            "Fetched plugin metadata"
        );

        Ok(document)
    }
}
