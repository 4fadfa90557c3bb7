//! Provider capability contract

use async_trait::async_trait;
use bosun_core::{Error, MetadataDocument, Result, SourceArtifact, SourceTarget};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Provider shared between a resolver leaf and its callers
pub type SharedProvider = Arc<dyn Provider>;

/// Fetches metadata documents and source artifacts for one backend
#[async_trait]
pub trait Provider: Send + Sync + fmt::Debug {
    /// Provider type selector
    fn name(&self) -> &str;

    /// Called once after construction
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Fetch the metadata document at `target`
    async fn get_metadata(&self, target: &SourceTarget) -> Result<MetadataDocument> {
        let _ = target;
        Err(Error::Unsupported(format!(
            "Metadata retrieval not supported by provider '{}'",
            self.name()
        )))
    }

    /// Fetch the source artifact at `target`
    async fn get_source(&self, target: &SourceTarget) -> Result<SourceArtifact> {
        let _ = target;
        Err(Error::Unsupported(format!(
            "Source retrieval not supported by provider '{}'",
            self.name()
        )))
    }

    /// Called exactly once before the provider is dropped
    async fn deinit(&self) -> Result<()> {
        Ok(())
    }
}

/// Resources shared by every provider
#[derive(Debug, Clone)]
pub struct ProviderContext {
    client: reqwest::Client,
    work_dir: PathBuf,
}

impl ProviderContext {
    /// Context with a default HTTP client
    pub fn new(work_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("bosun/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self::with_client(client, work_dir))
    }

    /// Context with a caller-supplied HTTP client
    pub fn with_client(client: reqwest::Client, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            work_dir: work_dir.into(),
        }
    }

    /// Shared HTTP client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Scratch directory root for fetched sources
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Create a fresh scratch directory under the work directory
    pub(crate) async fn scratch_dir(&self, prefix: &str) -> Result<tempfile::TempDir> {
        tokio::fs::create_dir_all(&self.work_dir).await?;

        tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&self.work_dir)
            .map_err(Error::from)
    }
}

/// Deserialize provider options, naming the provider on failure
pub fn parse_options<T: DeserializeOwned>(provider: &str, options: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(options))
        .map_err(|e| Error::Config(format!("Invalid options for provider '{provider}': {e}")))
}
