//! Mock implementations for testing

use crate::provider::Provider;
use async_trait::async_trait;
use bosun_core::{ArtifactFormat, Error, MetadataDocument, Result, SourceArtifact, SourceTarget};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct MockState {
    metadata: HashMap<String, MetadataDocument>,
    fallback: Option<MetadataDocument>,
    metadata_calls: Vec<String>,
    source_calls: Vec<String>,
    init_calls: usize,
    deinit_calls: usize,
    created_with: Vec<Map<String, Value>>,
}

/// Mock provider answering metadata probes from an in-memory table
///
/// Clones share state, so a test can keep one handle while the resolver
/// owns another.
#[derive(Debug, Clone)]
pub struct MockProvider {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    /// Create a mock that knows no metadata URLs
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Answer probes of `url` with `document`
    pub fn with_metadata(self, url: impl Into<String>, document: MetadataDocument) -> Self {
        self.state.lock().metadata.insert(url.into(), document);
        self
    }

    /// Answer every probe with `document`
    pub fn answering_all(self, document: MetadataDocument) -> Self {
        self.state.lock().fallback = Some(document);
        self
    }

    /// Record options the provider was constructed with
    pub fn record_options(&self, options: Map<String, Value>) {
        self.state.lock().created_with.push(options);
    }

    /// Options of every construction, in order
    pub fn created_with(&self) -> Vec<Map<String, Value>> {
        self.state.lock().created_with.clone()
    }

    /// URLs probed for metadata, in order
    pub fn metadata_calls(&self) -> Vec<String> {
        self.state.lock().metadata_calls.clone()
    }

    /// URLs fetched for source, in order
    pub fn source_calls(&self) -> Vec<String> {
        self.state.lock().source_calls.clone()
    }

    /// Total number of metadata and source calls
    pub fn call_count(&self) -> usize {
        let state = self.state.lock();
        state.metadata_calls.len() + state.source_calls.len()
    }

    /// Number of init calls
    pub fn init_call_count(&self) -> usize {
        self.state.lock().init_calls
    }

    /// Number of deinit calls
    pub fn deinit_call_count(&self) -> usize {
        self.state.lock().deinit_calls
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self) -> Result<()> {
        self.state.lock().init_calls += 1;
        Ok(())
    }

    async fn get_metadata(&self, target: &SourceTarget) -> Result<MetadataDocument> {
        let mut state = self.state.lock();
        state.metadata_calls.push(target.source.clone());

        state
            .metadata
            .get(&target.source)
            .or(state.fallback.as_ref())
            .cloned()
            .ok_or_else(|| Error::provider(&self.name, format!("no metadata at {}", target.source)))
    }

    async fn get_source(&self, target: &SourceTarget) -> Result<SourceArtifact> {
        self.state.lock().source_calls.push(target.source.clone());

        Ok(SourceArtifact::at_path(
            ArtifactFormat::Directory,
            target.source.clone(),
            target.source.clone(),
        ))
    }

    async fn deinit(&self) -> Result<()> {
        self.state.lock().deinit_calls += 1;
        Ok(())
    }
}
