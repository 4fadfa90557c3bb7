//! HTTP archive source provider

use crate::http::HttpSettings;
use crate::provider::{parse_options, Provider, ProviderContext};
use async_trait::async_trait;
use bosun_core::{ArtifactFormat, Error, Result, SourceArtifact, SourceKind, SourceTarget};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

#[derive(Debug, Default, Deserialize)]
struct ArchiveOptions {
    #[serde(default)]
    format: Option<SourceKind>,

    #[serde(flatten)]
    http: HttpSettings,
}

/// Downloads zip or tar.gz snapshots into a scratch directory
#[derive(Debug)]
pub struct HttpArchiveSourceProvider {
    ctx: ProviderContext,
    format: Option<SourceKind>,
    settings: HttpSettings,
}

impl HttpArchiveSourceProvider {
    /// Type selector
    pub const KIND: &'static str = "http_archive";

    /// Create from provider options (`format`, `token`, `headers`, `timeout`)
    pub fn from_options(ctx: &ProviderContext, options: Map<String, Value>) -> Result<Self> {
        let options: ArchiveOptions = parse_options(Self::KIND, options)?;

        if options.format == Some(SourceKind::Git) {
            return Err(Error::Config(
                "http_archive format must be zip or tar".to_string(),
            ));
        }

        Ok(Self {
            ctx: ctx.clone(),
            format: options.format,
            settings: options.http,
        })
    }

    /// Archive format for a target: provider option, then target option, then zip
    fn format_for(&self, target: &SourceTarget) -> Result<SourceKind> {
        if let Some(format) = self.format {
            return Ok(format);
        }

        match target.option_str("format") {
            None => Ok(SourceKind::Zip),
            Some(value) => match SourceKind::parse(value) {
                Some(SourceKind::Git) | None => Err(Error::UnsupportedSource(format!(
                    "archive format '{value}'"
                ))),
                Some(kind) => Ok(kind),
            },
        }
    }
}

#[async_trait]
impl Provider for HttpArchiveSourceProvider {
    fn name(&self) -> &str {
        Self::KIND
    }

    async fn get_source(&self, target: &SourceTarget) -> Result<SourceArtifact> {
        let format = self.format_for(target)?;
        let url = &target.source;

        debug!(url = %url, format = %format, "Downloading plugin archive");

        let body = self
            .settings
            .get_bytes(Self::KIND, self.ctx.client(), url)
            .await?;

        let workdir = self.ctx.scratch_dir("bosun-archive-").await?;
        let extension = format.archive_extension().unwrap_or("zip");
        let file = workdir.path().join(format!("source.{extension}"));

        tokio::fs::write(&file, &body).await?;

        info!(
            url = %url,
            format = %format,
            size_bytes = body.len(),
            "Downloaded plugin archive"
        );

        Ok(SourceArtifact::in_workdir(
            ArtifactFormat::from(format),
            file,
            url.clone(),
            workdir,
        ))
    }
}
