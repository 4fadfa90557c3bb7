//! Git source provider

use crate::provider::{parse_options, Provider, ProviderContext};
use async_trait::async_trait;
use bosun_core::{ArtifactFormat, Error, Result, SourceArtifact, SourceTarget};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Timeout for a single clone
const CLONE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Default, Deserialize)]
struct GitOptions {
    #[serde(default)]
    depth: Option<u32>,

    #[serde(default)]
    branch: Option<String>,

    #[serde(default)]
    delete_git_dir: bool,
}

/// Clones plugin repositories with the `git` binary
#[derive(Debug)]
pub struct GitSourceProvider {
    ctx: ProviderContext,
    options: GitOptions,
}

impl GitSourceProvider {
    /// Type selector
    pub const KIND: &'static str = "git";

    /// Create from provider options (`depth`, `branch`, `delete_git_dir`)
    pub fn from_options(ctx: &ProviderContext, options: Map<String, Value>) -> Result<Self> {
        Ok(Self {
            ctx: ctx.clone(),
            options: parse_options(Self::KIND, options)?,
        })
    }

    fn clone_command(&self, target: &SourceTarget, dest: &std::path::Path) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("clone");

        let depth = target
            .extra
            .get("depth")
            .and_then(Value::as_u64)
            .or(self.options.depth.map(u64::from));
        if let Some(depth) = depth {
            cmd.arg("--depth").arg(depth.to_string());
        }

        if let Some(branch) = target.branch.as_ref().or(self.options.branch.as_ref()) {
            cmd.arg("--branch").arg(branch);
        }

        cmd.arg("--").arg(&target.source).arg(dest);
        cmd.env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd
    }
}

#[async_trait]
impl Provider for GitSourceProvider {
    fn name(&self) -> &str {
        Self::KIND
    }

    async fn get_source(&self, target: &SourceTarget) -> Result<SourceArtifact> {
        let workdir = self.ctx.scratch_dir("bosun-git-").await?;
        let dest = workdir.path().join("source");

        debug!(url = %target.source, branch = ?target.branch, "Cloning plugin repository");

        let output = tokio::time::timeout(CLONE_TIMEOUT, self.clone_command(target, &dest).output())
            .await
            .map_err(|_| {
                Error::provider(
                    Self::KIND,
                    format!("git clone timed out after {}s", CLONE_TIMEOUT.as_secs()),
                )
            })?
            .map_err(|e| Error::provider(Self::KIND, format!("Failed to run git: {e}")))?;

        if !output.status.success() {
            return Err(Error::provider(
                Self::KIND,
                format!(
                    "git clone of {} failed: {}",
                    target.source,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        if self.options.delete_git_dir {
            tokio::fs::remove_dir_all(dest.join(".git")).await?;
        }

        info!(url = %target.source, "Cloned plugin repository");

        Ok(SourceArtifact::in_workdir(
            ArtifactFormat::Directory,
            dest,
            target.source.clone(),
            workdir,
        ))
    }
}
