//! Reading runtime configuration documents

use crate::Config;
use bosun_core::{Error, Result};
use regex::{Captures, Regex};
use std::env;
use std::fs;
use std::path::Path;

/// On-disk document format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML, also assumed when the file has no extension
    Yaml,
    /// TOML
    Toml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let Some(ext) = path.extension() else {
            return Ok(ConfigFormat::Yaml);
        };

        match ext.to_str() {
            Some("yaml" | "yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            _ => Err(Error::Config(format!(
                "Unsupported config format: {}",
                path.display()
            ))),
        }
    }
}

/// Read a runtime config file without validating it
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)?;

    let content = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {e}", path.display()))
    })?;

    load_from_str(&content, format)
}

/// Replace `${VAR}` and `${VAR:-default}` references
///
/// Every unset variable without a default is reported in one error.
fn expand_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .map_err(|e| Error::Config(format!("Invalid regex: {e}")))?;

    let mut missing = Vec::new();
    let expanded = re.replace_all(content, |cap: &Captures<'_>| {
        let name = &cap[1];
        match (env::var(name), cap.get(2)) {
            (Ok(value), _) => value,
            (Err(_), Some(default)) => default.as_str().to_string(),
            (Err(_), None) => {
                missing.push(name.to_string());
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(Error::Config(format!(
            "Environment variables not set and no default provided: {}",
            missing.join(", ")
        )));
    }

    Ok(expanded.into_owned())
}

/// Parse a runtime config document after env expansion
pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<Config> {
    let expanded = expand_env_vars(content)?;

    let config = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse YAML: {e}")))?,
        ConfigFormat::Toml => toml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {e}")))?,
        ConfigFormat::Json => serde_json::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse JSON: {e}")))?,
    };

    Ok(config)
}

/// Read and validate a runtime config file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config = load_from_file(path)?;
    crate::validator::validate_config(&config)?;
    Ok(config)
}
