//! Desired-state change payload

use bosun_core::{Error, PluginChange, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Why a payload was not applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Misdirected {
    /// No target identity
    MissingTarget,
    /// Addressed to another process
    OtherTarget(String),
}

/// A batch of plugin, config and action changes for one process
#[derive(Debug, Clone, Deserialize)]
pub struct ChangePayload {
    /// Identity of the addressed process
    #[serde(alias = "pylon_id")]
    pub target_id: String,

    /// `"name"` installs or updates, `"!name"` removes
    #[serde(default)]
    pub plugins: Vec<String>,

    /// Plugin configuration text keyed by plugin name
    #[serde(default)]
    pub configs: BTreeMap<String, Value>,

    /// Bare action names or `[name, data]` pairs
    #[serde(default)]
    pub actions: Vec<ActionEntry>,

    /// Plugins to reload
    #[serde(default)]
    pub reload: Vec<String>,

    /// Drain and restart after applying
    #[serde(default = "default_restart")]
    pub restart: bool,

    /// Process to terminate instead of the current one
    #[serde(default, alias = "pylon_pid")]
    pub target_pid: Option<i32>,
}

fn default_restart() -> bool {
    true
}

impl ChangePayload {
    /// Parse a payload addressed to `identity`
    ///
    /// Targeting is checked before the shape so that broadcasts meant for
    /// other processes are dropped without validation.
    pub fn parse_for(identity: &str, value: Value) -> Result<std::result::Result<Self, Misdirected>> {
        let Value::Object(map) = &value else {
            return Err(Error::MalformedPayload(format!(
                "expected an object, got {}",
                json_type(&value)
            )));
        };

        let target = map
            .get("target_id")
            .or_else(|| map.get("pylon_id"))
            .and_then(Value::as_str);

        match target {
            None => return Ok(Err(Misdirected::MissingTarget)),
            Some(target) if target != identity => {
                return Ok(Err(Misdirected::OtherTarget(target.to_string())));
            }
            Some(_) => {}
        }

        serde_json::from_value(value)
            .map(Ok)
            .map_err(|e| Error::MalformedPayload(e.to_string()))
    }

    /// Parsed plugin changes, in payload order
    pub fn plugin_changes(&self) -> Vec<PluginChange> {
        self.plugins.iter().map(|entry| PluginChange::parse(entry)).collect()
    }

    /// Configuration bytes keyed by plugin name
    pub fn config_bytes(&self) -> Vec<(String, Vec<u8>)> {
        self.configs
            .iter()
            .map(|(name, value)| {
                let data = match value {
                    Value::String(text) => text.clone().into_bytes(),
                    other => other.to_string().into_bytes(),
                };
                (name.clone(), data)
            })
            .collect()
    }

    /// Parsed actions, in payload order
    pub fn parsed_actions(&self) -> Vec<Action> {
        self.actions.iter().map(Action::from_entry).collect()
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Action as written in a payload
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ActionEntry {
    /// Bare action name
    Bare(String),
    /// Action name with data
    WithData(String, Value),
}

/// Recognized operational actions
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Attach the debug log buffer and raise the log level
    EnableDebugMode,
    /// Detach the debug log buffer and restore the log level
    DisableDebugMode,
    /// Start the on-demand profiling session
    EnableOndemandProfiling,
    /// Stop the on-demand profiling session
    DisableOndemandProfiling,
    /// Clear dependency records and build caches of plugins
    DeleteRequirements(Vec<String>),
    /// Merge an encoded settings blob
    UpdateSettings(Value),
    /// Anything else
    Unknown(String),
}

impl Action {
    /// Interpret a payload entry
    pub fn from_entry(entry: &ActionEntry) -> Self {
        let (name, data) = match entry {
            ActionEntry::Bare(name) => (name.as_str(), Value::Null),
            ActionEntry::WithData(name, data) => (name.as_str(), data.clone()),
        };

        match name {
            "enable_debug_mode" => Action::EnableDebugMode,
            "disable_debug_mode" => Action::DisableDebugMode,
            "enable_ondemand_profiling" => Action::EnableOndemandProfiling,
            "disable_ondemand_profiling" => Action::DisableOndemandProfiling,
            "delete_requirements" => Action::DeleteRequirements(string_list(&data)),
            "update_settings" => Action::UpdateSettings(data),
            other => Action::Unknown(other.to_string()),
        }
    }

    /// Action name
    pub fn name(&self) -> &str {
        match self {
            Action::EnableDebugMode => "enable_debug_mode",
            Action::DisableDebugMode => "disable_debug_mode",
            Action::EnableOndemandProfiling => "enable_ondemand_profiling",
            Action::DisableOndemandProfiling => "disable_ondemand_profiling",
            Action::DeleteRequirements(_) => "delete_requirements",
            Action::UpdateSettings(_) => "update_settings",
            Action::Unknown(name) => name,
        }
    }
}

fn string_list(data: &Value) -> Vec<String> {
    match data {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Value::String(single) => vec![single.clone()],
        _ => Vec::new(),
    }
}
