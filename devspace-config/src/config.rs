use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root of the provisioning configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProvisionConfig {
    #[serde(default)]
    pub connection: ConnectionSettings,

    #[serde(default)]
    pub workspace: WorkspaceSettings,

    #[serde(default)]
    pub project: ProjectSettings,

    #[serde(default)]
    pub errors: ErrorCodeSettings,
}

/// Extension-server connection retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Open attempts when connecting to a workspace that is already running
    #[serde(default = "default_initial_budget")]
    pub initial_budget: u32,

    /// Open attempts once a started workspace reported RUNNING
    #[serde(default = "default_reconnect_budget")]
    pub reconnect_budget: u32,

    /// Fixed delay between two open attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_initial_budget() -> u32 {
    50
}

fn default_reconnect_budget() -> u32 {
    10
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            initial_budget: default_initial_budget(),
            reconnect_budget: default_reconnect_budget(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl ConnectionSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSettings {
    /// Pause between workspace creation and the start request
    #[serde(default = "default_start_delay_ms")]
    pub start_delay_ms: u64,

    /// Memory limit given to stack machines that declare none
    #[serde(default = "default_ram_bytes")]
    pub default_ram_bytes: i64,

    /// Agent whose presence marks a machine as the dev machine
    #[serde(default = "default_dev_agent")]
    pub dev_agent: String,

    /// Topic carrying extension-server output; `{id}` is the workspace id
    #[serde(default = "default_agent_channel_template")]
    pub agent_channel_template: String,
}

fn default_start_delay_ms() -> u64 {
    1000
}

fn default_ram_bytes() -> i64 {
    2 * 1024 * 1024 * 1024
}

fn default_dev_agent() -> String {
    "ws-agent".to_string()
}

fn default_agent_channel_template() -> String {
    "workspace:{id}:ext-server:output".to_string()
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            start_delay_ms: default_start_delay_ms(),
            default_ram_bytes: default_ram_bytes(),
            dev_agent: default_dev_agent(),
            agent_channel_template: default_agent_channel_template(),
        }
    }
}

impl WorkspaceSettings {
    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn agent_channel(&self, workspace_id: &str) -> String {
        self.agent_channel_template.replace("{id}", workspace_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Type forced on the single type-resolution retry
    #[serde(default = "default_fallback_type")]
    pub fallback_type: String,

    /// Placeholder in command lines replaced by the absolute project path
    #[serde(default = "default_path_token")]
    pub path_token: String,

    /// Runtime environment variable holding the projects root
    #[serde(default = "default_projects_root_var")]
    pub projects_root_var: String,

    #[serde(default = "default_type_resolution_retries")]
    pub type_resolution_retries: u32,

    /// Topic on the extension-server bus streaming import output
    #[serde(default = "default_import_output_channel")]
    pub import_output_channel: String,
}

fn default_fallback_type() -> String {
    "blank".to_string()
}

fn default_path_token() -> String {
    "${current.project.path}".to_string()
}

fn default_projects_root_var() -> String {
    "PROJECTS_ROOT".to_string()
}

fn default_type_resolution_retries() -> u32 {
    1
}

fn default_import_output_channel() -> String {
    "importProject:output".to_string()
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            fallback_type: default_fallback_type(),
            path_token: default_path_token(),
            projects_root_var: default_projects_root_var(),
            type_resolution_retries: default_type_resolution_retries(),
            import_output_channel: default_import_output_channel(),
        }
    }
}

/// Error codes and markers recognized in remote failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorCodeSettings {
    #[serde(default = "default_resource_limit_code")]
    pub resource_limit_code: i64,

    #[serde(default = "default_missing_credential_code")]
    pub missing_credential_code: i64,

    /// Phrase in a failed step's log that signals exhausted resources
    #[serde(default = "default_resource_exhausted_marker")]
    pub resource_exhausted_marker: String,
}

fn default_resource_limit_code() -> i64 {
    10000
}

fn default_missing_credential_code() -> i64 {
    32068
}

fn default_resource_exhausted_marker() -> String {
    "You can stop other workspaces".to_string()
}

impl Default for ErrorCodeSettings {
    fn default() -> Self {
        Self {
            resource_limit_code: default_resource_limit_code(),
            missing_credential_code: default_missing_credential_code(),
            resource_exhausted_marker: default_resource_exhausted_marker(),
        }
    }
}

impl ProvisionConfig {
    /// Defaults with `DEVSPACE_*` overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Environment variables take precedence over file values.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("DEVSPACE_CONNECT_BUDGET") {
            self.connection.initial_budget = v;
        }
        if let Some(v) = env_parse("DEVSPACE_RECONNECT_BUDGET") {
            self.connection.reconnect_budget = v;
        }
        if let Some(v) = env_parse("DEVSPACE_RETRY_DELAY_MS") {
            self.connection.retry_delay_ms = v;
        }
        if let Some(v) = env_parse("DEVSPACE_START_DELAY_MS") {
            self.workspace.start_delay_ms = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let budgets = [
            ("connection.initial_budget", self.connection.initial_budget),
            ("connection.reconnect_budget", self.connection.reconnect_budget),
        ];
        for (field, budget) in budgets {
            if budget == 0 {
                return Err(ConfigError::invalid(field, "must allow at least one attempt"));
            }
        }

        if self.project.fallback_type.trim().is_empty() {
            return Err(ConfigError::invalid("project.fallback_type", "must not be empty"));
        }
        if self.project.path_token.is_empty() {
            return Err(ConfigError::invalid("project.path_token", "must not be empty"));
        }
        if self.project.import_output_channel.trim().is_empty() {
            return Err(ConfigError::invalid(
                "project.import_output_channel",
                "must not be empty",
            ));
        }
        if !self.workspace.agent_channel_template.contains("{id}") {
            return Err(ConfigError::invalid(
                "workspace.agent_channel_template",
                format!(
                    "'{}' must contain the {{id}} placeholder",
                    self.workspace.agent_channel_template
                ),
            ));
        }
        if self.workspace.default_ram_bytes <= 0 {
            return Err(ConfigError::invalid(
                "workspace.default_ram_bytes",
                "must be positive",
            ));
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {}={}: not a valid number", key, raw);
            None
        }
    }
}
