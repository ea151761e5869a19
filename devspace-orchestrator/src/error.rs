use devspace_messages::{msg, MESSAGES};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::api::Notification;

pub type Result<T> = std::result::Result<T, ProvisionError>;

/// A single failed attempt to open the extension-server transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to open {url}: {reason}")]
pub struct TransportError {
    pub url: String,
    pub reason: String,
}

impl TransportError {
    pub fn new(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// Terminal connection conditions reported to the operator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("retries-exhausted: could not connect to {url} after {attempts} attempts")]
    RetriesExhausted { url: String, attempts: u32 },

    #[error("closed: connection to the workspace was closed")]
    Closed,
}

impl ConnectError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::RetriesExhausted { .. } => "retries-exhausted",
            Self::Closed => "closed",
        }
    }
}

/// Failure payload of a remote workspace or project call.
///
/// `attributes` carries structured details, e.g. the numbers behind a
/// resource-limit refusal (`workspaces_count`, `used_ram`, `limit_ram`,
/// `required_ram`, `ram_unit`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteError {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub status_text: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub attributes: IndexMap<String, serde_json::Value>,
}

impl std::error::Error for RemoteError {}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.status, &self.message) {
            (Some(status), Some(message)) => write!(f, "{status} {message}"),
            (None, Some(message)) => write!(f, "{message}"),
            (Some(status), None) => write!(f, "remote call failed with status {status}"),
            (None, None) => write!(f, "remote call failed"),
        }
    }
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: u16, status_text: impl Into<String>) -> Self {
        self.status = Some(status);
        self.status_text = Some(status_text.into());
        self
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.error_code = Some(code);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn has_code(&self, code: i64) -> bool {
        self.error_code == Some(code)
    }

    /// Renders the resource-limit attributes, or `None` when any is missing.
    pub fn resource_limit_message(&self) -> Option<String> {
        let text = |key: &str| -> Option<String> {
            match self.attributes.get(key)? {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            }
        };

        Some(msg!(
            MESSAGES.workspace.resource_limit,
            count = text("workspaces_count")?,
            used = text("used_ram")?,
            limit = text("limit_ram")?,
            required = text("required_ram")?,
            unit = text("ram_unit").unwrap_or_default(),
        ))
    }
}

/// Malformed or missing request/config data; never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Remote call that failed, used to word the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchDetails,
    CreateWorkspace,
    StartWorkspace,
    CreateProjects,
    AddCommand,
    ResolveType,
}

impl Stage {
    pub fn is_project_stage(self) -> bool {
        matches!(
            self,
            Self::CreateProjects | Self::AddCommand | Self::ResolveType
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FetchDetails => "fetch workspace details",
            Self::CreateWorkspace => "create workspace",
            Self::StartWorkspace => "start workspace",
            Self::CreateProjects => "create projects",
            Self::AddCommand => "add command",
            Self::ResolveType => "resolve project type",
        };
        f.write_str(name)
    }
}

/// Everything that can end a provisioning attempt.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("{stage} failed: {source}")]
    Remote {
        stage: Stage,
        #[source]
        source: RemoteError,
    },

    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Credentials required to access {location}")]
    Credential {
        location: String,
        workspace_id: String,
    },

    /// The workspace failed to start. `title` is set when the failure came
    /// from the status topic and is shown as an alert.
    #[error("Workspace start failed: {message}")]
    WorkspaceStart {
        title: Option<&'static str>,
        message: String,
    },

    #[error("Workspace agent failed: {message}")]
    AgentStart { message: String },

    /// The attempt was already failed by an event handler.
    #[error("Provisioning attempt aborted")]
    Aborted,
}

impl ProvisionError {
    pub fn remote(stage: Stage) -> impl FnOnce(RemoteError) -> Self {
        move |source| Self::Remote { stage, source }
    }

    /// Text appended to the failing step's log.
    pub fn log_line(&self) -> Option<String> {
        match self {
            Self::Aborted => None,
            Self::Credential { location, workspace_id } => Some(msg!(
                MESSAGES.project.credential_required,
                location = location,
                workspace = workspace_id
            )),
            Self::Remote { stage, source } if stage.is_project_stage() => {
                Some(project_error_content(source))
            }
            Self::Remote { stage, source } => Some(remote_message(*stage, source)),
            Self::Connect(err) => Some(connect_content(err)),
            Self::Validation(err) => Some(err.message.clone()),
            Self::WorkspaceStart { message, .. } | Self::AgentStart { message } => {
                Some(message.clone())
            }
        }
    }

    /// How this failure is surfaced to the operator.
    pub fn notification(&self) -> Option<Notification> {
        let notification = match self {
            Self::Aborted => return None,
            Self::Credential { location, workspace_id } => Notification::CredentialPrompt {
                location: location.clone(),
                workspace_id: workspace_id.clone(),
            },
            Self::Connect(err) => Notification::Alert {
                title: match err {
                    ConnectError::Closed => MESSAGES.connection.closed_title,
                    ConnectError::RetriesExhausted { .. } => {
                        MESSAGES.connection.retries_exhausted_title
                    }
                }
                .to_string(),
                content: connect_content(err),
            },
            Self::Remote { stage, source } if stage.is_project_stage() => Notification::Alert {
                title: MESSAGES.project.error_title.to_string(),
                content: project_error_content(source),
            },
            Self::Remote { stage, source } => Notification::Error(remote_message(*stage, source)),
            Self::Validation(err) => Notification::Error(err.message.clone()),
            Self::WorkspaceStart {
                title: Some(title),
                message,
            } => Notification::Alert {
                title: (*title).to_string(),
                content: message.clone(),
            },
            Self::WorkspaceStart { title: None, message } => Notification::Error(message.clone()),
            Self::AgentStart { message } => Notification::Alert {
                title: MESSAGES.workspace.agent_error_title.to_string(),
                content: message.clone(),
            },
        };
        Some(notification)
    }
}

fn connect_content(err: &ConnectError) -> String {
    match err {
        ConnectError::Closed => MESSAGES.connection.closed.to_string(),
        ConnectError::RetriesExhausted { url, attempts } => msg!(
            MESSAGES.connection.retries_exhausted,
            url = url,
            attempts = attempts.to_string()
        ),
    }
}

fn remote_message(stage: Stage, err: &RemoteError) -> String {
    match &err.message {
        Some(message) => message.clone(),
        None if stage == Stage::CreateWorkspace => MESSAGES.workspace.create_failed.to_string(),
        None if stage == Stage::StartWorkspace => MESSAGES.workspace.start_failed.to_string(),
        None => format!("Unable to {stage}."),
    }
}

fn project_error_content(err: &RemoteError) -> String {
    let message = err
        .message
        .clone()
        .unwrap_or_else(|| "unknown error".to_string());
    match &err.status_text {
        Some(status) => msg!(MESSAGES.project.error, status = status, message = message),
        None => msg!(MESSAGES.project.error_no_status, message = message),
    }
}
