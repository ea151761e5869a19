//! Collaborator interfaces the orchestrator drives.

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::oneshot;

use crate::bus::StatusEvent;
use crate::error::RemoteError;
use crate::project::{Command, ImportProject, ProjectConfig};
use crate::workspace::{WorkspaceConfig, WorkspaceDescriptor, WorkspaceStatus};

pub type ApiResult<T> = std::result::Result<T, RemoteError>;

#[async_trait]
pub trait WorkspaceApi: Send + Sync {
    /// Last fetched workspace list.
    fn workspaces(&self) -> Vec<WorkspaceDescriptor>;

    async fn fetch_workspaces(&self) -> ApiResult<Vec<WorkspaceDescriptor>>;

    async fn fetch_workspace_details(&self, id: &str) -> ApiResult<WorkspaceDescriptor>;

    async fn start_workspace(&self, id: &str, env: Option<&str>) -> ApiResult<()>;

    async fn create_workspace_from_config(
        &self,
        owner: Option<&str>,
        config: &WorkspaceConfig,
        attributes: &IndexMap<String, String>,
    ) -> ApiResult<WorkspaceDescriptor>;

    async fn add_command(&self, workspace_id: &str, command: &Command) -> ApiResult<()>;

    /// Extension-server URL of a running workspace.
    fn websocket_url(&self, id: &str) -> Option<String>;

    /// Resolves once `id` reaches `status`. Must be registered before the
    /// action that causes the transition.
    fn fetch_status_change(&self, id: &str, status: WorkspaceStatus)
        -> oneshot::Receiver<StatusEvent>;
}

#[async_trait]
pub trait ProjectApi: Send + Sync {
    async fn create_projects(&self, workspace_id: &str, batch: &[ProjectConfig]) -> ApiResult<()>;

    async fn resolve_import_project_type(
        &self,
        workspace_id: &str,
        data: &ImportProject,
    ) -> ApiResult<()>;
}

/// Operator-facing signals.
pub trait Notifier: Send + Sync {
    fn show_error(&self, message: &str);
    fn show_alert(&self, title: &str, content: &str);
    fn prompt_credentials(&self, location: &str, workspace_id: &str);
    fn resource_exhausted(&self);
}

/// A single operator notification for a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Error(String),
    Alert { title: String, content: String },
    CredentialPrompt { location: String, workspace_id: String },
}

impl Notification {
    pub fn deliver(&self, notifier: &dyn Notifier) {
        match self {
            Self::Error(message) => notifier.show_error(message),
            Self::Alert { title, content } => notifier.show_alert(title, content),
            Self::CredentialPrompt {
                location,
                workspace_id,
            } => notifier.prompt_credentials(location, workspace_id),
        }
    }
}
