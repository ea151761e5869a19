use devspace_config::ProvisionConfig;
use devspace_messages::{msg, MESSAGES};
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use crate::api::WorkspaceApi;
use crate::attempt::Attempt;
use crate::bus::{subscribe_typed, BusMessage, ChannelBus, StatusEvent, StatusEventType, TopicKind};
use crate::cleanup::AttemptResources;
use crate::connection::{register_close_handler, ConnectionManager};
use crate::error::{ProvisionError, RemoteError, Result, Stage, ValidationError};
use crate::progress::CreationPhase;
use crate::request::{ProvisionRequest, WorkspaceResource};
use crate::workspace::{prepare_environment, ChannelSet, WorkspaceDescriptor, WorkspaceStatus};

/// Route from the selected resource to a connected agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePath {
    ReuseRunning,
    ReuseStopped,
    CreateNew,
}

impl LifecyclePath {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReuseRunning => "reuse-running",
            Self::ReuseStopped => "reuse-stopped",
            Self::CreateNew => "create-new",
        }
    }
}

impl WorkspaceResource {
    pub fn select(&self) -> LifecyclePath {
        match self {
            Self::Existing { workspace } if workspace.status == WorkspaceStatus::Running => {
                LifecyclePath::ReuseRunning
            }
            Self::Existing { .. } => LifecyclePath::ReuseStopped,
            Self::FromStack { .. } | Self::FromConfig { .. } => LifecyclePath::CreateNew,
        }
    }
}

/// Brings the requested workspace to RUNNING and connects to its agent.
///
/// On success the agent session is stored in the attempt resources, next to
/// every master-bus topic subscribed on the way.
pub struct WorkspaceLifecycle<'a> {
    api: &'a dyn WorkspaceApi,
    master_bus: &'a Arc<dyn ChannelBus>,
    connections: &'a ConnectionManager,
    config: &'a ProvisionConfig,
}

impl<'a> WorkspaceLifecycle<'a> {
    pub fn new(
        api: &'a dyn WorkspaceApi,
        master_bus: &'a Arc<dyn ChannelBus>,
        connections: &'a ConnectionManager,
        config: &'a ProvisionConfig,
    ) -> Self {
        Self {
            api,
            master_bus,
            connections,
            config,
        }
    }

    #[instrument(skip_all, fields(attempt_id = %attempt.id()))]
    pub async fn run(
        &self,
        request: &ProvisionRequest,
        attempt: &Attempt,
        resources: &mut AttemptResources,
    ) -> Result<WorkspaceDescriptor> {
        let path = request.resource.select();
        info!(?path, "workspace lifecycle selected");

        match (&request.resource, path) {
            (WorkspaceResource::Existing { workspace }, LifecyclePath::ReuseRunning) => {
                self.reuse_running(workspace, attempt, resources).await
            }
            (WorkspaceResource::Existing { workspace }, _) => {
                self.start(workspace.clone(), attempt, resources).await
            }
            _ => {
                let created = self.create(request, attempt).await?;
                self.start(created, attempt, resources).await
            }
        }
    }

    #[instrument(skip_all, fields(workspace_id = %workspace.id))]
    async fn reuse_running(
        &self,
        workspace: &WorkspaceDescriptor,
        attempt: &Attempt,
        resources: &mut AttemptResources,
    ) -> Result<WorkspaceDescriptor> {
        let details = match self.api.fetch_workspace_details(&workspace.id).await {
            Ok(details) => details,
            Err(err) => {
                warn!(error = %err, "could not refresh workspace details, using selection");
                workspace.clone()
            }
        };

        self.connect_agent(&details.id, self.config.connection.initial_budget, attempt, resources)
            .await?;
        Ok(details)
    }

    #[instrument(skip_all)]
    async fn create(&self, request: &ProvisionRequest, attempt: &Attempt) -> Result<WorkspaceDescriptor> {
        let mut attributes = IndexMap::new();
        let config = match &request.resource {
            WorkspaceResource::FromStack {
                stack_id,
                name,
                config,
            } => {
                let mut config = config.clone();
                if let Some(name) = name {
                    config.name = name.clone();
                }
                let settings = &self.config.workspace;
                if let Some(machine) =
                    prepare_environment(&mut config, settings.default_ram_bytes, &settings.dev_agent)
                {
                    debug!(machine = %machine, "marked dev machine");
                }
                if let Some(stack_id) = stack_id {
                    attributes.insert("stackId".to_string(), stack_id.clone());
                }
                config
            }
            WorkspaceResource::FromConfig { config } => config.clone(),
            WorkspaceResource::Existing { workspace } => workspace.config.clone(),
        };

        let created = self
            .api
            .create_workspace_from_config(request.owner.as_deref(), &config, &attributes)
            .await
            .map_err(ProvisionError::remote(Stage::CreateWorkspace))?;
        info!(workspace_id = %created.id, name = %created.name(), "workspace created");

        let details = match self.api.fetch_workspace_details(&created.id).await {
            Ok(details) => details,
            Err(err) => {
                warn!(error = %err, "could not fetch created workspace details");
                created
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(self.config.workspace.start_delay()) => {}
            _ = attempt.aborted() => return Err(ProvisionError::Aborted),
        }
        Ok(details)
    }

    #[instrument(skip_all, fields(workspace_id = %workspace.id))]
    async fn start(
        &self,
        workspace: WorkspaceDescriptor,
        attempt: &Attempt,
        resources: &mut AttemptResources,
    ) -> Result<WorkspaceDescriptor> {
        let progress = attempt.progress();
        progress.advance_to(CreationPhase::StartWorkspace);

        let channels = ChannelSet::from_workspace(&workspace, &self.config.workspace);
        self.subscribe_channels(&workspace.id, &channels, attempt, resources);
        register_close_handler(self.master_bus.as_ref(), attempt);

        let running = self.api.fetch_status_change(&workspace.id, WorkspaceStatus::Running);
        let errored = self.api.fetch_status_change(&workspace.id, WorkspaceStatus::Error);

        attempt.ensure_active()?;
        self.api
            .start_workspace(&workspace.id, workspace.config.default_env.as_deref())
            .await
            .map_err(|err| self.start_failure(err))?;
        if let Err(err) = self.api.fetch_workspaces().await {
            debug!(error = %err, "workspace list refresh failed");
        }

        tokio::select! {
            event = running => {
                if event.is_err() {
                    return Err(ProvisionError::WorkspaceStart {
                        title: None,
                        message: msg!(MESSAGES.workspace.status_dropped, id = &workspace.id),
                    });
                }
            }
            event = wait_for_event(errored) => {
                progress.advance_to(CreationPhase::AgentReady);
                let cause = event.error.unwrap_or_default();
                return Err(ProvisionError::AgentStart {
                    message: msg!(MESSAGES.workspace.agent_error, error = cause),
                });
            }
            _ = attempt.aborted() => return Err(ProvisionError::Aborted),
        }

        attempt.ensure_active()?;
        info!("workspace running");
        progress.advance_to(CreationPhase::AgentReady);

        let details = self
            .api
            .fetch_workspace_details(&workspace.id)
            .await
            .map_err(ProvisionError::remote(Stage::FetchDetails))?;
        attempt.ensure_active()?;
        self.connect_agent(&details.id, self.config.connection.reconnect_budget, attempt, resources)
            .await?;
        Ok(details)
    }

    async fn connect_agent(
        &self,
        workspace_id: &str,
        budget: u32,
        attempt: &Attempt,
        resources: &mut AttemptResources,
    ) -> Result<()> {
        let url = self
            .api
            .websocket_url(workspace_id)
            .ok_or_else(|| ValidationError::new(MESSAGES.connection.url_missing))?;
        let session = self.connections.connect(&url, budget, attempt).await?;
        resources.session = Some(session);
        Ok(())
    }

    fn subscribe_channels(
        &self,
        workspace_id: &str,
        channels: &ChannelSet,
        attempt: &Attempt,
        resources: &mut AttemptResources,
    ) {
        for (kind, topic) in channels.topics() {
            if !resources.subscriptions.insert(topic) {
                continue;
            }
            debug!(%kind, topic, "subscribing");
            match kind {
                TopicKind::Status => subscribe_typed(
                    self.master_bus.as_ref(),
                    topic,
                    kind,
                    status_handler(workspace_id.to_string(), attempt.clone()),
                ),
                _ => subscribe_typed(self.master_bus.as_ref(), topic, kind, log_handler(kind, attempt.clone())),
            }
        }
    }

    fn start_failure(&self, err: RemoteError) -> ProvisionError {
        let limit_code = self.config.errors.resource_limit_code;
        let message = if err.has_code(limit_code) {
            err.resource_limit_message().or_else(|| err.message.clone())
        } else {
            err.message.clone()
        };

        ProvisionError::WorkspaceStart {
            title: None,
            message: message.unwrap_or_else(|| MESSAGES.workspace.start_failed.to_string()),
        }
    }
}

/// Resolves with the event, or never when the watch was dropped.
async fn wait_for_event(rx: oneshot::Receiver<StatusEvent>) -> StatusEvent {
    match rx.await {
        Ok(event) => event,
        Err(_) => std::future::pending().await,
    }
}

fn log_handler(kind: TopicKind, attempt: Attempt) -> impl Fn(BusMessage) + Send + Sync + 'static {
    move |message| {
        if kind == TopicKind::Agent {
            attempt.progress().advance_to(CreationPhase::AgentReady);
        }
        attempt.progress().append_current(&message.display_line());
    }
}

fn status_handler(workspace_id: String, attempt: Attempt) -> impl Fn(BusMessage) + Send + Sync + 'static {
    move |message| {
        let event = match message {
            BusMessage::Status(event) if event.workspace_id == workspace_id => event,
            other => {
                debug!(%workspace_id, message = %other.display_line(), "status message ignored");
                return;
            }
        };

        let failure = match &event.event_type {
            StatusEventType::Destroyed => ProvisionError::WorkspaceStart {
                title: Some(MESSAGES.workspace.destroyed_title),
                message: MESSAGES.workspace.destroyed.to_string(),
            },
            StatusEventType::Error => ProvisionError::WorkspaceStart {
                title: Some(MESSAGES.workspace.start_error_title),
                message: match &event.error {
                    Some(error) => msg!(MESSAGES.workspace.start_error, error = error),
                    None => MESSAGES.workspace.start_error_no_detail.to_string(),
                },
            },
            other => {
                debug!(%workspace_id, status = ?other, "workspace status changed");
                return;
            }
        };

        if attempt.flag().is_active() {
            attempt.fail(&failure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::WorkspaceConfig;

    fn existing(status: WorkspaceStatus) -> WorkspaceResource {
        WorkspaceResource::Existing {
            workspace: WorkspaceDescriptor::new("W1", WorkspaceConfig::default(), status),
        }
    }

    #[test]
    fn test_select_lifecycle_path() {
        assert_eq!(
            existing(WorkspaceStatus::Running).select(),
            LifecyclePath::ReuseRunning
        );
        assert_eq!(
            existing(WorkspaceStatus::Stopped).select(),
            LifecyclePath::ReuseStopped
        );
        let from_config = WorkspaceResource::FromConfig {
            config: WorkspaceConfig::default(),
        };
        assert_eq!(from_config.select(), LifecyclePath::CreateNew);
    }
}
