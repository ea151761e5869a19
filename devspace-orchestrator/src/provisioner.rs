use devspace_config::ProvisionConfig;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use crate::api::{Notifier, ProjectApi, WorkspaceApi};
use crate::attempt::Attempt;
use crate::bus::ChannelBus;
use crate::cleanup::{AttemptResources, CleanupReport, CleanupSupervisor};
use crate::connection::{ConnectionManager, Transport};
use crate::error::{ProvisionError, Result};
use crate::import::{ImportCoordinator, ImportJob, ImportReport};
use crate::lifecycle::WorkspaceLifecycle;
use crate::progress::{CreationPhase, ProgressHandle, ResetOutcome};
use crate::request::{ProvisionRequest, ResourceKind};
use crate::workspace::WorkspaceDescriptor;

/// External systems a provisioning attempt talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub workspace_api: Arc<dyn WorkspaceApi>,
    pub project_api: Arc<dyn ProjectApi>,
    pub master_bus: Arc<dyn ChannelBus>,
    pub transport: Arc<dyn Transport>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug)]
pub struct ProvisionOutcome {
    pub attempt_id: String,
    pub workspace: WorkspaceDescriptor,
    pub import: ImportReport,
    pub cleanup: CleanupReport,
}

/// Runs provisioning attempts against a fixed set of collaborators.
pub struct Provisioner {
    collaborators: Collaborators,
    config: ProvisionConfig,
    progress: ProgressHandle,
    connections: ConnectionManager,
}

impl Provisioner {
    pub fn new(collaborators: Collaborators, config: ProvisionConfig, progress: ProgressHandle) -> Self {
        let connections = ConnectionManager::new(
            Arc::clone(&collaborators.transport),
            config.connection.retry_delay(),
        );
        Self {
            collaborators,
            config,
            progress,
            connections,
        }
    }

    pub fn progress(&self) -> &ProgressHandle {
        &self.progress
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    /// Clears the previous attempt, signalling exhausted resources first.
    pub fn reset(&self) -> ResetOutcome {
        let outcome = self.progress.reset();
        if outcome.resource_exhausted {
            self.collaborators.notifier.resource_exhausted();
        }
        outcome
    }

    /// Runs one attempt. Resources are released exactly once whatever the
    /// result, and a failure reaches the operator exactly once.
    #[instrument(skip_all)]
    pub async fn provision(&self, request: &ProvisionRequest) -> Result<ProvisionOutcome> {
        let mut request = request.clone();
        request.fill_default_names();
        let request = &request;

        self.reset();
        self.progress.begin();

        let attempt = Attempt::new(
            self.progress.clone(),
            Arc::clone(&self.collaborators.notifier),
        );
        info!(
            attempt_id = %attempt.id(),
            project = %request.project_name(),
            "provisioning attempt started"
        );

        let mut resources = AttemptResources::default();
        let result = self.run_attempt(request, &attempt, &mut resources).await;

        let cleanup = CleanupSupervisor::new(Arc::clone(&self.collaborators.master_bus))
            .cleanup(attempt.flag(), &mut resources);

        match result {
            Ok((workspace, import)) => {
                self.progress.advance_to(CreationPhase::Finished);
                if let Err(err) = self.collaborators.workspace_api.fetch_workspaces().await {
                    debug!(error = %err, "workspace list refresh failed");
                }
                info!(
                    attempt_id = %attempt.id(),
                    workspace_id = %workspace.id,
                    projects = import.projects_created,
                    commands = import.commands_added,
                    "provisioning finished"
                );
                Ok(ProvisionOutcome {
                    attempt_id: attempt.id().to_string(),
                    workspace,
                    import,
                    cleanup,
                })
            }
            Err(err) => {
                attempt.fail(&err);
                error!(attempt_id = %attempt.id(), error = %err, "provisioning failed");
                Err(err)
            }
        }
    }

    async fn run_attempt(
        &self,
        request: &ProvisionRequest,
        attempt: &Attempt,
        resources: &mut AttemptResources,
    ) -> Result<(WorkspaceDescriptor, ImportReport)> {
        request.validate()?;

        let lifecycle = WorkspaceLifecycle::new(
            self.collaborators.workspace_api.as_ref(),
            &self.collaborators.master_bus,
            &self.connections,
            &self.config,
        );
        let workspace = lifecycle.run(request, attempt, resources).await?;

        let bus = match &resources.session {
            Some(session) => Arc::clone(session.bus()),
            None => return Err(ProvisionError::Aborted),
        };
        let job = ImportJob::new(request, &workspace, &self.config);
        let import = ImportCoordinator::new(
            self.collaborators.project_api.as_ref(),
            self.collaborators.workspace_api.as_ref(),
            &self.config,
        )
        .run(&job, &bus, attempt, resources)
        .await?;

        if attempt.has_failed() {
            return Err(ProvisionError::Aborted);
        }
        Ok((workspace, import))
    }
}

/// Resource to preselect: an existing workspace when there is one.
pub fn suggest_resource(workspaces: &[WorkspaceDescriptor]) -> ResourceKind {
    if workspaces.is_empty() {
        ResourceKind::FromStack
    } else {
        ResourceKind::Existing
    }
}
