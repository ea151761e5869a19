use devspace_config::ProvisionConfig;
use devspace_messages::{msg, MESSAGES};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::api::{ProjectApi, WorkspaceApi};
use crate::attempt::Attempt;
use crate::bus::{subscribe_typed, ChannelBus, TopicKind};
use crate::cleanup::AttemptResources;
use crate::error::{ProvisionError, RemoteError, Result, Stage};
use crate::progress::CreationPhase;
use crate::project::{flatten_projects, Command, CommandTemplate, ImportProject};
use crate::request::{ProvisionRequest, SourceOption};
use crate::retry::with_recovery;
use crate::workspace::WorkspaceDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Create the projects, commands and type here.
    Direct,
    /// Hand the empty workspace to the project wizard.
    Wizard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeResolution {
    Declared,
    Fallback,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub projects_created: usize,
    pub commands_added: usize,
    pub resolution: TypeResolution,
}

/// Project import work for a workspace whose agent is connected.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportJob {
    pub workspace_id: String,
    pub project_name: String,
    pub project: ImportProject,
    pub commands: Vec<Command>,
    pub retry_budget: u32,
    pub project_root: Option<String>,
    pub mode: ImportMode,
}

impl ImportJob {
    pub fn new(
        request: &ProvisionRequest,
        workspace: &WorkspaceDescriptor,
        config: &ProvisionConfig,
    ) -> Self {
        let project_name = request.project_name().to_string();

        let mut project = request.import.clone();
        project.project.name = project_name.clone();
        if let Some(description) = &request.project_description {
            project.project.description = Some(description.clone());
        }
        if request.source_option == SourceOption::Existing {
            project.project.commands.clear();
        }

        Self {
            workspace_id: workspace.id.clone(),
            project_name,
            commands: project.project.commands.clone(),
            project,
            retry_budget: config.project.type_resolution_retries,
            project_root: workspace
                .runtime_env(&config.project.projects_root_var)
                .map(str::to_string),
            mode: if request.uses_wizard() {
                ImportMode::Wizard
            } else {
                ImportMode::Direct
            },
        }
    }

    pub fn resolved_commands(&self, token: &str) -> Vec<Command> {
        let template = CommandTemplate {
            project_name: &self.project_name,
            projects_root: self.project_root.as_deref(),
            token,
        };
        self.commands.iter().map(|c| template.resolve(c)).collect()
    }
}

/// Creates the project batch, registers its commands one at a time and
/// resolves its type with a single fallback.
pub struct ImportCoordinator<'a> {
    projects: &'a dyn ProjectApi,
    workspaces: &'a dyn WorkspaceApi,
    config: &'a ProvisionConfig,
}

impl<'a> ImportCoordinator<'a> {
    pub fn new(
        projects: &'a dyn ProjectApi,
        workspaces: &'a dyn WorkspaceApi,
        config: &'a ProvisionConfig,
    ) -> Self {
        Self {
            projects,
            workspaces,
            config,
        }
    }

    #[instrument(skip_all, fields(workspace_id = %job.workspace_id, project = %job.project_name))]
    pub async fn run(
        &self,
        job: &ImportJob,
        bus: &Arc<dyn ChannelBus>,
        attempt: &Attempt,
        resources: &mut AttemptResources,
    ) -> Result<ImportReport> {
        attempt.progress().advance_to(CreationPhase::ImportProject);

        if job.mode == ImportMode::Wizard {
            info!("{}", msg!(MESSAGES.project.deferred_to_wizard, project = &job.project_name));
            return Ok(ImportReport {
                projects_created: 0,
                commands_added: 0,
                resolution: TypeResolution::Skipped,
            });
        }

        let topic = self.config.project.import_output_channel.clone();
        let progress = attempt.progress().clone();
        subscribe_typed(bus.as_ref(), &topic, TopicKind::ImportOutput, move |message| {
            progress.append_current(&message.display_line());
        });
        resources.import_topic = Some(topic);

        let batch = flatten_projects(&job.project);
        self.projects
            .create_projects(&job.workspace_id, &batch)
            .await
            .map_err(|err| self.project_failure(Stage::CreateProjects, err, job))?;
        debug!(count = batch.len(), "projects created");
        attempt.ensure_active()?;

        let commands_added = self.register_commands(job, attempt).await?;
        attempt.ensure_active()?;
        let resolution = self.resolve_type(job, attempt).await?;

        Ok(ImportReport {
            projects_created: batch.len(),
            commands_added,
            resolution,
        })
    }

    /// Adds commands strictly in order; the first failure stops the rest.
    async fn register_commands(&self, job: &ImportJob, attempt: &Attempt) -> Result<usize> {
        let commands = job.resolved_commands(&self.config.project.path_token);
        for (index, command) in commands.iter().enumerate() {
            attempt.ensure_active()?;
            self.workspaces
                .add_command(&job.workspace_id, command)
                .await
                .map_err(|err| self.project_failure(Stage::AddCommand, err, job))?;
            debug!(index, name = %command.name, "command registered");
        }

        if !commands.is_empty() {
            info!(
                "{}",
                msg!(
                    MESSAGES.project.commands_added,
                    count = commands.len().to_string(),
                    project = &job.project_name
                )
            );
        }
        Ok(commands.len())
    }

    async fn resolve_type(&self, job: &ImportJob, attempt: &Attempt) -> Result<TypeResolution> {
        let fallback = self.config.project.fallback_type.as_str();
        let workspace_id = job.workspace_id.as_str();
        let projects = self.projects;

        let recovered = with_recovery(
            job.project.clone(),
            job.retry_budget,
            |data: &mut ImportProject, _err: &RemoteError| {
                data.project.kind = Some(fallback.to_string());
                data.project.attributes.clear();
                attempt
                    .progress()
                    .append_current(&msg!(MESSAGES.project.type_fallback, fallback = fallback));
            },
            |data: ImportProject| async move {
                projects.resolve_import_project_type(workspace_id, &data).await
            },
        )
        .await
        .map_err(|err| self.project_failure(Stage::ResolveType, err, job))?;

        Ok(if recovered.recoveries == 0 {
            TypeResolution::Declared
        } else {
            TypeResolution::Fallback
        })
    }

    fn project_failure(&self, stage: Stage, err: RemoteError, job: &ImportJob) -> ProvisionError {
        if err.has_code(self.config.errors.missing_credential_code) {
            return ProvisionError::Credential {
                location: job.project.source.location.clone(),
                workspace_id: job.workspace_id.clone(),
            };
        }
        ProvisionError::Remote { stage, source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{ProjectConfig, SourceStorage};
    use crate::request::WorkspaceResource;
    use crate::workspace::{WorkspaceConfig, WorkspaceRuntime, WorkspaceStatus};

    fn request(source_option: SourceOption) -> ProvisionRequest {
        let mut project = ProjectConfig::named("template-name");
        project.commands = vec![Command::new("build", "cd ${current.project.path} && make")];
        let mut request = ProvisionRequest::new(
            WorkspaceResource::FromConfig {
                config: WorkspaceConfig::default(),
            },
            ImportProject {
                source: SourceStorage {
                    location: "https://example.com/app.git".into(),
                    ..Default::default()
                },
                project,
                projects: Vec::new(),
            },
        );
        request.project_name = Some("myapp".into());
        request.source_option = source_option;
        request
    }

    fn workspace() -> WorkspaceDescriptor {
        let mut workspace =
            WorkspaceDescriptor::new("W1", WorkspaceConfig::default(), WorkspaceStatus::Running);
        workspace.runtime = Some(WorkspaceRuntime {
            env_variables: [("PROJECTS_ROOT".to_string(), "/projects".to_string())]
                .into_iter()
                .collect(),
        });
        workspace
    }

    #[test]
    fn test_job_from_template_keeps_commands() {
        let job = ImportJob::new(&request(SourceOption::New), &workspace(), &ProvisionConfig::default());

        assert_eq!(job.project.project.name, "myapp");
        assert_eq!(job.project_root.as_deref(), Some("/projects"));
        assert_eq!(job.mode, ImportMode::Direct);
        let commands = job.resolved_commands("${current.project.path}");
        assert_eq!(commands[0].name, "myapp: build");
        assert_eq!(commands[0].command_line, "cd /projects/myapp && make");
    }

    #[test]
    fn test_job_from_existing_source_drops_commands() {
        let job = ImportJob::new(
            &request(SourceOption::Existing),
            &workspace(),
            &ProvisionConfig::default(),
        );
        assert!(job.commands.is_empty());
        assert!(job.project.project.commands.is_empty());
    }
}
