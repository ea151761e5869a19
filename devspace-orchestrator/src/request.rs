use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::project::{generate_project_name, generate_workspace_name, ImportProject};
use crate::workspace::{WorkspaceConfig, WorkspaceDescriptor, WorkspaceStatus};

/// Workspace the project is provisioned into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum WorkspaceResource {
    Existing {
        workspace: WorkspaceDescriptor,
    },
    FromStack {
        #[serde(default)]
        stack_id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        config: WorkspaceConfig,
    },
    FromConfig {
        config: WorkspaceConfig,
    },
}

impl WorkspaceResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Existing { .. } => ResourceKind::Existing,
            Self::FromStack { .. } => ResourceKind::FromStack,
            Self::FromConfig { .. } => ResourceKind::FromConfig,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Existing,
    FromStack,
    FromConfig,
}

/// Whether sources come from a template or from a user-supplied location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceOption {
    #[default]
    New,
    Existing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemplateChoice {
    #[default]
    Samples,
    Wizard,
}

/// Everything needed to run one provisioning attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    pub resource: WorkspaceResource,
    pub import: ImportProject,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub project_description: Option<String>,
    #[serde(default)]
    pub source_option: SourceOption,
    #[serde(default)]
    pub template: TemplateChoice,
    #[serde(default)]
    pub owner: Option<String>,
}

impl ProvisionRequest {
    pub fn new(resource: WorkspaceResource, import: ImportProject) -> Self {
        Self {
            resource,
            import,
            project_name: None,
            project_description: None,
            source_option: SourceOption::default(),
            template: TemplateChoice::default(),
            owner: None,
        }
    }

    pub fn project_name(&self) -> &str {
        self.project_name
            .as_deref()
            .unwrap_or(&self.import.project.name)
    }

    /// Generates the workspace and project names the request leaves out.
    ///
    /// Only absent names are filled; an explicitly empty project name is
    /// kept so validation still rejects it.
    pub fn fill_default_names(&mut self) {
        match &mut self.resource {
            WorkspaceResource::FromStack { name, config, .. } => {
                if name.is_none() && config.name.trim().is_empty() {
                    *name = Some(generate_workspace_name());
                }
            }
            WorkspaceResource::FromConfig { config } => {
                if config.name.trim().is_empty() {
                    config.name = generate_workspace_name();
                }
            }
            WorkspaceResource::Existing { .. } => {}
        }

        if self.project_name.is_none() && self.import.project.name.trim().is_empty() {
            self.project_name = Some(generate_project_name(self.import.project.kind.as_deref()));
        }
    }

    /// New projects from the wizard template are created by the wizard itself.
    pub fn uses_wizard(&self) -> bool {
        self.source_option == SourceOption::New && self.template == TemplateChoice::Wizard
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let name = self.project_name();
        if name.trim().is_empty() {
            return Err(ValidationError::new("project name must not be empty"));
        }
        if name.contains('/') {
            return Err(ValidationError::new(format!(
                "project name '{name}' must not contain '/'"
            )));
        }

        match &self.resource {
            WorkspaceResource::Existing { workspace } => {
                if workspace.id.is_empty() {
                    return Err(ValidationError::new("existing workspace has no id"));
                }
                if matches!(
                    workspace.status,
                    WorkspaceStatus::Starting | WorkspaceStatus::Stopping
                ) {
                    return Err(ValidationError::new(format!(
                        "workspace {} is {} and cannot be used yet",
                        workspace.id, workspace.status
                    )));
                }
            }
            WorkspaceResource::FromStack { name, config, .. } => {
                let effective = name.as_deref().unwrap_or(&config.name);
                if effective.trim().is_empty() {
                    return Err(ValidationError::new("workspace name must not be empty"));
                }
            }
            WorkspaceResource::FromConfig { config } => {
                if config.name.trim().is_empty() {
                    return Err(ValidationError::new("workspace name must not be empty"));
                }
            }
        }

        if !self.uses_wizard() && self.import.source.location.trim().is_empty() {
            return Err(ValidationError::new("project source location must not be empty"));
        }
        Ok(())
    }
}
