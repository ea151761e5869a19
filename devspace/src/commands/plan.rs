use anyhow::{Context, Result};
use devspace_config::ProvisionConfig;
use devspace_messages::{msg, MESSAGES};
use devspace_orchestrator::project::flatten_projects;
use devspace_orchestrator::{
    ChannelSet, Command, ImportJob, ImportMode, ProvisionRequest, WorkspaceDescriptor,
    WorkspaceResource, WorkspaceStatus,
};
use serde::Serialize;
use std::path::Path;

use super::load_valid_request;

const PENDING_WORKSPACE_ID: &str = "<new>";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedProject {
    pub path: String,
    pub kind: Option<String>,
}

/// Dry-run description of a provisioning attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionPlan {
    pub project: String,
    pub lifecycle: &'static str,
    pub workspace: String,
    pub topics: Vec<String>,
    pub wizard: bool,
    pub projects: Vec<PlannedProject>,
    pub commands: Vec<Command>,
}

pub fn handle_plan(
    path: &Path,
    config: &ProvisionConfig,
    projects_root: Option<&str>,
    json: bool,
) -> Result<()> {
    let request = load_valid_request(path)?;
    let plan = build_plan(&request, config, projects_root);

    if json {
        let rendered = serde_json::to_string_pretty(&plan).context("Failed to render plan")?;
        println!("{rendered}");
    } else {
        print_plan(&plan);
    }
    Ok(())
}

/// Target workspace as far as it is known before anything is created.
fn target_workspace(request: &ProvisionRequest) -> WorkspaceDescriptor {
    match &request.resource {
        WorkspaceResource::Existing { workspace } => workspace.clone(),
        WorkspaceResource::FromStack { name, config, .. } => {
            let mut config = config.clone();
            if let Some(name) = name {
                config.name = name.clone();
            }
            WorkspaceDescriptor::new(PENDING_WORKSPACE_ID, config, WorkspaceStatus::Stopped)
        }
        WorkspaceResource::FromConfig { config } => WorkspaceDescriptor::new(
            PENDING_WORKSPACE_ID,
            config.clone(),
            WorkspaceStatus::Stopped,
        ),
    }
}

pub fn build_plan(
    request: &ProvisionRequest,
    config: &ProvisionConfig,
    projects_root: Option<&str>,
) -> ProvisionPlan {
    let workspace = target_workspace(request);
    let topics = ChannelSet::from_workspace(&workspace, &config.workspace)
        .topics()
        .into_iter()
        .map(|(_, topic)| topic.to_string())
        .collect();

    let mut job = ImportJob::new(request, &workspace, config);
    if job.project_root.is_none() {
        job.project_root = projects_root.map(str::to_string);
    }
    let wizard = job.mode == ImportMode::Wizard;

    let (projects, commands) = if wizard {
        (Vec::new(), Vec::new())
    } else {
        let projects = flatten_projects(&job.project)
            .into_iter()
            .map(|project| PlannedProject {
                path: project.path.unwrap_or_default(),
                kind: project.kind,
            })
            .collect();
        (projects, job.resolved_commands(&config.project.path_token))
    };

    ProvisionPlan {
        project: job.project_name.clone(),
        lifecycle: request.resource.select().as_str(),
        workspace: format!("{} ({})", workspace.name(), workspace.id),
        topics,
        wizard,
        projects,
        commands,
    }
}

fn print_plan(plan: &ProvisionPlan) {
    println!("{}", msg!(MESSAGES.cli.plan_header, project = &plan.project));
    println!(
        "{}",
        msg!(
            MESSAGES.cli.plan_path,
            path = format!("{} {}", plan.lifecycle, plan.workspace)
        )
    );
    for topic in &plan.topics {
        println!("{}", msg!(MESSAGES.cli.plan_topic, topic = topic));
    }

    if plan.wizard {
        println!("{}", MESSAGES.cli.plan_wizard);
        return;
    }

    for project in &plan.projects {
        println!(
            "{}",
            msg!(
                MESSAGES.cli.plan_project,
                path = &project.path,
                kind = project.kind.as_deref().unwrap_or("untyped")
            )
        );
    }
    if plan.commands.is_empty() {
        println!("{}", MESSAGES.cli.plan_no_commands);
    }
    for command in &plan.commands {
        println!(
            "{}",
            msg!(
                MESSAGES.cli.plan_command,
                name = &command.name,
                line = &command.command_line
            )
        );
    }
}
