// Command handlers

use anyhow::{Context, Result};
use devspace_config::load_or_default;
use devspace_orchestrator::ProvisionRequest;
use std::path::Path;
use tracing::debug;

use crate::cli::{Args, Command};

pub mod plan;
pub mod validate;

/// Main command dispatcher
pub fn execute_command(args: Args) -> Result<()> {
    let config = load_or_default(args.config.as_deref()).context("Failed to load configuration")?;

    match &args.command {
        Command::Validate { request } => {
            debug!("Handling validate command");
            validate::handle_validate(request, &config)
        }
        Command::Plan {
            request,
            projects_root,
            json,
        } => {
            debug!("Handling plan command");
            plan::handle_plan(request, &config, projects_root.as_deref(), *json)
        }
    }
}

/// Reads a provisioning request; JSON files are recognised by extension.
pub fn read_request(path: &Path) -> Result<ProvisionRequest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file {}", path.display()))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let request = if is_json {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse request file {}", path.display()))?
    } else {
        serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse request file {}", path.display()))?
    };
    Ok(request)
}

/// Reads a request, fills default names and rejects it when it is incomplete.
pub fn load_valid_request(path: &Path) -> Result<ProvisionRequest> {
    let mut request = read_request(path)?;
    request.fill_default_names();
    request
        .validate()
        .with_context(|| format!("Invalid request {}", path.display()))?;
    Ok(request)
}
