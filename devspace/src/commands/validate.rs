use anyhow::Result;
use devspace_config::ProvisionConfig;
use devspace_messages::{msg, MESSAGES};
use std::path::Path;
use tracing::info;

use super::load_valid_request;

pub fn handle_validate(path: &Path, config: &ProvisionConfig) -> Result<()> {
    let request = load_valid_request(path)?;
    info!(
        project = request.project_name(),
        lifecycle = request.resource.select().as_str(),
        connect_budget = config.connection.initial_budget,
        "request validated"
    );

    println!(
        "{}",
        msg!(MESSAGES.cli.validate_ok, file = path.display().to_string())
    );
    Ok(())
}
