use clap::Parser;
use std::sync::OnceLock;
use tracing::{debug, info_span};
use uuid::Uuid;

use devspace_messages::{msg, MESSAGES};

mod cli;
mod commands;

use cli::Args;
use commands::execute_command;

/// Request ID for this execution, attached to every log line
static REQUEST_ID: OnceLock<String> = OnceLock::new();

fn get_request_id() -> &'static str {
    REQUEST_ID.get_or_init(|| Uuid::new_v4().to_string())
}

fn main() {
    let _log_guard = devspace_logging::init_subscriber();

    let args = Args::parse();

    let span = info_span!("request", request_id = get_request_id(), command = ?args.command);
    let _enter = span.enter();

    if args.debug {
        debug!("Starting devspace command");
    }

    if let Err(e) = execute_command(args) {
        eprintln!("{}", msg!(MESSAGES.cli.error_generic, error = format!("{e:#}")));
        std::process::exit(1);
    }
}
