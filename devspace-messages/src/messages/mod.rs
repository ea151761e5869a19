//! Central registry for all operator-facing message templates.
//!
//! Organized by the phase of a provisioning attempt that emits them:
//! - `progress` - creation step labels
//! - `workspace` - workspace creation and start failures
//! - `connection` - extension-server connection problems
//! - `project` - project import, command registration and type resolution
//! - `cli` - output of the `devspace` binary
//!
//! Templates use `{variable}` syntax, filled in by [`crate::msg!`].

mod cli;
mod connection;
mod progress;
mod project;
mod workspace;

pub use cli::{CliMessages, CLI_MESSAGES};
pub use connection::{ConnectionMessages, CONNECTION_MESSAGES};
pub use progress::{ProgressMessages, PROGRESS_MESSAGES};
pub use project::{ProjectMessages, PROJECT_MESSAGES};
pub use workspace::{WorkspaceMessages, WORKSPACE_MESSAGES};

/// Unified messages struct containing all domain-specific message modules
pub struct Messages {
    pub progress: ProgressMessages,
    pub workspace: WorkspaceMessages,
    pub connection: ConnectionMessages,
    pub project: ProjectMessages,
    pub cli: CliMessages,
}

/// Global messages constant - main entry point for all message templates
pub const MESSAGES: Messages = Messages {
    progress: PROGRESS_MESSAGES,
    workspace: WORKSPACE_MESSAGES,
    connection: CONNECTION_MESSAGES,
    project: PROJECT_MESSAGES,
    cli: CLI_MESSAGES,
};
