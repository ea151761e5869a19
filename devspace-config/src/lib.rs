//! Provisioning configuration.
//!
//! Settings live in `~/.devspace/config.yaml` (or a path given explicitly),
//! every field has a default, and a handful of timing knobs can be
//! overridden through `DEVSPACE_*` environment variables.

pub mod config;
pub mod error;
pub mod loader;

pub use config::{
    ConnectionSettings, ErrorCodeSettings, ProjectSettings, ProvisionConfig, WorkspaceSettings,
};
pub use error::{ConfigError, Result};
pub use loader::{default_config_path, load, load_or_default};
