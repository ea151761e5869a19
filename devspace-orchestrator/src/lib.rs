//! Workspace provisioning orchestration
//!
//! Drives one provisioning attempt end to end: pick or create a workspace,
//! start it while following its status and output topics, connect to its
//! extension server with bounded retries, import the project, register its
//! commands, resolve its type, and always release every subscription and
//! connection when the attempt ends.
//!
//! Remote systems are reached only through the traits in [`api`],
//! [`bus`] and [`connection`], so the same pipeline runs against real
//! clients or against the fakes in `test_utils`.

pub mod api;
pub mod attempt;
pub mod bus;
pub mod cleanup;
pub mod connection;
pub mod error;
pub mod import;
pub mod lifecycle;
pub mod progress;
pub mod project;
pub mod provisioner;
pub mod request;
pub mod retry;
pub mod workspace;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use api::{Notification, Notifier, ProjectApi, WorkspaceApi};
pub use attempt::{Attempt, AttemptFlag};
pub use bus::{BusMessage, ChannelBus, StatusEvent, StatusEventType, SubscriptionSet, TopicKind};
pub use cleanup::{AttemptResources, CleanupReport, CleanupSupervisor};
pub use connection::{AgentSession, Connection, ConnectionManager, Transport};
pub use error::{
    ConnectError, ProvisionError, RemoteError, Result, Stage, TransportError, ValidationError,
};
pub use import::{ImportCoordinator, ImportJob, ImportMode, ImportReport, TypeResolution};
pub use lifecycle::{LifecyclePath, WorkspaceLifecycle};
pub use progress::{CreationPhase, CreationStep, ProgressHandle, ProgressSnapshot, ResetOutcome};
pub use project::{Command, ImportProject, ProjectConfig, SourceStorage};
pub use provisioner::{suggest_resource, Collaborators, ProvisionOutcome, Provisioner};
pub use request::{ProvisionRequest, ResourceKind, SourceOption, TemplateChoice, WorkspaceResource};
pub use retry::{with_recovery, Recovered, RetryBudget};
pub use workspace::{ChannelSet, WorkspaceConfig, WorkspaceDescriptor, WorkspaceStatus};
