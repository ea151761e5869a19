use devspace_config::WorkspaceSettings;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::bus::TopicKind;

pub const STATUS_CHANNEL_REL: &str = "environment.status_channel";
pub const OUTPUT_CHANNEL_REL: &str = "environment.output_channel";

const MEMORY_LIMIT_ATTRIBUTE: &str = "memoryLimitBytes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkspaceStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
    Destroyed,
}

impl fmt::Display for WorkspaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Error => "ERROR",
            Self::Destroyed => "DESTROYED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkParameter {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub default_value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub rel: String,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub parameters: Vec<LinkParameter>,
}

impl Link {
    /// Link whose first parameter names a bus topic.
    pub fn channel(rel: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            rel: rel.into(),
            href: None,
            parameters: vec![LinkParameter {
                name: Some("channel".to_string()),
                default_value: Some(topic.into()),
            }],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineConfig {
    #[serde(default)]
    pub agents: Vec<String>,
    #[serde(default)]
    pub attributes: IndexMap<String, serde_json::Value>,
}

impl MachineConfig {
    /// Memory limit in bytes; `None` when absent or set to -1.
    pub fn memory_limit(&self) -> Option<i64> {
        let limit = match self.attributes.get(MEMORY_LIMIT_ATTRIBUTE)? {
            serde_json::Value::Number(n) => n.as_i64()?,
            serde_json::Value::String(s) => s.parse().ok()?,
            _ => return None,
        };
        (limit != -1).then_some(limit)
    }

    pub fn set_memory_limit(&mut self, bytes: i64) {
        self.attributes
            .insert(MEMORY_LIMIT_ATTRIBUTE.to_string(), bytes.into());
    }

    pub fn is_dev(&self, dev_agent: &str) -> bool {
        self.agents.iter().any(|agent| agent == dev_agent)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default)]
    pub recipe: Recipe,
    #[serde(default)]
    pub machines: IndexMap<String, MachineConfig>,
}

/// Declarative workspace configuration: environments and machines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    pub name: String,
    #[serde(default)]
    pub default_env: Option<String>,
    #[serde(default)]
    pub environments: IndexMap<String, Environment>,
}

impl WorkspaceConfig {
    pub fn default_environment(&self) -> Option<&Environment> {
        self.environments.get(self.default_env.as_deref()?)
    }
}

/// Applies stack defaults to the default environment before creation.
///
/// Machines without a memory limit get `default_ram` and, when no machine
/// carries `dev_agent`, the first machine becomes the dev machine. Returns
/// the name of the machine that was made dev, if any.
pub fn prepare_environment(
    config: &mut WorkspaceConfig,
    default_ram: i64,
    dev_agent: &str,
) -> Option<String> {
    let env_name = config.default_env.clone()?;
    let environment = config.environments.get_mut(&env_name)?;

    for machine in environment.machines.values_mut() {
        if machine.memory_limit().is_none() {
            machine.set_memory_limit(default_ram);
        }
    }

    if environment.machines.values().any(|m| m.is_dev(dev_agent)) {
        return None;
    }

    let (name, machine) = environment.machines.get_index_mut(0)?;
    machine.agents.push(dev_agent.to_string());
    Some(name.clone())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRuntime {
    #[serde(default)]
    pub env_variables: IndexMap<String, String>,
}

/// A workspace as reported by the workspace API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceDescriptor {
    pub id: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub config: WorkspaceConfig,
    pub status: WorkspaceStatus,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub runtime: Option<WorkspaceRuntime>,
    #[serde(default)]
    pub attributes: IndexMap<String, String>,
}

impl WorkspaceDescriptor {
    pub fn new(id: impl Into<String>, config: WorkspaceConfig, status: WorkspaceStatus) -> Self {
        Self {
            id: id.into(),
            namespace: None,
            config,
            status,
            links: Vec::new(),
            runtime: None,
            attributes: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Topic published through the first parameter of the `rel` link.
    pub fn link_channel(&self, rel: &str) -> Option<&str> {
        self.links
            .iter()
            .find(|link| link.rel == rel)?
            .parameters
            .first()?
            .default_value
            .as_deref()
    }

    pub fn runtime_env(&self, name: &str) -> Option<&str> {
        self.runtime
            .as_ref()?
            .env_variables
            .get(name)
            .map(String::as_str)
    }
}

/// Topics describing a workspace's progress during start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSet {
    pub agent: String,
    pub status: Option<String>,
    pub output: Option<String>,
}

impl ChannelSet {
    pub fn from_workspace(workspace: &WorkspaceDescriptor, settings: &WorkspaceSettings) -> Self {
        Self {
            agent: settings.agent_channel(&workspace.id),
            status: workspace.link_channel(STATUS_CHANNEL_REL).map(str::to_string),
            output: workspace.link_channel(OUTPUT_CHANNEL_REL).map(str::to_string),
        }
    }

    pub fn topics(&self) -> Vec<(TopicKind, &str)> {
        let mut topics = vec![(TopicKind::Agent, self.agent.as_str())];
        if let Some(status) = &self.status {
            topics.push((TopicKind::Status, status.as_str()));
        }
        if let Some(output) = &self.output {
            topics.push((TopicKind::Output, output.as_str()));
        }
        topics
    }
}
