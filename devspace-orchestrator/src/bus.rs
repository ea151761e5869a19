use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Callback invoked with each raw message published on a topic.
pub type MessageHandler = Box<dyn Fn(&str) + Send + Sync>;

/// Callback invoked when the bus connection closes.
pub type CloseHandler = Box<dyn Fn() + Send + Sync>;

/// Topic-based publish/subscribe connection.
///
/// Implemented by the master (server-wide) bus and by each workspace's
/// extension-server bus.
pub trait ChannelBus: Send + Sync {
    fn subscribe(&self, topic: &str, handler: MessageHandler);
    fn unsubscribe(&self, topic: &str);
    fn on_close(&self, handler: CloseHandler);
}

/// Subscribes `handler` to typed messages; raw payloads are decoded once here.
pub fn subscribe_typed<F>(bus: &dyn ChannelBus, topic: &str, kind: TopicKind, handler: F)
where
    F: Fn(BusMessage) + Send + Sync + 'static,
{
    bus.subscribe(
        topic,
        Box::new(move |raw: &str| handler(BusMessage::decode(kind, raw))),
    );
}

/// What a topic carries, which decides how its payloads decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicKind {
    Agent,
    Status,
    Output,
    ImportOutput,
}

impl fmt::Display for TopicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Agent => "agent",
            Self::Status => "status",
            Self::Output => "output",
            Self::ImportOutput => "import-output",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StatusEventType {
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
    Destroyed,
    Other(String),
}

impl From<String> for StatusEventType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "STARTING" => Self::Starting,
            "RUNNING" => Self::Running,
            "STOPPING" => Self::Stopping,
            "STOPPED" => Self::Stopped,
            "ERROR" => Self::Error,
            "DESTROYED" => Self::Destroyed,
            _ => Self::Other(value),
        }
    }
}

impl From<StatusEventType> for String {
    fn from(value: StatusEventType) -> Self {
        match value {
            StatusEventType::Starting => "STARTING".into(),
            StatusEventType::Running => "RUNNING".into(),
            StatusEventType::Stopping => "STOPPING".into(),
            StatusEventType::Stopped => "STOPPED".into(),
            StatusEventType::Error => "ERROR".into(),
            StatusEventType::Destroyed => "DESTROYED".into(),
            StatusEventType::Other(other) => other,
        }
    }
}

/// Workspace status change published on the status topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub event_type: StatusEventType,
    pub workspace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusEvent {
    pub fn new(event_type: StatusEventType, workspace_id: impl Into<String>) -> Self {
        Self {
            event_type,
            workspace_id: workspace_id.into(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MachineLogPayload {
    machine_name: Option<String>,
    content: String,
}

#[derive(Deserialize)]
struct ImportLinePayload {
    line: String,
}

/// A bus payload decoded according to its topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusMessage {
    Status(StatusEvent),
    MachineLog {
        machine: Option<String>,
        content: String,
    },
    ImportLine(String),
    Raw(String),
}

impl BusMessage {
    pub fn decode(kind: TopicKind, raw: &str) -> Self {
        match kind {
            TopicKind::Status => serde_json::from_str::<StatusEvent>(raw)
                .map(Self::Status)
                .unwrap_or_else(|_| Self::Raw(raw.to_string())),
            TopicKind::Agent | TopicKind::Output => decode_machine_log(raw),
            TopicKind::ImportOutput => serde_json::from_str::<ImportLinePayload>(raw)
                .map(|payload| Self::ImportLine(payload.line))
                .unwrap_or_else(|_| Self::Raw(raw.to_string())),
        }
    }

    /// The line appended to a step's log.
    pub fn display_line(&self) -> String {
        match self {
            Self::Status(event) => match &event.error {
                Some(error) => format!(
                    "{} {}: {error}",
                    event.workspace_id,
                    String::from(event.event_type.clone())
                ),
                None => format!(
                    "{} {}",
                    event.workspace_id,
                    String::from(event.event_type.clone())
                ),
            },
            Self::MachineLog {
                machine: Some(machine),
                content,
            } => format!("[{machine}] {content}"),
            Self::MachineLog {
                machine: None,
                content,
            } => content.clone(),
            Self::ImportLine(line) | Self::Raw(line) => line.clone(),
        }
    }
}

fn decode_machine_log(raw: &str) -> BusMessage {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::String(content)) => BusMessage::MachineLog {
            machine: None,
            content,
        },
        Ok(value @ serde_json::Value::Object(_)) => {
            match serde_json::from_value::<MachineLogPayload>(value) {
                Ok(payload) => BusMessage::MachineLog {
                    machine: payload.machine_name,
                    content: payload.content,
                },
                Err(_) => BusMessage::Raw(raw.to_string()),
            }
        }
        _ => BusMessage::Raw(raw.to_string()),
    }
}

/// Topics subscribed during one attempt, in subscription order.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSet {
    topics: IndexSet<String>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `topic`; returns false if it was already recorded.
    pub fn insert(&mut self, topic: &str) -> bool {
        self.topics.insert(topic.to_string())
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains(topic)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(String::as_str)
    }

    pub fn drain(&mut self) -> Vec<String> {
        self.topics.drain(..).collect()
    }
}
