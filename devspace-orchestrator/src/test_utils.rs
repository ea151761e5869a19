//! In-memory collaborators for tests.

use async_trait::async_trait;
use devspace_config::ProvisionConfig;
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

use crate::api::{ApiResult, Notifier, ProjectApi, WorkspaceApi};
use crate::bus::{ChannelBus, CloseHandler, MessageHandler, StatusEvent, StatusEventType};
use crate::connection::{Connection, Transport};
use crate::error::{RemoteError, TransportError};
use crate::progress::ProgressHandle;
use crate::project::{Command, ImportProject, ProjectConfig};
use crate::provisioner::{Collaborators, Provisioner};
use crate::workspace::{
    Link, WorkspaceConfig, WorkspaceDescriptor, WorkspaceRuntime, WorkspaceStatus,
    OUTPUT_CHANNEL_REL, STATUS_CHANNEL_REL,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type SharedHandler = Arc<dyn Fn(&str) + Send + Sync>;
type SharedCloseHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct BusState {
    handlers: IndexMap<String, Vec<SharedHandler>>,
    close_handlers: Vec<SharedCloseHandler>,
    unsubscribed: Vec<String>,
}

/// Bus that delivers published messages synchronously.
#[derive(Default)]
pub struct FakeBus {
    state: Mutex<BusState>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `raw` to every handler of `topic`; returns how many ran.
    pub fn publish(&self, topic: &str, raw: &str) -> usize {
        let handlers = lock(&self.state)
            .handlers
            .get(topic)
            .cloned()
            .unwrap_or_default();
        for handler in &handlers {
            handler(raw);
        }
        handlers.len()
    }

    pub fn close(&self) {
        let handlers = lock(&self.state).close_handlers.clone();
        for handler in handlers {
            handler();
        }
    }

    pub fn subscribed(&self) -> Vec<String> {
        lock(&self.state).handlers.keys().cloned().collect()
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        lock(&self.state).handlers.contains_key(topic)
    }

    pub fn unsubscribed(&self) -> Vec<String> {
        lock(&self.state).unsubscribed.clone()
    }
}

impl ChannelBus for FakeBus {
    fn subscribe(&self, topic: &str, handler: MessageHandler) {
        lock(&self.state)
            .handlers
            .entry(topic.to_string())
            .or_default()
            .push(Arc::from(handler));
    }

    fn unsubscribe(&self, topic: &str) {
        let mut state = lock(&self.state);
        state.handlers.shift_remove(topic);
        state.unsubscribed.push(topic.to_string());
    }

    fn on_close(&self, handler: CloseHandler) {
        lock(&self.state).close_handlers.push(Arc::from(handler));
    }
}

struct FakeConnection {
    bus: Arc<FakeBus>,
    closes: Arc<AtomicUsize>,
}

impl Connection for FakeConnection {
    fn bus(&self) -> Arc<dyn ChannelBus> {
        self.bus.clone()
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.bus.close();
    }
}

/// Transport whose open results are scripted; unscripted opens succeed.
#[derive(Default)]
pub struct FakeTransport {
    script: Mutex<VecDeque<bool>>,
    always_fail: bool,
    opens: AtomicUsize,
    closes: Arc<AtomicUsize>,
    buses: Mutex<Vec<Arc<FakeBus>>>,
}

impl FakeTransport {
    pub fn failing_first(failures: usize) -> Self {
        Self {
            script: Mutex::new(std::iter::repeat(false).take(failures).collect()),
            ..Default::default()
        }
    }

    pub fn always_failing() -> Self {
        Self {
            always_fail: true,
            ..Default::default()
        }
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Bus of the most recently opened connection.
    pub fn last_bus(&self) -> Option<Arc<FakeBus>> {
        lock(&self.buses).last().cloned()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self, url: &str) -> Result<Box<dyn Connection>, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let succeed = !self.always_fail && lock(&self.script).pop_front().unwrap_or(true);
        if !succeed {
            return Err(TransportError::new(url, "connection refused"));
        }

        let bus = Arc::new(FakeBus::new());
        lock(&self.buses).push(bus.clone());
        Ok(Box::new(FakeConnection {
            bus,
            closes: self.closes.clone(),
        }))
    }
}

/// How `FakeWorkspaceApi::start_workspace` behaves.
#[derive(Debug, Clone)]
pub enum StartBehavior {
    /// Accept and report RUNNING.
    Run,
    /// Accept and report ERROR with the given cause.
    ReportError(Option<String>),
    /// Accept and report nothing.
    Hang,
    /// Refuse the call.
    Reject(RemoteError),
}

type StartHook = Arc<dyn Fn(&str) + Send + Sync>;

struct WorkspaceState {
    workspaces: IndexMap<String, WorkspaceDescriptor>,
    start: StartBehavior,
    start_hook: Option<StartHook>,
    create_error: Option<RemoteError>,
    details_error: Option<RemoteError>,
    missing_urls: Vec<String>,
    command_failure_at: Option<usize>,
    commands: Vec<(String, Command)>,
    created: Vec<(Option<String>, WorkspaceConfig, IndexMap<String, String>)>,
    calls: Vec<String>,
    watchers: Vec<(String, WorkspaceStatus, oneshot::Sender<StatusEvent>)>,
}

impl Default for WorkspaceState {
    fn default() -> Self {
        Self {
            workspaces: IndexMap::new(),
            start: StartBehavior::Run,
            start_hook: None,
            create_error: None,
            details_error: None,
            missing_urls: Vec::new(),
            command_failure_at: None,
            commands: Vec::new(),
            created: Vec::new(),
            calls: Vec::new(),
            watchers: Vec::new(),
        }
    }
}

/// Workspace API backed by an in-memory map.
#[derive(Default)]
pub struct FakeWorkspaceApi {
    state: Mutex<WorkspaceState>,
}

impl FakeWorkspaceApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_workspace(&self, workspace: WorkspaceDescriptor) {
        lock(&self.state)
            .workspaces
            .insert(workspace.id.clone(), workspace);
    }

    pub fn set_start_behavior(&self, behavior: StartBehavior) {
        lock(&self.state).start = behavior;
    }

    /// Runs `hook` with the workspace id whenever a start is accepted,
    /// before any status is reported.
    pub fn on_start(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        lock(&self.state).start_hook = Some(Arc::new(hook));
    }

    pub fn fail_create(&self, err: RemoteError) {
        lock(&self.state).create_error = Some(err);
    }

    pub fn fail_details(&self, err: RemoteError) {
        lock(&self.state).details_error = Some(err);
    }

    pub fn remove_websocket_url(&self, id: &str) {
        lock(&self.state).missing_urls.push(id.to_string());
    }

    /// Makes the `index`-th (zero-based) add-command call fail.
    pub fn fail_command_at(&self, index: usize) {
        lock(&self.state).command_failure_at = Some(index);
    }

    /// Commands submitted, in call order, including a failed one.
    pub fn commands(&self) -> Vec<(String, Command)> {
        lock(&self.state).commands.clone()
    }

    pub fn created(&self) -> Vec<(Option<String>, WorkspaceConfig, IndexMap<String, String>)> {
        lock(&self.state).created.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    pub fn pending_watchers(&self) -> usize {
        lock(&self.state)
            .watchers
            .iter()
            .filter(|(_, _, tx)| !tx.is_closed())
            .count()
    }

    /// Resolves every watch registered for `id` reaching `status`.
    pub fn emit_status(&self, id: &str, status: WorkspaceStatus, error: Option<&str>) {
        let matching: Vec<_> = {
            let mut state = lock(&self.state);
            if let Some(workspace) = state.workspaces.get_mut(id) {
                workspace.status = status;
            }
            let (matching, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut state.watchers)
                .into_iter()
                .partition(|(ws, st, _)| ws == id && *st == status);
            state.watchers = rest;
            matching
        };

        let event_type = StatusEventType::from(status.to_string());
        for (_, _, tx) in matching {
            let mut event = StatusEvent::new(event_type.clone(), id);
            event.error = error.map(str::to_string);
            let _ = tx.send(event);
        }
    }
}

#[async_trait]
impl WorkspaceApi for FakeWorkspaceApi {
    fn workspaces(&self) -> Vec<WorkspaceDescriptor> {
        lock(&self.state).workspaces.values().cloned().collect()
    }

    async fn fetch_workspaces(&self) -> ApiResult<Vec<WorkspaceDescriptor>> {
        let mut state = lock(&self.state);
        state.calls.push("fetch_workspaces".into());
        Ok(state.workspaces.values().cloned().collect())
    }

    async fn fetch_workspace_details(&self, id: &str) -> ApiResult<WorkspaceDescriptor> {
        let mut state = lock(&self.state);
        state.calls.push(format!("details:{id}"));
        if let Some(err) = &state.details_error {
            return Err(err.clone());
        }
        state
            .workspaces
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::new(format!("Workspace {id} not found")).with_status(404, "Not Found"))
    }

    async fn start_workspace(&self, id: &str, env: Option<&str>) -> ApiResult<()> {
        let (behavior, hook) = {
            let mut state = lock(&self.state);
            state
                .calls
                .push(format!("start:{id}:{}", env.unwrap_or("-")));
            (state.start.clone(), state.start_hook.clone())
        };

        if let StartBehavior::Reject(err) = &behavior {
            return Err(err.clone());
        }
        if let Some(hook) = hook {
            hook(id);
        }
        match behavior {
            StartBehavior::Run => self.emit_status(id, WorkspaceStatus::Running, None),
            StartBehavior::ReportError(cause) => {
                self.emit_status(id, WorkspaceStatus::Error, cause.as_deref())
            }
            StartBehavior::Hang | StartBehavior::Reject(_) => {}
        }
        Ok(())
    }

    async fn create_workspace_from_config(
        &self,
        owner: Option<&str>,
        config: &WorkspaceConfig,
        attributes: &IndexMap<String, String>,
    ) -> ApiResult<WorkspaceDescriptor> {
        let mut state = lock(&self.state);
        state.calls.push(format!("create:{}", config.name));
        if let Some(err) = &state.create_error {
            return Err(err.clone());
        }
        state
            .created
            .push((owner.map(str::to_string), config.clone(), attributes.clone()));

        let id = format!("W{}", state.created.len());
        let mut workspace = workspace_with_channels(&id, WorkspaceStatus::Stopped);
        workspace.config = config.clone();
        workspace.attributes = attributes.clone();
        state.workspaces.insert(id, workspace.clone());
        Ok(workspace)
    }

    async fn add_command(&self, workspace_id: &str, command: &Command) -> ApiResult<()> {
        let mut state = lock(&self.state);
        let index = state.commands.len();
        state
            .commands
            .push((workspace_id.to_string(), command.clone()));
        if state.command_failure_at == Some(index) {
            return Err(RemoteError::new(format!("Command '{}' rejected", command.name))
                .with_status(409, "Conflict"));
        }
        Ok(())
    }

    fn websocket_url(&self, id: &str) -> Option<String> {
        let state = lock(&self.state);
        if state.missing_urls.iter().any(|missing| missing == id) {
            return None;
        }
        Some(format!("ws://{}.workspaces.test:4401/ext", id.to_lowercase()))
    }

    fn fetch_status_change(
        &self,
        id: &str,
        status: WorkspaceStatus,
    ) -> oneshot::Receiver<StatusEvent> {
        let (tx, rx) = oneshot::channel();
        lock(&self.state)
            .watchers
            .push((id.to_string(), status, tx));
        rx
    }
}

#[derive(Default)]
struct ProjectState {
    batches: Vec<Vec<ProjectConfig>>,
    resolve_calls: Vec<ImportProject>,
    create_error: Option<RemoteError>,
    resolve_failures: usize,
    resolve_error: RemoteError,
    create_hook: Option<StartHook>,
}

/// Project API recording every batch and type resolution.
#[derive(Default)]
pub struct FakeProjectApi {
    state: Mutex<ProjectState>,
}

impl FakeProjectApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create(&self, err: RemoteError) {
        lock(&self.state).create_error = Some(err);
    }

    /// Runs `hook` with the workspace id while a batch is being created.
    pub fn on_create(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        lock(&self.state).create_hook = Some(Arc::new(hook));
    }

    /// Fails the next `times` type resolutions with `err`.
    pub fn fail_resolve(&self, times: usize, err: RemoteError) {
        let mut state = lock(&self.state);
        state.resolve_failures = times;
        state.resolve_error = err;
    }

    pub fn batches(&self) -> Vec<Vec<ProjectConfig>> {
        lock(&self.state).batches.clone()
    }

    pub fn resolve_calls(&self) -> Vec<ImportProject> {
        lock(&self.state).resolve_calls.clone()
    }
}

#[async_trait]
impl ProjectApi for FakeProjectApi {
    async fn create_projects(&self, workspace_id: &str, batch: &[ProjectConfig]) -> ApiResult<()> {
        let hook = {
            let mut state = lock(&self.state);
            if let Some(err) = &state.create_error {
                return Err(err.clone());
            }
            state.batches.push(batch.to_vec());
            state.create_hook.clone()
        };
        if let Some(hook) = hook {
            hook(workspace_id);
        }
        Ok(())
    }

    async fn resolve_import_project_type(
        &self,
        _workspace_id: &str,
        data: &ImportProject,
    ) -> ApiResult<()> {
        let mut state = lock(&self.state);
        state.resolve_calls.push(data.clone());
        if state.resolve_failures > 0 {
            state.resolve_failures -= 1;
            return Err(state.resolve_error.clone());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Error(String),
    Alert { title: String, content: String },
    Credentials { location: String, workspace_id: String },
    ResourceExhausted,
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        lock(&self.notices).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn show_error(&self, message: &str) {
        lock(&self.notices).push(Notice::Error(message.to_string()));
    }

    fn show_alert(&self, title: &str, content: &str) {
        lock(&self.notices).push(Notice::Alert {
            title: title.to_string(),
            content: content.to_string(),
        });
    }

    fn prompt_credentials(&self, location: &str, workspace_id: &str) {
        lock(&self.notices).push(Notice::Credentials {
            location: location.to_string(),
            workspace_id: workspace_id.to_string(),
        });
    }

    fn resource_exhausted(&self) {
        lock(&self.notices).push(Notice::ResourceExhausted);
    }
}

/// Workspace advertising status and output topics and a projects root.
pub fn workspace_with_channels(id: &str, status: WorkspaceStatus) -> WorkspaceDescriptor {
    let config = WorkspaceConfig {
        name: format!("wksp-{}", id.to_lowercase()),
        default_env: Some("default".to_string()),
        ..Default::default()
    };
    let mut workspace = WorkspaceDescriptor::new(id, config, status);
    workspace.links = vec![
        Link::channel(STATUS_CHANNEL_REL, format!("workspace:{id}:status")),
        Link::channel(OUTPUT_CHANNEL_REL, format!("workspace:{id}:output")),
    ];
    workspace.runtime = Some(WorkspaceRuntime {
        env_variables: [("PROJECTS_ROOT".to_string(), "/projects".to_string())]
            .into_iter()
            .collect(),
    });
    workspace
}

/// Every fake wired together.
#[derive(Default)]
pub struct Harness {
    pub workspaces: Arc<FakeWorkspaceApi>,
    pub projects: Arc<FakeProjectApi>,
    pub master_bus: Arc<FakeBus>,
    pub transport: Arc<FakeTransport>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transport(transport: FakeTransport) -> Self {
        Self {
            transport: Arc::new(transport),
            ..Default::default()
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            workspace_api: self.workspaces.clone(),
            project_api: self.projects.clone(),
            master_bus: self.master_bus.clone(),
            transport: self.transport.clone(),
            notifier: self.notifier.clone(),
        }
    }

    pub fn provisioner(&self, config: ProvisionConfig) -> Provisioner {
        let progress = ProgressHandle::new(config.errors.resource_exhausted_marker.clone());
        Provisioner::new(self.collaborators(), config, progress)
    }
}
