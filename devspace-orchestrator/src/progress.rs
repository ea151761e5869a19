use devspace_messages::MESSAGES;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Ordered phases of one provisioning attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CreationPhase {
    SelectResource,
    StartWorkspace,
    AgentReady,
    ImportProject,
    Finished,
}

impl CreationPhase {
    pub const ALL: [CreationPhase; 5] = [
        CreationPhase::SelectResource,
        CreationPhase::StartWorkspace,
        CreationPhase::AgentReady,
        CreationPhase::ImportProject,
        CreationPhase::Finished,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::SelectResource => MESSAGES.progress.step_select_resource,
            Self::StartWorkspace => MESSAGES.progress.step_start_workspace,
            Self::AgentReady => MESSAGES.progress.step_agent_ready,
            Self::ImportProject => MESSAGES.progress.step_import_project,
            Self::Finished => MESSAGES.progress.step_finished,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreationStep {
    pub index: usize,
    pub logs: String,
    pub has_error: bool,
}

impl CreationStep {
    fn new(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    fn append(&mut self, text: &str) {
        if !self.logs.is_empty() {
            self.logs.push('\n');
        }
        self.logs.push_str(text);
    }
}

/// What `reset` found before clearing the steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetOutcome {
    /// The failed step's log carried the resource-exhausted marker.
    pub resource_exhausted: bool,
}

/// Step state of the current attempt.
///
/// `current_step` only ever moves forward within an attempt. Once a step is
/// marked failed, automated advancement stops until the next `reset`.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    steps: Vec<CreationStep>,
    current_step: usize,
    in_progress: bool,
    source_ready: bool,
    exhausted_marker: String,
}

impl ProgressTracker {
    pub fn new(exhausted_marker: impl Into<String>) -> Self {
        Self {
            steps: fresh_steps(),
            current_step: 0,
            in_progress: false,
            source_ready: false,
            exhausted_marker: exhausted_marker.into(),
        }
    }

    pub fn current_phase(&self) -> CreationPhase {
        CreationPhase::from_index(self.current_step).unwrap_or(CreationPhase::Finished)
    }

    /// Moves forward to `phase`; lower or equal phases are ignored.
    pub fn advance_to(&mut self, phase: CreationPhase) -> bool {
        if self.has_error() || phase.index() <= self.current_step {
            return false;
        }
        debug!(from = self.current_step, to = phase.index(), "creation step advanced");
        self.current_step = phase.index();
        true
    }

    pub fn append_log(&mut self, phase: CreationPhase, text: &str) {
        self.steps[phase.index()].append(text);
    }

    pub fn append_current(&mut self, text: &str) {
        let current = self.current_step;
        self.steps[current].append(text);
    }

    pub fn mark_error(&mut self, phase: CreationPhase) {
        self.steps[phase.index()].has_error = true;
    }

    pub fn mark_current_error(&mut self) {
        let current = self.current_step;
        self.steps[current].has_error = true;
    }

    pub fn has_error(&self) -> bool {
        self.steps.iter().any(|step| step.has_error)
    }

    pub fn step(&self, phase: CreationPhase) -> &CreationStep {
        &self.steps[phase.index()]
    }

    pub fn begin(&mut self) {
        self.in_progress = true;
    }

    pub fn finish(&mut self) {
        self.in_progress = false;
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn reset(&mut self) -> ResetOutcome {
        let current = &self.steps[self.current_step];
        let resource_exhausted =
            current.has_error && current.logs.contains(self.exhausted_marker.as_str());

        self.steps = fresh_steps();
        self.current_step = 0;
        self.in_progress = false;

        ResetOutcome { resource_exhausted }
    }

    pub fn set_source_ready(&mut self, ready: bool) {
        self.source_ready = ready;
    }

    pub fn is_ready_to_create(&self) -> bool {
        !self.in_progress && self.source_ready
    }

    /// All step logs, in step order, for export.
    pub fn transcript(&self) -> String {
        self.steps
            .iter()
            .filter(|step| !step.logs.is_empty())
            .map(|step| step.logs.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            steps: self
                .steps
                .iter()
                .zip(CreationPhase::ALL)
                .map(|(step, phase)| StepView {
                    index: step.index,
                    label: phase.label(),
                    logs: step.logs.clone(),
                    has_error: step.has_error,
                })
                .collect(),
            current_step: self.current_step,
            in_progress: self.in_progress,
            ready_to_create: self.is_ready_to_create(),
        }
    }
}

fn fresh_steps() -> Vec<CreationStep> {
    CreationPhase::ALL
        .iter()
        .map(|phase| CreationStep::new(phase.index()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepView {
    pub index: usize,
    pub label: &'static str,
    pub logs: String,
    pub has_error: bool,
}

/// Point-in-time view of the tracker for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub steps: Vec<StepView>,
    pub current_step: usize,
    pub in_progress: bool,
    pub ready_to_create: bool,
}

/// Shared handle to the tracker; every step transition goes through it.
#[derive(Debug, Clone)]
pub struct ProgressHandle(Arc<Mutex<ProgressTracker>>);

impl ProgressHandle {
    pub fn new(exhausted_marker: impl Into<String>) -> Self {
        Self(Arc::new(Mutex::new(ProgressTracker::new(exhausted_marker))))
    }

    fn lock(&self) -> MutexGuard<'_, ProgressTracker> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current_phase(&self) -> CreationPhase {
        self.lock().current_phase()
    }

    pub fn advance_to(&self, phase: CreationPhase) -> bool {
        self.lock().advance_to(phase)
    }

    pub fn append_log(&self, phase: CreationPhase, text: &str) {
        self.lock().append_log(phase, text);
    }

    pub fn append_current(&self, text: &str) {
        self.lock().append_current(text);
    }

    pub fn mark_error(&self, phase: CreationPhase) {
        self.lock().mark_error(phase);
    }

    pub fn mark_current_error(&self) {
        self.lock().mark_current_error();
    }

    /// Appends `text` to the current step and flags it, under one lock.
    pub fn fail_current(&self, text: Option<&str>) {
        let mut tracker = self.lock();
        if let Some(text) = text {
            tracker.append_current(text);
        }
        tracker.mark_current_error();
    }

    pub fn has_error(&self) -> bool {
        self.lock().has_error()
    }

    pub fn begin(&self) {
        self.lock().begin();
    }

    pub fn finish(&self) {
        self.lock().finish();
    }

    pub fn reset(&self) -> ResetOutcome {
        self.lock().reset()
    }

    pub fn set_source_ready(&self, ready: bool) {
        self.lock().set_source_ready(ready);
    }

    pub fn is_ready_to_create(&self) -> bool {
        self.lock().is_ready_to_create()
    }

    pub fn transcript(&self) -> String {
        self.lock().transcript()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.lock().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str = "You can stop other workspaces";

    #[test]
    fn test_advance_is_monotonic() {
        let mut tracker = ProgressTracker::new(MARKER);
        assert!(tracker.advance_to(CreationPhase::ImportProject));
        assert!(!tracker.advance_to(CreationPhase::StartWorkspace));
        assert!(!tracker.advance_to(CreationPhase::ImportProject));
        assert_eq!(tracker.current_phase(), CreationPhase::ImportProject);
    }

    #[test]
    fn test_logs_are_newline_joined() {
        let mut tracker = ProgressTracker::new(MARKER);
        tracker.append_current("first");
        tracker.append_current("second");
        assert_eq!(tracker.step(CreationPhase::SelectResource).logs, "first\nsecond");
    }

    #[test]
    fn test_error_stops_automated_advancement() {
        let mut tracker = ProgressTracker::new(MARKER);
        tracker.advance_to(CreationPhase::StartWorkspace);
        tracker.mark_current_error();
        assert!(!tracker.advance_to(CreationPhase::AgentReady));
        tracker.append_current("late line");
        assert_eq!(tracker.step(CreationPhase::StartWorkspace).logs, "late line");
    }

    #[test]
    fn test_reset_detects_resource_exhaustion() {
        let mut tracker = ProgressTracker::new(MARKER);
        tracker.advance_to(CreationPhase::StartWorkspace);
        tracker.append_current("Unable to start. You can stop other workspaces to free resources.");
        tracker.mark_current_error();
        tracker.begin();

        let outcome = tracker.reset();
        assert!(outcome.resource_exhausted);
        assert_eq!(tracker.current_phase(), CreationPhase::SelectResource);
        assert!(!tracker.has_error());
        assert!(!tracker.is_in_progress());
        assert!(tracker.transcript().is_empty());
    }

    #[test]
    fn test_reset_ignores_marker_without_error() {
        let mut tracker = ProgressTracker::new(MARKER);
        tracker.append_current(MARKER);
        assert!(!tracker.reset().resource_exhausted);
    }

    #[test]
    fn test_ready_to_create_requires_source_and_idle() {
        let handle = ProgressHandle::new(MARKER);
        assert!(!handle.is_ready_to_create());
        handle.set_source_ready(true);
        assert!(handle.is_ready_to_create());
        handle.begin();
        assert!(!handle.is_ready_to_create());
    }

    #[test]
    fn test_snapshot_and_transcript() {
        let handle = ProgressHandle::new(MARKER);
        handle.append_current("initializing");
        handle.advance_to(CreationPhase::AgentReady);
        handle.fail_current(Some("agent crashed"));

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.current_step, 2);
        assert_eq!(snapshot.steps[2].label, "Inject and start workspace agent");
        assert!(snapshot.steps[2].has_error);
        assert_eq!(handle.transcript(), "initializing\nagent crashed");
    }
}
