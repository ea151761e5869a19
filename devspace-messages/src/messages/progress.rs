//! Creation step labels

pub struct ProgressMessages {
    pub step_select_resource: &'static str,
    pub step_start_workspace: &'static str,
    pub step_agent_ready: &'static str,
    pub step_import_project: &'static str,
    pub step_finished: &'static str,
}

pub const PROGRESS_MESSAGES: ProgressMessages = ProgressMessages {
    step_select_resource: "Initialize workspace",
    step_start_workspace: "Start workspace",
    step_agent_ready: "Inject and start workspace agent",
    step_import_project: "Create project",
    step_finished: "Project ready",
};
