//! Workspace creation and start messages

pub struct WorkspaceMessages {
    // ============================================================================
    // Alert titles
    // ============================================================================
    pub agent_error_title: &'static str,
    pub destroyed_title: &'static str,
    pub start_error_title: &'static str,

    // ============================================================================
    // Alert and log content (alphabetically sorted)
    // ============================================================================
    pub agent_error: &'static str,
    pub create_failed: &'static str,
    pub destroyed: &'static str,
    pub resource_limit: &'static str,
    pub start_error: &'static str,
    pub start_error_no_detail: &'static str,
    pub start_failed: &'static str,
    pub status_dropped: &'static str,
}

pub const WORKSPACE_MESSAGES: WorkspaceMessages = WorkspaceMessages {
    // Alert titles
    agent_error_title: "Error when starting agent",
    destroyed_title: "Unable to start workspace",
    start_error_title: "Error when starting workspace",

    // Alert and log content
    agent_error: "Unable to start workspace agent. Error when trying to start the workspace agent: {error}",
    create_failed: "Unable to create workspace.",
    destroyed: "Unable to start workspace. It may be linked to OutOfMemory or the container has been destroyed",
    resource_limit: "Unable to start this workspace. There are {count} running workspaces consuming {used}{unit} RAM. Your current RAM limit is {limit}{unit}. This workspace requires an additional {required}{unit}.  You can stop other workspaces to free resources.",
    start_error: "Unable to start workspace. Error when trying to start the workspace: {error}",
    start_error_no_detail: "Unable to start workspace. Error when trying to start the workspace.",
    start_failed: "Unable to start this workspace.",
    status_dropped: "Workspace status notifications for '{id}' stopped before the workspace was running.",
};
