//! Project import, command and type resolution messages

pub struct ProjectMessages {
    pub error_title: &'static str,
    pub error: &'static str,
    pub error_no_status: &'static str,
    pub credential_required: &'static str,
    pub commands_added: &'static str,
    pub deferred_to_wizard: &'static str,
    pub type_fallback: &'static str,
}

pub const PROJECT_MESSAGES: ProjectMessages = ProjectMessages {
    error_title: "Error while creating the project",
    error: "{status}: {message}",
    error_no_status: "{message}",
    credential_required: "Access to '{location}' requires credentials that are not configured for workspace {workspace}.",
    commands_added: "Registered {count} command(s) for {project}",
    deferred_to_wizard: "Project {project} will be created by the project wizard",
    type_fallback: "Project type could not be resolved, using '{fallback}'",
};
