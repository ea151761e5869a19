//! `devspace` binary output

pub struct CliMessages {
    pub error_generic: &'static str,
    pub plan_header: &'static str,
    pub plan_path: &'static str,
    pub plan_topic: &'static str,
    pub plan_project: &'static str,
    pub plan_command: &'static str,
    pub plan_wizard: &'static str,
    pub plan_no_commands: &'static str,
    pub validate_ok: &'static str,
}

pub const CLI_MESSAGES: CliMessages = CliMessages {
    error_generic: "❌ Error: {error}",
    plan_header: "📋 Provisioning plan for project '{project}'",
    plan_path: "  Workspace:  {path}",
    plan_topic: "  Topic:      {topic}",
    plan_project: "  Project:    {path} ({kind})",
    plan_command: "  Command:    {name} -> {line}",
    plan_wizard: "  Project will be scaffolded by the project wizard",
    plan_no_commands: "  Commands:   none",
    validate_ok: "✅ Request '{file}' is valid",
};
