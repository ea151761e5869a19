use indexmap::IndexMap;
use rand::Rng;
use serde::{Deserialize, Serialize};

const NAME_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const NAME_SUFFIX_LEN: usize = 4;

/// Command registered in a workspace for a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub name: String,
    pub command_line: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub attributes: IndexMap<String, String>,
}

impl Command {
    pub fn new(name: impl Into<String>, command_line: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command_line: command_line.into(),
            kind: "custom".to_string(),
            attributes: IndexMap::new(),
        }
    }
}

/// Where project sources come from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStorage {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub parameters: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub attributes: IndexMap<String, Vec<String>>,
    #[serde(default)]
    pub commands: Vec<Command>,
    #[serde(default)]
    pub mixins: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceStorage>,
}

impl ProjectConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Import description: source, parent project and optional sub-projects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportProject {
    #[serde(default)]
    pub source: SourceStorage,
    pub project: ProjectConfig,
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
}

/// Builds the creation batch: sub-projects first with their paths moved
/// under the parent, then the parent at `/<name>` carrying the source.
pub fn flatten_projects(import: &ImportProject) -> Vec<ProjectConfig> {
    let parent_path = format!("/{}", import.project.name);

    let mut batch: Vec<ProjectConfig> = import
        .projects
        .iter()
        .map(|sub| {
            let mut sub = sub.clone();
            let current = sub.path.take().unwrap_or_default();
            sub.path = Some(rewrite_subproject_path(&parent_path, &current, &sub.name));
            sub
        })
        .collect();

    let mut parent = import.project.clone();
    parent.path = Some(parent_path);
    parent.source = Some(import.source.clone());
    batch.push(parent);
    batch
}

/// Replaces everything before the first `/<sub_name>` in `sub_path` with
/// `parent`, or appends `/<sub_name>` to `parent` when it does not occur.
pub fn rewrite_subproject_path(parent: &str, sub_path: &str, sub_name: &str) -> String {
    let marker = format!("/{sub_name}");
    match sub_path.find(&marker) {
        Some(pos) => format!("{parent}{}", &sub_path[pos..]),
        None => format!("{parent}{marker}"),
    }
}

/// Binds a template command to a concrete project.
#[derive(Debug, Clone, Copy)]
pub struct CommandTemplate<'a> {
    pub project_name: &'a str,
    pub projects_root: Option<&'a str>,
    pub token: &'a str,
}

impl CommandTemplate<'_> {
    /// Prefixes the name with the project and, when the projects root is
    /// known, expands the path token to `<root>/<project>`.
    pub fn resolve(&self, command: &Command) -> Command {
        let mut resolved = command.clone();
        resolved.name = format!("{}: {}", self.project_name, command.name);
        if let Some(root) = self.projects_root {
            let project_path = format!("{root}/{}", self.project_name);
            resolved.command_line = command.command_line.replace(self.token, &project_path);
        }
        resolved
    }
}

fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..NAME_SUFFIX_LEN)
        .map(|_| NAME_ALPHABET[rng.random_range(0..NAME_ALPHABET.len())] as char)
        .collect()
}

/// Default workspace name, `wksp-` plus four base-36 characters.
pub fn generate_workspace_name() -> String {
    format!("wksp-{}", random_suffix())
}

/// Default project name derived from the template type.
pub fn generate_project_name(kind: Option<&str>) -> String {
    let prefix = kind.filter(|k| !k.is_empty()).unwrap_or("project");
    format!("{prefix}-{}", random_suffix())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "${current.project.path}";

    #[test]
    fn test_rewrite_replaces_old_prefix() {
        assert_eq!(
            rewrite_subproject_path("/myapp", "/oldroot/lib", "lib"),
            "/myapp/lib"
        );
    }

    #[test]
    fn test_rewrite_keeps_nested_suffix() {
        assert_eq!(
            rewrite_subproject_path("/myapp", "/old/lib/core", "lib"),
            "/myapp/lib/core"
        );
    }

    #[test]
    fn test_rewrite_without_marker_appends_name() {
        assert_eq!(
            rewrite_subproject_path("/myapp", "/somewhere/else", "lib"),
            "/myapp/lib"
        );
        assert_eq!(rewrite_subproject_path("/myapp", "", "lib"), "/myapp/lib");
    }

    #[test]
    fn test_flatten_puts_parent_last_with_source() {
        let import = ImportProject {
            source: SourceStorage {
                kind: Some("git".into()),
                location: "https://example.com/repo.git".into(),
                ..Default::default()
            },
            project: ProjectConfig::named("myapp"),
            projects: vec![
                ProjectConfig {
                    path: Some("/oldroot/lib".into()),
                    ..ProjectConfig::named("lib")
                },
                ProjectConfig {
                    path: Some("/oldroot/web".into()),
                    ..ProjectConfig::named("web")
                },
            ],
        };

        let batch = flatten_projects(&import);

        let paths: Vec<_> = batch.iter().map(|p| p.path.as_deref()).collect();
        assert_eq!(
            paths,
            vec![Some("/myapp/lib"), Some("/myapp/web"), Some("/myapp")]
        );
        assert!(batch[0].source.is_none());
        assert_eq!(
            batch[2].source.as_ref().map(|s| s.location.as_str()),
            Some("https://example.com/repo.git")
        );
    }

    #[test]
    fn test_resolve_command_with_root() {
        let template = CommandTemplate {
            project_name: "myapp",
            projects_root: Some("/projects"),
            token: TOKEN,
        };
        let command = Command::new("build", "cd ${current.project.path} && make");

        let resolved = template.resolve(&command);

        assert_eq!(resolved.name, "myapp: build");
        assert_eq!(resolved.command_line, "cd /projects/myapp && make");
    }

    #[test]
    fn test_resolve_command_without_root_keeps_line() {
        let template = CommandTemplate {
            project_name: "myapp",
            projects_root: None,
            token: TOKEN,
        };
        let command = Command::new("run", "cd ${current.project.path} && ./run");

        let resolved = template.resolve(&command);

        assert_eq!(resolved.name, "myapp: run");
        assert_eq!(resolved.command_line, command.command_line);
    }

    #[test]
    fn test_generated_names() {
        let workspace = generate_workspace_name();
        assert!(workspace.starts_with("wksp-"));
        assert_eq!(workspace.len(), 9);
        assert!(workspace[5..]
            .bytes()
            .all(|b| NAME_ALPHABET.contains(&b)));

        assert!(generate_project_name(Some("maven")).starts_with("maven-"));
        assert!(generate_project_name(None).starts_with("project-"));
    }
}
