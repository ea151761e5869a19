use devspace_config::ProvisionConfig;
use devspace_orchestrator::test_utils::{
    workspace_with_channels, FakeTransport, Harness, Notice, StartBehavior,
};
use devspace_orchestrator::{
    Command, ConnectError, CreationPhase, ProvisionError, ProvisionRequest, RemoteError,
    SourceOption, TemplateChoice, TypeResolution, WorkspaceResource, WorkspaceStatus,
};

const STACK_REQUEST: &str = include_str!("fixtures/stack-request.yaml");

fn stack_request() -> ProvisionRequest {
    serde_yaml_ng::from_str(STACK_REQUEST).expect("Fixture should parse")
}

fn existing_request(status: WorkspaceStatus) -> ProvisionRequest {
    let mut request = stack_request();
    request.resource = WorkspaceResource::Existing {
        workspace: workspace_with_channels("W7", status),
    };
    request
}

fn config_with_budget(reconnect_budget: u32) -> ProvisionConfig {
    let mut config = ProvisionConfig::default();
    config.connection.reconnect_budget = reconnect_budget;
    config
}

#[tokio::test(start_paused = true)]
async fn test_create_from_stack_end_to_end() {
    let harness = Harness::new();
    let provisioner = harness.provisioner(ProvisionConfig::default());

    let outcome = provisioner
        .provision(&stack_request())
        .await
        .expect("Provisioning should succeed");

    assert_eq!(outcome.workspace.id, "W1");
    assert_eq!(outcome.import.projects_created, 2);
    assert_eq!(outcome.import.commands_added, 2);
    assert_eq!(outcome.import.resolution, TypeResolution::Declared);

    let created = harness.workspaces.created();
    let (_, config, attributes) = &created[0];
    assert_eq!(config.name, "wksp-test");
    assert_eq!(attributes.get("stackId").map(String::as_str), Some("java-default"));
    let env = config.default_environment().expect("Default environment");
    assert!(env.machines["db"].is_dev("ws-agent"));
    assert!(!env.machines["app"].is_dev("ws-agent"));
    assert_eq!(env.machines["app"].memory_limit(), Some(2 * 1024 * 1024 * 1024));

    assert_eq!(
        harness.workspaces.calls(),
        vec![
            "create:wksp-test",
            "details:W1",
            "start:W1:default",
            "fetch_workspaces",
            "details:W1",
            "fetch_workspaces",
        ]
    );

    let batch = &harness.projects.batches()[0];
    let paths: Vec<_> = batch.iter().map(|p| p.path.as_deref()).collect();
    assert_eq!(paths, vec![Some("/myapp/lib"), Some("/myapp")]);

    let commands: Vec<_> = harness.workspaces.commands().into_iter().map(|(_, c)| c).collect();
    assert_eq!(commands[0].name, "myapp: build");
    assert_eq!(commands[0].command_line, "mvn -f /projects/myapp clean install");
    assert_eq!(commands[1].command_line, "java -jar /projects/myapp/target/app.jar");

    let resolved = &harness.projects.resolve_calls()[0];
    assert_eq!(resolved.project.name, "myapp");
    assert_eq!(resolved.project.kind.as_deref(), Some("maven"));

    assert_eq!(provisioner.progress().current_phase(), CreationPhase::Finished);
    assert!(!provisioner.progress().has_error());
    assert!(harness.notifier.notices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_resources_released_once_after_success() {
    let harness = Harness::new();
    let provisioner = harness.provisioner(ProvisionConfig::default());

    let outcome = provisioner
        .provision(&stack_request())
        .await
        .expect("Provisioning should succeed");

    assert!(outcome.cleanup.transport_closed);
    assert_eq!(
        harness.master_bus.unsubscribed(),
        vec![
            "workspace:W1:ext-server:output",
            "workspace:W1:status",
            "workspace:W1:output",
        ]
    );
    assert!(harness.master_bus.subscribed().is_empty());
    assert_eq!(harness.transport.close_count(), 1);

    let agent_bus = harness.transport.last_bus().expect("Agent bus");
    assert_eq!(agent_bus.unsubscribed(), vec!["importProject:output"]);

    // A close arriving after cleanup is not a failure.
    harness.master_bus.close();
    agent_bus.close();
    assert!(harness.notifier.notices().is_empty());
    assert_eq!(harness.workspaces.pending_watchers(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reuse_running_workspace_skips_start() {
    let harness = Harness::new();
    harness
        .workspaces
        .add_workspace(workspace_with_channels("W7", WorkspaceStatus::Running));
    let provisioner = harness.provisioner(ProvisionConfig::default());

    let outcome = provisioner
        .provision(&existing_request(WorkspaceStatus::Running))
        .await
        .expect("Provisioning should succeed");

    assert_eq!(outcome.workspace.id, "W7");
    assert!(harness
        .workspaces
        .calls()
        .iter()
        .all(|call| !call.starts_with("start:")));
    assert!(harness.master_bus.unsubscribed().is_empty());
    assert_eq!(harness.transport.open_count(), 1);
    assert_eq!(harness.transport.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reuse_running_tolerates_details_failure() {
    let harness = Harness::new();
    harness.workspaces.fail_details(RemoteError::new("gateway timeout"));
    let provisioner = harness.provisioner(ProvisionConfig::default());

    let outcome = provisioner
        .provision(&existing_request(WorkspaceStatus::Running))
        .await
        .expect("Selected workspace is used as-is");

    assert_eq!(outcome.workspace.id, "W7");
}

#[tokio::test(start_paused = true)]
async fn test_stopped_workspace_is_started() {
    let harness = Harness::new();
    harness
        .workspaces
        .add_workspace(workspace_with_channels("W7", WorkspaceStatus::Stopped));
    let provisioner = harness.provisioner(ProvisionConfig::default());

    provisioner
        .provision(&existing_request(WorkspaceStatus::Stopped))
        .await
        .expect("Provisioning should succeed");

    assert_eq!(harness.workspaces.calls()[0], "start:W7:default");
    assert!(harness.workspaces.created().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connect_retries_are_bounded() {
    let harness = Harness::with_transport(FakeTransport::always_failing());
    let provisioner = harness.provisioner(config_with_budget(3));

    let err = provisioner
        .provision(&stack_request())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ProvisionError::Connect(ConnectError::RetriesExhausted { attempts: 3, .. })
    ));
    assert_eq!(harness.transport.open_count(), 3);

    let notices = harness.notifier.notices();
    assert_eq!(notices.len(), 1);
    match &notices[0] {
        Notice::Alert { title, content } => {
            assert_eq!(title, "Workspace Connection Error");
            assert!(content.contains("ws://w1.workspaces.test:4401/ext"));
            assert!(content.contains("after 3 attempts"));
        }
        other => panic!("Expected alert, got {other:?}"),
    }
    assert!(provisioner.progress().has_error());
    assert_eq!(harness.master_bus.unsubscribed().len(), 3);
    assert!(harness.projects.batches().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_transient_connect_failures_recover() {
    let harness = Harness::with_transport(FakeTransport::failing_first(2));
    let provisioner = harness.provisioner(config_with_budget(3));

    provisioner
        .provision(&stack_request())
        .await
        .expect("Third open should succeed");

    assert_eq!(harness.transport.open_count(), 3);
    assert!(harness.notifier.notices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_status_error_notifies_once_with_cause() {
    let harness = Harness::new();
    harness.workspaces.set_start_behavior(StartBehavior::Hang);
    let bus = harness.master_bus.clone();
    harness.workspaces.on_start(move |id| {
        let topic = format!("workspace:{id}:status");
        let payload = format!(r#"{{"eventType":"ERROR","workspaceId":"{id}","error":"OOM"}}"#);
        bus.publish(&topic, &payload);
        bus.publish(&topic, &payload);
    });
    let provisioner = harness.provisioner(ProvisionConfig::default());

    let err = provisioner
        .provision(&stack_request())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::Aborted));
    let notices = harness.notifier.notices();
    assert_eq!(notices.len(), 1);
    match &notices[0] {
        Notice::Alert { title, content } => {
            assert_eq!(title, "Error when starting workspace");
            assert!(content.contains("OOM"));
        }
        other => panic!("Expected alert, got {other:?}"),
    }

    let snapshot = provisioner.progress().snapshot();
    assert!(snapshot.steps[CreationPhase::StartWorkspace.index()].has_error);
    assert_eq!(harness.transport.open_count(), 0);
    assert_eq!(harness.master_bus.unsubscribed().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_status_for_other_workspace_is_ignored() {
    let harness = Harness::new();
    let bus = harness.master_bus.clone();
    harness.workspaces.on_start(move |id| {
        bus.publish(
            &format!("workspace:{id}:status"),
            r#"{"eventType":"DESTROYED","workspaceId":"someone-else"}"#,
        );
        bus.publish(&format!("workspace:{id}:status"), "not json");
    });
    let provisioner = harness.provisioner(ProvisionConfig::default());

    provisioner
        .provision(&stack_request())
        .await
        .expect("Unrelated status messages do not fail the attempt");
}

#[tokio::test(start_paused = true)]
async fn test_agent_error_watch_fails_at_agent_step() {
    let harness = Harness::new();
    harness
        .workspaces
        .set_start_behavior(StartBehavior::ReportError(Some("agent crashed".into())));
    let provisioner = harness.provisioner(ProvisionConfig::default());

    let err = provisioner
        .provision(&stack_request())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::AgentStart { .. }));
    let snapshot = provisioner.progress().snapshot();
    assert_eq!(snapshot.current_step, CreationPhase::AgentReady.index());
    assert!(snapshot.steps[CreationPhase::AgentReady.index()].has_error);
    assert!(snapshot.steps[2].logs.contains("agent crashed"));
    assert!(matches!(
        harness.notifier.notices().as_slice(),
        [Notice::Alert { title, .. }] if title == "Error when starting agent"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_agent_output_advances_and_logs() {
    let harness = Harness::new();
    let bus = harness.master_bus.clone();
    harness.workspaces.on_start(move |id| {
        bus.publish(
            &format!("workspace:{id}:output"),
            r#"{"machineName":"db","content":"pulling image"}"#,
        );
        bus.publish(&format!("workspace:{id}:ext-server:output"), r#""agent started""#);
    });
    let provisioner = harness.provisioner(ProvisionConfig::default());

    provisioner
        .provision(&stack_request())
        .await
        .expect("Provisioning should succeed");

    let snapshot = provisioner.progress().snapshot();
    assert_eq!(snapshot.steps[1].logs, "[db] pulling image");
    assert_eq!(snapshot.steps[2].logs, "agent started");
    assert_eq!(snapshot.current_step, CreationPhase::Finished.index());
    assert_eq!(
        provisioner.progress().transcript(),
        "[db] pulling image\nagent started"
    );
}

#[tokio::test(start_paused = true)]
async fn test_master_bus_close_fails_attempt() {
    let harness = Harness::new();
    harness.workspaces.set_start_behavior(StartBehavior::Hang);
    let bus = harness.master_bus.clone();
    harness.workspaces.on_start(move |_| bus.close());
    let provisioner = harness.provisioner(ProvisionConfig::default());

    let err = provisioner
        .provision(&stack_request())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::Aborted));
    assert_eq!(
        harness.notifier.notices(),
        vec![Notice::Alert {
            title: "Connection error".into(),
            content: "Unable to track the workspace status due to connection closed error. Please, try again.".into(),
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_resource_limit_start_failure_signals_on_reset() {
    let harness = Harness::new();
    harness.workspaces.set_start_behavior(StartBehavior::Reject(
        RemoteError::new("Workspace limit reached")
            .with_code(10000)
            .with_attribute("workspaces_count", 3)
            .with_attribute("used_ram", 6)
            .with_attribute("limit_ram", 8)
            .with_attribute("required_ram", 4)
            .with_attribute("ram_unit", "GB"),
    ));
    let provisioner = harness.provisioner(ProvisionConfig::default());

    provisioner
        .provision(&stack_request())
        .await
        .unwrap_err();

    match &harness.notifier.notices()[..] {
        [Notice::Error(message)] => {
            assert!(message.contains("There are 3 running workspaces consuming 6GB RAM."));
            assert!(message.contains("You can stop other workspaces"));
        }
        other => panic!("Expected one error, got {other:?}"),
    }

    let outcome = provisioner.reset();
    assert!(outcome.resource_exhausted);
    assert_eq!(harness.notifier.notices().last(), Some(&Notice::ResourceExhausted));
    assert!(!provisioner.progress().has_error());
}

#[tokio::test(start_paused = true)]
async fn test_start_rejection_without_detail_uses_generic_text() {
    let harness = Harness::new();
    harness
        .workspaces
        .set_start_behavior(StartBehavior::Reject(RemoteError::default()));
    let provisioner = harness.provisioner(ProvisionConfig::default());

    provisioner.provision(&stack_request()).await.unwrap_err();

    assert_eq!(
        harness.notifier.notices(),
        vec![Notice::Error("Unable to start this workspace.".into())]
    );
    assert!(!provisioner.reset().resource_exhausted);
}

#[tokio::test(start_paused = true)]
async fn test_create_failure_is_reported() {
    let harness = Harness::new();
    harness
        .workspaces
        .fail_create(RemoteError::new("Workspace name already taken").with_status(409, "Conflict"));
    let provisioner = harness.provisioner(ProvisionConfig::default());

    let err = provisioner.provision(&stack_request()).await.unwrap_err();

    assert!(matches!(err, ProvisionError::Remote { .. }));
    assert_eq!(
        harness.notifier.notices(),
        vec![Notice::Error("Workspace name already taken".into())]
    );
    assert!(provisioner.progress().snapshot().steps[0].has_error);
}

#[tokio::test(start_paused = true)]
async fn test_commands_stop_at_first_failure() {
    let harness = Harness::new();
    harness.workspaces.fail_command_at(1);
    let mut request = stack_request();
    request.import.project.commands = (0..4)
        .map(|i| Command::new(format!("step-{i}"), format!("echo {i}")))
        .collect();
    let provisioner = harness.provisioner(ProvisionConfig::default());

    provisioner.provision(&request).await.unwrap_err();

    let names: Vec<_> = harness
        .workspaces
        .commands()
        .into_iter()
        .map(|(_, c)| c.name)
        .collect();
    assert_eq!(names, vec!["myapp: step-0", "myapp: step-1"]);
    assert!(harness.projects.resolve_calls().is_empty());
    assert!(matches!(
        harness.notifier.notices().as_slice(),
        [Notice::Alert { title, content }]
            if title == "Error while creating the project" && content.starts_with("Conflict:")
    ));
}

#[tokio::test(start_paused = true)]
async fn test_status_error_during_import_stops_remaining_calls() {
    let harness = Harness::new();
    let bus = harness.master_bus.clone();
    harness.projects.on_create(move |id| {
        bus.publish(
            &format!("workspace:{id}:status"),
            &format!(r#"{{"eventType":"ERROR","workspaceId":"{id}","error":"OOM"}}"#),
        );
    });
    let provisioner = harness.provisioner(ProvisionConfig::default());

    let err = provisioner
        .provision(&stack_request())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::Aborted));
    assert_eq!(harness.projects.batches().len(), 1);
    assert!(harness.workspaces.commands().is_empty());
    assert!(harness.projects.resolve_calls().is_empty());
    assert!(matches!(
        harness.notifier.notices().as_slice(),
        [Notice::Alert { title, content }]
            if title == "Error when starting workspace" && content.contains("OOM")
    ));
}

#[tokio::test(start_paused = true)]
async fn test_destroyed_with_running_skips_details_and_connect() {
    let harness = Harness::new();
    let bus = harness.master_bus.clone();
    harness.workspaces.on_start(move |id| {
        bus.publish(
            &format!("workspace:{id}:status"),
            &format!(r#"{{"eventType":"DESTROYED","workspaceId":"{id}"}}"#),
        );
    });
    let provisioner = harness.provisioner(ProvisionConfig::default());

    let err = provisioner
        .provision(&stack_request())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::Aborted));
    assert_eq!(
        harness.workspaces.calls(),
        vec!["create:wksp-test", "details:W1", "start:W1:default", "fetch_workspaces"]
    );
    assert_eq!(harness.transport.open_count(), 0);
    assert_eq!(harness.notifier.notices().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unnamed_stack_workspace_gets_generated_name() {
    let harness = Harness::new();
    let mut request = stack_request();
    if let WorkspaceResource::FromStack { name, config, .. } = &mut request.resource {
        *name = None;
        config.name.clear();
    }
    let provisioner = harness.provisioner(ProvisionConfig::default());

    provisioner
        .provision(&request)
        .await
        .expect("Provisioning should succeed");

    let created = harness.workspaces.created();
    assert!(created[0].1.name.starts_with("wksp-"));
    assert_eq!(created[0].1.name.len(), "wksp-".len() + 4);
}

#[tokio::test(start_paused = true)]
async fn test_type_resolution_falls_back_once() {
    let harness = Harness::new();
    harness
        .projects
        .fail_resolve(1, RemoteError::new("Unknown project type maven"));
    let provisioner = harness.provisioner(ProvisionConfig::default());

    let outcome = provisioner
        .provision(&stack_request())
        .await
        .expect("Fallback type should resolve");

    assert_eq!(outcome.import.resolution, TypeResolution::Fallback);
    let calls = harness.projects.resolve_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].project.kind.as_deref(), Some("maven"));
    assert_eq!(calls[1].project.kind.as_deref(), Some("blank"));
    assert!(calls[1].project.attributes.is_empty());
    assert!(harness.notifier.notices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_type_resolution_second_failure_is_terminal() {
    let harness = Harness::new();
    harness.projects.fail_resolve(
        2,
        RemoteError::new("Type resolution failed").with_status(500, "Internal Server Error"),
    );
    let provisioner = harness.provisioner(ProvisionConfig::default());

    let err = provisioner.provision(&stack_request()).await.unwrap_err();

    assert!(matches!(err, ProvisionError::Remote { .. }));
    assert_eq!(harness.projects.resolve_calls().len(), 2);
    assert_eq!(
        harness.notifier.notices(),
        vec![Notice::Alert {
            title: "Error while creating the project".into(),
            content: "Internal Server Error: Type resolution failed".into(),
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_missing_credentials_prompt() {
    let harness = Harness::new();
    harness
        .projects
        .fail_create(RemoteError::new("Authentication required").with_code(32068));
    let provisioner = harness.provisioner(ProvisionConfig::default());

    let err = provisioner.provision(&stack_request()).await.unwrap_err();

    assert!(matches!(err, ProvisionError::Credential { .. }));
    assert_eq!(
        harness.notifier.notices(),
        vec![Notice::Credentials {
            location: "https://example.com/console-java-simple.git".into(),
            workspace_id: "W1".into(),
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_existing_source_skips_template_commands() {
    let harness = Harness::new();
    let mut request = stack_request();
    request.source_option = SourceOption::Existing;
    let provisioner = harness.provisioner(ProvisionConfig::default());

    let outcome = provisioner.provision(&request).await.expect("Should succeed");

    assert_eq!(outcome.import.commands_added, 0);
    assert!(harness.workspaces.commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_wizard_template_defers_import() {
    let harness = Harness::new();
    let mut request = stack_request();
    request.template = TemplateChoice::Wizard;
    let provisioner = harness.provisioner(ProvisionConfig::default());

    let outcome = provisioner.provision(&request).await.expect("Should succeed");

    assert_eq!(outcome.import.resolution, TypeResolution::Skipped);
    assert!(harness.projects.batches().is_empty());
    assert!(harness.workspaces.commands().is_empty());
    assert_eq!(provisioner.progress().current_phase(), CreationPhase::Finished);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_request_fails_before_any_call() {
    let harness = Harness::new();
    let mut request = stack_request();
    request.project_name = Some(String::new());
    let provisioner = harness.provisioner(ProvisionConfig::default());

    let err = provisioner.provision(&request).await.unwrap_err();

    assert!(matches!(err, ProvisionError::Validation(_)));
    assert!(harness.workspaces.calls().is_empty());
    assert_eq!(
        harness.notifier.notices(),
        vec![Notice::Error("project name must not be empty".into())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_missing_websocket_url_fails() {
    let harness = Harness::new();
    harness.workspaces.remove_websocket_url("W1");
    let provisioner = harness.provisioner(ProvisionConfig::default());

    let err = provisioner.provision(&stack_request()).await.unwrap_err();

    assert!(matches!(err, ProvisionError::Validation(_)));
    assert_eq!(harness.transport.open_count(), 0);
    assert_eq!(harness.master_bus.unsubscribed().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_second_attempt_starts_clean() {
    let harness = Harness::with_transport(FakeTransport::failing_first(1));
    let provisioner = harness.provisioner(config_with_budget(1));

    provisioner.provision(&stack_request()).await.unwrap_err();
    assert!(provisioner.progress().has_error());

    provisioner
        .provision(&stack_request())
        .await
        .expect("Retry should succeed");

    assert!(!provisioner.progress().has_error());
    assert_eq!(harness.notifier.notices().len(), 1);
}
