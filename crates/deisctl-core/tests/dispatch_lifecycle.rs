//! Integration tests for lifecycle commands against the local backend

use std::path::Path;

use tempfile::TempDir;

use deisctl_core::backend::{Action, BackendKind, InstanceState, JobOutcome};
use deisctl_core::catalog::PLATFORM;
use deisctl_core::commands::{ConfigAction, DispatchContext, Dispatcher, RouterMeshSize};
use deisctl_core::error::{EXIT_OK, EXIT_PARTIAL, Error, TargetError};
use deisctl_core::settings::{KvKind, Settings};
use deisctl_core::target::Target;

fn tokens(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn write_units(dir: &Path, components: &[&str]) {
    std::fs::create_dir_all(dir).expect("Failed to create units dir");
    for component in components {
        std::fs::write(
            dir.join(format!("deis-{component}.service")),
            format!("[Unit]\nDescription=deis-{component}\n"),
        )
        .expect("Failed to write unit file");
    }
}

fn local_settings() -> Settings {
    Settings {
        backend: BackendKind::Local,
        kv: KvKind::File,
        ..Settings::default()
    }
}

fn setup_isolated_dispatcher() -> (TempDir, Dispatcher) {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let home = temp.path().join("home");
    let units = temp.path().join("units");
    std::fs::create_dir_all(&home).expect("Failed to create home dir");
    let all: Vec<&str> = PLATFORM.iter().map(|c| c.name).collect();
    write_units(&units, &all);

    let ctx = DispatchContext::new(
        local_settings(),
        temp.path().join("state"),
        Some(home),
        Some(units),
    );
    let dispatcher = ctx.dispatcher();
    dispatcher
        .config(
            "platform",
            &ConfigAction::Set(vec![("domain".to_string(), "example.com".to_string())]),
        )
        .expect("set domain");
    (temp, dispatcher)
}

fn running(dispatcher: &Dispatcher, component: &str) -> Vec<u32> {
    dispatcher
        .status(&tokens(&[component]))
        .expect("status")
        .statuses
        .into_iter()
        .filter(|s| s.state == InstanceState::Running)
        .map(|s| s.instance.index)
        .collect()
}

#[test]
fn platform_install_loads_mesh_sized_router_set_without_starting() {
    let (_temp, dispatcher) = setup_isolated_dispatcher();

    let report = dispatcher
        .install(&[], RouterMeshSize::new(5).unwrap())
        .expect("install");
    assert_eq!(report.exit_code(), EXIT_OK);

    let installed = dispatcher.list().expect("list");
    assert_eq!(installed.len(), PLATFORM.len());
    let router = installed
        .iter()
        .find(|t| t.component == "router")
        .expect("router installed");
    assert_eq!(router.instances, vec![1, 2, 3, 4, 5]);

    let status = dispatcher.status(&[]).expect("status");
    assert!(
        status
            .statuses
            .iter()
            .all(|s| s.state == InstanceState::Installed)
    );
}

#[test]
fn platform_token_matches_empty_target_list() {
    let (_temp, dispatcher) = setup_isolated_dispatcher();
    dispatcher
        .install(&tokens(&["platform"]), RouterMeshSize::default())
        .expect("install");

    let installed = dispatcher.list().expect("list");
    let router = installed.iter().find(|t| t.component == "router").unwrap();
    assert_eq!(router.count(), 3);
}

#[test]
fn install_without_domain_attempts_nothing() {
    let temp = TempDir::new().unwrap();
    let units = temp.path().join("units");
    write_units(&units, &["logger"]);
    let ctx = DispatchContext::new(
        local_settings(),
        temp.path().join("state"),
        None,
        Some(units),
    );
    let dispatcher = ctx.dispatcher();

    let err = dispatcher
        .install(&tokens(&["logger"]), RouterMeshSize::default())
        .unwrap_err();
    match err {
        Error::MissingRequiredKey { path, key, .. } => {
            assert_eq!(path, "/deis/platform/domain");
            assert_eq!(key, "domain");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(dispatcher.list().unwrap().is_empty());
}

#[test]
fn missing_ssh_key_only_warns() {
    let (_temp, dispatcher) = setup_isolated_dispatcher();
    let report = dispatcher
        .install(&tokens(&["logger"]), RouterMeshSize::default())
        .expect("install");
    assert_eq!(report.exit_code(), EXIT_OK);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("sshPrivateKey"));
}

#[test]
fn uninstall_twice_is_already_in_desired_state() {
    let (_temp, dispatcher) = setup_isolated_dispatcher();
    dispatcher
        .install(&tokens(&["cache"]), RouterMeshSize::default())
        .unwrap();

    let first = dispatcher.uninstall(&tokens(&["cache"])).unwrap();
    assert_eq!(first.outcomes[0].outcome, JobOutcome::Succeeded);

    let second = dispatcher.uninstall(&tokens(&["cache"])).unwrap();
    assert_eq!(second.outcomes.len(), 1);
    assert_eq!(
        second.outcomes[0].outcome,
        JobOutcome::AlreadyInDesiredState
    );
    assert_eq!(second.exit_code(), EXIT_OK);
}

#[test]
fn scale_down_removes_highest_instances_first() {
    let (_temp, dispatcher) = setup_isolated_dispatcher();

    let up = dispatcher.scale(&tokens(&["router@5"])).expect("scale up");
    assert_eq!(up.exit_code(), EXIT_OK);
    assert_eq!(running(&dispatcher, "router"), vec![1, 2, 3, 4, 5]);

    let down = dispatcher.scale(&tokens(&["router@2"])).expect("scale down");
    let removed: Vec<u32> = down
        .outcomes
        .iter()
        .filter(|o| o.outcome == JobOutcome::Succeeded)
        .map(|o| o.instance.index)
        .collect();
    assert_eq!(removed, vec![5, 4, 3]);
    assert!(down.outcomes.iter().all(|o| o.action == Action::Scale));
    assert_eq!(running(&dispatcher, "router"), vec![1, 2]);
}

#[test]
fn legacy_scale_spelling_is_accepted() {
    let (_temp, dispatcher) = setup_isolated_dispatcher();
    dispatcher.scale(&tokens(&["registry=2"])).expect("scale");
    assert_eq!(running(&dispatcher, "registry"), vec![1, 2]);
}

#[test]
fn non_scalable_component_rejects_more_than_one() {
    let (_temp, dispatcher) = setup_isolated_dispatcher();
    let report = dispatcher.scale(&tokens(&["database@2"])).expect("scale");
    assert_eq!(report.exit_code(), EXIT_PARTIAL);
    assert_eq!(report.outcomes.len(), 1);
    // Reported against the unit that exists, not the requested count.
    assert_eq!(report.outcomes[0].instance.unit_name(), "deis-database.service");
    assert_eq!(
        report.outcomes[0].outcome,
        JobOutcome::Failed(TargetError::NotScalable {
            component: "database".to_string()
        })
    );
}

#[test]
fn scale_without_targets_is_a_usage_error() {
    let (_temp, dispatcher) = setup_isolated_dispatcher();
    let err = dispatcher.scale(&[]).unwrap_err();
    assert!(matches!(err, Error::Argument(_)));
}

#[test]
fn restart_of_stopped_component_ends_running() {
    let (_temp, dispatcher) = setup_isolated_dispatcher();
    dispatcher
        .install(&tokens(&["controller"]), RouterMeshSize::default())
        .unwrap();
    assert!(running(&dispatcher, "controller").is_empty());

    let report = dispatcher.restart(&tokens(&["controller"])).unwrap();
    assert_eq!(report.exit_code(), EXIT_OK);
    let actions: Vec<Action> = report.outcomes.iter().map(|o| o.action).collect();
    assert_eq!(actions, vec![Action::Stop, Action::Start]);
    assert_eq!(running(&dispatcher, "controller"), vec![1]);
}

#[test]
fn whole_platform_restart_stops_router_first_and_starts_it_last() {
    let (_temp, dispatcher) = setup_isolated_dispatcher();
    dispatcher
        .install(&tokens(&["logger", "router"]), RouterMeshSize::default())
        .unwrap();
    dispatcher.start(&[]).unwrap();

    let report = dispatcher.restart(&[]).unwrap();
    assert_eq!(report.exit_code(), EXIT_OK);
    let steps: Vec<(Action, String)> = report
        .outcomes
        .iter()
        .map(|o| (o.action, o.instance.component.clone()))
        .collect();
    let stop_order: Vec<&str> = steps
        .iter()
        .filter(|(action, _)| *action == Action::Stop)
        .map(|(_, c)| c.as_str())
        .collect();
    let start_order: Vec<&str> = steps
        .iter()
        .filter(|(action, _)| *action == Action::Start)
        .map(|(_, c)| c.as_str())
        .collect();
    assert_eq!(stop_order.first(), Some(&"router"));
    assert_eq!(stop_order.last(), Some(&"logger"));
    assert_eq!(start_order.first(), Some(&"logger"));
    assert_eq!(start_order.last(), Some(&"router"));
    assert_eq!(running(&dispatcher, "router"), vec![1]);
}

#[test]
fn one_failing_target_does_not_stop_the_rest() {
    let (_temp, dispatcher) = setup_isolated_dispatcher();
    dispatcher
        .install(&tokens(&["logger"]), RouterMeshSize::default())
        .unwrap();

    let report = dispatcher.start(&tokens(&["builder", "logger"])).unwrap();
    assert_eq!(report.exit_code(), EXIT_PARTIAL);
    assert_eq!(report.outcomes[0].outcome, JobOutcome::NotFound);
    assert_eq!(report.outcomes[1].outcome, JobOutcome::Succeeded);
    assert_eq!(running(&dispatcher, "logger"), vec![1]);
}

#[test]
fn missing_unit_file_is_reported_per_target() {
    let (_temp, dispatcher) = setup_isolated_dispatcher();
    let report = dispatcher
        .install(&tokens(&["logger", "monitor"]), RouterMeshSize::default())
        .unwrap();
    assert_eq!(report.outcomes[0].outcome, JobOutcome::Succeeded);
    assert_eq!(
        report.outcomes[1].outcome,
        JobOutcome::Failed(TargetError::UnitFileNotFound {
            component: "monitor".to_string()
        })
    );
}

#[test]
fn invalid_target_fails_before_backend_is_touched() {
    let (_temp, dispatcher) = setup_isolated_dispatcher();
    let err = dispatcher
        .install(&tokens(&["logger", "Router@"]), RouterMeshSize::default())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTargetSyntax { .. }));
    assert!(dispatcher.list().unwrap().is_empty());
}

#[test]
fn addressed_instance_only_affects_that_instance() {
    let (_temp, dispatcher) = setup_isolated_dispatcher();
    dispatcher.scale(&tokens(&["router@3"])).unwrap();

    dispatcher.stop(&tokens(&["router@2"])).unwrap();
    assert_eq!(running(&dispatcher, "router"), vec![1, 3]);

    let stopped_all = dispatcher.stop(&tokens(&["router"])).unwrap();
    assert_eq!(stopped_all.outcomes.len(), 3);
    assert!(running(&dispatcher, "router").is_empty());
}

#[test]
fn status_of_uninstalled_target_is_partial() {
    let (_temp, dispatcher) = setup_isolated_dispatcher();
    let report = dispatcher.status(&tokens(&["publisher"])).unwrap();
    assert_eq!(report.statuses.len(), 1);
    assert_eq!(report.statuses[0].state, InstanceState::Uninstalled);
    assert_eq!(report.exit_code(), EXIT_PARTIAL);
}

#[test]
fn journal_snapshot_lists_transitions() {
    let (_temp, dispatcher) = setup_isolated_dispatcher();
    dispatcher
        .install(&tokens(&["logspout"]), RouterMeshSize::default())
        .unwrap();
    dispatcher.start(&tokens(&["logspout"])).unwrap();

    let mut out = Vec::new();
    let report = dispatcher.journal(&tokens(&["logspout"]), &mut out).unwrap();
    assert_eq!(report.exit_code(), EXIT_OK);
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("deis-logspout.service"));
    assert!(text.contains("Started"));
}

#[test]
fn ssh_to_stopped_instance_is_not_running() {
    let (_temp, dispatcher) = setup_isolated_dispatcher();
    dispatcher
        .install(&tokens(&["builder"]), RouterMeshSize::default())
        .unwrap();

    let mut out = Vec::new();
    let report = dispatcher
        .ssh("builder", &tokens(&["true"]), &mut out)
        .unwrap();
    assert_eq!(
        report.outcomes[0].outcome,
        JobOutcome::Failed(TargetError::TargetNotRunning)
    );
    assert!(dispatcher.ssh("platform", &[], &mut out).is_err());
}

#[test]
fn whole_platform_list_is_in_catalog_order() {
    let (_temp, dispatcher) = setup_isolated_dispatcher();
    dispatcher
        .install(&tokens(&["router", "logger", "store-monitor"]), RouterMeshSize::default())
        .unwrap();
    let order: Vec<String> = dispatcher
        .list()
        .unwrap()
        .into_iter()
        .map(|t: Target| t.component)
        .collect();
    assert_eq!(order, vec!["store-monitor", "logger", "router"]);
}
