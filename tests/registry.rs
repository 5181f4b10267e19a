//! Registry documents: aliases, menus, inheritance and quick tasks.

use dac::context::Session;
use dac::modules::timedata::LoadAction;
use dac::plugin::menu::{depth, flatten};
use dac::registry::{ActionType, TaskType};
use dac::{
    ActionKind, Binding, ChannelTask, DacConfig, DacError, MenuKey, ParamMap, PluginLoader,
    RegistryDocument, Task, TaskOutcome, TypeRegistry,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::thread;

fn loader_with(extra: impl FnOnce(&mut TypeRegistry)) -> PluginLoader {
    let mut registry = TypeRegistry::with_plugins();
    extra(&mut registry);
    PluginLoader::new(Arc::new(registry))
}

#[test]
fn test_alias_resolves_to_same_type_as_full_path() {
    let loader = loader_with(|registry| {
        registry.register_action_type(ActionType::new("pkg.timedata.actions.LoadAction", || {
            Box::new(LoadAction)
        }));
    });
    let loaded = loader
        .load_str("alias:\n  mt: pkg.timedata\nactions:\n  _:\n    - mt.actions.LoadAction\n")
        .unwrap();
    assert!(loaded.is_clean(), "{:?}", loaded.errors);

    let resolver = loaded.state.resolver();
    let via_alias = resolver.resolve("mt.actions.LoadAction").unwrap();
    let direct = resolver.resolve("pkg.timedata.actions.LoadAction").unwrap();
    assert!(via_alias.same(&direct));

    let menu = loaded.state.action_menu(&MenuKey::Global);
    let items = flatten(&menu);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].path(), "pkg.timedata.actions.LoadAction");
}

#[test]
fn test_unknown_alias_is_reported_not_fatal() {
    let loader = loader_with(|_| {});
    let loaded = loader
        .load_str("actions:\n  _:\n    - zz.Missing\n    - dac.modules.drivetrain.CreateBearing\n")
        .unwrap();

    assert_eq!(loaded.errors.len(), 1);
    assert_eq!(loaded.errors[0].key, "_");
    assert_eq!(loaded.errors[0].position, Some(0));
    assert!(matches!(
        loaded.errors[0].error,
        DacError::UnresolvedAlias { .. }
    ));
    assert_eq!(flatten(&loaded.state.action_menu(&MenuKey::Global)).len(), 1);
}

#[test]
fn test_nested_sections_balance() {
    let loader = loader_with(|_| {});
    let text = r#"
alias:
  md: dac.modules.drivetrain
actions:
  _:
    - "[Outer>]"
    - md.CreateBearing
    - "[Inner>]"
    - md.BearingFrequenciesAction
    - "[<Inner]"
    - "[Notes]"
    - "[<]"
"#;
    let loaded = loader.load_str(text).unwrap();
    assert!(loaded.is_clean(), "{:?}", loaded.errors);
    let menu = loaded.state.action_menu(&MenuKey::Global);
    assert_eq!(depth(&menu), 2);
    assert_eq!(flatten(&menu).len(), 2);
}

#[test]
fn test_unmatched_close_is_malformed() {
    let loader = loader_with(|_| {});
    let loaded = loader
        .load_str("actions:\n  _:\n    - dac.modules.drivetrain.CreateBearing\n    - \"[<]\"\n")
        .unwrap();
    assert_eq!(loaded.errors.len(), 1);
    assert_eq!(loaded.errors[0].position, Some(1));
    assert!(matches!(
        loaded.errors[0].error,
        DacError::MalformedSection { .. }
    ));
    assert!(matches!(
        loaded.into_result(),
        Err(DacError::PluginLoad { .. })
    ));
}

#[test]
fn test_strict_session_rejects_broken_registry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plugins.yaml");
    std::fs::write(&path, "actions:\n  _:\n    - dac.modules.Nothing\n").unwrap();

    let lenient = DacConfig {
        registry: Some(path.clone()),
        ..DacConfig::default()
    };
    assert!(Session::from_config(&lenient).is_ok());

    let strict = DacConfig {
        strict_plugins: true,
        ..lenient
    };
    assert!(matches!(
        Session::from_config(&strict),
        Err(DacError::PluginLoad { .. })
    ));
}

#[test]
fn test_registry_file_inherits_bundled_sections() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("base.yaml"),
        dac::modules::DEFAULT_REGISTRY,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("site.yaml"),
        "inherit: base.yaml\nalias:\n  mt: dac.modules.nvh\nactions:\n  _:\n    - mt.ToFrequencyDomainAction\n",
    )
    .unwrap();

    let loaded = loader_with(|_| {})
        .load_file(dir.path().join("site.yaml"))
        .unwrap();
    assert!(loaded.is_clean(), "{:?}", loaded.errors);

    let state = loaded.state;
    assert_eq!(state.aliases().get("mt"), Some("dac.modules.nvh"));
    let global: Vec<String> = flatten(&state.action_menu(&MenuKey::Global))
        .into_iter()
        .map(|t| t.path().to_string())
        .collect();
    assert_eq!(
        global.last().map(String::as_str),
        Some("dac.modules.nvh.ToFrequencyDomainAction")
    );
    assert!(global.len() > 1);
}

#[test]
fn test_document_round_trips_through_yaml() {
    let document = RegistryDocument::from_yaml(dac::modules::DEFAULT_REGISTRY).unwrap();
    let again = RegistryDocument::from_yaml(&document.to_yaml().unwrap()).unwrap();
    assert_eq!(again, document);
}

#[test]
fn test_channel_quick_task_fills_parameter() {
    let (task, mut prompts) = ChannelTask::channel();
    let loader = loader_with(move |registry| {
        registry.register_task_type(TaskType::new("app.tasks.PickFiles", move || {
            Box::new(task.clone()) as Box<dyn Task>
        }));
    });
    let text = format!(
        "quick_tasks:\n  {}:\n    - [app.tasks.PickFiles, Pick files, fpaths]\n",
        LoadAction::TYPE_PATH
    );
    let state = loader.load_str(&text).unwrap().into_result().unwrap();
    let mut session = Session::new(state);
    let action = session
        .add_action(LoadAction::TYPE_PATH, ParamMap::new())
        .unwrap();

    let front_end = thread::spawn(move || {
        let prompt = prompts.blocking_recv().unwrap();
        assert_eq!(prompt.request.label, "Pick files");
        assert_eq!(prompt.request.param, "fpaths");
        prompt.resolve(json!(["a.txt", "b.txt"]));

        let prompt = prompts.blocking_recv().unwrap();
        assert!(prompt.request.current.is_some());
        prompt.cancel();
    });

    let first = session.run_task(&action, "fpaths").unwrap();
    assert_eq!(
        first,
        TaskOutcome::Resolved(Binding::literal(json!(["a.txt", "b.txt"])))
    );
    let second = session.run_task(&action, "fpaths").unwrap();
    assert_eq!(second, TaskOutcome::Cancelled);
    front_end.join().unwrap();

    let stored = session.current().action(&action).unwrap();
    assert_eq!(
        stored.param("fpaths"),
        Some(&Binding::literal(json!(["a.txt", "b.txt"])))
    );
    assert!(matches!(
        session.run_task(&action, "dt"),
        Err(DacError::NotFound { .. })
    ));
}
