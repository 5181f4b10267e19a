//! End-to-end workflows through a Session with the bundled modules.

use dac::any::downcast;
use dac::context::Session;
use dac::modules::base::SimpleDefinition;
use dac::modules::drivetrain::{
    BallBearing, BearingFrequencies, SHOW_TIME_DATA_WITH_FREQ_LINES,
};
use dac::modules::nvh::{FreqDomainData, ToFrequencyDomainAction};
use dac::modules::timedata::{
    LoadAction, PlotSeries, SignalConstructAction, TimeData, TruncAction,
};
use dac::{
    ActionKind, ActionStatus, Binding, CandidatePolicy, DacConfig, DacError, DataNode,
    DataNodeType, DynAny, Invocation, ParamMap,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use uuid::Uuid;

fn session_with_context() -> (Session, Uuid) {
    let mut session = Session::from_config(&DacConfig::default()).unwrap();
    let key = session
        .insert_global(Box::new(SimpleDefinition::new("Run 1")))
        .unwrap();
    session.open_context(key).unwrap();
    session.activate(Some(key)).unwrap();
    (session, key)
}

fn params(entries: &[(&str, serde_json::Value)]) -> ParamMap {
    entries
        .iter()
        .map(|(name, value)| (name.to_string(), Binding::literal(value.clone())))
        .collect()
}

#[test]
fn test_time_series_to_spectrum() {
    let (mut session, key) = session_with_context();
    let u1 = session
        .insert_data(Box::new(TimeData::new("acc", vec![0.0, 1.0, 0.0, -1.0], 0.25)))
        .unwrap();

    let action = session
        .add_action(
            ToFrequencyDomainAction::TYPE_PATH,
            [("channel".to_string(), Binding::Node(u1))].into_iter().collect(),
        )
        .unwrap();
    let produced = session
        .run_action(&action, &ParamMap::new())
        .unwrap()
        .produced();

    assert_eq!(produced.len(), 1);
    let context = session.context(&key).unwrap();
    let spectrum = context.data().get_as::<FreqDomainData>(&produced[0]).unwrap();
    assert_ne!(produced[0], u1);
    assert_ne!(produced[0], action);
    assert_eq!(spectrum.y.len(), 3);
    assert!((spectrum.df - 1.0).abs() < 1e-12);

    let source = context.data().get_as::<TimeData>(&u1).unwrap();
    assert_eq!(source.y, vec![0.0, 1.0, 0.0, -1.0]);
    assert_eq!(context.data().len(), 2);
    assert!(session.global().data().get(&produced[0]).is_none());
}

#[test]
fn test_unbound_until_one_candidate_exists() {
    let (mut session, _) = session_with_context();
    let action = session
        .add_action(ToFrequencyDomainAction::TYPE_PATH, ParamMap::new())
        .unwrap();

    match session.run_action(&action, &ParamMap::new()) {
        Err(DacError::UnboundParameter { param, .. }) => assert_eq!(param, "channel"),
        other => panic!("expected unbound parameter, got {:?}", other),
    }
    assert_eq!(
        session.current().action(&action).unwrap().status(),
        ActionStatus::Init
    );

    let u1 = session
        .insert_data(Box::new(TimeData::new("acc", vec![1.0, 1.0], 0.5)))
        .unwrap();
    let mut bound = ParamMap::new();
    bound.insert("channel".to_string(), Binding::Node(u1));
    assert_eq!(session.run_action(&action, &bound).unwrap().produced().len(), 1);
    assert_eq!(
        session.current().action(&action).unwrap().status(),
        ActionStatus::Complete
    );
}

#[test]
fn test_require_explicit_policy_never_picks() {
    let config = DacConfig {
        candidates: CandidatePolicy::RequireExplicit,
        ..DacConfig::default()
    };
    let mut session = Session::from_config(&config).unwrap();
    session
        .insert_global(Box::new(TimeData::new("acc", vec![1.0], 1.0)))
        .unwrap();
    let action = session
        .add_action(ToFrequencyDomainAction::TYPE_PATH, ParamMap::new())
        .unwrap();
    assert!(matches!(
        session.run_action(&action, &ParamMap::new()),
        Err(DacError::UnboundParameter { .. })
    ));
}

#[test]
fn test_reinvocation_outputs_are_disjoint() {
    let (mut session, key) = session_with_context();
    let action = session
        .add_action(
            SignalConstructAction::TYPE_PATH,
            params(&[("duration", json!(1.0)), ("fs", json!(10))]),
        )
        .unwrap();

    let first = session
        .run_action(&action, &ParamMap::new())
        .unwrap()
        .produced();
    let second = session
        .run_action(&action, &params(&[("fs", json!(20))]))
        .unwrap()
        .produced();

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_ne!(first, second);

    let context = session.context(&key).unwrap();
    assert_eq!(context.data().get_as::<TimeData>(&first[0]).unwrap().len(), 10);
    assert_eq!(context.data().get_as::<TimeData>(&second[0]).unwrap().len(), 20);

    let stored = context.action(&action).unwrap();
    assert_eq!(stored.outputs(), second.as_slice());
    assert_eq!(stored.param("fs"), Some(&Binding::literal(20)));
}

#[test]
fn test_dangling_reference_fails_at_invocation() {
    let (mut session, _) = session_with_context();
    let u1 = session
        .insert_data(Box::new(TimeData::new("acc", vec![1.0, 2.0, 3.0], 1.0)))
        .unwrap();
    let mut bound = ParamMap::new();
    bound.insert("channels".to_string(), Binding::Nodes(vec![u1]));
    let action = session.add_action(TruncAction::TYPE_PATH, bound).unwrap();

    session.remove(&u1).unwrap();
    assert_eq!(session.graph().dangling(), vec![u1]);

    match session.run_action(&action, &ParamMap::new()) {
        Err(DacError::UnboundParameter { reference, .. }) => assert_eq!(reference, Some(u1)),
        other => panic!("expected unbound parameter, got {:?}", other),
    }
    assert_eq!(
        session.current().action(&action).unwrap().status(),
        ActionStatus::Configured
    );
}

#[test]
fn test_literal_without_value_or_default_is_missing() {
    let (mut session, key) = session_with_context();
    let action = session
        .add_action(LoadAction::TYPE_PATH, ParamMap::new())
        .unwrap();

    match session.run_action(&action, &ParamMap::new()) {
        Err(DacError::MissingParameter { action: _, param }) => assert_eq!(param, "fpaths"),
        other => panic!("expected missing parameter, got {:?}", other),
    }
    let context = session.context(&key).unwrap();
    assert!(context.data().is_empty());
    assert_eq!(context.action(&action).unwrap().status(), ActionStatus::Init);
}

#[test]
fn test_data_parameter_bound_to_wrong_type() {
    let (mut session, key) = session_with_context();
    let bearing = session
        .insert_data(Box::new(BallBearing::default()))
        .unwrap();
    let action = session
        .add_action(
            ToFrequencyDomainAction::TYPE_PATH,
            [("channel".to_string(), Binding::Node(bearing))]
                .into_iter()
                .collect(),
        )
        .unwrap();

    match session.run_action(&action, &ParamMap::new()) {
        Err(DacError::TypeMismatch {
            expected, found, ..
        }) => {
            assert_eq!(expected, TimeData::TYPE_PATH);
            assert_eq!(found, BallBearing::TYPE_PATH);
        }
        other => panic!("expected type mismatch, got {:?}", other),
    }
    let context = session.context(&key).unwrap();
    assert_eq!(context.data().len(), 1);
    let stored = context.action(&action).unwrap();
    assert_eq!(stored.status(), ActionStatus::Configured);
    assert_eq!(stored.param("channel"), Some(&Binding::Node(bearing)));
}

#[test]
fn test_failing_action_inserts_nothing() {
    let (mut session, key) = session_with_context();
    let action = session
        .add_action(
            LoadAction::TYPE_PATH,
            params(&[("fpaths", json!(["/nonexistent/dac/a.txt"]))]),
        )
        .unwrap();

    assert!(matches!(
        session.run_action(&action, &ParamMap::new()),
        Err(DacError::ActionFailed { .. })
    ));
    let context = session.context(&key).unwrap();
    assert!(context.data().is_empty());
    assert_eq!(context.action(&action).unwrap().status(), ActionStatus::Failed);
}

#[test]
fn test_quick_actions_are_transient() {
    let (mut session, key) = session_with_context();
    let u1 = session
        .insert_data(Box::new(TimeData::new("acc", vec![1.0, 2.0], 0.5)))
        .unwrap();

    let Invocation::Opaque(value) = session.run_quick(u1, &ParamMap::new()).unwrap() else {
        panic!("expected plot data");
    };
    let series = downcast::<Vec<PlotSeries>>(value).unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].x, vec![0.0, 0.5]);
    assert_eq!(session.context(&key).unwrap().action_count(), 0);
}

#[test]
fn test_quick_action_on_global_bearing_with_override() {
    let mut session = Session::from_config(&DacConfig::default()).unwrap();
    let bearing = session
        .add_global_data(BallBearing::TYPE_PATH, &serde_json::Map::new())
        .unwrap();

    let value = session
        .run_quick(bearing, &params(&[("speed", json!(10.0))]))
        .unwrap()
        .into_opaque()
        .unwrap();
    let freqs = downcast::<BearingFrequencies>(value).unwrap();
    assert_eq!(freqs.speed, 10.0);
    let geometry = BallBearing::default();
    assert!((freqs.bpfo - 10.0 * geometry.bpfo()).abs() < 1e-9);
}

#[test]
fn test_no_quick_action_for_context_key() {
    let (mut session, key) = session_with_context();
    match session.run_quick(key, &ParamMap::new()) {
        Err(DacError::NoQuickAction { type_path }) => {
            assert_eq!(type_path, SimpleDefinition::TYPE_PATH)
        }
        other => panic!("expected no quick action, got {:?}", other),
    }
}

#[test]
fn test_global_nodes_resolve_from_context() {
    let (mut session, key) = session_with_context();
    let shared = session
        .insert_global(Box::new(TimeData::new("reference", vec![1.0; 8], 0.125)))
        .unwrap();
    let action = session
        .add_action(ToFrequencyDomainAction::TYPE_PATH, ParamMap::new())
        .unwrap();
    session.run_action(&action, &ParamMap::new()).unwrap();

    let context = session.context(&key).unwrap();
    let stored = context.action(&action).unwrap();
    assert_eq!(stored.param("channel"), Some(&Binding::Node(shared)));
    assert_eq!(context.data().len(), 1);
    assert_eq!(session.global().data().len(), 2);
    assert_eq!(
        context.data().iter().next().unwrap().name(),
        "reference spectrum"
    );
}

#[test]
fn test_sequence_runs_members_against_one_argument_set() {
    let (mut session, key) = session_with_context();
    let channel = session
        .insert_data(Box::new(TimeData::new("acc", vec![1.0, 2.0, 3.0], 0.5)))
        .unwrap();
    let bearing = session
        .insert_data(Box::new(BallBearing::default()))
        .unwrap();
    let action = session
        .add_action(
            SHOW_TIME_DATA_WITH_FREQ_LINES,
            params(&[("speed", json!(2.0))]),
        )
        .unwrap();

    let value = session
        .run_action(&action, &ParamMap::new())
        .unwrap()
        .into_opaque()
        .unwrap();
    let mut results = downcast::<Vec<DynAny>>(value).unwrap().into_iter();
    let series = downcast::<Vec<PlotSeries>>(results.next().unwrap()).unwrap();
    assert_eq!(series[0].x, vec![0.0, 0.5, 1.0]);
    let freqs = downcast::<BearingFrequencies>(results.next().unwrap()).unwrap();
    assert_eq!(freqs.speed, 2.0);
    assert!(results.next().is_none());

    let context = session.context(&key).unwrap();
    assert_eq!(context.data().len(), 2);
    let stored = context.action(&action).unwrap();
    assert_eq!(stored.status(), ActionStatus::Complete);
    assert!(stored.outputs().is_empty());
    let names: Vec<&str> = stored.params().keys().map(String::as_str).collect();
    assert_eq!(names, vec!["channels", "plot_dt", "bearing", "speed"]);
    assert_eq!(stored.param("channels"), Some(&Binding::Nodes(vec![channel])));
    assert_eq!(stored.param("bearing"), Some(&Binding::Node(bearing)));
}
