use crate::scenario::{self, NodeKindSpec, ScenarioError, ScenarioSpec};
use crate::sim::{NodeId, SimTime};

const SCENARIO: &str = r#"
{
    "schema_version": 1,
    "meta": { "name": "two sources and a pool" },
    "engine": { "threads": 2 },
    "window": 10,
    "until": 25,
    "nodes": [
        { "id": "pump-a", "kind": "failure_source", "up": 10, "down": 5 },
        { "id": "pump-b", "kind": "failure_source", "up": 12, "down": 3, "offset": 1 },
        { "id": "station", "kind": "any_gate" },
        { "id": "alarms", "kind": "counter", "types": ["FAIL"] },
        { "id": "crew-1", "kind": "requester", "at": [2], "hold": 3 },
        { "id": "crew-2", "kind": "requester", "at": [2], "hold": 3 },
        { "id": "depot", "kind": "resource_pool", "capacity": 1 }
    ],
    "subscriptions": [
        { "from": "pump-a", "to": "station" },
        { "from": "pump-b", "to": "station" },
        { "from": "station", "to": "alarms" },
        { "from": "crew-1", "to": "depot" },
        { "from": "crew-2", "to": "depot" }
    ]
}
"#;

#[test]
fn scenario_json_parses_node_kinds() {
    let spec = ScenarioSpec::from_json(SCENARIO).expect("parse scenario");
    assert_eq!(spec.nodes.len(), 7);
    assert_eq!(
        spec.nodes[1].kind,
        NodeKindSpec::FailureSource {
            up: 12,
            down: 3,
            offset: Some(1),
        }
    );
    assert_eq!(spec.nodes[2].kind, NodeKindSpec::AnyGate {});
    assert_eq!(
        spec.nodes[3].kind,
        NodeKindSpec::Counter {
            types: Some(vec!["FAIL".to_string()]),
        }
    );
    let engine = spec.engine.as_ref().expect("engine config");
    assert_eq!(engine.threads, 2);
    assert_eq!(engine.history_len, crate::node::runtime::DEFAULT_HISTORY_LEN);
    assert_eq!(
        spec.meta.as_ref().and_then(|m| m.name.as_deref()),
        Some("two sources and a pool")
    );
}

#[test]
fn window_targets_end_exactly_at_until() {
    let spec = ScenarioSpec::from_json(SCENARIO).expect("parse scenario");
    let targets: Vec<SimTime> = spec.window_targets().collect();
    assert_eq!(targets, vec![SimTime(10), SimTime(20), SimTime(25)]);
}

#[test]
fn scenario_runs_and_summarizes_each_node() {
    let spec = ScenarioSpec::from_json(SCENARIO).expect("parse scenario");
    let mut engine = spec.build().expect("build");
    for target in spec.window_targets() {
        engine.evaluate(target).expect("evaluate");
    }
    assert_eq!(engine.clock(), SimTime(25));

    let summaries = scenario::summarize(&spec, &engine);
    assert_eq!(summaries.len(), 7);
    let depot = summaries
        .iter()
        .find(|s| s.id == "depot")
        .expect("depot summary");
    assert_eq!(depot.kind, "resource_pool");
    assert!(depot.stats.contains(&("grants".to_string(), "2".to_string())));
    assert!(depot.line().starts_with("node id=depot kind=resource_pool grants=2"));

    let alarms = summaries
        .iter()
        .find(|s| s.id == "alarms")
        .expect("alarms summary");
    assert!(alarms.stats.contains(&("count.FAIL".to_string(), "2".to_string())));
    assert!(!alarms.stats.iter().any(|(k, _)| k == "count.REPAIR"));

    let copy = spec.build().expect("rebuild");
    assert_eq!(copy.configuration_digest(), engine.configuration_digest());
    assert_eq!(
        copy.dependencies(&NodeId::new("station")).expect("station"),
        vec![NodeId::new("pump-a"), NodeId::new("pump-b")]
    );
}

#[test]
fn scenario_rejects_bad_headers_and_wiring() {
    let bad_schema = SCENARIO.replace("\"schema_version\": 1", "\"schema_version\": 9");
    assert!(matches!(
        ScenarioSpec::from_json(&bad_schema),
        Err(ScenarioError::Schema(9))
    ));

    let bad_window = SCENARIO.replace("\"window\": 10", "\"window\": 0");
    assert!(matches!(
        ScenarioSpec::from_json(&bad_window),
        Err(ScenarioError::Invalid(_))
    ));

    assert!(matches!(
        ScenarioSpec::from_json("{ not json"),
        Err(ScenarioError::Parse(_))
    ));

    let dangling = SCENARIO.replace(
        "{ \"from\": \"station\", \"to\": \"alarms\" }",
        "{ \"from\": \"station\", \"to\": \"nowhere\" }",
    );
    let spec = ScenarioSpec::from_json(&dangling).expect("parse scenario");
    assert!(matches!(spec.build(), Err(ScenarioError::Usage(_))));
}
