//! End-to-end tests for the Bridge against the scripted device

use super::*;
use crate::features::{Direction, SnapshotType, SwitchMode};
use crate::host::ConsoleHost;
use crate::sync::{Binding, ValueKind};
use crate::transport::mock::{MockConnector, MockDevice};
use crate::transport::TransportError;
use serde_json::{json, Value};

fn device_tree() -> Value {
    json!({
        "audio": {
            "mixers": {
                "0": {
                    "_name": "Main",
                    "faders": {
                        "1": {
                            "label": "Mic 1", "fader": -10.0, "on": false, "pfl1": false, "pfl2": false,
                            "params": {"gain": {
                                "_hasagain": true,
                                "again": {"value": 20, "_min": 0, "_max": 60, "_step": 5}
                            }}
                        },
                        "3": {"label": "CD", "fader": 0, "on": true, "pfl1": false, "pfl2": false}
                    }
                }
            },
            "pots": {
                "1": {"_name": "Treble", "value": 2, "_min": -12, "_max": 12}
            },
            "selectors": {
                "selectors": {
                    "1": {"_name": "Studio A", "_sourcelist": "2", "left": "10", "right": "11"},
                    "5": {"_name": "Spare", "_sourcelist": "0", "left": "", "right": ""}
                },
                "sourcelists": {
                    "2": {"_name": "Sources", "entries": {
                        "1": {"_label": "CD", "_sourcel": "10", "_sourcer": "11"},
                        "2": {"_label": "Tuner", "_sourcel": "20", "_sourcer": "21"}
                    }}
                }
            }
        },
        "control": {
            "logics": {
                "4": {"value": false, "_name": "On Air", "_path": "/control/logics/4"}
            }
        }
    })
}

fn make_device() -> Arc<MockDevice> {
    let device = MockDevice::new(device_tree());
    device.on_rpc(|method, params| match method {
        "getsnapshotlist" if params["type"] == json!(1) && params["mixer"] == json!(0) => {
            Ok(json!({"result": [{"name": "Morning", "id": "12"}]}))
        }
        "getsnapshotlist" => Ok(json!({"result": []})),
        "loadsnapshot" => Ok(json!({})),
        other => Err(TransportError::Api { code: 400, message: format!("unknown rpc {}", other) }),
    });
    device
}

fn make_config() -> BridgeConfig {
    BridgeConfig {
        host: Some("10.0.0.5".to_string()),
        generic_actions_num: 4,
        ..BridgeConfig::default()
    }
}

async fn connected() -> (Bridge, Arc<MockConnector>, Arc<ConsoleHost>) {
    let connector = MockConnector::new(make_device());
    let host = Arc::new(ConsoleHost::new());
    let bridge = Bridge::new(connector.clone(), host.clone());

    bridge.configure(make_config()).unwrap().await.unwrap();
    assert_eq!(host.status(), Some((InstanceStatus::Ok, None)));
    (bridge, connector, host)
}

fn number(host: &ConsoleHost, variable: &str) -> Option<f64> {
    host.get_value(variable).and_then(|v| v.as_f64())
}

#[tokio::test]
async fn test_bootstrap_publishes_initial_state() {
    let (bridge, _connector, host) = connected().await;

    assert_eq!(host.get_value("channel_fader_1"), Some(json!(false)));
    assert_eq!(host.get_value("channel_fader_3"), Some(json!(true)));
    assert_eq!(host.get_value("fader_pfl_3"), Some(json!(false)));
    assert_eq!(number(&host, "fader_again_value_1"), Some(20.0));
    assert_eq!(number(&host, "fader_again_max_1"), Some(60.0));
    assert_eq!(number(&host, "fader_again_step_1"), Some(5.0));
    assert_eq!(number(&host, "pot_value_1"), Some(2.0));
    assert_eq!(
        host.get_value("routing_1"),
        Some(json!(r#"{"left":"10","right":"11"}"#))
    );
    assert_eq!(host.get_value("logic_4"), Some(json!(false)));

    let catalog = bridge.catalog();
    assert_eq!(catalog.channels.len(), 2);
    assert!(catalog.channels["1"].has_again);
    // selectors without a sourcelist are dropped
    assert_eq!(catalog.routing.selectors.keys().collect::<Vec<_>>(), vec!["1"]);
    assert_eq!(catalog.snapshots.label("0", SnapshotType::Channel, "12"), Some("Morning"));
    assert_eq!(catalog.snapshots.len(), 1);

    let variables: Vec<String> = host
        .variable_definitions()
        .into_iter()
        .map(|v| v.variable_id)
        .collect();
    for expected in [
        "channel_fader_3",
        "fader_again_min_1",
        "pot_value_1",
        "routing_1",
        "logic_4",
        "ch_snap_loaded_3",
        "generic-action-4",
    ] {
        assert!(variables.iter().any(|v| v == expected), "missing {}", expected);
    }
    assert!(!variables.iter().any(|v| v == "generic-action-5"));
    assert!(!variables.iter().any(|v| v == "fader_again_min_3"));
    assert_eq!(host.action_definitions().len(), 9);
}

#[tokio::test]
async fn test_push_writes_bound_variable_with_one_recompute() {
    let (_bridge, connector, host) = connected().await;
    let recomputes = host.recompute_count();

    connector.push(json!({"audio": {"mixers": {"0": {"faders": {"3": {"on": false}}}}}}));

    assert_eq!(host.get_value("channel_fader_3"), Some(json!(false)));
    assert_eq!(host.recompute_count(), recomputes + 1);
}

#[tokio::test]
async fn test_unrelated_push_triggers_nothing() {
    let (_bridge, connector, host) = connected().await;
    let recomputes = host.recompute_count();
    let writes = host.write_count();

    connector.push(json!({"audio": {"mixers": {"0": {"faders": {"99": {"on": true}}}}}}));
    connector.push(json!({"audio": {"pots": {"1": {"value": "loud"}}}}));

    assert_eq!(host.recompute_count(), recomputes);
    assert_eq!(host.write_count(), writes);
    assert_eq!(number(&host, "pot_value_1"), Some(2.0));
}

#[tokio::test]
async fn test_wrapped_push_value_is_normalized() {
    let (_bridge, connector, host) = connected().await;

    connector.push(json!({"audio": {"pots": {"1": {"value": {"value": 7}}}}}));

    assert_eq!(number(&host, "pot_value_1"), Some(7.0));
}

#[tokio::test]
async fn test_channel_toggle_writes_acknowledged_value() {
    let (bridge, connector, host) = connected().await;

    bridge
        .execute(Action::ChannelOnOff { fader: "3".to_string(), mode: SwitchMode::Toggle })
        .await
        .unwrap();

    assert_eq!(host.get_value("channel_fader_3"), Some(json!(false)));
    assert_eq!(
        connector.device.read("/audio/mixers/0/faders/3/on"),
        Some(json!(false))
    );
    assert!(!bridge.evaluate(&Feedback::ChannelFaderValue { fader: "3".to_string() }));

    bridge
        .execute(Action::FaderPfl { fader: "3".to_string(), mode: SwitchMode::On })
        .await
        .unwrap();
    assert!(bridge.evaluate(&Feedback::FaderPfl { fader: "3".to_string() }));
}

#[tokio::test]
async fn test_logic_switch_and_feedback() {
    let (bridge, _connector, host) = connected().await;
    let feedback = Feedback::Logic { logic: "4".to_string() };
    assert!(!bridge.evaluate(&feedback));

    bridge
        .execute(Action::Logic { logic: "4".to_string(), mode: SwitchMode::On })
        .await
        .unwrap();

    assert_eq!(host.get_value("logic_4"), Some(json!(true)));
    assert!(bridge.evaluate(&feedback));
}

#[tokio::test]
async fn test_fader_level_range() {
    let (bridge, connector, host) = connected().await;

    bridge
        .execute(Action::FaderLevel { fader: "1".to_string(), level: -20.0 })
        .await
        .unwrap();
    assert_eq!(
        connector.device.read("/audio/mixers/0/faders/1/fader"),
        Some(json!(-20.0))
    );

    let result = bridge
        .execute(Action::FaderLevel { fader: "1".to_string(), level: 42.0 })
        .await;
    assert!(matches!(result, Err(SyncError::InvalidOptions(_))));
    assert_eq!(host.status().map(|(s, _)| s), Some(InstanceStatus::BadConfig));
}

#[tokio::test]
async fn test_pot_adjust_clamps_to_range() {
    let (bridge, connector, host) = connected().await;

    bridge
        .execute(Action::PotValueAdjust {
            pot: "1".to_string(),
            direction: Direction::Up,
            step: 20.0,
        })
        .await
        .unwrap();

    assert_eq!(number(&host, "pot_value_1"), Some(12.0));
    assert_eq!(
        connector.device.read("/audio/pots/1/value").and_then(|v| v.as_f64()),
        Some(12.0)
    );
}

#[tokio::test]
async fn test_unknown_pot_is_bad_config() {
    let (bridge, connector, host) = connected().await;
    let sets_before = connector.device.sets.lock().len();

    let result = bridge
        .execute(Action::PotValueAdjust {
            pot: "9".to_string(),
            direction: Direction::Down,
            step: 1.0,
        })
        .await;

    assert!(result.is_err());
    assert_eq!(
        host.status(),
        Some((InstanceStatus::BadConfig, Some("Unknown pot: 9".to_string())))
    );
    assert_eq!(connector.device.sets.lock().len(), sets_before);
}

#[tokio::test]
async fn test_again_adjust_stops_at_bound() {
    let (bridge, connector, _host) = connected().await;
    let adjust = Action::FaderAgainAdjust { fader: "1".to_string(), direction: Direction::Up };

    bridge.execute(adjust.clone()).await.unwrap();
    assert_eq!(
        connector.device.sets.lock().last().cloned(),
        Some((
            "/audio/mixers/0/faders/1/params/gain/again/inc".to_string(),
            json!(5.0)
        ))
    );

    connector.push(json!({"audio": {"mixers": {"0": {"faders": {"1": {
        "params": {"gain": {"again": {"value": 60}}}
    }}}}}}));
    let sets_before = connector.device.sets.lock().len();

    bridge.execute(adjust).await.unwrap();
    assert_eq!(connector.device.sets.lock().len(), sets_before);
}

#[tokio::test]
async fn test_routing_action_and_feedback() {
    let (bridge, connector, host) = connected().await;
    let tuner = Feedback::RoutingValue { selector: "1".to_string(), entry: "2".to_string() };
    assert!(!bridge.evaluate(&tuner));

    bridge
        .execute(Action::Routing { selector: "1".to_string(), entry: "2".to_string() })
        .await
        .unwrap();
    assert_eq!(
        connector.device.read("/audio/selectors/selectors/1"),
        Some(json!({"left": "20", "right": "21"}))
    );

    // the variable follows the device through the subscription
    connector.push(json!({"audio": {"selectors": {"selectors": {"1": {
        "_name": "Studio A", "_sourcelist": "2", "left": "20", "right": "21"
    }}}}}));
    assert_eq!(
        host.get_value("routing_1"),
        Some(json!(r#"{"left":"20","right":"21"}"#))
    );
    assert!(bridge.evaluate(&tuner));

    let result = bridge
        .execute(Action::Routing { selector: "1".to_string(), entry: "7".to_string() })
        .await;
    assert!(result.is_err());
    assert_eq!(
        host.status(),
        Some((InstanceStatus::BadConfig, Some("invalid selector".to_string())))
    );
}

#[tokio::test]
async fn test_channel_snapshot_load() {
    let (bridge, connector, host) = connected().await;

    bridge
        .execute(Action::Snapshot {
            mixer: 0,
            kind: SnapshotType::Channel,
            id: "12".to_string(),
            fader: Some("3".to_string()),
        })
        .await
        .unwrap();

    let last_rpc = connector.device.rpcs.lock().last().cloned();
    assert_eq!(
        last_rpc,
        Some((
            "loadsnapshot".to_string(),
            json!({"type": 1, "mixer": 0, "id": "12", "fader": 3})
        ))
    );
    assert_eq!(host.get_value("ch_snap_loaded_3"), Some(json!("Morning")));

    connector.push(json!({"audio": {"mixers": {"0": {"faders": {"3": {"_lastloadedsnap": "Evening"}}}}}}));
    assert_eq!(host.get_value("ch_snap_loaded_3"), Some(json!("Evening")));
}

#[tokio::test]
async fn test_channel_snapshot_requires_fader() {
    let (bridge, connector, host) = connected().await;
    let rpcs_before = connector.device.rpcs.lock().len();

    let result = bridge
        .execute(Action::Snapshot {
            mixer: 0,
            kind: SnapshotType::Channel,
            id: "12".to_string(),
            fader: None,
        })
        .await;

    assert!(result.is_err());
    assert_eq!(host.status().map(|(s, _)| s), Some(InstanceStatus::BadConfig));
    assert_eq!(connector.device.rpcs.lock().len(), rpcs_before);

    // mixer snapshots need no fader and write no variable
    bridge
        .execute(Action::Snapshot {
            mixer: 0,
            kind: SnapshotType::Mixer,
            id: "3".to_string(),
            fader: None,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_generic_action_coerces_and_stores_ack() {
    let (bridge, connector, host) = connected().await;

    bridge
        .execute(Action::GenericAction {
            path: "/control/logics/4/value".to_string(),
            value: "true".to_string(),
            readonly: false,
            variable: Some(2),
        })
        .await
        .unwrap();

    assert_eq!(connector.device.read("/control/logics/4/value"), Some(json!(true)));
    assert_eq!(host.get_value("generic-action-2"), Some(json!(true)));

    let sets_before = connector.device.sets.lock().len();
    bridge
        .execute(Action::GenericAction {
            path: "/control/logics/4/value".to_string(),
            value: "false".to_string(),
            readonly: true,
            variable: Some(2),
        })
        .await
        .unwrap();
    assert_eq!(connector.device.sets.lock().len(), sets_before);

    let missing = bridge
        .execute(Action::GenericAction {
            path: String::new(),
            value: "1".to_string(),
            readonly: false,
            variable: None,
        })
        .await;
    assert!(missing.is_err());
    assert_eq!(
        host.status(),
        Some((InstanceStatus::BadConfig, Some("options is missing".to_string())))
    );
}

#[tokio::test]
async fn test_generic_watch_follows_latest_path() {
    let (bridge, connector, host) = connected().await;

    bridge.watch_generic("/audio/pots/1/value", Some(1)).await.unwrap();
    assert_eq!(host.get_value("generic-action-1"), Some(json!(2)));

    connector.push(json!({"audio": {"pots": {"1": {"value": 5}}}}));
    assert_eq!(host.get_value("generic-action-1"), Some(json!(5)));
    // the pot variable shares the path
    assert_eq!(number(&host, "pot_value_1"), Some(5.0));

    bridge.watch_generic("/control/logics/4/value", Some(1)).await.unwrap();
    assert_eq!(host.get_value("generic-action-1"), Some(json!(false)));

    connector.push(json!({"audio": {"pots": {"1": {"value": 6}}}}));
    assert_eq!(host.get_value("generic-action-1"), Some(json!(false)));

    // two generic mirrors can be live together
    bridge.watch_generic("/audio/pots/1/value", Some(2)).await.unwrap();
    connector.push(json!({
        "audio": {"pots": {"1": {"value": 8}}},
        "control": {"logics": {"4": {"value": true}}}
    }));
    assert_eq!(host.get_value("generic-action-1"), Some(json!(true)));
    assert_eq!(host.get_value("generic-action-2"), Some(json!(8)));
}

#[tokio::test]
async fn test_generic_watch_survives_reconfigure() {
    let (bridge, connector, host) = connected().await;
    bridge.watch_generic("/audio/pots/1/value", Some(3)).await.unwrap();

    bridge.configure(make_config()).unwrap().await.unwrap();

    let subscriptions = connector.device.subscriptions.lock().clone();
    let count = subscriptions
        .iter()
        .filter(|p| p.as_str() == "/audio/pots/1/value")
        .count();
    assert!(count >= 2);

    connector.push(json!({"audio": {"pots": {"1": {"value": 9}}}}));
    assert_eq!(host.get_value("generic-action-3"), Some(json!(9)));
}

#[tokio::test]
async fn test_single_binding_on_sparse_device() {
    let connector = MockConnector::new(MockDevice::new(json!({
        "audio": {"mixers": {}},
        "control": {"logics": {}}
    })));
    let host = Arc::new(ConsoleHost::new());
    let bridge = Bridge::new(connector.clone(), host.clone());

    bridge.registry().write().bind(
        "/audio/mixers/0/faders/3/on",
        Binding::new("channel_fader_3", ValueKind::Boolean),
    );
    // channels and pots are missing, the remaining catalogs are empty
    bridge.configure(make_config()).unwrap().await.unwrap();
    assert_eq!(host.status(), Some((InstanceStatus::Ok, None)));
    let recomputes = host.recompute_count();

    connector.push(json!({"audio": {"mixers": {"0": {"faders": {"3": {"on": true}}}}}}));

    assert_eq!(host.get_value("channel_fader_3"), Some(json!(true)));
    assert_eq!(host.recompute_count(), recomputes + 1);
}

#[tokio::test]
async fn test_action_before_configure_is_rejected() {
    let connector = MockConnector::new(make_device());
    let host = Arc::new(ConsoleHost::new());
    let bridge = Bridge::new(connector, host.clone());

    let result = bridge
        .execute(Action::Logic { logic: "4".to_string(), mode: SwitchMode::Toggle })
        .await;

    assert!(matches!(result, Err(SyncError::NotConnected)));
    assert!(host.status().is_none());
}

#[tokio::test]
async fn test_transport_failure_is_unknown_error() {
    let (bridge, connector, host) = connected().await;
    connector.device.fail_path(
        "/control/logics/4/value",
        TransportError::Api { code: 403, message: "logic is locked".to_string() },
    );

    let result = bridge
        .execute(Action::Logic { logic: "4".to_string(), mode: SwitchMode::On })
        .await;

    assert!(matches!(result, Err(SyncError::Transport(_))));
    assert_eq!(
        host.status(),
        Some((InstanceStatus::UnknownError, Some("logic is locked".to_string())))
    );
    assert_eq!(host.get_value("logic_4"), Some(json!(false)));
}

#[tokio::test]
async fn test_teardown_drops_late_pushes() {
    let (bridge, connector, host) = connected().await;

    bridge.teardown().await;
    connector.push(json!({"control": {"logics": {"4": {"value": true}}}}));

    assert_eq!(host.get_value("logic_4"), Some(json!(false)));
    assert_eq!(host.status(), Some((InstanceStatus::Disconnected, None)));
    assert!(matches!(
        bridge.execute(Action::Logic { logic: "4".to_string(), mode: SwitchMode::On }).await,
        Err(SyncError::NotConnected)
    ));
}

#[tokio::test]
async fn test_push_during_bootstrap_beats_fetched_catalog() {
    let device = make_device();
    device.push_on_subscribe(
        "/audio/mixers/0/faders/1/on",
        json!({"audio": {"mixers": {"0": {"faders": {"1": {"on": true}}}}}}),
    );
    device.push_on_subscribe(
        "/control/logics/4/value",
        json!({"control": {"logics": {"4": {"value": true}}}}),
    );
    let connector = MockConnector::new(device);
    let host = Arc::new(ConsoleHost::new());
    let bridge = Bridge::new(connector.clone(), host.clone());

    bridge.configure(make_config()).unwrap().await.unwrap();

    assert_eq!(host.status(), Some((InstanceStatus::Ok, None)));
    // the catalog said false for both
    assert_eq!(host.get_value("channel_fader_1"), Some(json!(true)));
    assert_eq!(host.get_value("logic_4"), Some(json!(true)));
    // untouched paths keep their fetched values
    assert_eq!(host.get_value("fader_pfl_1"), Some(json!(false)));
    assert_eq!(host.get_value("channel_fader_3"), Some(json!(true)));
}

#[tokio::test]
async fn test_attempt_superseded_mid_bootstrap_writes_nothing() {
    let connector = MockConnector::new(make_device());
    let host = Arc::new(ConsoleHost::new());
    let bridge = Bridge::new(connector.clone(), host.clone());

    let release = connector.device.gate_get("/audio/pots");
    let first = bridge.configure(make_config()).unwrap();
    while !connector.device.gets.lock().iter().any(|p| p == "/audio/pots") {
        tokio::task::yield_now().await;
    }

    let mut config = make_config();
    config.generic_actions_num = 2;
    bridge.configure(config).unwrap().await.unwrap();
    assert_eq!(host.status(), Some((InstanceStatus::Ok, None)));

    let history = host.status_history();
    let writes = host.write_count();
    let recomputes = host.recompute_count();
    let bindings = bridge.registry().read().len();
    let variables = host.variable_definitions();

    let _ = release.send(());
    first.await.unwrap();

    assert_eq!(host.status_history(), history);
    assert_eq!(host.write_count(), writes);
    assert_eq!(host.recompute_count(), recomputes);
    assert_eq!(bridge.registry().read().len(), bindings);
    assert_eq!(host.variable_definitions(), variables);
    assert!(!variables.iter().any(|v| v.variable_id == "generic-action-3"));
    assert_eq!(bridge.catalog().channels.len(), 2);
}
