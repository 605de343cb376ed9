// tests/unit_controller_test.rs

use conductor::core::comm::Communicator;
use conductor::core::controller::{self, ControlState};
use conductor::core::reconcile::CommSet;
use conductor::core::topology::{Host, SamplerGroup, SamplerPlugin};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[path = "support/mock.rs"]
mod mock;
#[path = "support/fixtures.rs"]
mod fixtures;

fn refusing_connector(_: &Host) -> Box<dyn Communicator + Send> {
    mock::unreachable_peer().0
}

#[tokio::test]
async fn test_restart_samplers_stops_previous_plugins() {
    // On a description change the old sampler plugins are stopped before
    // the next pass starts the new set.
    let mut previous = fixtures::fleet(1, 2);
    previous.samplers.insert(
        "node-[01-02]".to_string(),
        SamplerGroup {
            names: "node-[01-02]".to_string(),
            plugins: vec![SamplerPlugin {
                name: "meminfo".to_string(),
                interval: "1.0s:0ms".to_string(),
                conf: IndexMap::new(),
            }],
        },
    );
    let mut current = fixtures::fleet(1, 2);
    current.samplers.insert(
        "node-[01-02]".to_string(),
        SamplerGroup {
            names: "node-[01-02]".to_string(),
            plugins: vec![SamplerPlugin {
                name: "vmstat".to_string(),
                interval: "1.0s:0ms".to_string(),
                conf: IndexMap::new(),
            }],
        },
    );

    let mut comms = CommSet::new();
    let mut handles = HashMap::new();
    for node in ["node-01", "node-02"] {
        let (comm, inner) = mock::mock_peer("running");
        // The previous pass left meminfo loaded and sampling.
        {
            let mut peer = inner.lock().unwrap();
            peer.plugins.insert("meminfo".to_string());
            peer.started_samplers.insert("meminfo".to_string());
        }
        comms.insert(node.to_string(), comm);
        handles.insert(node.to_string(), inner);
    }

    controller::restart_samplers(&previous, &current, &mut comms, &refusing_connector).await;

    for node in ["node-01", "node-02"] {
        let peer = handles[node].lock().unwrap();
        assert!(
            peer.log.contains(&"plugn_stop meminfo".to_string()),
            "{node}: {:?}",
            peer.log
        );
        assert!(!peer.plugins.contains("meminfo"));
        assert!(peer.started_samplers.is_empty());
    }
}

async fn ready_control_state(
    aggs: usize,
    prods: usize,
) -> (ControlState, HashMap<String, Arc<Mutex<mock::MockInner>>>) {
    let desired = fixtures::fleet(aggs, prods);
    let mut comms = CommSet::new();
    let mut handles = HashMap::new();
    for agg in &desired.aggregators["l1"] {
        let (comm, inner) = mock::mock_peer("ready");
        comms.insert(agg.name.clone(), comm);
        handles.insert(agg.name.clone(), inner);
    }
    (
        ControlState {
            desired,
            comms,
            last_agg_state: IndexMap::new(),
            store_dirty: true,
        },
        handles,
    )
}

#[tokio::test]
async fn test_cycle_reconciles_when_dirty() {
    let (mut control, handles) = ready_control_state(2, 4).await;

    controller::run_cycle(&mut control).await;

    assert!(!control.store_dirty);
    assert_eq!(control.last_agg_state.len(), 2);
    let started: usize = handles
        .values()
        .map(|inner| {
            inner
                .lock()
                .unwrap()
                .producers
                .iter()
                .filter(|(_, state)| state == "RUNNING")
                .count()
        })
        .sum();
    assert_eq!(started, 4);
}

#[tokio::test]
async fn test_cycle_skips_pass_when_nothing_changed() {
    let (mut control, handles) = ready_control_state(2, 4).await;
    controller::run_cycle(&mut control).await;
    for inner in handles.values() {
        inner.lock().unwrap().log.clear();
    }

    // Same health snapshot, no datastore change: only the sweep runs.
    controller::run_cycle(&mut control).await;
    for (name, inner) in &handles {
        assert!(inner.lock().unwrap().log.is_empty(), "{name}");
    }

    // A datastore change forces a pass again, absorbed as benign.
    control.store_dirty = true;
    controller::run_cycle(&mut control).await;
    assert!(!control.store_dirty);
}

#[tokio::test]
async fn test_cycle_reconciles_on_state_transition() {
    let (mut control, handles) = ready_control_state(2, 6).await;
    controller::run_cycle(&mut control).await;

    // One aggregator goes away; the next cycle must rebalance.
    handles["agg-02"].lock().unwrap().fail_status = true;
    controller::run_cycle(&mut control).await;

    let survivor_running = handles["agg-01"]
        .lock()
        .unwrap()
        .producers
        .iter()
        .filter(|(_, state)| state == "RUNNING")
        .count();
    assert_eq!(survivor_running, 6);
}
