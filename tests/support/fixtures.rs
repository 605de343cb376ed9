// tests/support/fixtures.rs

//! Builders for small desired-state snapshots used across the test suite.

use conductor::core::topology::{
    AggState, Aggregator, Auth, DesiredState, Host, Producer, ProducerMatch, ProducerType,
    SetMatch, Updater,
};

pub fn host(name: &str, addr: &str, port: u16) -> Host {
    Host {
        name: name.to_string(),
        addr: addr.to_string(),
        port,
        xprt: "sock".to_string(),
        auth: Auth::none(),
    }
}

/// A single-tier fleet: one aggregator group "l1" with `aggs` members, `prods`
/// producers pulling into it, and one catch-all updater.
pub fn fleet(aggs: usize, prods: usize) -> DesiredState {
    let mut state = DesiredState::default();

    for i in 1..=aggs {
        let agg_host = format!("agg-host-{i:02}");
        state
            .hosts
            .insert(agg_host.clone(), host(&agg_host, &format!("10.1.0.{i}"), 10411));
        state
            .aggregators
            .entry("l1".to_string())
            .or_default()
            .push(Aggregator {
                name: format!("agg-{i:02}"),
                host: agg_host,
                state: AggState::Stopped,
            });
    }

    let mut producers = Vec::new();
    for i in 1..=prods {
        let node = format!("node-{i:02}");
        state
            .hosts
            .insert(node.clone(), host(&node, &format!("10.2.0.{i}"), 10001));
        producers.push(Producer {
            name: node.clone(),
            host: node,
            group: "l1".to_string(),
            ptype: ProducerType::Active,
            reconnect: "20s".to_string(),
            updaters: vec!["all".to_string()],
        });
    }
    state.producers.insert("l1".to_string(), producers);

    state.updaters.insert(
        "l1".to_string(),
        vec![Updater {
            name: "all".to_string(),
            group: "l1".to_string(),
            interval: "1.0s".to_string(),
            auto: None,
            push: None,
            sets: vec![SetMatch {
                regex: ".*".to_string(),
                field: None,
            }],
            producers: vec![ProducerMatch {
                regex: ".*".to_string(),
            }],
        }],
    );

    state
}
