// src/core/reconcile/balance.rs

//! Deterministic partitioning of a group's producers across its ready
//! aggregators.

use crate::core::topology::Producer;
use indexmap::IndexMap;

/// Splits `producers` across `ready` aggregators in declared order.
///
/// With `p` producers and `a` ready aggregators, the first `p mod a`
/// aggregators receive `p div a + 1` consecutive producers and the rest
/// receive `p div a`. Producers keep their declared order, so two calls with
/// identical inputs yield identical assignments.
pub fn partition(producers: &[Producer], ready: &[String]) -> IndexMap<String, Vec<String>> {
    let mut assignment = IndexMap::new();
    if ready.is_empty() {
        return assignment;
    }

    let base = producers.len() / ready.len();
    let extra = producers.len() % ready.len();

    let mut cursor = 0;
    for (rank, agg) in ready.iter().enumerate() {
        let take = base + usize::from(rank < extra);
        let names = producers[cursor..cursor + take]
            .iter()
            .map(|p| p.name.clone())
            .collect();
        cursor += take;
        assignment.insert(agg.clone(), names);
    }
    assignment
}
