use std::collections::{BTreeMap, HashSet, VecDeque};

use proptest::prelude::*;
use serde_json::json;
use studiograph::dag::{DagGraph, compute_levels};
use studiograph::graph::ids::port_id;
use studiograph::graph::validate::{ConnectionError, ConnectionRequest};
use studiograph::graph::{Edge, GraphStore, NodeKind};
use studiograph::types::{Cardinality, PortDirection, compatible};

// A node's kind plus the input ports an attempt may target.
const KINDS: &[(&str, &str, &[&str])] = &[
    ("text", "text", &["prompt", "context"]),
    ("image", "image", &["prompt", "reference"]),
    ("combine", "combined", &["inputs"]),
];

// Nodes are picked by index into KINDS; attempts are (source, target, port).
fn scenario() -> impl Strategy<Value = (Vec<usize>, Vec<(usize, usize, usize)>)> {
    (2..8usize).prop_flat_map(|n| {
        (
            proptest::collection::vec(0..KINDS.len(), n),
            proptest::collection::vec((0..n, 0..n, 0..2usize), 0..40),
        )
    })
}

fn store_with(kinds: &[usize]) -> (GraphStore, Vec<String>) {
    let mut store = GraphStore::new();
    let ids = kinds
        .iter()
        .enumerate()
        .map(|(i, k)| {
            store
                .create_node(NodeKind::from(KINDS[*k].0), &format!("n{i}"), json!({}))
                .unwrap()
        })
        .collect();
    (store, ids)
}

fn request(kinds: &[usize], ids: &[String], (s, t, p): (usize, usize, usize)) -> ConnectionRequest {
    let out_port = KINDS[kinds[s]].1;
    let in_ports = KINDS[kinds[t]].2;
    ConnectionRequest::new(
        &ids[s],
        port_id(&ids[s], PortDirection::Output, out_port),
        &ids[t],
        port_id(&ids[t], PortDirection::Input, in_ports[p % in_ports.len()]),
    )
}

// Breadth-first search over edge endpoints, independent of the validator.
fn reaches(edges: &[Edge], from: &str, to: &str) -> bool {
    let mut seen = HashSet::from([from.to_string()]);
    let mut queue = VecDeque::from([from.to_string()]);
    while let Some(node) = queue.pop_front() {
        if node == to {
            return true;
        }
        for edge in edges.iter().filter(|e| e.source.node == node) {
            if seen.insert(edge.target.node.clone()) {
                queue.push_back(edge.target.node.clone());
            }
        }
    }
    false
}

proptest! {
    // A cycle is reported exactly when the target already reaches the
    // source and every earlier check passes; otherwise such an edge is
    // accepted. The resulting store is a DAG whose edges respect types,
    // cardinality and uniqueness.
    #[test]
    fn cycle_verdict_matches_reachability((kinds, attempts) in scenario()) {
        let (mut store, ids) = store_with(&kinds);

        for attempt in attempts {
            let (s, t, _) = attempt;
            let req = request(&kinds, &ids, attempt);
            let verdict = store.validate_connection(&req);

            if s == t {
                let is_self = matches!(verdict.error, Some(ConnectionError::SelfConnection { .. }));
                prop_assert!(is_self);
                continue;
            }

            let snapshot = store.snapshot();
            let source_port = req.source_port.as_deref().unwrap();
            let target_port = req.target_port.as_deref().unwrap();
            let source = snapshot.node(&ids[s]).unwrap().output_port(source_port).unwrap();
            let target = snapshot.node(&ids[t]).unwrap().input_port(target_port).unwrap();
            let edges = &snapshot.edges;

            let rejected_earlier = !compatible(source.datatype, target.datatype)
                || (source.cardinality == Cardinality::One
                    && edges.iter().any(|e| e.source.port == source_port))
                || (target.cardinality == Cardinality::One
                    && edges.iter().any(|e| e.target.port == target_port))
                || edges
                    .iter()
                    .any(|e| e.source.port == source_port && e.target.port == target_port);
            let closes_cycle = reaches(edges, &ids[t], &ids[s]);

            if rejected_earlier {
                prop_assert!(!verdict.valid);
                let is_cycle = matches!(verdict.error, Some(ConnectionError::Cycle { .. }));
                prop_assert!(!is_cycle);
            } else if closes_cycle {
                match &verdict.error {
                    Some(ConnectionError::Cycle { path }) => {
                        prop_assert_eq!(path.first(), Some(&ids[s]));
                        prop_assert_eq!(path.get(1), Some(&ids[t]));
                        prop_assert_eq!(path.last(), Some(&ids[s]));
                    }
                    other => prop_assert!(false, "expected a cycle, got {:?}", other),
                }
            } else {
                prop_assert!(verdict.valid, "rejected: {:?}", verdict.error);
            }

            let before = store.edges().len();
            match store.add_edge(req) {
                Ok(_) => {
                    prop_assert!(verdict.valid);
                    prop_assert_eq!(store.edges().len(), before + 1);
                }
                Err(_) => {
                    prop_assert!(!verdict.valid);
                    prop_assert_eq!(store.edges().len(), before);
                }
            }
        }

        let snapshot = store.snapshot();
        let levels = compute_levels(&DagGraph::from_snapshot(&snapshot).unwrap());
        prop_assert!(levels.is_ok());
        let levels = levels.unwrap();

        let mut pairs = HashSet::new();
        let mut fan_in: BTreeMap<&str, usize> = BTreeMap::new();
        for edge in &snapshot.edges {
            prop_assert_ne!(&edge.source.node, &edge.target.node);
            prop_assert!(pairs.insert((&edge.source.port, &edge.target.port)));
            prop_assert!(
                levels.level_of(&edge.source.node) < levels.level_of(&edge.target.node)
            );

            let source = snapshot.node(&edge.source.node).unwrap();
            let target = snapshot.node(&edge.target.node).unwrap();
            let out = source.output_port(&edge.source.port).unwrap();
            let inp = target.input_port(&edge.target.port).unwrap();
            prop_assert!(compatible(out.datatype, inp.datatype));

            if inp.cardinality == Cardinality::One {
                *fan_in.entry(edge.target.port.as_str()).or_default() += 1;
            }
        }
        prop_assert!(fan_in.values().all(|n| *n <= 1));
    }

    // Validating never changes the store and gives the same verdict twice.
    #[test]
    fn validation_is_read_only((kinds, attempts) in scenario()) {
        let (mut store, ids) = store_with(&kinds);
        let (setup, checks) = attempts.split_at(attempts.len() / 2);
        for attempt in setup {
            let _ = store.add_edge(request(&kinds, &ids, *attempt));
        }
        let before = store.snapshot();

        for attempt in checks {
            let req = request(&kinds, &ids, *attempt);
            let first = store.validate_connection(&req);
            let second = store.validate_connection(&req);
            prop_assert_eq!(first, second);
            prop_assert_eq!(store.snapshot(), before.clone());
        }
        prop_assert_eq!(store.snapshot(), before);
    }
}
