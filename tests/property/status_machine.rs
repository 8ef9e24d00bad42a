use proptest::prelude::*;
use studiograph::dag::StateManager;
use studiograph::dag::status::{NodeStatus, validate_status_transition};
use studiograph::graph::{GraphSnapshot, Node, NodeKind, NodeParams};

fn status_strategy() -> impl Strategy<Value = NodeStatus> {
    proptest::sample::select(NodeStatus::ALL.to_vec())
}

fn fresh_node(id: &str) -> Node {
    Node::new(id, NodeKind::Text, id, NodeParams::Text(Default::default()))
}

proptest! {
    // Whatever is attempted, a node only ever moves along legal edges and a
    // rejected attempt leaves it where it was.
    #[test]
    fn node_status_only_follows_legal_edges(
        attempts in proptest::collection::vec(status_strategy(), 0..40)
    ) {
        let mut node = fresh_node("node_0000000000000001");
        for to in attempts {
            let from = node.status();
            match node.set_status(to) {
                Ok(()) => {
                    prop_assert!(validate_status_transition(from, to).is_ok());
                    prop_assert_eq!(node.status(), to);
                }
                Err(err) => {
                    prop_assert_eq!(node.status(), from);
                    prop_assert_eq!(err.from, from);
                    prop_assert!(!from.legal_next().contains(&to));
                }
            }
        }
    }

    // From any reachable status except running, the requeue path ends in
    // queued.
    #[test]
    fn requeue_works_from_every_reachable_status(
        attempts in proptest::collection::vec(status_strategy(), 0..40)
    ) {
        let mut node = fresh_node("node_0000000000000002");
        for to in attempts {
            let _ = node.set_status(to);
        }
        let id = node.id.clone();
        let ended_running = node.status() == NodeStatus::Running;

        let snapshot = GraphSnapshot::new([(id.clone(), node)].into_iter().collect(), vec![]);
        let mut state = StateManager::from_snapshot(&snapshot);
        let result = state.requeue(&id);

        if ended_running {
            prop_assert!(result.is_err());
            prop_assert_eq!(state.status_of(&id), Some(NodeStatus::Running));
        } else {
            prop_assert!(result.is_ok());
            prop_assert_eq!(state.status_of(&id), Some(NodeStatus::Queued));
        }
    }
}
