//! Property tests for the indexed agenda heap.
//!
//! Random add/pop/remove/rescore sequences are replayed against the agenda
//! and against a plain map; after every step the heap order and both reverse
//! indices must hold and the pending sets must agree.

use std::collections::{BTreeSet, HashMap};

use proptest::prelude::*;

use uberts::adjoints::{Adjoints, Constant};
use uberts::agenda::Agenda;
use uberts::hypergraph::{EdgeId, HypEdge, NodeId, Partition, Value};
use uberts::store::GraphStore;

const EDGES: usize = 12;

#[derive(Debug, Clone)]
enum Op {
    Add(usize, i32),
    Pop,
    Remove(usize),
    Rescore(usize, i32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..EDGES, -50..50i32).prop_map(|(e, s)| Op::Add(e, s)),
        2 => Just(Op::Pop),
        1 => (0..EDGES).prop_map(Op::Remove),
        1 => (0..EDGES, -50..50i32).prop_map(|(e, s)| Op::Rescore(e, s)),
    ]
}

/// `succ(i, i+1)` edges over a short sentence, so neighbors share nodes.
fn fixture() -> (GraphStore, Vec<(EdgeId, HypEdge)>) {
    let mut g = GraphStore::new();
    let succ = g
        .schema_mut()
        .add_relation_by_names("succ", &["tokenIndex", "tokenIndex"])
        .unwrap();
    let edges = (0..EDGES as i64)
        .map(|i| {
            let id = g
                .make_edge_from_values(succ, &[Value::Int(i % 5), Value::Int(i % 5 + 1 + i / 5)], Partition::Temporary)
                .unwrap();
            (id, g.edge(id).unwrap().clone())
        })
        .collect();
    (g, edges)
}

fn check(agenda: &Agenda, model: &HashMap<EdgeId, f64>, edges: &[(EdgeId, HypEdge)]) -> Result<(), TestCaseError> {
    prop_assert!(agenda.check_invariants().is_ok(), "{:?}", agenda.check_invariants());
    prop_assert_eq!(agenda.len(), model.len());
    for (id, priority) in model {
        prop_assert_eq!(agenda.priority_of(*id), Some(*priority));
    }

    let mut nodes: BTreeSet<NodeId> = BTreeSet::new();
    for (_, e) in edges {
        nodes.extend(e.endpoints().map(|(n, _)| n));
    }
    for node in nodes {
        let mut expected: Vec<EdgeId> = edges
            .iter()
            .filter(|(id, e)| model.contains_key(id) && e.endpoints().any(|(n, _)| n == node))
            .map(|(id, _)| *id)
            .collect();
        expected.sort_unstable();
        prop_assert_eq!(agenda.adjacent(node), expected);
    }
    Ok(())
}

proptest! {
    #[test]
    fn agenda_matches_model(ops in prop::collection::vec(op(), 1..80)) {
        let (_graph, edges) = fixture();
        let mut agenda = Agenda::new();
        let mut model: HashMap<EdgeId, f64> = HashMap::new();

        for op in ops {
            match op {
                Op::Add(i, s) => {
                    let (id, edge) = &edges[i];
                    let result = agenda.add(*id, edge, Constant::boxed(s as f64), s as f64);
                    prop_assert_eq!(result.is_ok(), !model.contains_key(id));
                    model.entry(*id).or_insert(s as f64);
                }
                Op::Pop => {
                    let result = agenda.pop();
                    match model.values().copied().reduce(f64::max) {
                        None => prop_assert!(result.is_err()),
                        Some(best) => {
                            let item = result.unwrap();
                            prop_assert_eq!(item.priority, best);
                            prop_assert_eq!(item.score.forwards(), best);
                            prop_assert_eq!(model.remove(&item.edge), Some(best));
                        }
                    }
                }
                Op::Remove(i) => {
                    let id = edges[i].0;
                    let result = agenda.remove(id);
                    prop_assert_eq!(result.is_ok(), model.remove(&id).is_some());
                }
                Op::Rescore(i, s) => {
                    let id = edges[i].0;
                    let result = agenda.rescore(id, Constant::boxed(s as f64), s as f64);
                    match model.get_mut(&id) {
                        Some(p) => {
                            prop_assert_eq!(result.unwrap().forwards(), *p);
                            *p = s as f64;
                        }
                        None => prop_assert!(result.is_err()),
                    }
                }
            }
            check(&agenda, &model, &edges)?;
        }
    }

    #[test]
    fn draining_yields_non_increasing_priorities(scores in prop::collection::vec(-100..100i32, 0..EDGES)) {
        let (_graph, edges) = fixture();
        let mut agenda = Agenda::new();
        for ((id, edge), s) in edges.iter().zip(&scores) {
            agenda.add(*id, edge, Constant::boxed(*s as f64), *s as f64).unwrap();
        }
        let mut last = f64::INFINITY;
        while !agenda.is_empty() {
            let item = agenda.pop().unwrap();
            prop_assert!(item.priority <= last);
            last = item.priority;
        }
        prop_assert!(agenda.check_invariants().is_ok());
    }
}
