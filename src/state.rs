//! The committed fact store.
//!
//! [`State`] is an adjacency index from nodes to incident edges. An edge is
//! incident to its head and to every tail node, so each committed fact is
//! reachable from all of its endpoints. Within a run the store only grows;
//! there is no removal. Between documents the temporary facts are dropped
//! in bulk while schema facts stay.

use std::collections::{HashMap, HashSet};

use crate::hypergraph::{EdgeId, HNode, HypEdge, NodeId};
use crate::schema::{ArgPos, RelationId};

/// Append-only fact store indexed by node adjacency.
#[derive(Debug, Default)]
pub struct State {
    incident: HashMap<NodeId, Vec<(EdgeId, ArgPos)>>,
    edges: HashMap<EdgeId, HypEdge>,
    /// Commit order.
    order: Vec<EdgeId>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `edge` under all of its endpoints.
    ///
    /// Returns `false` (and changes nothing) if the edge is already committed.
    pub fn add(&mut self, id: EdgeId, edge: &HypEdge) -> bool {
        if self.edges.contains_key(&id) {
            return false;
        }
        for (node, pos) in edge.endpoints() {
            self.incident.entry(node).or_default().push((id, pos));
        }
        self.edges.insert(id, edge.clone());
        self.order.push(id);
        true
    }

    pub fn contains(&self, id: EdgeId) -> bool {
        self.edges.contains_key(&id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&HypEdge> {
        self.edges.get(&id)
    }

    /// Edges incident to `node`, with the position `node` holds in each.
    pub fn incident(&self, node: NodeId) -> &[(EdgeId, ArgPos)] {
        self.incident.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Graph-view neighbors: incident edges of a node, or the head and tail
    /// of an edge.
    pub fn neighbors(&self, hnode: HNode) -> Vec<HNode> {
        self.neighbor_links(hnode)
            .into_iter()
            .map(|(n, _)| n)
            .collect()
    }

    /// Like [`State::neighbors`], but each neighbor carries the argument
    /// position linking it to `hnode`.
    ///
    /// For a node, the position is where the node sits in the neighboring
    /// edge. For an edge, it is where the neighboring node sits in the edge.
    pub fn neighbor_links(&self, hnode: HNode) -> Vec<(HNode, ArgPos)> {
        match hnode {
            HNode::Node(n) => self
                .incident(n)
                .iter()
                .map(|&(e, pos)| (HNode::Edge(e), pos))
                .collect(),
            HNode::Edge(e) => match self.edges.get(&e) {
                Some(edge) => edge
                    .endpoints()
                    .map(|(n, pos)| (HNode::Node(n), pos))
                    .collect(),
                None => Vec::new(),
            },
        }
    }

    /// Committed edges in commit order.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &HypEdge)> {
        self.order.iter().filter_map(|id| self.edges.get(id).map(|e| (*id, e)))
    }

    /// Committed edges of one relation, in commit order.
    pub fn edges_of(&self, relation: RelationId) -> impl Iterator<Item = (EdgeId, &HypEdge)> {
        self.edges().filter(move |(_, e)| e.relation == relation)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Drop every fact.
    pub fn clear(&mut self) {
        self.incident.clear();
        self.edges.clear();
        self.order.clear();
    }

    /// Drop temporary facts, keeping schema facts and their adjacency.
    pub fn clear_temporary(&mut self) {
        let dropped: HashSet<EdgeId> = self
            .order
            .iter()
            .copied()
            .filter(|id| !id.is_schema())
            .collect();
        if dropped.is_empty() {
            return;
        }
        self.order.retain(|id| id.is_schema());
        self.edges.retain(|id, _| id.is_schema());
        self.incident.retain(|node, links| {
            if !node.is_schema() {
                return false;
            }
            links.retain(|(e, _)| !dropped.contains(e));
            !links.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypergraph::{Partition, Value};
    use crate::store::GraphStore;

    fn setup() -> (GraphStore, RelationId) {
        let mut graph = GraphStore::new();
        let succ = graph
            .schema_mut()
            .add_relation_by_names("succ", &["tokenIndex", "tokenIndex"])
            .unwrap();
        (graph, succ)
    }

    fn succ_edge(graph: &mut GraphStore, rel: RelationId, a: i64, b: i64, p: Partition) -> (EdgeId, HypEdge) {
        let id = graph
            .make_edge_from_values(rel, &[Value::Int(a), Value::Int(b)], p)
            .unwrap();
        (id, graph.edge(id).unwrap().clone())
    }

    #[test]
    fn edge_is_reachable_from_every_endpoint() {
        let (mut graph, succ) = setup();
        let (id, edge) = succ_edge(&mut graph, succ, 0, 1, Partition::Temporary);
        let mut state = State::new();
        assert!(state.add(id, &edge));

        for (node, _) in edge.endpoints() {
            assert!(state.neighbors(HNode::Node(node)).contains(&HNode::Edge(id)));
        }
        let ends = state.neighbors(HNode::Edge(id));
        assert_eq!(ends.len(), 3);
        assert_eq!(ends[0], HNode::Node(edge.head));
    }

    #[test]
    fn neighbor_links_report_positions() {
        let (mut graph, succ) = setup();
        let (id, edge) = succ_edge(&mut graph, succ, 0, 1, Partition::Temporary);
        let mut state = State::new();
        state.add(id, &edge);
        let links = state.neighbor_links(HNode::Node(edge.tail[1]));
        assert_eq!(links, vec![(HNode::Edge(id), ArgPos::Tail(1))]);
    }

    #[test]
    fn adding_twice_is_a_noop() {
        let (mut graph, succ) = setup();
        let (id, edge) = succ_edge(&mut graph, succ, 0, 1, Partition::Temporary);
        let mut state = State::new();
        assert!(state.add(id, &edge));
        assert!(!state.add(id, &edge));
        assert_eq!(state.len(), 1);
        assert_eq!(state.incident(edge.head).len(), 1);
    }

    #[test]
    fn facts_stay_discoverable_as_state_grows() {
        let (mut graph, succ) = setup();
        let mut state = State::new();
        let mut committed = Vec::new();
        for i in 0..20 {
            let (id, edge) = succ_edge(&mut graph, succ, i, i + 1, Partition::Temporary);
            state.add(id, &edge);
            committed.push((id, edge));
            for (old_id, old_edge) in &committed {
                for (node, _) in old_edge.endpoints() {
                    assert!(state.neighbors(HNode::Node(node)).contains(&HNode::Edge(*old_id)));
                }
            }
        }
        assert_eq!(state.edges_of(succ).count(), 20);
    }

    #[test]
    fn clear_temporary_keeps_schema_facts() {
        let (mut graph, succ) = setup();
        let (s, schema_edge) = succ_edge(&mut graph, succ, 0, 1, Partition::Schema);
        let (t, temp_edge) = succ_edge(&mut graph, succ, 1, 2, Partition::Temporary);
        let mut state = State::new();
        state.add(s, &schema_edge);
        state.add(t, &temp_edge);

        // Node 1 is a schema node touched by both facts.
        let shared = schema_edge.tail[1];
        assert_eq!(state.incident(shared).len(), 2);

        state.clear_temporary();
        assert!(state.contains(s));
        assert!(!state.contains(t));
        assert_eq!(state.incident(shared), &[(s, ArgPos::Tail(1))]);
        assert!(state.incident(temp_edge.head).is_empty());
    }
}
