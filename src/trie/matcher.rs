//! Incremental pattern matching of newly committed facts against the trie.
//!
//! A match attempt starts at the head (witness) node of the committed edge and
//! runs a backtracking DFS over [`State`] that only follows neighbors whose
//! [`TKey`] has a child in the trie. [`TKey::GotoParent`] steps back to the
//! previous vertex on the traversal stack, so branching patterns need no
//! parent pointers.
//!
//! The walk tracks crossed links rather than visited vertices. A link is one
//! directed step between an edge and one of its argument nodes, and is crossed
//! at most once per traversal branch. A node can therefore be re-entered
//! through a different link, which is what lets two join variables bind the
//! same interned node. The set of links is finite, so the search stays finite
//! on cyclic hypergraphs.

use std::collections::HashSet;

use crate::error::{StoreError, StoreResult};
use crate::hypergraph::{EdgeId, HNode};
use crate::schema::ArgPos;
use crate::state::State;
use crate::store::GraphStore;

use super::{TKey, TNode, TVal};

/// A vertex bound while walking a trie path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Binding {
    pub key: TKey,
    pub hnode: HNode,
}

/// Counters for one match attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchStats {
    /// Recursive walk calls, including the root call.
    pub calls: usize,
    /// Vertices pushed onto the traversal stack.
    pub pushes: usize,
    /// Largest number of links crossed at once.
    pub max_crossed: usize,
    /// Completed patterns.
    pub matches: usize,
}

/// A directed step from one vertex to an incident one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Link {
    pub from: HNode,
    pub to: HNode,
    pub pos: ArgPos,
}

/// Per-attempt traversal bookkeeping.
#[derive(Debug)]
pub struct GraphTraversalTrace {
    stack: Vec<HNode>,
    crossed: HashSet<Link>,
    links: Vec<Link>,
    bindings: Vec<Binding>,
}

impl GraphTraversalTrace {
    /// A trace positioned on `start` with nothing crossed.
    pub fn new(start: HNode) -> Self {
        Self {
            stack: vec![start],
            crossed: HashSet::new(),
            links: Vec::new(),
            bindings: Vec::new(),
        }
    }

    pub fn stack(&self) -> &[HNode] {
        &self.stack
    }

    pub fn is_crossed(&self, link: &Link) -> bool {
        self.crossed.contains(link)
    }

    pub fn crossed_len(&self) -> usize {
        self.crossed.len()
    }

    /// Bindings in traversal order.
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Most recent vertex bound under `key`.
    pub fn get(&self, key: &TKey) -> Option<HNode> {
        self.bindings
            .iter()
            .rev()
            .find(|b| b.key == *key)
            .map(|b| b.hnode)
    }

    /// Cross `link` and bind its target under `key`. False if the link was
    /// already crossed, in which case nothing changes.
    fn push(&mut self, key: TKey, link: Link) -> bool {
        if !self.crossed.insert(link) {
            return false;
        }
        self.links.push(link);
        self.stack.push(link.to);
        self.bindings.push(Binding { key, hnode: link.to });
        true
    }

    fn pop(&mut self) {
        if let Some(link) = self.links.pop() {
            self.crossed.remove(&link);
        }
        self.stack.pop();
        self.bindings.pop();
    }
}

/// A completed pattern: what to fire and the vertices that completed it.
#[derive(Debug, Clone)]
pub struct Match {
    pub value: TVal,
    pub bindings: Vec<Binding>,
}

struct Walker<'a> {
    state: &'a State,
    graph: &'a GraphStore,
    trace: GraphTraversalTrace,
    stats: MatchStats,
    out: Vec<Match>,
}

impl TNode {
    /// Find every pattern completed by the committed edge `edge`.
    ///
    /// Matches are collected and returned instead of fired inline; the state
    /// is not modified during the traversal, so firing afterwards is
    /// equivalent. A trie with no path for the edge's relation yields nothing.
    pub fn match_edge(
        &self,
        state: &State,
        graph: &GraphStore,
        edge: EdgeId,
    ) -> StoreResult<(Vec<Match>, MatchStats)> {
        let head = state
            .edge(edge)
            .map(|e| e.head)
            .ok_or_else(|| StoreError::UnknownEdge {
                id: edge.to_string(),
            })?;
        let start = HNode::Node(head);
        let mut walker = Walker {
            state,
            graph,
            trace: GraphTraversalTrace::new(start),
            stats: MatchStats::default(),
            out: Vec::new(),
        };
        walker.walk(self, start)?;
        walker.stats.matches = walker.out.len();
        Ok((walker.out, walker.stats))
    }
}

impl Walker<'_> {
    fn walk(&mut self, tnode: &TNode, current: HNode) -> StoreResult<()> {
        self.stats.calls += 1;

        if let Some(value) = tnode.value() {
            self.out.push(Match {
                value: value.clone(),
                bindings: self.trace.bindings().to_vec(),
            });
        }
        if tnode.is_leaf() {
            return Ok(());
        }

        if let Some(child) = tnode.child(&TKey::GotoParent) {
            if let Some(top) = self.trace.stack.pop() {
                if let Some(&parent) = self.trace.stack.last() {
                    self.walk(child, parent)?;
                }
                self.trace.stack.push(top);
            }
        }

        for (neighbor, pos) in self.state.neighbor_links(current) {
            let link = Link {
                from: current,
                to: neighbor,
                pos,
            };
            if self.trace.is_crossed(&link) {
                continue;
            }
            let key = match neighbor {
                HNode::Edge(e) => {
                    let edge = self.state.edge(e).ok_or_else(|| StoreError::UnknownEdge {
                        id: e.to_string(),
                    })?;
                    TKey::Relation {
                        rel: edge.relation,
                        arg: pos,
                    }
                }
                HNode::Node(n) => TKey::NodeType {
                    ty: self.graph.node_type_of(n)?,
                    arg: pos,
                },
            };
            let Some(child) = tnode.child(&key) else {
                continue;
            };
            if !self.trace.push(key, link) {
                continue;
            }
            self.stats.pushes += 1;
            self.stats.max_crossed = self.stats.max_crossed.max(self.trace.crossed_len());
            let result = self.walk(child, neighbor);
            self.trace.pop();
            result?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::error::RuleResult;
    use crate::hypergraph::{Partition, Value};
    use crate::schema::{ArgPos, RelationId};
    use crate::store::GraphStore;
    use crate::trie::{Candidate, TransitionGenerator};

    #[derive(Debug)]
    struct Nop;

    impl TransitionGenerator for Nop {
        fn generate(&self, _: &[Binding], _: &mut GraphStore) -> RuleResult<Vec<Candidate>> {
            Ok(Vec::new())
        }

        fn name(&self) -> &str {
            "nop"
        }
    }

    struct Fixture {
        graph: GraphStore,
        state: State,
        succ: RelationId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut graph = GraphStore::new();
            let succ = graph
                .schema_mut()
                .add_relation_by_names("succ", &["tokenIndex", "tokenIndex"])
                .unwrap();
            Self {
                graph,
                state: State::new(),
                succ,
            }
        }

        fn commit(&mut self, a: i64, b: i64) -> EdgeId {
            let id = self
                .graph
                .make_edge_from_values(self.succ, &[Value::Int(a), Value::Int(b)], Partition::Temporary)
                .unwrap();
            let edge = self.graph.edge(id).unwrap().clone();
            self.state.add(id, &edge);
            id
        }

        fn token(&self) -> crate::schema::NodeTypeId {
            self.graph.schema().lookup_node_type("tokenIndex").unwrap()
        }
    }

    /// `succ(i,j) & succ(j,k)` rooted at the first term.
    fn chain_path(f: &Fixture) -> Vec<TKey> {
        vec![
            TKey::Relation { rel: f.succ, arg: ArgPos::Head },
            TKey::NodeType { ty: f.token(), arg: ArgPos::Tail(1) },
            TKey::Relation { rel: f.succ, arg: ArgPos::Tail(0) },
        ]
    }

    #[test]
    fn missing_pattern_matches_nothing() {
        let mut f = Fixture::new();
        let e = f.commit(0, 1);
        let trie = TNode::new();
        let (matches, stats) = trie.match_edge(&f.state, &f.graph, e).unwrap();
        assert!(matches.is_empty());
        assert_eq!(stats.calls, 1);
    }

    #[test]
    fn chain_matches_once_per_instance() {
        let mut f = Fixture::new();
        let mut trie = TNode::new();
        trie.add_generator(&chain_path(&f), Rc::new(Nop));

        let first = f.commit(0, 1);
        let (m, _) = trie.match_edge(&f.state, &f.graph, first).unwrap();
        assert!(m.is_empty(), "second premise is still missing");

        f.commit(1, 2);
        let (m, _) = trie.match_edge(&f.state, &f.graph, first).unwrap();
        assert_eq!(m.len(), 1);
        let bound_edges: Vec<_> = m[0]
            .bindings
            .iter()
            .filter_map(|b| b.hnode.as_edge())
            .collect();
        assert_eq!(bound_edges.len(), 2);
        assert_eq!(bound_edges[0], first);
    }

    #[test]
    fn goto_parent_returns_to_previous_vertex() {
        let mut f = Fixture::new();
        // succ(i,j) & succ(j,k) & succ(h,i): from the first fact go to j, take
        // succ(j,k), step back twice to the first fact, then go to i.
        let ty = f.token();
        let path = vec![
            TKey::Relation { rel: f.succ, arg: ArgPos::Head },
            TKey::NodeType { ty, arg: ArgPos::Tail(1) },
            TKey::Relation { rel: f.succ, arg: ArgPos::Tail(0) },
            TKey::GotoParent,
            TKey::GotoParent,
            TKey::NodeType { ty, arg: ArgPos::Tail(0) },
            TKey::Relation { rel: f.succ, arg: ArgPos::Tail(1) },
        ];
        let mut trie = TNode::new();
        trie.add_generator(&path, Rc::new(Nop));

        let first = f.commit(0, 1);
        let mid = f.commit(1, 2);
        f.commit(2, 3);
        let (m, _) = trie.match_edge(&f.state, &f.graph, mid).unwrap();
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].bindings.last().unwrap().hnode, HNode::Edge(first));

        // Rooted at succ(0,1) the walk needs a fact ending at 0, which is absent.
        let (m, _) = trie.match_edge(&f.state, &f.graph, first).unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn cycles_do_not_recross_links() {
        let mut f = Fixture::new();
        // A long path of alternating keys over a 3-cycle 0->1->2->0.
        let ty = f.token();
        let mut path = vec![TKey::Relation { rel: f.succ, arg: ArgPos::Head }];
        for _ in 0..6 {
            path.push(TKey::NodeType { ty, arg: ArgPos::Tail(1) });
            path.push(TKey::Relation { rel: f.succ, arg: ArgPos::Tail(0) });
        }
        let mut trie = TNode::new();
        trie.add_generator(&path, Rc::new(Nop));

        f.commit(0, 1);
        f.commit(1, 2);
        let last = f.commit(2, 0);
        let (m, stats) = trie.match_edge(&f.state, &f.graph, last).unwrap();
        assert!(m.is_empty(), "the walk must stop when it would re-enter the cycle");
        // The head entry plus six links around the cycle.
        assert!(stats.max_crossed <= 7);
        assert_eq!(stats.calls, stats.pushes + 1);
    }

    #[test]
    fn node_reenters_through_a_different_link() {
        let mut f = Fixture::new();
        // succ(i,i): both arguments are the same interned node.
        let ty = f.token();
        let path = vec![
            TKey::Relation { rel: f.succ, arg: ArgPos::Head },
            TKey::NodeType { ty, arg: ArgPos::Tail(0) },
            TKey::GotoParent,
            TKey::NodeType { ty, arg: ArgPos::Tail(1) },
        ];
        let mut trie = TNode::new();
        trie.add_generator(&path, Rc::new(Nop));

        let looped = f.commit(3, 3);
        let (m, _) = trie.match_edge(&f.state, &f.graph, looped).unwrap();
        assert_eq!(m.len(), 1);
        let nodes: Vec<_> = m[0].bindings.iter().filter_map(|b| b.hnode.as_node()).collect();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0], nodes[1]);
    }

    #[test]
    fn link_is_not_crossed_twice_in_one_branch() {
        let mut f = Fixture::new();
        let e = f.commit(0, 1);
        let head = f.graph.edge(e).unwrap().head;
        let mut trace = GraphTraversalTrace::new(HNode::Node(head));
        let link = Link {
            from: HNode::Node(head),
            to: HNode::Edge(e),
            pos: ArgPos::Head,
        };
        let key = TKey::GotoParent;
        assert!(trace.push(key, link));
        assert!(!trace.push(key, link));
        assert_eq!(trace.crossed_len(), 1);
        trace.pop();
        assert!(!trace.is_crossed(&link));
        assert_eq!(trace.stack().len(), 1);
    }
}
