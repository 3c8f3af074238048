//! Firing compiled rules.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::adjoints::{Adjoints, Constant};
use crate::error::RuleResult;
use crate::hypergraph::{EdgeId, HypEdge, NodeId, Partition};
use crate::store::GraphStore;
use crate::trie::{Binding, Candidate, TKey, TransitionGenerator};

use super::{Arg, CompiledRule};

/// Scores the conclusions a rule proposes.
pub trait Scorer: fmt::Debug {
    fn score(&self, edge: &HypEdge, graph: &GraphStore) -> Box<dyn Adjoints>;
}

/// Every conclusion gets the same score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantScorer(pub f64);

impl Scorer for ConstantScorer {
    fn score(&self, _edge: &HypEdge, _graph: &GraphStore) -> Box<dyn Adjoints> {
        Constant::boxed(self.0)
    }
}

/// Scorer backed by a closure.
pub struct FnScorer<F>(pub F);

impl<F> fmt::Debug for FnScorer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnScorer")
    }
}

impl<F> Scorer for FnScorer<F>
where
    F: Fn(&HypEdge, &GraphStore) -> f64,
{
    fn score(&self, edge: &HypEdge, graph: &GraphStore) -> Box<dyn Adjoints> {
        Constant::boxed((self.0)(edge, graph))
    }
}

/// Generator for one rooted path of a compiled rule.
#[derive(Debug)]
pub struct RuleGenerator {
    rule: Rc<CompiledRule>,
    term_order: Vec<usize>,
    scorer: Rc<dyn Scorer>,
    name: String,
}

impl RuleGenerator {
    /// Generator for `rule.paths[path]`.
    pub fn new(rule: Rc<CompiledRule>, path: usize, scorer: Rc<dyn Scorer>) -> Self {
        let term_order = rule.paths[path].term_order.clone();
        let name = format!("{} @{}", rule.rule, rule.paths[path].root);
        Self {
            rule,
            term_order,
            scorer,
            name,
        }
    }

    pub fn rule(&self) -> &CompiledRule {
        &self.rule
    }

    /// Variable assignment for the bound premises, or `None` if a join or
    /// constant does not hold.
    fn unify(&self, edges: &[EdgeId], graph: &GraphStore) -> RuleResult<Option<HashMap<String, NodeId>>> {
        let mut env: HashMap<String, NodeId> = HashMap::new();
        for (&edge_id, &t) in edges.iter().zip(&self.term_order) {
            let edge = graph.edge(edge_id)?;
            for (pos, arg) in self.rule.rule.lhs[t].positions() {
                let Some(node) = edge.node_at(pos) else {
                    return Ok(None);
                };
                match arg {
                    Arg::Var(v) => {
                        if let Some(&prev) = env.get(&v) {
                            if prev != node {
                                return Ok(None);
                            }
                        } else {
                            env.insert(v, node);
                        }
                    }
                    Arg::Const(c) => {
                        if *graph.value_of(node)? != c {
                            return Ok(None);
                        }
                    }
                }
            }
        }
        Ok(Some(env))
    }
}

impl TransitionGenerator for RuleGenerator {
    fn generate(&self, bindings: &[Binding], graph: &mut GraphStore) -> RuleResult<Vec<Candidate>> {
        let edges: Vec<EdgeId> = bindings
            .iter()
            .filter(|b| matches!(b.key, TKey::Relation { .. }))
            .filter_map(|b| b.hnode.as_edge())
            .collect();
        if edges.len() != self.term_order.len() {
            return Ok(Vec::new());
        }
        let Some(env) = self.unify(&edges, graph)? else {
            trace!(rule = %self.name, "join failed");
            return Ok(Vec::new());
        };

        let rhs = self.rule.rhs_relation;
        let arg_types = graph.schema().relation(rhs).arg_types.clone();
        let mut tail = Vec::with_capacity(arg_types.len());
        for (arg, ty) in self.rule.rule.rhs.args.iter().zip(arg_types) {
            let node = match arg {
                Arg::Var(v) => env[v],
                Arg::Const(c) => graph.intern_node(ty, c, Partition::Temporary)?,
            };
            tail.push(node);
        }
        let edge = graph.make_edge(rhs, &tail, Partition::Temporary)?;
        let score = self.scorer.score(graph.edge(edge)?, graph);
        trace!(rule = %self.name, fact = %graph.format_edge(edge), "proposed");
        Ok(vec![Candidate { edge, score }])
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypergraph::{HNode, Value};
    use crate::rules::{Rule, compile};
    use crate::schema::ArgPos;

    fn setup() -> (GraphStore, Rc<CompiledRule>) {
        let mut graph = GraphStore::new();
        graph
            .schema_mut()
            .add_relation_by_names("succ", &["tokenIndex", "tokenIndex"])
            .unwrap();
        let rule = Rule::parse("succ(i,j) & succ(j,k) => skip(i,k)").unwrap();
        let compiled = compile(&rule, graph.schema_mut()).unwrap();
        (graph, Rc::new(compiled))
    }

    fn succ(graph: &mut GraphStore, a: i64, b: i64) -> EdgeId {
        let rel = graph.schema().lookup_relation("succ").unwrap();
        graph
            .make_edge_from_values(rel, &[Value::Int(a), Value::Int(b)], Partition::Temporary)
            .unwrap()
    }

    fn rel_binding(edge: EdgeId, arg: ArgPos, graph: &GraphStore) -> Binding {
        Binding {
            key: TKey::Relation {
                rel: graph.edge(edge).unwrap().relation,
                arg,
            },
            hnode: HNode::Edge(edge),
        }
    }

    #[test]
    fn fires_conclusion_with_joined_values() {
        let (mut graph, rule) = setup();
        let a = succ(&mut graph, 0, 1);
        let b = succ(&mut graph, 1, 2);
        let generator = RuleGenerator::new(rule.clone(), 0, Rc::new(ConstantScorer(2.5)));
        let bindings = [
            rel_binding(a, ArgPos::Head, &graph),
            rel_binding(b, ArgPos::Tail(0), &graph),
        ];
        let out = generator.generate(&bindings, &mut graph).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(graph.format_edge(out[0].edge), "skip(0,2)");
        assert_eq!(out[0].score.forwards(), 2.5);
        assert!(!out[0].edge.is_schema());
    }

    #[test]
    fn failed_join_proposes_nothing() {
        let (mut graph, rule) = setup();
        let a = succ(&mut graph, 0, 1);
        let b = succ(&mut graph, 5, 6);
        let generator = RuleGenerator::new(rule, 0, Rc::new(ConstantScorer(1.0)));
        let bindings = [
            rel_binding(a, ArgPos::Head, &graph),
            rel_binding(b, ArgPos::Tail(0), &graph),
        ];
        assert!(generator.generate(&bindings, &mut graph).unwrap().is_empty());
    }

    #[test]
    fn constants_must_match() {
        let mut graph = GraphStore::new();
        graph
            .schema_mut()
            .add_relation_by_names("tag", &["tokenIndex", "nerTag"])
            .unwrap();
        let rule = Rule::parse("tag(i, \"PER\") => person(i)").unwrap();
        let compiled = Rc::new(compile(&rule, graph.schema_mut()).unwrap());
        let tag = graph.schema().lookup_relation("tag").unwrap();
        let per = graph
            .make_edge_from_values(tag, &[Value::Int(1), Value::str("PER")], Partition::Temporary)
            .unwrap();
        let loc = graph
            .make_edge_from_values(tag, &[Value::Int(1), Value::str("LOC")], Partition::Temporary)
            .unwrap();
        let scorer = FnScorer(|_: &HypEdge, _: &GraphStore| -1.0);
        let generator = RuleGenerator::new(compiled, 0, Rc::new(scorer));

        let out = generator
            .generate(&[rel_binding(per, ArgPos::Head, &graph)], &mut graph)
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(graph.format_edge(out[0].edge), "person(1)");
        assert_eq!(out[0].score.forwards(), -1.0);
        assert!(
            generator
                .generate(&[rel_binding(loc, ArgPos::Head, &graph)], &mut graph)
                .unwrap()
                .is_empty()
        );
    }
}
