//! Agenda priorities: the search strategy of the engine.
//!
//! A priority is a weighted sum of named heuristics, parsed from strings such
//! as `"1*easyfirst + 0.5*leftright"`. The agenda pops in priority order, so
//! changing the priority changes the order in which facts are considered.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::adjoints::Adjoints;
use crate::error::{ConfigError, ConfigResult};
use crate::hypergraph::HypEdge;
use crate::store::GraphStore;

/// One named ordering heuristic.
#[derive(Debug, Clone, PartialEq)]
pub enum Heuristic {
    /// Prefer facts whose largest integer argument is smallest.
    LeftRight { slope: f64 },
    /// `tanh(score / scale)`.
    EasyFirst { scale: f64 },
    /// The raw score.
    EasyFirstLinear,
    /// Relations later in the configured order first.
    Dfs,
    /// Relations earlier in the configured order first.
    Bfs,
    /// A static pseudo-random tie-break in [0, 1), fixed per fact.
    Random,
}

impl Heuristic {
    /// Resolve a heuristic by (case-insensitive) name.
    pub fn by_name(name: &str) -> ConfigResult<Self> {
        match name.to_lowercase().as_str() {
            "leftright" | "left2right" | "left-right" | "l2r" => {
                Ok(Heuristic::LeftRight { slope: 1.0 / 5.0 })
            }
            "easyfirst" | "easy-first" | "easyfirst-dynamic" | "bestfirst" | "best-first" => {
                Ok(Heuristic::EasyFirst { scale: 100.0 })
            }
            "easyfirst-linear" => Ok(Heuristic::EasyFirstLinear),
            "dfs" => Ok(Heuristic::Dfs),
            "bfs" => Ok(Heuristic::Bfs),
            "random" => Ok(Heuristic::Random),
            _ => Err(ConfigError::UnknownPriority {
                name: name.to_string(),
            }),
        }
    }
}

/// Weighted sum of heuristics.
#[derive(Debug, Clone)]
pub struct AgendaPriority {
    terms: Vec<(f64, Heuristic)>,
    relation_rank: HashMap<String, usize>,
    seed: u64,
}

impl Default for AgendaPriority {
    /// Pure best-first by score.
    fn default() -> Self {
        Self {
            terms: vec![(1.0, Heuristic::EasyFirstLinear)],
            relation_rank: HashMap::new(),
            seed: 9001,
        }
    }
}

impl AgendaPriority {
    pub fn new(terms: Vec<(f64, Heuristic)>) -> Self {
        Self {
            terms,
            ..Default::default()
        }
    }

    /// Parse `name` or `w*name + w*name + ...`.
    ///
    /// A bare name (implicit weight 1) must be the only term.
    pub fn parse(description: &str) -> ConfigResult<Self> {
        let syntax = |message: &str| ConfigError::PrioritySyntax {
            description: description.to_string(),
            message: message.to_string(),
        };
        let pieces: Vec<&str> = description.split('+').map(str::trim).collect();
        let mut terms = Vec::with_capacity(pieces.len());
        for piece in &pieces {
            if piece.is_empty() {
                return Err(syntax("empty term"));
            }
            match piece.split_once('*') {
                None => {
                    if pieces.len() != 1 {
                        return Err(syntax("a term without a weight must be the only term"));
                    }
                    terms.push((1.0, Heuristic::by_name(piece)?));
                }
                Some((weight, name)) => {
                    let weight: f64 = weight
                        .trim()
                        .parse()
                        .map_err(|_| syntax(&format!("weight '{}' is not a number", weight.trim())))?;
                    terms.push((weight, Heuristic::by_name(name.trim())?));
                }
            }
        }
        Ok(Self::new(terms))
    }

    /// Rank relations for `dfs`/`bfs`: earlier names get lower ranks.
    pub fn with_relation_order<S: AsRef<str>>(mut self, order: &[S]) -> Self {
        self.relation_rank = order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_ref().to_string(), i))
            .collect();
        self
    }

    /// Seed for the `random` heuristic.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn terms(&self) -> &[(f64, Heuristic)] {
        &self.terms
    }

    /// Priority of `edge` given its score.
    pub fn priority(&self, edge: &HypEdge, score: &dyn Adjoints, graph: &GraphStore) -> f64 {
        self.terms
            .iter()
            .map(|(w, h)| w * self.heuristic(h, edge, score, graph))
            .sum()
    }

    fn heuristic(&self, h: &Heuristic, edge: &HypEdge, score: &dyn Adjoints, graph: &GraphStore) -> f64 {
        match h {
            Heuristic::LeftRight { slope } => slope * -(last_position(edge, graph) as f64),
            Heuristic::EasyFirst { scale } => (score.forwards() / scale).tanh(),
            Heuristic::EasyFirstLinear => score.forwards(),
            Heuristic::Dfs => self.rank(edge, graph),
            Heuristic::Bfs => -self.rank(edge, graph),
            Heuristic::Random => {
                let mut hasher = DefaultHasher::new();
                edge.relation.hash(&mut hasher);
                for &n in edge.tail.iter() {
                    match graph.value_of(n) {
                        Ok(v) => v.hash(&mut hasher),
                        Err(_) => n.hash(&mut hasher),
                    }
                }
                let mut rng = StdRng::seed_from_u64(self.seed ^ hasher.finish());
                rng.r#gen::<f64>()
            }
        }
    }

    fn rank(&self, edge: &HypEdge, graph: &GraphStore) -> f64 {
        let name = &graph.schema().relation(edge.relation).name;
        self.relation_rank
            .get(name)
            .map(|&r| r as f64)
            .unwrap_or(0.0)
    }
}

/// Largest integer value among the tail arguments, or 0 if there is none.
fn last_position(edge: &HypEdge, graph: &GraphStore) -> i64 {
    edge.tail
        .iter()
        .filter_map(|&n| graph.value_of(n).ok().and_then(|v| v.as_int()))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjoints::Constant;
    use crate::hypergraph::{EdgeId, Partition, Value};
    use crate::schema::RelationId;

    fn graph() -> (GraphStore, RelationId, RelationId) {
        let mut graph = GraphStore::new();
        let succ = graph
            .schema_mut()
            .add_relation_by_names("succ", &["tokenIndex", "tokenIndex"])
            .unwrap();
        let ner = graph
            .schema_mut()
            .add_relation_by_names("ner3", &["tokenIndex", "tag", "bio"])
            .unwrap();
        (graph, succ, ner)
    }

    fn make(graph: &mut GraphStore, rel: RelationId, values: &[Value]) -> (EdgeId, HypEdge) {
        let id = graph
            .make_edge_from_values(rel, values, Partition::Temporary)
            .unwrap();
        (id, graph.edge(id).unwrap().clone())
    }

    #[test]
    fn parse_weighted_sum() {
        let p = AgendaPriority::parse("2*easyfirst-linear + 0.5 * leftright").unwrap();
        assert_eq!(
            p.terms(),
            &[
                (2.0, Heuristic::EasyFirstLinear),
                (0.5, Heuristic::LeftRight { slope: 0.2 })
            ]
        );
    }

    #[test]
    fn parse_rejects_unknown_and_malformed() {
        assert!(matches!(
            AgendaPriority::parse("1*nope"),
            Err(ConfigError::UnknownPriority { .. })
        ));
        assert!(matches!(
            AgendaPriority::parse("easyfirst + leftright"),
            Err(ConfigError::PrioritySyntax { .. })
        ));
        assert!(matches!(
            AgendaPriority::parse("x*easyfirst"),
            Err(ConfigError::PrioritySyntax { .. })
        ));
    }

    #[test]
    fn default_priority_is_the_score() {
        let (mut g, succ, _) = graph();
        let (_, e) = make(&mut g, succ, &[Value::Int(0), Value::Int(1)]);
        let p = AgendaPriority::default();
        assert_eq!(p.priority(&e, &Constant(3.5), &g), 3.5);
    }

    #[test]
    fn leftright_prefers_earlier_positions() {
        let (mut g, succ, _) = graph();
        let (_, early) = make(&mut g, succ, &[Value::Int(0), Value::Int(1)]);
        let (_, late) = make(&mut g, succ, &[Value::Int(7), Value::Int(8)]);
        let p = AgendaPriority::parse("leftright").unwrap();
        let s = Constant::ZERO;
        assert!(p.priority(&early, &s, &g) > p.priority(&late, &s, &g));
        assert!((p.priority(&late, &s, &g) + 8.0 / 5.0).abs() < 1e-12);
    }

    #[test]
    fn dfs_and_bfs_follow_relation_order() {
        let (mut g, succ, ner) = graph();
        let (_, a) = make(&mut g, succ, &[Value::Int(0), Value::Int(1)]);
        let (_, b) = make(&mut g, ner, &[Value::Int(0), Value::str("PER"), Value::str("B")]);
        let s = Constant::ZERO;
        let dfs = AgendaPriority::parse("dfs").unwrap().with_relation_order(&["succ", "ner3"]);
        let bfs = AgendaPriority::parse("bfs").unwrap().with_relation_order(&["succ", "ner3"]);
        assert!(dfs.priority(&b, &s, &g) > dfs.priority(&a, &s, &g));
        assert!(bfs.priority(&a, &s, &g) > bfs.priority(&b, &s, &g));
    }

    #[test]
    fn random_is_static_per_fact_and_bounded() {
        let (mut g, succ, _) = graph();
        let (_, e) = make(&mut g, succ, &[Value::Int(3), Value::Int(4)]);
        let p = AgendaPriority::parse("random").unwrap().with_seed(7);
        let s = Constant::ZERO;
        let first = p.priority(&e, &s, &g);
        assert_eq!(first, p.priority(&e, &s, &g));
        assert!((0.0..1.0).contains(&first));
    }

    #[test]
    fn easyfirst_squashes_scores() {
        let (mut g, succ, _) = graph();
        let (_, e) = make(&mut g, succ, &[Value::Int(0), Value::Int(1)]);
        let p = AgendaPriority::parse("easyfirst").unwrap();
        let v = p.priority(&e, &Constant(1e6), &g);
        assert!(v <= 1.0 && v > 0.99);
    }
}
