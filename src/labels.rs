//! Gold labels for the current document and precision/recall against them.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::hypergraph::HypEdge;
use crate::schema::RelationId;

/// Gold status of a fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Label {
    Gold,
    /// The relation has gold facts, but not this one.
    NotGold,
    /// No gold facts exist for the relation.
    Unknown,
}

/// The gold fact set, with a per-relation count.
#[derive(Debug, Default, Clone)]
pub struct Labels {
    gold: HashSet<HypEdge>,
    per_relation: HashMap<RelationId, usize>,
}

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a gold fact. Returns `false` if it was already present.
    pub fn add(&mut self, edge: HypEdge) -> bool {
        let relation = edge.relation;
        let fresh = self.gold.insert(edge);
        if fresh {
            *self.per_relation.entry(relation).or_default() += 1;
        }
        fresh
    }

    pub fn contains(&self, edge: &HypEdge) -> bool {
        self.gold.contains(edge)
    }

    pub fn label(&self, edge: &HypEdge) -> Label {
        if self.gold.contains(edge) {
            Label::Gold
        } else if self.per_relation.contains_key(&edge.relation) {
            Label::NotGold
        } else {
            Label::Unknown
        }
    }

    pub fn len(&self) -> usize {
        self.gold.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gold.is_empty()
    }

    /// Gold facts of one relation.
    pub fn count(&self, relation: RelationId) -> usize {
        self.per_relation.get(&relation).copied().unwrap_or(0)
    }

    pub fn relations(&self) -> impl Iterator<Item = RelationId> + '_ {
        self.per_relation.keys().copied()
    }

    pub fn clear(&mut self) {
        self.gold.clear();
        self.per_relation.clear();
    }

    /// Score `predicted` against the gold facts of `relation` (or all
    /// relations). Predictions of other relations are ignored.
    pub fn perf<'a, I>(&self, predicted: I, relation: Option<RelationId>) -> Perf
    where
        I: IntoIterator<Item = &'a HypEdge>,
    {
        let wanted = |r: RelationId| relation.is_none_or(|want| want == r);
        let mut perf = Perf::default();
        let mut found: HashSet<&HypEdge> = HashSet::new();
        for edge in predicted {
            if !wanted(edge.relation) {
                continue;
            }
            if self.gold.contains(edge) {
                if found.insert(edge) {
                    perf.tp += 1;
                }
            } else {
                perf.fp += 1;
            }
        }
        let gold_total = self.gold.iter().filter(|e| wanted(e.relation)).count();
        perf.fn_ = gold_total - perf.tp;
        perf
    }
}

/// True/false positive and false negative counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Perf {
    pub tp: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
}

impl Perf {
    /// `tp / (tp + fp)`, or 1 with no predictions.
    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// `tp / (tp + fn)`, or 1 with no gold facts.
    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
    }

    pub fn merge(&mut self, other: Perf) {
        self.tp += other.tp;
        self.fp += other.fp;
        self.fn_ += other.fn_;
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 1.0 } else { num as f64 / den as f64 }
}

impl fmt::Display for Perf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tp={} fp={} fn={} P={:.3} R={:.3} F1={:.3}",
            self.tp,
            self.fp,
            self.fn_,
            self.precision(),
            self.recall(),
            self.f1()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypergraph::{Partition, Value};
    use crate::store::GraphStore;

    fn edges() -> (GraphStore, Vec<HypEdge>, RelationId) {
        let mut g = GraphStore::new();
        let ner = g
            .schema_mut()
            .add_relation_by_names("ner3", &["tokenIndex", "nerTag", "bioTag"])
            .unwrap();
        let succ = g
            .schema_mut()
            .add_relation_by_names("succ", &["tokenIndex", "tokenIndex"])
            .unwrap();
        let mut out = Vec::new();
        for (i, tag) in [(0, "PER"), (1, "PER"), (2, "LOC")] {
            let id = g
                .make_edge_from_values(ner, &[Value::Int(i), Value::str(tag), Value::str("B")], Partition::Temporary)
                .unwrap();
            out.push(g.edge(id).unwrap().clone());
        }
        let id = g
            .make_edge_from_values(succ, &[Value::Int(0), Value::Int(1)], Partition::Temporary)
            .unwrap();
        out.push(g.edge(id).unwrap().clone());
        (g, out, ner)
    }

    #[test]
    fn labels_distinguish_unknown_relations() {
        let (_, e, _) = edges();
        let mut labels = Labels::new();
        assert!(labels.add(e[0].clone()));
        assert!(!labels.add(e[0].clone()));
        assert_eq!(labels.label(&e[0]), Label::Gold);
        assert_eq!(labels.label(&e[1]), Label::NotGold);
        assert_eq!(labels.label(&e[3]), Label::Unknown);
        labels.clear();
        assert_eq!(labels.label(&e[0]), Label::Unknown);
    }

    #[test]
    fn perf_counts() {
        let (_, e, ner) = edges();
        let mut labels = Labels::new();
        labels.add(e[0].clone());
        labels.add(e[1].clone());
        let perf = labels.perf([&e[0], &e[2], &e[3]], Some(ner));
        assert_eq!(perf, Perf { tp: 1, fp: 1, fn_: 1 });
        assert_eq!(perf.precision(), 0.5);
        assert_eq!(perf.recall(), 0.5);
        assert_eq!(perf.f1(), 0.5);
    }

    #[test]
    fn empty_denominators() {
        let perf = Perf::default();
        assert_eq!(perf.precision(), 1.0);
        assert_eq!(perf.recall(), 1.0);
        let nothing_right = Perf { tp: 0, fp: 2, fn_: 3 };
        assert_eq!(nothing_right.f1(), 0.0);
    }
}
