//! Global factors: rescoring of pending candidates after a commit.
//!
//! A factor is attached to a trie path (usually `[Rel(r@HEAD)]`, i.e. "a fact
//! of `r` was committed") and runs with the matched bindings. It may remove
//! agenda entries or change their scores; priorities are recomputed with the
//! driver's [`AgendaPriority`].

use tracing::trace;

use crate::adjoints::{Adjoints, Constant, Sum};
use crate::agenda::{Agenda, AgendaPriority};
use crate::error::AgendaResult;
use crate::hypergraph::{EdgeId, HypEdge};
use crate::store::GraphStore;
use crate::trie::{Binding, GlobalFactor, TKey};

/// The fact that triggered the factor: the first relation binding.
fn committed_edge<'g>(bindings: &[Binding], graph: &'g GraphStore) -> Option<&'g HypEdge> {
    bindings
        .iter()
        .find(|b| matches!(b.key, TKey::Relation { .. }))
        .and_then(|b| b.hnode.as_edge())
        .and_then(|id| graph.edge(id).ok())
}

/// Removes pending facts of the committed relation that agree with the
/// committed fact on `key_args`.
#[derive(Debug, Clone)]
pub struct ExclusionFactor {
    key_args: Vec<usize>,
}

impl ExclusionFactor {
    pub fn new(key_args: Vec<usize>) -> Self {
        Self { key_args }
    }
}

impl GlobalFactor for ExclusionFactor {
    fn rescore(
        &self,
        bindings: &[Binding],
        agenda: &mut Agenda,
        graph: &GraphStore,
        _priority: &AgendaPriority,
    ) -> AgendaResult<()> {
        let Some(committed) = committed_edge(bindings, graph) else {
            return Ok(());
        };
        let key: Vec<_> = self
            .key_args
            .iter()
            .filter_map(|&k| committed.tail.get(k).copied())
            .collect();
        if key.len() != self.key_args.len() {
            return Ok(());
        }
        // Every pending fact sharing the key shares the first key node.
        let Some(&anchor) = key.first() else {
            return Ok(());
        };
        for pending in agenda.adjacent(anchor) {
            let Ok(edge) = graph.edge(pending) else {
                continue;
            };
            let same_key = edge.relation == committed.relation
                && self
                    .key_args
                    .iter()
                    .zip(&key)
                    .all(|(&k, &n)| edge.tail.get(k) == Some(&n));
            if same_key {
                agenda.remove(pending)?;
                trace!(fact = %graph.format_edge(pending), "excluded");
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "exclusion"
    }
}

/// Adds `penalty` to every pending fact that shares a tail node with the
/// committed fact.
#[derive(Debug, Clone, Copy)]
pub struct AdjacentPenalty {
    penalty: f64,
}

impl AdjacentPenalty {
    pub fn new(penalty: f64) -> Self {
        Self { penalty }
    }
}

impl GlobalFactor for AdjacentPenalty {
    fn rescore(
        &self,
        bindings: &[Binding],
        agenda: &mut Agenda,
        graph: &GraphStore,
        priority: &AgendaPriority,
    ) -> AgendaResult<()> {
        let Some(committed) = committed_edge(bindings, graph) else {
            return Ok(());
        };
        let mut touched: Vec<EdgeId> = committed
            .tail
            .iter()
            .flat_map(|&n| agenda.adjacent(n))
            .collect();
        touched.sort_unstable();
        touched.dedup();

        for pending in touched {
            let Ok(edge) = graph.edge(pending) else {
                continue;
            };
            let penalty = self.penalty;
            agenda.update_score(pending, |old| {
                let score: Box<dyn Adjoints> = Box::new(Sum::of(old, Constant::boxed(penalty)));
                let p = priority.priority(edge, score.as_ref(), graph);
                (score, p)
            })?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "adjacent-penalty"
    }
}
