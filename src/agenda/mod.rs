//! The agenda: an indexed binary max-heap of candidate edges.
//!
//! Entries are ordered by a scalar priority (by default the score's
//! `forwards()`). Besides the heap array the agenda keeps two reverse indices:
//!
//! - `edge -> slot`, so any pending edge can be removed or rescored in O(log n)
//! - `node -> set of slots`, so callers can find every pending edge touching a
//!   node (for pruning competitors once one fact is committed)
//!
//! Every swap of two heap slots updates both indices for both entries.

pub mod priority;

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::adjoints::{Adjoints, Constant};
use crate::error::{AgendaError, AgendaResult};
use crate::hypergraph::{EdgeId, HypEdge, NodeId};

pub use priority::{AgendaPriority, Heuristic};

/// A candidate removed from the agenda.
#[derive(Debug)]
pub struct AgendaItem {
    pub edge: EdgeId,
    pub score: Box<dyn Adjoints>,
    pub priority: f64,
}

#[derive(Debug)]
struct Entry {
    edge: EdgeId,
    /// Distinct nodes the edge touches (head and tail).
    nodes: Box<[NodeId]>,
    score: Box<dyn Adjoints>,
    priority: f64,
}

/// Indexed max-heap of pending edges.
#[derive(Debug, Default)]
pub struct Agenda {
    heap: Vec<Entry>,
    slot_of: HashMap<EdgeId, usize>,
    slots_of_node: HashMap<NodeId, HashSet<usize>>,
}

fn parent(slot: usize) -> usize {
    (slot - 1) / 2
}

impl Agenda {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains(&self, edge: EdgeId) -> bool {
        self.slot_of.contains_key(&edge)
    }

    /// Push a candidate. Each edge may be pending at most once.
    pub fn add(
        &mut self,
        edge_id: EdgeId,
        edge: &HypEdge,
        score: Box<dyn Adjoints>,
        priority: f64,
    ) -> AgendaResult<()> {
        if self.contains(edge_id) {
            return Err(AgendaError::Duplicate {
                edge: edge_id.to_string(),
            });
        }
        let mut nodes: Vec<NodeId> = edge.endpoints().map(|(n, _)| n).collect();
        nodes.sort_unstable();
        nodes.dedup();

        let slot = self.heap.len();
        self.heap.push(Entry {
            edge: edge_id,
            nodes: nodes.into_boxed_slice(),
            score,
            priority,
        });
        self.index_slot(slot);
        self.sift_up(slot);
        Ok(())
    }

    /// Remove and return the highest-priority candidate.
    pub fn pop(&mut self) -> AgendaResult<AgendaItem> {
        if self.heap.is_empty() {
            return Err(AgendaError::Empty);
        }
        let last = self.heap.len() - 1;
        self.swap(0, last);
        let item = self.take_last();
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Ok(item)
    }

    /// The highest-priority candidate, its score and its priority.
    pub fn peek(&self) -> AgendaResult<(EdgeId, &dyn Adjoints, f64)> {
        self.heap
            .first()
            .map(|e| (e.edge, e.score.as_ref(), e.priority))
            .ok_or(AgendaError::Empty)
    }

    /// Remove an arbitrary pending edge.
    pub fn remove(&mut self, edge: EdgeId) -> AgendaResult<AgendaItem> {
        if self.heap.is_empty() {
            return Err(AgendaError::Empty);
        }
        let slot = *self.slot_of.get(&edge).ok_or_else(|| AgendaError::NotOnAgenda {
            edge: edge.to_string(),
        })?;
        let last = self.heap.len() - 1;
        self.swap(slot, last);
        let item = self.take_last();
        if slot < self.heap.len() {
            self.restore(slot);
        }
        Ok(item)
    }

    /// Replace the score and priority of a pending edge, returning the old score.
    pub fn rescore(
        &mut self,
        edge: EdgeId,
        score: Box<dyn Adjoints>,
        priority: f64,
    ) -> AgendaResult<Box<dyn Adjoints>> {
        let slot = self.slot(edge)?;
        let entry = &mut self.heap[slot];
        let old = std::mem::replace(&mut entry.score, score);
        entry.priority = priority;
        self.restore(slot);
        Ok(old)
    }

    /// Rebuild the score of a pending edge from its current one.
    ///
    /// `update` receives the old score and returns the new score and priority.
    pub fn update_score<F>(&mut self, edge: EdgeId, update: F) -> AgendaResult<()>
    where
        F: FnOnce(Box<dyn Adjoints>) -> (Box<dyn Adjoints>, f64),
    {
        let slot = self.slot(edge)?;
        let entry = &mut self.heap[slot];
        let old = std::mem::replace(&mut entry.score, Box::new(Constant::ZERO));
        let (score, priority) = update(old);
        entry.score = score;
        entry.priority = priority;
        self.restore(slot);
        Ok(())
    }

    /// Every pending edge touching `node` as head or tail.
    pub fn adjacent(&self, node: NodeId) -> Vec<EdgeId> {
        let mut edges: Vec<EdgeId> = self
            .slots_of_node
            .get(&node)
            .map(|slots| slots.iter().map(|&s| self.heap[s].edge).collect())
            .unwrap_or_default();
        edges.sort_unstable();
        edges
    }

    pub fn priority_of(&self, edge: EdgeId) -> Option<f64> {
        self.slot_of.get(&edge).map(|&s| self.heap[s].priority)
    }

    pub fn score_of(&self, edge: EdgeId) -> Option<&dyn Adjoints> {
        self.slot_of.get(&edge).map(|&s| self.heap[s].score.as_ref())
    }

    /// Pending candidates in heap order (not sorted).
    pub fn iter(&self) -> impl Iterator<Item = (EdgeId, &dyn Adjoints, f64)> {
        self.heap
            .iter()
            .map(|e| (e.edge, e.score.as_ref(), e.priority))
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.slot_of.clear();
        self.slots_of_node.clear();
    }

    /// Verify heap order and both reverse indices.
    pub fn check_invariants(&self) -> AgendaResult<()> {
        let fail = |message: String| Err(AgendaError::Invariant { message });

        for slot in 1..self.heap.len() {
            let p = parent(slot);
            if self.heap[p].priority.total_cmp(&self.heap[slot].priority) == Ordering::Less {
                return fail(format!(
                    "slot {slot} priority {} exceeds parent {p} priority {}",
                    self.heap[slot].priority, self.heap[p].priority
                ));
            }
        }

        if self.slot_of.len() != self.heap.len() {
            return fail(format!(
                "edge index has {} entries for {} heap slots",
                self.slot_of.len(),
                self.heap.len()
            ));
        }
        let mut pairs = 0;
        for (slot, entry) in self.heap.iter().enumerate() {
            if self.slot_of.get(&entry.edge) != Some(&slot) {
                return fail(format!("edge {} is in slot {slot} but not indexed there", entry.edge));
            }
            for node in entry.nodes.iter() {
                let indexed = self
                    .slots_of_node
                    .get(node)
                    .is_some_and(|slots| slots.contains(&slot));
                if !indexed {
                    return fail(format!("node {node} is missing slot {slot}"));
                }
                pairs += 1;
            }
        }
        let indexed_pairs: usize = self.slots_of_node.values().map(HashSet::len).sum();
        if indexed_pairs != pairs {
            return fail(format!(
                "node index holds {indexed_pairs} slot references, expected {pairs}"
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Heap mechanics
    // -----------------------------------------------------------------------

    fn slot(&self, edge: EdgeId) -> AgendaResult<usize> {
        self.slot_of
            .get(&edge)
            .copied()
            .ok_or_else(|| AgendaError::NotOnAgenda {
                edge: edge.to_string(),
            })
    }

    fn above(&self, a: usize, b: usize) -> bool {
        self.heap[a].priority.total_cmp(&self.heap[b].priority) == Ordering::Greater
    }

    fn index_slot(&mut self, slot: usize) {
        let entry = &self.heap[slot];
        self.slot_of.insert(entry.edge, slot);
        for &node in entry.nodes.iter() {
            self.slots_of_node.entry(node).or_default().insert(slot);
        }
    }

    fn unindex_slot(&mut self, slot: usize) {
        let entry = &self.heap[slot];
        if self.slot_of.get(&entry.edge) == Some(&slot) {
            self.slot_of.remove(&entry.edge);
        }
        for node in entry.nodes.iter() {
            if let Some(slots) = self.slots_of_node.get_mut(node) {
                slots.remove(&slot);
                if slots.is_empty() {
                    self.slots_of_node.remove(node);
                }
            }
        }
    }

    fn swap(&mut self, i: usize, j: usize) {
        if i == j {
            return;
        }
        self.unindex_slot(i);
        self.unindex_slot(j);
        self.heap.swap(i, j);
        self.index_slot(i);
        self.index_slot(j);
    }

    fn take_last(&mut self) -> AgendaItem {
        let last = self.heap.len() - 1;
        self.unindex_slot(last);
        let entry = self.heap.swap_remove(last);
        AgendaItem {
            edge: entry.edge,
            score: entry.score,
            priority: entry.priority,
        }
    }

    /// Sift in whichever direction the entry at `slot` violates heap order.
    fn restore(&mut self, slot: usize) {
        if slot > 0 && self.above(slot, parent(slot)) {
            self.sift_up(slot);
        } else {
            self.sift_down(slot);
        }
    }

    fn sift_up(&mut self, mut slot: usize) {
        while slot > 0 {
            let p = parent(slot);
            if !self.above(slot, p) {
                break;
            }
            self.swap(slot, p);
            slot = p;
        }
    }

    fn sift_down(&mut self, mut slot: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * slot + 1;
            let right = left + 1;
            let mut best = slot;
            if left < len && self.above(left, best) {
                best = left;
            }
            if right < len && self.above(right, best) {
                best = right;
            }
            if best == slot {
                break;
            }
            self.swap(slot, best);
            slot = best;
        }
    }
}
