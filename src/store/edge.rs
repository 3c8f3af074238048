//! Edge interning: one [`EdgeId`] per (relation, tail).
//!
//! The witness head is a function of the tail, so (relation, tail) alone
//! identifies a fact.

use std::collections::HashMap;

use crate::hypergraph::{EdgeId, HypEdge, NodeId, Partition};
use crate::schema::RelationId;

#[derive(Debug, Default)]
struct EdgeArena {
    edges: Vec<HypEdge>,
}

/// Arena of edges split into schema and temporary partitions.
#[derive(Debug, Default)]
pub struct EdgeStore {
    schema: EdgeArena,
    temporary: EdgeArena,
    index: HashMap<(RelationId, Box<[NodeId]>), EdgeId>,
}

impl EdgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing id for (relation, tail), if any.
    pub fn find(&self, relation: RelationId, tail: &[NodeId]) -> Option<EdgeId> {
        self.index.get(&(relation, Box::from(tail))).copied()
    }

    /// Intern `edge`, returning the existing id if an equal fact is stored.
    ///
    /// Callers are responsible for validating arity and partitions.
    pub fn intern(&mut self, edge: HypEdge, partition: Partition) -> EdgeId {
        if let Some(existing) = self.find(edge.relation, &edge.tail) {
            return existing;
        }
        let arena = match partition {
            Partition::Schema => &mut self.schema,
            Partition::Temporary => &mut self.temporary,
        };
        let id = EdgeId::new(partition, arena.edges.len() as u32);
        self.index.insert((edge.relation, edge.tail.clone()), id);
        arena.edges.push(edge);
        id
    }

    pub fn get(&self, id: EdgeId) -> Option<&HypEdge> {
        let arena = match id.partition {
            Partition::Schema => &self.schema,
            Partition::Temporary => &self.temporary,
        };
        arena.edges.get(id.index as usize)
    }

    pub fn len(&self) -> usize {
        self.schema.edges.len() + self.temporary.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every temporary edge, keeping schema edges and their ids.
    pub fn clear_temporary(&mut self) {
        self.temporary.edges.clear();
        self.index.retain(|_, id| id.is_schema());
    }
}
