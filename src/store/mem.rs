//! Single-partition node interning backed by an arena and a hashmap.
//!
//! Canonicalizes (type, value) pairs to one [`NodeId`] each. All nodes are
//! dropped together by [`NodeStore::clear`].

use std::collections::HashMap;

use crate::error::{StoreError, StoreResult};
use crate::hypergraph::{HypNode, NodeId, Partition, Value};
use crate::schema::NodeTypeId;

/// Interning contract shared by the plain and composite node stores.
pub trait NodeStore {
    /// Return the node for (ty, value), creating it when `create_if_absent`.
    ///
    /// Two calls with equal arguments return the same id whenever the node exists.
    fn lookup(&mut self, ty: NodeTypeId, value: &Value, create_if_absent: bool) -> Option<NodeId>;

    /// Read-only lookup that never creates.
    fn find(&self, ty: NodeTypeId, value: &Value) -> Option<NodeId>;

    /// Resolve an id handed out by this store.
    fn get(&self, id: NodeId) -> Option<&HypNode>;

    /// Number of live nodes.
    fn len(&self) -> usize;

    /// Whether the store holds no nodes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every node.
    fn clear(&mut self);
}

/// Arena of nodes for one [`Partition`].
#[derive(Debug)]
pub struct MemNodeStore {
    partition: Partition,
    nodes: Vec<HypNode>,
    index: HashMap<(NodeTypeId, Value), u32>,
}

impl MemNodeStore {
    /// Create an empty store whose ids carry `partition`.
    pub fn new(partition: Partition) -> Self {
        Self {
            partition,
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Create a store with pre-allocated capacity.
    pub fn with_capacity(partition: Partition, capacity: usize) -> Self {
        Self {
            partition,
            nodes: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    /// Create a node that must not exist yet.
    pub fn register(&mut self, ty: NodeTypeId, value: Value) -> StoreResult<NodeId> {
        if self.index.contains_key(&(ty, value.clone())) {
            return Err(StoreError::DuplicateNode {
                ty: ty.to_string(),
                value: value.to_string(),
            });
        }
        Ok(self.insert(ty, value))
    }

    fn insert(&mut self, ty: NodeTypeId, value: Value) -> NodeId {
        let index = self.nodes.len() as u32;
        self.nodes.push(HypNode::new(ty, value.clone()));
        self.index.insert((ty, value), index);
        NodeId::new(self.partition, index)
    }

    /// Iterate over all live nodes with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &HypNode)> {
        let partition = self.partition;
        self.nodes
            .iter()
            .enumerate()
            .map(move |(i, n)| (NodeId::new(partition, i as u32), n))
    }
}

impl NodeStore for MemNodeStore {
    fn lookup(&mut self, ty: NodeTypeId, value: &Value, create_if_absent: bool) -> Option<NodeId> {
        if let Some(found) = self.find(ty, value) {
            return Some(found);
        }
        create_if_absent.then(|| self.insert(ty, value.clone()))
    }

    fn find(&self, ty: NodeTypeId, value: &Value) -> Option<NodeId> {
        self.index
            .get(&(ty, value.clone()))
            .map(|&i| NodeId::new(self.partition, i))
    }

    fn get(&self, id: NodeId) -> Option<&HypNode> {
        if id.partition != self.partition {
            return None;
        }
        self.nodes.get(id.index as usize)
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    fn ty() -> NodeTypeId {
        Schema::new().node_type("tag")
    }

    #[test]
    fn lookup_interns_equal_pairs() {
        let mut store = MemNodeStore::new(Partition::Temporary);
        let t = ty();
        let a = store.lookup(t, &Value::str("PER"), true).unwrap();
        let b = store.lookup(t, &Value::str("PER"), true).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(a).unwrap().value, Value::str("PER"));
    }

    #[test]
    fn lookup_without_create_returns_none() {
        let mut store = MemNodeStore::new(Partition::Temporary);
        assert!(store.lookup(ty(), &Value::Int(1), false).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut store = MemNodeStore::new(Partition::Schema);
        let t = ty();
        store.register(t, Value::Int(3)).unwrap();
        let err = store.register(t, Value::Int(3)).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateNode { .. }));
    }

    #[test]
    fn get_rejects_foreign_partition() {
        let mut store = MemNodeStore::new(Partition::Schema);
        let id = store.lookup(ty(), &Value::Int(0), true).unwrap();
        let foreign = NodeId::new(Partition::Temporary, id.index);
        assert!(store.get(foreign).is_none());
    }

    #[test]
    fn clear_drops_everything() {
        let mut store = MemNodeStore::with_capacity(Partition::Temporary, 4);
        let t = ty();
        store.lookup(t, &Value::Int(0), true);
        store.lookup(t, &Value::Int(1), true);
        store.clear();
        assert!(store.is_empty());
        assert!(store.find(t, &Value::Int(0)).is_none());
    }
}
