//! Schema/temporary split over two [`MemNodeStore`]s.
//!
//! Constants that persist across a corpus live in the schema partition;
//! per-document scratch nodes live in the temporary partition and are bulk
//! cleared at document boundaries.

use crate::error::{StoreError, StoreResult};
use crate::hypergraph::{HypNode, NodeId, Partition, Value};
use crate::schema::NodeTypeId;

use super::mem::{MemNodeStore, NodeStore};

/// Node store partitioned into long-lived and per-document nodes.
#[derive(Debug)]
pub struct CompositeNodeStore {
    schema: MemNodeStore,
    temporary: MemNodeStore,
}

impl CompositeNodeStore {
    pub fn new() -> Self {
        Self {
            schema: MemNodeStore::new(Partition::Schema),
            temporary: MemNodeStore::new(Partition::Temporary),
        }
    }

    /// Look up (ty, value), creating it in `partition` if absent and requested.
    ///
    /// Existing schema nodes always win. Asking for a schema node whose pair is
    /// already temporary is a [`StoreError::PartitionConflict`]: moving it would
    /// invalidate the temporary id other structures may hold.
    pub fn lookup_in(
        &mut self,
        ty: NodeTypeId,
        value: &Value,
        create_if_absent: bool,
        partition: Partition,
    ) -> StoreResult<Option<NodeId>> {
        if let Some(found) = self.schema.find(ty, value) {
            return Ok(Some(found));
        }
        match partition {
            Partition::Temporary => Ok(self.temporary.lookup(ty, value, create_if_absent)),
            Partition::Schema => {
                if self.temporary.find(ty, value).is_some() {
                    return Err(StoreError::PartitionConflict {
                        ty: ty.to_string(),
                        value: value.to_string(),
                    });
                }
                Ok(self.schema.lookup(ty, value, create_if_absent))
            }
        }
    }

    /// Drop every temporary node; schema nodes are untouched.
    pub fn clear_temporary(&mut self) {
        self.temporary.clear();
    }

    pub fn schema_nodes(&self) -> &MemNodeStore {
        &self.schema
    }

    pub fn temporary_nodes(&self) -> &MemNodeStore {
        &self.temporary
    }
}

impl Default for CompositeNodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeStore for CompositeNodeStore {
    /// Creates missing nodes in the temporary partition.
    fn lookup(&mut self, ty: NodeTypeId, value: &Value, create_if_absent: bool) -> Option<NodeId> {
        if let Some(found) = self.schema.find(ty, value) {
            return Some(found);
        }
        self.temporary.lookup(ty, value, create_if_absent)
    }

    fn find(&self, ty: NodeTypeId, value: &Value) -> Option<NodeId> {
        self.schema
            .find(ty, value)
            .or_else(|| self.temporary.find(ty, value))
    }

    fn get(&self, id: NodeId) -> Option<&HypNode> {
        match id.partition {
            Partition::Schema => self.schema.get(id),
            Partition::Temporary => self.temporary.get(id),
        }
    }

    fn len(&self) -> usize {
        self.schema.len() + self.temporary.len()
    }

    fn clear(&mut self) {
        self.schema.clear();
        self.temporary.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    #[test]
    fn schema_node_survives_clear_temporary() {
        let mut schema = Schema::new();
        let tag = schema.node_type("tag");
        let mut store = CompositeNodeStore::new();

        let per = store
            .lookup_in(tag, &Value::str("PER"), true, Partition::Schema)
            .unwrap()
            .unwrap();
        let tmp = store
            .lookup_in(tag, &Value::str("LOC"), true, Partition::Temporary)
            .unwrap()
            .unwrap();
        assert!(per.is_schema());
        assert!(!tmp.is_schema());

        store.clear_temporary();
        assert_eq!(store.find(tag, &Value::str("PER")), Some(per));
        assert!(store.find(tag, &Value::str("LOC")).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn temporary_lookup_reuses_schema_node() {
        let mut schema = Schema::new();
        let tag = schema.node_type("tag");
        let mut store = CompositeNodeStore::new();
        let per = store
            .lookup_in(tag, &Value::str("PER"), true, Partition::Schema)
            .unwrap();
        let again = store.lookup(tag, &Value::str("PER"), true);
        assert_eq!(per, again);
        assert!(store.temporary_nodes().is_empty());
    }

    #[test]
    fn promoting_temporary_node_is_a_conflict() {
        let mut schema = Schema::new();
        let tag = schema.node_type("tag");
        let mut store = CompositeNodeStore::new();
        store.lookup(tag, &Value::str("PER"), true);
        let err = store
            .lookup_in(tag, &Value::str("PER"), true, Partition::Schema)
            .unwrap_err();
        assert!(matches!(err, StoreError::PartitionConflict { .. }));
    }
}
