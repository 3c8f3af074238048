//! Interning stores for nodes and edges.
//!
//! - [`MemNodeStore`]: one arena of nodes for a single partition
//! - [`CompositeNodeStore`]: schema and temporary node partitions
//! - [`EdgeStore`]: edges interned by (relation, tail)
//!
//! [`GraphStore`] composes these with the [`Schema`] into the single context
//! object a driver owns. Reads check the schema partition first; per-document
//! data is dropped with [`GraphStore::clear_temporary`].

pub mod composite;
pub mod edge;
pub mod mem;

use std::sync::Arc;

pub use composite::CompositeNodeStore;
pub use edge::EdgeStore;
pub use mem::{MemNodeStore, NodeStore};

use crate::error::{StoreError, StoreResult};
use crate::hypergraph::{EdgeId, HypEdge, HypNode, NodeId, Partition, Value};
use crate::schema::{NodeTypeId, RelationId, Schema};

/// Schema, nodes and edges for one driver.
#[derive(Debug, Default)]
pub struct GraphStore {
    schema: Schema,
    nodes: CompositeNodeStore,
    edges: EdgeStore,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store over an existing schema.
    pub fn with_schema(schema: Schema) -> Self {
        Self {
            schema,
            ..Default::default()
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn schema_mut(&mut self) -> &mut Schema {
        &mut self.schema
    }

    pub fn nodes(&self) -> &CompositeNodeStore {
        &self.nodes
    }

    pub fn edges(&self) -> &EdgeStore {
        &self.edges
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> StoreResult<&HypNode> {
        self.nodes.get(id).ok_or_else(|| StoreError::UnknownNode {
            id: id.to_string(),
        })
    }

    pub fn node_type_of(&self, id: NodeId) -> StoreResult<NodeTypeId> {
        self.node(id).map(|n| n.ty)
    }

    pub fn value_of(&self, id: NodeId) -> StoreResult<&Value> {
        self.node(id).map(|n| &n.value)
    }

    /// Look up a node, optionally creating it in `partition`.
    pub fn lookup_node(
        &mut self,
        ty: NodeTypeId,
        value: &Value,
        create_if_absent: bool,
        partition: Partition,
    ) -> StoreResult<Option<NodeId>> {
        self.nodes.lookup_in(ty, value, create_if_absent, partition)
    }

    /// Return the node for (ty, value), creating it in `partition` if needed.
    pub fn intern_node(&mut self, ty: NodeTypeId, value: &Value, partition: Partition) -> StoreResult<NodeId> {
        self.nodes
            .lookup_in(ty, value, true, partition)?
            .ok_or_else(|| StoreError::UnknownNode {
                id: format!("{ty}={value}"),
            })
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    pub fn edge(&self, id: EdgeId) -> StoreResult<&HypEdge> {
        self.edges.get(id).ok_or_else(|| StoreError::UnknownEdge {
            id: id.to_string(),
        })
    }

    pub fn find_edge(&self, relation: RelationId, tail: &[NodeId]) -> Option<EdgeId> {
        self.edges.find(relation, tail)
    }

    /// Build (or find) the edge `relation(tail)` in `partition`.
    ///
    /// The head is the witness node whose value is the tuple of tail values.
    /// Schema edges may only reference schema nodes.
    pub fn make_edge(&mut self, relation: RelationId, tail: &[NodeId], partition: Partition) -> StoreResult<EdgeId> {
        let rel = self.schema.relation(relation);
        if tail.len() != rel.arity() {
            return Err(StoreError::ArityMismatch {
                relation: rel.name.clone(),
                expected: rel.arity(),
                actual: tail.len(),
            });
        }
        let witness_type = rel.witness_type;

        let mut values = Vec::with_capacity(tail.len());
        for (i, &n) in tail.iter().enumerate() {
            let node = self.node(n)?;
            let expected = rel.arg_types[i];
            if node.ty != expected {
                return Err(StoreError::TypeMismatch {
                    relation: rel.name.clone(),
                    position: i,
                    expected: self.schema.node_type_name(expected).to_string(),
                    actual: self.schema.node_type_name(node.ty).to_string(),
                });
            }
            if partition == Partition::Schema && !n.is_schema() {
                return Err(StoreError::PartitionConflict {
                    ty: self.schema.node_type_name(node.ty).to_string(),
                    value: node.value.to_string(),
                });
            }
            values.push(node.value.clone());
        }

        if let Some(existing) = self.edges.find(relation, tail) {
            if partition == Partition::Schema && !existing.is_schema() {
                return Err(StoreError::PartitionConflict {
                    ty: self.schema.node_type_name(witness_type).to_string(),
                    value: self.format_edge(existing),
                });
            }
            return Ok(existing);
        }

        let witness = Value::Tuple(Arc::from(values));
        let head = self.intern_node(witness_type, &witness, partition)?;
        Ok(self
            .edges
            .intern(HypEdge::new(relation, head, tail), partition))
    }

    /// Build an edge from raw argument values, interning the argument nodes
    /// with the relation's declared types.
    pub fn make_edge_from_values(
        &mut self,
        relation: RelationId,
        values: &[Value],
        partition: Partition,
    ) -> StoreResult<EdgeId> {
        let rel = self.schema.relation(relation);
        if values.len() != rel.arity() {
            return Err(StoreError::ArityMismatch {
                relation: rel.name.clone(),
                expected: rel.arity(),
                actual: values.len(),
            });
        }
        let types = rel.arg_types.clone();
        let mut tail = Vec::with_capacity(values.len());
        for (ty, value) in types.into_iter().zip(values) {
            tail.push(self.intern_node(ty, value, partition)?);
        }
        self.make_edge(relation, &tail, partition)
    }

    /// Drop temporary nodes and edges. Every temporary id becomes invalid.
    pub fn clear_temporary(&mut self) {
        self.nodes.clear_temporary();
        self.edges.clear_temporary();
    }

    /// Render an edge as `rel(v1,v2,...)`.
    pub fn format_edge(&self, id: EdgeId) -> String {
        match self.edge(id) {
            Ok(edge) => self.format_hyp_edge(edge),
            Err(_) => id.to_string(),
        }
    }

    pub fn format_hyp_edge(&self, edge: &HypEdge) -> String {
        let name = &self.schema.relation(edge.relation).name;
        let args: Vec<String> = edge
            .tail
            .iter()
            .map(|&n| match self.value_of(n) {
                Ok(v) => v.to_string(),
                Err(_) => n.to_string(),
            })
            .collect();
        format!("{name}({})", args.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with_succ() -> (GraphStore, RelationId) {
        let mut graph = GraphStore::new();
        let succ = graph
            .schema_mut()
            .add_relation_by_names("succ", &["tokenIndex", "tokenIndex"])
            .unwrap();
        (graph, succ)
    }

    #[test]
    fn make_edge_creates_witness_head() {
        let (mut graph, succ) = graph_with_succ();
        let e = graph
            .make_edge_from_values(succ, &[Value::Int(0), Value::Int(1)], Partition::Temporary)
            .unwrap();
        let edge = graph.edge(e).unwrap().clone();
        let head = graph.node(edge.head).unwrap();
        assert_eq!(graph.schema().node_type_name(head.ty), "witness-succ");
        assert_eq!(head.value.to_string(), "(0,1)");
        assert_eq!(graph.format_edge(e), "succ(0,1)");
    }

    #[test]
    fn equal_facts_share_one_edge() {
        let (mut graph, succ) = graph_with_succ();
        let a = graph
            .make_edge_from_values(succ, &[Value::Int(0), Value::Int(1)], Partition::Temporary)
            .unwrap();
        let b = graph
            .make_edge_from_values(succ, &[Value::Int(0), Value::Int(1)], Partition::Temporary)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        let (mut graph, succ) = graph_with_succ();
        let err = graph
            .make_edge_from_values(succ, &[Value::Int(0)], Partition::Temporary)
            .unwrap_err();
        assert!(matches!(err, StoreError::ArityMismatch { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn schema_edge_rejects_temporary_nodes() {
        let (mut graph, succ) = graph_with_succ();
        let ty = graph.schema().relation(succ).arg_types[0];
        let a = graph.intern_node(ty, &Value::Int(0), Partition::Temporary).unwrap();
        let b = graph.intern_node(ty, &Value::Int(1), Partition::Schema).unwrap();
        let err = graph.make_edge(succ, &[a, b], Partition::Schema).unwrap_err();
        assert!(matches!(err, StoreError::PartitionConflict { .. }));
    }

    #[test]
    fn wrong_argument_type_is_rejected() {
        let mut graph = GraphStore::new();
        let rel = graph
            .schema_mut()
            .add_relation_by_names("ner3", &["tokenIndex", "tag", "bio"])
            .unwrap();
        let tag = graph.schema_mut().node_type("tag");
        let n = graph.intern_node(tag, &Value::str("PER"), Partition::Temporary).unwrap();
        let err = graph.make_edge(rel, &[n, n, n], Partition::Temporary).unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { position: 0, .. }));
    }

    #[test]
    fn clear_temporary_keeps_schema_edges() {
        let (mut graph, succ) = graph_with_succ();
        let s = graph
            .make_edge_from_values(succ, &[Value::Int(0), Value::Int(1)], Partition::Schema)
            .unwrap();
        let t = graph
            .make_edge_from_values(succ, &[Value::Int(5), Value::Int(6)], Partition::Temporary)
            .unwrap();
        graph.clear_temporary();
        assert!(graph.edge(s).is_ok());
        assert!(graph.edge(t).is_err());
    }
}
