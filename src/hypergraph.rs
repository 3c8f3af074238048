//! Hypergraph data model: values, nodes, edges and the graph-view vertex.
//!
//! Nodes and edges are immutable value objects addressed by arena ids. The
//! [`HNode`] sum type is the single vertex type of the graph view that pattern
//! matching walks, alternating between facts ([`HNode::Edge`]) and their
//! arguments ([`HNode::Node`]).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::schema::{ArgPos, NodeTypeId, RelationId};

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A hashable, ordered domain value carried by a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Str(Arc<str>),
    /// Used for witness nodes: the tail values of the fact.
    Tuple(Arc<[Value]>),
}

impl Value {
    /// Parse a bare token: integers become [`Value::Int`], everything else a string.
    ///
    /// A token wrapped in double quotes is always a string, with the quotes removed.
    pub fn parse_token(token: &str) -> Self {
        if let Some(inner) = token
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
        {
            return Value::Str(Arc::from(inner));
        }
        match token.parse::<i64>() {
            Ok(i) => Value::Int(i),
            Err(_) => Value::Str(Arc::from(token)),
        }
    }

    pub fn str(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// Storage class of a node or edge.
///
/// Schema entries live for the whole run; temporary entries are discarded at
/// every document boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Partition {
    Schema,
    Temporary,
}

/// Identity of an interned [`HypNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub partition: Partition,
    pub index: u32,
}

impl NodeId {
    pub fn new(partition: Partition, index: u32) -> Self {
        Self { partition, index }
    }

    pub fn is_schema(self) -> bool {
        self.partition == Partition::Schema
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.partition {
            Partition::Schema => write!(f, "n:s{}", self.index),
            Partition::Temporary => write!(f, "n:t{}", self.index),
        }
    }
}

/// Identity of an interned [`HypEdge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId {
    pub partition: Partition,
    pub index: u32,
}

impl EdgeId {
    pub fn new(partition: Partition, index: u32) -> Self {
        Self { partition, index }
    }

    pub fn is_schema(self) -> bool {
        self.partition == Partition::Schema
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.partition {
            Partition::Schema => write!(f, "e:s{}", self.index),
            Partition::Temporary => write!(f, "e:t{}", self.index),
        }
    }
}

// ---------------------------------------------------------------------------
// Nodes and edges
// ---------------------------------------------------------------------------

/// A typed value. At most one node exists per (type, value); see
/// [`crate::store::NodeStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HypNode {
    pub ty: NodeTypeId,
    pub value: Value,
}

impl HypNode {
    pub fn new(ty: NodeTypeId, value: Value) -> Self {
        Self { ty, value }
    }
}

/// One fact: a relation applied to tail nodes, identified by a witness head.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HypEdge {
    pub relation: RelationId,
    pub head: NodeId,
    pub tail: Box<[NodeId]>,
}

impl HypEdge {
    pub fn new(relation: RelationId, head: NodeId, tail: impl Into<Box<[NodeId]>>) -> Self {
        Self {
            relation,
            head,
            tail: tail.into(),
        }
    }

    pub fn arity(&self) -> usize {
        self.tail.len()
    }

    /// Node at `pos`, or `None` if the position is out of range.
    pub fn node_at(&self, pos: ArgPos) -> Option<NodeId> {
        match pos {
            ArgPos::Head => Some(self.head),
            ArgPos::Tail(i) => self.tail.get(i).copied(),
        }
    }

    /// Head followed by every tail node, each with its position.
    pub fn endpoints(&self) -> impl Iterator<Item = (NodeId, ArgPos)> + '_ {
        std::iter::once((self.head, ArgPos::Head)).chain(
            self.tail
                .iter()
                .enumerate()
                .map(|(i, &n)| (n, ArgPos::Tail(i))),
        )
    }
}

/// Vertex of the graph view over the hypergraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HNode {
    Node(NodeId),
    Edge(EdgeId),
}

impl HNode {
    pub fn as_node(self) -> Option<NodeId> {
        match self {
            HNode::Node(n) => Some(n),
            HNode::Edge(_) => None,
        }
    }

    pub fn as_edge(self) -> Option<EdgeId> {
        match self {
            HNode::Edge(e) => Some(e),
            HNode::Node(_) => None,
        }
    }
}

impl From<NodeId> for HNode {
    fn from(n: NodeId) -> Self {
        HNode::Node(n)
    }
}

impl From<EdgeId> for HNode {
    fn from(e: EdgeId) -> Self {
        HNode::Edge(e)
    }
}

impl std::fmt::Display for HNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HNode::Node(n) => write!(f, "{n}"),
            HNode::Edge(e) => write!(f, "{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_token_distinguishes_ints_and_strings() {
        assert_eq!(Value::parse_token("42"), Value::Int(42));
        assert_eq!(Value::parse_token("-3"), Value::Int(-3));
        assert_eq!(Value::parse_token("PER"), Value::str("PER"));
        assert_eq!(Value::parse_token("\"7\""), Value::str("7"));
    }

    #[test]
    fn tuple_display_joins_items() {
        let v = Value::Tuple(Arc::from(vec![Value::Int(0), Value::str("PER")]));
        assert_eq!(v.to_string(), "(0,PER)");
    }

    #[test]
    fn endpoints_yield_head_then_tail() {
        let head = NodeId::new(Partition::Temporary, 9);
        let a = NodeId::new(Partition::Schema, 1);
        let b = NodeId::new(Partition::Temporary, 2);
        let rel = crate::schema::Schema::new()
            .add_relation_by_names("r", &["x", "y"])
            .unwrap();
        let edge = HypEdge::new(rel, head, vec![a, b]);
        let ends: Vec<_> = edge.endpoints().collect();
        assert_eq!(
            ends,
            vec![(head, ArgPos::Head), (a, ArgPos::Tail(0)), (b, ArgPos::Tail(1))]
        );
        assert_eq!(edge.node_at(ArgPos::Tail(1)), Some(b));
        assert_eq!(edge.node_at(ArgPos::Tail(2)), None);
    }
}
