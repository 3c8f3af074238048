//! Node types and relations: the typed slots every fact is built from.
//!
//! A [`NodeType`] tags the domain of a node's value. A [`Relation`] is a named
//! n-ary predicate over node types. Both are interned in a [`Schema`] and
//! addressed by small integer ids, so equality is id equality.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{SchemaError, SchemaResult};

/// Prefix of the node type that holds a relation's witness (head) nodes.
pub const WITNESS_PREFIX: &str = "witness-";

/// Identifier of an interned [`NodeType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct NodeTypeId(u32);

impl NodeTypeId {
    /// Get the underlying index.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for NodeTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "nt:{}", self.0)
    }
}

/// Identifier of an interned [`Relation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct RelationId(u32);

impl RelationId {
    /// Get the underlying index.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for RelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rel:{}", self.0)
    }
}

/// The role a node plays in an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ArgPos {
    /// The witness node identifying the fact itself.
    Head,
    /// The i-th argument of the relation.
    Tail(usize),
}

impl std::fmt::Display for ArgPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgPos::Head => write!(f, "HEAD"),
            ArgPos::Tail(i) => write!(f, "{i}"),
        }
    }
}

/// A named tag identifying the domain of a node's value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeType {
    pub id: NodeTypeId,
    pub name: String,
}

/// A named n-ary predicate schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub id: RelationId,
    pub name: String,
    /// One node type per argument position.
    pub arg_types: Vec<NodeTypeId>,
    /// Type of this relation's head (witness) nodes.
    pub witness_type: NodeTypeId,
}

impl Relation {
    pub fn arity(&self) -> usize {
        self.arg_types.len()
    }

    /// Node type expected at `pos`, or `None` if the position is out of range.
    pub fn type_at(&self, pos: ArgPos) -> Option<NodeTypeId> {
        match pos {
            ArgPos::Head => Some(self.witness_type),
            ArgPos::Tail(i) => self.arg_types.get(i).copied(),
        }
    }
}

// ---------------------------------------------------------------------------
// Schema registry
// ---------------------------------------------------------------------------

/// Registry of every node type and relation known to a driver.
///
/// Grows monotonically: document boundaries never remove types or relations.
#[derive(Debug, Default, Clone)]
pub struct Schema {
    node_types: Vec<NodeType>,
    node_type_by_name: HashMap<String, NodeTypeId>,
    relations: Vec<Relation>,
    relation_by_name: HashMap<String, RelationId>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the node type with this name, creating it if necessary.
    pub fn node_type(&mut self, name: &str) -> NodeTypeId {
        if let Some(&id) = self.node_type_by_name.get(name) {
            return id;
        }
        let id = NodeTypeId(self.node_types.len() as u32);
        self.node_types.push(NodeType {
            id,
            name: name.to_string(),
        });
        self.node_type_by_name.insert(name.to_string(), id);
        id
    }

    /// Look up an existing node type by name.
    pub fn lookup_node_type(&self, name: &str) -> Option<NodeTypeId> {
        self.node_type_by_name.get(name).copied()
    }

    pub fn node_type_name(&self, id: NodeTypeId) -> &str {
        self.node_types
            .get(id.0 as usize)
            .map(|t| t.name.as_str())
            .unwrap_or("?")
    }

    /// Declare a relation over the given argument types.
    ///
    /// Declaring the same name twice is allowed only with an identical
    /// signature, in which case the existing id is returned.
    pub fn add_relation(&mut self, name: &str, arg_types: &[NodeTypeId]) -> SchemaResult<RelationId> {
        if let Some(&existing) = self.relation_by_name.get(name) {
            let rel = &self.relations[existing.0 as usize];
            if rel.arg_types == arg_types {
                return Ok(existing);
            }
            return Err(SchemaError::DuplicateRelation {
                name: name.to_string(),
            });
        }
        let witness_type = self.node_type(&format!("{WITNESS_PREFIX}{name}"));
        let id = RelationId(self.relations.len() as u32);
        self.relations.push(Relation {
            id,
            name: name.to_string(),
            arg_types: arg_types.to_vec(),
            witness_type,
        });
        self.relation_by_name.insert(name.to_string(), id);
        tracing::debug!(relation = name, arity = arg_types.len(), "declared relation");
        Ok(id)
    }

    /// Declare a relation by argument type names, creating types as needed.
    pub fn add_relation_by_names(&mut self, name: &str, arg_types: &[&str]) -> SchemaResult<RelationId> {
        let types: Vec<NodeTypeId> = arg_types.iter().map(|t| self.node_type(t)).collect();
        self.add_relation(name, &types)
    }

    pub fn lookup_relation(&self, name: &str) -> Option<RelationId> {
        self.relation_by_name.get(name).copied()
    }

    /// Look up a relation by name, failing if it was never declared.
    pub fn require_relation(&self, name: &str) -> SchemaResult<RelationId> {
        self.lookup_relation(name)
            .ok_or_else(|| SchemaError::UnknownRelation {
                name: name.to_string(),
            })
    }

    /// Relation metadata. Ids only come from this registry, so lookups by id
    /// always succeed for ids it handed out.
    pub fn relation(&self, id: RelationId) -> &Relation {
        &self.relations[id.0 as usize]
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.iter()
    }

    pub fn node_types(&self) -> impl Iterator<Item = &NodeType> {
        self.node_types.iter()
    }

    /// Number of declared relations.
    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }
}
