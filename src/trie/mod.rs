//! Trie of graph-traversal paths.
//!
//! Each root-to-node path in a [`TNode`] trie is a walk through the graph view
//! that alternates between facts and their arguments:
//! `[Relation, NodeType, Relation, NodeType, ...]`, with [`TKey::GotoParent`]
//! stepping back up the walk. A node carrying a [`TVal`] marks a complete
//! pattern: when a traversal reaches it, the registered generators and global
//! factors fire.

pub mod matcher;

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::adjoints::Adjoints;
use crate::agenda::{Agenda, AgendaPriority};
use crate::error::{AgendaResult, RuleResult};
use crate::hypergraph::EdgeId;
use crate::schema::{ArgPos, NodeTypeId, RelationId, Schema};
use crate::store::GraphStore;

pub use matcher::{Binding, GraphTraversalTrace, Link, Match, MatchStats};

/// One step of a traversal path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TKey {
    /// Step from a node to a fact of `rel` in which that node sits at `arg`.
    Relation { rel: RelationId, arg: ArgPos },
    /// Step from a fact to its argument at `arg`, which has type `ty`.
    NodeType { ty: NodeTypeId, arg: ArgPos },
    /// Step back to the previous vertex of the walk.
    GotoParent,
}

impl TKey {
    pub fn display<'a>(&'a self, schema: &'a Schema) -> impl fmt::Display + 'a {
        DisplayKey { key: self, schema }
    }
}

struct DisplayKey<'a> {
    key: &'a TKey,
    schema: &'a Schema,
}

impl fmt::Display for DisplayKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key {
            TKey::Relation { rel, arg } => write!(f, "Rel({}@{arg})", self.schema.relation(*rel).name),
            TKey::NodeType { ty, arg } => write!(f, "NT({}@{arg})", self.schema.node_type_name(*ty)),
            TKey::GotoParent => write!(f, "GOTO_PARENT"),
        }
    }
}

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

/// A candidate fact produced by a rule firing.
#[derive(Debug)]
pub struct Candidate {
    pub edge: EdgeId,
    pub score: Box<dyn Adjoints>,
}

/// Rule callback: turns a completed match into new candidate facts.
pub trait TransitionGenerator: fmt::Debug {
    fn generate(&self, bindings: &[Binding], graph: &mut GraphStore) -> RuleResult<Vec<Candidate>>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

/// Rescoring callback: adjusts pending agenda entries when a pattern completes.
pub trait GlobalFactor: fmt::Debug {
    fn rescore(
        &self,
        bindings: &[Binding],
        agenda: &mut Agenda,
        graph: &GraphStore,
        priority: &AgendaPriority,
    ) -> AgendaResult<()>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

/// Value attached to a trie node: everything to fire once the path matches.
#[derive(Debug, Default, Clone)]
pub struct TVal {
    pub generators: Vec<Rc<dyn TransitionGenerator>>,
    pub factors: Vec<Rc<dyn GlobalFactor>>,
}

impl TVal {
    pub fn is_empty(&self) -> bool {
        self.generators.is_empty() && self.factors.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Trie
// ---------------------------------------------------------------------------

/// A trie node.
#[derive(Debug, Default)]
pub struct TNode {
    value: Option<TVal>,
    children: BTreeMap<TKey, TNode>,
}

impl TNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> Option<&TVal> {
        self.value.as_ref()
    }

    pub fn child(&self, key: &TKey) -> Option<&TNode> {
        self.children.get(key)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Walk `path` from this node, creating missing children, and return the
    /// end node.
    pub fn insert_path(&mut self, path: &[TKey]) -> &mut TNode {
        let mut node = self;
        for key in path {
            node = node.children.entry(*key).or_default();
        }
        node
    }

    /// Attach a generator at the end of `path`.
    pub fn add_generator(&mut self, path: &[TKey], generator: Rc<dyn TransitionGenerator>) {
        self.insert_path(path)
            .value
            .get_or_insert_with(TVal::default)
            .generators
            .push(generator);
    }

    /// Attach a global factor at the end of `path`.
    pub fn add_global_factor(&mut self, path: &[TKey], factor: Rc<dyn GlobalFactor>) {
        self.insert_path(path)
            .value
            .get_or_insert_with(TVal::default)
            .factors
            .push(factor);
    }

    /// Every root-to-value path, for diagnostics.
    pub fn paths(&self) -> Vec<(Vec<TKey>, &TVal)> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        self.collect_paths(&mut prefix, &mut out);
        out
    }

    fn collect_paths<'a>(&'a self, prefix: &mut Vec<TKey>, out: &mut Vec<(Vec<TKey>, &'a TVal)>) {
        if let Some(v) = &self.value {
            out.push((prefix.clone(), v));
        }
        for (key, child) in &self.children {
            prefix.push(*key);
            child.collect_paths(prefix, out);
            prefix.pop();
        }
    }

    /// Number of trie nodes, including this one.
    pub fn size(&self) -> usize {
        1 + self.children.values().map(TNode::size).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Nop;

    impl TransitionGenerator for Nop {
        fn generate(&self, _: &[Binding], _: &mut GraphStore) -> RuleResult<Vec<Candidate>> {
            Ok(Vec::new())
        }

        fn name(&self) -> &str {
            "nop"
        }
    }

    #[test]
    fn shared_prefixes_share_nodes() {
        let mut schema = Schema::new();
        let succ = schema.add_relation_by_names("succ", &["i", "i"]).unwrap();
        let i = schema.lookup_node_type("i").unwrap();
        let a = [
            TKey::Relation { rel: succ, arg: ArgPos::Head },
            TKey::NodeType { ty: i, arg: ArgPos::Tail(1) },
        ];
        let b = [
            TKey::Relation { rel: succ, arg: ArgPos::Head },
            TKey::NodeType { ty: i, arg: ArgPos::Tail(0) },
        ];
        let mut root = TNode::new();
        root.add_generator(&a, Rc::new(Nop));
        root.add_generator(&a, Rc::new(Nop));
        root.add_generator(&b, Rc::new(Nop));

        assert_eq!(root.size(), 4);
        let paths = root.paths();
        assert_eq!(paths.len(), 2);
        let at_a = paths.iter().find(|(p, _)| p.as_slice() == a).unwrap();
        assert_eq!(at_a.1.generators.len(), 2);
        assert!(root.value().is_none());
    }

    #[test]
    fn keys_render_with_names() {
        let mut schema = Schema::new();
        let succ = schema.add_relation_by_names("succ", &["tokenIndex", "tokenIndex"]).unwrap();
        let key = TKey::Relation { rel: succ, arg: ArgPos::Tail(0) };
        assert_eq!(key.display(&schema).to_string(), "Rel(succ@0)");
        let ty = schema.lookup_node_type("tokenIndex").unwrap();
        let key = TKey::NodeType { ty, arg: ArgPos::Head };
        assert_eq!(key.display(&schema).to_string(), "NT(tokenIndex@HEAD)");
        assert_eq!(TKey::GotoParent.display(&schema).to_string(), "GOTO_PARENT");
    }
}
