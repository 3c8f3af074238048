//! Rule compilation: type checking and trie path construction.
//!
//! A rule is viewed as a bipartite graph between its premises and its join
//! variables (variables shared by two or more premises). For every premise a
//! DFS rooted at that premise yields one trie path: discovering a premise
//! steps onto a fact ([`TKey::Relation`]), discovering a variable steps onto
//! an argument node ([`TKey::NodeType`]) and finishing a vertex steps back
//! ([`TKey::GotoParent`]). Rooting at every premise means a new fact can
//! complete the rule whichever premise it satisfies.
//!
//! Joins that are not DFS tree edges, repeated variables within one premise
//! and constants are checked when the rule fires.

use std::collections::HashMap;

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::{DfsEvent, depth_first_search};
use tracing::debug;

use crate::error::{RuleError, RuleResult};
use crate::schema::{ArgPos, NodeTypeId, RelationId, Schema};
use crate::trie::TKey;

use super::{Arg, Rule, Term};

/// One trie path for a rule, rooted at premise `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPath {
    pub root: usize,
    pub keys: Vec<TKey>,
    /// Premise index bound by each [`TKey::Relation`] step, in path order.
    pub term_order: Vec<usize>,
}

/// A type-checked rule with one path per premise.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: Rule,
    pub lhs_relations: Vec<RelationId>,
    pub rhs_relation: RelationId,
    pub var_types: HashMap<String, NodeTypeId>,
    pub paths: Vec<CompiledPath>,
}

impl CompiledRule {
    /// Render every path with relation and type names.
    pub fn describe_paths(&self, schema: &Schema) -> Vec<String> {
        self.paths
            .iter()
            .map(|p| {
                let keys: Vec<String> = p.keys.iter().map(|k| k.display(schema).to_string()).collect();
                format!("[{}]", keys.join(", "))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vertex {
    Term(usize),
    Var(usize),
}

/// Type-check `rule` against `schema` and build its trie paths.
///
/// A conclusion relation that is not declared yet is declared with the types
/// of its (variable) arguments.
pub fn compile(rule: &Rule, schema: &mut Schema) -> RuleResult<CompiledRule> {
    let text = rule.to_string();

    let mut lhs_relations = Vec::with_capacity(rule.lhs.len());
    let mut var_types: HashMap<String, NodeTypeId> = HashMap::new();
    for term in &rule.lhs {
        let rel = resolve(&text, term, schema)?;
        lhs_relations.push(rel);
        let relation = schema.relation(rel);
        for (pos, arg) in term.positions() {
            let Arg::Var(v) = arg else { continue };
            let ty = relation.type_at(pos).ok_or_else(|| RuleError::Arity {
                rule: text.clone(),
                relation: term.relation.clone(),
                expected: relation.arity(),
                actual: term.args.len(),
            })?;
            bind_type(&text, &mut var_types, &v, ty, schema)?;
        }
    }

    for arg in &rule.rhs.args {
        if let Arg::Var(v) = arg {
            if !var_types.contains_key(v) {
                return Err(RuleError::UnboundVariable {
                    rule: text.clone(),
                    variable: v.clone(),
                });
            }
        }
    }

    let rhs_relation = match schema.lookup_relation(&rule.rhs.relation) {
        Some(rel) => {
            check_arity(&text, &rule.rhs, schema, rel)?;
            let relation = schema.relation(rel);
            for (i, arg) in rule.rhs.args.iter().enumerate() {
                if let Arg::Var(v) = arg {
                    let declared = relation.arg_types[i];
                    let bound = var_types[v];
                    if declared != bound {
                        return Err(RuleError::TypeMismatch {
                            rule: text.clone(),
                            variable: v.clone(),
                            first: schema.node_type_name(bound).to_string(),
                            second: schema.node_type_name(declared).to_string(),
                        });
                    }
                }
            }
            rel
        }
        None => {
            let mut types = Vec::with_capacity(rule.rhs.args.len());
            for arg in &rule.rhs.args {
                match arg {
                    Arg::Var(v) => types.push(var_types[v]),
                    Arg::Const(c) => {
                        return Err(RuleError::Parse {
                            rule: text.clone(),
                            message: format!(
                                "cannot infer the type of constant {c} in undeclared relation {}",
                                rule.rhs.relation
                            ),
                        });
                    }
                }
            }
            debug!(relation = %rule.rhs.relation, "declaring conclusion relation");
            schema.add_relation(&rule.rhs.relation, &types)?
        }
    };

    let paths = build_paths(&text, rule, &lhs_relations, &var_types)?;
    Ok(CompiledRule {
        rule: rule.clone(),
        lhs_relations,
        rhs_relation,
        var_types,
        paths,
    })
}

fn resolve(text: &str, term: &Term, schema: &Schema) -> RuleResult<RelationId> {
    let rel = schema
        .lookup_relation(&term.relation)
        .ok_or_else(|| RuleError::UnknownRelation {
            rule: text.to_string(),
            relation: term.relation.clone(),
        })?;
    check_arity(text, term, schema, rel)?;
    Ok(rel)
}

fn check_arity(text: &str, term: &Term, schema: &Schema, rel: RelationId) -> RuleResult<()> {
    let expected = schema.relation(rel).arity();
    if term.args.len() != expected {
        return Err(RuleError::Arity {
            rule: text.to_string(),
            relation: term.relation.clone(),
            expected,
            actual: term.args.len(),
        });
    }
    Ok(())
}

fn bind_type(
    text: &str,
    var_types: &mut HashMap<String, NodeTypeId>,
    var: &str,
    ty: NodeTypeId,
    schema: &Schema,
) -> RuleResult<()> {
    match var_types.get(var) {
        Some(&prev) if prev != ty => Err(RuleError::TypeMismatch {
            rule: text.to_string(),
            variable: var.to_string(),
            first: schema.node_type_name(prev).to_string(),
            second: schema.node_type_name(ty).to_string(),
        }),
        Some(_) => Ok(()),
        None => {
            var_types.insert(var.to_string(), ty);
            Ok(())
        }
    }
}

fn build_paths(
    text: &str,
    rule: &Rule,
    lhs_relations: &[RelationId],
    var_types: &HashMap<String, NodeTypeId>,
) -> RuleResult<Vec<CompiledPath>> {
    // Join variables, in order of first appearance.
    let mut joins: Vec<String> = Vec::new();
    for (i, term) in rule.lhs.iter().enumerate() {
        for v in term.variables() {
            let shared = rule
                .lhs
                .iter()
                .enumerate()
                .any(|(j, other)| j != i && other.variables().contains(&v));
            if shared && !joins.contains(&v) {
                joins.push(v);
            }
        }
    }

    // Edge weight: where the variable sits in the premise.
    let mut graph: UnGraph<Vertex, ArgPos> = UnGraph::new_undirected();
    let terms: Vec<NodeIndex> = (0..rule.lhs.len())
        .map(|i| graph.add_node(Vertex::Term(i)))
        .collect();
    let vars: Vec<NodeIndex> = (0..joins.len())
        .map(|k| graph.add_node(Vertex::Var(k)))
        .collect();
    for (i, term) in rule.lhs.iter().enumerate() {
        for (k, var) in joins.iter().enumerate() {
            let first = term
                .positions()
                .into_iter()
                .find(|(_, a)| matches!(a, Arg::Var(v) if v == var));
            if let Some((pos, _)) = first {
                graph.add_edge(terms[i], vars[k], pos);
            }
        }
    }

    let mut paths = Vec::with_capacity(rule.lhs.len());
    for (root, &root_ix) in terms.iter().enumerate() {
        let mut keys = vec![TKey::Relation {
            rel: lhs_relations[root],
            arg: ArgPos::Head,
        }];
        let mut term_order = vec![root];
        depth_first_search(&graph, Some(root_ix), |event| match event {
            DfsEvent::TreeEdge(u, v) => {
                let Some(e) = graph.find_edge(u, v) else { return };
                let pos = graph[e];
                match (graph[u], graph[v]) {
                    (Vertex::Term(_), Vertex::Var(k)) => keys.push(TKey::NodeType {
                        ty: var_types[&joins[k]],
                        arg: pos,
                    }),
                    (Vertex::Var(_), Vertex::Term(t)) => {
                        keys.push(TKey::Relation {
                            rel: lhs_relations[t],
                            arg: pos,
                        });
                        term_order.push(t);
                    }
                    _ => {}
                }
            }
            DfsEvent::Finish(v, _) if v != root_ix => keys.push(TKey::GotoParent),
            _ => {}
        });
        while keys.last() == Some(&TKey::GotoParent) {
            keys.pop();
        }
        if term_order.len() != rule.lhs.len() {
            return Err(RuleError::Disconnected {
                rule: text.to_string(),
            });
        }
        paths.push(CompiledPath {
            root,
            keys,
            term_order,
        });
    }
    Ok(paths)
}
