//! Decision functions: accept or reject the candidate popped off the agenda.
//!
//! A decision answers `Some(true)` (commit), `Some(false)` (reject) or `None`
//! (not applicable, let someone else decide). Functions compose: a
//! [`Cascade`] asks its members in order, [`Unanimous`] requires agreement,
//! and [`DispatchByRelation`] routes by relation.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::{DecisionError, DecisionResult};
use crate::hypergraph::{HypEdge, NodeId};
use crate::rules::{Arg, Term};
use crate::schema::{RelationId, Schema};

/// Policy deciding whether a candidate fact is committed.
pub trait DecisionFunction: fmt::Debug {
    /// `None` means this function does not apply to `edge`.
    fn decide(&mut self, edge: &HypEdge, score: f64) -> DecisionResult<Option<bool>>;

    /// Called after `edge` has been added to the state.
    fn committed(&mut self, _edge: &HypEdge) {}

    /// Forget per-document state.
    fn clear(&mut self) {}

    /// Short description used in logs and errors.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// Threshold
// ---------------------------------------------------------------------------

/// Commit iff `score > threshold`, optionally only for one relation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constant {
    pub threshold: f64,
    pub relation: Option<RelationId>,
}

impl Constant {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            relation: None,
        }
    }

    pub fn for_relation(threshold: f64, relation: RelationId) -> Self {
        Self {
            threshold,
            relation: Some(relation),
        }
    }
}

impl DecisionFunction for Constant {
    fn decide(&mut self, edge: &HypEdge, score: f64) -> DecisionResult<Option<bool>> {
        match self.relation {
            Some(rel) if rel != edge.relation => Ok(None),
            _ => Ok(Some(score > self.threshold)),
        }
    }

    fn describe(&self) -> String {
        match self.relation {
            Some(rel) => format!("score > {} for {rel}", self.threshold),
            None => format!("score > {}", self.threshold),
        }
    }
}

// ---------------------------------------------------------------------------
// Group constraints
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMode {
    AtLeastOne,
    AtMostOne,
    ExactlyOne,
}

impl GroupMode {
    fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "AT_LEAST_ONE" => Some(GroupMode::AtLeastOne),
            "AT_MOST_ONE" => Some(GroupMode::AtMostOne),
            "EXACTLY_ONE" => Some(GroupMode::ExactlyOne),
            _ => None,
        }
    }
}

impl fmt::Display for GroupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GroupMode::AtLeastOne => "AT_LEAST_ONE",
            GroupMode::AtMostOne => "AT_MOST_ONE",
            GroupMode::ExactlyOne => "EXACTLY_ONE",
        })
    }
}

/// Cardinality constraint over groups of one relation's facts.
///
/// Facts are grouped by the tail nodes at `key_args`. Since the agenda pops
/// the best candidate first, the first fact seen per group is that group's
/// best.
#[derive(Debug, Clone)]
pub struct ByGroup {
    mode: GroupMode,
    relation: RelationId,
    key_args: Vec<usize>,
    seen: HashSet<Vec<NodeId>>,
    label: String,
}

impl ByGroup {
    pub fn new(mode: GroupMode, relation: RelationId, key_args: Vec<usize>, schema: &Schema) -> DecisionResult<Self> {
        let rel = schema.relation(relation);
        let label = format!("{mode}:{}:{key_args:?}", rel.name);
        let invalid = |message: String| DecisionError::Parse {
            description: label.clone(),
            message,
        };
        if key_args.len() >= rel.arity() {
            return Err(invalid(format!(
                "at most {} key arguments for {}",
                rel.arity().saturating_sub(1),
                rel.name
            )));
        }
        let mut uniq = HashSet::new();
        for &k in &key_args {
            if k >= rel.arity() {
                return Err(invalid(format!("{} has no argument {k}", rel.name)));
            }
            if !uniq.insert(k) {
                return Err(invalid(format!("key argument {k} is repeated")));
            }
        }
        Ok(Self {
            mode,
            relation,
            key_args,
            seen: HashSet::new(),
            label,
        })
    }

    /// Parse `MODE:rel(v1,...,vn):vi:vj`, e.g. `AT_LEAST_ONE:ner3(i,t,b):i`.
    pub fn parse(description: &str, schema: &Schema) -> DecisionResult<Self> {
        let err = |message: String| DecisionError::Parse {
            description: description.to_string(),
            message,
        };
        let (mode, rest) = description
            .trim()
            .split_once(':')
            .ok_or_else(|| err("expected MODE:term:arg".to_string()))?;
        let mode = GroupMode::parse(mode).ok_or_else(|| err(format!("unknown mode {mode}")))?;
        let mut parts = rest.split(':');
        let term = parts.next().unwrap_or_default();
        let term = Term::parse(term, description).map_err(|e| err(e.to_string()))?;
        let relation = schema
            .lookup_relation(&term.relation)
            .ok_or_else(|| err(format!("no relation named {}", term.relation)))?;
        if term.args.len() != schema.relation(relation).arity() {
            return Err(err(format!(
                "{} takes {} arguments",
                term.relation,
                schema.relation(relation).arity()
            )));
        }
        let mut key_args = Vec::new();
        for name in parts {
            let name = name.trim();
            let pos = term
                .args
                .iter()
                .position(|a| matches!(a, Arg::Var(v) if v == name))
                .ok_or_else(|| err(format!("no argument named {name} in {term}")))?;
            key_args.push(pos);
        }
        if key_args.is_empty() {
            return Err(err("at least one key argument is required".to_string()));
        }
        let mut group = Self::new(mode, relation, key_args, schema)?;
        group.label = description.trim().to_string();
        Ok(group)
    }

    pub fn mode(&self) -> GroupMode {
        self.mode
    }

    pub fn relation(&self) -> RelationId {
        self.relation
    }

    fn key(&self, edge: &HypEdge) -> Vec<NodeId> {
        self.key_args.iter().map(|&k| edge.tail[k]).collect()
    }
}

impl DecisionFunction for ByGroup {
    fn decide(&mut self, edge: &HypEdge, _score: f64) -> DecisionResult<Option<bool>> {
        if edge.relation != self.relation {
            return Ok(None);
        }
        let key = self.key(edge);
        Ok(match self.mode {
            GroupMode::AtLeastOne | GroupMode::ExactlyOne => Some(self.seen.insert(key)),
            GroupMode::AtMostOne => self.seen.contains(&key).then_some(false),
        })
    }

    fn committed(&mut self, edge: &HypEdge) {
        if self.mode == GroupMode::AtMostOne && edge.relation == self.relation {
            let key = self.key(edge);
            self.seen.insert(key);
        }
    }

    fn clear(&mut self) {
        self.seen.clear();
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

// ---------------------------------------------------------------------------
// Combinators
// ---------------------------------------------------------------------------

/// Ask `first`; if it does not apply, ask `rest`.
#[derive(Debug)]
pub struct Cascade {
    pub first: Box<dyn DecisionFunction>,
    pub rest: Box<dyn DecisionFunction>,
}

impl Cascade {
    pub fn new(first: Box<dyn DecisionFunction>, rest: Box<dyn DecisionFunction>) -> Self {
        Self { first, rest }
    }
}

impl DecisionFunction for Cascade {
    fn decide(&mut self, edge: &HypEdge, score: f64) -> DecisionResult<Option<bool>> {
        match self.first.decide(edge, score)? {
            Some(answer) => Ok(Some(answer)),
            None => self.rest.decide(edge, score),
        }
    }

    fn committed(&mut self, edge: &HypEdge) {
        self.first.committed(edge);
        self.rest.committed(edge);
    }

    fn clear(&mut self) {
        self.first.clear();
        self.rest.clear();
    }

    fn describe(&self) -> String {
        format!("{} then {}", self.first.describe(), self.rest.describe())
    }
}

/// Every applicable member must give the same answer.
#[derive(Debug, Default)]
pub struct Unanimous(pub Vec<Box<dyn DecisionFunction>>);

impl DecisionFunction for Unanimous {
    fn decide(&mut self, edge: &HypEdge, score: f64) -> DecisionResult<Option<bool>> {
        let mut agreed: Option<(bool, String)> = None;
        for member in &mut self.0 {
            let Some(answer) = member.decide(edge, score)? else {
                continue;
            };
            if let Some((first_answer, first)) = &agreed {
                if *first_answer != answer {
                    return Err(DecisionError::Disagreement {
                        edge: format!("{}{:?}", edge.relation, edge.tail),
                        first: first.clone(),
                        first_answer: *first_answer,
                        second: member.describe(),
                        second_answer: answer,
                    });
                }
            } else {
                agreed = Some((answer, member.describe()));
            }
        }
        Ok(agreed.map(|(answer, _)| answer))
    }

    fn committed(&mut self, edge: &HypEdge) {
        for member in &mut self.0 {
            member.committed(edge);
        }
    }

    fn clear(&mut self) {
        for member in &mut self.0 {
            member.clear();
        }
    }

    fn describe(&self) -> String {
        let parts: Vec<String> = self.0.iter().map(|m| m.describe()).collect();
        format!("unanimous({})", parts.join(", "))
    }
}

/// Route each candidate to its relation's function, else to `default`.
#[derive(Debug)]
pub struct DispatchByRelation {
    by_relation: HashMap<RelationId, Box<dyn DecisionFunction>>,
    default: Box<dyn DecisionFunction>,
}

impl DispatchByRelation {
    pub fn new(default: Box<dyn DecisionFunction>) -> Self {
        Self {
            by_relation: HashMap::new(),
            default,
        }
    }

    /// Register `f` for `relation`. An existing function for the relation is
    /// asked first.
    pub fn add(&mut self, relation: RelationId, f: Box<dyn DecisionFunction>) {
        let combined = match self.by_relation.remove(&relation) {
            Some(existing) => Box::new(Cascade::new(existing, f)),
            None => f,
        };
        self.by_relation.insert(relation, combined);
    }

    pub fn set_default(&mut self, default: Box<dyn DecisionFunction>) {
        self.default = default;
    }

    pub fn get(&self, relation: RelationId) -> Option<&dyn DecisionFunction> {
        self.by_relation.get(&relation).map(|f| &**f)
    }
}

impl DecisionFunction for DispatchByRelation {
    fn decide(&mut self, edge: &HypEdge, score: f64) -> DecisionResult<Option<bool>> {
        if let Some(f) = self.by_relation.get_mut(&edge.relation) {
            if let Some(answer) = f.decide(edge, score)? {
                return Ok(Some(answer));
            }
        }
        self.default.decide(edge, score)
    }

    fn committed(&mut self, edge: &HypEdge) {
        if let Some(f) = self.by_relation.get_mut(&edge.relation) {
            f.committed(edge);
        }
        self.default.committed(edge);
    }

    fn clear(&mut self) {
        for f in self.by_relation.values_mut() {
            f.clear();
        }
        self.default.clear();
    }

    fn describe(&self) -> String {
        format!(
            "dispatch({} relations, default {})",
            self.by_relation.len(),
            self.default.describe()
        )
    }
}
