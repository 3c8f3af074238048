//! The driver: owns every structure and runs the inference loop.
//!
//! [`Uberts`] pops the best candidate off the agenda, asks the decision
//! function whether to commit it, and on commit matches the new fact against
//! the rule trie. Matched rules propose new candidates; matched global
//! factors rescore pending ones. The loop ends when the agenda is empty.

use std::rc::Rc;

use serde::Serialize;

use crate::adjoints::{Adjoints, Constant as ConstantScore};
use crate::agenda::{Agenda, AgendaPriority};
use crate::config::{InferenceMode, UbertsConfig};
use crate::decision::{ByGroup, Constant, DecisionFunction, DispatchByRelation};
use crate::error::UbertsResult;
use crate::facts::FactLine;
use crate::hypergraph::{EdgeId, HypEdge, NodeId, Partition, Value};
use crate::labels::{Label, Labels, Perf};
use crate::rules::{CompiledRule, ConstantScorer, Rule, RuleGenerator, Scorer, compile};
use crate::schema::{ArgPos, NodeTypeId, RelationId};
use crate::state::State;
use crate::store::GraphStore;
use crate::trie::{GlobalFactor, TKey, TNode};

/// Relation created on demand for `startdoc` lines.
pub const START_DOC_RELATION: &str = "startDoc";

/// Counters for one [`Uberts::run`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub pops: usize,
    pub commits: usize,
    pub rejects: usize,
    /// Rejects because no decision function applied.
    pub undecided: usize,
    /// Completed trie patterns.
    pub matches: usize,
    /// Rule generator invocations.
    pub rule_firings: usize,
    /// Candidates proposed by rules.
    pub generated: usize,
    /// Candidates skipped because they were already pending or committed.
    pub duplicates: usize,
    /// The run stopped at `max_pops` with work left.
    pub hit_pop_limit: bool,
}

impl RunStats {
    fn since(&self, earlier: &RunStats) -> RunStats {
        RunStats {
            pops: self.pops - earlier.pops,
            commits: self.commits - earlier.commits,
            rejects: self.rejects - earlier.rejects,
            undecided: self.undecided - earlier.undecided,
            matches: self.matches - earlier.matches,
            rule_firings: self.rule_firings - earlier.rule_firings,
            generated: self.generated - earlier.generated,
            duplicates: self.duplicates - earlier.duplicates,
            hit_pop_limit: false,
        }
    }
}

/// What happened to a popped candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Committed(EdgeId),
    Rejected(EdgeId),
    /// Accepted, but the fact had been committed directly while pending.
    AlreadyCommitted(EdgeId),
}

/// One pop of a run: the candidate, its score, its gold label, what the
/// decision functions answered and what was done.
#[derive(Debug)]
pub struct Step {
    pub edge: EdgeId,
    pub score: Box<dyn Adjoints>,
    pub label: Label,
    /// The decision functions' answer; `None` when none applied.
    pub predicted: Option<bool>,
    pub outcome: StepOutcome,
}

impl Step {
    /// The decision functions disagreed with a known gold label.
    pub fn is_mistake(&self) -> bool {
        let gold = match self.label {
            Label::Gold => true,
            Label::NotGold => false,
            Label::Unknown => return false,
        };
        self.predicted.unwrap_or(false) != gold
    }

    /// On a mistake, push a perceptron gradient into the score: a gold fact
    /// should have scored higher, a non-gold one lower. Returns whether a
    /// gradient was pushed.
    pub fn backwards(&mut self) -> bool {
        if !self.is_mistake() {
            return false;
        }
        let d_err = if self.label == Label::Gold { -1.0 } else { 1.0 };
        self.score.backwards(d_err);
        true
    }
}

/// The inference engine.
#[derive(Debug)]
pub struct Uberts {
    config: UbertsConfig,
    graph: GraphStore,
    state: State,
    agenda: Agenda,
    trie: TNode,
    priority: AgendaPriority,
    decision: DispatchByRelation,
    default_scorer: Rc<dyn Scorer>,
    rules: Vec<Rc<CompiledRule>>,
    labels: Labels,
    stats: RunStats,
}

impl Default for Uberts {
    fn default() -> Self {
        let config = UbertsConfig::default();
        Self {
            decision: DispatchByRelation::new(Box::new(Constant::new(config.default_threshold))),
            default_scorer: Rc::new(ConstantScorer(config.default_rule_score)),
            config,
            graph: GraphStore::new(),
            state: State::new(),
            agenda: Agenda::new(),
            trie: TNode::new(),
            priority: AgendaPriority::default(),
            rules: Vec::new(),
            labels: Labels::new(),
            stats: RunStats::default(),
        }
    }
}

impl Uberts {
    /// Create a driver from a configuration.
    ///
    /// Group decisions listed in the config need their relations, so they are
    /// installed later by [`Uberts::install_config_decisions`].
    pub fn new(config: UbertsConfig) -> UbertsResult<Self> {
        let priority = config.agenda_priority()?;
        tracing::info!(
            priority = %config.priority,
            threshold = config.default_threshold,
            rule_score = config.default_rule_score,
            "initializing uberts"
        );
        Ok(Self {
            decision: DispatchByRelation::new(Box::new(Constant::new(config.default_threshold))),
            default_scorer: Rc::new(ConstantScorer(config.default_rule_score)),
            priority,
            config,
            ..Default::default()
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &UbertsConfig {
        &self.config
    }

    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut GraphStore {
        &mut self.graph
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn agenda(&self) -> &Agenda {
        &self.agenda
    }

    pub fn trie(&self) -> &TNode {
        &self.trie
    }

    pub fn priority(&self) -> &AgendaPriority {
        &self.priority
    }

    pub fn rules(&self) -> &[Rc<CompiledRule>] {
        &self.rules
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn labels_mut(&mut self) -> &mut Labels {
        &mut self.labels
    }

    /// Counters accumulated since the last [`Uberts::clear_document`].
    pub fn stats(&self) -> RunStats {
        self.stats
    }

    // -----------------------------------------------------------------------
    // Schema and construction
    // -----------------------------------------------------------------------

    pub fn add_node_type(&mut self, name: &str) -> NodeTypeId {
        self.graph.schema_mut().node_type(name)
    }

    /// Declare `name(types...)`, creating node types as needed.
    pub fn add_relation(&mut self, name: &str, arg_types: &[&str]) -> UbertsResult<RelationId> {
        Ok(self.graph.schema_mut().add_relation_by_names(name, arg_types)?)
    }

    pub fn relation(&self, name: &str) -> UbertsResult<RelationId> {
        Ok(self.graph.schema().require_relation(name)?)
    }

    /// Look up a temporary-or-schema node, creating a temporary one if asked.
    pub fn lookup_node(&mut self, ty: NodeTypeId, value: &Value, create: bool) -> UbertsResult<Option<NodeId>> {
        Ok(self.graph.lookup_node(ty, value, create, Partition::Temporary)?)
    }

    pub fn make_edge(&mut self, relation: RelationId, tail: &[NodeId], partition: Partition) -> UbertsResult<EdgeId> {
        Ok(self.graph.make_edge(relation, tail, partition)?)
    }

    pub fn make_edge_from_values(
        &mut self,
        relation: RelationId,
        values: &[Value],
        partition: Partition,
    ) -> UbertsResult<EdgeId> {
        Ok(self.graph.make_edge_from_values(relation, values, partition)?)
    }

    // -----------------------------------------------------------------------
    // Rules, factors, policies
    // -----------------------------------------------------------------------

    /// Compile a rule and register one generator per premise ordering,
    /// scoring conclusions with the default rule score.
    pub fn add_rule(&mut self, text: &str) -> UbertsResult<Rc<CompiledRule>> {
        let scorer = self.default_scorer.clone();
        self.add_rule_with_scorer(text, scorer)
    }

    pub fn add_rule_with_scorer(&mut self, text: &str, scorer: Rc<dyn Scorer>) -> UbertsResult<Rc<CompiledRule>> {
        let rule = Rule::parse(text)?;
        self.register_rule(&rule, scorer)
    }

    /// Register an already parsed rule with the default rule score.
    pub fn add_parsed_rule(&mut self, rule: &Rule) -> UbertsResult<Rc<CompiledRule>> {
        let scorer = self.default_scorer.clone();
        self.register_rule(rule, scorer)
    }

    fn register_rule(&mut self, rule: &Rule, scorer: Rc<dyn Scorer>) -> UbertsResult<Rc<CompiledRule>> {
        let compiled = Rc::new(compile(rule, self.graph.schema_mut())?);
        for (i, path) in compiled.paths.iter().enumerate() {
            let generator = RuleGenerator::new(compiled.clone(), i, scorer.clone());
            self.trie.add_generator(&path.keys, Rc::new(generator));
        }
        tracing::debug!(
            rule = %rule,
            paths = compiled.paths.len(),
            trie_size = self.trie.size(),
            "rule added"
        );
        self.rules.push(compiled.clone());
        Ok(compiled)
    }

    /// Run `factor` whenever a fact of `relation` is committed.
    pub fn add_global_factor(&mut self, relation: RelationId, factor: Rc<dyn GlobalFactor>) {
        tracing::debug!(
            relation = %self.graph.schema().relation(relation).name,
            factor = factor.name(),
            "global factor added"
        );
        self.trie.add_global_factor(
            &[TKey::Relation {
                rel: relation,
                arg: ArgPos::Head,
            }],
            factor,
        );
    }

    /// Replace the agenda priority and re-prioritize pending candidates.
    pub fn set_priority(&mut self, priority: AgendaPriority) -> UbertsResult<()> {
        self.priority = priority;
        let pending: Vec<EdgeId> = self.agenda.iter().map(|(e, _, _)| e).collect();
        for id in pending {
            let edge = self.graph.edge(id)?;
            let priority = &self.priority;
            let graph = &self.graph;
            self.agenda.update_score(id, |score| {
                let p = priority.priority(edge, score.as_ref(), graph);
                (score, p)
            })?;
        }
        Ok(())
    }

    /// Replace the fallback decision used when no per-relation function applies.
    pub fn set_decision_function(&mut self, f: Box<dyn DecisionFunction>) {
        self.decision.set_default(f);
    }

    /// Add a decision function for one relation, asked before any existing one.
    pub fn add_decision_for(&mut self, relation: RelationId, f: Box<dyn DecisionFunction>) {
        self.decision.add(relation, f);
    }

    /// Add a group constraint such as `AT_LEAST_ONE:ner3(i,t,b):i`.
    pub fn add_decision(&mut self, description: &str) -> UbertsResult<()> {
        let group = ByGroup::parse(description, self.graph.schema())?;
        tracing::debug!(decision = description, "group decision added");
        self.decision.add(group.relation(), Box::new(group));
        Ok(())
    }

    /// Install the group decisions listed in the config.
    pub fn install_config_decisions(&mut self) -> UbertsResult<()> {
        let descriptions = self.config.decisions.clone();
        for d in &descriptions {
            self.add_decision(d)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // State and agenda
    // -----------------------------------------------------------------------

    /// Push a candidate unless it is already pending or committed.
    ///
    /// Returns whether the candidate was pushed.
    pub fn add_edge_to_agenda(&mut self, id: EdgeId, score: Box<dyn Adjoints>) -> UbertsResult<bool> {
        if self.agenda.contains(id) || self.state.contains(id) {
            self.stats.duplicates += 1;
            tracing::trace!(fact = %self.graph.format_edge(id), "duplicate candidate skipped");
            return Ok(false);
        }
        let edge = self.graph.edge(id)?;
        let priority = self.priority.priority(edge, score.as_ref(), &self.graph);
        tracing::trace!(
            fact = %self.graph.format_hyp_edge(edge),
            score = score.forwards(),
            priority,
            "agenda push"
        );
        self.agenda.add(id, edge, score, priority)?;
        Ok(true)
    }

    /// Commit a fact and fire every rule and factor it completes.
    pub fn add_edge_to_state(&mut self, id: EdgeId) -> UbertsResult<bool> {
        self.commit(id, true)
    }

    /// Commit a fact without matching it against the trie.
    pub fn add_edge_to_state_no_match(&mut self, id: EdgeId) -> UbertsResult<bool> {
        self.commit(id, false)
    }

    fn commit(&mut self, id: EdgeId, do_match: bool) -> UbertsResult<bool> {
        let edge: HypEdge = self.graph.edge(id)?.clone();
        if !self.state.add(id, &edge) {
            return Ok(false);
        }
        self.decision.committed(&edge);
        tracing::debug!(fact = %self.graph.format_hyp_edge(&edge), do_match, "commit");
        if do_match {
            self.fire(id)?;
        }
        Ok(true)
    }

    fn fire(&mut self, id: EdgeId) -> UbertsResult<()> {
        let (matches, mstats) = self.trie.match_edge(&self.state, &self.graph, id)?;
        tracing::trace!(
            fact = %self.graph.format_edge(id),
            calls = mstats.calls,
            matches = mstats.matches,
            "matched"
        );
        self.stats.matches += matches.len();
        for m in matches {
            for generator in &m.value.generators {
                self.stats.rule_firings += 1;
                let candidates = generator.generate(&m.bindings, &mut self.graph)?;
                if !candidates.is_empty() {
                    tracing::debug!(rule = generator.name(), proposed = candidates.len(), "rule fired");
                }
                for c in candidates {
                    self.stats.generated += 1;
                    self.add_edge_to_agenda(c.edge, c.score)?;
                }
            }
            for factor in &m.value.factors {
                factor.rescore(&m.bindings, &mut self.agenda, &self.graph, &self.priority)?;
            }
        }
        Ok(())
    }

    /// Pop the best candidate and commit or reject it in the configured mode.
    pub fn step(&mut self) -> UbertsResult<StepOutcome> {
        Ok(self.step_with(self.config.mode)?.outcome)
    }

    /// Pop the best candidate and commit or reject it.
    ///
    /// The decision functions are asked in both modes so the step records
    /// their answer; in [`InferenceMode::Oracle`] the gold label decides.
    pub fn step_with(&mut self, mode: InferenceMode) -> UbertsResult<Step> {
        let item = self.agenda.pop()?;
        self.stats.pops += 1;
        let edge = self.graph.edge(item.edge)?.clone();
        let score = item.score.forwards();
        let label = self.labels.label(&edge);
        let predicted = self.decision.decide(&edge, score)?;
        let accept = match mode {
            InferenceMode::Decoder => predicted,
            InferenceMode::Oracle => Some(label == Label::Gold),
        };

        let outcome = match accept {
            Some(true) => {
                if self.commit(item.edge, true)? {
                    self.stats.commits += 1;
                    StepOutcome::Committed(item.edge)
                } else {
                    tracing::debug!(fact = %self.graph.format_hyp_edge(&edge), "already committed");
                    StepOutcome::AlreadyCommitted(item.edge)
                }
            }
            Some(false) => {
                self.stats.rejects += 1;
                tracing::debug!(fact = %self.graph.format_hyp_edge(&edge), score, ?label, "reject");
                StepOutcome::Rejected(item.edge)
            }
            None => {
                self.stats.rejects += 1;
                self.stats.undecided += 1;
                tracing::warn!(
                    fact = %self.graph.format_hyp_edge(&edge),
                    score,
                    "no decision function applies, rejecting"
                );
                StepOutcome::Rejected(item.edge)
            }
        };
        Ok(Step {
            edge: item.edge,
            score: item.score,
            label,
            predicted,
            outcome,
        })
    }

    /// Step in the configured mode until the agenda is empty or `max_pops`
    /// is reached.
    pub fn run(&mut self) -> UbertsResult<RunStats> {
        self.run_with(self.config.mode, None)
    }

    /// Run committing exactly the gold candidates.
    pub fn run_oracle(&mut self) -> UbertsResult<RunStats> {
        self.run_with(InferenceMode::Oracle, None)
    }

    /// Run in `mode` and return every step taken.
    pub fn run_recorded(&mut self, mode: InferenceMode) -> UbertsResult<(RunStats, Vec<Step>)> {
        let mut steps = Vec::new();
        let stats = self.run_with(mode, Some(&mut steps))?;
        Ok((stats, steps))
    }

    fn run_with(&mut self, mode: InferenceMode, mut trajectory: Option<&mut Vec<Step>>) -> UbertsResult<RunStats> {
        if mode == InferenceMode::Oracle && self.labels.is_empty() {
            tracing::warn!("oracle run without gold labels commits nothing");
        }
        let before = self.stats;
        let limit = self.config.max_pops;
        let mut hit_pop_limit = false;
        while !self.agenda.is_empty() {
            if limit.is_some_and(|max| self.stats.pops - before.pops >= max) {
                hit_pop_limit = true;
                tracing::warn!(
                    max_pops = limit,
                    pending = self.agenda.len(),
                    "pop limit reached"
                );
                break;
            }
            let step = self.step_with(mode)?;
            if let Some(steps) = trajectory.as_mut() {
                steps.push(step);
            }
        }
        let mut stats = self.stats.since(&before);
        stats.hit_pop_limit = hit_pop_limit;
        Ok(stats)
    }

    /// Drop pending candidates and reset the decision functions.
    pub fn clear_agenda(&mut self) {
        self.agenda.clear();
        self.decision.clear();
    }

    /// Forget everything document-specific: pending and committed temporary
    /// facts, temporary nodes, labels and decision state. The schema, schema
    /// facts and rules stay.
    pub fn clear_document(&mut self) {
        self.clear_agenda();
        self.state.clear_temporary();
        self.graph.clear_temporary();
        self.labels.clear();
        self.stats = RunStats::default();
    }

    // -----------------------------------------------------------------------
    // Facts and evaluation
    // -----------------------------------------------------------------------

    /// Apply parsed fact lines in order.
    pub fn load_facts(&mut self, lines: &[FactLine]) -> UbertsResult<()> {
        for line in lines {
            match line {
                FactLine::Def { relation, types } => {
                    let types: Vec<&str> = types.iter().map(String::as_str).collect();
                    self.add_relation(relation, &types)?;
                }
                FactLine::Schema { relation, values } => {
                    let rel = self.relation(relation)?;
                    let id = self.make_edge_from_values(rel, values, Partition::Schema)?;
                    self.add_edge_to_state_no_match(id)?;
                }
                FactLine::Fact { relation, values } => {
                    let rel = self.relation(relation)?;
                    let id = self.make_edge_from_values(rel, values, Partition::Temporary)?;
                    if self.config.no_match_on_load {
                        self.add_edge_to_state_no_match(id)?;
                    } else {
                        self.add_edge_to_state(id)?;
                    }
                }
                FactLine::Label { relation, values } => {
                    let rel = self.relation(relation)?;
                    let id = self.make_edge_from_values(rel, values, Partition::Temporary)?;
                    let edge = self.graph.edge(id)?.clone();
                    self.labels.add(edge);
                }
                FactLine::StartDoc { id } => {
                    let rel = match self.graph.schema().lookup_relation(START_DOC_RELATION) {
                        Some(rel) => rel,
                        None => self.add_relation(START_DOC_RELATION, &["docid"])?,
                    };
                    let edge = self.make_edge_from_values(rel, &[Value::str(id)], Partition::Temporary)?;
                    self.add_edge_to_state(edge)?;
                    tracing::debug!(doc = %id, "start document");
                }
            }
        }
        Ok(())
    }

    /// Committed temporary facts, in commit order.
    pub fn committed_facts(&self) -> Vec<EdgeId> {
        self.state
            .edges()
            .filter(|(id, _)| !id.is_schema())
            .map(|(id, _)| id)
            .collect()
    }

    /// Committed temporary facts scored against the gold labels, over the
    /// relations that have labels.
    pub fn perf(&self) -> Perf {
        let predicted = self
            .state
            .edges()
            .filter(|(id, e)| !id.is_schema() && self.labels.count(e.relation) > 0)
            .map(|(_, e)| e);
        self.labels.perf(predicted, None)
    }

    /// Add a candidate with a constant score.
    pub fn add_candidate(&mut self, id: EdgeId, score: f64) -> UbertsResult<bool> {
        self.add_edge_to_agenda(id, ConstantScore::boxed(score))
    }
}
