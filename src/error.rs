//! Rich diagnostic error types for the uberts inference engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. Invariant violations surface here and
//! are never silently recovered.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the uberts engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum UbertsError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Agenda(#[from] AgendaError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Decision(#[from] DecisionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Facts(#[from] FactsError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Schema errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SchemaError {
    #[error("relation \"{name}\" is already defined with a different signature")]
    #[diagnostic(
        code(uberts::schema::duplicate_relation),
        help(
            "A relation name may only be declared once. Re-declaring it with the \
             same argument types is allowed and returns the existing relation."
        )
    )]
    DuplicateRelation { name: String },

    #[error("unknown relation \"{name}\"")]
    #[diagnostic(
        code(uberts::schema::unknown_relation),
        help("Declare the relation first, e.g. with a `def {name} <type> ...` line.")
    )]
    UnknownRelation { name: String },

    #[error("unknown node type \"{name}\"")]
    #[diagnostic(
        code(uberts::schema::unknown_node_type),
        help("Node types are created when a relation using them is declared.")
    )]
    UnknownNodeType { name: String },
}

/// Result type for schema operations.
pub type SchemaResult<T> = std::result::Result<T, SchemaError>;

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("node {ty}={value} is already registered")]
    #[diagnostic(
        code(uberts::store::duplicate_node),
        help(
            "Each (type, value) pair has exactly one node. Use `lookup` with \
             create_if_absent instead of registering the node twice."
        )
    )]
    DuplicateNode { ty: String, value: String },

    #[error("node {ty}={value} lives in the temporary partition and cannot become a schema node")]
    #[diagnostic(
        code(uberts::store::partition_conflict),
        help(
            "Schema nodes and schema edges must be created before any document \
             creates the same value as a temporary node. Load schema facts first."
        )
    )]
    PartitionConflict { ty: String, value: String },

    #[error("relation {relation} takes {expected} arguments, got {actual}")]
    #[diagnostic(
        code(uberts::store::arity_mismatch),
        help("The tail of an edge must have one node per relation argument.")
    )]
    ArityMismatch {
        relation: String,
        expected: usize,
        actual: usize,
    },

    #[error("argument {position} of {relation} must have type {expected}, got {actual}")]
    #[diagnostic(
        code(uberts::store::type_mismatch),
        help("Look up the argument node with the node type the relation declares.")
    )]
    TypeMismatch {
        relation: String,
        position: usize,
        expected: String,
        actual: String,
    },

    #[error("unknown node id {id}")]
    #[diagnostic(
        code(uberts::store::unknown_node),
        help(
            "The id does not name a live node. Temporary ids become invalid after \
             the temporary partition is cleared."
        )
    )]
    UnknownNode { id: String },

    #[error("unknown edge id {id}")]
    #[diagnostic(
        code(uberts::store::unknown_edge),
        help(
            "The id does not name a live edge. Temporary ids become invalid after \
             the temporary partition is cleared."
        )
    )]
    UnknownEdge { id: String },
}

/// Result type for node and edge store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Agenda errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum AgendaError {
    #[error("agenda is empty")]
    #[diagnostic(
        code(uberts::agenda::empty),
        help("Check `is_empty()` before calling pop, peek or remove.")
    )]
    Empty,

    #[error("edge {edge} is already on the agenda")]
    #[diagnostic(
        code(uberts::agenda::duplicate),
        help(
            "Each edge may occupy at most one heap slot. Use `rescore` to change \
             the score of a pending edge, or go through the driver which skips duplicates."
        )
    )]
    Duplicate { edge: String },

    #[error("edge {edge} is not on the agenda")]
    #[diagnostic(
        code(uberts::agenda::not_on_agenda),
        help("Use `contains` to check whether an edge is still pending.")
    )]
    NotOnAgenda { edge: String },

    #[error("agenda invariant violated: {message}")]
    #[diagnostic(
        code(uberts::agenda::invariant),
        help("This is a bug in the agenda's index bookkeeping. Please file a report.")
    )]
    Invariant { message: String },
}

/// Result type for agenda operations.
pub type AgendaResult<T> = std::result::Result<T, AgendaError>;

// ---------------------------------------------------------------------------
// Rule errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RuleError {
    #[error("rule parse error in '{rule}': {message}")]
    #[diagnostic(
        code(uberts::rule::parse),
        help(
            "Rules look like `a(x,y) & b(y,z) => c(x,z)`. A primed term `a'(f,x,y)` \
             binds f to the fact itself and may only appear on the left-hand side."
        )
    )]
    Parse { rule: String, message: String },

    #[error("rule '{rule}' mentions unknown relation \"{relation}\"")]
    #[diagnostic(
        code(uberts::rule::unknown_relation),
        help("Declare every left-hand-side relation before registering rules that use it.")
    )]
    UnknownRelation { rule: String, relation: String },

    #[error("rule '{rule}': {relation} takes {expected} arguments, got {actual}")]
    #[diagnostic(
        code(uberts::rule::arity),
        help("Each term must have exactly one argument per relation argument.")
    )]
    Arity {
        rule: String,
        relation: String,
        expected: usize,
        actual: usize,
    },

    #[error("rule '{rule}': variable {variable} is used as both {first} and {second}")]
    #[diagnostic(
        code(uberts::rule::type_mismatch),
        help("A variable joins argument positions, so every position must share one node type.")
    )]
    TypeMismatch {
        rule: String,
        variable: String,
        first: String,
        second: String,
    },

    #[error("rule '{rule}': right-hand side variable {variable} is not bound on the left-hand side")]
    #[diagnostic(
        code(uberts::rule::unbound_variable),
        help("Every variable in the conclusion must appear in at least one premise.")
    )]
    UnboundVariable { rule: String, variable: String },

    #[error("rule '{rule}': premises do not share variables and cannot be joined")]
    #[diagnostic(
        code(uberts::rule::disconnected),
        help(
            "The matcher walks from a newly committed fact through shared arguments, \
             so all premises must be connected by shared variables."
        )
    )]
    Disconnected { rule: String },

    #[error("failed to read rule file {path}: {source}")]
    #[diagnostic(
        code(uberts::rule::io),
        help("Check that the rule file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Schema(#[from] SchemaError),
}

/// Result type for rule parsing, compilation and firing.
pub type RuleResult<T> = std::result::Result<T, RuleError>;

// ---------------------------------------------------------------------------
// Decision errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum DecisionError {
    #[error("decision functions disagree on {edge}: {first} said {first_answer}, {second} said {second_answer}")]
    #[diagnostic(
        code(uberts::decision::disagreement),
        help("A unanimous committee requires all applicable members to agree.")
    )]
    Disagreement {
        edge: String,
        first: String,
        first_answer: bool,
        second: String,
        second_answer: bool,
    },

    #[error("cannot parse decision function '{description}': {message}")]
    #[diagnostic(
        code(uberts::decision::parse),
        help(
            "Group constraints look like `MODE:rel(a,b,c):a:c` where MODE is one of \
             AT_LEAST_ONE, AT_MOST_ONE, EXACTLY_ONE."
        )
    )]
    Parse { description: String, message: String },
}

/// Result type for decision functions.
pub type DecisionResult<T> = std::result::Result<T, DecisionError>;

// ---------------------------------------------------------------------------
// Fact file errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum FactsError {
    #[error("failed to read {path}: {source}")]
    #[diagnostic(
        code(uberts::facts::io),
        help("Check that the file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: unknown command \"{command}\"")]
    #[diagnostic(
        code(uberts::facts::unknown_command),
        help("Fact lines start with one of: def, schema, x, y, startdoc.")
    )]
    UnknownCommand { line: usize, command: String },

    #[error("line {line}: {message}")]
    #[diagnostic(
        code(uberts::facts::parse),
        help("Expected `def rel <type>...`, `x rel v...`, `y rel v...`, `schema rel v...` or `startdoc id`.")
    )]
    Parse { line: usize, message: String },
}

/// Result type for fact-file reading.
pub type FactsResult<T> = std::result::Result<T, FactsError>;

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    #[diagnostic(
        code(uberts::config::read),
        help("Check that the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config {path}: {source}")]
    #[diagnostic(
        code(uberts::config::write),
        help("Check that the target directory is writable.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {message}")]
    #[diagnostic(
        code(uberts::config::parse),
        help("The config file must be valid TOML matching UbertsConfig's fields.")
    )]
    Parse { path: String, message: String },

    #[error("unknown agenda priority \"{name}\"")]
    #[diagnostic(
        code(uberts::config::unknown_priority),
        help(
            "Known priorities: leftright, easyfirst, easyfirst-linear, dfs, bfs, random. \
             Combine them as a weighted sum, e.g. `1*easyfirst + 0.5*leftright`."
        )
    )]
    UnknownPriority { name: String },

    #[error("malformed agenda priority '{description}': {message}")]
    #[diagnostic(
        code(uberts::config::priority_syntax),
        help("Use `name` alone, or `w*name + w*name` with numeric weights.")
    )]
    PrioritySyntax { description: String, message: String },
}

/// Result type for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Convenience result alias for the whole engine.
pub type UbertsResult<T> = std::result::Result<T, UbertsError>;
