// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # uberts
//!
//! An incremental inference engine over a typed hypergraph. Facts are edges
//! whose arguments are interned typed nodes; candidate facts wait on a scored
//! agenda; committing a fact matches it against forward-chaining rules
//! compiled into a trie of graph-traversal paths, which propose more
//! candidates.
//!
//! ## Architecture
//!
//! - **Schema** (`schema`): node types and relations
//! - **Hypergraph** (`hypergraph`, `store`): values, interned nodes and edges,
//!   split into a persistent schema partition and a per-document temporary one
//! - **State** (`state`): committed facts indexed by node adjacency
//! - **Agenda** (`agenda`): indexed max-heap of candidates with pluggable priorities
//! - **Trie** (`trie`): traversal paths and the incremental matcher
//! - **Rules** (`rules`): `a(x,y) & b(y,z) => c(x,z)` parsing and compilation
//! - **Decisions** (`decision`), **global factors** (`factors`)
//! - **Driver** (`engine`): the pop/decide/commit/match loop
//!
//! ## Library usage
//!
//! ```no_run
//! use uberts::engine::Uberts;
//! use uberts::hypergraph::{Partition, Value};
//!
//! let mut u = Uberts::default();
//! let succ = u.add_relation("succ", &["tokenIndex", "tokenIndex"]).unwrap();
//! u.add_rule("succ(i,j) & succ(j,k) => skip(i,k)").unwrap();
//! for i in 0..3 {
//!     let e = u
//!         .make_edge_from_values(succ, &[Value::Int(i), Value::Int(i + 1)], Partition::Temporary)
//!         .unwrap();
//!     u.add_edge_to_state(e).unwrap();
//! }
//! let stats = u.run().unwrap();
//! assert_eq!(stats.commits, 2);
//! ```

pub mod adjoints;
pub mod agenda;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod factors;
pub mod facts;
pub mod hypergraph;
pub mod labels;
pub mod rules;
pub mod schema;
pub mod state;
pub mod store;
pub mod trie;
