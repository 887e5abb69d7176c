//! Heuristic mutation of Verilog and SystemVerilog sources.
//!
//! The engine parses a seed with tree-sitter, collects candidate rewrites
//! from a set of sub-mutators, and realizes them in a priority- and
//! coverage-driven loop. Every emitted mutant passes the external semantic
//! check. Netlist-level operators driven through yosys live in [`netlist`].

pub mod coverage;
pub mod editor;
pub mod heuristics;
mod helpers;
pub mod mutator;
mod mutators;
pub mod netlist;
mod queries;

pub use coverage::ByteCoverage;
pub use editor::{BytesEditor, Replacement};
pub use heuristics::HeuristicMutator;
pub use mutator::{MutationError, MutationOperator};
