//! SMT-LIBv2 plumbing for the equivalence engine.
//!
//! The solver is one more external tool under the harness's command
//! contract: a `z3` child process driven interactively over its stdin. This
//! crate owns the term representation sent down that pipe, the session
//! protocol, and the symbol table scraped from yosys `write_smt2` output.

pub mod session;
pub mod smt2;
pub mod term;

pub use session::{SatResult, SmtError, SmtSession};
pub use smt2::{FunctionTable, SmtSort, SymbolRenamer};
pub use term::{Term, TypedTerm};
