//! Crossbars: bidirectional translators between logical item paths and the
//! symbol layouts of individual backends.
//!
//! Every crossbar can be built from model paths (`from_model`) or from a
//! backend name (`from_data`), and can produce either direction
//! (`to_model` / `to_data`).

pub mod cxxrtl;
pub mod klee;
pub mod verilator;
pub mod yosys_smt;

pub use cxxrtl::{CxxImplItem, DebugItem, YosysCxxCrossbar};
pub use klee::{AtomVariable, KleeAccessor, KleeSmtCrossbar};
pub use verilator::{VerilatorCppCrossbar, VerilatorNaming};
pub use yosys_smt::{SmtAccessor, YosysSmtCrossbar};

use rtlcross_smt::TypedTerm;

/// The value stream of one item path at one state.
#[derive(Debug, Clone)]
pub enum SignalValues {
    /// One bit-vector term per addressable element of the item.
    Values(Vec<TypedTerm>),
    /// The backend optimized the item away; it reads as an endless stream of
    /// 1-bit zeros.
    ZeroStream,
}
