//! Circuit representations and equivalence checking.
//!
//! A [`circuit::Circuit`] is one design in one of the supported flavors:
//! HDL text, a compiled C++ model directory, or an SMT transition relation.
//! Equivalence between SMT circuits goes through the miter protocol in
//! [`equiv`]; pure Verilog pairs go through a yosys miter instead.

pub mod circuit;
pub mod equiv;
pub mod smt;

pub use circuit::{
    Circuit, CircuitClass, CircuitKind, CppCircuit, CppFlavor, SystemVerilogCircuit,
    VerilogCircuit, VerilogNetlistCircuit,
};
pub use equiv::{EquivError, EquivOptions};
pub use smt::{SmtCircuit, SmtFlavor, TransitionKind};
