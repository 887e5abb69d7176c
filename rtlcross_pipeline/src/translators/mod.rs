//! Concrete translator implementations.

pub mod klee;
pub mod surelog;
pub mod sv2v;
pub mod verilator;
pub mod yosys;

use std::sync::atomic::{AtomicUsize, Ordering};

use rtlcross_circuit::{Circuit, CppCircuit, SystemVerilogCircuit, VerilogCircuit};

use crate::error::PipelineError;

/// Process-wide counter handing every SMT circuit a distinct symbol
/// namespace; two pipelines over the same input share module names
/// otherwise.
static CIRCUIT_TAGS: AtomicUsize = AtomicUsize::new(0);

/// A fresh symbol-namespace tag.
pub(crate) fn fresh_tag(prefix: &str) -> String {
    format!("{prefix}{}", CIRCUIT_TAGS.fetch_add(1, Ordering::Relaxed))
}

/// Narrows to a Verilog circuit or reports the kind mismatch.
pub(crate) fn expect_verilog<'a>(
    translator: &'static str,
    circuit: &'a Circuit,
) -> Result<&'a VerilogCircuit, PipelineError> {
    match circuit {
        Circuit::Verilog(c) => Ok(c),
        other => Err(PipelineError::UnsupportedSource {
            translator,
            kind: other.kind(),
        }),
    }
}

/// Narrows to a SystemVerilog circuit or reports the kind mismatch.
pub(crate) fn expect_systemverilog<'a>(
    translator: &'static str,
    circuit: &'a Circuit,
) -> Result<&'a SystemVerilogCircuit, PipelineError> {
    match circuit {
        Circuit::SystemVerilog(c) => Ok(c),
        other => Err(PipelineError::UnsupportedSource {
            translator,
            kind: other.kind(),
        }),
    }
}

/// Narrows to a C++ model or reports the kind mismatch.
pub(crate) fn expect_cpp<'a>(
    translator: &'static str,
    circuit: &'a Circuit,
) -> Result<&'a CppCircuit, PipelineError> {
    match circuit {
        Circuit::Cpp(c) => Ok(c),
        other => Err(PipelineError::UnsupportedSource {
            translator,
            kind: other.kind(),
        }),
    }
}
