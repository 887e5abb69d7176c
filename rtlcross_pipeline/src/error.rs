//! Error kinds of the pipeline layer.

use thiserror::Error;

use rtlcross_circuit::CircuitKind;
use rtlcross_circuit::circuit::CircuitError;

/// Failures while enumerating or applying conversions.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// External tool failure.
    #[error(transparent)]
    Tool(#[from] rtlcross_common::ToolError),
    /// Circuit construction failure.
    #[error(transparent)]
    Circuit(#[from] CircuitError),
    /// Model failure.
    #[error(transparent)]
    Ir(#[from] rtlcross_ir::IrError),
    /// The shared Verilog parsing layer failed.
    #[error(transparent)]
    Verilog(#[from] rtlcross_common::verilog::VerilogError),
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Strategy (de)serialization failure.
    #[error("malformed strategy: {0}")]
    Strategy(#[from] serde_json::Error),
    /// A translator received a circuit kind outside its edges.
    #[error("{translator} cannot translate a {} circuit", kind.name())]
    UnsupportedSource {
        /// The translator's name.
        translator: &'static str,
        /// The offending circuit kind.
        kind: CircuitKind,
    },
    /// The compilation-space source type is not an HDL source.
    #[error("invalid source type: {0}")]
    InvalidSource(String),
    /// A sink or source name did not parse.
    #[error("unknown circuit type: {0}")]
    UnknownCircuitType(String),
    /// A strategy referenced a translator outside the registry.
    #[error("unknown translator: {0}")]
    UnknownTranslator(String),
    /// Fewer conversions exist than the requested sample size.
    #[error("cannot sample {want} conversions out of {have}")]
    NotEnoughConversions {
        /// Available conversions.
        have: usize,
        /// Requested sample size.
        want: usize,
    },
    /// A generated artifact the pipeline relies on was missing or malformed.
    #[error("missing artifact: {0}")]
    MissingArtifact(String),
}
