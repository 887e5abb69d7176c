//! The circuit variants and their file-level operations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use rtlcross_common::Workspace;
use rtlcross_common::tool;
use rtlcross_ir::crossbar::{AtomVariable, CxxImplItem, KleeSmtCrossbar};
use rtlcross_ir::{HierarchicalPath, IrError, ModelDesign, ModelTreeView};

use crate::equiv::EquivError;
use crate::smt::SmtCircuit;

/// Concrete representation flavor of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitKind {
    /// Verilog source text.
    Verilog,
    /// SystemVerilog source text.
    SystemVerilog,
    /// Synthesized Verilog netlist text.
    VerilogNetlist,
    /// C++ model directory produced by Verilator.
    VerilatorCpp,
    /// C++ model directory produced by yosys CXXRTL.
    CxxrtlCpp,
    /// SMT transition relation from yosys `write_smt2`.
    YosysSmt,
    /// SMT transition relation recovered from KLEE path conditions.
    KleeSmt,
}

impl CircuitKind {
    /// Canonical file extension of the textual flavors; C++ model flavors
    /// live in directories and have none.
    #[must_use]
    pub const fn extension(self) -> Option<&'static str> {
        match self {
            Self::Verilog | Self::VerilogNetlist => Some("v"),
            Self::SystemVerilog => Some("sv"),
            Self::YosysSmt | Self::KleeSmt => Some("smt2"),
            Self::VerilatorCpp | Self::CxxrtlCpp => None,
        }
    }

    /// Short display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Verilog => "VerilogCircuit",
            Self::SystemVerilog => "SystemVerilogCircuit",
            Self::VerilogNetlist => "VerilogNetlist",
            Self::VerilatorCpp => "VerilatorCppCircuit",
            Self::CxxrtlCpp => "YosysCppCircuit",
            Self::YosysSmt => "YosysSmtCircuit",
            Self::KleeSmt => "KleeSmtCircuit",
        }
    }
}

/// A set of circuit kinds usable as a conversion sink: either one exact kind
/// or a whole family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitClass {
    /// Exactly this kind.
    Kind(CircuitKind),
    /// Any SMT flavor.
    Smt,
    /// Any C++ model flavor.
    Cpp,
}

impl CircuitClass {
    /// Whether `kind` belongs to this class.
    #[must_use]
    pub fn matches(self, kind: CircuitKind) -> bool {
        match self {
            Self::Kind(k) => k == kind,
            Self::Smt => matches!(kind, CircuitKind::YosysSmt | CircuitKind::KleeSmt),
            Self::Cpp => matches!(kind, CircuitKind::VerilatorCpp | CircuitKind::CxxrtlCpp),
        }
    }

    /// Parses the names accepted on the command line (both the class-style
    /// spelling and a short one).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "VerilogCircuit" | "verilog" => Some(Self::Kind(CircuitKind::Verilog)),
            "SystemVerilogCircuit" | "systemverilog" | "sv" => {
                Some(Self::Kind(CircuitKind::SystemVerilog))
            }
            "VerilogNetList" | "netlist" => Some(Self::Kind(CircuitKind::VerilogNetlist)),
            "VerilatorCppCircuit" => Some(Self::Kind(CircuitKind::VerilatorCpp)),
            "YosysCppCircuit" => Some(Self::Kind(CircuitKind::CxxrtlCpp)),
            "YosysSmtCircuit" => Some(Self::Kind(CircuitKind::YosysSmt)),
            "KleeSmtCircuit" => Some(Self::Kind(CircuitKind::KleeSmt)),
            "SmtCircuit" | "smt" => Some(Self::Smt),
            "CppCircuit" | "cpp" => Some(Self::Cpp),
            _ => None,
        }
    }
}

/// Errors of circuit construction and persistence.
#[derive(Debug, Error)]
pub enum CircuitError {
    /// The Verilog front end rejected the input.
    #[error("verilog parser rejected the input: {0}")]
    Parse(#[source] IrError),
    /// Model construction or lookup failed.
    #[error(transparent)]
    Ir(#[from] IrError),
    /// Filesystem access failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The file extension names no loadable circuit kind.
    #[error("unsupported type of input: \"{extension}\"")]
    UnsupportedInput {
        /// The offending extension.
        extension: String,
    },
    /// The flavor does not support the requested file operation.
    #[error("{operation} is not supported for {kind}")]
    Unsupported {
        /// Short name of the flavor.
        kind: &'static str,
        /// The refused operation.
        operation: &'static str,
    },
}

/// Verilog source with its loaded model.
#[derive(Debug, Clone)]
pub struct VerilogCircuit {
    /// The source text.
    pub source: String,
    /// The flat design arena; the top module is the model root.
    pub design: Arc<ModelDesign>,
}

impl VerilogCircuit {
    /// Loads and models a `.v` file.
    pub fn from_file(path: &Path) -> Result<Self, CircuitError> {
        let design = ModelDesign::from_verilog(path).map_err(CircuitError::Parse)?;
        Ok(Self {
            source: std::fs::read_to_string(path)?,
            design,
        })
    }

    /// Name of the top-level module.
    #[must_use]
    pub fn top_module(&self) -> &str {
        self.design.get(self.design.top()).name()
    }

    /// Writes the source text.
    pub fn to_file(&self, path: &Path) -> Result<(), CircuitError> {
        std::fs::write(path, &self.source)?;
        Ok(())
    }

    /// Proves equivalence against another Verilog circuit with a yosys miter
    /// (`miter -equiv` + `sat -verify`).
    pub fn is_equivalent_to(&self, other: &Self, ws: &Workspace) -> Result<bool, EquivError> {
        let this_file = ws.save_to_file(&self.source, &format!("{}.v", self.top_module()))?;
        let that_file = ws.save_to_file(&other.source, &format!("{}.v", other.top_module()))?;
        Ok(tool::yosys_equivalence_check(
            &this_file,
            self.top_module(),
            &self.design.module_names(),
            &that_file,
            other.top_module(),
            &other.design.module_names(),
        )?)
    }
}

/// SystemVerilog source text; no model is attached until a translator lowers
/// it to Verilog.
#[derive(Debug, Clone)]
pub struct SystemVerilogCircuit {
    /// The source text.
    pub source: String,
}

impl SystemVerilogCircuit {
    /// Loads a `.sv` file.
    pub fn from_file(path: &Path) -> Result<Self, CircuitError> {
        Ok(Self {
            source: std::fs::read_to_string(path)?,
        })
    }

    /// Writes the source text.
    pub fn to_file(&self, path: &Path) -> Result<(), CircuitError> {
        std::fs::write(path, &self.source)?;
        Ok(())
    }
}

/// Synthesized netlist text.
#[derive(Debug, Clone)]
pub struct VerilogNetlistCircuit {
    /// The netlist as Verilog text.
    pub source: String,
}

/// Which tool produced a C++ model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CppFlavor {
    /// Verilator.
    Verilator,
    /// yosys CXXRTL.
    Cxxrtl,
}

/// A compiled C++ model directory with its byte-layout-annotated model.
#[derive(Debug, Clone)]
pub struct CppCircuit {
    /// The producing tool.
    pub flavor: CppFlavor,
    /// Directory holding the generated sources, bitcode, and LLVM assembly.
    pub obj_dir: PathBuf,
    /// Model with `{offset, bytes}` attached to the symbolic items.
    pub model: ModelTreeView,
    /// CXXRTL implementation items (empty for the Verilator flavor, whose
    /// layout is recovered from LLVM debug info instead).
    pub impl_items: Vec<CxxImplItem>,
}

impl CppCircuit {
    /// The `(name, offset, bytes)` atoms of the given paths, in ascending
    /// offset order.
    pub fn atom_variables(
        &self,
        paths: Vec<HierarchicalPath>,
    ) -> Result<Vec<AtomVariable>, IrError> {
        let mut atoms = KleeSmtCrossbar::from_model(paths).to_data_split(&self.model)?;
        atoms.sort_by_key(|a| a.offset);
        Ok(atoms)
    }
}

/// A circuit in any supported flavor.
#[derive(Debug, Clone)]
pub enum Circuit {
    /// Verilog source.
    Verilog(VerilogCircuit),
    /// SystemVerilog source.
    SystemVerilog(SystemVerilogCircuit),
    /// Synthesized netlist.
    VerilogNetlist(VerilogNetlistCircuit),
    /// Compiled C++ model.
    Cpp(CppCircuit),
    /// SMT transition relation.
    Smt(SmtCircuit),
}

impl Circuit {
    /// The variant tag.
    #[must_use]
    pub fn kind(&self) -> CircuitKind {
        match self {
            Self::Verilog(_) => CircuitKind::Verilog,
            Self::SystemVerilog(_) => CircuitKind::SystemVerilog,
            Self::VerilogNetlist(_) => CircuitKind::VerilogNetlist,
            Self::Cpp(c) => match c.flavor {
                CppFlavor::Verilator => CircuitKind::VerilatorCpp,
                CppFlavor::Cxxrtl => CircuitKind::CxxrtlCpp,
            },
            Self::Smt(c) => match c.flavor {
                crate::smt::SmtFlavor::Yosys => CircuitKind::YosysSmt,
                crate::smt::SmtFlavor::Klee => CircuitKind::KleeSmt,
            },
        }
    }

    /// Loads a source circuit, choosing the flavor by file extension.
    pub fn from_file(path: &Path) -> Result<Self, CircuitError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("v") => Ok(Self::Verilog(VerilogCircuit::from_file(path)?)),
            Some("sv") => Ok(Self::SystemVerilog(SystemVerilogCircuit::from_file(path)?)),
            other => Err(CircuitError::UnsupportedInput {
                extension: other.unwrap_or("").to_owned(),
            }),
        }
    }

    /// Writes the textual flavors to a file.
    pub fn to_file(&self, path: &Path) -> Result<(), CircuitError> {
        match self {
            Self::Verilog(c) => c.to_file(path),
            Self::SystemVerilog(c) => c.to_file(path),
            Self::VerilogNetlist(c) => {
                std::fs::write(path, &c.source)?;
                Ok(())
            }
            Self::Cpp(_) => Err(CircuitError::Unsupported {
                kind: "a C++ model",
                operation: "saving to a file",
            }),
            Self::Smt(c) => {
                std::fs::write(path, &c.preamble)?;
                Ok(())
            }
        }
    }

    /// Decides equivalence between two target circuits.
    ///
    /// SMT pairs go through the miter engine; Verilog pairs through the
    /// yosys checker. Mixed flavors are not comparable.
    pub fn is_equivalent_to(
        &self,
        other: &Self,
        quick: bool,
        counterexample: bool,
        ws: &Workspace,
    ) -> Result<bool, EquivError> {
        match (self, other) {
            (Self::Smt(a), Self::Smt(b)) => a.is_equivalent_to(
                &[b],
                crate::equiv::EquivOptions {
                    quick,
                    counterexample,
                },
                ws,
            ),
            (Self::Verilog(a), Self::Verilog(b)) => a.is_equivalent_to(b, ws),
            (a, b) => Err(EquivError::Unsupported(format!(
                "equivalence of {} vs {} is not supported",
                a.kind().name(),
                b.kind().name(),
            ))),
        }
    }
}
