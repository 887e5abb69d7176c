//! The mutation-operator seam shared by the heuristic engine and the
//! yosys-level operators.

use std::path::Path;

use rand::rngs::StdRng;
use thiserror::Error;

use rtlcross_common::{Workspace, tool};

/// A recoverable fault inside a mutation generator. The engine logs it,
/// flags itself, and moves on to the next mutator.
#[derive(Debug, Error)]
pub enum MutationError {
    /// A generator hit an inconsistency in the tree it walked.
    #[error("{0}")]
    Generator(String),
    /// An external tool misbehaved.
    #[error(transparent)]
    Tool(#[from] rtlcross_common::ToolError),
    /// The shared parsing layer failed.
    #[error(transparent)]
    Verilog(#[from] rtlcross_common::verilog::VerilogError),
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Outcome of a helper that may legitimately have nothing to offer.
///
/// `Skip` is silent (the pattern did not apply here); `Error` is recorded.
#[derive(Debug)]
pub enum SkipOrError {
    /// The rewrite does not apply at this site; move on quietly.
    Skip,
    /// A real fault worth recording.
    Error(MutationError),
}

impl From<MutationError> for SkipOrError {
    fn from(e: MutationError) -> Self {
        Self::Error(e)
    }
}

/// A source-to-sources mutation operator.
pub trait MutationOperator {
    /// Produces up to `number` validated mutants of the seed.
    fn generate(
        &mut self,
        seed_path: &Path,
        number: usize,
        ws: &Workspace,
        rng: &mut StdRng,
    ) -> Result<Vec<Vec<u8>>, MutationError>;

    /// Whether a recoverable error occurred during generation.
    fn has_error(&self) -> bool;
}

/// Runs a mutant through the external semantic check (iverilog or the yosys
/// systemverilog plugin, by suffix). The scratch file is removed afterwards.
pub fn validate(src: &[u8], suffix: &str, ws: &Workspace) -> Result<bool, MutationError> {
    let filename = format!("mutant{suffix}");
    let filepath = ws.save_to_file(src, &filename)?;
    let validity = tool::semantic_check(&filepath)?;
    let _ = std::fs::remove_file(filepath);
    Ok(validity)
}
