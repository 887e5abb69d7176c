//! Mutation operators that rewrite the design through yosys itself.

use std::path::Path;

use rtlcross_common::{ToolError, Workspace, tool};

use crate::mutator::MutationError;

fn internal_fault(operation: &str, error: ToolError) -> MutationError {
    match error {
        ToolError::Failed { .. } | ToolError::Timeout { .. } => {
            MutationError::Generator(format!("internal fault in {operation}"))
        }
        other => MutationError::Tool(other),
    }
}

/// The yosys `mutate` pass applied in place.
#[derive(Debug)]
pub struct YosysMutate {
    n: usize,
}

impl YosysMutate {
    /// An operator emitting `n` netlist mutations per application.
    #[must_use]
    pub const fn new(n: usize) -> Self {
        Self { n }
    }

    /// Mutates the file in place.
    pub fn apply(&self, target: &Path, _ws: &Workspace) -> Result<(), MutationError> {
        let mutation_file = target
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("mutations.ys");
        let mutated = tool::yosys_mutate(target, &mutation_file, self.n)
            .map_err(|e| internal_fault("yosys_mutate", e))?;
        std::fs::write(target, mutated)?;
        Ok(())
    }
}

/// Synthesis used as a mutation: the netlist replaces the source.
#[derive(Debug)]
pub struct YosysSynthesisAsMutation {
    extra_args: Vec<String>,
}

impl YosysSynthesisAsMutation {
    /// An operator running `synth` with the given extra flags.
    #[must_use]
    pub fn new(extra_args: Vec<String>) -> Self {
        Self { extra_args }
    }

    /// Synthesizes the file in place.
    pub fn apply(&self, target: &Path, _ws: &Workspace) -> Result<(), MutationError> {
        let synthesized = tool::yosys_synthesis(target, &self.extra_args)
            .map_err(|e| internal_fault("yosys_synthesis", e))?;
        std::fs::write(target, synthesized)?;
        Ok(())
    }
}
