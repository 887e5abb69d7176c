//! The translator seam and its registry.

use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use rand::Rng;
use serde::{Deserialize, Serialize};

use rtlcross_circuit::{Circuit, CircuitKind};
use rtlcross_common::Workspace;

use crate::error::PipelineError;
use crate::options::CmdlineOption;
use crate::translators;

/// The command-line arguments a translator instance was parameterized with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Sampled extra arguments, one rendered flag per entry.
    pub extra_args: Vec<String>,
}

/// One conversion step between circuit kinds.
pub trait Translator: Send + Sync {
    /// Stable name used in strategy files.
    fn name(&self) -> &'static str;

    /// The `(source, sink)` kind pairs this translator serves.
    fn edges(&self) -> Vec<(CircuitKind, CircuitKind)>;

    /// The configurable flags.
    fn options(&self) -> Vec<CmdlineOption> {
        Vec::new()
    }

    /// Applies the translation under the given policy.
    fn translate(
        &self,
        circuit: &Circuit,
        policy: &Policy,
        ws: &Workspace,
    ) -> Result<Circuit, PipelineError>;

    /// Number of distinct parameterizations.
    fn instance_count(&self) -> usize {
        self.options().iter().map(CmdlineOption::count).product()
    }
}

impl fmt::Debug for dyn Translator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A translator paired with a concrete policy.
#[derive(Debug, Clone)]
pub struct TranslatorInstance {
    /// The translator.
    pub translator: Arc<dyn Translator>,
    /// Its sampled arguments.
    pub policy: Policy,
}

impl TranslatorInstance {
    /// Applies this instance to a circuit.
    pub fn apply(&self, circuit: &Circuit, ws: &Workspace) -> Result<Circuit, PipelineError> {
        self.translator.translate(circuit, &self.policy, ws)
    }
}

impl fmt::Display for TranslatorInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.translator.name(), self.policy.extra_args)
    }
}

/// Enumerates parameterized instances of a translator: for every option
/// count below `max_op`, every combination of that many sampled flags. A
/// translator without options yields its single default instance.
pub fn all_instances(
    translator: &Arc<dyn Translator>,
    max_op: usize,
    rng: &mut impl Rng,
) -> Vec<TranslatorInstance> {
    let options = translator.options();
    if options.is_empty() {
        return vec![TranslatorInstance {
            translator: Arc::clone(translator),
            policy: Policy::default(),
        }];
    }

    let sampled: Vec<String> = options.iter().map(|o| o.sample(rng)).collect();
    let mut instances = Vec::new();
    for op_cnt in 0..max_op {
        for combination in sampled.iter().combinations(op_cnt) {
            instances.push(TranslatorInstance {
                translator: Arc::clone(translator),
                policy: Policy {
                    extra_args: combination.into_iter().cloned().collect(),
                },
            });
        }
    }
    instances
}

/// Every translator the harness knows about.
#[must_use]
pub fn registry() -> Vec<Arc<dyn Translator>> {
    vec![
        Arc::new(translators::yosys::YosysWriteSmt2),
        Arc::new(translators::yosys::YosysSynthesis),
        Arc::new(translators::yosys::YosysWriteCxx),
        Arc::new(translators::verilator::VerilatorTransformer),
        Arc::new(translators::sv2v::Sv2v),
        Arc::new(translators::surelog::SurelogPlugin),
        Arc::new(translators::klee::KleeSymbolicExecution),
    ]
}

/// Resolves a registry translator by its strategy-file name.
pub fn lookup(name: &str) -> Result<Arc<dyn Translator>, PipelineError> {
    registry()
        .into_iter()
        .find(|t| t.name() == name)
        .ok_or_else(|| PipelineError::UnknownTranslator(name.to_owned()))
}
