//! Conversions: ordered chains of translator instances.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use rtlcross_circuit::Circuit;
use rtlcross_common::Workspace;

use crate::error::PipelineError;
use crate::translator::{Policy, TranslatorInstance, lookup};

/// A path through the world map: one or more translator instances applied in
/// order. A failure at any step fails the whole conversion.
#[derive(Debug, Clone)]
pub struct Conversion {
    /// The translator chain.
    pub chain: Vec<TranslatorInstance>,
}

impl Conversion {
    /// A conversion over the given chain.
    #[must_use]
    pub fn new(chain: Vec<TranslatorInstance>) -> Self {
        Self { chain }
    }

    /// Threads `circuit` through the chain.
    pub fn apply_to(&self, circuit: Circuit, ws: &Workspace) -> Result<Circuit, PipelineError> {
        let mut current = circuit;
        for instance in &self.chain {
            debug!(step = %instance, "applying translator");
            current = instance.apply(&current, ws)?;
        }
        Ok(current)
    }

    /// The serializable form of this conversion.
    #[must_use]
    pub fn to_steps(&self) -> Vec<StrategyStep> {
        self.chain
            .iter()
            .map(|instance| StrategyStep {
                translator: instance.translator.name().to_owned(),
                extra_args: instance.policy.extra_args.clone(),
            })
            .collect()
    }

    /// Rebuilds a conversion from its serialized steps.
    pub fn from_steps(steps: &[StrategyStep]) -> Result<Self, PipelineError> {
        let chain = steps
            .iter()
            .map(|step| {
                Ok(TranslatorInstance {
                    translator: lookup(&step.translator)?,
                    policy: Policy {
                        extra_args: step.extra_args.clone(),
                    },
                })
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;
        Ok(Self { chain })
    }
}

impl fmt::Display for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Conversion(")?;
        for (i, instance) in self.chain.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{instance}")?;
        }
        write!(f, ")")
    }
}

/// One serialized chain element: the translator class plus the policy that
/// parameterized it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyStep {
    /// Registry name of the translator.
    pub translator: String,
    /// The `extra_args` the instance ran with.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// A persisted strategy: either a single conversion or an ordered list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StrategyFile {
    /// Several conversions (the cross-checking layout).
    Many(Vec<Vec<StrategyStep>>),
    /// One conversion (the replay layout).
    Single(Vec<StrategyStep>),
}

impl StrategyFile {
    /// The conversions this strategy describes.
    pub fn conversions(&self) -> Result<Vec<Conversion>, PipelineError> {
        match self {
            Self::Single(steps) => Ok(vec![Conversion::from_steps(steps)?]),
            Self::Many(list) => list
                .iter()
                .map(|steps| Conversion::from_steps(steps))
                .collect(),
        }
    }

    /// Serializes a list of conversions.
    #[must_use]
    pub fn from_conversions(conversions: &[Conversion]) -> Self {
        Self::Many(conversions.iter().map(Conversion::to_steps).collect())
    }
}
