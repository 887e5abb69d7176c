//! Sampling the compilation space of an HDL corpus.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use itertools::Itertools;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::info;
use walkdir::WalkDir;

use rtlcross_circuit::{CircuitClass, CircuitKind};

use crate::conversion::Conversion;
use crate::error::PipelineError;
use crate::translator::{Translator, all_instances, registry};
use crate::world::WorldMap;

/// One parallel unit of work: an input program and the conversions to
/// validate it against.
#[derive(Debug, Clone)]
pub struct ValidationGroup {
    /// The HDL input file.
    pub input: PathBuf,
    /// The sampled conversions.
    pub conversions: Vec<Conversion>,
}

/// The translator set participating in a run. Surelog only joins direct
/// SystemVerilog-to-Verilog campaigns; everything else flows through sv2v.
fn participating_translators(
    source: CircuitKind,
    sink: CircuitClass,
) -> Vec<Arc<dyn Translator>> {
    let keep_surelog = source == CircuitKind::SystemVerilog
        && sink == CircuitClass::Kind(CircuitKind::Verilog);
    registry()
        .into_iter()
        .filter(|t| keep_surelog || t.name() != "SurelogPlugin")
        .collect()
}

/// Enumerates every conversion from `source` to `sink` with up to `max_op`
/// extra flags per translator.
pub fn all_conversions(
    source: CircuitKind,
    sink: CircuitClass,
    max_op: usize,
    rng: &mut impl Rng,
) -> Vec<Conversion> {
    let world = WorldMap::new(participating_translators(source, sink));
    let mut conversions = Vec::new();
    for path in world.travel(source, sink) {
        let per_step: Vec<Vec<_>> = path
            .iter()
            .map(|translator| all_instances(translator, max_op, rng))
            .collect();
        for chain in per_step.into_iter().multi_cartesian_product() {
            conversions.push(Conversion::new(chain));
        }
    }
    conversions
}

/// Searches `rtl_dir` for files of the source type and pairs each with a
/// random sample (without replacement) of the conversion space.
pub fn sample_compilation_space(
    rtl_dir: &Path,
    source: CircuitKind,
    sink: CircuitClass,
    n_samples: usize,
    max_op: usize,
    rng: &mut impl Rng,
) -> Result<Vec<ValidationGroup>, PipelineError> {
    if !matches!(source, CircuitKind::Verilog | CircuitKind::SystemVerilog) {
        return Err(PipelineError::InvalidSource(source.name().to_owned()));
    }
    let extension = source.extension().expect("HDL sources have extensions");

    let conversions = all_conversions(source, sink, max_op, rng);
    if conversions.len() < n_samples {
        return Err(PipelineError::NotEnoughConversions {
            have: conversions.len(),
            want: n_samples,
        });
    }
    info!(
        conversions = conversions.len(),
        "compilation space enumerated"
    );

    let mut groups = Vec::new();
    for entry in WalkDir::new(rtl_dir).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        groups.push(ValidationGroup {
            input: entry.path().to_owned(),
            conversions: conversions
                .choose_multiple(rng, n_samples)
                .cloned()
                .collect(),
        });
    }
    Ok(groups)
}
