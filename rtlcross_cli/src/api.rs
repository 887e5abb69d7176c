//! The orchestration surface: convert, cross-check, replay, mutate.
//!
//! Every operation here is one unit job. Evidence is written first, then the
//! job returns normally; no error propagates past a job, and the driver
//! never fails because a job failed.

use std::error::Error as StdError;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{error, info, warn};

use rtlcross_circuit::Circuit;
use rtlcross_common::Workspace;
use rtlcross_common::consts::{
    COMPILATION_LABEL, CROSS_CHECKING_LABEL, DIFFERENCE_FILENAME, EXCEPTION_FILENAME,
    INPUT_FILENAME, MUTATION_LABEL, STRATEGY_FILENAME,
};
use rtlcross_mutate::mutator::MutationOperator;
use rtlcross_mutate::HeuristicMutator;
use rtlcross_pipeline::{Conversion, StrategyFile, ValidationGroup};

/// Driver-level failures (job-level ones are persisted, not raised).
#[derive(Debug, Error)]
pub enum ApiError {
    /// Filesystem failure outside any job.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Pipeline enumeration failure.
    #[error(transparent)]
    Pipeline(#[from] rtlcross_pipeline::PipelineError),
    /// Strategy file failure.
    #[error("malformed strategy: {0}")]
    Strategy(#[from] serde_json::Error),
    /// Worker pool construction failure.
    #[error("failed to build the worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Renders an error with its source chain, one frame per line.
fn error_trace(top: &dyn StdError) -> String {
    let mut trace = String::new();
    let _ = writeln!(trace, "{top}");
    let mut source = top.source();
    while let Some(cause) = source {
        let _ = writeln!(trace, "caused by: {cause}");
        source = cause.source();
    }
    trace
}

struct EquivalenceClass {
    pivot: Circuit,
    members: Vec<Conversion>,
}

fn printable_classes(classes: &[EquivalenceClass]) -> String {
    let mut out = String::new();
    for (index, class) in classes.iter().enumerate() {
        let _ = writeln!(out, "class {index}:");
        for conversion in &class.members {
            let _ = writeln!(out, "    {conversion}");
        }
    }
    out
}

/// The harness: a result directory plus the operations over it.
#[derive(Debug)]
pub struct Harness {
    result_dir: PathBuf,
}

impl Harness {
    /// A harness persisting evidence under `result_dir` (created if absent).
    pub fn new(result_dir: impl Into<PathBuf>) -> Result<Self, ApiError> {
        let result_dir = result_dir.into();
        std::fs::create_dir_all(&result_dir)?;
        Ok(Self { result_dir })
    }

    fn workspace(&self) -> Option<Workspace> {
        match Workspace::create(&self.result_dir) {
            Ok(ws) => Some(ws),
            Err(e) => {
                error!(error = %e, "cannot create a workspace");
                None
            }
        }
    }

    /// Performs one conversion on the input program. Failures persist the
    /// input, the strategy, and the error trace under `compilation/`.
    pub fn convert(&self, input: &Path, conversion: &Conversion) -> Option<Circuit> {
        let ws = self.workspace()?;

        let attempt = || -> Result<Circuit, Box<dyn StdError>> {
            let strategy = serde_json::to_string_pretty(&conversion.to_steps())?;
            ws.save_to_file(strategy, STRATEGY_FILENAME)?;

            let extension = input
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default();
            let input_copy = ws.save_to_file(
                std::fs::read(input)?,
                &format!("{INPUT_FILENAME}.{extension}"),
            )?;

            let source = Circuit::from_file(&input_copy)?;
            Ok(conversion.apply_to(source, &ws)?)
        };

        match attempt() {
            Ok(circuit) => Some(circuit),
            Err(e) => {
                warn!(input = %input.display(), %conversion, "conversion failed");
                let _ = ws.save_to_file(error_trace(e.as_ref()), EXCEPTION_FILENAME);
                let _ = ws.save_as(COMPILATION_LABEL);
                None
            }
        }
    }

    /// One validation unit: converts the input through every conversion and
    /// groups the successes into equivalence classes. More than one class is
    /// a miscompilation, persisted under `cross-checking/`.
    pub fn equivalence_check(&self, input: &Path, conversions: &[Conversion], test_only: bool) {
        let Some(ws) = self.workspace() else { return };

        let mut valid_conversions: Vec<Conversion> = Vec::new();
        let mut classes: Vec<EquivalenceClass> = Vec::new();

        for conversion in conversions {
            let Some(circuit) = self.convert(input, conversion) else {
                continue;
            };
            valid_conversions.push(conversion.clone());

            let mut placed = false;
            for class in &mut classes {
                match class
                    .pivot
                    .is_equivalent_to(&circuit, test_only, false, &ws)
                {
                    Ok(true) => {
                        class.members.push(conversion.clone());
                        placed = true;
                        break;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        // The anomaly surfaces as a pessimistic split: the
                        // circuit keeps its own class below.
                        let _ = ws.save_to_file(error_trace(&e), EXCEPTION_FILENAME);
                    }
                }
            }
            if !placed {
                classes.push(EquivalenceClass {
                    pivot: circuit,
                    members: vec![conversion.clone()],
                });
            }
        }

        if classes.len() > 1 {
            info!(
                input = %input.display(),
                classes = classes.len(),
                "equivalence classes split"
            );
            let persist = || -> Result<(), Box<dyn StdError>> {
                let strategy =
                    serde_json::to_string_pretty(&StrategyFile::from_conversions(&valid_conversions))?;
                ws.save_to_file(strategy, STRATEGY_FILENAME)?;
                let extension = input
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or_default();
                ws.save_to_file(
                    std::fs::read(input)?,
                    &format!("{INPUT_FILENAME}.{extension}"),
                )?;
                ws.save_to_file(printable_classes(&classes), DIFFERENCE_FILENAME)?;
                ws.save_as(CROSS_CHECKING_LABEL)?;
                Ok(())
            };
            if let Err(e) = persist() {
                error!(error = %e, "failed to persist a cross-checking record");
            }
        }
    }

    /// Re-runs a persisted `(input, strategy)` pair with full equivalence
    /// checking.
    pub fn replay(&self, hdl_file: &Path, json_file: &Path) -> Result<(), ApiError> {
        let strategy: StrategyFile = serde_json::from_str(&std::fs::read_to_string(json_file)?)?;
        let conversions = strategy.conversions()?;
        self.equivalence_check(hdl_file, &conversions, false);
        Ok(())
    }

    /// Farms validation groups to a pool of `n_jobs` workers.
    pub fn run_validation(
        &self,
        groups: Vec<ValidationGroup>,
        test_only: bool,
        n_jobs: usize,
    ) -> Result<(), ApiError> {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(n_jobs).build()?;
        let total = groups.len();
        let done = AtomicUsize::new(0);
        pool.install(|| {
            groups.par_iter().for_each(|group| {
                self.equivalence_check(&group.input, &group.conversions, test_only);
                let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                info!("validation progress: {finished}/{total}");
            });
        });
        Ok(())
    }

    /// Replays every numbered `(input, strategy)` pair under the directory.
    pub fn regression_test(
        &self,
        dir: &Path,
        input_suffix: &str,
        n_jobs: usize,
    ) -> Result<(), ApiError> {
        let mut cases = Vec::new();
        for index in 1.. {
            let input = dir.join(format!("input{index:06}{input_suffix}"));
            let strategy = dir.join(format!("strategy{index:06}.json"));
            if !(input.exists() && strategy.exists()) {
                break;
            }
            cases.push((input, strategy));
        }

        let pool = rayon::ThreadPoolBuilder::new().num_threads(n_jobs).build()?;
        let total = cases.len();
        let done = AtomicUsize::new(0);
        pool.install(|| {
            cases.par_iter().for_each(|(input, strategy)| {
                if let Err(e) = self.replay(input, strategy) {
                    warn!(input = %input.display(), error = %e, "replay failed");
                }
                let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                info!("regression progress: {finished}/{total}");
            });
        });
        Ok(())
    }

    /// One mutation unit: mutates a seed, writing validated mutants to the
    /// output directory. Recoverable generator errors persist the workspace
    /// under `mutation/`.
    pub fn mutate(&self, seed_path: &Path, output_dir: &Path, n_times: usize, rng: &mut StdRng) {
        let Some(ws) = self.workspace() else { return };

        let stem = seed_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("seed");
        let extension = seed_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();

        let mut mutator = HeuristicMutator::default();
        match mutator.generate(seed_path, n_times, &ws, rng) {
            Ok(mutants) => {
                for (index, mutant) in mutants.iter().enumerate() {
                    let target = output_dir.join(format!("{stem}-mutated-{index}{extension}"));
                    if let Err(e) = std::fs::write(&target, mutant) {
                        error!(target = %target.display(), error = %e, "cannot write mutant");
                    }
                }
            }
            Err(e) => {
                warn!(seed = %seed_path.display(), error = %e, "mutation failed");
                let _ = ws.save_to_file(error_trace(&e), EXCEPTION_FILENAME);
                let _ = ws.save_as(MUTATION_LABEL);
                return;
            }
        }

        if mutator.has_error() {
            // Recoverable faults happened along the way; keep the scene.
            let _ = ws.save_as(MUTATION_LABEL);
        }
    }

    /// Mutates every seed under `seed_dir` with `n_jobs` workers (or
    /// serially with `debug`).
    pub fn run_mutation(
        &self,
        seed_dir: &Path,
        output_dir: &Path,
        n_times: usize,
        n_jobs: usize,
        debug: bool,
        seed: Option<u64>,
    ) -> Result<(), ApiError> {
        std::fs::create_dir_all(output_dir)?;

        let seeds: Vec<PathBuf> = walkdir::WalkDir::new(seed_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_owned())
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("v") | Some("sv")
                )
            })
            .collect();

        let base_seed = seed.unwrap_or_else(|| rand::thread_rng().r#gen());

        if debug {
            for (index, seed_path) in seeds.iter().enumerate() {
                let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(index as u64));
                self.mutate(seed_path, output_dir, n_times, &mut rng);
            }
            return Ok(());
        }

        let pool = rayon::ThreadPoolBuilder::new().num_threads(n_jobs).build()?;
        let total = seeds.len();
        let done = AtomicUsize::new(0);
        pool.install(|| {
            seeds.par_iter().enumerate().for_each(|(index, seed_path)| {
                let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(index as u64));
                self.mutate(seed_path, output_dir, n_times, &mut rng);
                let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                info!("mutation progress: {finished}/{total}");
            });
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_traces_follow_the_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let top = ApiError::Io(io);
        let trace = error_trace(&top);
        assert!(trace.contains("missing file"));
    }

    #[test]
    fn harness_creates_its_result_dir() {
        let root = tempfile::TempDir::new().unwrap();
        let dir = root.path().join("failures");
        Harness::new(&dir).unwrap();
        assert!(dir.is_dir());
    }
}
