//! The coverage-driven mutation engine.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::OnceLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use rand::Rng;
use rand::rngs::StdRng;
use tracing::{debug, warn};
use tree_sitter::Tree;

use rtlcross_common::{Workspace, verilog};

use crate::coverage::ByteCoverage;
use crate::editor::{BytesEditor, Replacement};
use crate::mutator::{MutationError, MutationOperator, validate};
use crate::mutators::{
    ChangeBinaryOp, ChangeUnaryOp, DuplicateCond1, DuplicateCond2, DuplicateExpr, DuplicateModule,
    LoopAssignment, MakeArray, MakeFunction, MakeLoopGenerate, MakeRepeat, Plan,
    RedundantAssignment, RemoveCond, SplitAssignment, SubMutator,
};

/// Probability of taking the top-scored candidate instead of a random one.
const RANDOM_SELECTION_RATE: f64 = 0.5;

/// Weight of a mutator's priority over its coverage score.
const PRIORITY_COEFFICIENT: f64 = 100.0;

/// One candidate mutation: the source it applies to plus its replacements.
struct CandidateMutant {
    mutator_id: usize,
    priority: i32,
    src: Arc<Vec<u8>>,
    replacements: Plan,
}

impl CandidateMutant {
    fn score(&self, cov: &ByteCoverage) -> f64 {
        f64::from(self.priority) * PRIORITY_COEFFICIENT + cov.query(&self.replacements)
    }

    fn realize(&self) -> Result<Vec<u8>, MutationError> {
        let mut editor = BytesEditor::new(self.src.as_ref().clone(), self.replacements.clone())?;
        editor.apply();
        Ok(editor.into_data())
    }
}

struct MutatorSlot {
    mutator: Box<dyn SubMutator>,
    priority: i32,
    percentage: f64,
}

/// Rewrites every escaped identifier into a simple one derived from its
/// base64 form, so the sub-mutators never splice inside `\...` tokens.
pub(crate) fn normalize_escaped_identifiers(src: &[u8]) -> Vec<u8> {
    static PATTERN: OnceLock<regex::bytes::Regex> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| regex::bytes::Regex::new(r"\\[!-~]+").expect("static regex"));
    pattern
        .replace_all(src, |captures: &regex::bytes::Captures<'_>| {
            let encoded = STANDARD_NO_PAD
                .encode(&captures[0])
                .replace('+', "$")
                .replace('/', "_");
            format!("___{encoded}")
        })
        .into_owned()
}

/// The priority-weighted, coverage-driven AST mutator.
pub struct HeuristicMutator {
    slots: Vec<MutatorSlot>,
    has_error: bool,
}

impl Default for HeuristicMutator {
    fn default() -> Self {
        Self::with_configuration(vec![
            (Box::new(ChangeUnaryOp) as Box<dyn SubMutator>, 0, 1.0),
            (Box::new(ChangeBinaryOp), 0, 1.0),
            (Box::new(MakeLoopGenerate), 0, 1.0),
            (Box::new(MakeRepeat), 0, 1.0),
            (Box::new(RedundantAssignment), 0, 2.0),
            (Box::new(RemoveCond), 1, 2.0),
            (Box::new(DuplicateModule), 1, 2.0),
            (Box::new(DuplicateExpr), 1, 2.0),
            (Box::new(DuplicateCond1), 1, 3.0),
            (Box::new(DuplicateCond2), 1, 3.0),
            (Box::new(MakeFunction), 2, 3.0),
            (Box::new(SplitAssignment), 0, 3.0),
            (Box::new(MakeArray), 1, 5.0),
            (Box::new(LoopAssignment), 2, 5.0),
        ])
    }
}

impl HeuristicMutator {
    /// An engine over an explicit `(mutator, priority, weight)` table;
    /// weights renormalize to percentages.
    #[must_use]
    pub(crate) fn with_configuration(
        configuration: Vec<(Box<dyn SubMutator>, i32, f64)>,
    ) -> Self {
        let denominator: f64 = configuration.iter().map(|(_, _, weight)| weight).sum();
        Self {
            slots: configuration
                .into_iter()
                .map(|(mutator, priority, weight)| MutatorSlot {
                    mutator,
                    priority,
                    percentage: weight / denominator,
                })
                .collect(),
            has_error: false,
        }
    }

    /// Collects candidates from every sub-mutator, tolerating per-mutator
    /// faults.
    fn collect_candidates(
        &mut self,
        src: &Arc<Vec<u8>>,
        tree: &Tree,
        ws: &Workspace,
        rng: &mut StdRng,
        pool: &mut HashMap<usize, Vec<CandidateMutant>>,
    ) {
        for (id, slot) in self.slots.iter().enumerate() {
            match slot.mutator.plans(tree, src, rng) {
                Ok(plans) => {
                    pool.entry(id).or_default().extend(plans.into_iter().map(
                        |replacements| CandidateMutant {
                            mutator_id: id,
                            priority: slot.priority,
                            src: Arc::clone(src),
                            replacements,
                        },
                    ));
                }
                Err(error) => {
                    warn!(mutator = slot.mutator.name(), %error, "mutator failed");
                    let _ = ws.save_to_file(src.as_ref(), "mutation_error");
                    let _ = ws.save_to_file(
                        format!("{}: {error}", slot.mutator.name()),
                        "mutation_error.log",
                    );
                    self.has_error = true;
                }
            }
        }
    }

    /// Trims the pool to `3 * number` candidates, retaining each mutator's
    /// best-scoring share.
    fn cap_pool(
        &self,
        pool: &mut HashMap<usize, Vec<CandidateMutant>>,
        cap_base: usize,
        cov: &ByteCoverage,
    ) {
        let total: usize = pool.values().map(Vec::len).sum();
        for (id, slot) in self.slots.iter().enumerate() {
            let expected = (cap_base.min(total) as f64 * slot.percentage) as usize;
            if let Some(candidates) = pool.get_mut(&id) {
                if candidates.len() > expected {
                    candidates.sort_by(|a, b| {
                        b.score(cov)
                            .partial_cmp(&a.score(cov))
                            .unwrap_or(std::cmp::Ordering::Equal)
                    });
                    candidates.truncate(expected);
                }
            }
        }
    }
}

impl MutationOperator for HeuristicMutator {
    fn generate(
        &mut self,
        seed_path: &Path,
        number: usize,
        ws: &Workspace,
        rng: &mut StdRng,
    ) -> Result<Vec<Vec<u8>>, MutationError> {
        let suffix = seed_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();

        let seed = normalize_escaped_identifiers(&std::fs::read(seed_path)?);
        let seed_tree = verilog::parse(&seed)?;
        let src = Arc::new(seed);

        let mut cov = ByteCoverage::new(src.len());
        let mut pool: HashMap<usize, Vec<CandidateMutant>> = HashMap::new();
        self.collect_candidates(&src, &seed_tree, ws, rng, &mut pool);

        let cap_base = number * 3;
        let mut emitted = Vec::new();

        for _ in 0..number {
            loop {
                // Candidate ranking under the current coverage.
                let mut ranked: Vec<(usize, usize, f64)> = pool
                    .iter()
                    .flat_map(|(id, candidates)| {
                        candidates
                            .iter()
                            .enumerate()
                            .map(|(index, c)| (*id, index, c.score(&cov)))
                    })
                    .collect();
                if ranked.is_empty() {
                    break;
                }
                ranked.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

                // Exploitation or exploration, coin-flipped.
                let picked = if rng.r#gen::<f64>() < RANDOM_SELECTION_RATE {
                    0
                } else {
                    rng.gen_range(0..ranked.len())
                };
                let (mutator_id, index, _) = ranked[picked];
                let candidate = pool
                    .get_mut(&mutator_id)
                    .expect("pool key came from iteration")
                    .swap_remove(index);

                let mutant = match candidate.realize() {
                    Ok(mutant) => mutant,
                    Err(error) => {
                        warn!(%error, "candidate failed to realize");
                        let _ = ws.save_to_file(candidate.src.as_ref(), "mutation_error");
                        let _ = ws.save_to_file(error.to_string(), "mutation_error.log");
                        self.has_error = true;
                        continue;
                    }
                };
                cov.update(&candidate.replacements);
                let mutant_tree = verilog::parse(&mutant)?;

                if !validate(&mutant, &suffix, ws)? {
                    continue;
                }
                emitted.push(mutant.clone());
                debug!(
                    emitted = emitted.len(),
                    coverage = cov.covered_ratio(),
                    "mutant validated"
                );

                if mutant_tree.root_node().has_error() {
                    // The mutant just passed the external check, so error
                    // nodes point at the parser, not the mutation.
                    let _ = ws.save_to_file(&mutant, &format!("parse_error{suffix}"));
                    self.has_error = true;
                } else {
                    let new_src = Arc::new(mutant);
                    self.collect_candidates(&new_src, &mutant_tree, ws, rng, &mut pool);
                    self.cap_pool(&mut pool, cap_base, &cov);
                }
                break;
            }
        }
        Ok(emitted)
    }

    fn has_error(&self) -> bool {
        self.has_error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaped_identifiers_become_simple() {
        let src = b"wire \\bus.a , plain;\n";
        let normalized = normalize_escaped_identifiers(src);
        let text = String::from_utf8(normalized).unwrap();

        assert!(!text.contains('\\'));
        assert!(text.contains("___"));
        assert!(text.contains("plain"));
    }

    #[test]
    fn normalization_is_stable() {
        let src = b"assign \\x$1 = \\x$1 ;\n";
        let once = normalize_escaped_identifiers(src);
        let twice = normalize_escaped_identifiers(&once);
        assert_eq!(once, twice);
    }
}
