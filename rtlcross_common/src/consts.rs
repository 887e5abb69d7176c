//! Harness-wide settings and stable evidence file names.

use std::time::Duration;

/// Wall-clock bound for ordinary tool invocations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(100);

/// Wall-clock bound for KLEE runs.
pub const KLEE_TIMEOUT: Duration = Duration::from_secs(1000);

/// Wall-clock bound for SMT solving (both the standalone solver session and
/// the yosys `sat` command).
pub const SMT_SOLVER_TIMEOUT: Duration = Duration::from_secs(1000);

/// Stem of the persisted input program (the original extension is appended).
pub const INPUT_FILENAME: &str = "input";

/// Serialized conversion chain(s) of a persisted test case.
pub const STRATEGY_FILENAME: &str = "strategy.json";

/// Captured error trace of a failed job step.
pub const EXCEPTION_FILENAME: &str = "exception.log";

/// Printable equivalence-class partition of a cross-checking record.
pub const DIFFERENCE_FILENAME: &str = "equivalence_classes";

/// Human-readable counterexample report.
pub const REPORT_FILENAME: &str = "report.md";

/// Evidence directory labels under the result dir.
pub const COMPILATION_LABEL: &str = "compilation";
/// See [`COMPILATION_LABEL`].
pub const CROSS_CHECKING_LABEL: &str = "cross-checking";
/// See [`COMPILATION_LABEL`].
pub const MUTATION_LABEL: &str = "mutation";
