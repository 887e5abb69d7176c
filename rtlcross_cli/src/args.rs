//! Command-line interface of the harness.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Differential testing harness for HDL toolchains.
#[derive(Debug, Parser)]
#[command(name = "rtlcross", version, about)]
pub struct Cli {
    /// Persistent evidence directory shared by all jobs.
    #[arg(long, default_value = "failures")]
    pub result_dir: PathBuf,

    /// The operation to run.
    #[command(subcommand)]
    pub command: Command,
}

/// The top-level operations.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Re-runs a persisted test case from its input and strategy files.
    Replay {
        /// The HDL input file.
        hdl_file: PathBuf,
        /// The `strategy.json` of the original run.
        json_file: PathBuf,
    },
    /// Samples the compilation space of a corpus and cross-checks it.
    BatchTest {
        /// Directory of HDL inputs.
        rtl_dir: PathBuf,
        /// Source circuit type (e.g. `VerilogCircuit`).
        source_type: String,
        /// Sink circuit type (e.g. `SmtCircuit`).
        sink_type: String,
        /// Conversions sampled per input file.
        n_samples: usize,
        /// Use quick (concretizing) equivalence checks.
        #[arg(long)]
        test_only: bool,
        /// Worker count.
        #[arg(long, default_value_t = 1)]
        n_jobs: usize,
        /// RNG seed for reproducible sampling.
        #[arg(long)]
        seed: Option<u64>,
        /// Maximum extra flags per translator instance.
        #[arg(long, default_value_t = 2)]
        max_op: usize,
    },
    /// Replays every `(input NNNNNN, strategy NNNNNN)` pair in a directory.
    RegressionTest {
        /// Directory holding the numbered pairs.
        dir: PathBuf,
        /// Extension of the input files.
        #[arg(long, default_value = ".v")]
        input_suffix: String,
        /// Worker count.
        #[arg(long, default_value_t = 1)]
        n_jobs: usize,
    },
    /// Mutates every seed in a directory.
    Mutate {
        /// Directory of seed files (`.v` / `.sv`).
        seed_dir: PathBuf,
        /// Where the mutants go.
        output_dir: PathBuf,
        /// Mutants per seed.
        #[arg(long, default_value_t = 0)]
        n_times: usize,
        /// Worker count.
        #[arg(long, default_value_t = 1)]
        n_jobs: usize,
        /// Run seeds serially on the caller thread.
        #[arg(long)]
        debug: bool,
        /// RNG seed for reproducible campaigns.
        #[arg(long)]
        seed: Option<u64>,
    },
}
