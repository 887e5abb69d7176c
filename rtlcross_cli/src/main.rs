//! Entry point of the rtlcross harness.

mod api;
mod args;

use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use rtlcross_circuit::{CircuitClass, CircuitKind};
use rtlcross_pipeline::sample_compilation_space;

use api::Harness;
use args::{Cli, Command};

fn parse_source(name: &str) -> Result<CircuitKind, Box<dyn std::error::Error>> {
    match CircuitClass::parse(name) {
        Some(CircuitClass::Kind(kind)) => Ok(kind),
        _ => Err(format!("invalid source type: {name}").into()),
    }
}

fn parse_sink(name: &str) -> Result<CircuitClass, Box<dyn std::error::Error>> {
    CircuitClass::parse(name).ok_or_else(|| format!("unknown circuit type: {name}").into())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let harness = Harness::new(&cli.result_dir)?;

    match cli.command {
        Command::Replay { hdl_file, json_file } => {
            harness.replay(&hdl_file, &json_file)?;
        }
        Command::BatchTest {
            rtl_dir,
            source_type,
            sink_type,
            n_samples,
            test_only,
            n_jobs,
            seed,
            max_op,
        } => {
            let source = parse_source(&source_type)?;
            let sink = parse_sink(&sink_type)?;
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let groups =
                sample_compilation_space(&rtl_dir, source, sink, n_samples, max_op, &mut rng)?;
            info!(groups = groups.len(), "validation groups sampled");
            harness.run_validation(groups, test_only, n_jobs)?;
        }
        Command::RegressionTest {
            dir,
            input_suffix,
            n_jobs,
        } => {
            harness.regression_test(&dir, &input_suffix, n_jobs)?;
        }
        Command::Mutate {
            seed_dir,
            output_dir,
            n_times,
            n_jobs,
            debug,
            seed,
        } => {
            harness.run_mutation(&seed_dir, &output_dir, n_times, n_jobs, debug, seed)?;
        }
    }
    Ok(())
}
