//! Top-level application orchestration.
//!
//! `src/main.rs` only maps the result of [`run`] to an exit code; this module
//! parses arguments, installs logging and dispatches the subcommands.

use std::collections::BTreeMap;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::assess::{self, AssessSettings};
use crate::cli::{AssessArgs, Cli, Command, ModelArgs, OptimiseArgs, SimulateArgs};
use crate::config::FitConfig;
use crate::core::Curve;
use crate::error::FitResult;
use crate::io::RunDirectory;
use crate::models::ModelAdapter;
use crate::simulation::SimSettings;

pub mod pipeline;

/// Entry point for the `creep-fit` binary.
pub fn run() -> FitResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Optimise(args) => handle_optimise(args),
        Command::Assess(args) => handle_assess(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "creep_fit=debug" } else { "creep_fit=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second installation (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_optimise(args: OptimiseArgs) -> FitResult<()> {
    let mut config = FitConfig::load(&args.config)?;
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if let Some(seed) = args.seed {
        config.solver.seed = seed;
    }
    if let Some(generations) = args.generations {
        config.solver.generations = generations;
    }
    if args.title.is_some() {
        config.title = args.title;
    }
    config.validate()?;

    pipeline::configure_threads(config.thread_count());
    let output = pipeline::run_calibration(&config)?;

    let record = &output.record;
    println!("{} ({})", output.solver, output.description);
    println!("{}", output.result.message);
    println!(
        "fitness {:.6e} after {} iterations, {} evaluations ({} failed)",
        record.fitness, record.iteration, record.evaluations, record.failed_evaluations
    );
    for param in &record.params {
        println!("  {:<10} {:>14.6e}", param.name, param.value);
    }
    for term in &record.terms {
        println!(
            "  {:<10} {:<8} {:>6} x {:.6e}",
            term.name,
            term.curve_type.as_str(),
            term.weight,
            term.value
        );
    }
    if let Some(validation) = &record.validation {
        println!("validation fitness {:.6e} on {} curves", validation.fitness, validation.curves.len());
    }
    println!("results in {}", output.run.path().display());
    Ok(())
}

fn model_adapter(args: &ModelArgs) -> FitResult<ModelAdapter> {
    let fixed: BTreeMap<String, f64> = args.fixed.iter().cloned().collect();
    let conditions: Vec<Curve> = args.conditions.iter().map(|c| c.to_curve()).collect();
    Ok(
        ModelAdapter::from_name(&args.model, &fixed, conditions.into())?.with_settings(SimSettings {
            min_samples: args.min_samples,
            ..SimSettings::default()
        }),
    )
}

fn handle_assess(args: AssessArgs) -> FitResult<()> {
    let adapter = model_adapter(&args.model)?;
    pipeline::configure_threads(args.threads);

    let settings = AssessSettings {
        trials: args.trials,
        seed: args.seed,
        parallel: args.threads != 1,
    };
    let assessment = assess::assess(&adapter, &settings)?;
    let run = RunDirectory::create(&args.output_dir, args.title.as_deref())?;
    assess::write_report(&run, &assessment)?;

    println!(
        "{} of {} trials usable",
        assessment.valid_count(),
        assessment.trials.len()
    );
    println!("results in {}", run.path().display());
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> FitResult<()> {
    let fixed: BTreeMap<String, f64> = args.model.fixed.iter().cloned().collect();
    let conditions: Vec<Curve> = args.model.conditions.iter().map(|c| c.to_curve()).collect();
    let settings = SimSettings {
        min_samples: args.model.min_samples,
        ..SimSettings::default()
    };

    match pipeline::run_simulation(&args.model.model, &fixed, &args.params, conditions, settings, &args.output)? {
        Some(curves) => {
            for curve in &curves {
                println!(
                    "{:<24} {:>5} samples  x_end {:>12.6e}  y_end {:>12.6e}",
                    curve.test_id,
                    curve.len(),
                    curve.x_end().unwrap_or(f64::NAN),
                    curve.y_end().unwrap_or(f64::NAN)
                );
            }
            println!("curves written to {}", args.output.display());
        }
        None => warn!("the model gave no usable curves for these parameters"),
    }
    Ok(())
}
