//! Command-line parsing.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand};

use crate::core::{Curve, CurveType};
use crate::error::FitError;

#[derive(Debug, Parser)]
#[command(
    name = "creep-fit",
    version,
    about = "Calibrate viscoplastic creep-damage models against experimental curves"
)]
pub struct Cli {
    /// Log per-generation progress (same as RUST_LOG=creep_fit=debug).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit a model to experimental curves as described by a JSON configuration.
    Optimise(OptimiseArgs),
    /// Sample random parameter vectors and report which give usable curves.
    Assess(AssessArgs),
    /// Run a model once and write the predicted curves.
    Simulate(SimulateArgs),
}

#[derive(Debug, Args)]
pub struct OptimiseArgs {
    /// Configuration file.
    pub config: PathBuf,

    /// Parent of the run directory (overrides `output_dir`).
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Random seed (overrides `solver.seed`).
    #[arg(long)]
    pub seed: Option<u64>,

    /// Generation budget (overrides `solver.generations`).
    #[arg(short, long)]
    pub generations: Option<u32>,

    /// Appended to the run directory name.
    #[arg(long)]
    pub title: Option<String>,
}

/// Model selection shared by `assess` and `simulate`.
#[derive(Debug, Args, Clone)]
pub struct ModelArgs {
    /// Model name: evpcd, evpwd or evpwd_s.
    #[arg(short, long)]
    pub model: String,

    /// Override a fixed model parameter, e.g. `--fixed evp_n=5`.
    #[arg(long = "fixed", value_parser = parse_assignment)]
    pub fixed: Vec<(String, f64)>,

    /// Test condition as TYPE:STRESS:TEMP, e.g. `creep:80:800`. Repeatable.
    #[arg(short, long = "condition", default_value = "creep:80:800")]
    pub conditions: Vec<Condition>,

    /// Curves shorter than this count as failed runs.
    #[arg(long, default_value_t = crate::simulation::MIN_DATA)]
    pub min_samples: usize,
}

#[derive(Debug, Args)]
pub struct AssessArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    #[arg(short = 'n', long, default_value_t = 10)]
    pub trials: usize,

    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Worker threads; 0 uses every core.
    #[arg(long, default_value_t = 0)]
    pub threads: usize,

    #[arg(short, long, default_value = "results")]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub title: Option<String>,
}

#[derive(Debug, Args)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Parameter values in declaration order, comma separated.
    #[arg(short, long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
    pub params: Vec<f64>,

    /// Where to write the predicted curves.
    #[arg(short, long, default_value = "simulation.csv")]
    pub output: PathBuf,
}

/// One test condition given on the command line.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub curve_type: CurveType,
    pub stress: f64,
    pub temp: f64,
}

impl Condition {
    pub fn to_curve(&self) -> Curve {
        Curve::condition(self.curve_type, self.stress, self.temp)
    }
}

impl FromStr for Condition {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || FitError::Config(format!("condition '{s}' is not TYPE:STRESS:TEMP"));
        let mut parts = s.split(':');
        let (Some(kind), Some(stress), Some(temp), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(bad());
        };
        Ok(Self {
            curve_type: kind.parse()?,
            stress: stress.trim().parse().map_err(|_| bad())?,
            temp: temp.trim().parse().map_err(|_| bad())?,
        })
    }
}

fn parse_assignment(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))?;
    let value = value
        .trim()
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    Ok((name.trim().to_string(), value))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn conditions_parse() {
        let c: Condition = "tensile:0:20".parse().unwrap();
        assert_eq!(c.curve_type, CurveType::Tensile);
        assert_eq!(c.temp, 20.0);
        assert!("creep:80".parse::<Condition>().is_err());
        assert!("creep:80:800:1".parse::<Condition>().is_err());
        assert!("fatigue:80:800".parse::<Condition>().is_err());
    }

    #[test]
    fn simulate_arguments() {
        let cli = Cli::parse_from([
            "creep-fit",
            "simulate",
            "-m",
            "evpwd_s",
            "--params",
            "40,2.5",
            "--fixed",
            "evp_n=5",
            "-c",
            "creep:70:800",
            "-c",
            "creep:80:800",
        ]);
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.params, vec![40.0, 2.5]);
        assert_eq!(args.model.fixed, vec![("evp_n".to_string(), 5.0)]);
        assert_eq!(args.model.conditions.len(), 2);
        assert_eq!(args.output, PathBuf::from("simulation.csv"));
    }

    #[test]
    fn optimise_overrides_are_optional() {
        let cli = Cli::parse_from(["creep-fit", "-v", "optimise", "fit.json", "--seed", "3"]);
        assert!(cli.verbose);
        let Command::Optimise(args) = cli.command else {
            panic!("expected optimise");
        };
        assert_eq!(args.seed, Some(3));
        assert!(args.generations.is_none());
    }
}
