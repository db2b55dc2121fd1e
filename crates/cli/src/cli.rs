//! Command-line arguments

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::client::PredictRequest;
use crate::output::OutputFormat;

/// Building savings predictor CLI
#[derive(Parser, Debug)]
#[command(name = "svctl")]
#[command(author, version, about = "CLI for the Building Savings Predictor", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via SVCTL_API_URL env var)
    #[arg(long, env = "SVCTL_API_URL", default_value = "http://localhost:8080", global = true)]
    pub api_url: String,

    /// Output format
    #[arg(long, short, value_enum, default_value = "table", global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Predict the saving for one building
    Predict(PredictArgs),

    /// Show the served model generation
    Status,

    /// Reload artifacts from disk and show the new status
    Reload,

    /// Training jobs
    #[command(subcommand)]
    Train(TrainCommands),
}

#[derive(Subcommand, Debug)]
pub enum TrainCommands {
    /// Submit a training job
    Start {
        #[arg(long, value_enum, default_value = "quick")]
        mode: TrainingModeArg,

        /// Number of cross-validation folds
        #[arg(long, default_value_t = 5)]
        k: usize,

        /// Poll until the job reaches READY or FAILED
        #[arg(long)]
        wait: bool,

        /// Seconds between polls with --wait
        #[arg(long, default_value_t = 2)]
        interval: u64,
    },

    /// Show one job
    Status {
        job_id: String,
    },

    /// List jobs, newest first
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VariantArg {
    #[value(name = "A", alias = "a")]
    A,
    #[value(name = "B", alias = "b")]
    B,
    /// Weighted ensemble of A and B
    #[value(name = "C", alias = "c")]
    C,
}

impl VariantArg {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantArg::A => "A",
            VariantArg::B => "B",
            VariantArg::C => "C",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TrainingModeArg {
    Quick,
    Full,
}

impl TrainingModeArg {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingModeArg::Quick => "quick",
            TrainingModeArg::Full => "full",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct PredictArgs {
    /// Building type (factory, hospital, school, office, other)
    #[arg(long = "type")]
    pub building_type: String,

    /// Floor area in m²
    #[arg(long)]
    pub floor_area: f64,

    #[arg(long)]
    pub built_year: i32,

    #[arg(long, value_enum, default_value = "C")]
    pub variant: VariantArg,

    /// Measured annual consumption (kWh/yr)
    #[arg(long)]
    pub energy_kwh: Option<f64>,

    /// Baseline consumption when no measurement exists (kWh/yr)
    #[arg(long)]
    pub baseline_kwh: Option<f64>,

    #[arg(long)]
    pub years_from: Option<i32>,

    #[arg(long)]
    pub years_to: Option<i32>,

    /// Electricity tariff per kWh
    #[arg(long)]
    pub tariff: Option<f64>,

    #[arg(long)]
    pub region: Option<String>,

    #[arg(long)]
    pub building_name: Option<String>,
}

impl PredictArgs {
    pub fn to_request(&self) -> PredictRequest {
        PredictRequest {
            building_type: self.building_type.clone(),
            floor_area_m2: self.floor_area,
            built_year: self.built_year,
            energy_kwh: self.energy_kwh,
            baseline_kwh: self.baseline_kwh,
            years_from: self.years_from,
            years_to: self.years_to,
            tariff_per_kwh: self.tariff,
            region: self.region.clone(),
            building_name: self.building_name.clone(),
        }
    }
}
