//! `plate-acq`: run a plate acquisition against the mock microscope.
//!
//! Real instrument gateways plug in behind the same controller; this
//! binary wires up the mock so the full pipeline can be exercised from
//! the command line.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use acq_core::settings::{AcquisitionSettings, Env};
use acq_driver_mock::{ExposureState, MockMicroscope};
use acq_engine::AcquisitionController;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EnvArg {
    Dev,
    Prod,
}

impl From<EnvArg> for Env {
    fn from(value: EnvArg) -> Self {
        match value {
            EnvArg::Dev => Env::Dev,
            EnvArg::Prod => Env::Prod,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExposureStateArg {
    WayUnder,
    Under,
    InBand,
    Over,
    WayOver,
}

impl From<ExposureStateArg> for ExposureState {
    fn from(value: ExposureStateArg) -> Self {
        match value {
            ExposureStateArg::WayUnder => ExposureState::WayUnder,
            ExposureStateArg::Under => ExposureState::Under,
            ExposureStateArg::InBand => ExposureState::InBand,
            ExposureStateArg::Over => ExposureState::Over,
            ExposureStateArg::WayOver => ExposureState::WayOver,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "plate-acq", about = "Automated plate acquisition (mock gateway)")]
struct Cli {
    /// TOML settings file, layered over built-in defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Execution environment
    #[arg(long, value_enum, default_value = "dev")]
    env: EnvArg,

    /// Output directory for stacks, manifest, and run summary
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Number of wells on the simulated plate
    #[arg(long, default_value_t = 3)]
    wells: u32,

    /// Sites per well
    #[arg(long, default_value_t = 2)]
    sites: u32,

    /// Seed for the simulated sample and fault injection
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// How the simulated sample responds on the signal channel
    #[arg(long, value_enum, default_value = "in-band")]
    exposure_state: ExposureStateArg,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => AcquisitionSettings::load(path)?,
        None => AcquisitionSettings::for_env(cli.env.into()),
    };
    settings.env = cli.env.into();
    if cli.data_dir.is_some() {
        settings.data_dir = cli.data_dir.clone();
    }

    let mut scope = MockMicroscope::builder()
        .num_wells(cli.wells)
        .num_sites_per_well(cli.sites)
        .seed(cli.seed)
        .exposure_state(cli.exposure_state.into());
    if let Some(dir) = &settings.data_dir {
        scope = scope.data_dir(dir);
    }

    let mut controller = AcquisitionController::new(settings, std::sync::Arc::new(scope.build()));
    let summary = controller.run().await?;
    info!(phase = %controller.phase(), "run finished");
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
