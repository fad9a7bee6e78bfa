use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use railpulse_dataset::{master::MasterDataset, store::DatasetStore};
use railpulse_features::{engineer::FeatureEngineer, schema::FeatureSet};
use railpulse_training::model::ModelFamily;

use crate::config::PipelineConfig;

use self::{
    analyze::AnalyzeArg, build_dataset::BuildDatasetArg, generate_synthetic::GenerateSyntheticArg,
    predict::PredictArg, train_models::TrainModelsArg,
};

mod analyze;
mod build_dataset;
mod generate_synthetic;
mod predict;
mod train_models;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Normalize source tables and publish a new master dataset version
    BuildDataset(#[clap(flatten)] BuildDatasetArg),
    /// Train, evaluate and publish both classifier families
    TrainModels(#[clap(flatten)] TrainModelsArg),
    /// Generate and validate a synthetic batch from the latest dataset
    GenerateSynthetic(#[clap(flatten)] GenerateSyntheticArg),
    /// Run the statistical tests and write the narrative summary
    Analyze(#[clap(flatten)] AnalyzeArg),
    /// Score the latest day of every region with a stored model
    Predict(#[clap(flatten)] PredictArg),
}

/// Arguments shared by every subcommand.
#[derive(Debug, Clone, clap::Args)]
pub(crate) struct CommonArg {
    /// Pipeline configuration file
    #[arg(long)]
    config: PathBuf,
}

impl CommonArg {
    fn load(&self) -> anyhow::Result<PipelineConfig> {
        PipelineConfig::load(&self.config)
    }
}

/// Model family selectable on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum FamilyArg {
    #[default]
    RandomForest,
    GradientBoosting,
}

impl From<FamilyArg> for ModelFamily {
    fn from(arg: FamilyArg) -> Self {
        match arg {
            FamilyArg::RandomForest => ModelFamily::RandomForest,
            FamilyArg::GradientBoosting => ModelFamily::GradientBoosting,
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    match args.mode {
        Mode::BuildDataset(arg) => build_dataset::run(&arg)?,
        Mode::TrainModels(arg) => train_models::run(&arg)?,
        Mode::GenerateSynthetic(arg) => generate_synthetic::run(&arg)?,
        Mode::Analyze(arg) => analyze::run(&arg)?,
        Mode::Predict(arg) => predict::run(&arg)?,
    }
    Ok(())
}

fn load_latest_dataset(dir: &Path) -> anyhow::Result<MasterDataset> {
    let (version, dataset) = DatasetStore::new(dir)
        .load_latest()
        .with_context(|| format!("Failed to load master dataset from {}", dir.display()))?;
    tracing::info!(version, records = dataset.len(), "loaded master dataset");
    Ok(dataset)
}

fn build_features(config: &PipelineConfig, dataset: &MasterDataset) -> anyhow::Result<FeatureSet> {
    let engineer =
        FeatureEngineer::new(config.features.clone()).context("Invalid feature configuration")?;
    Ok(engineer.build(dataset))
}
