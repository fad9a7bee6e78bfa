use anyhow::Context;
use railpulse_synth::{
    generator::{SyntheticBatch, SyntheticGenerator},
    validator::{QualityValidator, ValidationReport},
};
use serde::Serialize;

use crate::{
    command::{self, CommonArg},
    util,
};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct GenerateSyntheticArg {
    #[clap(flatten)]
    common: CommonArg,
    /// Override the configured record count
    #[arg(long)]
    count: Option<usize>,
    /// Override the configured seed
    #[arg(long)]
    seed: Option<u64>,
}

/// The batch file: records, the strategy that produced them, and their validation.
#[derive(Debug, Serialize)]
struct SyntheticArtifact<'a> {
    #[serde(flatten)]
    batch: &'a SyntheticBatch,
    validation: &'a ValidationReport,
}

pub(crate) fn run(arg: &GenerateSyntheticArg) -> anyhow::Result<()> {
    let config = arg.common.load()?;
    let dataset = command::load_latest_dataset(&config.output.dataset_dir)?;

    let mut synthesis = config.synthesis.clone();
    if let Some(count) = arg.count {
        synthesis.count = count;
    }
    if let Some(seed) = arg.seed {
        synthesis.seed = seed;
    }
    let batch = SyntheticGenerator::new(synthesis)
        .context("Invalid synthesis configuration")?
        .generate(&dataset)
        .context("Failed to generate synthetic batch")?;
    let validation = QualityValidator::new(config.validation).validate(&dataset, &batch);

    let path = &config.output.synthetic_path;
    util::write_json_atomic(
        "synthetic batch",
        path,
        &SyntheticArtifact {
            batch: &batch,
            validation: &validation,
        },
    )?;
    tracing::info!(
        path = %path.display(),
        records = batch.len(),
        passed = validation.passed,
        "wrote synthetic batch"
    );
    Ok(())
}
