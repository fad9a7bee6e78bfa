use std::path::PathBuf;

use anyhow::Context;
use railpulse_training::{
    metrics::Metrics,
    model::{AcceptanceStatus, Hyperparameters, ModelFamily},
    store::ModelStore,
    trainer::Trainer,
};
use serde::Serialize;

use crate::{
    command::{self, CommonArg},
    util,
};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct TrainModelsArg {
    #[clap(flatten)]
    common: CommonArg,
    /// Write the training report here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ModelSummary {
    family: ModelFamily,
    path: PathBuf,
    hyperparameters: Hyperparameters,
    cv_mean: Metrics,
    test: Metrics,
    status: AcceptanceStatus,
}

pub(crate) fn run(arg: &TrainModelsArg) -> anyhow::Result<()> {
    let config = arg.common.load()?;
    let dataset = command::load_latest_dataset(&config.output.dataset_dir)?;
    let features = command::build_features(&config, &dataset)?;

    let trainer = Trainer::new(config.training.clone()).context("Invalid training configuration")?;
    let models = trainer
        .train(&features)
        .context("Failed to train classifiers")?;

    let store = ModelStore::new(&config.output.model_dir);
    let mut summaries = vec![];
    for model in &models {
        let path = store
            .publish(model)
            .with_context(|| format!("Failed to publish {} model", model.family()))?;
        summaries.push(ModelSummary {
            family: model.family(),
            path,
            hyperparameters: model.hyperparameters().clone(),
            cv_mean: model.cv().best().mean,
            test: *model.test_metrics(),
            status: model.status(),
        });
    }

    let accepted = summaries.iter().filter(|s| s.status.is_accepted()).count();
    tracing::info!(models = summaries.len(), accepted, "training finished");
    util::emit_json(&summaries, arg.output.as_deref())
}
