use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use anyhow::Context;
use railpulse_dataset::{region::Region, schema::RecordKey};
use railpulse_training::{
    predictor::{PredictionResult, Predictor},
    store::ModelStore,
};
use serde::Serialize;

use crate::{
    command::{self, CommonArg, FamilyArg},
    util,
};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct PredictArg {
    #[clap(flatten)]
    common: CommonArg,
    #[arg(long, value_enum, default_value_t)]
    family: FamilyArg,
    /// Write predictions here instead of the configured predictions path
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ScoredRecord {
    #[serde(flatten)]
    key: RecordKey,
    #[serde(flatten)]
    prediction: PredictionResult,
}

#[derive(Debug, Serialize)]
struct PredictionReport {
    model: String,
    version: u32,
    predictions: Vec<ScoredRecord>,
}

pub(crate) fn run(arg: &PredictArg) -> anyhow::Result<()> {
    let config = arg.common.load()?;
    let dataset = command::load_latest_dataset(&config.output.dataset_dir)?;
    let features = command::build_features(&config, &dataset)?;

    let store = ModelStore::new(&config.output.model_dir);
    let (version, model) = store
        .load_latest(arg.family.into(), &features.schema.hash())
        .context("Failed to load model")?;
    let model_key = model.key();
    let predictor = Predictor::new(Arc::new(model));

    // vectors are sorted by key, so the last one per region is the most recent
    let mut latest = BTreeMap::<Region, usize>::new();
    for (index, vector) in features.vectors.iter().enumerate() {
        latest.insert(vector.key.region, index);
    }
    let mut predictions = vec![];
    for index in latest.into_values() {
        let vector = &features.vectors[index];
        let prediction = predictor
            .predict(vector, &features.schema)
            .with_context(|| format!("Failed to score {}", vector.key))?;
        tracing::info!(
            key = %vector.key,
            class = %prediction.class_label,
            risk = prediction.risk_score,
            "scored record"
        );
        predictions.push(ScoredRecord {
            key: vector.key,
            prediction,
        });
    }

    let report = PredictionReport {
        model: model_key,
        version,
        predictions,
    };
    let path = arg.output.as_ref().unwrap_or(&config.output.predictions_path);
    util::write_json_atomic("predictions", path, &report)
}
