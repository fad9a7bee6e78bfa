use std::sync::Arc;

use anyhow::Context;
use railpulse_analysis::{
    engine::StatisticalEngine,
    summary::{FeatureAttribution, NarrativeSummary},
};
use railpulse_features::schema::FeatureSet;
use railpulse_training::{
    model::ModelFamily,
    predictor::Predictor,
    store::{ModelStore, ModelStoreError},
};

use crate::{
    command::{self, CommonArg, FamilyArg},
    config::PipelineConfig,
    util,
};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct AnalyzeArg {
    #[clap(flatten)]
    common: CommonArg,
    /// Model whose attributions are summarized
    #[arg(long, value_enum, default_value_t)]
    family: FamilyArg,
}

pub(crate) fn run(arg: &AnalyzeArg) -> anyhow::Result<()> {
    let config = arg.common.load()?;
    let dataset = command::load_latest_dataset(&config.output.dataset_dir)?;
    let statistics = StatisticalEngine::new(config.analysis.clone()).run(&dataset);

    let features = command::build_features(&config, &dataset)?;
    let attributions = attributions(&config, arg.family.into(), &features)?;

    let summary = NarrativeSummary::new(
        &dataset,
        statistics,
        attributions,
        config.output.top_attributions,
        config.low_performance_threshold(),
    );
    let path = &config.output.summary_path;
    util::write_json_atomic("summary", path, &summary)?;
    tracing::info!(path = %path.display(), regions = summary.kpis.len(), "wrote narrative summary");
    Ok(())
}

/// Mean absolute risk attribution per feature over every vector, or nothing when no
/// model was trained on this feature schema.
fn attributions(
    config: &PipelineConfig,
    family: ModelFamily,
    features: &FeatureSet,
) -> anyhow::Result<Vec<FeatureAttribution>> {
    let store = ModelStore::new(&config.output.model_dir);
    let model = match store.load_latest(family, &features.schema.hash()) {
        Ok((_, model)) => model,
        Err(ModelStoreError::NotFound { key, .. }) => {
            tracing::warn!(%key, "no model for the current feature schema; summary has no attributions");
            return Ok(vec![]);
        }
        Err(error) => return Err(error).context("Failed to load model"),
    };

    let predictor = Predictor::new(Arc::new(model));
    let mut totals = vec![0.0; features.schema.len()];
    for vector in &features.vectors {
        let result = predictor
            .predict(vector, &features.schema)
            .with_context(|| format!("Failed to score {}", vector.key))?;
        for (total, attribution) in totals.iter_mut().zip(&result.attributions) {
            *total += attribution.contribution.abs();
        }
    }

    #[expect(clippy::cast_precision_loss)]
    let count = features.vectors.len().max(1) as f64;
    Ok(features
        .schema
        .names
        .iter()
        .zip(totals)
        .map(|(feature, total)| FeatureAttribution {
            feature: feature.clone(),
            mean_abs_contribution: total / count,
        })
        .collect())
}
