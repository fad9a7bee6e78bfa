//! The resolved pipeline configuration.
//!
//! One JSON file configures every stage. Each section is owned by the library crate
//! that consumes it and falls back to that crate's defaults when omitted. Relative
//! paths are taken relative to the configuration file's directory.

use std::path::{Path, PathBuf};

use railpulse_analysis::engine::AnalysisConfig;
use railpulse_dataset::master::DatasetConfig;
use railpulse_features::{engineer::FeatureConfig, schema::LabelScheme};
use railpulse_synth::{generator::SynthesisConfig, validator::ValidationConfig};
use railpulse_training::trainer::TrainerConfig;
use serde::{Deserialize, Serialize};

use crate::util;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory of published master dataset versions.
    pub dataset_dir: PathBuf,
    /// Directory of published model artifacts.
    pub model_dir: PathBuf,
    pub synthetic_path: PathBuf,
    pub summary_path: PathBuf,
    pub predictions_path: PathBuf,
    /// Number of features listed in the narrative summary.
    pub top_attributions: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from("out/datasets"),
            model_dir: PathBuf::from("out/models"),
            synthetic_path: PathBuf::from("out/synthetic.json"),
            summary_path: PathBuf::from("out/summary.json"),
            predictions_path: PathBuf::from("out/predictions.json"),
            top_attributions: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dataset: DatasetConfig,
    pub features: FeatureConfig,
    pub analysis: AnalysisConfig,
    pub training: TrainerConfig,
    pub synthesis: SynthesisConfig,
    pub validation: ValidationConfig,
    pub output: OutputConfig,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config: Self = util::read_json_file("configuration", path)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        for source in &mut self.dataset.sources {
            resolve(&mut source.path);
        }
        let output = &mut self.output;
        for path in [
            &mut output.dataset_dir,
            &mut output.model_dir,
            &mut output.synthetic_path,
            &mut output.summary_path,
            &mut output.predictions_path,
        ] {
            resolve(path);
        }
    }

    /// Punctuality below which a day counts as low performance in KPI summaries.
    pub fn low_performance_threshold(&self) -> f64 {
        match &self.features.label {
            LabelScheme::Binary { threshold } => *threshold,
            LabelScheme::Bands { cutoffs } => cutoffs.iter().copied().fold(f64::NAN, f64::max),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_missing_sections_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        fs::write(
            &path,
            r#"{
                "training": { "folds": 3 },
                "output": { "model_dir": "models" }
            }"#,
        )
        .unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.training.folds, 3);
        assert_eq!(config.training.test_fraction, TrainerConfig::default().test_fraction);
        assert_eq!(config.synthesis, SynthesisConfig::default());
        assert_eq!(config.output.model_dir, dir.path().join("models"));
        assert_eq!(config.output.dataset_dir, dir.path().join("out/datasets"));
        assert_eq!(config.low_performance_threshold(), 75.0);
    }

    #[test]
    fn test_band_threshold_is_highest_cutoff() {
        let config = PipelineConfig {
            features: FeatureConfig {
                label: LabelScheme::Bands {
                    cutoffs: vec![60.0, 80.0, 70.0],
                },
                ..FeatureConfig::default()
            },
            ..PipelineConfig::default()
        };
        assert_eq!(config.low_performance_threshold(), 80.0);
    }

    #[test]
    fn test_unknown_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PipelineConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("configuration"));
    }
}
