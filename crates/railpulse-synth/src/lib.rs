//! Privacy-preserving synthetic records and their quality checks.
//!
//! # Pipeline
//!
//! ```text
//! MasterDataset
//!     ↓
//! SyntheticGenerator ── Generative (TabularGan on fully-populated fields)
//!     │                    ↓ fit failure
//!     └──────────────── ResampleNoise (bootstrap or permutation donors + Gaussian noise)
//!     ↓
//! SyntheticBatch (records flagged synthetic + StrategyRecord)
//!     ↓
//! QualityValidator → ValidationReport (KS per field, correlation drift)
//! ```
//!
//! Synthetic records never enter a [`MasterDataset`](railpulse_dataset::master::MasterDataset);
//! they live only in a [`generator::SyntheticBatch`].
//!
//! # Example
//!
//! ```no_run
//! use railpulse_synth::{
//!     generator::{SynthesisConfig, SyntheticGenerator},
//!     validator::{QualityValidator, ValidationConfig},
//! };
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let dataset: railpulse_dataset::master::MasterDataset = todo!();
//!
//! let batch = SyntheticGenerator::new(SynthesisConfig::default())?.generate(&dataset)?;
//! let report = QualityValidator::new(ValidationConfig::default()).validate(&dataset, &batch);
//! println!("{} records, passed: {}", batch.len(), report.passed);
//! # Ok(())
//! # }
//! ```

pub mod gan;
pub mod generator;
pub mod mlp;
pub mod validator;

#[cfg(test)]
mod testing;
