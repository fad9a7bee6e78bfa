//! Statistical analysis of the master dataset.
//!
//! # Overview
//!
//! - [`engine::StatisticalEngine`]: runs one-way ANOVA and Kruskal-Wallis across regional
//!   groups and an additive seasonal-trend decomposition of a daily series. Tests that
//!   lack data are recorded as skipped instead of failing.
//! - [`series`]: regional groups and gap-free daily series extracted from the dataset.
//! - [`summary::NarrativeSummary`]: KPIs per region, test outcomes and top feature
//!   attributions, the sole input of the external narrative writer.
//!
//! # Example
//!
//! ```no_run
//! use railpulse_analysis::{
//!     engine::{AnalysisConfig, StatisticalEngine},
//!     summary::NarrativeSummary,
//! };
//! use railpulse_dataset::store::DatasetStore;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//!
//! let (_, dataset) = DatasetStore::new("data/master").load_latest()?;
//! let report = StatisticalEngine::new(AnalysisConfig::default()).run(&dataset);
//! let summary = NarrativeSummary::new(&dataset, report, vec![], 10, 75.0);
//! println!("{} regions summarized", summary.kpis.len());
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod series;
pub mod summary;
