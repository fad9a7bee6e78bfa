//! Statistical utilities for the railpulse pipeline.
//!
//! This crate provides the numeric building blocks shared by the analysis, training,
//! and synthesis crates:
//!
//! - **Descriptive statistics**: mean, median, variance, standard deviation
//! - **Percentiles**: nearest-rank percentile lookup
//! - **Ranks**: average ranks with tie information for rank-based tests
//! - **Hypothesis tests**: one-way ANOVA, Kruskal-Wallis, two-sample Kolmogorov-Smirnov
//! - **Correlation**: pairwise-complete Pearson matrices and their Frobenius distance
//! - **Decomposition**: classical additive seasonal-trend decomposition
//!
//! # Modules
//!
//! - [`descriptive`]: Descriptive statistics for summarizing datasets
//! - [`percentiles`]: Percentile computation and storage
//! - [`rank`]: Average ranking with tie terms
//! - [`hypothesis`]: Between-group and two-sample tests
//! - [`correlation`]: Correlation matrices
//! - [`decomposition`]: Seasonal-trend decomposition
//!
//! # Examples
//!
//! ## Computing descriptive statistics
//!
//! ```
//! use railpulse_stats::descriptive::DescriptiveStats;
//!
//! let values = [1.0, 2.0, 3.0, 4.0, 5.0];
//! let stats = DescriptiveStats::new(values).unwrap();
//! assert_eq!(stats.mean, 3.0);
//! ```
//!
//! ## Comparing groups
//!
//! ```
//! use railpulse_stats::hypothesis::{kruskal_wallis, one_way_anova};
//!
//! let north = [88.0, 90.5, 91.0, 89.5];
//! let south = [79.0, 80.5, 78.0, 81.0];
//! let anova = one_way_anova(&[&north[..], &south[..]]).unwrap();
//! let kw = kruskal_wallis(&[&north[..], &south[..]]).unwrap();
//! assert!(anova.p_value < 0.05);
//! assert!(kw.p_value < 0.05);
//! ```
//!
//! Statistical distributions (F, χ²) come from `statrs`; matrices from `nalgebra`.

pub mod correlation;
pub mod decomposition;
pub mod descriptive;
pub mod hypothesis;
pub mod percentiles;
pub mod rank;
