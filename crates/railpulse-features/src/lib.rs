//! Feature engineering for delay-risk classification.
//!
//! [`engineer::FeatureEngineer`] turns a [`MasterDataset`] into labelled
//! [`schema::FeatureVector`]s. Features come from [`source::FeatureSource`]
//! implementations of two kinds:
//!
//! - **History features** ([`source::Lag`], [`source::RollingMean`], [`source::RollingStd`])
//!   read only records of the same region with strictly earlier dates.
//! - **Calendar features** ([`source::DayOfWeek`], [`source::Month`], [`source::IsWeekend`],
//!   [`source::IsHoliday`], [`source::MonthSin`], [`source::MonthCos`]) read only the
//!   record's own date and region.
//!
//! The ordered feature ids and the label scheme form a [`schema::FeatureSchema`] whose
//! hash binds trained models to the features they were trained on.
//!
//! [`MasterDataset`]: railpulse_dataset::master::MasterDataset

pub mod engineer;
pub mod holiday;
pub mod schema;
pub mod source;
