//! Ingestion and storage of railway performance data.
//!
//! Source tables arrive with their own column names, units, date formats and region
//! spellings. This crate turns them into one validated, versioned master dataset:
//!
//! 1. [`source`]: load CSV tables and describe how to read them ([`SourceMapping`])
//! 2. [`normalize`]: convert rows to canonical fields, units and regions
//! 3. [`master`]: merge rows from all tables by (date, region) with table precedence
//! 4. [`store`]: publish and load immutable, column-major dataset versions
//!
//! The field catalog lives in [`schema`] and the canonical regions in [`region`].
//!
//! [`SourceMapping`]: source::SourceMapping

pub mod master;
pub mod normalize;
pub mod region;
pub mod schema;
pub mod source;
pub mod store;
