//! Training, storage and serving of delay-risk classifiers.
//!
//! # How Training Works
//!
//! 1. **Features** - a [`FeatureSet`](railpulse_features::schema::FeatureSet) provides
//!    labelled vectors under one feature schema
//! 2. **Split** - a stratified test portion is held out of model selection
//! 3. **Cross-validate** - every grid candidate of each family is scored with stratified
//!    k-fold cross-validation
//! 4. **Refit** - the best candidate per family is refitted and scored on the test rows
//! 5. **Judge** - mean CV accuracy above the threshold marks the artifact as accepted
//! 6. **Publish** - artifacts are written to a versioned [`store::ModelStore`]
//!
//! # Architecture
//!
//! ```text
//! FeatureSet
//!     ↓ split, folds
//! Trainer ── RandomForest (bagged Gini trees)
//!         └─ GradientBoosting (softmax, Newton leaves, early stopping)
//!     ↓ produces
//! TrainedModel (immutable, bound to the schema hash)
//!     ↓ persisted by
//! ModelStore
//!     ↓ shared through Arc
//! Predictor → PredictionResult (risk score, attributions, confidence interval)
//! ```
//!
//! # Model Families
//!
//! Both families fit with balanced class weights:
//!
//! - **Random forest** ([`forest`]) - bootstrap samples, `sqrt(p)` features per split
//! - **Gradient boosting** ([`boosting`]) - one regression tree per class per round,
//!   stopped when the validation log-loss plateaus for `patience` rounds
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use railpulse_training::{
//!     predictor::Predictor,
//!     store::ModelStore,
//!     trainer::{Trainer, TrainerConfig},
//! };
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let feature_set: railpulse_features::schema::FeatureSet = todo!();
//!
//! let trainer = Trainer::new(TrainerConfig::default())?;
//! let store = ModelStore::new("models");
//! for model in trainer.train(&feature_set)? {
//!     store.publish(&model)?;
//!     let predictor = Predictor::new(Arc::new(model));
//!     let result = predictor.predict(&feature_set.vectors[0], &feature_set.schema)?;
//!     println!("risk {:.2}", result.risk_score);
//! }
//! # Ok(())
//! # }
//! ```

pub mod boosting;
pub mod forest;
pub mod metrics;
pub mod model;
pub mod predictor;
pub mod split;
pub mod store;
pub mod trainer;
pub mod tree;
pub mod weights;

#[cfg(test)]
mod testing;
