//! Feature schemas, labels and the vectors built against them.

use std::collections::BTreeMap;

use railpulse_dataset::schema::RecordKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

/// Version of the feature layout. Part of every schema hash.
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// How a record's punctuality becomes a class label. Higher classes are riskier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LabelScheme {
    /// Class 1 (low performance) when punctuality is below `threshold`.
    Binary { threshold: f64 },
    /// Class = number of ascending `cutoffs` the punctuality is below.
    Bands { cutoffs: Vec<f64> },
}

impl Default for LabelScheme {
    fn default() -> Self {
        Self::Binary { threshold: 75.0 }
    }
}

impl LabelScheme {
    #[must_use]
    pub fn class_count(&self) -> usize {
        match self {
            Self::Binary { .. } => 2,
            Self::Bands { cutoffs } => cutoffs.len() + 1,
        }
    }

    #[must_use]
    pub fn class_of(&self, punctuality: f64) -> usize {
        match self {
            Self::Binary { threshold } => usize::from(punctuality < *threshold),
            Self::Bands { cutoffs } => cutoffs.iter().filter(|c| punctuality < **c).count(),
        }
    }

    /// Human-readable class names, indexed by class.
    #[must_use]
    pub fn class_labels(&self) -> Vec<String> {
        match self {
            Self::Binary { .. } => vec!["acceptable".to_owned(), "low_performance".to_owned()],
            Self::Bands { cutoffs } => {
                let mut bounds = cutoffs.clone();
                bounds.sort_by(f64::total_cmp);
                let mut labels = vec![];
                for class in 0..=bounds.len() {
                    // class k: below the k highest cutoffs
                    let upper = (class > 0).then(|| bounds[bounds.len() - class]);
                    let lower = bounds.len().checked_sub(class + 1).map(|i| bounds[i]);
                    labels.push(match (lower, upper) {
                        (Some(lo), Some(hi)) => format!("[{lo}, {hi})"),
                        (Some(lo), None) => format!(">= {lo}"),
                        (None, Some(hi)) => format!("< {hi}"),
                        (None, None) => "all".to_owned(),
                    });
                }
                labels
            }
        }
    }
}

/// Ordered feature ids plus the label scheme. Models are bound to a schema via [`hash`].
///
/// [`hash`]: FeatureSchema::hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub names: Vec<String>,
    pub label: LabelScheme,
}

impl FeatureSchema {
    #[must_use]
    pub fn new(names: Vec<String>, label: LabelScheme) -> Self {
        Self {
            version: FEATURE_SCHEMA_VERSION,
            names,
            label,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// SHA-256 (lowercase hex) over the version, the length-prefixed names and the label scheme.
    ///
    /// # Examples
    ///
    /// ```
    /// use railpulse_features::schema::{FeatureSchema, LabelScheme};
    ///
    /// let a = FeatureSchema::new(vec!["month".to_owned()], LabelScheme::default());
    /// let b = FeatureSchema::new(vec!["day_of_week".to_owned()], LabelScheme::default());
    /// assert_eq!(a.hash().len(), 64);
    /// assert_ne!(a.hash(), b.hash());
    /// ```
    #[must_use]
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.version.to_le_bytes());
        for name in &self.names {
            hasher.update((name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
        }
        match &self.label {
            LabelScheme::Binary { threshold } => {
                hasher.update(b"binary");
                hasher.update(threshold.to_le_bytes());
            }
            LabelScheme::Bands { cutoffs } => {
                hasher.update(b"bands");
                for c in cutoffs {
                    hasher.update(c.to_le_bytes());
                }
            }
        }
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub key: RecordKey,
    /// Aligned with [`FeatureSchema::names`].
    pub values: Vec<f64>,
    pub label: usize,
}

impl FeatureVector {
    #[must_use]
    pub fn named(&self, schema: &FeatureSchema) -> BTreeMap<String, f64> {
        schema
            .names
            .iter()
            .cloned()
            .zip(self.values.iter().copied())
            .collect()
    }
}

/// Feature vectors sorted by (date, region).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub schema: FeatureSchema,
    pub vectors: Vec<FeatureVector>,
}

impl FeatureSet {
    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    #[must_use]
    pub fn labels(&self) -> Vec<usize> {
        self.vectors.iter().map(|v| v.label).collect()
    }

    /// Number of vectors per class, indexed by class.
    #[must_use]
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.schema.label.class_count()];
        for v in &self.vectors {
            counts[v.label] += 1;
        }
        counts
    }
}
