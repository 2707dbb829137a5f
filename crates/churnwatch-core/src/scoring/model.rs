//! Fitted model components and the bundle that carries them

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::features::{CATEGORICAL_FEATURES, NUMERICAL_FEATURES};
use super::ScoringError;

/// Produces the probability of the positive (churned) class
pub trait Classifier: Send + Sync {
    fn predict_probability(&self, features: &[f64]) -> Result<f64, ScoringError>;
}

/// Maps a numeric vector to a transformed vector of the same length
pub trait Transformer: Send + Sync {
    fn transform(&self, values: &[f64]) -> Result<Vec<f64>, ScoringError>;
}

/// Maps a category to its fitted numeric code
pub trait CategoryEncoder: Send + Sync {
    /// Fails with [`ScoringError::Encoding`] for values not seen during fit
    fn encode(&self, feature: &str, value: &str) -> Result<f64, ScoringError>;
}

/// Logistic regression: `sigmoid(w . x + b)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl Classifier for LogisticRegression {
    fn predict_probability(&self, features: &[f64]) -> Result<f64, ScoringError> {
        if features.len() != self.coefficients.len() {
            return Err(ScoringError::Shape {
                component: "classifier",
                expected: self.coefficients.len(),
                actual: features.len(),
            });
        }

        let z = self
            .coefficients
            .iter()
            .zip(features)
            .fold(self.intercept, |acc, (w, x)| acc + w * x);

        Ok(sigmoid(z))
    }
}

fn sigmoid(z: f64) -> f64 {
    // Split on sign so exp() never overflows
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Standardization: `(x - mean) / scale`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Transformer for StandardScaler {
    fn transform(&self, values: &[f64]) -> Result<Vec<f64>, ScoringError> {
        if values.len() != self.mean.len() {
            return Err(ScoringError::Shape {
                component: "scaler",
                expected: self.mean.len(),
                actual: values.len(),
            });
        }

        Ok(values
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (mean, scale))| {
                // Constant columns were fitted with scale 0
                let scale = if *scale == 0.0 { 1.0 } else { *scale };
                (x - mean) / scale
            })
            .collect())
    }
}

/// Label encoder: a class maps to its index in `classes`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    pub classes: Vec<String>,
}

impl CategoryEncoder for LabelEncoder {
    fn encode(&self, feature: &str, value: &str) -> Result<f64, ScoringError> {
        self.classes
            .iter()
            .position(|class| class == value)
            .map(|idx| idx as f64)
            .ok_or_else(|| ScoringError::Encoding {
                feature: feature.to_string(),
                value: value.to_string(),
            })
    }
}

/// Feature importance reported alongside predictions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Everything needed to score a customer, as produced by the training job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    /// Free-form version tag of the training run
    #[serde(default)]
    pub version: Option<String>,

    /// Numeric columns, in fit order
    pub numerical_features: Vec<String>,

    /// Categorical columns, in fit order
    pub categorical_features: Vec<String>,

    /// Scaler fitted on the numeric columns
    pub scaler: StandardScaler,

    /// One encoder per categorical column
    pub encoders: BTreeMap<String, LabelEncoder>,

    /// Classifier fitted on `numerical_features ++ categorical_features`
    pub classifier: LogisticRegression,

    #[serde(default)]
    pub feature_importance: Vec<FeatureImportance>,
}

impl ModelBundle {
    /// Read and validate a bundle from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let bundle: ModelBundle = serde_json::from_str(&raw)?;
        bundle.validate()?;
        Ok(bundle)
    }

    /// Total number of classifier inputs
    pub fn feature_count(&self) -> usize {
        self.numerical_features.len() + self.categorical_features.len()
    }

    /// Check that every component agrees on the feature layout
    pub fn validate(&self) -> Result<(), ScoringError> {
        let invalid = |msg: String| Err(ScoringError::InvalidBundle(msg));

        for name in &self.numerical_features {
            if !NUMERICAL_FEATURES.contains(&name.as_str()) {
                return invalid(format!("unknown numerical feature '{name}'"));
            }
        }
        for name in &self.categorical_features {
            if !CATEGORICAL_FEATURES.contains(&name.as_str()) {
                return invalid(format!("unknown categorical feature '{name}'"));
            }
            match self.encoders.get(name) {
                Some(encoder) if !encoder.classes.is_empty() => {}
                Some(_) => return invalid(format!("encoder for '{name}' has no classes")),
                None => return invalid(format!("missing encoder for '{name}'")),
            }
        }

        let numeric = self.numerical_features.len();
        if self.scaler.mean.len() != numeric || self.scaler.scale.len() != numeric {
            return invalid(format!(
                "scaler has {} means and {} scales for {numeric} numerical features",
                self.scaler.mean.len(),
                self.scaler.scale.len()
            ));
        }
        if self.classifier.coefficients.len() != self.feature_count() {
            return invalid(format!(
                "classifier has {} coefficients for {} features",
                self.classifier.coefficients.len(),
                self.feature_count()
            ));
        }

        let all_finite = self
            .scaler
            .mean
            .iter()
            .chain(&self.scaler.scale)
            .chain(&self.classifier.coefficients)
            .chain(std::iter::once(&self.classifier.intercept))
            .all(|v| v.is_finite());
        if !all_finite {
            return invalid("bundle contains non-finite parameters".to_string());
        }

        Ok(())
    }
}

/// Shared, hot-swappable reference to the loaded bundle
#[derive(Clone, Default)]
pub struct ModelHandle {
    inner: Arc<RwLock<Option<Arc<ModelBundle>>>>,
}

impl ModelHandle {
    /// Handle with a bundle already loaded
    pub fn new(bundle: ModelBundle) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(Arc::new(bundle)))),
        }
    }

    /// Handle with no bundle; scoring fails until one is loaded
    pub fn empty() -> Self {
        Self::default()
    }

    /// The bundle currently in use
    pub fn current(&self) -> Option<Arc<ModelBundle>> {
        self.inner.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.read().is_some()
    }

    /// Swap in a new bundle; runs already in flight keep the old one
    pub fn replace(&self, bundle: ModelBundle) {
        *self.inner.write() = Some(Arc::new(bundle));
    }

    /// Load a bundle from disk and swap it in
    pub fn reload(&self, path: &Path) -> crate::Result<Arc<ModelBundle>> {
        let bundle = Arc::new(ModelBundle::load(path)?);
        *self.inner.write() = Some(bundle.clone());
        info!(
            path = %path.display(),
            version = bundle.version.as_deref().unwrap_or("unversioned"),
            "Churn model loaded"
        );
        Ok(bundle)
    }
}
