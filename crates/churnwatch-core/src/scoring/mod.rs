//! Churn scoring
//!
//! Turns customer attributes into a churn probability using a model bundle
//! fitted offline: label encoders for categorical columns, a standard scaler
//! for numeric columns, and a logistic-regression classifier.

mod features;
mod model;
mod scorer;

pub use features::{CustomerFeatures, CATEGORICAL_FEATURES, NUMERICAL_FEATURES};
pub use model::{
    CategoryEncoder, Classifier, FeatureImportance, LabelEncoder, LogisticRegression,
    ModelBundle, ModelHandle, StandardScaler, Transformer,
};
pub use scorer::Scorer;

#[cfg(test)]
pub(crate) use model::tests::constant_bundle;

use thiserror::Error;

/// Errors raised while scoring a single customer
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    /// Category value was not seen when the encoder was fitted
    #[error("unseen value '{value}' for categorical feature '{feature}'")]
    Encoding { feature: String, value: String },

    /// Feature name in the bundle that customers do not carry
    #[error("unknown feature '{0}'")]
    UnknownFeature(String),

    /// Vector length does not match what the component was fitted on
    #[error("{component} expected {expected} values, got {actual}")]
    Shape {
        component: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Classifier produced something that is not a probability
    #[error("classifier produced invalid probability {0}")]
    InvalidProbability(f64),

    /// The bundle itself is inconsistent
    #[error("invalid model bundle: {0}")]
    InvalidBundle(String),
}
