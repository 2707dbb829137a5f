//! Scores customers against a model bundle

use std::sync::Arc;

use crate::models::Customer;

use super::features::CustomerFeatures;
use super::model::{CategoryEncoder, Classifier, ModelBundle, Transformer};
use super::ScoringError;

/// Applies encoders, scaler and classifier from one bundle.
///
/// A scorer pins the bundle it was created with, so a model reload in the
/// middle of a monitoring run does not mix two models within the run.
#[derive(Clone)]
pub struct Scorer {
    bundle: Arc<ModelBundle>,
}

impl Scorer {
    pub fn new(bundle: Arc<ModelBundle>) -> Self {
        Self { bundle }
    }

    pub fn bundle(&self) -> &ModelBundle {
        &self.bundle
    }

    /// Churn probability for a stored customer
    pub fn score_customer(&self, customer: &Customer) -> Result<f64, ScoringError> {
        self.score(&CustomerFeatures::from(customer))
    }

    /// Churn probability for prepared features
    pub fn score(&self, features: &CustomerFeatures) -> Result<f64, ScoringError> {
        let vector = self.feature_vector(features)?;
        let probability = self.bundle.classifier.predict_probability(&vector)?;

        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            return Err(ScoringError::InvalidProbability(probability));
        }
        Ok(probability)
    }

    /// Scaled numeric columns followed by encoded categorical columns
    fn feature_vector(&self, features: &CustomerFeatures) -> Result<Vec<f64>, ScoringError> {
        let bundle = &self.bundle;

        let numeric = bundle
            .numerical_features
            .iter()
            .map(|name| features.numeric(name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut vector = bundle.scaler.transform(&numeric)?;
        vector.reserve(bundle.categorical_features.len());

        for name in &bundle.categorical_features {
            let encoder = bundle
                .encoders
                .get(name)
                .ok_or_else(|| ScoringError::InvalidBundle(format!("missing encoder for '{name}'")))?;
            vector.push(encoder.encode(name, features.categorical(name)?)?);
        }

        Ok(vector)
    }
}
