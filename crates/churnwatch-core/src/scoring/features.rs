//! Feature extraction from customer records

use serde::{Deserialize, Serialize};

use crate::models::Customer;

use super::ScoringError;

/// Numeric columns, in the order the model bundle is normally fitted on
pub const NUMERICAL_FEATURES: [&str; 8] = [
    "credit_score",
    "age",
    "tenure",
    "balance",
    "num_of_products",
    "has_cr_card",
    "is_active_member",
    "estimated_salary",
];

/// Categorical columns
pub const CATEGORICAL_FEATURES: [&str; 2] = ["geography", "gender"];

/// Placeholder for a missing categorical value
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Model inputs for one customer, with missing values already filled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerFeatures {
    pub credit_score: f64,
    pub age: f64,
    pub tenure: f64,
    pub balance: f64,
    pub num_of_products: f64,
    pub has_cr_card: f64,
    pub is_active_member: f64,
    pub estimated_salary: f64,
    pub geography: String,
    pub gender: String,
}

impl CustomerFeatures {
    /// Numeric value of a named column
    pub fn numeric(&self, name: &str) -> Result<f64, ScoringError> {
        let value = match name {
            "credit_score" => self.credit_score,
            "age" => self.age,
            "tenure" => self.tenure,
            "balance" => self.balance,
            "num_of_products" => self.num_of_products,
            "has_cr_card" => self.has_cr_card,
            "is_active_member" => self.is_active_member,
            "estimated_salary" => self.estimated_salary,
            other => return Err(ScoringError::UnknownFeature(other.to_string())),
        };
        Ok(value)
    }

    /// Categorical value of a named column
    pub fn categorical(&self, name: &str) -> Result<&str, ScoringError> {
        match name {
            "geography" => Ok(&self.geography),
            "gender" => Ok(&self.gender),
            other => Err(ScoringError::UnknownFeature(other.to_string())),
        }
    }
}

impl From<&Customer> for CustomerFeatures {
    fn from(c: &Customer) -> Self {
        Self {
            credit_score: c.credit_score.map_or(0.0, f64::from),
            age: c.age.map_or(0.0, f64::from),
            tenure: c.tenure.map_or(0.0, f64::from),
            balance: c.balance.unwrap_or(0.0),
            num_of_products: c.num_of_products.map_or(1.0, f64::from),
            has_cr_card: bool_feature(c.has_cr_card),
            is_active_member: bool_feature(c.is_active_member),
            estimated_salary: c.estimated_salary.unwrap_or(0.0),
            geography: category_or_unknown(c.geography.as_deref()),
            gender: category_or_unknown(c.gender.as_deref()),
        }
    }
}

fn bool_feature(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

fn category_or_unknown(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => UNKNOWN_CATEGORY.to_string(),
    }
}
