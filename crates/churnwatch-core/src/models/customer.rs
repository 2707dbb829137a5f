//! Customer data model

use serde::{Deserialize, Serialize};

/// A bank customer as stored in the `customers` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Customer {
    /// Unique customer identifier
    pub customer_id: i64,

    /// Row number from the source dataset
    pub row_number: Option<i32>,

    /// Surname, used as the display name in alerts
    pub surname: Option<String>,

    // Demographics and finances
    /// Credit score
    pub credit_score: Option<i32>,

    /// Country of residence
    pub geography: Option<String>,

    /// Gender
    pub gender: Option<String>,

    /// Age in years
    pub age: Option<i32>,

    /// Years as a customer
    pub tenure: Option<i32>,

    /// Account balance
    pub balance: Option<f64>,

    /// Number of bank products held
    pub num_of_products: Option<i32>,

    /// Holds a credit card
    pub has_cr_card: bool,

    /// Counts as an active member
    pub is_active_member: bool,

    /// Estimated yearly salary
    pub estimated_salary: Option<f64>,

    /// Historical churn label
    pub exited: bool,
}

impl Customer {
    /// Name shown in notifications
    pub fn display_name(&self) -> &str {
        self.surname.as_deref().unwrap_or("Unknown")
    }

    /// Apply a partial update
    pub fn apply(&mut self, patch: CustomerPatch) {
        if let Some(v) = patch.row_number {
            self.row_number = Some(v);
        }
        if let Some(v) = patch.surname {
            self.surname = Some(v);
        }
        if let Some(v) = patch.credit_score {
            self.credit_score = Some(v);
        }
        if let Some(v) = patch.geography {
            self.geography = Some(v);
        }
        if let Some(v) = patch.gender {
            self.gender = Some(v);
        }
        if let Some(v) = patch.age {
            self.age = Some(v);
        }
        if let Some(v) = patch.tenure {
            self.tenure = Some(v);
        }
        if let Some(v) = patch.balance {
            self.balance = Some(v);
        }
        if let Some(v) = patch.num_of_products {
            self.num_of_products = Some(v);
        }
        if let Some(v) = patch.has_cr_card {
            self.has_cr_card = v;
        }
        if let Some(v) = patch.is_active_member {
            self.is_active_member = v;
        }
        if let Some(v) = patch.estimated_salary {
            self.estimated_salary = Some(v);
        }
        if let Some(v) = patch.exited {
            self.exited = v;
        }
    }
}

/// Input for creating or replacing a customer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerInput {
    pub customer_id: i64,
    pub row_number: Option<i32>,
    pub surname: Option<String>,
    pub credit_score: Option<i32>,
    pub geography: Option<String>,
    pub gender: Option<String>,
    pub age: Option<i32>,
    pub tenure: Option<i32>,
    pub balance: Option<f64>,
    pub num_of_products: Option<i32>,
    #[serde(default)]
    pub has_cr_card: bool,
    #[serde(default)]
    pub is_active_member: bool,
    pub estimated_salary: Option<f64>,
    #[serde(default)]
    pub exited: bool,
}

impl CustomerInput {
    /// Reject values the scoring loop could never use
    pub fn validate(&self) -> crate::Result<()> {
        if self.customer_id <= 0 {
            return Err(crate::Error::validation("customer_id must be positive"));
        }
        check_non_negative("age", self.age)?;
        check_non_negative("tenure", self.tenure)?;
        check_non_negative("num_of_products", self.num_of_products)?;
        check_finite("balance", self.balance)?;
        check_finite("estimated_salary", self.estimated_salary)?;
        Ok(())
    }
}

impl From<CustomerInput> for Customer {
    fn from(input: CustomerInput) -> Self {
        Customer {
            customer_id: input.customer_id,
            row_number: input.row_number,
            surname: input.surname,
            credit_score: input.credit_score,
            geography: input.geography,
            gender: input.gender,
            age: input.age,
            tenure: input.tenure,
            balance: input.balance,
            num_of_products: input.num_of_products,
            has_cr_card: input.has_cr_card,
            is_active_member: input.is_active_member,
            estimated_salary: input.estimated_salary,
            exited: input.exited,
        }
    }
}

/// Partial update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerPatch {
    /// Target customer (required for bulk updates, ignored otherwise)
    pub customer_id: Option<i64>,
    pub row_number: Option<i32>,
    pub surname: Option<String>,
    pub credit_score: Option<i32>,
    pub geography: Option<String>,
    pub gender: Option<String>,
    pub age: Option<i32>,
    pub tenure: Option<i32>,
    pub balance: Option<f64>,
    pub num_of_products: Option<i32>,
    pub has_cr_card: Option<bool>,
    pub is_active_member: Option<bool>,
    pub estimated_salary: Option<f64>,
    pub exited: Option<bool>,
}

impl CustomerPatch {
    pub fn validate(&self) -> crate::Result<()> {
        check_non_negative("age", self.age)?;
        check_non_negative("tenure", self.tenure)?;
        check_non_negative("num_of_products", self.num_of_products)?;
        check_finite("balance", self.balance)?;
        check_finite("estimated_salary", self.estimated_salary)?;
        Ok(())
    }
}

fn check_non_negative(field: &str, value: Option<i32>) -> crate::Result<()> {
    match value {
        Some(v) if v < 0 => Err(crate::Error::validation(format!(
            "{field} must not be negative"
        ))),
        _ => Ok(()),
    }
}

fn check_finite(field: &str, value: Option<f64>) -> crate::Result<()> {
    match value {
        Some(v) if !v.is_finite() => Err(crate::Error::validation(format!(
            "{field} must be a finite number"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Customer {
        Customer::from(CustomerInput {
            customer_id: 15634602,
            surname: Some("Hargrave".to_string()),
            geography: Some("France".to_string()),
            age: Some(42),
            ..Default::default()
        })
    }

    #[test]
    fn test_patch_only_touches_given_fields() {
        let mut customer = sample();
        customer.apply(CustomerPatch {
            age: Some(43),
            is_active_member: Some(true),
            ..Default::default()
        });

        assert_eq!(customer.age, Some(43));
        assert!(customer.is_active_member);
        assert_eq!(customer.surname.as_deref(), Some("Hargrave"));
        assert_eq!(customer.geography.as_deref(), Some("France"));
    }

    #[test]
    fn test_display_name_falls_back() {
        let mut customer = sample();
        assert_eq!(customer.display_name(), "Hargrave");
        customer.surname = None;
        assert_eq!(customer.display_name(), "Unknown");
    }

    #[test]
    fn test_validation_rejects_bad_input() {
        let input = CustomerInput {
            customer_id: 1,
            age: Some(-3),
            ..Default::default()
        };
        assert!(input.validate().is_err());

        let input = CustomerInput {
            customer_id: 0,
            ..Default::default()
        };
        assert!(input.validate().is_err());

        let input = CustomerInput {
            customer_id: 7,
            balance: Some(f64::NAN),
            ..Default::default()
        };
        assert!(input.validate().is_err());
    }
}
