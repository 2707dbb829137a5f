//! Discord embed payloads for risk alerts and run summaries

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AlertConfig, AlertKind, Customer, RiskSnapshot};

const RED: u32 = 15158332;
const ORANGE: u32 = 15105570;
const BLUE: u32 = 3447003;

const MISSING: &str = "N/A";

/// Top-level webhook body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscordMessage {
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: Vec<EmbedField>,
    /// RFC 3339, UTC
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    fn inline(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
            inline: true,
        }
    }
}

impl DiscordMessage {
    /// Alert about one customer's snapshot
    pub fn customer_alert(
        kind: AlertKind,
        customer: &Customer,
        snapshot: &RiskSnapshot,
        config: &AlertConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let (title, color) = match kind {
            AlertKind::RiskIncrease => ("📈 Churn Risk Increase Alert", ORANGE),
            _ => ("🚨 High Risk Customer Alert", RED),
        };

        let mut fields = vec![
            EmbedField::inline("Customer ID", customer.customer_id.to_string()),
            EmbedField::inline("Customer Name", customer.display_name()),
            EmbedField::inline("Churn Probability", percent(snapshot.probability)),
            EmbedField::inline(
                "Geography",
                customer.geography.as_deref().unwrap_or(MISSING),
            ),
        ];

        if let (Some(previous), Some(change)) = (snapshot.previous_probability, snapshot.risk_change) {
            fields.push(EmbedField::inline("Previous Probability", percent(previous)));
            fields.push(EmbedField::inline("Risk Change", format!("{change:+.2}%")));
        }

        fields.push(EmbedField {
            name: "Customer Details".to_string(),
            value: customer_details(customer),
            inline: false,
        });

        let description = if snapshot.is_significant_increase(config.risk_increase_threshold) {
            Some("📈 Significant increase in churn risk!".to_string())
        } else if snapshot.is_high_risk {
            Some("⚠️ Customer has exceeded the high-risk threshold!".to_string())
        } else {
            None
        };

        Self::single(title, color, description, fields, now)
    }

    /// End-of-run summary
    pub fn summary(
        total_checked: usize,
        high_risk_count: usize,
        significant_increases: usize,
        now: DateTime<Utc>,
    ) -> Self {
        let fields = vec![
            EmbedField::inline("Total Customers Checked", total_checked.to_string()),
            EmbedField::inline("High Risk Customers", high_risk_count.to_string()),
            EmbedField::inline("Significant Risk Increases", significant_increases.to_string()),
        ];

        Self::single("📊 Churn Risk Monitoring Summary", BLUE, None, fields, now)
    }

    fn single(
        title: &str,
        color: u32,
        description: Option<String>,
        fields: Vec<EmbedField>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            embeds: vec![Embed {
                title: title.to_string(),
                color,
                description,
                fields,
                timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            }],
        }
    }

    /// The JSON body exactly as it goes on the wire
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Length of the serialized body in characters
    pub fn serialized_len(&self) -> usize {
        serde_json::to_string(self)
            .map(|s| s.chars().count())
            .unwrap_or(usize::MAX)
    }
}

fn percent(probability: f64) -> String {
    format!("{:.2}%", probability * 100.0)
}

fn or_missing<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| MISSING.to_string(), |v| v.to_string())
}

fn customer_details(customer: &Customer) -> String {
    let balance = customer
        .balance
        .map_or_else(|| MISSING.to_string(), |b| format!("${b:.2}"));

    [
        format!("Age: {}", or_missing(customer.age)),
        format!("Tenure: {} months", or_missing(customer.tenure)),
        format!("Balance: {balance}"),
        format!("Products: {}", or_missing(customer.num_of_products)),
        format!(
            "Active Member: {}",
            if customer.is_active_member { "Yes" } else { "No" }
        ),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CustomerInput;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn customer() -> Customer {
        Customer::from(CustomerInput {
            customer_id: 15634602,
            surname: Some("Hargrave".to_string()),
            geography: Some("France".to_string()),
            age: Some(42),
            tenure: Some(2),
            balance: Some(1234.5),
            num_of_products: Some(1),
            is_active_member: true,
            ..Default::default()
        })
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_high_risk_first_snapshot() {
        let snapshot = RiskSnapshot::next(15634602, None, 0.85, 0.7, fixed_now());
        let message = DiscordMessage::customer_alert(
            AlertKind::HighRisk,
            &customer(),
            &snapshot,
            &AlertConfig::default(),
            fixed_now(),
        );

        let value = message.to_json();
        let embed = &value["embeds"][0];
        assert_eq!(embed["title"], json!("🚨 High Risk Customer Alert"));
        assert_eq!(embed["color"], json!(15158332));
        assert_eq!(embed["timestamp"], json!("2024-05-01T12:00:00.000Z"));
        assert_eq!(
            embed["description"],
            json!("⚠️ Customer has exceeded the high-risk threshold!")
        );

        let names: Vec<&str> = message.embeds[0].fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Customer ID", "Customer Name", "Churn Probability", "Geography", "Customer Details"]
        );
        assert_eq!(message.embeds[0].fields[2].value, "85.00%");
        assert_eq!(
            message.embeds[0].fields[4].value,
            "Age: 42\nTenure: 2 months\nBalance: $1234.50\nProducts: 1\nActive Member: Yes"
        );
        assert!(!message.embeds[0].fields[4].inline);
    }

    #[test]
    fn test_risk_increase_has_change_fields() {
        let first = RiskSnapshot::next(15634602, None, 0.30, 0.7, fixed_now());
        let second = RiskSnapshot::next(15634602, Some(&first), 0.50, 0.7, fixed_now());
        let message = DiscordMessage::customer_alert(
            AlertKind::RiskIncrease,
            &customer(),
            &second,
            &AlertConfig::default(),
            fixed_now(),
        );

        let embed = &message.embeds[0];
        assert_eq!(embed.title, "📈 Churn Risk Increase Alert");
        assert_eq!(embed.color, 15105570);
        assert_eq!(embed.fields[4].value, "30.00%");
        assert_eq!(embed.fields[5].value, "+66.67%");
        assert_eq!(
            embed.description.as_deref(),
            Some("📈 Significant increase in churn risk!")
        );
    }

    #[test]
    fn test_missing_values_render_as_na() {
        let bare = Customer::from(CustomerInput {
            customer_id: 9,
            ..Default::default()
        });
        let snapshot = RiskSnapshot::next(9, None, 0.9, 0.7, fixed_now());
        let message = DiscordMessage::customer_alert(
            AlertKind::HighRisk,
            &bare,
            &snapshot,
            &AlertConfig::default(),
            fixed_now(),
        );

        let fields = &message.embeds[0].fields;
        assert_eq!(fields[1].value, "Unknown");
        assert_eq!(fields[3].value, "N/A");
        assert!(fields[4].value.starts_with("Age: N/A\nTenure: N/A months\nBalance: N/A"));
    }

    #[test]
    fn test_summary_omits_description() {
        let message = DiscordMessage::summary(120, 7, 3, fixed_now());
        let value = message.to_json();

        assert_eq!(value["embeds"][0]["color"], json!(3447003));
        assert!(value["embeds"][0].get("description").is_none());
        assert_eq!(value["embeds"][0]["fields"][0]["value"], json!("120"));
        assert!(message.serialized_len() < 2000);
    }
}
