use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use super::observation::Observation;
use super::rule::{AlertRule, AlertType};
use super::severity::AlertSeverity;

/// Output of the rule evaluator: one rule that fired against one
/// observation, with its determined severity and the rule's localized
/// content carried along for dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct TriggeredAlert {
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub title_hi: Option<String>,
    pub description: String,
    pub description_hi: Option<String>,
    pub recommendations: Vec<String>,
    pub recommendations_hi: Vec<String>,
    pub sms_enabled: bool,
    pub priority: i32,
    pub observation: Observation,
}

impl TriggeredAlert {
    pub fn from_rule(rule: &AlertRule, severity: AlertSeverity, observation: &Observation) -> Self {
        TriggeredAlert {
            alert_type: rule.alert_type,
            severity,
            title: rule.name.clone(),
            title_hi: rule.name_hi.clone(),
            description: rule.description.clone(),
            description_hi: rule.description_hi.clone(),
            recommendations: rule.recommendations.0.clone(),
            recommendations_hi: rule.recommendations_hi.0.clone(),
            sms_enabled: rule.sms_enabled,
            priority: rule.priority,
            observation: observation.clone(),
        }
    }

    /// Title in the requested language, falling back to English when the
    /// Hindi variant is missing.
    pub fn localized_title(&self, language: &str) -> &str {
        match (language, &self.title_hi) {
            ("hi", Some(hi)) => hi,
            _ => &self.title,
        }
    }

    pub fn localized_message(&self, language: &str) -> &str {
        match (language, &self.description_hi) {
            ("hi", Some(hi)) => hi,
            _ => &self.description,
        }
    }

    pub fn localized_recommendations(&self, language: &str) -> &[String] {
        if language == "hi" && !self.recommendations_hi.is_empty() {
            &self.recommendations_hi
        } else {
            &self.recommendations
        }
    }
}

/// Durable audit row for one triggered-and-dispatched alert. Created
/// exactly once per dispatch attempt; channel outcomes are sub-fields, and
/// only the read/dismiss flags mutate afterwards.
#[derive(Debug, Clone, FromRow)]
pub struct AlertRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub weather_data: Option<Json<Observation>>,
    pub latitude: f64,
    pub longitude: f64,
    pub location_name: Option<String>,
    pub push_sent: bool,
    pub push_sent_at: Option<DateTime<Utc>>,
    pub sms_sent: bool,
    pub sms_sent_at: Option<DateTime<Utc>>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub is_dismissed: bool,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Filters for paging a user's alert history.
#[derive(Debug, Clone)]
pub struct HistoryFilter {
    pub alert_type: Option<AlertType>,
    pub severity: Option<AlertSeverity>,
    pub is_read: Option<bool>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for HistoryFilter {
    fn default() -> Self {
        HistoryFilter {
            alert_type: None,
            severity: None,
            is_read: None,
            limit: 20,
            offset: 0,
        }
    }
}
