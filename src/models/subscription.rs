use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use super::rule::AlertType;

/// A user's registered location of interest. Unique per
/// (user_id, latitude, longitude); deactivated rather than deleted so the
/// alert history keeps its linkage.
#[derive(Debug, Clone, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub location_name: Option<String>,
    /// Per-location override of the alert types to receive. None falls
    /// back to the user's preference list.
    pub alert_types: Option<Json<Vec<AlertType>>>,
    pub is_primary: bool,
    pub is_active: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn alert_type_override(&self) -> Option<&[AlertType]> {
        self.alert_types.as_ref().map(|j| j.0.as_slice())
    }
}

/// Input for subscription creation (upsert on the unique location tuple).
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub user_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub location_name: Option<String>,
    pub alert_types: Option<Vec<AlertType>>,
    pub is_primary: bool,
}

/// Partial patch for subscription updates; None leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionPatch {
    pub location_name: Option<String>,
    pub alert_types: Option<Vec<AlertType>>,
    pub is_primary: Option<bool>,
}
