use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use super::observation::Observation;

/// The closed set of alert types the engine knows about. Stored as a
/// Postgres enum; unknown types are a load-time error, never a silent no-op.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "weather_alert_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    HeatWave,
    HeavyRain,
    Frost,
    Storm,
    Drought,
    Hail,
    Fog,
    ColdWave,
    FloodWarning,
}

impl AlertType {
    pub const ALL: [AlertType; 9] = [
        AlertType::HeatWave,
        AlertType::HeavyRain,
        AlertType::Frost,
        AlertType::Storm,
        AlertType::Drought,
        AlertType::Hail,
        AlertType::Fog,
        AlertType::ColdWave,
        AlertType::FloodWarning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::HeatWave => "heat_wave",
            AlertType::HeavyRain => "heavy_rain",
            AlertType::Frost => "frost",
            AlertType::Storm => "storm",
            AlertType::Drought => "drought",
            AlertType::Hail => "hail",
            AlertType::Fog => "fog",
            AlertType::ColdWave => "cold_wave",
            AlertType::FloodWarning => "flood_warning",
        }
    }
}

/// One-sided numeric bounds a rule (or a severity tier) may set. Every
/// field is an optional threshold; absent fields are ignored. The struct is
/// deliberately closed: an unknown key in the stored JSON fails
/// deserialization instead of being skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ConditionSet {
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub precipitation_min: Option<f64>,
    pub wind_speed_min: Option<f64>,
    pub humidity_min: Option<f64>,
    pub humidity_max: Option<f64>,
    pub visibility_max: Option<f64>,
    pub days_without_rain_min: Option<f64>,
}

impl ConditionSet {
    /// True when every present bound passes against the observation.
    /// `_min` bounds fail when the observed value is below the threshold,
    /// `_max` bounds fail when it is above. An empty set always matches.
    pub fn matches(&self, obs: &Observation) -> bool {
        if let Some(t) = self.temp_min {
            if obs.temp < t {
                return false;
            }
        }
        if let Some(t) = self.temp_max {
            if obs.temp > t {
                return false;
            }
        }
        if let Some(p) = self.precipitation_min {
            if obs.precipitation < p {
                return false;
            }
        }
        if let Some(w) = self.wind_speed_min {
            if obs.wind_speed < w {
                return false;
            }
        }
        if let Some(h) = self.humidity_min {
            if obs.humidity < h {
                return false;
            }
        }
        if let Some(h) = self.humidity_max {
            if obs.humidity > h {
                return false;
            }
        }
        if let Some(v) = self.visibility_max {
            if obs.visibility > v {
                return false;
            }
        }
        if let Some(d) = self.days_without_rain_min {
            if obs.days_without_rain.unwrap_or(0.0) < d {
                return false;
            }
        }
        true
    }
}

/// Per-tier condition sets for the severity ladder. Tiers are walked in
/// the fixed order moderate, high, severe, extreme and the last satisfied
/// tier wins; a missing tier is skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SeverityLadder {
    pub moderate: Option<ConditionSet>,
    pub high: Option<ConditionSet>,
    pub severe: Option<ConditionSet>,
    pub extreme: Option<ConditionSet>,
}

/// Admin-managed alert rule, read-mostly reference data.
#[derive(Debug, Clone, FromRow)]
pub struct AlertRule {
    pub id: Uuid,
    pub alert_type: AlertType,
    pub name: String,
    pub name_hi: Option<String>,
    pub description: String,
    pub description_hi: Option<String>,
    pub conditions: Json<ConditionSet>,
    pub severity_thresholds: Json<SeverityLadder>,
    pub recommendations: Json<Vec<String>>,
    pub recommendations_hi: Json<Vec<String>>,
    pub is_active: bool,
    /// Dispatch priority, lower = more urgent.
    pub priority: i32,
    /// Whether SMS delivery is permitted for this alert type at all.
    pub sms_enabled: bool,
}
