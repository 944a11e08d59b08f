use serde::{Deserialize, Serialize};

/// A single weather reading for a location. Produced by the observation
/// provider, consumed once per evaluation and snapshotted into the alert
/// history as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Temperature in °C.
    pub temp: f64,
    /// Relative humidity in %.
    pub humidity: f64,
    /// Wind speed in km/h.
    pub wind_speed: f64,
    /// Precipitation in mm (last hour).
    pub precipitation: f64,
    /// Visibility in metres.
    pub visibility: f64,
    /// Consecutive days without rain, when the provider tracks it.
    #[serde(default)]
    pub days_without_rain: Option<f64>,
    /// Free-text condition label ("Clear", "Rain", ...).
    #[serde(default = "default_condition")]
    pub condition: String,
}

fn default_condition() -> String {
    "Clear".to_string()
}

impl Observation {
    /// Benign reading used when the provider is unreachable or no API key
    /// is configured. Triggers no seeded rule, so check-now degrades to an
    /// empty alert list instead of an error.
    pub fn fallback() -> Self {
        Observation {
            temp: 28.0,
            humidity: 65.0,
            wind_speed: 15.0,
            precipitation: 0.0,
            visibility: 10_000.0,
            days_without_rain: None,
            condition: "Clear".to_string(),
        }
    }
}
