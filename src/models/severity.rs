use serde::{Deserialize, Serialize};

/// Alert severity. The derive order gives the total order used by
/// minimum-severity filtering, quiet-hours bypass and SMS gating:
/// low < moderate < high < severe < extreme.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "alert_severity", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Moderate,
    High,
    Severe,
    Extreme,
}

impl AlertSeverity {
    /// Ladder tiers in the fixed evaluation order. The highest satisfied
    /// tier wins, so the walk keeps the last match.
    pub const LADDER: [AlertSeverity; 4] = [
        AlertSeverity::Moderate,
        AlertSeverity::High,
        AlertSeverity::Severe,
        AlertSeverity::Extreme,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Moderate => "moderate",
            AlertSeverity::High => "high",
            AlertSeverity::Severe => "severe",
            AlertSeverity::Extreme => "extreme",
        }
    }

    /// Severe and extreme alerts ignore quiet hours.
    pub fn bypasses_quiet_hours(&self) -> bool {
        *self >= AlertSeverity::Severe
    }
}
