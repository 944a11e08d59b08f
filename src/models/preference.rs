use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use super::rule::AlertType;
use super::severity::AlertSeverity;

/// Delivery channels. Email exists in stored preferences but the engine
/// never wires an email sender for weather alerts; the dispatcher ignores
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Push,
    Sms,
    Email,
    InApp,
}

/// A user's delivery policy. One row per user, upsert semantics; an absent
/// row means [`AlertPreference::default_for`].
#[derive(Debug, Clone, PartialEq)]
pub struct AlertPreference {
    pub user_id: Uuid,
    pub enabled_alerts: Vec<AlertType>,
    pub channels: Vec<Channel>,
    pub min_severity: AlertSeverity,
    pub quiet_hours_start: Option<NaiveTime>,
    pub quiet_hours_end: Option<NaiveTime>,
    pub sms_enabled: bool,
    pub sms_critical_only: bool,
    pub sms_phone: Option<String>,
    pub language: String,
    /// Max alerts per calendar day; 0 = unlimited.
    pub daily_limit: i32,
}

impl AlertPreference {
    /// Defaults applied when the user never saved preferences: the five
    /// major alert types, push + in-app, moderate floor, SMS off, 10/day.
    pub fn default_for(user_id: Uuid) -> Self {
        AlertPreference {
            user_id,
            enabled_alerts: vec![
                AlertType::HeatWave,
                AlertType::HeavyRain,
                AlertType::Frost,
                AlertType::Storm,
                AlertType::Drought,
            ],
            channels: vec![Channel::Push, Channel::InApp],
            min_severity: AlertSeverity::Moderate,
            quiet_hours_start: None,
            quiet_hours_end: None,
            sms_enabled: false,
            sms_critical_only: true,
            sms_phone: None,
            language: "en".to_string(),
            daily_limit: 10,
        }
    }

    pub fn has_channel(&self, channel: Channel) -> bool {
        self.channels.contains(&channel)
    }

    /// Whether the given local wall-clock time falls inside the quiet-hours
    /// window. A window with start > end wraps across midnight
    /// (e.g. 22:00–06:00 covers 23:30 and 02:00). No window configured
    /// means never quiet.
    pub fn in_quiet_hours(&self, local: NaiveTime) -> bool {
        let (start, end) = match (self.quiet_hours_start, self.quiet_hours_end) {
            (Some(s), Some(e)) => (s, e),
            _ => return false,
        };
        if start <= end {
            local >= start && local <= end
        } else {
            local >= start || local <= end
        }
    }
}

/// Stored form of [`AlertPreference`]; JSONB lists wrapped for sqlx.
#[derive(Debug, FromRow)]
pub struct PreferenceRow {
    pub user_id: Uuid,
    pub enabled_alerts: Json<Vec<AlertType>>,
    pub notification_channels: Json<Vec<Channel>>,
    pub min_severity: AlertSeverity,
    pub quiet_hours_start: Option<NaiveTime>,
    pub quiet_hours_end: Option<NaiveTime>,
    pub sms_enabled: bool,
    pub sms_critical_only: bool,
    pub sms_phone: Option<String>,
    pub language: String,
    pub daily_limit: i32,
}

impl From<PreferenceRow> for AlertPreference {
    fn from(row: PreferenceRow) -> Self {
        AlertPreference {
            user_id: row.user_id,
            enabled_alerts: row.enabled_alerts.0,
            channels: row.notification_channels.0,
            min_severity: row.min_severity,
            quiet_hours_start: row.quiet_hours_start,
            quiet_hours_end: row.quiet_hours_end,
            sms_enabled: row.sms_enabled,
            sms_critical_only: row.sms_critical_only,
            sms_phone: row.sms_phone,
            language: row.language,
            daily_limit: row.daily_limit,
        }
    }
}

/// Partial preference update; None keeps the stored value. Quiet hours are
/// set as a pair so a window can also be cleared.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferencePatch {
    pub enabled_alerts: Option<Vec<AlertType>>,
    pub notification_channels: Option<Vec<Channel>>,
    pub min_severity: Option<AlertSeverity>,
    pub quiet_hours_start: Option<NaiveTime>,
    pub quiet_hours_end: Option<NaiveTime>,
    pub sms_enabled: Option<bool>,
    pub sms_critical_only: Option<bool>,
    pub sms_phone: Option<String>,
    pub language: Option<String>,
    pub daily_limit: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pref_with_window(start: &str, end: &str) -> AlertPreference {
        let mut pref = AlertPreference::default_for(Uuid::new_v4());
        pref.quiet_hours_start = Some(start.parse().unwrap());
        pref.quiet_hours_end = Some(end.parse().unwrap());
        pref
    }

    fn at(time: &str) -> NaiveTime {
        time.parse().unwrap()
    }

    #[test]
    fn default_preference_matches_portal_defaults() {
        let pref = AlertPreference::default_for(Uuid::new_v4());
        assert_eq!(pref.enabled_alerts.len(), 5);
        assert!(pref.enabled_alerts.contains(&AlertType::Frost));
        assert_eq!(pref.min_severity, AlertSeverity::Moderate);
        assert!(!pref.sms_enabled);
        assert_eq!(pref.daily_limit, 10);
        assert!(pref.has_channel(Channel::Push));
        assert!(pref.has_channel(Channel::InApp));
        assert!(!pref.has_channel(Channel::Sms));
    }

    #[test]
    fn quiet_window_wrapping_midnight() {
        let pref = pref_with_window("22:00", "06:00");
        assert!(pref.in_quiet_hours(at("23:30")));
        assert!(pref.in_quiet_hours(at("02:00")));
        assert!(!pref.in_quiet_hours(at("12:00")));
        assert!(!pref.in_quiet_hours(at("21:59")));
    }

    #[test]
    fn quiet_window_same_day() {
        let pref = pref_with_window("13:00", "15:00");
        assert!(pref.in_quiet_hours(at("14:00")));
        assert!(!pref.in_quiet_hours(at("15:01")));
        assert!(!pref.in_quiet_hours(at("02:00")));
    }

    #[test]
    fn no_window_is_never_quiet() {
        let pref = AlertPreference::default_for(Uuid::new_v4());
        assert!(!pref.in_quiet_hours(at("03:00")));
    }
}
