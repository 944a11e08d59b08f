use chrono::{DateTime, FixedOffset, NaiveTime, Utc};

use crate::models::{AlertPreference, AlertSeverity, Subscription, TriggeredAlert};

/// Why a candidate alert was not admitted for delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Alert type not in the effective enabled list (subscription override
    /// else preference list).
    TypeDisabled,
    /// Severity below the user's minimum.
    BelowMinSeverity,
    /// Daily delivery cap reached.
    DailyLimitReached,
    /// Inside the quiet-hours window and below severe.
    QuietHours,
    /// Same type + severity already delivered within the cool-down window.
    DuplicateSuppressed,
}

/// Outcome of the admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Reject(RejectReason),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admit)
    }
}

/// Applies the delivery filters in order, first failure short-circuiting:
/// enabled-type list, minimum severity, daily cap, quiet hours (severe and
/// extreme bypass), then duplicate cool-down. Pure decision function; the
/// caller supplies the current local time, today's sent count and whether a
/// matching alert was recently dispatched.
pub fn admit(
    alert: &TriggeredAlert,
    subscription: &Subscription,
    preference: &AlertPreference,
    sent_today: i64,
    duplicate_recent: bool,
    now_local: NaiveTime,
) -> Admission {
    let enabled = subscription
        .alert_type_override()
        .unwrap_or(&preference.enabled_alerts);
    if !enabled.contains(&alert.alert_type) {
        return Admission::Reject(RejectReason::TypeDisabled);
    }

    if alert.severity < preference.min_severity {
        return Admission::Reject(RejectReason::BelowMinSeverity);
    }

    if preference.daily_limit > 0 && sent_today >= preference.daily_limit as i64 {
        return Admission::Reject(RejectReason::DailyLimitReached);
    }

    if preference.in_quiet_hours(now_local) && !alert.severity.bypasses_quiet_hours() {
        return Admission::Reject(RejectReason::QuietHours);
    }

    if duplicate_recent {
        return Admission::Reject(RejectReason::DuplicateSuppressed);
    }

    Admission::Admit
}

/// Wall-clock time at the service's fixed local offset. Quiet hours and
/// the daily cap are interpreted in this zone (IST by default), not UTC.
pub fn local_time(now: DateTime<Utc>, offset: FixedOffset) -> NaiveTime {
    now.with_timezone(&offset).time()
}

/// Start of the current local calendar day, expressed in UTC. Used as the
/// lower bound when counting today's deliveries.
pub fn local_midnight_utc(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let midnight = now.with_timezone(&offset).date_naive().and_time(NaiveTime::MIN);
    match midnight.and_local_timezone(offset).single() {
        Some(dt) => dt.with_timezone(&Utc),
        // Fixed offsets are never ambiguous; keep a safe bound anyway.
        None => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertType, Observation};
    use chrono::TimeZone;
    use sqlx::types::Json;
    use uuid::Uuid;

    fn alert(alert_type: AlertType, severity: AlertSeverity) -> TriggeredAlert {
        TriggeredAlert {
            alert_type,
            severity,
            title: "t".to_string(),
            title_hi: None,
            description: "d".to_string(),
            description_hi: None,
            recommendations: vec![],
            recommendations_hi: vec![],
            sms_enabled: true,
            priority: 1,
            observation: Observation::fallback(),
        }
    }

    fn subscription(user_id: Uuid) -> Subscription {
        Subscription {
            id: Uuid::new_v4(),
            user_id,
            latitude: 26.91,
            longitude: 75.78,
            location_name: Some("Jaipur".to_string()),
            alert_types: None,
            is_primary: true,
            is_active: true,
            last_checked_at: None,
            created_at: Utc::now(),
        }
    }

    fn noon() -> NaiveTime {
        "12:00".parse().unwrap()
    }

    #[test]
    fn disabled_type_rejected_first() {
        let user = Uuid::new_v4();
        let pref = AlertPreference::default_for(user);
        let candidate = alert(AlertType::Fog, AlertSeverity::Extreme);
        // Fog is not in the default enabled list; the type filter fires
        // before anything else, even for extreme severity.
        assert_eq!(
            admit(&candidate, &subscription(user), &pref, 0, true, noon()),
            Admission::Reject(RejectReason::TypeDisabled)
        );
    }

    #[test]
    fn subscription_override_replaces_preference_list() {
        let user = Uuid::new_v4();
        let pref = AlertPreference::default_for(user);
        let mut sub = subscription(user);
        sub.alert_types = Some(Json(vec![AlertType::Fog]));
        let fog = alert(AlertType::Fog, AlertSeverity::Moderate);
        assert!(admit(&fog, &sub, &pref, 0, false, noon()).is_admitted());
        // The override is exclusive: types from the preference list no
        // longer pass.
        let heat = alert(AlertType::HeatWave, AlertSeverity::High);
        assert_eq!(
            admit(&heat, &sub, &pref, 0, false, noon()),
            Admission::Reject(RejectReason::TypeDisabled)
        );
    }

    #[test]
    fn severity_below_minimum_rejected() {
        let user = Uuid::new_v4();
        let mut pref = AlertPreference::default_for(user);
        pref.min_severity = AlertSeverity::High;
        let candidate = alert(AlertType::HeatWave, AlertSeverity::Moderate);
        assert_eq!(
            admit(&candidate, &subscription(user), &pref, 0, false, noon()),
            Admission::Reject(RejectReason::BelowMinSeverity)
        );
    }

    #[test]
    fn daily_cap_rejects_regardless_of_severity() {
        let user = Uuid::new_v4();
        let pref = AlertPreference::default_for(user);
        let candidate = alert(AlertType::HeatWave, AlertSeverity::Extreme);
        assert_eq!(
            admit(&candidate, &subscription(user), &pref, 10, false, noon()),
            Admission::Reject(RejectReason::DailyLimitReached)
        );
        assert!(admit(&candidate, &subscription(user), &pref, 9, false, noon()).is_admitted());
    }

    #[test]
    fn zero_cap_means_unlimited() {
        let user = Uuid::new_v4();
        let mut pref = AlertPreference::default_for(user);
        pref.daily_limit = 0;
        let candidate = alert(AlertType::HeatWave, AlertSeverity::Moderate);
        assert!(admit(&candidate, &subscription(user), &pref, 5000, false, noon()).is_admitted());
    }

    #[test]
    fn quiet_hours_suppress_below_severe_only() {
        let user = Uuid::new_v4();
        let mut pref = AlertPreference::default_for(user);
        pref.quiet_hours_start = Some("22:00".parse().unwrap());
        pref.quiet_hours_end = Some("06:00".parse().unwrap());
        let sub = subscription(user);

        let high = alert(AlertType::HeatWave, AlertSeverity::High);
        let severe = alert(AlertType::HeatWave, AlertSeverity::Severe);
        let extreme = alert(AlertType::HeatWave, AlertSeverity::Extreme);

        for time in ["23:30", "02:00"] {
            let t: NaiveTime = time.parse().unwrap();
            assert_eq!(
                admit(&high, &sub, &pref, 0, false, t),
                Admission::Reject(RejectReason::QuietHours)
            );
            assert!(admit(&severe, &sub, &pref, 0, false, t).is_admitted());
            assert!(admit(&extreme, &sub, &pref, 0, false, t).is_admitted());
        }
        // Outside the window the same candidate passes.
        assert!(admit(&high, &sub, &pref, 0, false, noon()).is_admitted());
    }

    #[test]
    fn duplicate_within_cooldown_rejected_last() {
        let user = Uuid::new_v4();
        let pref = AlertPreference::default_for(user);
        let candidate = alert(AlertType::HeatWave, AlertSeverity::High);
        assert_eq!(
            admit(&candidate, &subscription(user), &pref, 0, true, noon()),
            Admission::Reject(RejectReason::DuplicateSuppressed)
        );
    }

    #[test]
    fn severe_frost_admitted_under_default_preference() {
        let user = Uuid::new_v4();
        let pref = AlertPreference::default_for(user);
        let candidate = alert(AlertType::Frost, AlertSeverity::Severe);
        assert!(admit(&candidate, &subscription(user), &pref, 0, false, noon()).is_admitted());
    }

    #[test]
    fn local_day_boundary_in_ist() {
        // 20:00 UTC on the 1st is 01:30 IST on the 2nd.
        let offset = FixedOffset::east_opt(330 * 60).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 20, 0, 0).unwrap();
        assert_eq!(local_time(now, offset), "01:30".parse::<NaiveTime>().unwrap());
        let midnight = local_midnight_utc(now, offset);
        assert_eq!(midnight, Utc.with_ymd_and_hms(2026, 3, 1, 18, 30, 0).unwrap());
    }
}
