pub const DEMOTE_OTHER_PRIMARIES: &str = r#"
UPDATE weather_alert_subscriptions SET is_primary = false WHERE user_id = $1;
"#;

pub const UPSERT_SUBSCRIPTION: &str = r#"
INSERT INTO weather_alert_subscriptions (user_id, latitude, longitude, location_name, alert_types, is_primary, is_active)
VALUES ($1, $2, $3, $4, $5::jsonb, $6, true)
ON CONFLICT (user_id, latitude, longitude)
DO UPDATE SET
    location_name = COALESCE(EXCLUDED.location_name, weather_alert_subscriptions.location_name),
    alert_types = COALESCE(EXCLUDED.alert_types, weather_alert_subscriptions.alert_types),
    is_primary = EXCLUDED.is_primary,
    is_active = true,
    updated_at = NOW()
RETURNING id, user_id, latitude, longitude, location_name, alert_types, is_primary, is_active, last_checked_at, created_at;
"#;

pub const UPDATE_SUBSCRIPTION: &str = r#"
UPDATE weather_alert_subscriptions
SET location_name = COALESCE($3, location_name),
    alert_types = COALESCE($4::jsonb, alert_types),
    is_primary = COALESCE($5, is_primary),
    updated_at = NOW()
WHERE id = $1 AND user_id = $2 AND is_active = true
RETURNING id, user_id, latitude, longitude, location_name, alert_types, is_primary, is_active, last_checked_at, created_at;
"#;

pub const SOFT_DELETE_SUBSCRIPTION: &str = r#"
UPDATE weather_alert_subscriptions
SET is_active = false,
    updated_at = NOW()
WHERE id = $1 AND user_id = $2 AND is_active = true
RETURNING id;
"#;

pub const LIST_SUBSCRIPTIONS: &str = r#"
SELECT id, user_id, latitude, longitude, location_name, alert_types, is_primary, is_active, last_checked_at, created_at
FROM weather_alert_subscriptions
WHERE user_id = $1 AND is_active = true
ORDER BY is_primary DESC, created_at ASC;
"#;

pub const PRIMARY_SUBSCRIPTION: &str = r#"
SELECT id, user_id, latitude, longitude, location_name, alert_types, is_primary, is_active, last_checked_at, created_at
FROM weather_alert_subscriptions
WHERE user_id = $1 AND is_active = true
ORDER BY is_primary DESC, created_at ASC
LIMIT 1;
"#;

// acos argument clamped to [-1, 1]: rounding can push the cosine of a zero
// angle just above 1.0 (or a near-antipodal one below -1.0), which would
// turn the distance into NaN and silently drop the row.
pub const FIND_NEAR: &str = r#"
SELECT
    s.id, s.user_id, s.latitude, s.longitude, s.location_name, s.alert_types,
    s.is_primary, s.is_active, s.last_checked_at, s.created_at,
    u.phone AS user_phone
FROM weather_alert_subscriptions s
LEFT JOIN users u ON u.id = s.user_id
WHERE s.is_active = true
AND (
    6371 * acos(GREATEST(-1.0, LEAST(1.0,
        cos(radians($1)) * cos(radians(s.latitude)) *
        cos(radians(s.longitude) - radians($2)) +
        sin(radians($1)) * sin(radians(s.latitude))
    )))
) <= $3;
"#;

pub const FIND_DUE: &str = r#"
SELECT id, user_id, latitude, longitude, location_name, alert_types, is_primary, is_active, last_checked_at, created_at
FROM weather_alert_subscriptions
WHERE is_active = true
AND (last_checked_at IS NULL OR last_checked_at < $1)
ORDER BY last_checked_at ASC NULLS FIRST
LIMIT $2;
"#;

pub const TOUCH_LAST_CHECKED: &str = r#"
UPDATE weather_alert_subscriptions SET last_checked_at = NOW() WHERE id = $1;
"#;

pub const SELECT_PREFERENCES: &str = r#"
SELECT user_id, enabled_alerts, notification_channels, min_severity, quiet_hours_start, quiet_hours_end,
       sms_enabled, sms_critical_only, sms_phone, language, daily_limit
FROM weather_alert_preferences
WHERE user_id = $1 AND is_active = true;
"#;

pub const UPSERT_PREFERENCES: &str = r#"
INSERT INTO weather_alert_preferences
    (user_id, enabled_alerts, notification_channels, min_severity, quiet_hours_start, quiet_hours_end,
     sms_enabled, sms_critical_only, sms_phone, language, daily_limit, is_active)
VALUES (
    $1,
    COALESCE($2::jsonb, '["heat_wave", "heavy_rain", "frost", "storm", "drought"]'::jsonb),
    COALESCE($3::jsonb, '["push", "in_app"]'::jsonb),
    COALESCE($4::alert_severity, 'moderate'),
    $5, $6,
    COALESCE($7, false),
    COALESCE($8, true),
    $9,
    COALESCE($10, 'en'),
    COALESCE($11, 10),
    true
)
ON CONFLICT (user_id)
DO UPDATE SET
    enabled_alerts = COALESCE($2::jsonb, weather_alert_preferences.enabled_alerts),
    notification_channels = COALESCE($3::jsonb, weather_alert_preferences.notification_channels),
    min_severity = COALESCE($4::alert_severity, weather_alert_preferences.min_severity),
    quiet_hours_start = $5,
    quiet_hours_end = $6,
    sms_enabled = COALESCE($7, weather_alert_preferences.sms_enabled),
    sms_critical_only = COALESCE($8, weather_alert_preferences.sms_critical_only),
    sms_phone = COALESCE($9, weather_alert_preferences.sms_phone),
    language = COALESCE($10, weather_alert_preferences.language),
    daily_limit = COALESCE($11, weather_alert_preferences.daily_limit),
    is_active = true,
    updated_at = NOW()
RETURNING user_id, enabled_alerts, notification_channels, min_severity, quiet_hours_start, quiet_hours_end,
          sms_enabled, sms_critical_only, sms_phone, language, daily_limit;
"#;

pub const COUNT_ALERTS_SINCE: &str = r#"
SELECT COUNT(*) FROM weather_alert_history WHERE user_id = $1 AND created_at >= $2;
"#;

pub const RECENT_ALERT_EXISTS: &str = r#"
SELECT EXISTS(
    SELECT 1 FROM weather_alert_history
    WHERE subscription_id = $1 AND alert_type = $2 AND severity = $3 AND created_at >= $4
);
"#;

pub const INSERT_ALERT_RECORD: &str = r#"
INSERT INTO weather_alert_history
    (user_id, subscription_id, alert_type, severity, title, message, weather_data,
     latitude, longitude, location_name, valid_from, valid_until)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW() + INTERVAL '24 hours')
RETURNING id;
"#;

pub const SET_PUSH_SENT: &str = r#"
UPDATE weather_alert_history SET push_sent = true, push_sent_at = NOW() WHERE id = $1;
"#;

pub const SET_SMS_SENT: &str = r#"
UPDATE weather_alert_history SET sms_sent = true, sms_sent_at = NOW() WHERE id = $1;
"#;

pub const INSERT_IN_APP_NOTIFICATION: &str = r#"
INSERT INTO notifications (user_id, title, message, type, related_entity_type, related_entity_id)
VALUES ($1, $2, $3, 'warning', 'weather_alert', $4);
"#;

pub const ALERT_HISTORY: &str = r#"
SELECT id, user_id, subscription_id, alert_type, severity, title, message, weather_data,
       latitude, longitude, location_name, push_sent, push_sent_at, sms_sent, sms_sent_at,
       is_read, read_at, is_dismissed, valid_from, valid_until, created_at
FROM weather_alert_history
WHERE user_id = $1
AND ($2::weather_alert_type IS NULL OR alert_type = $2)
AND ($3::alert_severity IS NULL OR severity = $3)
AND ($4::boolean IS NULL OR is_read = $4)
ORDER BY created_at DESC
LIMIT $5 OFFSET $6;
"#;

pub const MARK_ALERT_READ: &str = r#"
UPDATE weather_alert_history
SET is_read = true, read_at = NOW()
WHERE id = $1 AND user_id = $2
RETURNING id, user_id, subscription_id, alert_type, severity, title, message, weather_data,
          latitude, longitude, location_name, push_sent, push_sent_at, sms_sent, sms_sent_at,
          is_read, read_at, is_dismissed, valid_from, valid_until, created_at;
"#;

pub const DISMISS_ALERT: &str = r#"
UPDATE weather_alert_history
SET is_dismissed = true
WHERE id = $1 AND user_id = $2
RETURNING id, user_id, subscription_id, alert_type, severity, title, message, weather_data,
          latitude, longitude, location_name, push_sent, push_sent_at, sms_sent, sms_sent_at,
          is_read, read_at, is_dismissed, valid_from, valid_until, created_at;
"#;

pub const SELECT_ACTIVE_RULES: &str = r#"
SELECT id, alert_type, name, name_hi, description, description_hi, conditions, severity_thresholds,
       recommendations, recommendations_hi, is_active, priority, sms_enabled
FROM weather_alert_rules
WHERE is_active = true
ORDER BY priority ASC;
"#;

pub const SELECT_ACTIVE_TOKENS: &str = r#"
SELECT token FROM device_tokens WHERE user_id = $1 AND is_active = true;
"#;

pub const UPSERT_DEVICE_TOKEN: &str = r#"
INSERT INTO device_tokens (user_id, token, platform, is_active)
VALUES ($1, $2, $3, true)
ON CONFLICT (token)
DO UPDATE SET user_id = $1, platform = $3, is_active = true, updated_at = NOW();
"#;

pub const DEACTIVATE_TOKENS: &str = r#"
UPDATE device_tokens SET is_active = false WHERE token = ANY($1);
"#;

pub const SELECT_USER_PHONE: &str = r#"
SELECT phone FROM users WHERE id = $1;
"#;
