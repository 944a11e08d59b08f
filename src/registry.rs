use chrono::{DateTime, Duration, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, Row};
use tracing::info;
use uuid::Uuid;

use crate::db::{queries, DbPool};
use crate::error::{ServiceError, ServiceResult};
use crate::models::preference::PreferenceRow;
use crate::models::{
    AlertPreference, AlertRecord, AlertRule, AlertSeverity, AlertType, HistoryFilter,
    NewSubscription, PreferencePatch, Subscription, SubscriptionPatch,
};

/// A subscription matched by a geospatial query, joined with the owner's
/// delivery preference and contact phone.
#[derive(Debug, Clone)]
pub struct SubscriberMatch {
    pub subscription: Subscription,
    pub preference: AlertPreference,
    pub phone: Option<String>,
}

/// CRUD and lookup over subscriptions, preferences, alert history and
/// device tokens. All writes are ownership-scoped; subscriptions are
/// soft-deleted so history rows keep their linkage.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    pool: DbPool,
}

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in km. Mirrors the haversine expression used by
/// the `FIND_NEAR` SQL so unit tests can exercise the same geometry.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let cos_angle = lat1.to_radians().cos() * lat2.to_radians().cos()
        * (lon2.to_radians() - lon1.to_radians()).cos()
        + lat1.to_radians().sin() * lat2.to_radians().sin();
    EARTH_RADIUS_KM * cos_angle.min(1.0).max(-1.0).acos()
}

fn validate_coordinates(lat: f64, lon: f64) -> ServiceResult<()> {
    if !(-90.0..=90.0).contains(&lat) || !lat.is_finite() {
        return Err(ServiceError::Validation(format!("invalid latitude: {lat}")));
    }
    if !(-180.0..=180.0).contains(&lon) || !lon.is_finite() {
        return Err(ServiceError::Validation(format!("invalid longitude: {lon}")));
    }
    Ok(())
}

impl SubscriptionRegistry {
    pub fn new(pool: DbPool) -> Self {
        SubscriptionRegistry { pool }
    }

    /// Upserts on the unique (user, lat, lon) tuple. When the new
    /// subscription is primary, every other subscription of the user is
    /// demoted first inside the same transaction, so at most one primary
    /// can exist.
    pub async fn create_subscription(&self, new: NewSubscription) -> ServiceResult<Subscription> {
        validate_coordinates(new.latitude, new.longitude)?;

        let mut tx = self.pool.begin().await?;

        if new.is_primary {
            sqlx::query(queries::DEMOTE_OTHER_PRIMARIES)
                .bind(new.user_id)
                .execute(&mut *tx)
                .await?;
        }

        let subscription = sqlx::query_as::<_, Subscription>(queries::UPSERT_SUBSCRIPTION)
            .bind(new.user_id)
            .bind(new.latitude)
            .bind(new.longitude)
            .bind(new.location_name)
            .bind(new.alert_types.map(Json))
            .bind(new.is_primary)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(
            "Created subscription {} for user {}",
            subscription.id, subscription.user_id
        );
        Ok(subscription)
    }

    /// Partial patch of an owned, active subscription.
    pub async fn update_subscription(
        &self,
        user_id: Uuid,
        subscription_id: Uuid,
        patch: SubscriptionPatch,
    ) -> ServiceResult<Subscription> {
        let mut tx = self.pool.begin().await?;

        if patch.is_primary == Some(true) {
            sqlx::query(queries::DEMOTE_OTHER_PRIMARIES)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        let updated = sqlx::query_as::<_, Subscription>(queries::UPDATE_SUBSCRIPTION)
            .bind(subscription_id)
            .bind(user_id)
            .bind(patch.location_name)
            .bind(patch.alert_types.map(Json))
            .bind(patch.is_primary)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        updated.ok_or(ServiceError::NotFound)
    }

    /// Soft delete: flips `is_active` so the history keeps its link.
    pub async fn delete_subscription(
        &self,
        user_id: Uuid,
        subscription_id: Uuid,
    ) -> ServiceResult<()> {
        let deleted = sqlx::query(queries::SOFT_DELETE_SUBSCRIPTION)
            .bind(subscription_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        if deleted.is_none() {
            return Err(ServiceError::NotFound);
        }
        Ok(())
    }

    pub async fn subscriptions_for_user(&self, user_id: Uuid) -> ServiceResult<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, Subscription>(queries::LIST_SUBSCRIPTIONS)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn primary_subscription(&self, user_id: Uuid) -> ServiceResult<Option<Subscription>> {
        let row = sqlx::query_as::<_, Subscription>(queries::PRIMARY_SUBSCRIPTION)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Active subscriptions within `radius_km` of the point (haversine),
    /// each joined with the owner's preference and contact phone.
    pub async fn find_near(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
    ) -> ServiceResult<Vec<SubscriberMatch>> {
        validate_coordinates(lat, lon)?;
        if !(radius_km > 0.0) {
            return Err(ServiceError::Validation(format!(
                "invalid radius: {radius_km}"
            )));
        }

        let rows = sqlx::query(queries::FIND_NEAR)
            .bind(lat)
            .bind(lon)
            .bind(radius_km)
            .fetch_all(&self.pool)
            .await?;

        let mut matches = Vec::with_capacity(rows.len());
        for row in rows {
            let subscription = Subscription::from_row(&row)?;
            let phone: Option<String> = row.try_get("user_phone")?;
            let preference = self.preferences(subscription.user_id).await?;
            matches.push(SubscriberMatch {
                subscription,
                preference,
                phone,
            });
        }
        Ok(matches)
    }

    /// Active subscriptions whose `last_checked_at` is null or older than
    /// `interval`, oldest first, capped at `limit`. Bounds the scheduler
    /// batch and gives starved subscriptions priority.
    pub async fn find_due(
        &self,
        interval: Duration,
        limit: i64,
    ) -> ServiceResult<Vec<Subscription>> {
        let cutoff = Utc::now() - interval;
        let rows = sqlx::query_as::<_, Subscription>(queries::FIND_DUE)
            .bind(cutoff)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn touch_last_checked(&self, subscription_id: Uuid) -> ServiceResult<()> {
        sqlx::query(queries::TOUCH_LAST_CHECKED)
            .bind(subscription_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Stored preference, or the portal defaults when the user never saved
    /// one.
    pub async fn preferences(&self, user_id: Uuid) -> ServiceResult<AlertPreference> {
        let row = sqlx::query_as::<_, PreferenceRow>(queries::SELECT_PREFERENCES)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row
            .map(AlertPreference::from)
            .unwrap_or_else(|| AlertPreference::default_for(user_id)))
    }

    /// COALESCE-style partial upsert: absent patch fields keep the stored
    /// value, except the quiet-hours pair which is always written so a
    /// window can also be cleared.
    pub async fn update_preferences(
        &self,
        user_id: Uuid,
        patch: PreferencePatch,
    ) -> ServiceResult<AlertPreference> {
        if let Some(language) = &patch.language {
            if language != "en" && language != "hi" {
                return Err(ServiceError::Validation(format!(
                    "unsupported language: {language}"
                )));
            }
        }
        if let Some(limit) = patch.daily_limit {
            if limit < 0 {
                return Err(ServiceError::Validation(format!(
                    "daily_limit must be >= 0, got {limit}"
                )));
            }
        }
        if let Some(phone) = &patch.sms_phone {
            if phone.is_empty() || phone.len() > 20 {
                return Err(ServiceError::Validation("invalid sms phone".to_string()));
            }
        }
        if let Some(channels) = &patch.notification_channels {
            if channels.is_empty() {
                return Err(ServiceError::Validation(
                    "notification_channels must not be empty".to_string(),
                ));
            }
        }

        let row = sqlx::query_as::<_, PreferenceRow>(queries::UPSERT_PREFERENCES)
            .bind(user_id)
            .bind(patch.enabled_alerts.map(Json))
            .bind(patch.notification_channels.map(Json))
            .bind(patch.min_severity)
            .bind(patch.quiet_hours_start)
            .bind(patch.quiet_hours_end)
            .bind(patch.sms_enabled)
            .bind(patch.sms_critical_only)
            .bind(patch.sms_phone)
            .bind(patch.language)
            .bind(patch.daily_limit)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    /// Alerts delivered to the user since the given instant (local
    /// midnight, computed by the caller). Feeds the daily cap.
    pub async fn alerts_sent_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> ServiceResult<i64> {
        let count: i64 = sqlx::query_scalar(queries::COUNT_ALERTS_SINCE)
            .bind(user_id)
            .bind(since)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Whether the same (subscription, type, severity) was already
    /// dispatched after `since`. Feeds the duplicate cool-down policy.
    pub async fn recent_alert_exists(
        &self,
        subscription_id: Uuid,
        alert_type: AlertType,
        severity: AlertSeverity,
        since: DateTime<Utc>,
    ) -> ServiceResult<bool> {
        let exists: bool = sqlx::query_scalar(queries::RECENT_ALERT_EXISTS)
            .bind(subscription_id)
            .bind(alert_type)
            .bind(severity)
            .bind(since)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    pub async fn alert_history(
        &self,
        user_id: Uuid,
        filter: HistoryFilter,
    ) -> ServiceResult<Vec<AlertRecord>> {
        let rows = sqlx::query_as::<_, AlertRecord>(queries::ALERT_HISTORY)
            .bind(user_id)
            .bind(filter.alert_type)
            .bind(filter.severity)
            .bind(filter.is_read)
            .bind(filter.limit.clamp(1, 100))
            .bind(filter.offset.max(0))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn mark_alert_read(
        &self,
        user_id: Uuid,
        alert_id: Uuid,
    ) -> ServiceResult<AlertRecord> {
        sqlx::query_as::<_, AlertRecord>(queries::MARK_ALERT_READ)
            .bind(alert_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    pub async fn dismiss_alert(&self, user_id: Uuid, alert_id: Uuid) -> ServiceResult<AlertRecord> {
        sqlx::query_as::<_, AlertRecord>(queries::DISMISS_ALERT)
            .bind(alert_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    /// Active rules ordered by dispatch priority.
    pub async fn active_rules(&self) -> ServiceResult<Vec<AlertRule>> {
        let rows = sqlx::query_as::<_, AlertRule>(queries::SELECT_ACTIVE_RULES)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn active_tokens(&self, user_id: Uuid) -> ServiceResult<Vec<String>> {
        let rows = sqlx::query(queries::SELECT_ACTIVE_TOKENS)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| row.try_get("token").map_err(ServiceError::from))
            .collect()
    }

    pub async fn register_token(
        &self,
        user_id: Uuid,
        token: &str,
        platform: &str,
    ) -> ServiceResult<()> {
        if token.is_empty() {
            return Err(ServiceError::Validation("empty device token".to_string()));
        }
        sqlx::query(queries::UPSERT_DEVICE_TOKEN)
            .bind(user_id)
            .bind(token)
            .bind(platform)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Marks provider-rejected tokens inactive so they are not retried.
    pub async fn deactivate_tokens(&self, tokens: &[String]) -> ServiceResult<()> {
        if tokens.is_empty() {
            return Ok(());
        }
        sqlx::query(queries::DEACTIVATE_TOKENS)
            .bind(tokens)
            .execute(&self.pool)
            .await?;
        info!("Deactivated {} invalid device tokens", tokens.len());
        Ok(())
    }

    pub async fn user_phone(&self, user_id: Uuid) -> ServiceResult<Option<String>> {
        let row = sqlx::query(queries::SELECT_USER_PHONE)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(row.try_get("phone")?),
            None => Ok(None),
        }
    }
}
