use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::channels::{
    sms::truncate_message, PushSender, PushSummary, SmsSender, SMS_MAX_LEN,
};
use crate::db::{queries, DbPool};
use crate::error::{ServiceError, ServiceResult};
use crate::models::{
    AlertPreference, AlertSeverity, AlertType, Channel, Observation, Subscription, TriggeredAlert,
};
use crate::registry::SubscriptionRegistry;

const SMS_PREFIX: &str = "[Kheti Sahayak]";

/// SMS goes out only when the user opted in, the rule permits SMS, and,
/// under critical-only mode, the severity is at least high.
pub fn sms_eligible(preference: &AlertPreference, alert: &TriggeredAlert) -> bool {
    preference.sms_enabled
        && alert.sms_enabled
        && (!preference.sms_critical_only || alert.severity >= AlertSeverity::High)
}

/// Composes the single-segment SMS body from the localized alert text.
pub fn compose_sms(title: &str, message: &str) -> String {
    truncate_message(&format!("{SMS_PREFIX} {title}: {message}"), SMS_MAX_LEN)
}

/// Runs a database call under the per-call deadline so a hung connection
/// surfaces as [`ServiceError::Timeout`] instead of stalling the caller.
async fn bounded_query<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, sqlx::Error>>,
) -> ServiceResult<T> {
    match timeout(limit, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ServiceError::Timeout),
    }
}

/// Result of one multi-token push attempt, transport errors already folded
/// in: a failed or timed-out call delivers to nobody.
#[derive(Debug, Default)]
struct PushDelivery {
    delivered: bool,
    invalid_tokens: Vec<String>,
}

async fn attempt_push(
    push: &dyn PushSender,
    call_timeout: Duration,
    tokens: &[String],
    title: &str,
    body: &str,
    data: &Value,
) -> PushDelivery {
    if tokens.is_empty() {
        return PushDelivery::default();
    }
    let outcomes = match timeout(call_timeout, push.send_to_tokens(tokens, title, body, data)).await
    {
        Ok(Ok(outcomes)) => outcomes,
        Ok(Err(e)) => {
            error!("Push send failed: {e}");
            return PushDelivery::default();
        }
        Err(_) => {
            error!("Push send timed out");
            return PushDelivery::default();
        }
    };
    let summary = PushSummary::from_outcomes(&outcomes);
    PushDelivery {
        delivered: summary.any_delivered(),
        invalid_tokens: summary.invalid_tokens,
    }
}

async fn attempt_sms(
    sms: &dyn SmsSender,
    call_timeout: Duration,
    phone: &str,
    body: &str,
) -> bool {
    match timeout(call_timeout, sms.send(phone, body)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!("SMS send failed: {e}");
            false
        }
        Err(_) => {
            error!("SMS send timed out");
            false
        }
    }
}

/// Persists the alert occurrence and fans delivery out across the user's
/// channels. Each channel is independently fault-tolerant: the audit
/// record is the source of truth for what was attempted, so channel
/// failures are logged, recorded as unsent flags, and never returned to
/// the caller.
pub struct NotificationDispatcher {
    pool: DbPool,
    registry: SubscriptionRegistry,
    push: Arc<dyn PushSender>,
    sms: Arc<dyn SmsSender>,
    call_timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        pool: DbPool,
        registry: SubscriptionRegistry,
        push: Arc<dyn PushSender>,
        sms: Arc<dyn SmsSender>,
        call_timeout: Duration,
    ) -> Self {
        NotificationDispatcher {
            pool,
            registry,
            push,
            sms,
            call_timeout,
        }
    }

    /// Returns the id of the AlertRecord created for this dispatch,
    /// regardless of individual channel outcomes.
    pub async fn send_alert(
        &self,
        user_id: Uuid,
        alert: &TriggeredAlert,
        subscription: &Subscription,
        preference: &AlertPreference,
        user_phone: Option<&str>,
    ) -> ServiceResult<Uuid> {
        let title = alert.localized_title(&preference.language);
        let message = alert.localized_message(&preference.language);

        let record_id: Uuid = bounded_query(
            self.call_timeout,
            sqlx::query_scalar(queries::INSERT_ALERT_RECORD)
                .bind(user_id)
                .bind(subscription.id)
                .bind(alert.alert_type)
                .bind(alert.severity)
                .bind(title)
                .bind(message)
                .bind(sqlx::types::Json(&alert.observation))
                .bind(subscription.latitude)
                .bind(subscription.longitude)
                .bind(subscription.location_name.as_deref())
                .fetch_one(&self.pool),
        )
        .await?;

        if preference.has_channel(Channel::Push) {
            self.deliver_push(user_id, record_id, alert, title, message, preference)
                .await;
        }

        if preference.has_channel(Channel::InApp) {
            if let Err(e) = bounded_query(
                self.call_timeout,
                sqlx::query(queries::INSERT_IN_APP_NOTIFICATION)
                    .bind(user_id)
                    .bind(title)
                    .bind(message)
                    .bind(record_id)
                    .execute(&self.pool),
            )
            .await
            {
                error!("Failed to write in-app notification for alert {record_id}: {e}");
            }
        }

        if sms_eligible(preference, alert) {
            let phone = preference
                .sms_phone
                .as_deref()
                .or(user_phone)
                .map(str::to_string);
            match phone {
                Some(phone) => {
                    self.deliver_sms(record_id, &phone, title, message).await;
                }
                None => {
                    warn!("SMS-eligible alert {record_id} has no resolvable phone for user {user_id}")
                }
            }
        }

        Ok(record_id)
    }

    /// Sends to every active device token. Invalid tokens are deactivated
    /// in place; the push-sent flag is recorded only when at least one
    /// token succeeded.
    async fn deliver_push(
        &self,
        user_id: Uuid,
        record_id: Uuid,
        alert: &TriggeredAlert,
        title: &str,
        body: &str,
        preference: &AlertPreference,
    ) {
        let tokens = match self.registry.active_tokens(user_id).await {
            Ok(tokens) => tokens,
            Err(e) => {
                error!("Failed to load device tokens for user {user_id}: {e}");
                return;
            }
        };
        if tokens.is_empty() {
            info!("No active device tokens for user {user_id}, skipping push");
            return;
        }

        let data = json!({
            "type": "weather_alert",
            "alert_id": record_id,
            "alert_type": alert.alert_type,
            "severity": alert.severity,
            "recommendations": alert.localized_recommendations(&preference.language),
        });

        let delivery = attempt_push(
            self.push.as_ref(),
            self.call_timeout,
            &tokens,
            title,
            body,
            &data,
        )
        .await;

        if !delivery.invalid_tokens.is_empty() {
            if let Err(e) = self.registry.deactivate_tokens(&delivery.invalid_tokens).await {
                error!("Failed to deactivate invalid tokens: {e}");
            }
        }
        if delivery.delivered {
            if let Err(e) = bounded_query(
                self.call_timeout,
                sqlx::query(queries::SET_PUSH_SENT)
                    .bind(record_id)
                    .execute(&self.pool),
            )
            .await
            {
                error!("Failed to mark push sent for alert {record_id}: {e}");
            }
        }
    }

    async fn deliver_sms(&self, record_id: Uuid, phone: &str, title: &str, message: &str) {
        let body = compose_sms(title, message);
        if attempt_sms(self.sms.as_ref(), self.call_timeout, phone, &body).await {
            if let Err(e) = bounded_query(
                self.call_timeout,
                sqlx::query(queries::SET_SMS_SENT)
                    .bind(record_id)
                    .execute(&self.pool),
            )
            .await
            {
                error!("Failed to mark sms sent for alert {record_id}: {e}");
            }
        }
    }

    /// Admin utility: dispatches a synthetic low-stakes alert to the
    /// caller's primary subscription so channel wiring can be verified
    /// end to end.
    pub async fn send_test_alert(&self, user_id: Uuid) -> ServiceResult<Uuid> {
        let subscription = self
            .registry
            .primary_subscription(user_id)
            .await?
            .ok_or(ServiceError::NotFound)?;
        let preference = self.registry.preferences(user_id).await?;
        let phone = self.registry.user_phone(user_id).await?;

        let alert = TriggeredAlert {
            alert_type: AlertType::HeatWave,
            severity: AlertSeverity::Low,
            title: "Test Alert".to_string(),
            title_hi: Some("परीक्षण चेतावनी".to_string()),
            description: "This is a test of your weather alert channels.".to_string(),
            description_hi: Some("यह आपके मौसम चेतावनी चैनलों का परीक्षण है।".to_string()),
            recommendations: vec![],
            recommendations_hi: vec![],
            sms_enabled: true,
            priority: 99,
            observation: Observation::fallback(),
        };

        self.send_alert(user_id, &alert, &subscription, &preference, phone.as_deref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{LogSmsSender, PushOutcome, PushStatus};
    use async_trait::async_trait;

    fn alert(severity: AlertSeverity, rule_sms: bool) -> TriggeredAlert {
        TriggeredAlert {
            alert_type: AlertType::HeatWave,
            severity,
            title: "Heat Wave Alert".to_string(),
            title_hi: None,
            description: "Extreme heat".to_string(),
            description_hi: None,
            recommendations: vec![],
            recommendations_hi: vec![],
            sms_enabled: rule_sms,
            priority: 1,
            observation: Observation::fallback(),
        }
    }

    fn pref(sms_enabled: bool, critical_only: bool) -> AlertPreference {
        let mut pref = AlertPreference::default_for(Uuid::new_v4());
        pref.sms_enabled = sms_enabled;
        pref.sms_critical_only = critical_only;
        pref
    }

    #[test]
    fn sms_eligibility_matrix() {
        // User opted out: never.
        assert!(!sms_eligible(&pref(false, false), &alert(AlertSeverity::Extreme, true)));
        // Rule forbids SMS: never.
        assert!(!sms_eligible(&pref(true, false), &alert(AlertSeverity::Extreme, false)));
        // Critical-only gates below high.
        assert!(!sms_eligible(&pref(true, true), &alert(AlertSeverity::Moderate, true)));
        assert!(sms_eligible(&pref(true, true), &alert(AlertSeverity::High, true)));
        assert!(sms_eligible(&pref(true, true), &alert(AlertSeverity::Severe, true)));
        // Without critical-only, any severity goes.
        assert!(sms_eligible(&pref(true, false), &alert(AlertSeverity::Low, true)));
    }

    #[test]
    fn sms_body_is_prefixed_and_capped() {
        let body = compose_sms("Heat Wave Alert", &"very hot ".repeat(50));
        assert!(body.starts_with("[Kheti Sahayak] Heat Wave Alert:"));
        assert!(body.chars().count() <= SMS_MAX_LEN);
    }

    struct BrokenPushSender;

    #[async_trait]
    impl PushSender for BrokenPushSender {
        async fn send_to_tokens(
            &self,
            _tokens: &[String],
            _title: &str,
            _body: &str,
            _data: &Value,
        ) -> ServiceResult<Vec<PushOutcome>> {
            Err(ServiceError::Provider("gateway down".to_string()))
        }

        async fn send_to_topic(
            &self,
            _topic: &str,
            _title: &str,
            _body: &str,
            _data: &Value,
        ) -> ServiceResult<()> {
            Err(ServiceError::Provider("gateway down".to_string()))
        }

        async fn subscribe_topic(&self, _token: &str, _topic: &str) -> ServiceResult<()> {
            Err(ServiceError::Provider("gateway down".to_string()))
        }

        async fn unsubscribe_topic(&self, _token: &str, _topic: &str) -> ServiceResult<()> {
            Err(ServiceError::Provider("gateway down".to_string()))
        }
    }

    struct DeadTokenPushSender;

    #[async_trait]
    impl PushSender for DeadTokenPushSender {
        async fn send_to_tokens(
            &self,
            tokens: &[String],
            _title: &str,
            _body: &str,
            _data: &Value,
        ) -> ServiceResult<Vec<PushOutcome>> {
            Ok(tokens
                .iter()
                .map(|token| PushOutcome {
                    token: token.clone(),
                    status: PushStatus::InvalidToken,
                })
                .collect())
        }

        async fn send_to_topic(
            &self,
            _topic: &str,
            _title: &str,
            _body: &str,
            _data: &Value,
        ) -> ServiceResult<()> {
            Ok(())
        }

        async fn subscribe_topic(&self, _token: &str, _topic: &str) -> ServiceResult<()> {
            Ok(())
        }

        async fn unsubscribe_topic(&self, _token: &str, _topic: &str) -> ServiceResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn sms_succeeds_when_push_fails_completely() {
        // The channels are independent: a dead push gateway must leave the
        // push flag unset while SMS still goes out for the same alert.
        let candidate = alert(AlertSeverity::Severe, true);
        let tokens = vec!["t1".to_string(), "t2".to_string()];
        let limit = Duration::from_secs(1);

        let push = attempt_push(
            &BrokenPushSender,
            limit,
            &tokens,
            &candidate.title,
            &candidate.description,
            &json!({}),
        )
        .await;
        assert!(!push.delivered);
        assert!(push.invalid_tokens.is_empty());

        let body = compose_sms(&candidate.title, &candidate.description);
        let sms_ok = attempt_sms(&LogSmsSender, limit, "+911234567890", &body).await;
        assert!(sms_ok);
    }

    #[tokio::test]
    async fn all_tokens_invalid_means_undelivered_but_collected() {
        let tokens = vec!["dead1".to_string(), "dead2".to_string()];
        let delivery = attempt_push(
            &DeadTokenPushSender,
            Duration::from_secs(1),
            &tokens,
            "title",
            "body",
            &json!({}),
        )
        .await;
        assert!(!delivery.delivered);
        assert_eq!(delivery.invalid_tokens, tokens);
    }

    #[tokio::test]
    async fn push_without_tokens_is_a_no_op() {
        let delivery =
            attempt_push(&BrokenPushSender, Duration::from_secs(1), &[], "t", "b", &json!({}))
                .await;
        assert!(!delivery.delivered);
        assert!(delivery.invalid_tokens.is_empty());
    }

    #[tokio::test]
    async fn hung_query_maps_to_timeout() {
        let result: ServiceResult<()> = bounded_query(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ServiceError::Timeout)));

        let passthrough: ServiceResult<i32> =
            bounded_query(Duration::from_secs(1), async { Ok(3) }).await;
        assert_eq!(passthrough.unwrap(), 3);
    }
}
