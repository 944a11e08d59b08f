use async_trait::async_trait;
use serde_json::Value;

use crate::error::ServiceResult;

pub mod push;
pub mod sms;

pub use push::{FcmPushSender, LogPushSender};
pub use sms::{LogSmsSender, SmsGatewaySender, SMS_MAX_LEN};

/// Per-token result of a push send. Invalid tokens are distinguished so
/// the dispatcher can deactivate them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushStatus {
    Sent,
    InvalidToken,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct PushOutcome {
    pub token: String,
    pub status: PushStatus,
}

/// Aggregate view of a multi-token push used to decide the audit flags.
#[derive(Debug, Default)]
pub struct PushSummary {
    pub delivered: usize,
    pub invalid_tokens: Vec<String>,
}

impl PushSummary {
    pub fn from_outcomes(outcomes: &[PushOutcome]) -> Self {
        let mut summary = PushSummary::default();
        for outcome in outcomes {
            match &outcome.status {
                PushStatus::Sent => summary.delivered += 1,
                PushStatus::InvalidToken => summary.invalid_tokens.push(outcome.token.clone()),
                PushStatus::Failed(_) => {}
            }
        }
        summary
    }

    /// The push-sent audit flag is set only when at least one device got
    /// the notification.
    pub fn any_delivered(&self) -> bool {
        self.delivered > 0
    }
}

/// Push transport contract (FCM in production, a logging mock otherwise).
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send_to_tokens(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: &Value,
    ) -> ServiceResult<Vec<PushOutcome>>;

    async fn send_to_topic(
        &self,
        topic: &str,
        title: &str,
        body: &str,
        data: &Value,
    ) -> ServiceResult<()>;

    async fn subscribe_topic(&self, token: &str, topic: &str) -> ServiceResult<()>;

    async fn unsubscribe_topic(&self, token: &str, topic: &str) -> ServiceResult<()>;
}

/// SMS transport contract. Messages must be pre-truncated by the caller.
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, phone: &str, message: &str) -> ServiceResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(token: &str, status: PushStatus) -> PushOutcome {
        PushOutcome {
            token: token.to_string(),
            status,
        }
    }

    #[test]
    fn summary_counts_delivered_and_collects_invalid() {
        let outcomes = vec![
            outcome("a", PushStatus::Sent),
            outcome("b", PushStatus::InvalidToken),
            outcome("c", PushStatus::Failed("timeout".to_string())),
            outcome("d", PushStatus::Sent),
        ];
        let summary = PushSummary::from_outcomes(&outcomes);
        assert_eq!(summary.delivered, 2);
        assert_eq!(summary.invalid_tokens, vec!["b".to_string()]);
        assert!(summary.any_delivered());
    }

    #[test]
    fn summary_with_no_deliveries() {
        let outcomes = vec![
            outcome("a", PushStatus::InvalidToken),
            outcome("b", PushStatus::InvalidToken),
        ];
        let summary = PushSummary::from_outcomes(&outcomes);
        assert!(!summary.any_delivered());
        assert_eq!(summary.invalid_tokens.len(), 2);
    }
}
