use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{PushOutcome, PushSender, PushStatus};
use crate::error::{ServiceError, ServiceResult};

const IID_TOPIC_URL: &str = "https://iid.googleapis.com/iid/v1";

/// FCM HTTP sender. Error codes the provider uses for dead registrations
/// are mapped to [`PushStatus::InvalidToken`] so the token store can heal
/// itself.
pub struct FcmPushSender {
    client: reqwest::Client,
    api_url: String,
    server_key: String,
}

#[derive(Debug, Deserialize)]
struct FcmResponse {
    #[serde(default)]
    results: Vec<FcmResult>,
}

#[derive(Debug, Deserialize)]
struct FcmResult {
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn status_from_result(result: &FcmResult) -> PushStatus {
    if result.message_id.is_some() {
        return PushStatus::Sent;
    }
    match result.error.as_deref() {
        Some("NotRegistered") | Some("InvalidRegistration") | Some("MissingRegistration") => {
            PushStatus::InvalidToken
        }
        Some(other) => PushStatus::Failed(other.to_string()),
        None => PushStatus::Failed("unknown".to_string()),
    }
}

impl FcmPushSender {
    pub fn new(api_url: String, server_key: String) -> Self {
        FcmPushSender {
            client: reqwest::Client::new(),
            api_url,
            server_key,
        }
    }

    async fn post(&self, payload: Value) -> ServiceResult<FcmResponse> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::Provider(format!("push request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ServiceError::Provider(format!(
                "push provider returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ServiceError::Provider(format!("push response malformed: {e}")))
    }
}

#[async_trait]
impl PushSender for FcmPushSender {
    async fn send_to_tokens(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: &Value,
    ) -> ServiceResult<Vec<PushOutcome>> {
        if tokens.is_empty() {
            return Ok(vec![]);
        }

        let payload = json!({
            "registration_ids": tokens,
            "notification": { "title": title, "body": body },
            "data": data,
            "android": { "priority": "high" },
        });

        let parsed = self.post(payload).await?;
        let outcomes = tokens
            .iter()
            .enumerate()
            .map(|(i, token)| PushOutcome {
                token: token.clone(),
                status: parsed
                    .results
                    .get(i)
                    .map(status_from_result)
                    .unwrap_or_else(|| PushStatus::Failed("missing result".to_string())),
            })
            .collect();
        Ok(outcomes)
    }

    async fn send_to_topic(
        &self,
        topic: &str,
        title: &str,
        body: &str,
        data: &Value,
    ) -> ServiceResult<()> {
        let payload = json!({
            "to": format!("/topics/{topic}"),
            "notification": { "title": title, "body": body },
            "data": data,
        });
        self.post(payload).await?;
        Ok(())
    }

    async fn subscribe_topic(&self, token: &str, topic: &str) -> ServiceResult<()> {
        let url = format!("{IID_TOPIC_URL}/{token}/rel/topics/{topic}");
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("key={}", self.server_key))
            .send()
            .await
            .map_err(|e| ServiceError::Provider(format!("topic subscribe failed: {e}")))?;
        if !response.status().is_success() {
            return Err(ServiceError::Provider(format!(
                "topic subscribe returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn unsubscribe_topic(&self, token: &str, topic: &str) -> ServiceResult<()> {
        let url = format!("{IID_TOPIC_URL}/{token}/rel/topics/{topic}");
        let response = self
            .client
            .delete(&url)
            .header("Authorization", format!("key={}", self.server_key))
            .send()
            .await
            .map_err(|e| ServiceError::Provider(format!("topic unsubscribe failed: {e}")))?;
        if !response.status().is_success() {
            return Err(ServiceError::Provider(format!(
                "topic unsubscribe returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Development mock used when no FCM key is configured: logs instead of
/// sending and reports every token as delivered.
pub struct LogPushSender;

#[async_trait]
impl PushSender for LogPushSender {
    async fn send_to_tokens(
        &self,
        tokens: &[String],
        title: &str,
        _body: &str,
        _data: &Value,
    ) -> ServiceResult<Vec<PushOutcome>> {
        info!("[mock push] '{}' to {} device(s)", title, tokens.len());
        Ok(tokens
            .iter()
            .map(|token| PushOutcome {
                token: token.clone(),
                status: PushStatus::Sent,
            })
            .collect())
    }

    async fn send_to_topic(
        &self,
        topic: &str,
        title: &str,
        _body: &str,
        _data: &Value,
    ) -> ServiceResult<()> {
        info!("[mock push] '{}' to topic {}", title, topic);
        Ok(())
    }

    async fn subscribe_topic(&self, _token: &str, topic: &str) -> ServiceResult<()> {
        warn!("[mock push] topic subscribe ignored: {topic}");
        Ok(())
    }

    async fn unsubscribe_topic(&self, _token: &str, topic: &str) -> ServiceResult<()> {
        warn!("[mock push] topic unsubscribe ignored: {topic}");
        Ok(())
    }
}
