use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::SmsSender;
use crate::error::{ServiceError, ServiceResult};

/// Single-segment GSM limit; alert texts are cut here before hitting the
/// gateway.
pub const SMS_MAX_LEN: usize = 160;

/// Truncates on a character boundary, appending an ellipsis when text was
/// dropped. Alert bodies are frequently Devanagari, so byte slicing is not
/// an option.
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let cut: String = message.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{cut}...")
}

/// Generic JSON SMS-gateway sender (MSG91-style endpoint).
pub struct SmsGatewaySender {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    sender_id: String,
}

impl SmsGatewaySender {
    pub fn new(api_url: String, api_key: String, sender_id: String) -> Self {
        SmsGatewaySender {
            client: reqwest::Client::new(),
            api_url,
            api_key,
            sender_id,
        }
    }
}

#[async_trait]
impl SmsSender for SmsGatewaySender {
    async fn send(&self, phone: &str, message: &str) -> ServiceResult<()> {
        let payload = json!({
            "sender": self.sender_id,
            "to": phone,
            "message": message,
        });

        let response = self
            .client
            .post(&self.api_url)
            .header("authkey", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::Provider(format!("sms request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ServiceError::Provider(format!(
                "sms gateway returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Development mock used when no gateway is configured.
pub struct LogSmsSender;

#[async_trait]
impl SmsSender for LogSmsSender {
    async fn send(&self, phone: &str, message: &str) -> ServiceResult<()> {
        info!("[mock sms] to {}: {}", phone, message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_message_untouched() {
        assert_eq!(truncate_message("short", 160), "short");
    }

    #[test]
    fn long_message_cut_with_ellipsis() {
        let long = "x".repeat(200);
        let cut = truncate_message(&long, 160);
        assert_eq!(cut.chars().count(), 160);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn truncation_respects_multibyte_boundaries() {
        // Devanagari characters are 3 bytes each; must count chars.
        let hindi = "लू की चेतावनी ".repeat(20);
        let cut = truncate_message(&hindi, 160);
        assert!(cut.chars().count() <= 160);
        assert!(cut.is_char_boundary(cut.len()));
    }
}
