use anyhow::Result;
use chrono::FixedOffset;
use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub log_level: String,
    pub weather_api_url: String,
    pub weather_api_key: Option<String>,
    pub fcm_api_url: String,
    pub fcm_server_key: Option<String>,
    pub sms_api_url: Option<String>,
    pub sms_api_key: String,
    pub sms_sender_id: String,
    pub check_interval_minutes: u64,
    pub batch_limit: i64,
    pub worker_count: usize,
    pub call_timeout_secs: u64,
    pub alert_cooldown_hours: i64,
    pub local_offset: FixedOffset,
}

/// Offset of the service's wall clock from UTC, in whole minutes east.
/// Unparseable or out-of-range values fall back to IST.
fn parse_local_offset(raw: Option<String>) -> Option<FixedOffset> {
    raw?.parse::<i32>()
        .ok()
        .and_then(|minutes| FixedOffset::east_opt(minutes * 60))
}

const IST_OFFSET_MINUTES: i32 = 330;

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let db_host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
        let db_port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
        let db_name = env::var("DB_DATABASE").unwrap_or_else(|_| "kheti_sahayak".to_string());
        let db_user = env::var("DB_USER").unwrap_or_else(|_| "kheti".to_string());
        let db_pwd = env::var("DB_PWD").unwrap_or_else(|_| "kheti".to_string());

        let database_url = format!(
            "postgres://{}:{}@{}:{}/{}",
            db_user, db_pwd, db_host, db_port, db_name
        );

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let weather_api_url = env::var("WEATHER_API_URL")
            .unwrap_or_else(|_| "https://api.openweathermap.org/data/2.5/weather".to_string());
        let weather_api_key = env::var("WEATHER_API_KEY").ok().filter(|k| !k.is_empty());

        let fcm_api_url = env::var("FCM_API_URL")
            .unwrap_or_else(|_| "https://fcm.googleapis.com/fcm/send".to_string());
        let fcm_server_key = env::var("FCM_SERVER_KEY").ok().filter(|k| !k.is_empty());

        let sms_api_url = env::var("SMS_API_URL").ok().filter(|u| !u.is_empty());
        let sms_api_key = env::var("SMS_API_KEY").unwrap_or_default();
        let sms_sender_id = env::var("SMS_SENDER_ID").unwrap_or_else(|_| "KHETIS".to_string());

        let check_interval_minutes = env::var("ALERT_CHECK_INTERVAL_MINUTES")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);
        let batch_limit = env::var("ALERT_BATCH_LIMIT")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .unwrap_or(100);
        let worker_count = env::var("ALERT_WORKER_COUNT")
            .unwrap_or_else(|_| "8".to_string())
            .parse()
            .unwrap_or(8);
        let call_timeout_secs = env::var("ALERT_CALL_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);
        let alert_cooldown_hours = env::var("ALERT_COOLDOWN_HOURS")
            .unwrap_or_else(|_| "6".to_string())
            .parse()
            .unwrap_or(6);
        // Quiet hours and daily caps are interpreted at this fixed offset
        // from UTC. Defaults to IST (+05:30).
        let local_offset = parse_local_offset(env::var("LOCAL_UTC_OFFSET_MINUTES").ok())
            .or_else(|| FixedOffset::east_opt(IST_OFFSET_MINUTES * 60))
            .ok_or_else(|| anyhow::anyhow!("IST offset out of range"))?;

        Ok(Self {
            database_url,
            log_level,
            weather_api_url,
            weather_api_key,
            fcm_api_url,
            fcm_server_key,
            sms_api_url,
            sms_api_key,
            sms_sender_id,
            check_interval_minutes,
            batch_limit,
            worker_count,
            call_timeout_secs,
            alert_cooldown_hours,
            local_offset,
        })
    }
}
