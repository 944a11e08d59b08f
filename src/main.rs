use std::sync::Arc;
use std::time::Duration;

use kheti_alerts::channels::{
    FcmPushSender, LogPushSender, LogSmsSender, PushSender, SmsGatewaySender, SmsSender,
};
use kheti_alerts::config::AppConfig;
use kheti_alerts::db;
use kheti_alerts::dispatcher::NotificationDispatcher;
use kheti_alerts::registry::SubscriptionRegistry;
use kheti_alerts::scheduler::AlertScheduler;
use kheti_alerts::weather::OpenWeatherProvider;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = AppConfig::load()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    info!("Starting Kheti Sahayak Weather Alert Service...");

    // Init DB
    let pool = db::init_pool(&config.database_url).await?;
    info!("Connected to database");
    db::run_migrations(&pool).await?;

    let provider = Arc::new(OpenWeatherProvider::new(
        config.weather_api_url.clone(),
        config.weather_api_key.clone(),
    ));
    if config.weather_api_key.is_none() {
        warn!("WEATHER_API_KEY not set, observations will use the fallback reading");
    }

    let push: Arc<dyn PushSender> = match &config.fcm_server_key {
        Some(key) => Arc::new(FcmPushSender::new(config.fcm_api_url.clone(), key.clone())),
        None => {
            warn!("FCM_SERVER_KEY not set, push notifications run in mock mode");
            Arc::new(LogPushSender)
        }
    };

    let sms: Arc<dyn SmsSender> = match &config.sms_api_url {
        Some(url) => Arc::new(SmsGatewaySender::new(
            url.clone(),
            config.sms_api_key.clone(),
            config.sms_sender_id.clone(),
        )),
        None => {
            warn!("SMS_API_URL not set, SMS runs in mock mode");
            Arc::new(LogSmsSender)
        }
    };

    let registry = SubscriptionRegistry::new(pool.clone());
    let dispatcher = NotificationDispatcher::new(
        pool.clone(),
        registry.clone(),
        push,
        sms,
        Duration::from_secs(config.call_timeout_secs),
    );

    let scheduler = AlertScheduler::new(&config, registry, dispatcher, provider);
    scheduler.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping scheduler");
    scheduler.stop();

    Ok(())
}
