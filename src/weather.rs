use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::error::{ServiceError, ServiceResult};
use crate::models::Observation;

/// External source of current weather readings.
#[async_trait]
pub trait ObservationProvider: Send + Sync {
    async fn fetch(&self, lat: f64, lon: f64) -> ServiceResult<Observation>;

    /// Best-effort fetch: falls back to a fixed benign observation when
    /// the provider is unreachable, so one bad upstream call never fails a
    /// whole scheduler run.
    async fn fetch_or_default(&self, lat: f64, lon: f64) -> Observation {
        match self.fetch(lat, lon).await {
            Ok(observation) => observation,
            Err(e) => {
                warn!("Weather fetch failed for ({lat}, {lon}): {e}, using fallback");
                Observation::fallback()
            }
        }
    }
}

/// OpenWeather current-conditions client. Without an API key it behaves
/// like the development mock and always serves the fallback observation.
pub struct OpenWeatherProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwmResponse {
    main: OwmMain,
    #[serde(default)]
    wind: Option<OwmWind>,
    #[serde(default)]
    rain: Option<OwmRain>,
    #[serde(default)]
    visibility: Option<f64>,
    #[serde(default)]
    weather: Vec<OwmWeather>,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct OwmWind {
    #[serde(default)]
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwmRain {
    #[serde(rename = "1h", default)]
    one_hour: Option<f64>,
    #[serde(rename = "3h", default)]
    three_hours: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmWeather {
    main: String,
}

impl OpenWeatherProvider {
    pub fn new(api_url: String, api_key: Option<String>) -> Self {
        OpenWeatherProvider {
            client: reqwest::Client::new(),
            api_url,
            api_key,
        }
    }
}

impl From<OwmResponse> for Observation {
    fn from(resp: OwmResponse) -> Self {
        Observation {
            temp: resp.main.temp,
            humidity: resp.main.humidity,
            // OpenWeather reports m/s; rules are in km/h.
            wind_speed: resp.wind.map(|w| w.speed).unwrap_or(0.0) * 3.6,
            precipitation: resp
                .rain
                .and_then(|r| r.one_hour.or(r.three_hours))
                .unwrap_or(0.0),
            visibility: resp.visibility.unwrap_or(10_000.0),
            days_without_rain: None,
            condition: resp
                .weather
                .into_iter()
                .next()
                .map(|w| w.main)
                .unwrap_or_else(|| "Clear".to_string()),
        }
    }
}

#[async_trait]
impl ObservationProvider for OpenWeatherProvider {
    async fn fetch(&self, lat: f64, lon: f64) -> ServiceResult<Observation> {
        let api_key = match &self.api_key {
            Some(key) => key,
            None => return Ok(Observation::fallback()),
        };

        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("appid", api_key.clone()),
                ("units", "metric".to_string()),
            ])
            .send()
            .await
            .map_err(|e| ServiceError::Provider(format!("weather request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ServiceError::Provider(format!(
                "weather API returned {}",
                response.status()
            )));
        }

        let body: OwmResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Provider(format!("weather response malformed: {e}")))?;
        Ok(body.into())
    }
}

/// Fixed-observation provider for tests and local development.
pub struct StaticProvider(pub Observation);

#[async_trait]
impl ObservationProvider for StaticProvider {
    async fn fetch(&self, _lat: f64, _lon: f64) -> ServiceResult<Observation> {
        Ok(self.0.clone())
    }
}

/// Provider that always fails, for exercising fallback paths.
pub struct UnreachableProvider;

#[async_trait]
impl ObservationProvider for UnreachableProvider {
    async fn fetch(&self, _lat: f64, _lon: f64) -> ServiceResult<Observation> {
        Err(ServiceError::Provider("provider unreachable".to_string()))
    }
}
