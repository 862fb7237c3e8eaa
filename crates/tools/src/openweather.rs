//! OpenWeatherMap client backing the city weather tool.
//!
//! Calls `GET {base_url}/weather?q=<city>&appid=<key>&units=metric`.
//! Connection errors and timeouts are retried; HTTP errors are not.
//! Every error message is scrubbed of the API key before it leaves this
//! module, since the key travels in the query string.

use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::weather_lookup::WeatherData;

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Why a lookup failed. Messages never contain the API key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WeatherApiError {
    #[error("weather service returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("weather service unreachable: {0}")]
    Network(String),

    #[error("unexpected weather response: {0}")]
    Decode(String),

    #[error("weather lookup cancelled")]
    Cancelled,
}

pub struct OpenWeatherClient {
    base_url: String,
    api_key: String,
    retries: u32,
    client: reqwest::Client,
}

impl OpenWeatherClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, WeatherApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(|e| WeatherApiError::Network(format!("HTTP client: {}", e.without_url())))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            retries: 2,
            client,
        })
    }

    /// Extra attempts after a connection error or timeout.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Current conditions for `city` in metric units.
    pub async fn current(
        &self,
        city: &str,
        cancel: &CancellationToken,
    ) -> Result<WeatherData, WeatherApiError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(WeatherApiError::Cancelled),
                result = self.fetch(city) => result,
            };

            match result {
                Err(WeatherApiError::Network(reason)) if attempt <= self.retries => {
                    warn!(city, attempt, %reason, "Weather request failed, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(WeatherApiError::Cancelled),
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                    }
                }
                other => return other.map_err(|e| self.scrub(e)),
            }
        }
    }

    async fn fetch(&self, city: &str) -> Result<WeatherData, WeatherApiError> {
        let url = format!("{}/weather", self.base_url);
        debug!(city, "Requesting current weather");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", city),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
            ])
            .send()
            .await
            .map_err(|e| WeatherApiError::Network(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| WeatherApiError::Network(e.without_url().to_string()))?;

        if !status.is_success() {
            // OpenWeatherMap reports failures as {"cod": "404", "message": "city not found"}
            let message = serde_json::from_str::<ApiFailure>(&body)
                .map(|f| f.message)
                .unwrap_or_else(|_| status.canonical_reason().unwrap_or("error").to_string());
            return Err(WeatherApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ApiWeather =
            serde_json::from_str(&body).map_err(|e| WeatherApiError::Decode(e.to_string()))?;
        parsed.into_weather(city)
    }

    fn scrub(&self, error: WeatherApiError) -> WeatherApiError {
        let key = self.api_key.as_str();
        if key.is_empty() {
            return error;
        }
        let clean = |s: String| s.replace(key, "[REDACTED]");
        match error {
            WeatherApiError::Status { status, message } => WeatherApiError::Status {
                status,
                message: clean(message),
            },
            WeatherApiError::Network(m) => WeatherApiError::Network(clean(m)),
            WeatherApiError::Decode(m) => WeatherApiError::Decode(clean(m)),
            WeatherApiError::Cancelled => WeatherApiError::Cancelled,
        }
    }
}

impl std::fmt::Debug for OpenWeatherClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenWeatherClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("retries", &self.retries)
            .finish()
    }
}

#[derive(Deserialize)]
struct ApiFailure {
    message: String,
}

#[derive(Deserialize)]
struct ApiWeather {
    #[serde(default)]
    name: Option<String>,
    main: ApiMain,
    #[serde(default)]
    weather: Vec<ApiCondition>,
    #[serde(default)]
    wind: Option<ApiWind>,
}

#[derive(Deserialize)]
struct ApiMain {
    temp: f64,
    feels_like: f64,
    humidity: u32,
    pressure: u32,
}

#[derive(Deserialize)]
struct ApiCondition {
    description: String,
}

#[derive(Deserialize)]
struct ApiWind {
    speed: f64,
}

impl ApiWeather {
    fn into_weather(self, requested: &str) -> Result<WeatherData, WeatherApiError> {
        let conditions = self
            .weather
            .into_iter()
            .next()
            .map(|c| c.description)
            .ok_or_else(|| WeatherApiError::Decode("no weather conditions in response".into()))?;

        Ok(WeatherData {
            city: self
                .name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| requested.to_string()),
            temperature_c: self.main.temp,
            feels_like_c: self.main.feels_like,
            conditions,
            humidity: self.main.humidity,
            pressure_hpa: self.main.pressure,
            wind_speed_ms: self.wind.map_or(0.0, |w| w.speed),
        })
    }
}
