//! City weather tool.
//!
//! With an OpenWeatherMap key configured it reports live conditions through
//! [`OpenWeatherClient`]. Without one it falls back to deterministic offline
//! data derived from a hash of the city name, so the agent loop can still be
//! driven end-to-end.

use async_trait::async_trait;
use tracing::warn;
use workagent_core::error::ToolError;
use workagent_core::tool::{Tool, ToolContext, ToolOutput};

use crate::openweather::{OpenWeatherClient, WeatherApiError};

enum Backend {
    Live(OpenWeatherClient),
    Offline,
}

pub struct CityWeatherTool {
    backend: Backend,
}

impl CityWeatherTool {
    /// Report live conditions from OpenWeatherMap.
    pub fn live(client: OpenWeatherClient) -> Self {
        Self {
            backend: Backend::Live(client),
        }
    }

    /// Report generated conditions without touching the network.
    pub fn offline() -> Self {
        Self {
            backend: Backend::Offline,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self.backend, Backend::Live(_))
    }
}

#[async_trait]
impl Tool for CityWeatherTool {
    fn name(&self) -> &str {
        "get_city_weather"
    }

    fn description(&self) -> &str {
        "Get the current weather for a city: temperature, feels-like temperature, conditions, humidity, pressure and wind speed. Accepts Chinese or English city names."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "City name, e.g. \"Beijing\", \"New York\", \"东京\""
                }
            },
            "required": ["city"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let city = arguments["city"].as_str().unwrap_or_default().trim();
        if city.is_empty() {
            return Err(ToolError::InvalidArguments(
                "city name must not be empty".into(),
            ));
        }

        let weather = match &self.backend {
            Backend::Offline => generate_mock_weather(city),
            Backend::Live(client) => match client.current(city, &ctx.cancel).await {
                Ok(weather) => weather,
                Err(WeatherApiError::Cancelled) => return Err(ToolError::Cancelled),
                Err(e) => {
                    warn!(
                        trace_id = %ctx.trace.id(),
                        call_id = %ctx.call_id,
                        city,
                        error = %e,
                        "Weather lookup failed"
                    );
                    return Err(ToolError::ExecutionFailed {
                        tool_name: self.name().to_string(),
                        reason: e.to_string(),
                    });
                }
            },
        };
        let data = serde_json::to_value(&weather)
            .map_err(|e| ToolError::Internal(format!("weather serialization: {e}")))?;

        Ok(ToolOutput {
            text: weather.summary(),
            data: Some(data),
        })
    }
}

/// Current conditions for one city, in metric units.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WeatherData {
    pub city: String,
    pub temperature_c: f64,
    pub feels_like_c: f64,
    pub conditions: String,
    pub humidity: u32,
    pub pressure_hpa: u32,
    pub wind_speed_ms: f64,
}

impl WeatherData {
    pub fn summary(&self) -> String {
        format!(
            "{}: {}, {:.1}°C (feels like {:.1}°C), humidity {}%, pressure {} hPa, wind {:.1} m/s",
            self.city,
            self.conditions,
            self.temperature_c,
            self.feels_like_c,
            self.humidity,
            self.pressure_hpa,
            self.wind_speed_ms
        )
    }
}

/// Deterministic stand-in weather derived from the city name.
fn generate_mock_weather(city: &str) -> WeatherData {
    let hash: u32 = city
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));

    let conditions_list = [
        "Clear skies",
        "Partly cloudy",
        "Overcast",
        "Light rain",
        "Heavy rain",
        "Thunderstorms",
        "Snow",
        "Foggy",
    ];

    let temperature = ((hash % 40) as f64) - 5.0; // -5 to 35°C
    let wind_speed = ((hash % 150) as f64) / 10.0;

    WeatherData {
        city: city.to_string(),
        temperature_c: temperature,
        feels_like_c: ((temperature - wind_speed * 0.3) * 10.0).round() / 10.0,
        conditions: conditions_list[(hash as usize / 7) % conditions_list.len()].to_string(),
        humidity: 30 + (hash % 60),
        pressure_hpa: 990 + (hash % 40),
        wind_speed_ms: wind_speed,
    }
}
