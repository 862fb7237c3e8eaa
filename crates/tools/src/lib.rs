//! Built-in tool implementations for workagent.
//!
//! The current time, a safe echo, and city weather. Weather is live when an
//! [`OpenWeatherClient`] is supplied and generated offline otherwise. The
//! tools are offered to the registry through [`builtin_source`].

pub mod openweather;
pub mod shell_echo;
pub mod time_now;
pub mod weather_lookup;

use workagent_core::registry::StaticSource;

pub use openweather::{OpenWeatherClient, WeatherApiError};
pub use shell_echo::ShellEchoTool;
pub use time_now::CurrentTimeTool;
pub use weather_lookup::{CityWeatherTool, WeatherData};

/// Name of the built-in tool source in discovery diagnostics.
pub const BUILTIN_SOURCE: &str = "builtin";

/// The built-in tools, in registration order, fully offline.
pub fn builtin_source() -> StaticSource {
    builtin_source_with(None)
}

/// The built-in tools, with live weather when `weather` is given.
pub fn builtin_source_with(weather: Option<OpenWeatherClient>) -> StaticSource {
    let weather_tool = match weather {
        Some(client) => CityWeatherTool::live(client),
        None => CityWeatherTool::offline(),
    };
    StaticSource::new(BUILTIN_SOURCE)
        .with_tool(CurrentTimeTool)
        .with_tool(ShellEchoTool)
        .with_tool(weather_tool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use workagent_core::ToolRegistry;

    #[test]
    fn builtin_tools_pass_discovery() {
        let source = builtin_source();
        let registry = ToolRegistry::discover(&[&source]).unwrap();
        assert_eq!(
            registry.names(),
            vec!["get_current_time", "shell_echo", "get_city_weather"]
        );
    }

    #[test]
    fn live_weather_keeps_registration_order() {
        let client = OpenWeatherClient::new(
            openweather::DEFAULT_BASE_URL,
            "key",
            Duration::from_secs(5),
        )
        .unwrap();
        let source = builtin_source_with(Some(client));
        let registry = ToolRegistry::discover(&[&source]).unwrap();
        assert_eq!(registry.names()[2], "get_city_weather");
    }
}
