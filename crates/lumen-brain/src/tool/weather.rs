use lumen_core::types::ToolDefinition;
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::json;

pub const WEATHER_OPTIONS: [&str; 5] = ["sunny", "cloudy", "rainy", "snowy", "windy"];

#[derive(Debug, Deserialize)]
pub struct WeatherArgs {
    pub city: String,
}

pub(crate) fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "getWeatherInformation".to_string(),
        description: "show the weather in a given city to the user".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "city": { "type": "string" }
            },
            "required": ["city"]
        }),
    }
}

/// Pick a weather condition at random; the city is not consulted.
pub fn current_weather(_args: &WeatherArgs) -> &'static str {
    WEATHER_OPTIONS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("sunny")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weather_is_one_of_the_options() {
        let args = WeatherArgs { city: "Oslo".into() };
        for _ in 0..20 {
            assert!(WEATHER_OPTIONS.contains(&current_weather(&args)));
        }
    }
}
