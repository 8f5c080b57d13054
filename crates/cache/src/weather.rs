use serde::{Deserialize, Serialize};

/// Key prefix for the cached current-weather entry.
pub const WEATHER_KEY_PREFIX: &str = "current_weather";

/// Conditions as reported by the forecast provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f64>,
}

/// The value written to the cache each refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherResult {
    pub city: String,
    pub weather: Weather,
}
