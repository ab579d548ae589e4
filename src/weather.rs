use crate::types::{MeasureUnit, Weather, WeatherRequest};
use crate::AppState;
use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

pub const WEATHER_CACHE_TTL: Duration = Duration::from_secs(10 * 60);
pub const WEATHER_CACHE_MAX_SIZE: usize = 100;

const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    reason: Option<String>,
    current: Option<CurrentConditions>,
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    weather_code: u32,
    temperature_2m: f64,
    is_day: u8,
    relative_humidity_2m: f64,
    wind_speed_10m: f64,
}

pub fn valid_coordinates(lat: f64, lng: f64) -> bool {
    lat.is_finite() && lng.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}

/// Fingerprint for the weather cache. Coordinates are rounded to two decimals
/// so nearby lookups share an entry.
pub fn cache_key(request: &WeatherRequest) -> String {
    format!(
        "{:.2}_{:.2}_{}_{}",
        request.lat,
        request.lng,
        request.measure_unit,
        request.language.as_deref().unwrap_or("en")
    )
}

/// Current conditions for a location, cached for ten minutes per
/// location/unit/language combination.
pub async fn current_weather(state: &Arc<AppState>, request: &WeatherRequest) -> Result<Weather> {
    let key = cache_key(request);
    if let Some(entry) = state.weather_cache.get(&key) {
        if state.weather_cache.is_fresh(&entry) {
            debug!("weather cache hit for {}", key);
            return Ok(entry.data);
        }
    }

    state.weather_cache.maybe_sweep();

    let imperial = request.measure_unit == MeasureUnit::Imperial;
    let mut params: Vec<(&str, String)> = vec![
        ("latitude", request.lat.to_string()),
        ("longitude", request.lng.to_string()),
        (
            "current",
            "weather_code,temperature_2m,is_day,relative_humidity_2m,wind_speed_10m".to_string(),
        ),
        ("timezone", "auto".to_string()),
    ];
    if imperial {
        params.push(("temperature_unit", "fahrenheit".to_string()));
        params.push(("wind_speed_unit", "mph".to_string()));
    }

    let _permit = state
        .outbound_limit
        .acquire()
        .await
        .expect("semaphore closed");

    let response: OpenMeteoResponse = state
        .http_client
        .get(OPEN_METEO_URL)
        .query(&params)
        .send()
        .await
        .map_err(|e| anyhow!("Failed to reach Open-Meteo: {}", e))?
        .json()
        .await
        .map_err(|e| anyhow!("Failed to parse Open-Meteo response: {}", e))?;

    if response.error {
        error!(
            "Error fetching weather data: {}",
            response.reason.as_deref().unwrap_or("unknown")
        );
        return Err(anyhow!("Open-Meteo reported an error"));
    }
    let current = response
        .current
        .ok_or_else(|| anyhow!("Open-Meteo response missing current conditions"))?;

    let german = request.language.as_deref() == Some("de");
    let (icon, condition) = describe(current.weather_code, current.is_day == 1, german);

    let weather = Weather {
        temperature: current.temperature_2m,
        condition: condition.to_string(),
        humidity: current.relative_humidity_2m,
        wind_speed: current.wind_speed_10m,
        icon,
        temperature_unit: if imperial { 'F' } else { 'C' },
        wind_speed_unit: if imperial { "mph" } else { "m/s" }.to_string(),
    };

    state.weather_cache.insert(key, weather.clone());
    Ok(weather)
}

/// Maps a WMO weather code to an icon name and a localized condition label.
fn describe(code: u32, is_day: bool, german: bool) -> (String, &'static str) {
    let dn = if is_day { "day" } else { "night" };
    let (icon, en, de) = match code {
        0 => (format!("clear-{dn}"), "Clear", "Klar"),
        1 => (format!("cloudy-1-{dn}"), "Mainly Clear", "Überwiegend klar"),
        2 => (format!("cloudy-1-{dn}"), "Partly Cloudy", "Teilweise bewölkt"),
        3 => (format!("cloudy-1-{dn}"), "Cloudy", "Bewölkt"),
        45 | 48 => (format!("fog-{dn}"), "Fog", "Nebel"),
        51 => (format!("rainy-1-{dn}"), "Light Drizzle", "Leichter Sprühregen"),
        53 => (format!("rainy-1-{dn}"), "Moderate Drizzle", "Mäßiger Sprühregen"),
        55 => (format!("rainy-1-{dn}"), "Dense Drizzle", "Dichter Sprühregen"),
        56 => (
            format!("frost-{dn}"),
            "Light Freezing Drizzle",
            "Leichter Eisregen",
        ),
        57 => (
            format!("frost-{dn}"),
            "Dense Freezing Drizzle",
            "Dichter Eisregen",
        ),
        61 => (format!("rainy-2-{dn}"), "Slight Rain", "Leichter Regen"),
        63 => (format!("rainy-2-{dn}"), "Moderate Rain", "Mäßiger Regen"),
        65 => (format!("rainy-2-{dn}"), "Heavy Rain", "Starker Regen"),
        66 => (
            "rain-and-sleet-mix".to_string(),
            "Light Freezing Rain",
            "Leichter Eisregen",
        ),
        67 => (
            "rain-and-sleet-mix".to_string(),
            "Heavy Freezing Rain",
            "Starker Eisregen",
        ),
        71 => (format!("snowy-2-{dn}"), "Slight Snow Fall", "Leichter Schneefall"),
        73 => (format!("snowy-2-{dn}"), "Moderate Snow Fall", "Mäßiger Schneefall"),
        75 => (format!("snowy-2-{dn}"), "Heavy Snow Fall", "Starker Schneefall"),
        77 => (format!("snowy-1-{dn}"), "Snow", "Schnee"),
        80 => (
            format!("rainy-3-{dn}"),
            "Slight Rain Showers",
            "Leichte Regenschauer",
        ),
        81 => (
            format!("rainy-3-{dn}"),
            "Moderate Rain Showers",
            "Mäßige Regenschauer",
        ),
        82 => (
            format!("rainy-3-{dn}"),
            "Heavy Rain Showers",
            "Starke Regenschauer",
        ),
        85 => (
            format!("snowy-3-{dn}"),
            "Slight Snow Showers",
            "Leichte Schneeschauer",
        ),
        86 => (
            format!("snowy-3-{dn}"),
            "Moderate Snow Showers",
            "Mäßige Schneeschauer",
        ),
        87 => (
            format!("snowy-3-{dn}"),
            "Heavy Snow Showers",
            "Starke Schneeschauer",
        ),
        95 => (
            format!("scattered-thunderstorms-{dn}"),
            "Thunderstorm",
            "Gewitter",
        ),
        96 => (
            "severe-thunderstorm".to_string(),
            "Thunderstorm with Slight Hail",
            "Gewitter mit leichtem Hagel",
        ),
        99 => (
            "severe-thunderstorm".to_string(),
            "Thunderstorm with Heavy Hail",
            "Gewitter mit starkem Hagel",
        ),
        _ => (format!("clear-{dn}"), "Clear", "Klar"),
    };
    (icon, if german { de } else { en })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(lat: f64, lng: f64, unit: MeasureUnit, language: Option<&str>) -> WeatherRequest {
        WeatherRequest {
            lat,
            lng,
            measure_unit: unit,
            language: language.map(str::to_string),
        }
    }

    #[test]
    fn cache_key_matches_fingerprint_format() {
        let req = request(52.5163, 13.3777, MeasureUnit::Metric, Some("de"));
        assert_eq!(cache_key(&req), "52.52_13.38_Metric_de");

        let req = request(40.7128, -74.006, MeasureUnit::Imperial, None);
        assert_eq!(cache_key(&req), "40.71_-74.01_Imperial_en");
    }

    #[test]
    fn coordinate_validation() {
        assert!(valid_coordinates(0.0, 0.0));
        assert!(valid_coordinates(-90.0, 180.0));
        assert!(!valid_coordinates(91.0, 0.0));
        assert!(!valid_coordinates(0.0, -181.0));
        assert!(!valid_coordinates(f64::NAN, 0.0));
    }

    #[test]
    fn clear_sky_day_and_night() {
        assert_eq!(describe(0, true, false), ("clear-day".to_string(), "Clear"));
        assert_eq!(describe(0, false, false), ("clear-night".to_string(), "Clear"));
    }

    #[test]
    fn condition_labels_are_localized() {
        assert_eq!(describe(95, true, true).1, "Gewitter");
        assert_eq!(describe(95, true, false).1, "Thunderstorm");
        assert_eq!(describe(45, false, true), ("fog-night".to_string(), "Nebel"));
    }

    #[test]
    fn fixed_icons_ignore_day_night() {
        assert_eq!(describe(66, true, false).0, "rain-and-sleet-mix");
        assert_eq!(describe(99, false, false).0, "severe-thunderstorm");
    }

    #[test]
    fn unknown_codes_fall_back_to_clear() {
        assert_eq!(describe(42, true, false), ("clear-day".to_string(), "Clear"));
    }
}
