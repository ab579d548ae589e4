use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub engines: Option<Vec<String>>,
    #[serde(default)]
    pub pageno: Option<u32>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DiscoverResponse {
    pub blogs: Vec<SearchResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasureUnit {
    Imperial,
    Metric,
}

impl std::fmt::Display for MeasureUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeasureUnit::Imperial => write!(f, "Imperial"),
            MeasureUnit::Metric => write!(f, "Metric"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherRequest {
    pub lat: f64,
    pub lng: f64,
    pub measure_unit: MeasureUnit,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Weather {
    pub temperature: f64,
    pub condition: String,
    pub humidity: f64,
    pub wind_speed: f64,
    pub icon: String,
    pub temperature_unit: char,
    pub wind_speed_unit: String,
}

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    pub text: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// SearxNG API types
#[derive(Debug, Deserialize)]
pub struct SearxngResponse {
    #[serde(default)]
    pub results: Vec<SearxngResult>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearxngResult {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub img_src: Option<String>,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}
