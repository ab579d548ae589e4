use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use search_gateway::{
    config::{ConfigStore, SettingsUpdate, DEFAULT_CONFIG_FILE},
    discover::{self, DiscoverMode},
    mask::mask_field_value,
    providers, search, tts, types::*, weather, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path =
        env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    info!("Starting search gateway");
    info!("Config file: {}", config_path);

    let http_client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let config = ConfigStore::new(config_path);
    info!("SearxNG URL: {}", config.searxng_endpoint());

    let state = Arc::new(AppState::new(config, http_client));

    let app = Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/api/search", post(search_handler))
        .route("/api/discover", get(discover_handler))
        .route("/api/weather", post(weather_handler))
        .route(
            "/api/config",
            get(get_config_handler).post(update_config_handler),
        )
        .route("/api/tts", post(tts_handler))
        .route("/api/tts/voices", get(tts_voices_handler))
        .route("/api/tts/models", get(tts_models_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Search gateway listening on http://0.0.0.0:{}", port);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "search-gateway",
        "version": "0.1.0"
    }))
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, (StatusCode, Json<ErrorResponse>)> {
    let options = search::SearchOptions {
        engines: request.engines,
        pageno: request.pageno,
        language: request.language,
    };
    match search::search_searxng(&state, &request.query, options).await {
        Ok(output) => Ok(Json(SearchResponse {
            results: output.results,
            suggestions: output.suggestions,
        })),
        Err(e) => {
            error!("Search error: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "An error has occurred".to_string(),
                }),
            ))
        }
    }
}

#[derive(Debug, Deserialize)]
struct DiscoverQuery {
    topic: Option<String>,
    language: Option<String>,
    mode: Option<String>,
}

async fn discover_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DiscoverQuery>,
) -> Result<Json<DiscoverResponse>, (StatusCode, Json<serde_json::Value>)> {
    let topic = query.topic.as_deref().unwrap_or("tech");
    let language = query.language.as_deref().unwrap_or("en");
    let mode = query.mode.as_deref().unwrap_or("normal");

    let Some(mode) = DiscoverMode::parse(mode) else {
        return Err(bad_discover_request("Unknown mode."));
    };
    if discover::topic_sources(language, topic).is_none() {
        return Err(bad_discover_request("Unknown topic or language."));
    }

    match discover::discover(&state, language, topic, mode).await {
        Ok(blogs) => Ok(Json(DiscoverResponse { blogs })),
        Err(e) => {
            error!("An error occurred in discover route: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "message": "An error has occurred",
                    "blogs": [],
                })),
            ))
        }
    }
}

fn bad_discover_request(message: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "message": message, "blogs": [] })),
    )
}

async fn weather_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WeatherRequest>,
) -> Result<Json<Weather>, (StatusCode, Json<MessageResponse>)> {
    if !weather::valid_coordinates(request.lat, request.lng) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(MessageResponse {
                message: "Invalid request.".to_string(),
            }),
        ));
    }

    match weather::current_weather(&state, &request).await {
        Ok(weather) => Ok(Json(weather)),
        Err(e) => {
            error!("An error occurred while getting weather: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(MessageResponse {
                    message: "An error has occurred.".to_string(),
                }),
            ))
        }
    }
}

async fn get_config_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<MessageResponse>)> {
    let config = state.config.load().map_err(|e| {
        error!("An error occurred while getting config: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(MessageResponse {
                message: "An error occurred while getting config".to_string(),
            }),
        )
    })?;

    let (chat_providers, embedding_providers) = tokio::join!(
        providers::available_chat_model_providers(&config, &state.http_client),
        providers::available_embedding_model_providers(&config, &state.http_client),
    );

    let models = &config.models;
    // Secrets are masked before leaving the process
    Ok(Json(json!({
        "chatModelProviders": chat_providers,
        "embeddingModelProviders": embedding_providers,
        "openaiApiKey": mask_field_value(&models.openai.api_key, "openaiApiKey"),
        "groqApiKey": mask_field_value(&models.groq.api_key, "groqApiKey"),
        "anthropicApiKey": mask_field_value(&models.anthropic.api_key, "anthropicApiKey"),
        "geminiApiKey": mask_field_value(&models.gemini.api_key, "geminiApiKey"),
        "deepseekApiKey": mask_field_value(&models.deepseek.api_key, "deepseekApiKey"),
        "aimlApiKey": mask_field_value(&models.aimlapi.api_key, "aimlApiKey"),
        "elevenLabsApiKey": mask_field_value(&models.elevenlabs.api_key, "elevenLabsApiKey"),
        "ollamaApiUrl": mask_field_value(&models.ollama.api_url, "ollamaApiUrl"),
        "ollamaApiKey": mask_field_value(&models.ollama.api_key, "ollamaApiKey"),
        "ollama2ApiUrl": mask_field_value(&models.ollama2.api_url, "ollama2ApiUrl"),
        "ollama2ApiKey": mask_field_value(&models.ollama2.api_key, "ollama2ApiKey"),
        "lmStudioApiUrl": mask_field_value(&models.lm_studio.api_url, "lmStudioApiUrl"),
        "vllmApiUrl": mask_field_value(&models.vllm.api_url, "vllmApiUrl"),
        "vllmApiKey": mask_field_value(&models.vllm.api_key, "vllmApiKey"),
        "customOpenaiApiUrl": mask_field_value(&models.custom_openai.api_url, "customOpenaiApiUrl"),
        "customOpenaiApiKey": mask_field_value(&models.custom_openai.api_key, "customOpenaiApiKey"),
        "customOpenaiModelName": models.custom_openai.model_name.clone(),
        "searxngApiUrl": mask_field_value(&config.api_endpoints.searxng, "searxngApiUrl"),
    })))
}

async fn update_config_handler(
    State(state): State<Arc<AppState>>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<MessageResponse>)> {
    match state.config.update(update.into_partial()) {
        Ok(()) => Ok(Json(MessageResponse {
            message: "Config updated".to_string(),
        })),
        Err(e) => {
            error!("An error occurred while updating config: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(MessageResponse {
                    message: "An error occurred while updating config".to_string(),
                }),
            ))
        }
    }
}

async fn tts_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TtsRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    if request.text.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Text is required".to_string(),
            }),
        ));
    }

    let has_key = state
        .config
        .load()
        .map(|c| !c.models.elevenlabs.api_key.is_empty())
        .unwrap_or(false);
    if !has_key {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "ElevenLabs API key not configured".to_string(),
            }),
        ));
    }

    match tts::synthesize(&state, &request).await {
        Ok(audio) => Ok((
            [
                (header::CONTENT_TYPE, HeaderValue::from_static("audio/mpeg")),
                (
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("public, max-age=3600"),
                ),
                (header::ACCEPT_RANGES, HeaderValue::from_static("bytes")),
            ],
            audio,
        )),
        Err(e) => {
            error!("TTS API error: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to generate speech".to_string(),
                }),
            ))
        }
    }
}

async fn tts_voices_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let voices = tts::list_voices(&state).await;
    Json(json!({ "voices": voices }))
}

async fn tts_models_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let (models, source) = tts::list_models(&state).await;
    let message = match source {
        tts::ListingSource::Api => "Models loaded from ElevenLabs API",
        tts::ListingSource::Default => "Using default models",
    };
    Json(json!({
        "models": models,
        "source": source.as_str(),
        "message": message,
    }))
}
