//! ElevenLabs text-to-speech proxy: synthesis passthrough plus voice and
//! model listings with built-in fallbacks for unconfigured installs.

use crate::types::TtsRequest;
use crate::AppState;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

const ELEVENLABS_API: &str = "https://api.elevenlabs.io";

/// "Adam", the stock narration voice.
pub const DEFAULT_VOICE_ID: &str = "pNInz6obpgDQGcFmaJgB";
pub const DEFAULT_MODEL_ID: &str = "eleven_multilingual_v2";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voice {
    pub voice_id: String,
    pub name: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<VoiceLabels>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceLabels {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_case: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VoicesPage {
    #[serde(default)]
    voices: Vec<Voice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsModel {
    pub model_id: String,
    pub name: String,
    #[serde(default)]
    pub can_do_text_to_speech: bool,
    #[serde(default)]
    pub can_use_style: bool,
    #[serde(default)]
    pub can_use_speaker_boost: bool,
    #[serde(default)]
    pub language_codes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Where a listing came from: the upstream API or the built-in fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingSource {
    Api,
    Default,
}

impl ListingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingSource::Api => "api",
            ListingSource::Default => "default",
        }
    }
}

/// Sends text to ElevenLabs and returns the raw MPEG audio.
pub async fn synthesize(state: &Arc<AppState>, request: &TtsRequest) -> Result<Vec<u8>> {
    let api_key = state.config.load()?.models.elevenlabs.api_key;
    if api_key.is_empty() {
        return Err(anyhow!("ElevenLabs API key not configured"));
    }

    let voice_id = request.voice.as_deref().unwrap_or(DEFAULT_VOICE_ID);
    let model_id = request.model.as_deref().unwrap_or(DEFAULT_MODEL_ID);

    let _permit = state
        .outbound_limit
        .acquire()
        .await
        .expect("semaphore closed");

    let response = state
        .http_client
        .post(format!("{ELEVENLABS_API}/v1/text-to-speech/{voice_id}"))
        .header("Accept", "audio/mpeg")
        .header("xi-api-key", &api_key)
        .json(&json!({
            "text": request.text,
            "model_id": model_id,
            "voice_settings": {
                "stability": 0.5,
                "similarity_boost": 0.75,
                "style": 0.0,
                "use_speaker_boost": true,
            },
        }))
        .send()
        .await
        .map_err(|e| anyhow!("Failed to reach ElevenLabs: {}", e))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!("ElevenLabs API error ({}): {}", status, body);
        return Err(anyhow!("speech synthesis failed with status {}", status));
    }

    Ok(response.bytes().await?.to_vec())
}

/// Lists voices, sorted premade first then by name. Falls back to a small
/// built-in set when unconfigured or when the upstream call fails.
pub async fn list_voices(state: &Arc<AppState>) -> Vec<Voice> {
    let api_key = match state.config.load() {
        Ok(config) if !config.models.elevenlabs.api_key.is_empty() => {
            config.models.elevenlabs.api_key
        }
        _ => return default_voices(),
    };

    let response = state
        .http_client
        .get(format!("{ELEVENLABS_API}/v2/voices?page_size=100"))
        .header("xi-api-key", &api_key)
        .send()
        .await;

    let page: VoicesPage = match response {
        Ok(resp) if resp.status().is_success() => match resp.json().await {
            Ok(page) => page,
            Err(e) => {
                warn!("Failed to parse ElevenLabs voices: {}", e);
                return default_voices();
            }
        },
        Ok(resp) => {
            warn!("Failed to fetch ElevenLabs voices: {}", resp.status());
            return default_voices();
        }
        Err(e) => {
            warn!("Failed to reach ElevenLabs: {}", e);
            return default_voices();
        }
    };

    let mut voices = page.voices;
    sort_voices(&mut voices);
    voices
}

/// Premade voices come first, then professional/cloned/generated, then by name.
pub fn sort_voices(voices: &mut [Voice]) {
    fn category_rank(category: &str) -> usize {
        ["premade", "professional", "cloned", "generated"]
            .iter()
            .position(|c| *c == category)
            .unwrap_or(999)
    }
    voices.sort_by(|a, b| {
        category_rank(&a.category)
            .cmp(&category_rank(&b.category))
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// Lists TTS-capable models, falling back to the built-in catalog.
pub async fn list_models(state: &Arc<AppState>) -> (Vec<TtsModel>, ListingSource) {
    let api_key = match state.config.load() {
        Ok(config) if !config.models.elevenlabs.api_key.is_empty() => {
            config.models.elevenlabs.api_key
        }
        _ => return (default_models(), ListingSource::Default),
    };

    let response = state
        .http_client
        .get(format!("{ELEVENLABS_API}/v1/models"))
        .header("xi-api-key", &api_key)
        .send()
        .await;

    let models: Vec<TtsModel> = match response {
        Ok(resp) if resp.status().is_success() => match resp.json().await {
            Ok(models) => models,
            Err(e) => {
                warn!("Failed to parse ElevenLabs models: {}", e);
                return (default_models(), ListingSource::Default);
            }
        },
        Ok(resp) => {
            warn!("ElevenLabs models API error: {}", resp.status());
            return (default_models(), ListingSource::Default);
        }
        Err(e) => {
            warn!("Failed to reach ElevenLabs: {}", e);
            return (default_models(), ListingSource::Default);
        }
    };

    let tts_models = models
        .into_iter()
        .filter(|model| model.can_do_text_to_speech)
        .collect();
    (tts_models, ListingSource::Api)
}

pub fn default_voices() -> Vec<Voice> {
    vec![
        Voice {
            voice_id: DEFAULT_VOICE_ID.to_string(),
            name: "Adam".to_string(),
            category: "premade".to_string(),
            description: Some("Deep male voice".to_string()),
            labels: Some(VoiceLabels {
                gender: Some("male".to_string()),
                accent: Some("american".to_string()),
                use_case: Some("narration".to_string()),
                ..Default::default()
            }),
            preview_url: None,
        },
        Voice {
            voice_id: "EXAVITQu4vr4xnSDxMaL".to_string(),
            name: "Bella".to_string(),
            category: "premade".to_string(),
            description: Some("Soft female voice".to_string()),
            labels: Some(VoiceLabels {
                gender: Some("female".to_string()),
                accent: Some("american".to_string()),
                use_case: Some("conversational".to_string()),
                ..Default::default()
            }),
            preview_url: None,
        },
        Voice {
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            name: "Rachel".to_string(),
            category: "premade".to_string(),
            description: Some("Calm female voice".to_string()),
            labels: Some(VoiceLabels {
                gender: Some("female".to_string()),
                accent: Some("american".to_string()),
                use_case: Some("narration".to_string()),
                ..Default::default()
            }),
            preview_url: None,
        },
    ]
}

pub fn default_models() -> Vec<TtsModel> {
    vec![
        TtsModel {
            model_id: "eleven_multilingual_v2".to_string(),
            name: "Eleven Multilingual v2".to_string(),
            can_do_text_to_speech: true,
            can_use_style: true,
            can_use_speaker_boost: true,
            language_codes: ["en", "ja", "zh", "de", "hi", "fr", "ko", "pt", "it", "es", "pl", "ar"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            description: Some("Multilingual model optimized for diverse languages".to_string()),
        },
        TtsModel {
            model_id: "eleven_multilingual_v1".to_string(),
            name: "Eleven Multilingual v1".to_string(),
            can_do_text_to_speech: true,
            can_use_style: false,
            can_use_speaker_boost: true,
            language_codes: ["en", "de", "pl", "es", "fr", "it", "pt", "hi"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            description: Some("Legacy multilingual model".to_string()),
        },
        TtsModel {
            model_id: "eleven_monolingual_v1".to_string(),
            name: "Eleven English v1".to_string(),
            can_do_text_to_speech: true,
            can_use_style: false,
            can_use_speaker_boost: true,
            language_codes: vec!["en".to_string()],
            description: Some("English-only model with high quality".to_string()),
        },
        TtsModel {
            model_id: "eleven_turbo_v2".to_string(),
            name: "Eleven Turbo v2".to_string(),
            can_do_text_to_speech: true,
            can_use_style: false,
            can_use_speaker_boost: true,
            language_codes: vec!["en".to_string()],
            description: Some("Fast English model for low-latency applications".to_string()),
        },
        TtsModel {
            model_id: "eleven_turbo_v2_5".to_string(),
            name: "Eleven Turbo v2.5".to_string(),
            can_do_text_to_speech: true,
            can_use_style: true,
            can_use_speaker_boost: true,
            language_codes: vec!["en".to_string()],
            description: Some("Enhanced fast English model with style control".to_string()),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(name: &str, category: &str) -> Voice {
        Voice {
            voice_id: format!("id-{name}"),
            name: name.to_string(),
            category: category.to_string(),
            description: None,
            labels: None,
            preview_url: None,
        }
    }

    #[test]
    fn voices_sort_by_category_then_name() {
        let mut voices = vec![
            voice("Zoe", "cloned"),
            voice("Bella", "premade"),
            voice("Custom", "something-else"),
            voice("Adam", "premade"),
            voice("Pro", "professional"),
        ];
        sort_voices(&mut voices);
        let names: Vec<&str> = voices.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["Adam", "Bella", "Pro", "Zoe", "Custom"]);
    }

    #[test]
    fn default_models_are_all_tts_capable() {
        assert!(default_models().iter().all(|m| m.can_do_text_to_speech));
    }

    #[test]
    fn default_catalog_recommends_multilingual_v2_first() {
        let models = default_models();
        assert_eq!(models[0].model_id, DEFAULT_MODEL_ID);
        assert!(models[0].language_codes.contains(&"de".to_string()));
    }
}
