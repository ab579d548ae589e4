//! Model discovery for the settings surface: which chat/embedding providers
//! are currently usable, and which models they offer. Hosted providers are
//! key-gated with a static catalog; local/self-hosted ones are probed over
//! HTTP and contribute nothing when unreachable.

use crate::config::Config;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModelSummary {
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

impl ModelSummary {
    fn new(name: &str, display_name: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
        }
    }
}

pub type ProviderModels = BTreeMap<String, Vec<ModelSummary>>;

#[derive(Debug, Deserialize)]
struct OpenAiModelList {
    #[serde(default)]
    data: Vec<OpenAiModel>,
}

#[derive(Debug, Deserialize)]
struct OpenAiModel {
    id: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTagList {
    #[serde(default)]
    models: Vec<OllamaTag>,
}

#[derive(Debug, Deserialize)]
struct OllamaTag {
    name: String,
}

pub async fn available_chat_model_providers(
    config: &Config,
    client: &reqwest::Client,
) -> ProviderModels {
    let mut providers = ProviderModels::new();

    if !config.models.openai.api_key.is_empty() {
        providers.insert(
            "openai".to_string(),
            vec![
                ModelSummary::new("gpt-4o", "GPT-4 omni"),
                ModelSummary::new("gpt-4o-mini", "GPT-4 omni mini"),
                ModelSummary::new("gpt-4-turbo", "GPT-4 turbo"),
                ModelSummary::new("gpt-3.5-turbo", "GPT-3.5 turbo"),
            ],
        );
    }
    if !config.models.groq.api_key.is_empty() {
        providers.insert(
            "groq".to_string(),
            vec![
                ModelSummary::new("llama-3.3-70b-versatile", "Llama 3.3 70B"),
                ModelSummary::new("llama-3.1-8b-instant", "Llama 3.1 8B"),
                ModelSummary::new("mixtral-8x7b-32768", "Mixtral 8x7B"),
            ],
        );
    }
    if !config.models.anthropic.api_key.is_empty() {
        providers.insert(
            "anthropic".to_string(),
            vec![
                ModelSummary::new("claude-3-5-sonnet-20241022", "Claude 3.5 Sonnet"),
                ModelSummary::new("claude-3-5-haiku-20241022", "Claude 3.5 Haiku"),
            ],
        );
    }
    if !config.models.gemini.api_key.is_empty() {
        providers.insert(
            "gemini".to_string(),
            vec![
                ModelSummary::new("gemini-1.5-pro", "Gemini 1.5 Pro"),
                ModelSummary::new("gemini-1.5-flash", "Gemini 1.5 Flash"),
            ],
        );
    }
    if !config.models.deepseek.api_key.is_empty() {
        providers.insert(
            "deepseek".to_string(),
            vec![
                ModelSummary::new("deepseek-chat", "DeepSeek Chat"),
                ModelSummary::new("deepseek-reasoner", "DeepSeek Reasoner"),
            ],
        );
    }
    if !config.models.aimlapi.api_key.is_empty() {
        providers.insert(
            "aimlapi".to_string(),
            vec![ModelSummary::new("gpt-4o", "GPT-4 omni")],
        );
    }
    if !config.models.custom_openai.api_url.is_empty()
        && !config.models.custom_openai.model_name.is_empty()
    {
        providers.insert(
            "custom_openai".to_string(),
            vec![ModelSummary::new(
                &config.models.custom_openai.model_name,
                &config.models.custom_openai.model_name,
            )],
        );
    }

    let (ollama, ollama2, vllm, lm_studio) = tokio::join!(
        ollama_models(
            client,
            &config.models.ollama.api_url,
            &config.models.ollama.api_key
        ),
        ollama_models(
            client,
            &config.models.ollama2.api_url,
            &config.models.ollama2.api_key
        ),
        openai_compatible_models(
            client,
            &config.models.vllm.api_url,
            &config.models.vllm.api_key
        ),
        openai_compatible_models(client, &config.models.lm_studio.api_url, ""),
    );

    for (key, models) in [
        ("ollama", ollama),
        ("ollama2", ollama2),
        ("vllm", vllm),
        ("lm_studio", lm_studio),
    ] {
        if !models.is_empty() {
            providers.insert(key.to_string(), models);
        }
    }

    providers
}

pub async fn available_embedding_model_providers(
    config: &Config,
    client: &reqwest::Client,
) -> ProviderModels {
    let mut providers = ProviderModels::new();

    if !config.models.openai.api_key.is_empty() {
        providers.insert(
            "openai".to_string(),
            vec![
                ModelSummary::new("text-embedding-3-small", "Text embedding 3 small"),
                ModelSummary::new("text-embedding-3-large", "Text embedding 3 large"),
            ],
        );
    }

    let (ollama, vllm, lm_studio) = tokio::join!(
        ollama_models(
            client,
            &config.models.ollama.api_url,
            &config.models.ollama.api_key
        ),
        openai_compatible_models(
            client,
            &config.models.vllm.api_url,
            &config.models.vllm.api_key
        ),
        openai_compatible_models(client, &config.models.lm_studio.api_url, ""),
    );

    for (key, models) in [("ollama", ollama), ("vllm", vllm), ("lm_studio", lm_studio)] {
        if !models.is_empty() {
            providers.insert(key.to_string(), models);
        }
    }

    providers
}

/// Lists models from an OpenAI-compatible `/v1/models` endpoint. Any failure
/// yields an empty list so one dead endpoint cannot break the settings page.
async fn openai_compatible_models(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
) -> Vec<ModelSummary> {
    if base_url.is_empty() {
        return Vec::new();
    }
    let url = format!("{}/v1/models", base_url.trim_end_matches('/'));

    let mut request = client.get(&url).timeout(PROBE_TIMEOUT);
    if !api_key.is_empty() {
        request = request.bearer_auth(api_key);
    }

    let list: OpenAiModelList = match request.send().await {
        Ok(resp) if resp.status().is_success() => match resp.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Failed to parse model list from {}: {}", url, e);
                return Vec::new();
            }
        },
        Ok(resp) => {
            warn!("Model listing at {} returned {}", url, resp.status());
            return Vec::new();
        }
        Err(e) => {
            warn!("Failed to reach {}: {}", url, e);
            return Vec::new();
        }
    };

    list.data
        .into_iter()
        .map(|model| ModelSummary {
            display_name: model.id.clone(),
            name: model.id,
        })
        .collect()
}

/// Lists installed models from an Ollama instance via `/api/tags`.
async fn ollama_models(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
) -> Vec<ModelSummary> {
    if base_url.is_empty() {
        return Vec::new();
    }
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));

    let mut request = client.get(&url).timeout(PROBE_TIMEOUT);
    if !api_key.is_empty() {
        request = request.bearer_auth(api_key);
    }

    let list: OllamaTagList = match request.send().await {
        Ok(resp) if resp.status().is_success() => match resp.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Failed to parse Ollama tags from {}: {}", url, e);
                return Vec::new();
            }
        },
        Ok(resp) => {
            warn!("Ollama tags at {} returned {}", url, resp.status());
            return Vec::new();
        }
        Err(e) => {
            warn!("Failed to reach {}: {}", url, e);
            return Vec::new();
        }
    };

    list.models
        .into_iter()
        .map(|tag| ModelSummary {
            display_name: tag.name.clone(),
            name: tag.name,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn key_gated_providers_require_a_key() {
        let config = Config::default();
        let client = reqwest::Client::new();
        let providers = available_chat_model_providers(&config, &client).await;
        assert!(providers.is_empty());
    }

    #[tokio::test]
    async fn configured_keys_surface_static_catalogs() {
        let mut config = Config::default();
        config.models.openai.api_key = "sk-test".to_string();
        config.models.anthropic.api_key = "ant-test".to_string();
        let client = reqwest::Client::new();

        let providers = available_chat_model_providers(&config, &client).await;
        assert!(providers.contains_key("openai"));
        assert!(providers.contains_key("anthropic"));
        assert!(!providers.contains_key("groq"));

        let embeddings = available_embedding_model_providers(&config, &client).await;
        assert!(embeddings.contains_key("openai"));
    }

    #[tokio::test]
    async fn custom_openai_needs_url_and_model_name() {
        let mut config = Config::default();
        config.models.custom_openai.api_url = "http://localhost:9000".to_string();
        let client = reqwest::Client::new();
        let providers = available_chat_model_providers(&config, &client).await;
        assert!(!providers.contains_key("custom_openai"));

        config.models.custom_openai.model_name = "my-model".to_string();
        let providers = available_chat_model_providers(&config, &client).await;
        let models = &providers["custom_openai"];
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "my-model");
    }
}
