use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use toml::Value;

pub const DEFAULT_CONFIG_FILE: &str = "config.toml";
const DEFAULT_SEARXNG_URL: &str = "http://localhost:4000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// Field and table names mirror the on-disk config.toml so existing files keep
// working unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "GENERAL", default)]
    pub general: GeneralConfig,
    #[serde(rename = "MODELS", default)]
    pub models: ModelsConfig,
    #[serde(rename = "API_ENDPOINTS", default)]
    pub api_endpoints: ApiEndpoints,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(rename = "SIMILARITY_MEASURE", default)]
    pub similarity_measure: String,
    #[serde(rename = "KEEP_ALIVE", default)]
    pub keep_alive: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(rename = "OPENAI", default)]
    pub openai: KeyedProvider,
    #[serde(rename = "GROQ", default)]
    pub groq: KeyedProvider,
    #[serde(rename = "ANTHROPIC", default)]
    pub anthropic: KeyedProvider,
    #[serde(rename = "GEMINI", default)]
    pub gemini: KeyedProvider,
    #[serde(rename = "OLLAMA", default)]
    pub ollama: EndpointProvider,
    #[serde(rename = "OLLAMA_2", default)]
    pub ollama2: EndpointProvider,
    #[serde(rename = "DEEPSEEK", default)]
    pub deepseek: KeyedProvider,
    #[serde(rename = "AIMLAPI", default)]
    pub aimlapi: KeyedProvider,
    #[serde(rename = "LM_STUDIO", default)]
    pub lm_studio: UrlProvider,
    #[serde(rename = "CUSTOM_OPENAI", default)]
    pub custom_openai: CustomOpenaiProvider,
    #[serde(rename = "ELEVENLABS", default)]
    pub elevenlabs: KeyedProvider,
    #[serde(rename = "VLLM", default)]
    pub vllm: EndpointProvider,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyedProvider {
    #[serde(rename = "API_KEY", default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointProvider {
    #[serde(rename = "API_URL", default)]
    pub api_url: String,
    #[serde(rename = "API_KEY", default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UrlProvider {
    #[serde(rename = "API_URL", default)]
    pub api_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomOpenaiProvider {
    #[serde(rename = "API_URL", default)]
    pub api_url: String,
    #[serde(rename = "API_KEY", default)]
    pub api_key: String,
    #[serde(rename = "MODEL_NAME", default)]
    pub model_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiEndpoints {
    #[serde(rename = "SEARXNG", default)]
    pub searxng: String,
}

/// Handle on the TOML configuration file. The file is re-read on every access
/// so settings saved through the API take effect without a restart.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Config, ConfigError> {
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(toml::from_str(&raw)?)
    }

    fn load_value(&self) -> Result<Value, ConfigError> {
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(raw.parse::<Value>()?)
    }

    /// Deep-merges a sparse update tree onto the current file contents and
    /// rewrites the file. Keys absent from `update` keep their current value.
    pub fn update(&self, update: Value) -> Result<(), ConfigError> {
        let current = self.load_value()?;
        let merged = merge_values(current, update);
        std::fs::write(&self.path, toml::to_string_pretty(&merged)?)?;
        Ok(())
    }

    /// SearxNG endpoint, with the environment variable taking precedence over
    /// the file and a local default as last resort.
    pub fn searxng_endpoint(&self) -> String {
        if let Ok(url) = std::env::var("SEARXNG_API_URL") {
            if !url.is_empty() {
                return url;
            }
        }
        match self.load() {
            Ok(config) if !config.api_endpoints.searxng.is_empty() => {
                config.api_endpoints.searxng
            }
            _ => DEFAULT_SEARXNG_URL.to_string(),
        }
    }
}

/// Pure recursive merge of two TOML trees.
///
/// Table + table merges key-by-key; keys present only in `current` survive,
/// keys present only in `update` are added. Anything else replaces wholesale.
/// "Clear a field" has no sentinel: callers send an empty string, which is a
/// normal replacement.
pub fn merge_values(current: Value, update: Value) -> Value {
    match (current, update) {
        (Value::Table(mut current), Value::Table(update)) => {
            for (key, update_value) in update {
                let merged = match current.remove(&key) {
                    Some(current_value) => merge_values(current_value, update_value),
                    None => update_value,
                };
                current.insert(key, merged);
            }
            Value::Table(current)
        }
        (_, update) => update,
    }
}

/// Flat settings payload accepted by `POST /api/config`. Absent fields are
/// omitted from the partial tree so the merge leaves them untouched.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub openai_api_key: Option<String>,
    pub groq_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub ollama_api_url: Option<String>,
    pub ollama_api_key: Option<String>,
    pub ollama2_api_url: Option<String>,
    pub ollama2_api_key: Option<String>,
    pub deepseek_api_key: Option<String>,
    pub aiml_api_key: Option<String>,
    pub lm_studio_api_url: Option<String>,
    pub eleven_labs_api_key: Option<String>,
    pub custom_openai_api_url: Option<String>,
    pub custom_openai_api_key: Option<String>,
    pub custom_openai_model_name: Option<String>,
    pub vllm_api_url: Option<String>,
    pub vllm_api_key: Option<String>,
    pub searxng_api_url: Option<String>,
}

impl SettingsUpdate {
    /// Builds the sparse tree handed to the deep merge.
    pub fn into_partial(self) -> Value {
        let mut models = toml::map::Map::new();
        insert_fields(&mut models, "OPENAI", [("API_KEY", self.openai_api_key)]);
        insert_fields(&mut models, "GROQ", [("API_KEY", self.groq_api_key)]);
        insert_fields(
            &mut models,
            "ANTHROPIC",
            [("API_KEY", self.anthropic_api_key)],
        );
        insert_fields(&mut models, "GEMINI", [("API_KEY", self.gemini_api_key)]);
        insert_fields(
            &mut models,
            "OLLAMA",
            [
                ("API_URL", self.ollama_api_url),
                ("API_KEY", self.ollama_api_key),
            ],
        );
        insert_fields(
            &mut models,
            "OLLAMA_2",
            [
                ("API_URL", self.ollama2_api_url),
                ("API_KEY", self.ollama2_api_key),
            ],
        );
        insert_fields(&mut models, "DEEPSEEK", [("API_KEY", self.deepseek_api_key)]);
        insert_fields(&mut models, "AIMLAPI", [("API_KEY", self.aiml_api_key)]);
        insert_fields(
            &mut models,
            "LM_STUDIO",
            [("API_URL", self.lm_studio_api_url)],
        );
        insert_fields(
            &mut models,
            "CUSTOM_OPENAI",
            [
                ("API_URL", self.custom_openai_api_url),
                ("API_KEY", self.custom_openai_api_key),
                ("MODEL_NAME", self.custom_openai_model_name),
            ],
        );
        insert_fields(
            &mut models,
            "ELEVENLABS",
            [("API_KEY", self.eleven_labs_api_key)],
        );
        insert_fields(
            &mut models,
            "VLLM",
            [
                ("API_URL", self.vllm_api_url),
                ("API_KEY", self.vllm_api_key),
            ],
        );

        let mut root = toml::map::Map::new();
        if !models.is_empty() {
            root.insert("MODELS".to_string(), Value::Table(models));
        }

        let mut endpoints = toml::map::Map::new();
        if let Some(url) = self.searxng_api_url {
            endpoints.insert("SEARXNG".to_string(), Value::String(url));
        }
        if !endpoints.is_empty() {
            root.insert("API_ENDPOINTS".to_string(), Value::Table(endpoints));
        }

        Value::Table(root)
    }
}

fn insert_fields<const N: usize>(
    models: &mut toml::map::Map<String, Value>,
    section: &str,
    fields: [(&str, Option<String>); N],
) {
    let mut table = toml::map::Map::new();
    for (key, value) in fields {
        if let Some(value) = value {
            table.insert(key.to_string(), Value::String(value));
        }
    }
    if !table.is_empty() {
        models.insert(section.to_string(), Value::Table(table));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Value {
        raw.parse::<Value>().unwrap()
    }

    #[test]
    fn merge_preserves_untouched_branches() {
        let current = parse(
            r#"
            [MODELS.OPENAI]
            API_KEY = "sk-current"
            [MODELS.OLLAMA]
            API_URL = "http://localhost:11434"
            API_KEY = "ollama-key"
            "#,
        );
        let update = parse(
            r#"
            [MODELS.OPENAI]
            API_KEY = "sk-new"
            "#,
        );
        let merged = merge_values(current, update);
        assert_eq!(
            merged["MODELS"]["OPENAI"]["API_KEY"].as_str(),
            Some("sk-new")
        );
        assert_eq!(
            merged["MODELS"]["OLLAMA"]["API_URL"].as_str(),
            Some("http://localhost:11434")
        );
        assert_eq!(
            merged["MODELS"]["OLLAMA"]["API_KEY"].as_str(),
            Some("ollama-key")
        );
    }

    #[test]
    fn merge_adds_keys_only_in_update() {
        let current = parse("[GENERAL]\nKEEP_ALIVE = \"5m\"");
        let update = parse("[API_ENDPOINTS]\nSEARXNG = \"http://searx:8080\"");
        let merged = merge_values(current, update);
        assert_eq!(merged["GENERAL"]["KEEP_ALIVE"].as_str(), Some("5m"));
        assert_eq!(
            merged["API_ENDPOINTS"]["SEARXNG"].as_str(),
            Some("http://searx:8080")
        );
    }

    #[test]
    fn merge_replaces_on_type_mismatch() {
        let current = parse("[A]\nB = \"scalar\"");
        let update = parse("[A.B]\nC = 1");
        let merged = merge_values(current, update);
        assert_eq!(merged["A"]["B"]["C"].as_integer(), Some(1));
    }

    #[test]
    fn merge_is_idempotent() {
        let current = parse("[MODELS.OPENAI]\nAPI_KEY = \"old\"\n[MODELS.GROQ]\nAPI_KEY = \"g\"");
        let update = parse("[MODELS.OPENAI]\nAPI_KEY = \"new\"");
        let once = merge_values(current, update.clone());
        let twice = merge_values(once.clone(), update);
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_is_order_independent_for_disjoint_updates() {
        let current = parse("[X]\nA = 1");
        let u1 = parse("[X]\nB = 2");
        let u2 = parse("[X]\nC = 3");
        let combined = parse("[X]\nB = 2\nC = 3");

        let stepwise = merge_values(merge_values(current.clone(), u1), u2);
        let single = merge_values(current, combined);
        assert_eq!(stepwise["X"]["A"], single["X"]["A"]);
        assert_eq!(stepwise["X"]["B"], single["X"]["B"]);
        assert_eq!(stepwise["X"]["C"], single["X"]["C"]);
    }

    #[test]
    fn settings_update_skips_absent_fields() {
        let update = SettingsUpdate {
            openai_api_key: Some("sk-test".to_string()),
            searxng_api_url: Some("http://searx:8080".to_string()),
            ..Default::default()
        };
        let partial = update.into_partial();
        let table = partial.as_table().unwrap();
        let models = table["MODELS"].as_table().unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(
            models["OPENAI"]["API_KEY"].as_str(),
            Some("sk-test")
        );
        assert_eq!(
            table["API_ENDPOINTS"]["SEARXNG"].as_str(),
            Some("http://searx:8080")
        );
    }

    #[test]
    fn store_update_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [GENERAL]
            SIMILARITY_MEASURE = "cosine"
            KEEP_ALIVE = "5m"

            [MODELS.OPENAI]
            API_KEY = "sk-old"

            [MODELS.OLLAMA]
            API_URL = "http://localhost:11434"
            API_KEY = ""

            [API_ENDPOINTS]
            SEARXNG = "http://localhost:4000"
            "#,
        )
        .unwrap();

        let store = ConfigStore::new(&path);
        let update = SettingsUpdate {
            openai_api_key: Some("sk-new".to_string()),
            ..Default::default()
        };
        store.update(update.into_partial()).unwrap();

        let config = store.load().unwrap();
        assert_eq!(config.models.openai.api_key, "sk-new");
        // Untouched branches survive the rewrite.
        assert_eq!(config.models.ollama.api_url, "http://localhost:11434");
        assert_eq!(config.general.similarity_measure, "cosine");
        assert_eq!(config.api_endpoints.searxng, "http://localhost:4000");
    }

    #[test]
    fn load_tolerates_missing_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[GENERAL]\nKEEP_ALIVE = \"5m\"\n").unwrap();

        let config = ConfigStore::new(&path).load().unwrap();
        assert_eq!(config.general.keep_alive, "5m");
        assert!(config.models.openai.api_key.is_empty());
        assert!(config.api_endpoints.searxng.is_empty());
    }
}
