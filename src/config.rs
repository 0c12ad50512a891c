use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

pub const CONFIG_PATH_ENV: &str = "GDRAFT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "settings.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenStore {
    #[default]
    File,
    Keyring,
}

/// What to do when no completion API key is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MissingKeyFallback {
    #[default]
    Template,
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search_query: String,
    pub marker_label: String,
    pub max_results: u32,

    pub knowledge_base_path: Option<String>,
    pub knowledge_max_chars: usize,

    pub client_secret_path: String,
    pub token_store: TokenStore,
    pub token_cache_path: String,

    pub api_key_env: String,
    pub api_base_url: String,
    pub model: String,
    pub persona: String,
    pub temperature: Option<f64>,
    pub request_timeout_secs: u64,
    pub missing_key_fallback: MissingKeyFallback,

    pub reply_prefix: String,
    pub fallback_recipient: Option<String>,
    pub template: Template,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Template {
    pub body: String,
    pub signature: Option<String>,
}

impl Default for Template {
    fn default() -> Self {
        Self {
            body: "Thank you for your message. I have received it and will get back to you shortly."
                .to_string(),
            signature: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search_query: "subject:BrickIntel OR \"Investment Tool\"".to_string(),
            marker_label: "AI_PROCESSED".to_string(),
            max_results: 10,
            knowledge_base_path: Some("knowledge.txt".to_string()),
            knowledge_max_chars: 20_000,
            client_secret_path: "credentials.json".to_string(),
            token_store: TokenStore::File,
            token_cache_path: "token.json".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            persona: "You are a helpful assistant. Draft a short, polite reply to the email below."
                .to_string(),
            temperature: None,
            request_timeout_secs: 60,
            missing_key_fallback: MissingKeyFallback::Template,
            reply_prefix: "Re:".to_string(),
            fallback_recipient: None,
            template: Template::default(),
        }
    }
}

impl Config {
    /// Loads `settings.toml` (or the file named by `GDRAFT_CONFIG`).
    /// Falls back to defaults when the file is missing or malformed.
    pub fn load() -> Self {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(path)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return Self::default(),
        };

        match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Invalid config file, using defaults");
                Self::default()
            }
        }
    }

    pub fn template_body(&self) -> String {
        match self.template.signature.as_deref() {
            Some(sig) if !sig.trim().is_empty() => {
                format!("{}\n\n{}", self.template.body.trim_end(), sig.trim())
            }
            _ => self.template.body.clone(),
        }
    }
}
