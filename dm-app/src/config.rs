//! dmpilot configuration loader.
//!
//! TOML file, then `.env`/environment overrides, then validation. The
//! provider priority chain is computed here once at startup and never
//! changes at runtime.

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub instagram: InstagramConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
    #[serde(default = "default_http_max_in_flight")]
    pub http_max_in_flight: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_http_timeout_seconds() -> u64 {
    75
}

fn default_http_max_in_flight() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            http_timeout_seconds: default_http_timeout_seconds(),
            http_max_in_flight: default_http_max_in_flight(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookConfig {
    /// Token echoed back during the platform's subscription handshake.
    #[serde(default)]
    pub verify_token: String,
    /// Shared secret for the `x-hub-signature-256` payload signature.
    #[serde(default)]
    pub app_secret: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstagramConfig {
    #[serde(default)]
    pub access_token: String,
    /// Graph API base override; the production default lives in dm-channels.
    #[serde(default)]
    pub api_base: Option<String>,
    /// Single allow-listed handle. Empty or absent means reply to anyone.
    #[serde(default)]
    pub allowed_username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "dmpilot.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantConfig {
    /// Persona and behavior specification placed at the top of every prompt.
    #[serde(default = "default_persona")]
    pub persona: String,
    /// Status used when the operator never set one.
    #[serde(default = "default_status_fallback")]
    pub status_fallback: String,
    /// Reply of last resort when every provider fails.
    #[serde(default = "default_apology")]
    pub apology: String,
    /// How many recent conversation turns are included in the prompt.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

fn default_persona() -> String {
    "You are a warm, personal assistant answering direct messages on the \
     account owner's behalf. Keep replies short, friendly and conversational. \
     Never claim to be an AI or a bot; you are simply the owner's assistant. \
     Politely decline anything offensive, political or outside casual \
     conversation."
        .to_string()
}

fn default_status_fallback() -> String {
    "unavailable right now".to_string()
}

fn default_apology() -> String {
    "Sorry, I'm having a small technical issue right now. Please try again \
     in a minute!"
        .to_string()
}

fn default_history_window() -> usize {
    10
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            persona: default_persona(),
            status_fallback: default_status_fallback(),
            apology: default_apology(),
            history_window: default_history_window(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub groq_api_key: Option<String>,
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default)]
    pub deepseek_api_key: Option<String>,
    #[serde(default)]
    pub xai_api_key: Option<String>,
    #[serde(default)]
    pub openrouter_api_key: Option<String>,

    #[serde(default = "default_groq_model")]
    pub groq_model: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_deepseek_model")]
    pub deepseek_model: String,
    #[serde(default = "default_grok_model")]
    pub grok_model: String,
    #[serde(default = "default_openrouter_model")]
    pub openrouter_model: String,
}

fn default_groq_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_deepseek_model() -> String {
    "deepseek-chat".to_string()
}

fn default_grok_model() -> String {
    "grok-2-latest".to_string()
}

fn default_openrouter_model() -> String {
    "google/gemma-3-27b-it:free".to_string()
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            groq_api_key: None,
            gemini_api_key: None,
            deepseek_api_key: None,
            xai_api_key: None,
            openrouter_api_key: None,
            groq_model: default_groq_model(),
            gemini_model: default_gemini_model(),
            deepseek_model: default_deepseek_model(),
            grok_model: default_grok_model(),
            openrouter_model: default_openrouter_model(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderId {
    Groq,
    Gemini,
    Deepseek,
    Grok,
    Openrouter,
}

impl ProviderId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::Gemini => "gemini",
            Self::Deepseek => "deepseek",
            Self::Grok => "grok",
            Self::Openrouter => "openrouter",
        }
    }
}

/// One entry of the startup-computed provider fallback chain.
#[derive(Debug, Clone)]
pub struct ProviderCredential {
    pub id: ProviderId,
    pub api_key: String,
    pub model: String,
}

impl AppConfig {
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let explicit = path.is_some();
        let path = path.unwrap_or_else(default_config_path);

        let mut cfg = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => toml::from_str::<AppConfig>(&contents)
                .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?,
            // A missing default-path file is fine: deployments driven purely
            // by environment variables never write one.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => AppConfig::default(),
            Err(e) => {
                return Err(anyhow::anyhow!("read config {}: {e}", path.display()));
            }
        };

        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_value("DMPILOT_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = env_value("WEBHOOK_VERIFY_TOKEN") {
            self.webhook.verify_token = v;
        }
        if let Some(v) = env_value("APP_SECRET") {
            self.webhook.app_secret = v;
        }
        if let Some(v) = env_value("INSTAGRAM_ACCESS_TOKEN") {
            self.instagram.access_token = v;
        }
        if let Some(v) = env_value("INSTAGRAM_API_BASE") {
            self.instagram.api_base = Some(v);
        }
        if let Some(v) = env_value("ALLOWED_USERNAME") {
            self.instagram.allowed_username = Some(v);
        }
        if let Some(v) = env_value("DMPILOT_DB_PATH") {
            self.storage.db_path = v;
        }
        if let Some(v) = env_value("GROQ_API_KEY") {
            self.providers.groq_api_key = Some(v);
        }
        if let Some(v) = env_value("GEMINI_API_KEY") {
            self.providers.gemini_api_key = Some(v);
        }
        if let Some(v) = env_value("DEEPSEEK_API_KEY") {
            self.providers.deepseek_api_key = Some(v);
        }
        if let Some(v) = env_value("XAI_API_KEY") {
            self.providers.xai_api_key = Some(v);
        }
        if let Some(v) = env_value("OPENROUTER_API_KEY") {
            self.providers.openrouter_api_key = Some(v);
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.webhook.verify_token.trim().is_empty() {
            return Err(anyhow::anyhow!("webhook.verify_token is required"));
        }
        if self.webhook.app_secret.trim().is_empty() {
            return Err(anyhow::anyhow!("webhook.app_secret is required"));
        }
        if self.instagram.access_token.trim().is_empty() {
            return Err(anyhow::anyhow!("instagram.access_token is required"));
        }
        if self.assistant.history_window == 0 {
            return Err(anyhow::anyhow!("assistant.history_window must be > 0"));
        }
        Ok(())
    }

    /// The ordered fallback chain: every provider whose credential looks
    /// real, in fixed priority order (free-tier friendliness first).
    pub fn provider_priority(&self) -> Vec<ProviderCredential> {
        let p = &self.providers;
        [
            (ProviderId::Groq, &p.groq_api_key, &p.groq_model),
            (ProviderId::Gemini, &p.gemini_api_key, &p.gemini_model),
            (ProviderId::Deepseek, &p.deepseek_api_key, &p.deepseek_model),
            (ProviderId::Grok, &p.xai_api_key, &p.grok_model),
            (ProviderId::Openrouter, &p.openrouter_api_key, &p.openrouter_model),
        ]
        .into_iter()
        .filter_map(|(id, key, model)| {
            let key = key.as_deref().map(str::trim)?;
            looks_like_credential(key).then(|| ProviderCredential {
                id,
                api_key: key.to_string(),
                model: model.clone(),
            })
        })
        .collect()
    }

    pub fn allowed_username(&self) -> Option<String> {
        self.instagram
            .allowed_username
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ToOwned::to_owned)
    }
}

/// Filters out unset keys and the `your_...` placeholders that ship in
/// `.env` templates.
fn looks_like_credential(key: &str) -> bool {
    !key.is_empty() && !key.starts_with("your_") && key.len() > 10
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".dmpilot").join("config.toml")
}
