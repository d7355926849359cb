//! Daemon configuration
//!
//! Defaults, overridden by an optional TOML file, overridden by
//! POSTERD_-prefixed environment variables (sections split on `__`, e.g.
//! `POSTERD_GEMINI__TEXT_MODEL`).

use std::net::SocketAddr;
use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::policy::DEFAULT_POLICY_ID;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSettings,
    pub gemini: GeminiSettings,
    pub retry: RetrySettings,
    /// Active prompt policy ID
    pub policy: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            gemini: GeminiSettings::default(),
            retry: RetrySettings::default(),
            policy: DEFAULT_POLICY_ID.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: SocketAddr,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".parse().unwrap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiSettings {
    /// API key; falls back to the GEMINI_API_KEY environment variable
    pub api_key: Option<String>,
    pub base_url: String,
    /// Model for the prompt engineering call
    pub text_model: String,
    /// Model for the image generation call
    pub image_model: String,
    pub timeout_secs: u64,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            text_model: "gemini-2.5-flash".to_string(),
            image_model: "gemini-3-pro-image-preview".to_string(),
            timeout_secs: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    /// Base backoff for the prompt engineering call
    pub analyze_base_delay_ms: u64,
    /// Base backoff for the image call (renders are slower to recover)
    pub render_base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            analyze_base_delay_ms: 1000,
            render_base_delay_ms: 2000,
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional TOML file, and env vars
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed("POSTERD_").split("__"))
            .extract()
    }
}
