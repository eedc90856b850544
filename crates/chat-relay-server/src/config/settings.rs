use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Fallback variable for the upstream credential when `APP__LLM__API_KEY` is not set.
pub const API_TOKEN_ENV: &str = "PERPLEXITY_API_TOKEN";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub conversation: ConversationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory served under `/static` (not mounted when unset)
    pub static_dir: Option<String>,
    /// Page served at `/` (not mounted when unset)
    pub index_file: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            static_dir: None,
            index_file: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout_seconds: u64,
    /// Max silence between two upstream chunks before the stream is failed
    pub stream_idle_timeout_seconds: u64,
    pub max_concurrent_requests: usize,
    pub acquire_timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.perplexity.ai".to_string(),
            api_key: None,
            model: "llama-3.1-sonar-small-128k-online".to_string(),
            temperature: 0.7,
            top_p: 0.9,
            timeout_seconds: 300,
            stream_idle_timeout_seconds: 60,
            max_concurrent_requests: 32,
            acquire_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConversationConfig {
    /// Output cap for the main reply of a turn
    pub max_response_tokens: usize,
    pub title_max_tokens: usize,
    pub summary_max_tokens: usize,
    /// Estimated history size above which compaction fires (model context is 128k)
    pub summary_threshold: usize,
    /// Most recent messages left out of the summarization input
    pub keep_recent: usize,
    /// Upper bound on retained messages after compaction
    pub max_retained: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_response_tokens: 1000,
            title_max_tokens: 20,
            summary_max_tokens: 2000,
            summary_threshold: 90_000,
            keep_recent: 10,
            max_retained: 50,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub directory: String,
    pub file_name: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: ".".to_string(),
            file_name: "server.log".to_string(),
            json: true,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        let mut settings: Settings = config.try_deserialize()?;

        if settings.llm.api_key.as_deref().map_or(true, str::is_empty) {
            settings.llm.api_key = std::env::var(API_TOKEN_ENV).ok().filter(|v| !v.is_empty());
        }

        Ok(settings)
    }

    pub fn config_path(&self) -> PathBuf {
        PathBuf::from("config/settings.toml")
    }

    pub fn log_file_path(&self) -> PathBuf {
        PathBuf::from(&self.logging.directory).join(&self.logging.file_name)
    }
}
