use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub youtube: YouTubeConfig,
    pub llm: LlmConfig,
    pub web: WebConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct YouTubeConfig {
    pub base_url: String,
    /// Comments fetched per ordering (relevance and time), capped at 100 by the API
    pub comments_per_order: usize,
    pub max_videos: usize,
    // Loaded from env
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.googleapis.com/youtube/v3".to_string(),
            comments_per_order: 50,
            max_videos: 200,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub app_title: String,
    /// Subscription service the drafted pinned comment points viewers to
    pub platform_name: String,
    pub classify_temperature: f32,
    pub draft_temperature: f32,
    pub rate_limit_backoff_ms: u64,
    // Loaded from env
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "google/gemini-3-flash-preview".to_string(),
            app_title: "Video Intent Scanner".to_string(),
            platform_name: "FutureClinic".to_string(),
            classify_temperature: 0.1,
            draft_temperature: 0.7,
            rate_limit_backoff_ms: 2000,
            api_key: None,
        }
    }
}

impl LlmConfig {
    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    /// Directory with the presentation layer's static assets, if any
    pub static_dir: Option<PathBuf>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            static_dir: None,
        }
    }
}

impl AppConfig {
    /// Reads the TOML file when it exists, then pulls API keys from the environment.
    pub fn load(path: &Path) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = if path.exists() {
            let config_text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Self::from_toml(&config_text)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            AppConfig::default()
        };

        config.youtube.api_key = non_empty_env("YOUTUBE_API_KEY");
        config.llm.api_key = non_empty_env("OPENROUTER_API_KEY");

        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid configuration")
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config = AppConfig::from_toml("[web]\nport = 8080\n").unwrap();
        assert_eq!(config.web.port, 8080);
        assert_eq!(config.web.host, "127.0.0.1");
        assert_eq!(config.youtube.comments_per_order, 50);
        assert_eq!(config.llm.rate_limit_backoff(), Duration::from_secs(2));
    }

    #[test]
    fn overrides_llm_settings() {
        let config = AppConfig::from_toml(
            r#"
            [llm]
            model = "openai/gpt-4o-mini"
            classify_temperature = 0.0
            "#,
        )
        .unwrap();
        assert_eq!(config.llm.model, "openai/gpt-4o-mini");
        assert_eq!(config.llm.classify_temperature, 0.0);
        assert_eq!(config.llm.draft_temperature, 0.7);
        assert!(config.llm.api_key.is_none());
    }
}
