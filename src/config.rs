//! Configuration management for evangelio-rs.
//!
//! Loads config from YAML files in standard locations. Every section has
//! defaults, so an empty or missing file yields a working setup as long as
//! an API key is available in the environment.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::gemini::VoiceBinding;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub host: String,
    /// Falls back to GEMINI_API_KEY / API_KEY when empty.
    pub api_key: String,
    pub text_model: String,
    pub tts_model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            host: "https://generativelanguage.googleapis.com".into(),
            api_key: String::new(),
            text_model: "gemini-2.5-pro".into(),
            tts_model: "gemini-2.5-flash-preview-tts".into(),
            temperature: 0.2,
            timeout_secs: 180,
        }
    }
}

impl GeminiConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        if !self.api_key.trim().is_empty() {
            return Some(self.api_key.trim().to_string());
        }
        ["GEMINI_API_KEY", "API_KEY"]
            .into_iter()
            .filter_map(|var| std::env::var(var).ok())
            .map(|key| key.trim().to_string())
            .find(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoicesConfig {
    pub narrator_speaker: String,
    pub narrator_voice: String,
    pub gospel_speaker: String,
    pub gospel_voice: String,
}

impl Default for VoicesConfig {
    fn default() -> Self {
        Self {
            narrator_speaker: "Narrador".into(),
            narrator_voice: "Charon".into(),
            gospel_speaker: "LectorEvangelio".into(),
            gospel_voice: "Zephyr".into(),
        }
    }
}

impl VoicesConfig {
    pub fn bindings(&self) -> Vec<VoiceBinding> {
        vec![
            VoiceBinding {
                speaker: self.narrator_speaker.clone(),
                voice: self.narrator_voice.clone(),
            },
            VoiceBinding {
                speaker: self.gospel_speaker.clone(),
                voice: self.gospel_voice.clone(),
            },
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub title_prefix: String,
    pub error_title: String,
    pub error_message: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            title_prefix: "Evangelio del día".into(),
            error_title: "Error | Evangelio del día".into(),
            error_message: "No se pudieron obtener las lecturas. Por favor, intente con otra fecha o verifique la configuración.".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8768,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub voices: VoicesConfig,
    pub display: DisplayConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/evangelio/config.yaml
    /// 3. /etc/evangelio/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::config_dir().map(|c| c.join("evangelio/config.yaml")),
                Some(PathBuf::from("/etc/evangelio/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, serde_yml::Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yml::from_str(contents)
    }
}
