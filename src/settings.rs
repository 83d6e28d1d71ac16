use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::SeekPolicy;
use crate::service::VoicePreset;

/// Environment variables checked for the API key, in order
const API_KEY_VARS: &[&str] = &["GEMINI_API_KEY", "API_KEY"];

/// Returns the path to the settings file: `~/.config/studyguide-rs/settings.json`
fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("studyguide-rs");
    path.push("settings.json");
    path
}

/// API key from the environment. Keys are never written to the settings file.
pub fn api_key_from_env() -> Option<String> {
    API_KEY_VARS
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|key| !key.trim().is_empty())
}

/// Generation service endpoint and models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub text_model: String,
    pub speech_model: String,
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            text_model: "gemini-3-flash-preview".to_string(),
            speech_model: "gemini-2.5-flash-preview-tts".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Persisted application settings.
///
/// Serialized as JSON to the platform config directory.
/// Fields use `#[serde(default)]` so that adding new settings
/// won't break existing config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    // Audio guide
    pub voice: VoicePreset,
    pub playback_rate: f32,
    pub seek_step_secs: f64,
    pub seek_policy: SeekPolicy,

    // Service
    pub api: ApiSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            voice: VoicePreset::default(),
            playback_rate: 1.0,
            seek_step_secs: 10.0,
            seek_policy: SeekPolicy::default(),

            api: ApiSettings::default(),
        }
    }
}

impl AppSettings {
    /// Load settings from disk, falling back to defaults on any error.
    pub fn load() -> Self {
        Self::load_from(&settings_path())
    }

    pub fn load_from(path: &Path) -> Self {
        let settings: Self = match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    log::warn!("Failed to parse settings ({}), using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                log::info!("No settings file found ({}), using defaults", e);
                Self::default()
            }
        };
        settings.sanitized()
    }

    /// Save settings to disk as pretty JSON.
    pub fn save(&self) {
        self.save_to(&settings_path());
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Failed to create config directory: {}", e);
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    log::warn!("Failed to write settings: {}", e);
                }
            }
            Err(e) => {
                log::warn!("Failed to serialize settings: {}", e);
            }
        }
    }

    /// Replace values a hand-edited file could have broken
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !self.playback_rate.is_finite() || self.playback_rate <= 0.0 {
            self.playback_rate = defaults.playback_rate;
        }
        if !self.seek_step_secs.is_finite() || self.seek_step_secs <= 0.0 {
            self.seek_step_secs = defaults.seek_step_secs;
        }
        if self.api.timeout_secs == 0 {
            self.api.timeout_secs = defaults.api.timeout_secs;
        }
        self
    }
}
