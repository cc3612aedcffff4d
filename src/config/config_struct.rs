use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::api::live_translate::{SessionConfig, DEFAULT_VOICE, LIVE_TRANSLATE_MODEL};
use crate::session::SessionSettings;

// --- CONSTANTS ---
pub const DEFAULT_FRAME_SIZE: usize = 4096;
pub const DEFAULT_CAPTURE_SAMPLE_RATE: u32 = 16000;
pub const DEFAULT_PLAYBACK_SAMPLE_RATE: u32 = 24000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 15_000;

fn default_model() -> String {
    LIVE_TRANSLATE_MODEL.to_string()
}
fn default_source_language() -> String {
    "auto".to_string()
}
fn default_target_language() -> String {
    "English".to_string()
}
fn default_voice() -> String {
    DEFAULT_VOICE.to_string()
}
fn default_frame_size() -> usize {
    DEFAULT_FRAME_SIZE
}
fn default_capture_sample_rate() -> u32 {
    DEFAULT_CAPTURE_SAMPLE_RATE
}
fn default_playback_sample_rate() -> u32 {
    DEFAULT_PLAYBACK_SAMPLE_RATE
}
fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub gemini_api_key: String,
    #[serde(default = "default_model")]
    pub model: String,

    // --- Session ---
    #[serde(default = "default_source_language")]
    pub source_language: String, // "auto" lets the model detect the spoken language
    #[serde(default = "default_target_language")]
    pub target_language: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default)]
    pub instructions: String, // Free-text tone/style steering

    // --- Audio ---
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
    #[serde(default = "default_capture_sample_rate")]
    pub capture_sample_rate: u32,
    #[serde(default = "default_playback_sample_rate")]
    pub playback_sample_rate: u32,

    /// How long to wait for the service to acknowledge setup. 0 waits forever.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            model: default_model(),
            source_language: default_source_language(),
            target_language: default_target_language(),
            voice: default_voice(),
            instructions: String::new(),
            frame_size: DEFAULT_FRAME_SIZE,
            capture_sample_rate: DEFAULT_CAPTURE_SAMPLE_RATE,
            playback_sample_rate: DEFAULT_PLAYBACK_SAMPLE_RATE,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Snapshot of the per-session settings handed to the remote service.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            source_language: self.source_language.clone(),
            target_language: self.target_language.clone(),
            voice: self.voice.clone(),
            instructions: self.instructions.clone(),
        }
    }

    /// Local pipeline settings for the lifecycle controller.
    pub fn settings(&self) -> SessionSettings {
        SessionSettings {
            frame_size: self.frame_size.max(1),
            capture_sample_rate: self.capture_sample_rate,
            playback_sample_rate: self.playback_sample_rate,
            connect_timeout: if self.connect_timeout_ms == 0 {
                None
            } else {
                Some(Duration::from_millis(self.connect_timeout_ms))
            },
        }
    }
}
