use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Optional TOML configuration. Every value present here wins over the
/// corresponding command line argument.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub db_dir: Option<String>,
    pub media_dir: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub frontend_dir_path: Option<String>,
    pub classifier_path: Option<String>,
    pub ffmpeg_path: Option<String>,

    pub audio: Option<AudioConfig>,
    pub trends: Option<TrendsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AudioConfig {
    /// Length of a live microphone capture.
    pub capture_seconds: Option<u64>,
    /// Extra time a capture may take before it is cancelled.
    pub capture_timeout_grace_secs: Option<u64>,
    /// Human readable size, e.g. "25 MB".
    pub max_upload_size: Option<String>,
    /// Where uploads are staged while being transcoded.
    pub scratch_dir: Option<String>,
    /// Keep a copy of every classified clip under the media directory.
    pub archive_clips: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct TrendsConfig {
    pub interval_hours: Option<u64>,
    pub run_on_startup: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
