mod file_config;

pub use file_config::{AudioConfig, FileConfig, TrendsConfig};

use crate::server::RequestsLoggingLevel;
use crate::store::DB_FILE_NAME;
use anyhow::{anyhow, bail, Context, Result};
use byte_unit::Byte;
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CLASSIFIER_PATH: &str = "genreprediction/model/genre_classifier.json";
pub const DEFAULT_CAPTURE_SECONDS: u64 = 15;
pub const DEFAULT_CAPTURE_TIMEOUT_GRACE_SECS: u64 = 5;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
pub const DEFAULT_TRENDS_INTERVAL_HOURS: u64 = 24;

/// Command line values that take part in config resolution.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub media_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub classifier_path: Option<PathBuf>,
    pub ffmpeg_path: Option<String>,
    pub trends_interval_hours: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub media_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub classifier_path: PathBuf,
    pub ffmpeg_path: String,

    pub audio: AudioSettings,
    pub trends: TrendsSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioSettings {
    pub capture_duration: Duration,
    pub capture_timeout_grace: Duration,
    pub max_upload_bytes: usize,
    /// `None` means the system temporary directory.
    pub scratch_dir: Option<PathBuf>,
    pub archive_clips: bool,
}

impl Default for AudioSettings {
    fn default() -> Self {
        AudioSettings {
            capture_duration: Duration::from_secs(DEFAULT_CAPTURE_SECONDS),
            capture_timeout_grace: Duration::from_secs(DEFAULT_CAPTURE_TIMEOUT_GRACE_SECS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            scratch_dir: None,
            archive_clips: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendsSettings {
    pub interval: Duration,
    pub run_on_startup: bool,
}

impl Default for TrendsSettings {
    fn default() -> Self {
        TrendsSettings {
            interval: Duration::from_secs(DEFAULT_TRENDS_INTERVAL_HOURS * 3600),
            run_on_startup: true,
        }
    }
}

impl AppConfig {
    /// Merges CLI arguments with the optional TOML file; TOML wins.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| anyhow!("db_dir must be specified via --db-dir or in config file"))?;
        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let media_dir = file
            .media_dir
            .map(PathBuf::from)
            .or_else(|| cli.media_dir.clone())
            .unwrap_or_else(|| db_dir.join("media"));

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let classifier_path = file
            .classifier_path
            .map(PathBuf::from)
            .or_else(|| cli.classifier_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CLASSIFIER_PATH));

        let ffmpeg_path = file
            .ffmpeg_path
            .or_else(|| cli.ffmpeg_path.clone())
            .unwrap_or_else(|| "ffmpeg".to_string());

        let audio_file = file.audio.unwrap_or_default();
        let defaults = AudioSettings::default();
        let max_upload_bytes = match audio_file.max_upload_size {
            Some(size) => parse_size(&size)?,
            None => defaults.max_upload_bytes,
        };
        let capture_seconds = audio_file
            .capture_seconds
            .unwrap_or(DEFAULT_CAPTURE_SECONDS);
        if capture_seconds == 0 {
            bail!("audio.capture_seconds must be positive");
        }
        let audio = AudioSettings {
            capture_duration: Duration::from_secs(capture_seconds),
            capture_timeout_grace: audio_file
                .capture_timeout_grace_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.capture_timeout_grace),
            max_upload_bytes,
            scratch_dir: audio_file.scratch_dir.map(PathBuf::from),
            archive_clips: audio_file.archive_clips.unwrap_or(defaults.archive_clips),
        };

        let trends_file = file.trends.unwrap_or_default();
        let interval_hours = trends_file
            .interval_hours
            .or(cli.trends_interval_hours)
            .unwrap_or(DEFAULT_TRENDS_INTERVAL_HOURS);
        if interval_hours == 0 {
            bail!("trends interval must be at least one hour");
        }
        let trends = TrendsSettings {
            interval: Duration::from_secs(interval_hours * 3600),
            run_on_startup: trends_file.run_on_startup.unwrap_or(true),
        };

        Ok(Self {
            db_dir,
            media_dir,
            port: file.port.unwrap_or(cli.port),
            metrics_port: file.metrics_port.unwrap_or(cli.metrics_port),
            logging_level,
            frontend_dir_path: file
                .frontend_dir_path
                .or_else(|| cli.frontend_dir_path.clone()),
            classifier_path,
            ffmpeg_path,
            audio,
            trends,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_dir.join(DB_FILE_NAME)
    }
}

fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

fn parse_size(s: &str) -> Result<usize> {
    let bytes = Byte::parse_str(s, true)
        .map_err(|e| anyhow!("{}", e))
        .with_context(|| format!("Invalid size {:?}", s))?;
    usize::try_from(bytes.as_u64()).with_context(|| format!("Size {:?} is too large", s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_logging_level_case_insensitively() {
        assert_eq!(parse_logging_level("none"), Some(RequestsLoggingLevel::None));
        assert_eq!(parse_logging_level("PATH"), Some(RequestsLoggingLevel::Path));
        assert_eq!(parse_logging_level("body"), Some(RequestsLoggingLevel::Body));
        assert!(parse_logging_level("verbose").is_none());
    }

    #[test]
    fn resolves_cli_only_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            port: 3001,
            metrics_port: 9091,
            logging_level: RequestsLoggingLevel::Headers,
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.media_dir, temp_dir.path().join("media"));
        assert_eq!(config.port, 3001);
        assert_eq!(config.metrics_port, 9091);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Headers);
        assert_eq!(config.classifier_path, PathBuf::from(DEFAULT_CLASSIFIER_PATH));
        assert_eq!(config.ffmpeg_path, "ffmpeg");
        assert_eq!(config.audio, AudioSettings::default());
        assert_eq!(config.trends, TrendsSettings::default());
        assert_eq!(config.db_path(), temp_dir.path().join(DB_FILE_NAME));
    }

    #[test]
    fn toml_overrides_cli() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_dir: Some(PathBuf::from("/should/be/overridden")),
            port: 3001,
            metrics_port: 9091,
            logging_level: RequestsLoggingLevel::Path,
            ffmpeg_path: Some("/usr/bin/ffmpeg".to_string()),
            trends_interval_hours: Some(12),
            ..Default::default()
        };
        let file_config = FileConfig {
            db_dir: Some(temp_dir.path().to_string_lossy().to_string()),
            port: Some(4000),
            logging_level: Some("body".to_string()),
            audio: Some(AudioConfig {
                capture_seconds: Some(5),
                max_upload_size: Some("2 MiB".to_string()),
                ..Default::default()
            }),
            trends: Some(TrendsConfig {
                interval_hours: Some(6),
                run_on_startup: Some(false),
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.port, 4000);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Body);
        assert_eq!(config.metrics_port, 9091);
        assert_eq!(config.ffmpeg_path, "/usr/bin/ffmpeg");
        assert_eq!(config.audio.capture_duration, Duration::from_secs(5));
        assert_eq!(config.audio.max_upload_bytes, 2 * 1024 * 1024);
        assert_eq!(config.trends.interval, Duration::from_secs(6 * 3600));
        assert!(!config.trends.run_on_startup);
    }

    #[test]
    fn cli_trends_interval_is_used_without_toml() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            trends_interval_hours: Some(2),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, None).unwrap();
        assert_eq!(config.trends.interval, Duration::from_secs(7200));
    }

    #[test]
    fn missing_db_dir_is_an_error() {
        let err = AppConfig::resolve(&CliConfig::default(), None).unwrap_err();
        assert!(err.to_string().contains("db_dir must be specified"));
    }

    #[test]
    fn nonexistent_db_dir_is_an_error() {
        let cli = CliConfig {
            db_dir: Some(PathBuf::from("/nonexistent/path/that/should/not/exist")),
            ..Default::default()
        };
        let err = AppConfig::resolve(&cli, None).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn invalid_upload_size_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };
        let file_config = FileConfig {
            audio: Some(AudioConfig {
                max_upload_size: Some("lots".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli, Some(file_config)).is_err());
    }

    #[test]
    fn zero_capture_length_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };
        let file_config = FileConfig {
            audio: Some(AudioConfig {
                capture_seconds: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli, Some(file_config)).is_err());
    }
}
