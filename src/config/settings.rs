//! Configuration file support

use crate::ntv2::{IoSelection, PixelFormat, SdiTransport, SdiTransport4K, VideoFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// User settings of one capture source
///
/// `video_format`, `pixel_format` and `sdi_transport` accept `"auto"`, stored as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Card to capture from
    pub device_id: String,

    /// Input selection (sdi1, sdi1_2, sdi1_4, hdmi1, ...)
    pub input: IoSelection,

    #[serde(with = "auto")]
    pub video_format: Option<VideoFormat>,

    #[serde(with = "auto")]
    pub pixel_format: Option<PixelFormat>,

    #[serde(with = "auto")]
    pub sdi_transport: Option<SdiTransport>,

    /// How 4K rasters are split across links
    pub sdi_4k_transport: SdiTransport4K,

    /// Stop capturing while the source is hidden
    pub deactivate_while_not_showing: bool,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            input: IoSelection::Invalid,
            video_format: None,
            pixel_format: None,
            sdi_transport: None,
            sdi_4k_transport: SdiTransport4K::default(),
            deactivate_while_not_showing: false,
        }
    }
}

impl SourceSettings {
    /// Formats follow the signal when either one is left on auto
    pub fn auto_detect(&self) -> bool {
        self.video_format.is_none() || self.pixel_format.is_none()
    }
}

/// Serde helpers for values with an `"auto"` sentinel
mod auto {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Display,
        S: Serializer,
    {
        match value {
            Some(v) => serializer.collect_str(v),
            None => serializer.serialize_str("auto"),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_auto(&s).map_err(de::Error::custom)
    }
}

/// Parse a value that may be `"auto"` (or empty), returning `None` for it
pub fn parse_auto<T: FromStr>(s: &str) -> Result<Option<T>, T::Err> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("auto") {
        Ok(None)
    } else {
        s.parse().map(Some)
    }
}

/// A named source in the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedSource {
    pub name: String,

    #[serde(flatten)]
    pub settings: SourceSettings,
}

/// Application configuration loaded from TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log file path (empty = no file logging)
    pub log_file: String,

    /// Vertical interrupt period of simulated cards in milliseconds
    pub frame_period_ms: u64,

    /// Pause between placeholder frames while no signal is present, in milliseconds
    pub no_signal_backoff_ms: u64,

    /// Capture sources
    #[serde(rename = "source")]
    pub sources: Vec<NamedSource>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: String::new(),
            frame_period_ms: 17,
            no_signal_backoff_ms: 250,
            sources: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().to_string_lossy().to_string(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_string_lossy().to_string(),
            source: e,
        })
    }

    /// Load configuration from default locations
    ///
    /// Searches in order:
    /// 1. Same directory as executable: ajacap.toml
    /// 2. User config directory: ajacap/config.toml
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let config_path = exe_dir.join("ajacap.toml");
                if config_path.exists() {
                    return Self::load(&config_path);
                }
            }
        }

        if let Some(config_path) = Self::default_path() {
            if config_path.exists() {
                return Self::load(&config_path);
            }
        }

        Ok(Self::default())
    }

    /// `<config dir>/ajacap/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ajacap").join("config.toml"))
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_string_lossy().to_string(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Io {
            path: path.as_ref().to_string_lossy().to_string(),
            source: e,
        })
    }

    /// Configured log level, if it names one
    pub fn log_level(&self) -> Option<tracing::Level> {
        self.log_level.parse().ok()
    }

    pub fn log_file(&self) -> Option<&str> {
        Some(self.log_file.as_str()).filter(|f| !f.is_empty())
    }

    pub fn frame_period(&self) -> Duration {
        Duration::from_millis(self.frame_period_ms.max(1))
    }

    pub fn no_signal_backoff(&self) -> Duration {
        Duration::from_millis(self.no_signal_backoff_ms)
    }

    /// Source with the given name
    pub fn source(&self, name: &str) -> Option<&NamedSource> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Generate a sample configuration file content
    pub fn sample_config() -> String {
        r#"# ajacap configuration

# Log level: trace, debug, info, warn, error (default: info)
log_level = "info"

# Log file path (empty = no file logging)
log_file = ""

# Vertical interrupt period of simulated cards in milliseconds
frame_period_ms = 17

# Pause between placeholder frames while no signal is present (ms)
no_signal_backoff_ms = 250

# Capture sources. Formats and transport accept "auto".
[[source]]
name = "camera-1"
device_id = "sim-0"
input = "sdi1"
video_format = "auto"
pixel_format = "auto"
sdi_transport = "auto"
sdi_4k_transport = "two_sample_interleave"
deactivate_while_not_showing = false

[[source]]
name = "uhd"
device_id = "sim-0"
input = "sdi3_4"
video_format = "2160p30"
pixel_format = "10bit_ycbcr"
sdi_transport = "6g"
sdi_4k_transport = "two_sample_interleave"
"#
        .to_string()
    }
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading/writing config file
    Io {
        path: String,
        source: std::io::Error,
    },
    /// Error parsing TOML
    Parse {
        path: String,
        source: toml::de::Error,
    },
    /// Error serializing config
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to read config file '{}': {}", path, source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Failed to parse config file '{}': {}", path, source)
            }
            ConfigError::Serialize(e) => write!(f, "Failed to serialize config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Serialize(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_config_parses() {
        let config: AppConfig = toml::from_str(&AppConfig::sample_config()).unwrap();
        assert_eq!(config.log_level(), Some(tracing::Level::INFO));
        assert_eq!(config.log_file(), None);
        assert_eq!(config.sources.len(), 2);

        let camera = &config.source("camera-1").unwrap().settings;
        assert_eq!(camera.input, IoSelection::Sdi1);
        assert_eq!(camera.video_format, None);
        assert!(camera.auto_detect());

        let uhd = &config.source("uhd").unwrap().settings;
        assert_eq!(uhd.input, IoSelection::Sdi3_4);
        assert_eq!(uhd.video_format, Some(VideoFormat::F2160p30));
        assert_eq!(uhd.pixel_format, Some(PixelFormat::Ycbcr10));
        assert_eq!(uhd.sdi_transport, Some(SdiTransport::Sdi6G));
        assert!(!uhd.auto_detect());
    }

    #[test]
    fn test_parse_auto() {
        assert_eq!(parse_auto::<VideoFormat>("Auto"), Ok(None));
        assert_eq!(parse_auto::<VideoFormat>(""), Ok(None));
        assert_eq!(parse_auto::<VideoFormat>("720p50"), Ok(Some(VideoFormat::F720p50)));
        assert!(parse_auto::<SdiTransport>("7g").is_err());
    }

    #[test]
    fn test_missing_keys_default() {
        let settings: SourceSettings = toml::from_str("device_id = \"sim-1\"").unwrap();
        assert_eq!(settings.device_id, "sim-1");
        assert_eq!(settings.input, IoSelection::Invalid);
        assert_eq!(settings.pixel_format, None);
        assert_eq!(settings.sdi_4k_transport, SdiTransport4K::TwoSampleInterleave);
    }

    #[test]
    fn test_unknown_format_rejected() {
        let result: Result<SourceSettings, _> = toml::from_str("video_format = \"1081p\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("ajacap-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        let mut config = AppConfig::default();
        config.sources.push(NamedSource {
            name: "a".into(),
            settings: SourceSettings {
                device_id: "sim-0".into(),
                input: IoSelection::Hdmi1,
                pixel_format: Some(PixelFormat::Bgr24),
                ..Default::default()
            },
        });
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.sources, config.sources);
        assert_eq!(loaded.frame_period(), Duration::from_millis(17));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_missing_file_error_has_path() {
        let err = AppConfig::load("/nonexistent/ajacap.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/ajacap.toml"));
    }
}
