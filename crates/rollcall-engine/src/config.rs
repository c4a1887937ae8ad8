use rollcall_core::BackingSize;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Engine configuration.
///
/// Sources, last one wins: built-in defaults, an optional TOML file, then
/// `ROLLCALL_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL shared by the face and records services.
    pub api_base_url: String,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Sampling cadence of the registration screen.
    pub registration_interval_ms: u64,
    /// Delay between a stable face and the registration capture.
    pub settle_delay_ms: u64,
    /// Sampling cadence of the attendance screen.
    pub attendance_interval_ms: u64,
    /// Number of warmup frames to discard at startup (camera AGC/AE stabilization).
    pub warmup_frames: usize,
    pub jpeg_quality: u8,
    /// Where to write the overlay PNG after each render, if anywhere.
    pub overlay_path: Option<PathBuf>,
    /// Fixed overlay backing size; unset means follow the camera resolution.
    pub overlay_width: Option<u32>,
    pub overlay_height: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:5000".to_string(),
            camera_device: "/dev/video0".to_string(),
            registration_interval_ms: 500,
            settle_delay_ms: 1000,
            attendance_interval_ms: 2000,
            warmup_frames: 4,
            jpeg_quality: 85,
            overlay_path: None,
            overlay_width: None,
            overlay_height: None,
        }
    }
}

impl Config {
    /// Load from `path` (or `ROLLCALL_CONFIG`) if given, apply environment
    /// overrides, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("ROLLCALL_CONFIG").map(PathBuf::from));

        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                tracing::debug!(path = %path.display(), "loaded config file");
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Override fields from `lookup`, keyed by `ROLLCALL_*` variable name.
    /// Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("ROLLCALL_API_BASE_URL") {
            self.api_base_url = v;
        }
        if let Some(v) = lookup("ROLLCALL_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        self.registration_interval_ms =
            env_parse(&lookup, "ROLLCALL_REGISTRATION_INTERVAL_MS", self.registration_interval_ms);
        self.settle_delay_ms = env_parse(&lookup, "ROLLCALL_SETTLE_DELAY_MS", self.settle_delay_ms);
        self.attendance_interval_ms =
            env_parse(&lookup, "ROLLCALL_ATTENDANCE_INTERVAL_MS", self.attendance_interval_ms);
        self.warmup_frames = env_parse(&lookup, "ROLLCALL_WARMUP_FRAMES", self.warmup_frames);
        self.jpeg_quality = env_parse(&lookup, "ROLLCALL_JPEG_QUALITY", self.jpeg_quality);
        if let Some(v) = lookup("ROLLCALL_OVERLAY_PATH") {
            self.overlay_path = if v.is_empty() { None } else { Some(PathBuf::from(v)) };
        }
        if let Some(v) = lookup("ROLLCALL_OVERLAY_WIDTH").and_then(|v| v.parse().ok()) {
            self.overlay_width = Some(v);
        }
        if let Some(v) = lookup("ROLLCALL_OVERLAY_HEIGHT").and_then(|v| v.parse().ok()) {
            self.overlay_height = Some(v);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api_base_url must not be empty".into()));
        }
        for (key, value) in [
            ("registration_interval_ms", self.registration_interval_ms),
            ("attendance_interval_ms", self.attendance_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{key} must be greater than zero")));
            }
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        match (self.overlay_width, self.overlay_height) {
            (Some(0), _) | (_, Some(0)) => {
                Err(ConfigError::Invalid("overlay size must be non-zero".into()))
            }
            (Some(_), None) | (None, Some(_)) => Err(ConfigError::Invalid(
                "overlay_width and overlay_height must be set together".into(),
            )),
            _ => Ok(()),
        }
    }

    pub fn registration_interval(&self) -> Duration {
        Duration::from_millis(self.registration_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn attendance_interval(&self) -> Duration {
        Duration::from_millis(self.attendance_interval_ms)
    }

    pub fn backing_size(&self) -> BackingSize {
        match (self.overlay_width, self.overlay_height) {
            (Some(width), Some(height)) => BackingSize::Fixed { width, height },
            _ => BackingSize::FollowSource,
        }
    }
}

fn env_parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.registration_interval(), Duration::from_millis(500));
        assert_eq!(config.settle_delay(), Duration::from_secs(1));
        assert_eq!(config.attendance_interval(), Duration::from_secs(2));
        assert_eq!(config.backing_size(), BackingSize::FollowSource);
    }

    #[test]
    fn test_toml_partial_file_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            api_base_url = "http://attendance.local:8080"
            attendance_interval_ms = 3000
            overlay_width = 320
            overlay_height = 240
            "#,
        )
        .unwrap();
        assert_eq!(config.api_base_url, "http://attendance.local:8080");
        assert_eq!(config.attendance_interval_ms, 3000);
        assert_eq!(config.registration_interval_ms, 500);
        assert_eq!(config.backing_size(), BackingSize::Fixed { width: 320, height: 240 });
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let err = Config::from_toml_str("attendance_interval_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("ROLLCALL_CAMERA_DEVICE", "/dev/video2"),
            ("ROLLCALL_SETTLE_DELAY_MS", "250"),
            ("ROLLCALL_JPEG_QUALITY", "not-a-number"),
            ("ROLLCALL_OVERLAY_PATH", "/tmp/overlay.png"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.camera_device, "/dev/video2");
        assert_eq!(config.settle_delay_ms, 250);
        assert_eq!(config.jpeg_quality, 85);
        assert_eq!(config.overlay_path, Some(PathBuf::from("/tmp/overlay.png")));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero = Config { attendance_interval_ms: 0, ..Config::default() };
        assert!(matches!(zero.validate(), Err(ConfigError::Invalid(_))));

        let quality = Config { jpeg_quality: 0, ..Config::default() };
        assert!(quality.validate().is_err());

        let half = Config { overlay_width: Some(640), ..Config::default() };
        assert!(half.validate().is_err());
    }
}
