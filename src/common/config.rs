use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use crate::common::error::{FaceLinkError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "configs/facelink.toml";
pub const SERVER_ENV: &str = "FACELINK_SERVER";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub enrollment: EnrollmentConfig,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    #[serde(default)]
    pub roster: RosterConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_updates_path")]
    pub updates_path: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Seconds to wait before reconnecting the push channel. 0 disables reconnects.
    #[serde(default = "default_reconnect_secs")]
    pub reconnect_secs: u64,
}

fn default_base_url() -> String { "http://localhost:8000".to_string() }
fn default_updates_path() -> String { "/ws/updates".to_string() }
fn default_request_timeout() -> u64 { 5000 }
fn default_reconnect_secs() -> u64 { 5 }

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            updates_path: default_updates_path(),
            request_timeout_ms: default_request_timeout(),
            reconnect_secs: default_reconnect_secs(),
        }
    }
}

impl ServiceConfig {
    /// Push channel URL derived from the HTTP base URL.
    pub fn updates_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}{}", ws_base, self.updates_path)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CameraConfig {
    /// Device for the user-facing camera. Accepts `/dev/videoN`, an image
    /// file path, or `stub://name`.
    #[serde(default = "default_user_device")]
    pub user_device: String,
    #[serde(default)]
    pub environment_device: Option<String>,
    #[serde(default = "default_camera_width")]
    pub width: u32,
    #[serde(default = "default_camera_height")]
    pub height: u32,
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u32,
}

fn default_user_device() -> String { "/dev/video0".to_string() }
fn default_camera_width() -> u32 { 640 }
fn default_camera_height() -> u32 { 480 }
fn default_warmup_frames() -> u32 { 3 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            user_device: default_user_device(),
            environment_device: None,
            width: default_camera_width(),
            height: default_camera_height(),
            warmup_frames: default_warmup_frames(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EnrollmentConfig {
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    #[serde(default = "default_capture_width")]
    pub capture_width: u32,
    #[serde(default = "default_capture_height")]
    pub capture_height: u32,
    #[serde(default = "default_original_quality")]
    pub original_quality: u8,
    #[serde(default = "default_filtered_quality")]
    pub filtered_quality: u8,
    /// Delay between automatic captures in the CLI enrollment flow.
    #[serde(default = "default_capture_interval")]
    pub capture_interval_ms: u64,
}

fn default_max_samples() -> usize { 5 }
fn default_capture_width() -> u32 { 240 }
fn default_capture_height() -> u32 { 320 }
fn default_original_quality() -> u8 { 90 }
fn default_filtered_quality() -> u8 { 80 }
fn default_capture_interval() -> u64 { 1500 }

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            max_samples: default_max_samples(),
            capture_width: default_capture_width(),
            capture_height: default_capture_height(),
            original_quality: default_original_quality(),
            filtered_quality: default_filtered_quality(),
            capture_interval_ms: default_capture_interval(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecognitionConfig {
    #[serde(default = "default_interval")]
    pub interval_ms: u64,
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,
    #[serde(default = "default_frame_height")]
    pub frame_height: u32,
    #[serde(default = "default_original_quality")]
    pub quality: u8,
}

fn default_interval() -> u64 { 500 }
fn default_frame_width() -> u32 { 320 }
fn default_frame_height() -> u32 { 240 }

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            frame_width: default_frame_width(),
            frame_height: default_frame_height(),
            quality: default_original_quality(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RosterConfig {
    #[serde(default = "default_highlight_ms")]
    pub highlight_ms: u64,
    #[serde(default = "default_thumb_width")]
    pub thumb_width: u32,
    #[serde(default = "default_thumb_height")]
    pub thumb_height: u32,
}

fn default_highlight_ms() -> u64 { 3000 }
fn default_thumb_width() -> u32 { 100 }
fn default_thumb_height() -> u32 { 133 }

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            highlight_ms: default_highlight_ms(),
            thumb_width: default_thumb_width(),
            thumb_height: default_thumb_height(),
        }
    }
}

impl Config {
    /// Load from an explicit path, else the default path if present, else defaults.
    /// `FACELINK_SERVER` overrides the service base URL in every case.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::load_from_path(&default_path)?
                } else {
                    info!("No config file found, using built-in defaults");
                    Self::default()
                }
            }
        };

        if let Ok(server) = std::env::var(SERVER_ENV) {
            if !server.trim().is_empty() {
                info!("Service base URL overridden by {}: {}", SERVER_ENV, server);
                config.service.base_url = server.trim().to_string();
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FaceLinkError::Config(format!(
                "Config file not found: {}", path.display()
            )));
        }

        info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| FaceLinkError::Config(format!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_dimension("Camera width", self.camera.width)?;
        check_dimension("Camera height", self.camera.height)?;
        check_dimension("Capture width", self.enrollment.capture_width)?;
        check_dimension("Capture height", self.enrollment.capture_height)?;
        check_dimension("Recognition frame width", self.recognition.frame_width)?;
        check_dimension("Recognition frame height", self.recognition.frame_height)?;
        check_dimension("Thumbnail width", self.roster.thumb_width)?;
        check_dimension("Thumbnail height", self.roster.thumb_height)?;

        check_quality("Original quality", self.enrollment.original_quality)?;
        check_quality("Filtered quality", self.enrollment.filtered_quality)?;
        check_quality("Recognition quality", self.recognition.quality)?;

        if self.enrollment.max_samples == 0 {
            return Err(FaceLinkError::Config("max_samples must be at least 1".into()));
        }
        if self.recognition.interval_ms == 0 {
            return Err(FaceLinkError::Config("Recognition interval must be greater than zero".into()));
        }
        if self.service.request_timeout_ms == 0 {
            return Err(FaceLinkError::Config("Request timeout must be greater than zero".into()));
        }
        if !self.service.base_url.starts_with("http://") && !self.service.base_url.starts_with("https://") {
            return Err(FaceLinkError::Config(format!(
                "Service base_url must be http(s), got {}", self.service.base_url
            )));
        }

        Ok(())
    }
}

fn check_dimension(name: &str, value: u32) -> Result<()> {
    if value == 0 || value > 4096 {
        return Err(FaceLinkError::Config(format!(
            "{} must be between 1 and 4096, got {}", name, value
        )));
    }
    Ok(())
}

fn check_quality(name: &str, value: u8) -> Result<()> {
    if value == 0 || value > 100 {
        return Err(FaceLinkError::Config(format!(
            "{} must be between 1 and 100, got {}", name, value
        )));
    }
    Ok(())
}
