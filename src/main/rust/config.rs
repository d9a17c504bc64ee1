use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;

use crate::domain::value_objects::{
    BackoffSchedule, CaptureSource, Destination, DestinationProtocol, DeviceKind,
    DiagnosticMarkers, Resolution, StreamConfig, ToolPaths,
};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "pipeline-camera-push",
    version = "0.1.0",
    about = "Camera to network streamer with a retry watchdog and HTTP health endpoint"
)]
pub struct Config {
    /// YAML configuration file
    #[arg(long, env = "STREAMER_CONFIG")]
    pub config: PathBuf,

    /// Destination host or full URL, overriding publish.url
    #[arg(long, visible_alias = "pc-ip", env = "STREAM_DESTINATION")]
    pub destination: Option<String>,

    /// Health server port, overriding health.http_port
    #[arg(long, env = "HEALTH_PORT")]
    pub health_port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Minimum allowed port (ports below 1024 are privileged)
const MIN_USER_PORT: u16 = 1024;

/// Longest grace a stage gets between SIGTERM and SIGKILL
const MAX_STOP_GRACE_SECS: f64 = 3600.0;

/// Everything the binary needs after loading: the stream config and how to log
#[derive(Debug, Clone)]
pub struct Settings {
    pub stream: StreamConfig,
    pub logging: LoggingSection,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(port) = self.health_port {
            Self::validate_port(port, "health")?;
        }

        if let Some(destination) = &self.destination {
            if destination.trim().is_empty() {
                anyhow::bail!("Destination override cannot be empty");
            }
        }

        Ok(())
    }

    fn validate_port(port: u16, name: &str) -> anyhow::Result<()> {
        if port == 0 {
            anyhow::bail!("Invalid {} port: port cannot be 0", name);
        }
        if port < MIN_USER_PORT {
            anyhow::bail!(
                "Invalid {} port: {} is a privileged port (< {}). Use a port >= {}",
                name,
                port,
                MIN_USER_PORT,
                MIN_USER_PORT
            );
        }
        Ok(())
    }

    /// Read the config file and apply command-line overrides
    pub fn load(&self) -> anyhow::Result<Settings> {
        let file = FileConfig::load(&self.config)?;
        let stream = file.to_stream_config(self.destination.as_deref(), self.health_port)?;
        Ok(Settings {
            stream,
            logging: file.logging,
        })
    }
}

/// On-disk YAML layout
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub camera: CameraSection,
    pub publish: PublishSection,
    #[serde(default)]
    pub health: HealthSection,
    #[serde(default)]
    pub watchdog: WatchdogSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub markers: MarkersSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CameraSection {
    pub mode: String,
    pub device: Option<PathBuf>,
    pub input_format: Option<String>,
    pub encoder: Option<String>,
    #[serde(default = "default_resolution")]
    pub resolution: String,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_bitrate_kbps")]
    pub bitrate_kbps: u32,
    #[serde(default = "default_gop")]
    pub gop: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishSection {
    pub protocol: String,
    pub url: String,
    pub sdp_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthSection {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchdogSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_backoff_seconds")]
    pub backoff_seconds: Vec<f64>,
    #[serde(default = "default_stop_grace_seconds")]
    pub stop_grace_seconds: f64,
}

impl Default for WatchdogSection {
    fn default() -> Self {
        Self {
            enabled: true,
            backoff_seconds: default_backoff_seconds(),
            stop_grace_seconds: default_stop_grace_seconds(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsSection {
    pub capture: Option<String>,
    pub ffmpeg: Option<String>,
}

/// Each list, when present, replaces the built-in markers of that kind
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkersSection {
    pub steady: Option<Vec<String>>,
    pub fatal: Option<Vec<String>>,
    pub warning: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_resolution() -> String {
    "1280x720".to_string()
}

fn default_fps() -> u32 {
    30
}

fn default_bitrate_kbps() -> u32 {
    2500
}

fn default_gop() -> u32 {
    60
}

fn default_http_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_backoff_seconds() -> Vec<f64> {
    vec![1.0, 2.0, 5.0, 10.0, 30.0]
}

fn default_stop_grace_seconds() -> f64 {
    5.0
}

fn default_log_level() -> String {
    "info".to_string()
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(raw).context("Failed to parse YAML")
    }

    /// Validate every field and build the immutable stream configuration
    pub fn to_stream_config(
        &self,
        destination_override: Option<&str>,
        health_port_override: Option<u16>,
    ) -> anyhow::Result<StreamConfig> {
        let camera = &self.camera;
        let kind: DeviceKind = camera.mode.parse()?;
        let resolution: Resolution = camera.resolution.parse()?;

        let mut source =
            CaptureSource::new(kind, resolution, camera.fps, camera.bitrate_kbps, camera.gop)?;
        if let Some(device) = &camera.device {
            source = source.with_device(device.clone());
        }
        if let Some(input_format) = &camera.input_format {
            source = source.with_input_format(input_format.as_str());
        }
        if let Some(encoder) = &camera.encoder {
            source = source.with_encoder(encoder.as_str());
        }

        let protocol: DestinationProtocol = self.publish.protocol.parse()?;
        let mut destination = Destination::new(protocol, self.publish.url.trim().to_string())?;
        if let Some(sdp_file) = &self.publish.sdp_file {
            destination = destination.with_sdp_file(sdp_file.clone());
        }
        if let Some(target) = destination_override {
            destination = destination.with_override(target)?;
        }

        let health_port = health_port_override.unwrap_or(self.health.http_port);
        Config::validate_port(health_port, "health")?;

        let grace = self.watchdog.stop_grace_seconds;
        if !grace.is_finite() || grace <= 0.0 || grace > MAX_STOP_GRACE_SECS {
            anyhow::bail!(
                "watchdog.stop_grace_seconds must be between 0 and {}, got {}",
                MAX_STOP_GRACE_SECS,
                grace
            );
        }
        let stop_grace = Duration::try_from_secs_f64(grace)
            .with_context(|| format!("watchdog.stop_grace_seconds out of range: {}", grace))?;

        let defaults = ToolPaths::default();
        let tools = ToolPaths {
            capture: self.tools.capture.clone().unwrap_or(defaults.capture),
            ffmpeg: self.tools.ffmpeg.clone().unwrap_or(defaults.ffmpeg),
        };

        let mut markers = DiagnosticMarkers::default();
        if let Some(steady) = &self.markers.steady {
            markers = markers.with_steady(steady.clone());
        }
        if let Some(fatal) = &self.markers.fatal {
            markers = markers.with_fatal(fatal.clone());
        }
        if let Some(warning) = &self.markers.warning {
            markers = markers.with_warning(warning.clone());
        }

        Ok(StreamConfig::new(source, destination, health_port)?
            .with_backoff(BackoffSchedule::from_secs(&self.watchdog.backoff_seconds)?)
            .with_auto_retry(self.watchdog.enabled)
            .with_stop_grace(stop_grace)
            .with_tools(tools)
            .with_markers(markers))
    }
}
