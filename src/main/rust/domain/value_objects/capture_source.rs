use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::domain::errors::{DomainError, Result};

/// Kind of capture hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Pi camera module: rpicam-vid encodes, a separate publisher muxes
    CameraModule,
    /// Generic V4L2 device: a single ffmpeg captures, encodes and publishes
    VideoDevice,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::CameraModule => "csi",
            DeviceKind::VideoDevice => "usb",
        }
    }
}

impl FromStr for DeviceKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csi" | "camera-module" => Ok(DeviceKind::CameraModule),
            "usb" | "v4l2" | "video-device" => Ok(DeviceKind::VideoDevice),
            _ => Err(DomainError::UnknownDeviceKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(DomainError::InvalidResolution(format!("{}x{}", width, height)));
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl FromStr for Resolution {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || DomainError::InvalidResolution(s.to_string());
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width = w.trim().parse::<u32>().map_err(|_| invalid())?;
        let height = h.trim().parse::<u32>().map_err(|_| invalid())?;
        Self::new(width, height).map_err(|_| invalid())
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Capture device and encoder settings
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSource {
    kind: DeviceKind,
    device: PathBuf,
    input_format: String,
    encoder: String,
    resolution: Resolution,
    fps: u32,
    bitrate_kbps: u32,
    keyframe_interval: u32,
}

impl CaptureSource {
    pub fn new(
        kind: DeviceKind,
        resolution: Resolution,
        fps: u32,
        bitrate_kbps: u32,
        keyframe_interval: u32,
    ) -> Result<Self> {
        if fps == 0 {
            return Err(DomainError::ZeroValue("fps"));
        }
        if bitrate_kbps == 0 {
            return Err(DomainError::ZeroValue("bitrate_kbps"));
        }
        if keyframe_interval == 0 {
            return Err(DomainError::ZeroValue("gop"));
        }

        Ok(Self {
            kind,
            device: PathBuf::from("/dev/video0"),
            input_format: "mjpeg".to_string(),
            encoder: "h264_v4l2m2m".to_string(),
            resolution,
            fps,
            bitrate_kbps,
            keyframe_interval,
        })
    }

    pub fn with_device(mut self, device: PathBuf) -> Self {
        self.device = device;
        self
    }

    pub fn with_input_format(mut self, input_format: impl Into<String>) -> Self {
        self.input_format = input_format.into();
        self
    }

    pub fn with_encoder(mut self, encoder: impl Into<String>) -> Self {
        self.encoder = encoder.into();
        self
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn device(&self) -> &PathBuf {
        &self.device
    }

    pub fn input_format(&self) -> &str {
        &self.input_format
    }

    pub fn encoder(&self) -> &str {
        &self.encoder
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn bitrate_kbps(&self) -> u32 {
        self.bitrate_kbps
    }

    pub fn bitrate_bps(&self) -> u64 {
        u64::from(self.bitrate_kbps) * 1000
    }

    pub fn keyframe_interval(&self) -> u32 {
        self.keyframe_interval
    }
}
