use std::path::PathBuf;
use std::str::FromStr;

use crate::domain::errors::{DomainError, Result};

/// Default RTP port when an override host carries none
const DEFAULT_RTP_PORT: u16 = 5000;

/// Destination protocol family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationProtocol {
    /// Connection-oriented push to a media relay (RTMP)
    RelayPush,
    /// Connectionless transport straight to an endpoint (RTP)
    DirectTransport,
}

impl DestinationProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            DestinationProtocol::RelayPush => "rtmp",
            DestinationProtocol::DirectTransport => "rtp",
        }
    }

    fn scheme(&self) -> &'static str {
        match self {
            DestinationProtocol::RelayPush => "rtmp://",
            DestinationProtocol::DirectTransport => "rtp://",
        }
    }
}

impl FromStr for DestinationProtocol {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rtmp" | "relay-push" => Ok(DestinationProtocol::RelayPush),
            "rtp" | "direct-transport" => Ok(DestinationProtocol::DirectTransport),
            _ => Err(DomainError::UnknownProtocol(s.to_string())),
        }
    }
}

/// Where the stream is published
#[derive(Debug, Clone, PartialEq)]
pub struct Destination {
    protocol: DestinationProtocol,
    url: String,
    sdp_file: PathBuf,
}

impl Destination {
    pub fn new(protocol: DestinationProtocol, url: String) -> Result<Self> {
        Self::validate_url(protocol, &url)?;

        Ok(Self {
            protocol,
            url,
            sdp_file: PathBuf::from("/tmp/stream.sdp"),
        })
    }

    pub fn with_sdp_file(mut self, sdp_file: PathBuf) -> Self {
        self.sdp_file = sdp_file;
        self
    }

    /// Apply an invocation-time override.
    ///
    /// A value containing `://` replaces the URL outright. A bare host keeps the
    /// protocol's conventional layout: `rtmp://HOST/live/cam` for relay push,
    /// `rtp://HOST:PORT` for direct transport (port taken from the configured URL).
    pub fn with_override(self, target: &str) -> Result<Self> {
        let target = target.trim();
        let url = if target.contains("://") {
            target.to_string()
        } else {
            match self.protocol {
                DestinationProtocol::RelayPush => format!("rtmp://{}/live/cam", target),
                DestinationProtocol::DirectTransport => {
                    format!("rtp://{}:{}", target, self.rtp_port().unwrap_or(DEFAULT_RTP_PORT))
                }
            }
        };

        Self::validate_url(self.protocol, &url)?;
        Ok(Self { url, ..self })
    }

    pub fn protocol(&self) -> DestinationProtocol {
        self.protocol
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn sdp_file(&self) -> &PathBuf {
        &self.sdp_file
    }

    fn rtp_port(&self) -> Option<u16> {
        let authority = self.url.strip_prefix("rtp://")?;
        let authority = authority.split(['/', '?']).next()?;
        authority.rsplit_once(':')?.1.parse().ok()
    }

    fn validate_url(protocol: DestinationProtocol, url: &str) -> Result<()> {
        let host = url.strip_prefix(protocol.scheme()).unwrap_or_default();
        if host.is_empty() || host.starts_with('/') || url.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidDestination {
                protocol: protocol.as_str(),
                url: url.to_string(),
            });
        }
        Ok(())
    }
}
