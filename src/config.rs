//! Layered configuration: built-in defaults -> optional TOML file -> CLI overrides.
//!
//! This relay's configuration is immutable after startup (there is no web-based config
//! mutation in scope, unlike the teacher's SQLite-backed `ConfigStore`), so a plain
//! `AppConfig::default()` + `toml` overlay is enough.

use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Top-level configuration, one section per external interface in the spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub signaling: SignalingConfig,
    pub udp: UdpConfig,
    pub rtp: RtpConfig,
    pub ice: IceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            signaling: SignalingConfig::default(),
            udp: UdpConfig::default(),
            rtp: RtpConfig::default(),
            ice: IceConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load defaults, then overlay a TOML file if one was given. CLI overrides are applied
    /// by the caller afterward (see `main.rs`), since `clap` flags are only meaningful
    /// combined with an already-loaded config.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let Some(path) = config_path else {
            return Ok(Self::default());
        };

        let contents = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("reading {}: {}", path.display(), e)))?;
        toml::from_str(&contents)
            .map_err(|e| AppError::Config(format!("parsing {}: {}", path.display(), e)))
    }
}

/// `POST /offer`, `GET /stats`, `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    pub host: IpAddr,
    pub port: u16,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: 1988,
        }
    }
}

/// The raw H.264 Annex-B ingest socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpConfig {
    pub host: IpAddr,
    pub port: u16,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: 8554,
        }
    }
}

/// RTP wire parameters shared by every session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtpConfig {
    /// Must fit in 7 bits: byte 1 of the RTP header packs `payload_type | (marker << 7)`.
    /// Not validated, matching the rest of this config surface (see DESIGN.md).
    pub payload_type: u8,
    pub clock_rate: u32,
    pub fps: u32,
    pub mtu: usize,
}

impl Default for RtpConfig {
    fn default() -> Self {
        Self {
            payload_type: 96,
            clock_rate: 90_000,
            fps: 30,
            mtu: 1200,
        }
    }
}

/// ICE server configuration handed to each new `RTCPeerConnection`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IceConfig {
    pub stun: Option<String>,
    pub turn: Option<TurnServer>,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            stun: Some("stun:stun.l.google.com:19302".to_string()),
            turn: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TurnServer {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}
