//! h264-relay - a live one-to-many H.264-over-WebRTC video relay.
//!
//! UDP H.264 Annex-B ingest is framed into NAL units, parameter sets are cached, RTP
//! packets are built per RFC 6184, and fan-out dispatches every frame to each registered
//! WebRTC peer session.

pub mod config;
pub mod error;
pub mod ingest;
pub mod media;
pub mod state;
pub mod utils;
pub mod web;
pub mod webrtc;

pub use error::{AppError, Result};
