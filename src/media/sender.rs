//! The boundary between the media plane and the WebRTC stack.
//!
//! The fan-out engine and packetizer never touch `RTCPeerConnection`/`TrackLocalStaticRTP`
//! directly — they hand finished `rtp::packet::Packet`s to whatever implements
//! [`RtpSender`]. Production sessions are backed by [`TrackRtpSender`], a thin wrapper over
//! `webrtc`'s `TrackLocalStaticRTP`; tests use an in-memory recorder.

use std::sync::Arc;

use async_trait::async_trait;
use rtp::packet::Packet;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocalWriter;

/// One outbound RTP destination for a session. `Send + Sync` so it can be shared behind an
/// `Arc` and driven from the fan-out task.
#[async_trait]
pub trait RtpSender: Send + Sync {
    async fn write_rtp(&self, packet: &Packet) -> Result<(), SenderError>;

    /// Tear down whatever this sender is backed by. Called exactly once per session, either
    /// from a terminal ICE/connection-state callback or from process shutdown closing every
    /// still-registered session. No-op by default for senders with nothing to close.
    async fn close(&self) {}
}

#[derive(Debug, thiserror::Error)]
#[error("rtp send failed: {0}")]
pub struct SenderError(pub String);

/// Sends packets on a `TrackLocalStaticRTP` bound to a peer connection's video transceiver;
/// also holds the peer connection itself so [`RtpSender::close`] can tear it down without
/// the fan-out engine ever touching `RTCPeerConnection` directly.
pub struct TrackRtpSender {
    track: Arc<TrackLocalStaticRTP>,
    pc: Arc<RTCPeerConnection>,
}

impl TrackRtpSender {
    pub fn new(track: Arc<TrackLocalStaticRTP>, pc: Arc<RTCPeerConnection>) -> Self {
        Self { track, pc }
    }
}

#[async_trait]
impl RtpSender for TrackRtpSender {
    async fn write_rtp(&self, packet: &Packet) -> Result<(), SenderError> {
        self.track
            .write_rtp(packet)
            .await
            .map(|_| ())
            .map_err(|e| SenderError(e.to_string()))
    }

    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            tracing::warn!(error = %e, "error closing peer connection");
        }
    }
}
