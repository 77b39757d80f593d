//! A single downstream WebRTC peer's RTP emission state.
//!
//! Mirrors the counters `VideoTrackStats`/`VideoTrack` carry per-track, but scoped to a peer
//! session rather than a track, and generalized to carry its own [`RtpPacketizer`] plus its
//! own RTP timestamp clock instead of sharing one mutable `sequence_number`/`timestamp` pair
//! across sessions.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rand::Rng;
use tokio::sync::{Mutex, RwLock};

use super::packetizer::RtpPacketizer;
use super::sender::RtpSender;

pub type SessionId = String;

/// Snapshot of a session's counters, safe to hold across an `.await` or serialize for `/stats`.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub frames_sent: u64,
    pub packets_sent: u64,
    pub bytes_sent: u64,
}

struct RtpState {
    packetizer: RtpPacketizer,
    timestamp: u32,
}

/// One connected peer: its packetizer/timestamp state, RTP sender, and bookkeeping flags.
pub struct PeerSession {
    pub id: SessionId,
    pub payload_type: u8,
    pub clock_rate: u32,
    pub fps: u32,
    pub mtu: usize,
    pub created_at: Instant,

    rtp_state: Mutex<RtpState>,
    sender: Arc<dyn RtpSender>,

    /// Set once this session has emitted its first SPS+PPS priming burst; governs whether
    /// `dispatch` primes again before the next IDR.
    sent_parameter_sets: AtomicBool,
    frame_count: AtomicU64,
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    active: AtomicBool,

    /// `GET /stats` diagnostics only; mirrors the `webrtc` crate's own state strings rather
    /// than re-deriving them.
    ice_state: RwLock<String>,
    connection_state: RwLock<String>,
}

impl PeerSession {
    /// Build a session with a uniformly random initial RTP timestamp, as production code
    /// should — use [`PeerSession::with_initial_timestamp`] in tests that need reproducible
    /// timestamps.
    pub fn new(
        id: SessionId,
        ssrc: u32,
        payload_type: u8,
        clock_rate: u32,
        fps: u32,
        mtu: usize,
        sender: Arc<dyn RtpSender>,
    ) -> Self {
        let initial_timestamp = rand::thread_rng().gen::<u32>();
        Self::with_initial_timestamp(
            id,
            ssrc,
            payload_type,
            clock_rate,
            fps,
            mtu,
            sender,
            initial_timestamp,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_initial_timestamp(
        id: SessionId,
        ssrc: u32,
        payload_type: u8,
        clock_rate: u32,
        fps: u32,
        mtu: usize,
        sender: Arc<dyn RtpSender>,
        initial_timestamp: u32,
    ) -> Self {
        Self {
            id,
            payload_type,
            clock_rate,
            fps,
            mtu,
            created_at: Instant::now(),
            rtp_state: Mutex::new(RtpState {
                packetizer: RtpPacketizer::new(ssrc, payload_type, mtu),
                timestamp: initial_timestamp,
            }),
            sender,
            sent_parameter_sets: AtomicBool::new(false),
            frame_count: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            active: AtomicBool::new(true),
            ice_state: RwLock::new("new".to_string()),
            connection_state: RwLock::new("new".to_string()),
        }
    }

    pub fn has_sent_parameter_sets(&self) -> bool {
        self.sent_parameter_sets.load(Ordering::Acquire)
    }

    pub fn mark_parameter_sets_sent(&self) {
        self.sent_parameter_sets.store(true, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn mark_closed(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Tear down the underlying sender (closing its peer connection, if any) and mark the
    /// session inactive. Idempotent in the sense that closing an already-inactive sender is
    /// harmless, but callers should still only reach this once per session (see
    /// `MediaPlane::deregister`/`close_all`, which remove the session from the table first).
    pub async fn close(&self) {
        self.sender.close().await;
        self.mark_closed();
    }

    pub async fn set_ice_state(&self, state: impl Into<String>) {
        *self.ice_state.write().await = state.into();
    }

    pub async fn set_connection_state(&self, state: impl Into<String>) {
        *self.connection_state.write().await = state.into();
    }

    pub async fn ice_state(&self) -> String {
        self.ice_state.read().await.clone()
    }

    pub async fn connection_state(&self) -> String {
        self.connection_state.read().await.clone()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            frames_sent: self.frame_count.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }

    /// Current RTP timestamp, for tests that want to assert timestamp grouping/advance
    /// without reaching into private state.
    pub async fn current_timestamp(&self) -> u32 {
        self.rtp_state.lock().await.timestamp
    }

    /// Packetize `nal` at the session's current timestamp and hand every resulting RTP
    /// packet to the underlying sender. `marker` sets the RTP marker bit; when
    /// `advance_after` is set, the timestamp is advanced by `floor(clock_rate / fps)` (mod
    /// 2^32) once packetization has read the pre-advance value, and `frame_count` increments.
    ///
    /// SPS/PPS priming packets and non-video NAL types pass `advance_after = false` so they
    /// share the access unit's timestamp instead of bumping the clock themselves.
    pub async fn dispatch(
        &self,
        nal: &[u8],
        marker: bool,
        advance_after: bool,
    ) -> Result<(), String> {
        let packets = {
            let mut state = self.rtp_state.lock().await;
            let timestamp = state.timestamp;
            let packets = state.packetizer.packetize(nal, marker, timestamp);
            if advance_after {
                let delta = self.clock_rate / self.fps.max(1);
                state.timestamp = state.timestamp.wrapping_add(delta);
            }
            packets
        };

        for packet in &packets {
            self.sender
                .write_rtp(packet)
                .await
                .map_err(|e| e.to_string())?;
            self.packets_sent.fetch_add(1, Ordering::Relaxed);
            self.bytes_sent
                .fetch_add(packet.payload.len() as u64, Ordering::Relaxed);
        }

        if advance_after {
            self.frame_count.fetch_add(1, Ordering::Relaxed);
        }

        Ok(())
    }
}

impl std::fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("id", &self.id)
            .field("payload_type", &self.payload_type)
            .field("clock_rate", &self.clock_rate)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::sender::tests::RecordingSender;

    fn session(sender: Arc<RecordingSender>) -> PeerSession {
        PeerSession::with_initial_timestamp("s1".to_string(), 0x1234, 96, 90000, 30, 1200, sender, 1000)
    }

    #[tokio::test]
    async fn starts_unprimed_and_active() {
        let s = session(Arc::new(RecordingSender::default()));
        assert!(!s.has_sent_parameter_sets());
        assert!(s.is_active());
        assert_eq!(s.current_timestamp().await, 1000);
    }

    #[tokio::test]
    async fn non_advancing_dispatch_leaves_timestamp_unchanged() {
        let s = session(Arc::new(RecordingSender::default()));
        s.dispatch(&[0x67, 1, 2, 3], false, false).await.unwrap();
        assert_eq!(s.current_timestamp().await, 1000);
        let stats = s.stats();
        assert_eq!(stats.packets_sent, 1);
        assert_eq!(stats.bytes_sent, 4);
        assert_eq!(stats.frames_sent, 0);
    }

    #[tokio::test]
    async fn video_frame_dispatch_advances_timestamp_and_frame_count() {
        let s = session(Arc::new(RecordingSender::default()));
        s.dispatch(&[0x65, 1, 2], true, true).await.unwrap();
        assert_eq!(s.current_timestamp().await, 1000 + 90000 / 30);
        assert_eq!(s.stats().frames_sent, 1);
    }

    #[tokio::test]
    async fn parameter_sets_and_idr_share_one_timestamp() {
        let s = session(Arc::new(RecordingSender::default()));
        s.dispatch(&[0x67, 1], false, false).await.unwrap(); // SPS
        let ts_after_sps = s.current_timestamp().await;
        s.dispatch(&[0x68, 1], false, false).await.unwrap(); // PPS
        let ts_after_pps = s.current_timestamp().await;
        s.dispatch(&[0x65, 1, 2], true, true).await.unwrap(); // IDR
        assert_eq!(ts_after_sps, 1000);
        assert_eq!(ts_after_pps, 1000);
        assert_eq!(s.current_timestamp().await, 1000 + 3000);
    }

    #[tokio::test]
    async fn mark_closed_is_observable() {
        let s = session(Arc::new(RecordingSender::default()));
        assert!(s.is_active());
        s.mark_closed();
        assert!(!s.is_active());
    }

    #[tokio::test]
    async fn sender_error_propagates_without_updating_counters() {
        let s = session(Arc::new(RecordingSender::failing()));
        let result = s.dispatch(&[0x67, 1], false, false).await;
        assert!(result.is_err());
        assert_eq!(s.stats().packets_sent, 0);
    }
}
