//! C5 — the fan-out engine. Classifies each framed NAL and drives SPS/PPS priming plus
//! per-session packetization, using the process-wide cache and session table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use super::nalu::Nal;
use super::param_cache::ParamCache;
use super::session::{PeerSession, SessionId};
use crate::utils::LogThrottler;
use crate::warn_throttled;

const NAL_TYPE_NON_IDR_SLICE: u8 = 1;
const NAL_TYPE_IDR_SLICE: u8 = 5;
const NAL_TYPE_SPS: u8 = 7;
const NAL_TYPE_PPS: u8 = 8;

/// Process-wide state: the parameter-set cache plus the live session table. Held behind an
/// `Arc` and threaded into the ingest task and every signaling handler.
pub struct MediaPlane {
    pub cache: ParamCache,
    sessions: RwLock<HashMap<SessionId, Arc<PeerSession>>>,
    throttle: LogThrottler,
}

impl MediaPlane {
    pub fn new() -> Self {
        Self {
            cache: ParamCache::new(),
            sessions: RwLock::new(HashMap::new()),
            throttle: LogThrottler::with_secs(5),
        }
    }

    pub async fn register(&self, session: Arc<PeerSession>) {
        self.sessions.write().await.insert(session.id.clone(), session);
    }

    /// Idempotent: returns the removed session, if it was still present.
    pub async fn deregister(&self, id: &SessionId) -> Option<Arc<PeerSession>> {
        self.sessions.write().await.remove(id)
    }

    /// `Arc` clone of one session by id, for diagnostics callbacks that need to update a
    /// single session (e.g. recording its latest ICE/connection state) without the
    /// allocation cost of a full snapshot.
    pub async fn get_session(&self, id: &SessionId) -> Option<Arc<PeerSession>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn active_session_count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_active())
            .count()
    }

    /// `Arc` clones of every session, taken under a brief read guard so a concurrent
    /// deregister never mutates the collection fan-out is iterating.
    pub async fn snapshot_sessions(&self) -> Vec<Arc<PeerSession>> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Close every still-registered session and empty the table. Used on process shutdown
    /// so the documented lifecycle invariant ("shutdown closes all sessions synchronously
    /// before exit") actually holds, mirroring the teacher's
    /// `PeerConnectionManager::close_all`.
    pub async fn close_all(&self) {
        let sessions: Vec<Arc<PeerSession>> = self.sessions.write().await.drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.close().await;
        }
    }

    /// Classify one framed NAL and fan it out. SPS/PPS update the cache and are never
    /// forwarded on their own; everything else is dispatched to every active session,
    /// primed with cached SPS/PPS first if this is that session's first IDR.
    pub async fn dispatch_nal(&self, nal: &Nal) {
        let nal_type = nal.nal_type();

        match nal_type {
            NAL_TYPE_SPS => {
                self.cache.set_sps(nal.data.clone()).await;
                return;
            }
            NAL_TYPE_PPS => {
                self.cache.set_pps(nal.data.clone()).await;
                return;
            }
            _ => {}
        }

        let is_idr = nal_type == NAL_TYPE_IDR_SLICE;
        let is_video_frame = is_idr || nal_type == NAL_TYPE_NON_IDR_SLICE;

        for session in self.snapshot_sessions().await {
            if !session.is_active() {
                continue;
            }

            if is_idr && !session.has_sent_parameter_sets() {
                self.prime_session(&session).await;
            }

            if let Err(e) = session.dispatch(&nal.data, is_video_frame, is_video_frame).await {
                warn_throttled!(
                    self.throttle,
                    "sender_error",
                    "RTP send failed on session {}: {e}",
                    session.id
                );
            }
        }
    }

    /// Send the cached SPS then PPS (if both are present) at the session's current
    /// timestamp, with `marker=false`, and mark the session primed. Per the spec, a session
    /// with only one of the two cached simply forwards the IDR unprimed and tries again on
    /// the next IDR.
    async fn prime_session(&self, session: &PeerSession) {
        let (sps, pps) = self.cache.snapshot().await;
        let (Some(sps), Some(pps)) = (sps, pps) else {
            warn_throttled!(
                self.throttle,
                "missing_parameter_sets",
                "session {} reached IDR with no cached SPS/PPS; forwarding unprimed",
                session.id
            );
            return;
        };

        if let Err(e) = session.dispatch(&sps, false, false).await {
            warn_throttled!(
                self.throttle,
                "sender_error",
                "RTP send failed priming SPS on session {}: {e}",
                session.id
            );
        }
        if let Err(e) = session.dispatch(&pps, false, false).await {
            warn_throttled!(
                self.throttle,
                "sender_error",
                "RTP send failed priming PPS on session {}: {e}",
                session.id
            );
        }
        session.mark_parameter_sets_sent();
    }
}

impl Default for MediaPlane {
    fn default() -> Self {
        Self::new()
    }
}

/// The delayed cleanup grace window after an ICE state of `disconnected` (see
/// `webrtc::peer`). Kept here since both the fan-out engine and the peer glue reference it
/// for the same documented (if debatable) behavior: scheduled unconditionally, never
/// cancelled on recovery.
pub const DISCONNECT_GRACE: Duration = Duration::from_secs(3);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::sender::tests::RecordingSender;
    use crate::media::session::PeerSession;
    use bytes::Bytes;

    fn session(id: &str, ts: u32, sender: Arc<RecordingSender>) -> Arc<PeerSession> {
        Arc::new(PeerSession::with_initial_timestamp(
            id.to_string(),
            0x1000 + id.len() as u32,
            96,
            90000,
            30,
            1200,
            sender,
            ts,
        ))
    }

    fn sps() -> Bytes {
        Bytes::from_static(&[0x67, 1, 2, 3])
    }
    fn pps() -> Bytes {
        Bytes::from_static(&[0x68, 4, 5])
    }
    fn idr() -> Bytes {
        Bytes::from_static(&[0x65, 6, 7, 8])
    }

    #[tokio::test]
    async fn scenario_1_sps_pps_idr_one_session() {
        let plane = MediaPlane::new();
        let sender = Arc::new(RecordingSender::default());
        let s = session("s1", 1000, sender.clone());
        plane.register(s.clone()).await;

        plane.dispatch_nal(&Nal { data: sps() }).await;
        plane.dispatch_nal(&Nal { data: pps() }).await;
        plane.dispatch_nal(&Nal { data: idr() }).await;

        let packets = sender.packets.lock().await;
        assert_eq!(packets.len(), 3);
        assert!(packets.iter().all(|p| p.header.timestamp == 1000));
        assert!(!packets[0].header.marker);
        assert!(!packets[1].header.marker);
        assert!(packets[2].header.marker);
        assert!(s.has_sent_parameter_sets());
        assert_eq!(s.current_timestamp().await, 1000 + 90000 / 30);
    }

    #[tokio::test]
    async fn scenario_3_oversized_non_idr_no_priming() {
        let plane = MediaPlane::new();
        let sender = Arc::new(RecordingSender::default());
        let s = session("s1", 2000, sender.clone());
        plane.register(s.clone()).await;
        plane.dispatch_nal(&Nal { data: sps() }).await;
        plane.dispatch_nal(&Nal { data: pps() }).await;

        let mut big = vec![0x41u8]; // non-IDR slice header byte (type 1)
        big.extend(vec![0xABu8; 4999]);
        plane.dispatch_nal(&Nal { data: Bytes::from(big) }).await;

        let packets = sender.packets.lock().await;
        // No SPS/PPS priming burst for a non-IDR frame.
        assert_eq!(packets.len(), (5000 - 1usize).div_ceil(1200 - 14));
        assert!(!s.has_sent_parameter_sets());
        assert!(packets.last().unwrap().header.marker);
        assert!(packets[..packets.len() - 1].iter().all(|p| !p.header.marker));
    }

    #[tokio::test]
    async fn scenario_4_two_sessions_independent_priming() {
        let plane = MediaPlane::new();
        plane.dispatch_nal(&Nal { data: sps() }).await;
        plane.dispatch_nal(&Nal { data: pps() }).await;

        let sender_a = Arc::new(RecordingSender::default());
        let sender_b = Arc::new(RecordingSender::default());
        let a = session("a", 111, sender_a.clone());
        let b = session("b", 999, sender_b.clone());
        plane.register(a.clone()).await;
        plane.register(b.clone()).await;

        plane.dispatch_nal(&Nal { data: idr() }).await;

        assert!(a.has_sent_parameter_sets());
        assert!(b.has_sent_parameter_sets());
        assert_eq!(sender_a.packets.lock().await.len(), 3);
        assert_eq!(sender_b.packets.lock().await.len(), 3);
        // Independent starting timestamps survive into the priming burst.
        assert_eq!(sender_a.packets.lock().await[0].header.timestamp, 111);
        assert_eq!(sender_b.packets.lock().await[0].header.timestamp, 999);
    }

    #[tokio::test]
    async fn scenario_5_mid_stream_sps_replacement() {
        let plane = MediaPlane::new();
        let sps1 = Bytes::from_static(&[0x67, 0xAA]);
        let sps2 = Bytes::from_static(&[0x67, 0xBB]);
        plane.dispatch_nal(&Nal { data: sps1 }).await;
        plane.dispatch_nal(&Nal { data: sps2.clone() }).await;
        plane.dispatch_nal(&Nal { data: pps() }).await;

        let sender = Arc::new(RecordingSender::default());
        let s = session("late", 0, sender.clone());
        plane.register(s).await;
        plane.dispatch_nal(&Nal { data: idr() }).await;

        let packets = sender.packets.lock().await;
        assert_eq!(packets[0].payload.as_ref(), sps2.as_ref());
    }

    #[tokio::test]
    async fn idr_with_no_cache_is_forwarded_unprimed() {
        let plane = MediaPlane::new();
        let sender = Arc::new(RecordingSender::default());
        let s = session("s1", 0, sender.clone());
        plane.register(s.clone()).await;

        plane.dispatch_nal(&Nal { data: idr() }).await;

        let packets = sender.packets.lock().await;
        assert_eq!(packets.len(), 1); // IDR only, no priming burst
        assert!(!s.has_sent_parameter_sets()); // tries again next IDR
    }

    #[tokio::test]
    async fn inactive_sessions_are_skipped() {
        let plane = MediaPlane::new();
        plane.dispatch_nal(&Nal { data: sps() }).await;
        plane.dispatch_nal(&Nal { data: pps() }).await;

        let sender = Arc::new(RecordingSender::default());
        let s = session("s1", 0, sender.clone());
        s.mark_closed();
        plane.register(s).await;

        plane.dispatch_nal(&Nal { data: idr() }).await;
        assert_eq!(sender.packets.lock().await.len(), 0);
    }

    #[tokio::test]
    async fn sender_failure_does_not_abort_other_sessions() {
        let plane = MediaPlane::new();
        plane.dispatch_nal(&Nal { data: sps() }).await;
        plane.dispatch_nal(&Nal { data: pps() }).await;

        let failing = Arc::new(RecordingSender::failing());
        let ok_sender = Arc::new(RecordingSender::default());
        let a = session("a", 0, failing);
        let b = session("b", 0, ok_sender.clone());
        plane.register(a).await;
        plane.register(b.clone()).await;

        plane.dispatch_nal(&Nal { data: idr() }).await;

        assert_eq!(ok_sender.packets.lock().await.len(), 3);
        assert!(b.has_sent_parameter_sets());
    }

    #[tokio::test]
    async fn deregister_is_idempotent() {
        let plane = MediaPlane::new();
        let s = session("s1", 0, Arc::new(RecordingSender::default()));
        plane.register(s.clone()).await;
        assert!(plane.deregister(&s.id).await.is_some());
        assert!(plane.deregister(&s.id).await.is_none());
        assert_eq!(plane.session_count().await, 0);
    }
}
