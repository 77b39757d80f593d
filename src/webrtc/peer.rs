//! C4 — peer session creation, the signaling-facing half of it. Builds an
//! `RTCPeerConnection` per the spec's contract (send-only H.264 transceiver, NACK+PLI
//! feedback, max-bundle), rewrites the answer via `media::sdp`, extracts the SSRC, and
//! registers a [`PeerSession`] with the [`MediaPlane`]. Terminal ICE/connection states drive
//! cleanup.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use uuid::Uuid;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_H264};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCPFeedback;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocal;

use super::config::ice_servers;
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::media::fanout::{MediaPlane, DISCONNECT_GRACE};
use crate::media::sdp::inject_parameter_sets;
use crate::media::sender::TrackRtpSender;
use crate::media::session::PeerSession;

/// What the signaling handler hands back to the HTTP caller.
pub struct NegotiatedSession {
    pub session_id: String,
    pub answer_sdp: String,
}

/// Negotiate one peer from an SDP offer: build the peer connection, apply the offer,
/// produce and rewrite the answer, extract the SSRC, and register a [`PeerSession`] with
/// `plane`. Mirrors the eight steps of the spec's §4.4 exactly in order.
pub async fn negotiate(
    plane: Arc<MediaPlane>,
    config: &AppConfig,
    offer_sdp: String,
) -> Result<NegotiatedSession> {
    let session_id = Uuid::new_v4().to_string();

    let mut media_engine = MediaEngine::default();
    media_engine
        .register_codec(
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_H264.to_owned(),
                    clock_rate: config.rtp.clock_rate,
                    channels: 0,
                    sdp_fmtp_line:
                        "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f"
                            .to_owned(),
                    rtcp_feedback: vec![
                        RTCPFeedback {
                            typ: "nack".to_owned(),
                            parameter: "".to_owned(),
                        },
                        RTCPFeedback {
                            typ: "nack".to_owned(),
                            parameter: "pli".to_owned(),
                        },
                    ],
                },
                payload_type: config.rtp.payload_type,
                ..Default::default()
            },
            RTPCodecType::Video,
        )
        .map_err(|e| AppError::WebRtc(format!("registering H.264 codec: {e}")))?;

    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine)
        .map_err(|e| AppError::WebRtc(format!("registering interceptors: {e}")))?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let rtc_config = RTCConfiguration {
        ice_servers: ice_servers(&config.ice),
        bundle_policy: RTCBundlePolicy::MaxBundle,
        ..Default::default()
    };

    let pc = Arc::new(
        api.new_peer_connection(rtc_config)
            .await
            .map_err(|e| AppError::WebRtc(format!("creating peer connection: {e}")))?,
    );

    // Step 2: send-only video transceiver bound to a sink track, single H.264 entry.
    let sink_track = Arc::new(TrackLocalStaticRTP::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_H264.to_owned(),
            clock_rate: config.rtp.clock_rate,
            ..Default::default()
        },
        "video".to_owned(),
        format!("h264-relay-{session_id}"),
    ));

    pc.add_track(sink_track.clone() as Arc<dyn TrackLocal + Send + Sync>)
        .await
        .map_err(|e| AppError::WebRtc(format!("adding video track: {e}")))?;

    for transceiver in pc.get_transceivers().await {
        if transceiver.sender().await.track().await.is_some() {
            transceiver
                .set_direction(RTCRtpTransceiverDirection::Sendonly)
                .await;
        }
    }

    setup_cleanup_callbacks(pc.clone(), plane.clone(), session_id.clone());

    // Step 3: apply the offer, produce a local answer.
    let offer =
        RTCSessionDescription::offer(offer_sdp).map_err(|e| AppError::InvalidOffer(e.to_string()))?;
    pc.set_remote_description(offer)
        .await
        .map_err(|e| AppError::InvalidOffer(format!("set_remote_description: {e}")))?;

    let answer = pc
        .create_answer(None)
        .await
        .map_err(|e| AppError::WebRtc(format!("create_answer: {e}")))?;

    // Step 4: rewrite the answer to carry sprop-parameter-sets.
    let (sps, pps) = plane.cache.snapshot().await;
    let rewritten_sdp = inject_parameter_sets(
        &answer.sdp,
        config.rtp.payload_type,
        config.rtp.clock_rate,
        sps.as_ref(),
        pps.as_ref(),
    );

    // Step 5: apply the rewritten answer as the local description.
    let local_desc = RTCSessionDescription::answer(rewritten_sdp.clone())
        .map_err(|e| AppError::WebRtc(format!("building rewritten answer: {e}")))?;
    pc.set_local_description(local_desc)
        .await
        .map_err(|e| AppError::WebRtc(format!("set_local_description: {e}")))?;

    // Grace period for ICE candidate gathering. Trickle ICE and the rest of the
    // ICE/DTLS/SRTP pipeline are the `webrtc` crate's concern, not this module's.
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Step 6: extract SSRC from the (already rewritten) locally-applied SDP.
    let ssrc = extract_ssrc(&rewritten_sdp)
        .ok_or_else(|| AppError::WebRtc("answer SDP carries no a=ssrc line".to_string()))?;

    // Steps 7-8: construct the packetizer/session and register it.
    let sender = Arc::new(TrackRtpSender::new(sink_track, pc.clone()));
    let session = Arc::new(PeerSession::new(
        session_id.clone(),
        ssrc,
        config.rtp.payload_type,
        config.rtp.clock_rate,
        config.rtp.fps,
        config.rtp.mtu,
        sender,
    ));
    plane.register(session).await;

    info!(session = %session_id, ssrc, "peer session negotiated");

    Ok(NegotiatedSession {
        session_id,
        answer_sdp: rewritten_sdp,
    })
}

/// Reads the first `a=ssrc:<n>` line in the whole SDP. Safe here because the transceiver
/// configuration permits exactly one video m-line (see DESIGN.md Open Questions — in a
/// multi-m-line SDP this could pick the wrong stream, but that shape never occurs here).
fn extract_ssrc(sdp: &str) -> Option<u32> {
    sdp.lines().find_map(|line| {
        let rest = line.strip_prefix("a=ssrc:")?;
        let token = rest.split_whitespace().next()?;
        u32::from_str(token).ok()
    })
}

/// `GET /stats`'s `iceState`/`connectionState` fields are diagnostics only, so the exact
/// wording doesn't matter — mapped by hand rather than relying on the state enums'
/// `Display` impl, matching the teacher's own explicit-match style for these callbacks.
fn ice_state_label(state: RTCIceConnectionState) -> &'static str {
    match state {
        RTCIceConnectionState::Unspecified => "unspecified",
        RTCIceConnectionState::New => "new",
        RTCIceConnectionState::Checking => "checking",
        RTCIceConnectionState::Connected => "connected",
        RTCIceConnectionState::Completed => "completed",
        RTCIceConnectionState::Disconnected => "disconnected",
        RTCIceConnectionState::Failed => "failed",
        RTCIceConnectionState::Closed => "closed",
    }
}

fn connection_state_label(state: RTCPeerConnectionState) -> &'static str {
    match state {
        RTCPeerConnectionState::Unspecified => "unspecified",
        RTCPeerConnectionState::New => "new",
        RTCPeerConnectionState::Connecting => "connecting",
        RTCPeerConnectionState::Connected => "connected",
        RTCPeerConnectionState::Disconnected => "disconnected",
        RTCPeerConnectionState::Failed => "failed",
        RTCPeerConnectionState::Closed => "closed",
    }
}

/// Wires the terminal-state rules from the spec's §4.4:
/// - ICE `failed`/`closed`/`disconnected` schedules cleanup after a 3s grace window,
///   unconditionally and without cancellation on recovery (see DESIGN.md Open Questions —
///   reproduced as documented rather than "fixed").
/// - Peer-connection `failed`/`closed` triggers immediate cleanup.
///
/// Both paths funnel through [`cleanup`], guarded by `done` so repeated/overlapping
/// transitions never double-deregister.
fn setup_cleanup_callbacks(pc: Arc<RTCPeerConnection>, plane: Arc<MediaPlane>, session_id: String) {
    let done = Arc::new(AtomicBool::new(false));

    {
        let plane = plane.clone();
        let session_id = session_id.clone();
        let done = done.clone();
        pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            let plane = plane.clone();
            let session_id = session_id.clone();
            let done = done.clone();
            Box::pin(async move {
                if let Some(session) = plane.get_session(&session_id).await {
                    session.set_ice_state(ice_state_label(state)).await;
                }
                if matches!(
                    state,
                    RTCIceConnectionState::Failed
                        | RTCIceConnectionState::Closed
                        | RTCIceConnectionState::Disconnected
                ) {
                    tokio::spawn(async move {
                        tokio::time::sleep(DISCONNECT_GRACE).await;
                        cleanup(&plane, &session_id, &done).await;
                    });
                }
            })
        }));
    }

    {
        let done = done.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let plane = plane.clone();
            let session_id = session_id.clone();
            let done = done.clone();
            Box::pin(async move {
                if let Some(session) = plane.get_session(&session_id).await {
                    session.set_connection_state(connection_state_label(state)).await;
                }
                if matches!(
                    state,
                    RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed
                ) {
                    cleanup(&plane, &session_id, &done).await;
                }
            })
        }));
    }
}

/// Idempotent: removes the session from the table and closes it (which closes the peer
/// connection via its `RtpSender`, dropping the sink track with it).
async fn cleanup(plane: &Arc<MediaPlane>, session_id: &str, done: &AtomicBool) {
    if done.swap(true, Ordering::AcqRel) {
        return;
    }
    if let Some(session) = plane.deregister(&session_id.to_string()).await {
        session.close().await;
    }
}
