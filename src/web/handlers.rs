use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::error::Result;
use crate::state::AppState;
use crate::webrtc::negotiate;

/// `POST /offer` success body: `{code:0, type:"answer", sdp, connectionId}`.
#[derive(Serialize)]
pub struct OfferResponse {
    code: i32,
    #[serde(rename = "type")]
    kind: &'static str,
    sdp: String,
    #[serde(rename = "connectionId")]
    connection_id: String,
}

/// Accepts an SDP offer as `text/*` of any MIME type (axum's `String` extractor reads the
/// raw body without a content-type check) and returns the rewritten answer.
pub async fn offer(
    State(state): State<Arc<AppState>>,
    offer_sdp: String,
) -> Result<Json<OfferResponse>> {
    let negotiated = negotiate(state.plane.clone(), &state.config, offer_sdp).await?;
    state.record_new_connection();

    Ok(Json(OfferResponse {
        code: 0,
        kind: "answer",
        sdp: negotiated.answer_sdp,
        connection_id: negotiated.session_id,
    }))
}

#[derive(Serialize)]
pub struct ConnectionDetail {
    id: String,
    #[serde(rename = "frameCount")]
    frame_count: u64,
    #[serde(rename = "sentSPSPPS")]
    sent_sps_pps: bool,
    #[serde(rename = "iceState")]
    ice_state: String,
    #[serde(rename = "connectionState")]
    connection_state: String,
}

#[derive(Serialize)]
pub struct StatsResponse {
    #[serde(rename = "totalConnections")]
    total_connections: u64,
    #[serde(rename = "activeConnections")]
    active_connections: usize,
    #[serde(rename = "packetsReceived")]
    packets_received: u64,
    #[serde(rename = "bytesReceived")]
    bytes_received: u64,
    uptime: u64,
    #[serde(rename = "hasSPS")]
    has_sps: bool,
    #[serde(rename = "hasPPS")]
    has_pps: bool,
    #[serde(rename = "connectionDetails")]
    connection_details: Vec<ConnectionDetail>,
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let sessions = state.plane.snapshot_sessions().await;
    let mut connection_details = Vec::with_capacity(sessions.len());
    for session in &sessions {
        connection_details.push(ConnectionDetail {
            id: session.id.clone(),
            frame_count: session.stats().frames_sent,
            sent_sps_pps: session.has_sent_parameter_sets(),
            ice_state: session.ice_state().await,
            connection_state: session.connection_state().await,
        });
    }

    Json(StatsResponse {
        total_connections: state.total_connections(),
        active_connections: state.plane.active_session_count().await,
        packets_received: state.ingest_stats.packets_received(),
        bytes_received: state.ingest_stats.bytes_received(),
        uptime: state.uptime_secs(),
        has_sps: state.plane.cache.has_sps().await,
        has_pps: state.plane.cache.has_pps().await,
        connection_details,
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    connections: usize,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connections: state.plane.active_session_count().await,
    })
}
