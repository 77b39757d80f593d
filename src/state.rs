//! Process-wide application state shared across the signaling handlers and the ingest task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::AppConfig;
use crate::ingest::IngestStats;
use crate::media::fanout::MediaPlane;

/// Everything a signaling handler needs: the static config, the media plane (cache +
/// session table), ingest counters, and the two numbers `/stats` can't get anywhere else
/// (process uptime and the lifetime connection count, since the session table only ever
/// holds the sessions still registered).
pub struct AppState {
    pub config: AppConfig,
    pub plane: Arc<MediaPlane>,
    pub ingest_stats: Arc<IngestStats>,
    start_time: Instant,
    total_connections: AtomicU64,
}

impl AppState {
    pub fn new(config: AppConfig, plane: Arc<MediaPlane>, ingest_stats: Arc<IngestStats>) -> Self {
        Self {
            config,
            plane,
            ingest_stats,
            start_time: Instant::now(),
            total_connections: AtomicU64::new(0),
        }
    }

    /// Called once per successfully negotiated session; the session table shrinks on
    /// teardown but this count never does.
    pub fn record_new_connection(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
