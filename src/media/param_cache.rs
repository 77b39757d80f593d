//! Process-wide cache of the most recently seen SPS/PPS, used both to prime late-joining
//! sessions and to rewrite SDP answers with `sprop-parameter-sets`.

use bytes::Bytes;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    sps: Option<Bytes>,
    pps: Option<Bytes>,
}

/// SPS/PPS cache. Writes are last-wins; a [`ParamCache::snapshot`] is an atomic read of both
/// values with respect to any single write, but a snapshot observing a fresh SPS need not
/// observe a fresh PPS written concurrently — fan-out tolerates the mismatch and simply
/// emits whatever is cached at the moment it decides to prime a session.
#[derive(Debug, Default)]
pub struct ParamCache {
    inner: RwLock<Inner>,
}

impl ParamCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_sps(&self, sps: Bytes) {
        self.inner.write().await.sps = Some(sps);
    }

    pub async fn set_pps(&self, pps: Bytes) {
        self.inner.write().await.pps = Some(pps);
    }

    /// Byte copies safe to transmit or hold across an `.await`.
    pub async fn snapshot(&self) -> (Option<Bytes>, Option<Bytes>) {
        let inner = self.inner.read().await;
        (inner.sps.clone(), inner.pps.clone())
    }

    pub async fn has_sps(&self) -> bool {
        self.inner.read().await.sps.is_some()
    }

    pub async fn has_pps(&self) -> bool {
        self.inner.read().await.pps.is_some()
    }
}
