//! Counters surfaced through `GET /stats`. Updated from the ingest loop, read by the
//! signaling handlers; a pair of relaxed atomics is enough since these are diagnostics, not
//! anything correctness depends on.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct IngestStats {
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_datagram(&self, bytes: usize) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_accumulate() {
        let stats = IngestStats::new();
        stats.record_datagram(100);
        stats.record_datagram(50);
        assert_eq!(stats.packets_received(), 2);
        assert_eq!(stats.bytes_received(), 150);
    }
}
