//! Log throttling utility.
//!
//! Limits how often the same log message is recorded, so a per-packet failure (a sender
//! erroring on every frame, an IDR arriving with no cached parameter sets) doesn't flood
//! the log at frame rate.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Log throttler that limits how often the same message is logged.
pub struct LogThrottler {
    last_logged: RwLock<HashMap<String, Instant>>,
    interval: Duration,
}

impl LogThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_logged: RwLock::new(HashMap::new()),
            interval,
        }
    }

    pub fn with_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Returns `true` if the message should be logged (not throttled). If `true` is
    /// returned, the internal timestamp is updated.
    pub fn should_log(&self, key: &str) -> bool {
        let now = Instant::now();
        {
            let map = self.last_logged.read().unwrap();
            if let Some(last) = map.get(key) {
                if now.duration_since(*last) < self.interval {
                    return false;
                }
            }
        }

        let mut map = self.last_logged.write().unwrap();
        if let Some(last) = map.get(key) {
            if now.duration_since(*last) < self.interval {
                return false;
            }
        }
        map.insert(key.to_string(), now);
        true
    }
}

impl Default for LogThrottler {
    /// 5 second throttle interval.
    fn default() -> Self {
        Self::with_secs(5)
    }
}

/// Throttled `tracing::warn!`.
#[macro_export]
macro_rules! warn_throttled {
    ($throttler:expr, $key:expr, $($arg:tt)*) => {
        if $throttler.should_log($key) {
            tracing::warn!($($arg)*);
        }
    };
}
