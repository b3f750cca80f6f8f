//! Wall-clock seconds derived from the tokio timer.
//!
//! The pipeline reads "now" through this so that timestamps and the timers
//! that wait on them come from the same source. Under a paused tokio runtime
//! both advance together.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

use crate::model::Timestamp;

#[derive(Debug, Clone, Copy)]
pub struct Clock {
    epoch: Timestamp,
    origin: Instant,
}

impl Clock {
    /// Clock anchored to the system time.
    pub fn system() -> Self {
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs_f64();
        Self::starting_at(epoch)
    }

    /// Clock reading `epoch` right now.
    pub fn starting_at(epoch: Timestamp) -> Self {
        Self {
            epoch,
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> Timestamp {
        self.epoch + self.origin.elapsed().as_secs_f64()
    }

    /// How long until `at`, zero if it has passed. Saturates at
    /// `Duration::MAX` for a target too far out to represent.
    pub fn until(&self, at: Timestamp) -> Duration {
        let remaining = at - self.now();
        if remaining > 0.0 {
            Duration::try_from_secs_f64(remaining).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        }
    }
}
