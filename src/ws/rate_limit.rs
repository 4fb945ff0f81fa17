//! Per-connection token buckets.
//!
//! Control-plane frames draw one token per message; audio frames bypass the
//! message count but draw from a byte bucket. Three consecutive violations
//! close the connection.

use std::time::Instant;

/// Violations tolerated before the connection is closed.
const MAX_STRIKES: u8 = 3;

/// A standard token bucket.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last: Instant,
}

impl TokenBucket {
    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec,
            last: Instant::now(),
        }
    }

    /// Try to take `n` tokens at the current time.
    pub fn try_take(&mut self, n: f64) -> bool {
        self.try_take_at(n, Instant::now())
    }

    fn try_take_at(&mut self, n: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        self.last = now;
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        if self.tokens >= n {
            self.tokens -= n;
            true
        } else {
            false
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitVerdict {
    /// Process the frame.
    Allow,
    /// Drop the frame and report `RATE_LIMITED`.
    Drop,
    /// Third consecutive violation: close the connection.
    Close,
}

/// The rate-limit state of one connection.
#[derive(Debug)]
pub struct ConnectionLimits {
    control: TokenBucket,
    audio_bytes: TokenBucket,
    strikes: u8,
}

impl ConnectionLimits {
    pub fn new(control_per_sec: f64, audio_bytes_per_sec: f64) -> Self {
        Self {
            control: TokenBucket::new(control_per_sec, control_per_sec),
            audio_bytes: TokenBucket::new(audio_bytes_per_sec, audio_bytes_per_sec),
            strikes: 0,
        }
    }

    /// Check a control-plane frame.
    pub fn admit_control(&mut self) -> LimitVerdict {
        let ok = self.control_take();
        self.verdict(ok)
    }

    /// Check an audio frame of `bytes` length.
    pub fn admit_audio(&mut self, bytes: usize) -> LimitVerdict {
        let ok = self.audio_bytes.try_take(bytes as f64);
        self.verdict(ok)
    }

    fn control_take(&mut self) -> bool {
        self.control.try_take(1.0)
    }

    fn verdict(&mut self, allowed: bool) -> LimitVerdict {
        if allowed {
            self.strikes = 0;
            return LimitVerdict::Allow;
        }
        self.strikes += 1;
        if self.strikes >= MAX_STRIKES {
            LimitVerdict::Close
        } else {
            LimitVerdict::Drop
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn bucket_empties_and_refills() {
        let mut bucket = TokenBucket::new(2.0, 2.0);
        let t0 = Instant::now();
        assert!(bucket.try_take_at(1.0, t0));
        assert!(bucket.try_take_at(1.0, t0));
        assert!(!bucket.try_take_at(1.0, t0));
        // half a second refills one token at 2/s
        assert!(bucket.try_take_at(1.0, t0 + Duration::from_millis(500)));
    }

    #[test]
    fn bucket_never_exceeds_capacity() {
        let mut bucket = TokenBucket::new(1.0, 100.0);
        let t0 = Instant::now();
        assert!(bucket.try_take_at(1.0, t0));
        // a long idle period still refills to capacity only
        assert!(bucket.try_take_at(1.0, t0 + Duration::from_secs(60)));
        assert!(!bucket.try_take_at(1.0, t0 + Duration::from_secs(60)));
    }

    #[test]
    fn three_consecutive_violations_close() {
        let mut limits = ConnectionLimits::new(1.0, 10.0);
        assert_eq!(limits.admit_control(), LimitVerdict::Allow);
        assert_eq!(limits.admit_control(), LimitVerdict::Drop);
        assert_eq!(limits.admit_control(), LimitVerdict::Drop);
        assert_eq!(limits.admit_control(), LimitVerdict::Close);
    }

    #[test]
    fn allowed_frame_resets_strikes() {
        let mut limits = ConnectionLimits::new(1.0, 1024.0);
        assert_eq!(limits.admit_control(), LimitVerdict::Allow);
        assert_eq!(limits.admit_control(), LimitVerdict::Drop);
        // audio within budget is allowed and clears the strike count
        assert_eq!(limits.admit_audio(512), LimitVerdict::Allow);
        assert_eq!(limits.admit_control(), LimitVerdict::Drop);
        assert_eq!(limits.admit_control(), LimitVerdict::Drop);
        assert_eq!(limits.admit_control(), LimitVerdict::Close);
    }

    #[test]
    fn audio_bytes_are_capped() {
        let mut limits = ConnectionLimits::new(10.0, 1024.0);
        assert_eq!(limits.admit_audio(1024), LimitVerdict::Allow);
        assert_eq!(limits.admit_audio(1024), LimitVerdict::Drop);
    }
}
