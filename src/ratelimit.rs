//! Token-bucket rate limiting for log messages.
//!
//! Call sites that can fire per-message or per-poll own a
//! [`RateLimiter`](struct.RateLimiter.html) and log through
//! [`rl_warn!`](../macro.rl_warn.html). The limiter refills one token per
//! `interval` up to `burst` tokens; a denied call only bumps a counter, and
//! the count of suppressed messages is reported on the next admitted line.

use std::time::{Duration, Instant};

/// Default budget: one message per five seconds, burst of five.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_BURST: u32 = 5;

#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    burst: u32,
    tokens: u32,
    last_fill: Option<Instant>,
    suppressed: u64,
}

impl Default for RateLimiter {
    fn default() -> Self {
        RateLimiter::new(DEFAULT_INTERVAL, DEFAULT_BURST)
    }
}

impl RateLimiter {
    pub fn new(interval: Duration, burst: u32) -> Self {
        RateLimiter {
            interval,
            burst,
            tokens: burst,
            last_fill: None,
            suppressed: 0,
        }
    }

    fn refill(&mut self, now: Instant) {
        let last = match self.last_fill {
            Some(last) => last,
            None => {
                self.last_fill = Some(now);
                return;
            }
        };
        if self.interval.as_secs() == 0 && self.interval.subsec_nanos() == 0 {
            self.tokens = self.burst;
            return;
        }
        let elapsed = now.duration_since(last);
        let mut earned = 0;
        let mut acc = self.interval;
        while acc <= elapsed && earned < self.burst {
            earned += 1;
            acc += self.interval;
        }
        if earned > 0 {
            self.tokens = (self.tokens + earned).min(self.burst);
            self.last_fill = Some(now);
        }
    }

    /// Try to take a token. On success, returns the number of calls that
    /// were suppressed since the last admitted one.
    pub fn admit(&mut self) -> Option<u64> {
        self.admit_at(Instant::now())
    }

    fn admit_at(&mut self, now: Instant) -> Option<u64> {
        self.refill(now);
        if self.tokens > 0 {
            self.tokens -= 1;
            let dropped = self.suppressed;
            self.suppressed = 0;
            Some(dropped)
        } else {
            self.suppressed += 1;
            None
        }
    }
}

/// `warn!` behind a token bucket. The suppressed-message count, if any, is
/// appended to the admitted line.
#[macro_export]
macro_rules! rl_warn {
    ($rl:expr, $($arg:tt)*) => {
        if let Some(dropped) = $rl.admit() {
            if dropped > 0 {
                warn!("{} ({} messages suppressed)", format_args!($($arg)*), dropped);
            } else {
                warn!($($arg)*);
            }
        }
    };
}

/// Like [`rl_warn!`](macro.rl_warn.html) at info level.
#[macro_export]
macro_rules! rl_info {
    ($rl:expr, $($arg:tt)*) => {
        if let Some(dropped) = $rl.admit() {
            if dropped > 0 {
                info!("{} ({} messages suppressed)", format_args!($($arg)*), dropped);
            } else {
                info!($($arg)*);
            }
        }
    };
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_burst_then_deny() {
        let mut rl = RateLimiter::new(Duration::from_secs(5), 2);
        assert_eq!(rl.admit(), Some(0));
        assert_eq!(rl.admit(), Some(0));
        assert_eq!(rl.admit(), None);
        assert_eq!(rl.admit(), None);
    }

    #[test]
    fn test_suppressed_count_reported() {
        let start = Instant::now();
        let mut rl = RateLimiter::new(Duration::from_secs(5), 1);
        assert_eq!(rl.admit_at(start), Some(0));
        assert_eq!(rl.admit_at(start), None);
        assert_eq!(rl.admit_at(start), None);
        let later = start + Duration::from_secs(6);
        assert_eq!(rl.admit_at(later), Some(2));
    }
}
