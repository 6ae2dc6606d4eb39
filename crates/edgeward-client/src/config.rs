//! Client configuration types.

use governor::Quota;
use std::num::NonZeroU32;

/// Client-side request rate limiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Sustained requests per second
    pub requests_per_second: u32,

    /// Requests allowed in a burst
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitConfig {
    /// Create a new rate limit configuration
    #[must_use]
    pub const fn new() -> Self {
        Self {
            requests_per_second: 10,
            burst: 20,
        }
    }

    /// Set sustained requests per second
    #[must_use]
    pub const fn requests_per_second(mut self, rps: u32) -> Self {
        self.requests_per_second = rps;
        self
    }

    /// Set burst size
    #[must_use]
    pub const fn burst(mut self, burst: u32) -> Self {
        self.burst = burst;
        self
    }

    /// Governor quota for this configuration, zero values clamp to one
    #[must_use]
    pub fn quota(&self) -> Quota {
        let rps = NonZeroU32::new(self.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(self.burst).unwrap_or(NonZeroU32::MIN);
        Quota::per_second(rps).allow_burst(burst)
    }
}
