use crate::registry::SiteConfig;
use std::time::{Duration, Instant};

/// Politeness state for one host
///
/// Tracks the two admission gates: how many tasks are in flight against the
/// host and when the host last received a dispatch.
#[derive(Debug, Clone)]
pub struct HostState {
    /// Tasks currently dispatched to workers
    pub in_flight: u32,

    /// When the last task for this host was dispatched
    pub last_dispatch: Option<Instant>,

    /// Lower bound on the request delay (e.g. robots.txt Crawl-delay)
    pub delay_floor: Duration,
}

impl HostState {
    pub fn new() -> Self {
        Self {
            in_flight: 0,
            last_dispatch: None,
            delay_floor: Duration::ZERO,
        }
    }

    /// Effective delay between dispatches: the larger of configured and floor
    pub fn effective_delay(&self, site: &SiteConfig) -> Duration {
        std::cmp::max(site.request_delay, self.delay_floor)
    }

    /// Checks whether another task may be dispatched to this host now
    ///
    /// Enforces:
    /// - In-flight count below `max_concurrency`
    /// - The effective delay has passed since the last dispatch
    pub fn can_dispatch(&self, site: &SiteConfig, now: Instant) -> bool {
        if self.in_flight >= site.max_concurrency {
            return false;
        }

        self.time_until_next_dispatch(site, now).is_none()
    }

    /// Time until the delay gate opens, or None if it is already open
    fn time_until_next_dispatch(&self, site: &SiteConfig, now: Instant) -> Option<Duration> {
        let last = self.last_dispatch?;
        let delay = self.effective_delay(site);
        let elapsed = now.saturating_duration_since(last);
        if elapsed < delay {
            Some(delay - elapsed)
        } else {
            None
        }
    }

    /// Records a dispatch
    pub fn record_dispatch(&mut self, now: Instant) {
        self.in_flight += 1;
        self.last_dispatch = Some(now);
    }

    /// Records that a dispatched task came back (success, failure, or release)
    pub fn record_return(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }
}

impl Default for HostState {
    fn default() -> Self {
        Self::new()
    }
}
