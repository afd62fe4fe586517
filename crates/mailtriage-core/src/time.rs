//! Time abstraction for testability.
//!
//! TTL evaluation reads the current time through [`Clock`] exactly once
//! per run, so tests can pin or advance it.
//!
//! # Example
//!
//! ```
//! use chrono::Duration;
//! use mailtriage_core::time::{Clock, MockClock};
//!
//! let clock = MockClock::epoch();
//! let start = clock.now();
//! clock.advance(Duration::days(5));
//! assert_eq!(clock.now() - start, Duration::days(5));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A mock clock for testing time-dependent code.
///
/// Starts at a base instant and only moves when told to.
#[derive(Debug)]
pub struct MockClock {
    /// Base instant.
    base: DateTime<Utc>,
    /// Offset from base in milliseconds.
    offset_millis: AtomicI64,
}

impl MockClock {
    /// Creates a mock clock starting at `base`.
    #[must_use]
    pub const fn new(base: DateTime<Utc>) -> Self {
        Self {
            base,
            offset_millis: AtomicI64::new(0),
        }
    }

    /// Creates a mock clock starting at the Unix epoch.
    #[must_use]
    pub const fn epoch() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Creates a mock clock that can be shared with the code under test.
    #[must_use]
    pub fn shared(base: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self::new(base))
    }

    /// Advances the clock.
    pub fn advance(&self, duration: Duration) {
        self.offset_millis
            .fetch_add(duration.num_milliseconds(), Ordering::SeqCst);
    }

    /// Moves the clock to `instant`.
    pub fn set(&self, instant: DateTime<Utc>) {
        let offset = instant.signed_duration_since(self.base);
        self.offset_millis
            .store(offset.num_milliseconds(), Ordering::SeqCst);
    }

    /// Resets the clock to the base instant.
    pub fn reset(&self) {
        self.offset_millis.store(0, Ordering::SeqCst);
    }

    /// Current offset from the base instant.
    #[must_use]
    pub fn offset(&self) -> Duration {
        Duration::milliseconds(self.offset_millis.load(Ordering::SeqCst))
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + self.offset()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        self.as_ref().now()
    }
}

impl<C: Clock + ?Sized> Clock for Box<C> {
    fn now(&self) -> DateTime<Utc> {
        self.as_ref().now()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn base() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-15T10:00:00+00:00")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_mock_clock_advance() {
        let clock = MockClock::new(base());
        assert_eq!(clock.now(), base());

        clock.advance(Duration::days(5));
        assert_eq!(clock.now(), base() + Duration::days(5));
        assert_eq!(clock.offset(), Duration::days(5));
    }

    #[test]
    fn test_mock_clock_set_and_reset() {
        let clock = MockClock::new(base());
        clock.set(base() - Duration::hours(3));
        assert_eq!(clock.now(), base() - Duration::hours(3));

        clock.reset();
        assert_eq!(clock.now(), base());
    }

    #[test]
    fn test_shared_clock_moves_for_all_holders() {
        let clock = MockClock::shared(base());
        let held: Arc<dyn Clock> = clock.clone();
        clock.advance(Duration::hours(1));
        assert_eq!(held.now(), base() + Duration::hours(1));
    }

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock(base());
        assert_eq!(clock.now(), clock.now());
        assert_eq!((&clock).now(), base());
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        assert!(clock.now() >= first);
    }
}
