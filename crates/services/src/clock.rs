//! Time source for the rate limiter.
//!
//! Production code uses [`SystemClock`]; tests drive time explicitly with
//! [`ManualClock`] (available in test builds or with the `testing` feature).

use std::fmt::Debug;
use std::time::Instant;

/// Port for obtaining the current monotonic instant.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Instant;
}

/// System clock implementation using `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(any(test, feature = "testing"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "testing"))]
mod manual {
    use super::Clock;
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::{Duration, Instant};

    /// Clock that only moves when told to. Clones share the same time.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        current: Arc<Mutex<Instant>>,
    }

    impl ManualClock {
        pub fn new(start: Instant) -> Self {
            Self {
                current: Arc::new(Mutex::new(start)),
            }
        }

        pub fn advance(&self, by: Duration) {
            *self.current.lock().unwrap_or_else(PoisonError::into_inner) += by;
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new(Instant::now())
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.current.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }
}
