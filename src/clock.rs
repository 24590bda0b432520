// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! An injectable time source.
//!
//! All expiry comparisons and assertion timestamps go through a [Clock], so
//! tests can substitute a deterministic one and move time forward without
//! real sleeps.

use time::OffsetDateTime;

/// A source of the current wall-clock time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current instant.
    fn now(&self) -> OffsetDateTime;
}

/// The default [Clock], backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use std::sync::Mutex;

    /// A manually advanced clock. Shared across the cache and the test via
    /// `Arc`.
    #[derive(Debug)]
    pub(crate) struct FakeClock {
        current: Mutex<OffsetDateTime>,
    }

    impl FakeClock {
        pub(crate) fn new(start: OffsetDateTime) -> Self {
            Self {
                current: Mutex::new(start),
            }
        }

        pub(crate) fn advance(&self, delta: std::time::Duration) {
            let mut current = self.current.lock().unwrap();
            *current += delta;
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> OffsetDateTime {
            *self.current.lock().unwrap()
        }
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let t0 = clock.now();
        let t1 = clock.now();
        assert!(t1 >= t0);
    }

    #[test]
    fn fake_clock_advances() {
        let start = time::macros::datetime!(2026-08-05 12:00 UTC);
        let clock = FakeClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(std::time::Duration::from_secs(30));
        assert_eq!(clock.now(), start + time::Duration::seconds(30));
    }
}
