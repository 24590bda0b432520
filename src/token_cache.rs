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

//! The token cache.
//!
//! Holds the current bearer token and refreshes it through the inner
//! [TokenProvider] when stale. The cache treats a token as stale at the
//! midpoint of its server-granted lifetime, not at the true deadline, to
//! absorb clock skew and avoid tokens expiring mid-flight.

use crate::Result;
use crate::clock::Clock;
use crate::token::{Token, TokenProvider};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};

#[derive(Clone, Debug)]
struct CachedToken {
    token: Token,
    valid_until: OffsetDateTime,
}

#[derive(Debug)]
pub(crate) struct TokenCache<T>
where
    T: TokenProvider,
{
    // The cached token and its validity deadline. Both fields are always
    // stored together; a failed refresh leaves the previous value in place.
    current: RwLock<Option<CachedToken>>,

    // Serializes refreshes. Holding this lock does not block readers of a
    // still-valid token.
    refresh: Mutex<()>,

    clock: Arc<dyn Clock>,

    // This thing does the actual refreshing.
    inner: T,
}

impl<T> TokenCache<T>
where
    T: TokenProvider,
{
    pub(crate) fn new(inner: T, clock: Arc<dyn Clock>) -> Self {
        Self {
            current: RwLock::new(None),
            refresh: Mutex::new(()),
            clock,
            inner,
        }
    }

    // Clones the current token if it is still valid. Releases the read lock
    // on return.
    async fn valid_token(&self) -> Option<Token> {
        let guard = self.current.read().await;
        guard
            .as_ref()
            .filter(|cached| self.clock.now() < cached.valid_until)
            .map(|cached| cached.token.clone())
    }

    pub(crate) async fn token(&self) -> Result<Token> {
        if let Some(token) = self.valid_token().await {
            return Ok(token);
        }

        let _refresh = self.refresh.lock().await;

        // Re-check after winning the refresh lock: another caller may have
        // completed a refresh while we waited. If it failed instead, we run
        // our own attempt.
        if let Some(token) = self.valid_token().await {
            return Ok(token);
        }

        let now = self.clock.now();
        let issued = self.inner.fetch(now).await?;

        // Request a fresh token at the midpoint of the granted lifetime,
        // never at the true deadline.
        let valid_until = now + (issued.expires_at - now) / 2;
        let token = Token {
            token: issued.token,
            token_type: "Bearer".to_string(),
            expires_at: Some(issued.expires_at),
        };
        *self.current.write().await = Some(CachedToken {
            token: token.clone(),
            valid_until,
        });
        Ok(token)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clock::SystemClock;
    use crate::clock::test::FakeClock;
    use crate::errors::Error;
    use crate::token::IssuedToken;
    use crate::token::test::MockTokenProvider;
    use std::collections::VecDeque;
    use std::time::Duration;
    use time::macros::datetime;

    const HOUR: Duration = Duration::from_secs(3600);

    fn start() -> OffsetDateTime {
        datetime!(2026-08-05 12:00 UTC)
    }

    #[tokio::test]
    async fn valid_token_is_returned_without_second_fetch() {
        let clock = Arc::new(FakeClock::new(start()));

        let mut mock = MockTokenProvider::new();
        mock.expect_fetch().times(1).returning(|now| {
            Ok(IssuedToken {
                token: "test-token".to_string(),
                expires_at: now + 2 * HOUR,
            })
        });

        let cache = TokenCache::new(mock, clock);
        let first = cache.token().await.unwrap();
        assert_eq!(first.token, "test-token");
        assert_eq!(first.token_type, "Bearer");
        assert_eq!(first.expires_at, Some(start() + 2 * HOUR));

        // A second request is served from the cache; the mock would panic on
        // a second fetch.
        let second = cache.token().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn initial_fetch_failure_is_not_cached() {
        let clock = Arc::new(FakeClock::new(start()));

        let mut mock = MockTokenProvider::new();
        mock.expect_fetch()
            .times(2)
            .returning(|_| Err(Error::transport(true, "try again")));

        let cache = TokenCache::new(mock, clock);
        assert!(cache.token().await.is_err());

        // The error is not cached; the next call fetches again.
        assert!(cache.token().await.is_err());
    }

    #[tokio::test]
    async fn token_is_stale_at_half_of_granted_lifetime() {
        let clock = Arc::new(FakeClock::new(start()));

        let mut mock = MockTokenProvider::new();
        mock.expect_fetch().times(1).returning(|now| {
            Ok(IssuedToken {
                token: "first".to_string(),
                expires_at: now + HOUR,
            })
        });
        mock.expect_fetch().times(1).returning(|now| {
            Ok(IssuedToken {
                token: "second".to_string(),
                expires_at: now + HOUR,
            })
        });

        let cache = TokenCache::new(mock, clock.clone());
        assert_eq!(cache.token().await.unwrap().token, "first");

        // One second before the midpoint the token is still served from the
        // cache, even though half of its lifetime is almost gone.
        clock.advance(HOUR / 2 - Duration::from_secs(1));
        assert_eq!(cache.token().await.unwrap().token, "first");

        // At the midpoint the cache refreshes, well before the server
        // deadline.
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.token().await.unwrap().token, "second");
    }

    #[tokio::test]
    async fn failed_refresh_leaves_cache_reusable() {
        let clock = Arc::new(FakeClock::new(start()));

        let mut mock = MockTokenProvider::new();
        mock.expect_fetch().times(1).returning(|now| {
            Ok(IssuedToken {
                token: "initial".to_string(),
                expires_at: now + HOUR,
            })
        });
        mock.expect_fetch()
            .times(1)
            .returning(|_| Err(Error::transport(true, "exchange down")));
        mock.expect_fetch().times(1).returning(|now| {
            Ok(IssuedToken {
                token: "recovered".to_string(),
                expires_at: now + HOUR,
            })
        });

        let cache = TokenCache::new(mock, clock.clone());
        assert_eq!(cache.token().await.unwrap().token, "initial");

        clock.advance(HOUR);

        // The expired token is not silently reused as a fallback value.
        let err = cache.token().await.unwrap_err();
        assert!(err.is_transport(), "{err:?}");

        // The failure did not corrupt the cache; the next attempt succeeds.
        assert_eq!(cache.token().await.unwrap().token, "recovered");
    }

    #[derive(Debug)]
    struct SlowTokenProvider {
        calls: Arc<std::sync::Mutex<i32>>,
    }

    #[async_trait::async_trait]
    impl TokenProvider for SlowTokenProvider {
        async fn fetch(&self, now: OffsetDateTime) -> Result<IssuedToken> {
            // Give the waiters in a thundering herd enough time to pile up.
            tokio::time::sleep(Duration::from_millis(50)).await;
            *self.calls.lock().unwrap() += 1;
            Ok(IssuedToken {
                token: "herd-token".to_string(),
                expires_at: now + HOUR,
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_requests_share_one_refresh() {
        let calls = Arc::new(std::sync::Mutex::new(0));
        let cache = Arc::new(TokenCache::new(
            SlowTokenProvider {
                calls: calls.clone(),
            },
            Arc::new(SystemClock),
        ));

        // Spawn N tasks, all asking for a token at once.
        let tasks = (0..100)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.token().await })
            })
            .collect::<Vec<_>>();

        for task in tasks {
            let token = task.await.unwrap().unwrap();
            assert_eq!(token.token, "herd-token");
        }

        // Only the first caller past the refresh lock performs the exchange;
        // everybody else observes its result.
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[derive(Debug)]
    struct SequenceProvider {
        results: std::sync::Mutex<VecDeque<(&'static str, Duration)>>,
    }

    #[async_trait::async_trait]
    impl TokenProvider for SequenceProvider {
        async fn fetch(&self, now: OffsetDateTime) -> Result<IssuedToken> {
            let (token, lifetime) = self
                .results
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected fetch");
            Ok(IssuedToken {
                token: token.to_string(),
                expires_at: now + lifetime,
            })
        }
    }

    #[tokio::test]
    async fn refresh_follows_server_granted_lifetimes() {
        let clock = Arc::new(FakeClock::new(start()));
        let provider = SequenceProvider {
            results: std::sync::Mutex::new(VecDeque::from([
                ("foo", HOUR),
                ("bar", Duration::from_secs(1)),
                ("baz", Duration::ZERO),
                ("qux", HOUR),
            ])),
        };
        let cache = TokenCache::new(provider, clock.clone());

        assert_eq!(cache.token().await.unwrap().token, "foo");

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.token().await.unwrap().token, "foo");

        // The first token reached the midpoint of its lifetime; the server
        // grants the replacement only one second.
        clock.advance(HOUR);
        assert_eq!(cache.token().await.unwrap().token, "bar");

        // "bar" went stale after half a second. "baz" arrives with a zero
        // lifetime, so it is stale the moment it is stored.
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.token().await.unwrap().token, "baz");
        assert_eq!(cache.token().await.unwrap().token, "qux");

        assert!(cache.inner.results.lock().unwrap().is_empty());
    }
}
