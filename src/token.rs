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

//! Types and functions to work with bearer tokens.

use crate::Result;
use time::OffsetDateTime;

/// Represents a bearer token.
#[derive(Clone, PartialEq)]
pub struct Token {
    /// The actual token string.
    ///
    /// This is the value used in `Authorization:` headers.
    pub token: String,

    /// The type of the token.
    ///
    /// The most common type is `"Bearer"` but other types may appear in the
    /// future.
    pub token_type: String,

    /// The instant at which the token service declared the token expired.
    ///
    /// If `None`, the token does not expire. Note that the client refreshes
    /// tokens well before this instant; applications should not implement
    /// their own expiration handling on top.
    pub expires_at: Option<OffsetDateTime>,
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("token", &"[censored]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A token as returned by the exchange, before the cache decorates it.
#[derive(Clone, PartialEq)]
pub(crate) struct IssuedToken {
    /// The opaque token value.
    pub(crate) token: String,
    /// The absolute expiry declared by the token service.
    pub(crate) expires_at: OffsetDateTime,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token", &"[censored]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Produces a freshly issued token for the given instant.
///
/// The cache calls this with the instant it captured at the start of a
/// refresh, so the assertion timestamps and the cached validity deadline are
/// computed from the same moment.
#[async_trait::async_trait]
pub(crate) trait TokenProvider: std::fmt::Debug + Send + Sync {
    async fn fetch(&self, now: OffsetDateTime) -> Result<IssuedToken>;
}
