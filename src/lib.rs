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

//! IAM token credentials.
//!
//! This crate issues and caches short-lived bearer tokens for a service
//! identity. A client signs a time-bounded assertion with the service
//! account's RSA private key, exchanges it at the IAM token service for an
//! opaque bearer token with a server-declared expiry, and serves that token
//! from a cache until the midpoint of its lifetime. Client libraries consume
//! a [credentials::Credentials] instance and attach the returned token to
//! every outbound request.
//!
//! Tokens are refreshed lazily: the first request past the cached deadline
//! performs one exchange, concurrent requests share its result, and nothing
//! runs in the background between requests. Failures are returned to the
//! caller that hit them; the crate never retries or logs on its own.

/// Types and functions to work with credentials.
pub mod credentials;

/// Errors created while building or using credentials.
pub mod errors;

/// Types and functions to work with bearer tokens.
pub mod token;

/// The injectable time source.
pub mod clock;

pub(crate) mod constants;
pub(crate) mod headers_util;
pub(crate) mod token_cache;
pub(crate) mod transport;

/// A `Result` alias where the `Err` case is `cloud_iam_auth::errors::Error`.
pub(crate) type Result<T> = std::result::Result<T, crate::errors::Error>;
