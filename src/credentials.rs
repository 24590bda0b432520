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

//! Credentials types.
//!
//! A [Credentials] instance produces bearer tokens on demand and is safe to
//! share across tasks and threads. The concrete behavior is selected at
//! construction time: [iam] credentials sign an assertion with a
//! service-account private key and exchange it at a token service, caching
//! the result; [static_token] credentials always return one fixed token.

pub mod iam;
pub mod static_token;

use crate::Result;
use crate::token::Token;
use http::header::{HeaderName, HeaderValue};
use std::sync::Arc;

/// A bearer-token source that is refreshed automatically and can be shared
/// across threads.
///
/// Cloning is cheap: clones share one token cache.
#[derive(Clone, Debug)]
pub struct Credentials {
    inner: Arc<dyn dynamic::CredentialsProvider>,
}

impl Credentials {
    /// Returns a valid bearer token, refreshing it first when the cached one
    /// went stale.
    pub async fn token(&self) -> Result<Token> {
        self.inner.token().await
    }

    /// Returns the headers to attach to an outbound request, typically one
    /// `Authorization:` header with a sensitive value.
    pub async fn headers(&self) -> Result<Vec<(HeaderName, HeaderValue)>> {
        self.inner.headers().await
    }
}

pub(crate) mod dynamic {
    use super::*;

    /// The implementation behind a [Credentials] instance.
    #[async_trait::async_trait]
    pub trait CredentialsProvider: Send + Sync + std::fmt::Debug {
        async fn token(&self) -> Result<Token>;
        async fn headers(&self) -> Result<Vec<(HeaderName, HeaderValue)>>;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::headers_util::build_bearer_headers;

    #[derive(Debug)]
    struct FakeProvider;

    #[async_trait::async_trait]
    impl dynamic::CredentialsProvider for FakeProvider {
        async fn token(&self) -> Result<Token> {
            Ok(Token {
                token: "fake-token".to_string(),
                token_type: "Bearer".to_string(),
                expires_at: None,
            })
        }

        async fn headers(&self) -> Result<Vec<(HeaderName, HeaderValue)>> {
            build_bearer_headers(&self.token().await?)
        }
    }

    #[tokio::test]
    async fn clones_share_the_provider() {
        let credentials = Credentials {
            inner: Arc::new(FakeProvider),
        };
        let clone = credentials.clone();
        assert_eq!(credentials.token().await.unwrap().token, "fake-token");
        assert_eq!(clone.token().await.unwrap().token, "fake-token");

        let headers = credentials.headers().await.unwrap();
        assert_eq!(headers[0].1.to_str().unwrap(), "Bearer fake-token");
    }
}
