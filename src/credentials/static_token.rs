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

//! Static token [Credentials] type.
//!
//! These credentials return one fixed bearer token, with no refresh and no
//! expiry. Useful when a token is issued out of band, and as fallback
//! credentials for the [iam](crate::credentials::iam) builder.
//!
//! Example usage:
//!
//! ```
//! # use cloud_iam_auth::credentials::static_token::Builder;
//! # use cloud_iam_auth::errors::Error;
//! # tokio_test::block_on(async {
//! let credentials = Builder::new("my-token").build();
//! let token = credentials.token().await?;
//! assert_eq!(token.token, "my-token");
//! # Ok::<(), Error>(())
//! # });
//! ```

use crate::Result;
use crate::credentials::Credentials;
use crate::credentials::dynamic::CredentialsProvider;
use crate::headers_util::build_bearer_headers;
use crate::token::Token;
use http::header::{HeaderName, HeaderValue};
use std::sync::Arc;

/// A builder for static token [Credentials].
pub struct Builder {
    token: String,
}

impl Builder {
    /// Creates a new builder for the given token value.
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Returns a [Credentials] instance holding the token.
    pub fn build(self) -> Credentials {
        Credentials {
            inner: Arc::new(StaticTokenCredentials {
                token: Token {
                    token: self.token,
                    token_type: "Bearer".to_string(),
                    expires_at: None,
                },
            }),
        }
    }
}

#[derive(Debug)]
struct StaticTokenCredentials {
    token: Token,
}

#[async_trait::async_trait]
impl CredentialsProvider for StaticTokenCredentials {
    async fn token(&self) -> Result<Token> {
        Ok(self.token.clone())
    }

    async fn headers(&self) -> Result<Vec<(HeaderName, HeaderValue)>> {
        build_bearer_headers(&self.token)
    }
}
