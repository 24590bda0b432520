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

//! Helpers to turn tokens into request headers.

use crate::Result;
use crate::errors::Error;
use crate::token::Token;
use http::header::{AUTHORIZATION, HeaderName, HeaderValue};

/// A utility function to create bearer headers.
pub(crate) fn build_bearer_headers(token: &Token) -> Result<Vec<(HeaderName, HeaderValue)>> {
    let mut value = HeaderValue::from_str(&format!("{} {}", token.token_type, token.token))
        .map_err(|e| Error::transport(false, e))?;
    value.set_sensitive(true);
    Ok(vec![(AUTHORIZATION, value)])
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bearer_header_is_sensitive() {
        let token = Token {
            token: "test-token".to_string(),
            token_type: "Bearer".to_string(),
            expires_at: None,
        };
        let headers = build_bearer_headers(&token).unwrap();
        let (name, value) = &headers[0];
        assert_eq!(name, &AUTHORIZATION);
        assert_eq!(value.to_str().unwrap(), "Bearer test-token");
        assert!(value.is_sensitive());
    }

    #[test]
    fn malformed_token_is_an_error() {
        let token = Token {
            token: "bad\ntoken".to_string(),
            token_type: "Bearer".to_string(),
            expires_at: None,
        };
        assert!(build_bearer_headers(&token).is_err());
    }
}
