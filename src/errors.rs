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

//! Errors created while building or using [Credentials].
//!
//! [Credentials]: crate::credentials::Credentials

use http::StatusCode;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type for credentials builders and token requests.
///
/// Applications rarely need to create instances of this error type. The
/// exception might be when testing application code, where the application
/// mocks the behavior of this crate.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    /// The client configuration is incomplete or contradictory. This error is
    /// permanent: the client cannot be built from the same inputs.
    pub fn is_configuration(&self) -> bool {
        matches!(self.0, ErrorKind::Configuration(_))
    }

    /// The private key is not decodable as a PKCS#1 or PKCS#8 RSA key.
    pub fn is_key_parse(&self) -> bool {
        matches!(self.0, ErrorKind::KeyParse(_))
    }

    /// The service account key payload is not valid JSON or misses a
    /// required field.
    pub fn is_invalid_service_account(&self) -> bool {
        matches!(self.0, ErrorKind::InvalidServiceAccount(_))
    }

    /// The token assertion could not be constructed or signed.
    pub fn is_signing(&self) -> bool {
        matches!(self.0, ErrorKind::Signing(_))
    }

    /// The exchange with the token service failed.
    pub fn is_transport(&self) -> bool {
        matches!(self.0, ErrorKind::Transport { .. })
    }

    /// The fallback credentials failed after the primary credentials were
    /// disabled by a configuration error.
    pub fn is_fallback(&self) -> bool {
        matches!(self.0, ErrorKind::Fallback { .. })
    }

    /// If `true`, the operation that produced this error may succeed on a
    /// retry. The cache never retries on its own; applications should use
    /// exponential backoff in their retry loops.
    pub fn is_retryable(&self) -> bool {
        matches!(self.0, ErrorKind::Transport { retryable: true, .. })
    }

    pub(crate) fn configuration<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::Configuration(source.into()))
    }

    pub(crate) fn key_parse<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::KeyParse(source.into()))
    }

    pub(crate) fn invalid_service_account<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::InvalidServiceAccount(source.into()))
    }

    pub(crate) fn signing<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::Signing(source.into()))
    }

    pub(crate) fn transport<T>(retryable: bool, source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::Transport {
            source: source.into(),
            retryable,
        })
    }

    pub(crate) fn fallback(config: &Error, fallback: Error) -> Error {
        Error(ErrorKind::Fallback {
            config: config.to_string(),
            fallback: Box::new(fallback),
        })
    }
}

#[derive(thiserror::Error, Debug)]
enum ErrorKind {
    #[error("invalid client configuration: {0}")]
    Configuration(#[source] BoxError),
    #[error("private key cannot be parsed: {0}")]
    KeyParse(#[source] BoxError),
    #[error("service account key is not valid: {0}")]
    InvalidServiceAccount(#[source] BoxError),
    #[error("cannot sign token assertion: {0}")]
    Signing(#[source] BoxError),
    #[error("token exchange failed: {source}")]
    Transport {
        #[source]
        source: BoxError,
        retryable: bool,
    },
    #[error("fallback credentials failed: {fallback}; primary credentials were disabled by: {config}")]
    Fallback {
        config: String,
        #[source]
        fallback: Box<Error>,
    },
}

pub(crate) fn is_retryable(c: StatusCode) -> bool {
    match c {
        // These statuses say nothing about the assertion we sent; the same
        // exchange may well succeed a moment later.
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::REQUEST_TIMEOUT
        | StatusCode::TOO_MANY_REQUESTS => true,
        _ => false,
    }
}
