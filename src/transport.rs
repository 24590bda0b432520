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

//! The exchange with the remote token service.
//!
//! The exchange takes one signed assertion and returns an opaque bearer token
//! together with the absolute expiry declared by the service. It is modeled
//! as a capability so the cache can be tested against a deterministic double.

use crate::Result;
use crate::errors::{self, Error};
use crate::token::IssuedToken;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Exchanges a signed assertion for a bearer token.
#[async_trait::async_trait]
pub(crate) trait TokenExchange: std::fmt::Debug + Send + Sync {
    async fn create_token(&self, assertion: &str) -> Result<IssuedToken>;
}

/// How the channel to the token service is secured.
///
/// `SkipVerify` and `Plaintext` disable protections and exist for testing
/// only.
#[derive(Clone, Debug)]
pub(crate) enum ChannelSecurity {
    /// Verify the server against the given roots only.
    CertPool(Vec<reqwest::Certificate>),
    /// Verify the server against the system trust store.
    SystemRoots,
    /// Accept any certificate and any host name in it.
    SkipVerify,
    /// No TLS at all; the endpoint must use `http://`.
    Plaintext,
}

/// Parses a PEM bundle into root certificates for [ChannelSecurity::CertPool].
pub(crate) fn parse_ca_bundle(pem: &[u8]) -> Result<Vec<reqwest::Certificate>> {
    let mut reader = pem;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::configuration)?;
    if certs.is_empty() {
        return Err(Error::configuration(
            "no certificates found in the PEM bundle",
        ));
    }
    certs
        .into_iter()
        .map(|der| reqwest::Certificate::from_der(der.as_ref()).map_err(Error::configuration))
        .collect()
}

#[derive(Serialize)]
struct CreateTokenRequest<'a> {
    jwt: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTokenResponse {
    iam_token: String,
    #[serde(with = "time::serde::rfc3339")]
    expires_at: OffsetDateTime,
}

/// The real exchange, over HTTPS (or plain HTTP in tests).
#[derive(Debug)]
pub(crate) struct HttpTransport {
    endpoint: String,
    channel: ChannelSecurity,
}

impl HttpTransport {
    pub(crate) fn new(endpoint: String, channel: ChannelSecurity) -> Self {
        Self { endpoint, channel }
    }

    // The connection is established per exchange and dropped with the client;
    // exchanges are rare enough that pooling buys nothing.
    fn client(&self) -> Result<reqwest::Client> {
        let builder = match &self.channel {
            ChannelSecurity::CertPool(roots) => roots.iter().cloned().fold(
                reqwest::Client::builder()
                    .use_rustls_tls()
                    .tls_built_in_root_certs(false),
                |builder, root| builder.add_root_certificate(root),
            ),
            ChannelSecurity::SystemRoots => reqwest::Client::builder().use_rustls_tls(),
            ChannelSecurity::SkipVerify => reqwest::Client::builder()
                .use_rustls_tls()
                .danger_accept_invalid_certs(true),
            ChannelSecurity::Plaintext => reqwest::Client::builder(),
        };
        builder.build().map_err(|e| Error::transport(false, e))
    }
}

#[async_trait::async_trait]
impl TokenExchange for HttpTransport {
    async fn create_token(&self, assertion: &str) -> Result<IssuedToken> {
        let client = self.client()?;
        let response = client
            .post(&self.endpoint)
            .json(&CreateTokenRequest { jwt: assertion })
            .send()
            .await
            .map_err(|e| Error::transport(true, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| Error::transport(errors::is_retryable(status), e))?;
            return Err(Error::transport(
                errors::is_retryable(status),
                format!("exchange rejected with status {status}: {body}"),
            ));
        }
        let response = response
            .json::<CreateTokenResponse>()
            .await
            .map_err(|e| Error::transport(!e.is_decode(), e))?;
        Ok(IssuedToken {
            token: response.iam_token,
            expires_at: response.expires_at,
        })
    }
}
